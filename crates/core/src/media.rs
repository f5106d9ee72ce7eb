use std::{fmt, path::Path};

use bytes::Bytes;
use tokio::fs;

use crate::error::{Result, WorkflowError};

/// What a staged file is allowed to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    /// A class recording: `video/*`, or `audio/*` for audio-only sessions.
    Recording,
    /// A logo or session photo: `image/*`.
    Image,
}

impl MediaKind {
    fn accepts(&self, content_type: &str) -> bool {
        match self {
            MediaKind::Recording => {
                content_type.starts_with("video/") || content_type.starts_with("audio/")
            }
            MediaKind::Image => content_type.starts_with("image/"),
        }
    }
}

/// Opaque handle to a staged binary blob. Cloning shares the bytes, and so
/// does handing them to a request body.
#[derive(Clone)]
pub struct MediaFile {
    file_name: String,
    content_type: String,
    bytes: Bytes,
}

impl MediaFile {
    pub fn new(
        file_name: impl Into<String>,
        content_type: impl Into<String>,
        bytes: impl Into<Bytes>,
    ) -> Self {
        Self {
            file_name: file_name.into(),
            content_type: content_type.into(),
            bytes: bytes.into(),
        }
    }

    /// Load a file from disk, inferring its content type from the extension.
    pub async fn from_path(path: &Path) -> Result<Self> {
        let bytes = fs::read(path).await.map_err(|source| WorkflowError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());
        let content_type = content_type_for(path).unwrap_or("application/octet-stream");

        Ok(Self::new(file_name, content_type, bytes))
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Another reference to the same blob, without copying it.
    pub fn shared_bytes(&self) -> Bytes {
        self.bytes.clone()
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// True when both handles point at the same underlying blob.
    pub fn shares_bytes_with(&self, other: &MediaFile) -> bool {
        self.bytes.as_ptr() == other.bytes.as_ptr()
            && self.bytes.len() == other.bytes.len()
    }

    pub fn ensure_kind(&self, kind: MediaKind) -> Result<()> {
        if kind.accepts(&self.content_type) {
            return Ok(());
        }
        let expected = match kind {
            MediaKind::Recording => "un video o audio",
            MediaKind::Image => "una imagen",
        };
        Err(WorkflowError::Validation(format!(
            "{} no es {} ({})",
            self.file_name, expected, self.content_type
        )))
    }
}

impl fmt::Debug for MediaFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaFile")
            .field("file_name", &self.file_name)
            .field("content_type", &self.content_type)
            .field("len", &self.bytes.len())
            .finish()
    }
}

impl PartialEq for MediaFile {
    fn eq(&self, other: &Self) -> bool {
        self.file_name == other.file_name
            && self.content_type == other.content_type
            && (self.shares_bytes_with(other) || self.bytes == other.bytes)
    }
}

impl Eq for MediaFile {}

/// Content type for the media extensions the service understands.
pub fn content_type_for(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_string_lossy().to_lowercase();
    let content_type = match ext.as_str() {
        "mp4" | "m4v" => "video/mp4",
        "webm" => "video/webm",
        "mkv" => "video/x-matroska",
        "mov" => "video/quicktime",
        "avi" => "video/x-msvideo",
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "m4a" => "audio/mp4",
        "ogg" => "audio/ogg",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        _ => return None,
    };
    Some(content_type)
}
