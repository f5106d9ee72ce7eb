use async_trait::async_trait;
use reqwest::{
    Body, Response, Url,
    multipart::{Form, Part},
};
use serde::{Deserialize, de::DeserializeOwned};
use tracing::{debug, warn};

use crate::{
    config::ClientConfig,
    error::{ConfigError, ServiceError},
    media::MediaFile,
    service::{AuditService, ReportRequest},
    types::{AnalysisOutcome, AnalyzeResponse, GenerateResponse, ReportResult, SessionMetadata},
};

/// [`AuditService`] over HTTP multipart requests.
pub struct HttpAuditService {
    http: reqwest::Client,
    config: ClientConfig,
}

impl HttpAuditService {
    pub fn new(config: ClientConfig) -> Result<Self, ServiceError> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self {
            http: builder.build()?,
            config,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    fn metadata_fields(form: Form, metadata: &SessionMetadata) -> Form {
        form.text("teacher_name", metadata.teacher_name.clone())
            .text("student_name", metadata.student_name.clone())
            .text("session_number", metadata.session_number.to_string())
            .text("total_sessions", metadata.total_sessions.to_string())
            .text("session_date", metadata.session_date_iso())
    }

    fn file_part(file: &MediaFile) -> Result<Part, ServiceError> {
        let body = Body::from(file.shared_bytes());
        Ok(Part::stream_with_length(body, file.len() as u64)
            .file_name(file.file_name().to_string())
            .mime_str(file.content_type())?)
    }

    async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T, ServiceError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.bytes().await.ok();
            let message = body.as_deref().and_then(error_message);
            warn!(status = status.as_u16(), ?message, "service returned an error");
            return Err(ServiceError::Status {
                status: status.as_u16(),
                message,
            });
        }
        let body = response.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }
}

#[async_trait]
impl AuditService for HttpAuditService {
    async fn analyze(
        &self,
        video: &MediaFile,
        metadata: &SessionMetadata,
    ) -> Result<AnalysisOutcome, ServiceError> {
        let url = self.config.analyze_url().map_err(invalid_url)?;
        let form = Form::new().part("video", Self::file_part(video)?);
        let form = Self::metadata_fields(form, metadata);

        debug!(%url, file = video.file_name(), bytes = video.len(), "posting analyze request");
        let response = self.http.post(url).multipart(form).send().await?;
        let body: AnalyzeResponse = Self::read_json(response).await?;
        body.into_outcome()
    }

    async fn generate(&self, request: &ReportRequest) -> Result<ReportResult, ServiceError> {
        let url = self.config.generate_url().map_err(invalid_url)?;
        let analysis = serde_json::to_string(&request.draft)?;

        let mut form = Form::new().text("analysis", analysis);
        if let Some(photo) = &request.session_photo {
            form = form.part("session_photo", Self::file_part(photo)?);
        }
        if let Some(logo) = &request.logo {
            form = form.part("logo", Self::file_part(logo)?);
        }
        let form = Self::metadata_fields(form, &request.metadata);

        debug!(%url, objectives = request.draft.objetivos.len(), "posting generate request");
        let response = self.http.post(url).multipart(form).send().await?;
        let body: GenerateResponse = Self::read_json(response).await?;
        body.into_report(|path| self.config.resolve(path).map_err(invalid_url))
    }

    async fn fetch_artifact(&self, url: &Url) -> Result<Vec<u8>, ServiceError> {
        debug!(%url, "downloading report artifact");
        let response = self.http.get(url.clone()).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.bytes().await.ok();
            return Err(ServiceError::Status {
                status: status.as_u16(),
                message: body.as_deref().and_then(error_message),
            });
        }
        Ok(response.bytes().await?.to_vec())
    }
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    detail: Option<serde_json::Value>,
}

/// Pull the human-readable message out of an error body: `message`, or a
/// string `detail` as produced by FastAPI.
pub fn error_message(body: &[u8]) -> Option<String> {
    let body: ErrorBody = serde_json::from_slice(body).ok()?;
    let detail = match body.detail {
        Some(serde_json::Value::String(detail)) => Some(detail),
        _ => None,
    };
    body.message
        .or(detail)
        .map(|message| message.trim().to_string())
        .filter(|message| !message.is_empty())
}

fn invalid_url(err: ConfigError) -> ServiceError {
    match err {
        ConfigError::InvalidUrl { url, reason } => ServiceError::InvalidUrl { url, reason },
        other => ServiceError::InvalidUrl {
            url: String::new(),
            reason: other.to_string(),
        },
    }
}
