use async_trait::async_trait;
use reqwest::Url;

use crate::{
    error::ServiceError,
    media::MediaFile,
    types::{AnalysisDraft, AnalysisOutcome, ReportResult, SessionMetadata},
};

/// Everything the generate call bundles.
#[derive(Debug, Clone)]
pub struct ReportRequest {
    pub draft: AnalysisDraft,
    pub metadata: SessionMetadata,
    pub logo: Option<MediaFile>,
    pub session_photo: Option<MediaFile>,
}

/// The remote analysis and rendering service.
#[async_trait]
pub trait AuditService: Send + Sync {
    /// Transcribe and analyze a class recording into a draft report.
    async fn analyze(
        &self,
        video: &MediaFile,
        metadata: &SessionMetadata,
    ) -> Result<AnalysisOutcome, ServiceError>;

    /// Render an edited draft into a visual report.
    async fn generate(&self, request: &ReportRequest) -> Result<ReportResult, ServiceError>;

    /// Download a rendered artifact.
    async fn fetch_artifact(&self, url: &Url) -> Result<Vec<u8>, ServiceError>;
}
