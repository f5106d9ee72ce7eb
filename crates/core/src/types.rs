use std::fmt;

use chrono::{Local, NaiveDate};
use reqwest::Url;
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{ServiceError, WorkflowError};

/// Where a review session currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Staged,
    Analyzing,
    Reviewing,
    Generating,
    Reported,
    Failed(FailedStep),
}

/// The remote call whose failure put the workflow into [`Phase::Failed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailedStep {
    Analysis,
    Generation,
}

impl Phase {
    /// True while a remote call owns the session.
    pub fn is_busy(&self) -> bool {
        matches!(self, Phase::Analyzing | Phase::Generating)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Idle => f.write_str("idle"),
            Phase::Staged => f.write_str("staged"),
            Phase::Analyzing => f.write_str("analyzing"),
            Phase::Reviewing => f.write_str("reviewing"),
            Phase::Generating => f.write_str("generating"),
            Phase::Reported => f.write_str("reported"),
            Phase::Failed(FailedStep::Analysis) => f.write_str("failed (analysis)"),
            Phase::Failed(FailedStep::Generation) => f.write_str("failed (generation)"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionMetadata {
    pub teacher_name: String,
    pub student_name: String,
    pub session_number: u32,
    pub total_sessions: u32,
    pub session_date: NaiveDate,
}

impl Default for SessionMetadata {
    fn default() -> Self {
        Self {
            teacher_name: "Profesor".to_string(),
            student_name: "Estudiante".to_string(),
            session_number: 1,
            total_sessions: 8,
            session_date: Local::now().date_naive(),
        }
    }
}

impl SessionMetadata {
    pub fn validate(&self) -> Result<(), WorkflowError> {
        if self.session_number == 0 {
            return Err(WorkflowError::Validation(
                "El número de sesión debe ser al menos 1".to_string(),
            ));
        }
        if self.total_sessions == 0 {
            return Err(WorkflowError::Validation(
                "El total de sesiones debe ser al menos 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Session date in the ISO form the service expects.
    pub fn session_date_iso(&self) -> String {
        self.session_date.format("%Y-%m-%d").to_string()
    }
}

/// The editable pedagogical report returned by the analyze call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisDraft {
    #[serde(default, deserialize_with = "null_as_default")]
    pub objetivos: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub desarrollo: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub actitud: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub recomendaciones: String,
}

impl AnalysisDraft {
    /// Parse a freeform JSON rendition of the whole draft.
    pub fn from_json_str(input: &str) -> Result<Self, WorkflowError> {
        serde_json::from_str(input).map_err(WorkflowError::MalformedDraft)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisOutcome {
    pub transcript: String,
    pub draft: AnalysisDraft,
}

/// Body of a successful analyze call.
#[derive(Debug, Default, Deserialize)]
pub struct AnalyzeResponse {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub transcript: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub report: AnalysisDraft,
}

impl AnalyzeResponse {
    /// The service may answer 2xx with `status: "error"`; that is still a failure.
    pub fn into_outcome(self) -> Result<AnalysisOutcome, ServiceError> {
        if self.status.as_deref() == Some("error") {
            return Err(ServiceError::Rejected {
                message: self.message,
            });
        }
        Ok(AnalysisOutcome {
            transcript: self.transcript,
            draft: self.report,
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportStatus {
    Success,
    #[default]
    Error,
}

/// Body of a generate call.
#[derive(Debug, Default, Deserialize)]
pub struct GenerateResponse {
    #[serde(default)]
    pub status: ReportStatus,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub report_image: Option<String>,
}

impl GenerateResponse {
    pub fn into_report<F>(self, resolve: F) -> Result<ReportResult, ServiceError>
    where
        F: FnOnce(&str) -> Result<Url, ServiceError>,
    {
        if self.status != ReportStatus::Success {
            return Err(ServiceError::Rejected {
                message: self.message,
            });
        }
        let report_url = match self.report_image.as_deref() {
            Some(path) if !path.trim().is_empty() => Some(resolve(path)?),
            _ => None,
        };
        Ok(ReportResult {
            status: self.status,
            report_image: self.report_image,
            report_url,
        })
    }
}

/// Rendered report reference produced by a successful generate call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportResult {
    pub status: ReportStatus,
    /// Path exactly as the service returned it.
    pub report_image: Option<String>,
    /// `report_image` resolved against the service base URL.
    pub report_url: Option<Url>,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
