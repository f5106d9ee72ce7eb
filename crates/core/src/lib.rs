//! Insight Core Library
//!
//! Review workflow for automated pedagogical audits: stage a class recording,
//! have the audit service analyze it, edit the draft report and render it.

pub mod client;
pub mod config;
pub mod error;
pub mod format;
pub mod media;
pub mod service;
pub mod types;
pub mod workflow;

// Re-export commonly used items at crate root
pub use client::HttpAuditService;
pub use config::ClientConfig;
pub use error::{ConfigError, Result, ServiceError, WorkflowError};
pub use format::{format_draft_readable, format_transcript_excerpt};
pub use media::{MediaFile, MediaKind};
pub use service::{AuditService, ReportRequest};
pub use types::{
    AnalysisDraft, AnalysisOutcome, FailedStep, Phase, ReportResult, ReportStatus,
    SessionMetadata,
};
pub use workflow::{ReviewWorkflow, StagedFiles, WorkflowSnapshot};
