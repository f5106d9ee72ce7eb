//! The review workflow: stage a recording, analyze it, edit the draft, render
//! the report.
//!
//! A [`ReviewWorkflow`] is a cheap handle; clones share one session. State
//! lives in a `watch` channel so a presentation layer can read a consistent
//! [`WorkflowSnapshot`] at any time, including while a remote call is
//! suspended, and can subscribe to every change.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{Instrument, debug, info, info_span, warn};
use uuid::Uuid;

use crate::{
    error::{Result, ServiceError, WorkflowError},
    media::{MediaFile, MediaKind},
    service::{AuditService, ReportRequest},
    types::{AnalysisDraft, FailedStep, Phase, ReportResult, SessionMetadata},
};

pub const MISSING_VIDEO_MESSAGE: &str = "Por favor selecciona un archivo de video";
pub const ANALYSIS_FALLBACK_MESSAGE: &str = "Error al procesar el archivo";
pub const REPORT_FALLBACK_MESSAGE: &str = "Error al generar el reporte";
pub const DOWNLOAD_FALLBACK_MESSAGE: &str = "Error al descargar el reporte";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StagedFiles {
    pub video: Option<MediaFile>,
    pub logo: Option<MediaFile>,
    pub session_photo: Option<MediaFile>,
}

/// Everything a presentation layer needs to render the session.
#[derive(Debug, Clone)]
pub struct WorkflowSnapshot {
    pub session_id: Uuid,
    pub phase: Phase,
    pub metadata: SessionMetadata,
    pub files: StagedFiles,
    pub transcript: Option<String>,
    pub draft: Option<AnalysisDraft>,
    pub report: Option<ReportResult>,
    /// Last user-facing error, cleared by the next successful action.
    pub error: Option<String>,
    // Bumped on every video staging; a call started under an older epoch is stale.
    epoch: u64,
    in_flight: bool,
}

impl WorkflowSnapshot {
    fn new(session_id: Uuid, metadata: SessionMetadata) -> Self {
        Self {
            session_id,
            phase: Phase::Idle,
            metadata,
            files: StagedFiles::default(),
            transcript: None,
            draft: None,
            report: None,
            error: None,
            epoch: 0,
            in_flight: false,
        }
    }

    fn ensure_phase(&self, operation: &'static str, allowed: Phase) -> Result<()> {
        if self.phase != allowed {
            return Err(WorkflowError::InvalidState {
                operation,
                phase: self.phase,
            });
        }
        Ok(())
    }

    fn ensure_not_busy(&self, operation: &'static str) -> Result<()> {
        if self.phase.is_busy() {
            return Err(WorkflowError::InvalidState {
                operation,
                phase: self.phase,
            });
        }
        Ok(())
    }

    /// The images only travel with the generate call.
    fn ensure_not_generating(&self, operation: &'static str) -> Result<()> {
        if self.phase == Phase::Generating {
            return Err(WorkflowError::InvalidState {
                operation,
                phase: self.phase,
            });
        }
        Ok(())
    }

    fn clear_results(&mut self) {
        self.transcript = None;
        self.draft = None;
        self.report = None;
    }
}

struct CallTicket<T> {
    epoch: u64,
    payload: T,
}

pub struct ReviewWorkflow<S> {
    inner: Arc<WorkflowInner<S>>,
}

struct WorkflowInner<S> {
    service: S,
    state: watch::Sender<WorkflowSnapshot>,
}

impl<S> Clone for ReviewWorkflow<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: AuditService> ReviewWorkflow<S> {
    pub fn new(service: S) -> Self {
        Self::with_metadata(service, SessionMetadata::default())
    }

    pub fn with_metadata(service: S, metadata: SessionMetadata) -> Self {
        let session_id = Uuid::new_v4();
        let (state, _) = watch::channel(WorkflowSnapshot::new(session_id, metadata));
        debug!(%session_id, "review workflow created");
        Self {
            inner: Arc::new(WorkflowInner { service, state }),
        }
    }

    pub fn service(&self) -> &S {
        &self.inner.service
    }

    pub fn session_id(&self) -> Uuid {
        self.inner.state.borrow().session_id
    }

    pub fn phase(&self) -> Phase {
        self.inner.state.borrow().phase
    }

    pub fn snapshot(&self) -> WorkflowSnapshot {
        self.inner.state.borrow().clone()
    }

    /// Observe every state change. The receiver starts at the current state.
    pub fn subscribe(&self) -> watch::Receiver<WorkflowSnapshot> {
        self.inner.state.subscribe()
    }

    /// Run `f` against the state. `f` returns its value and whether it changed
    /// anything; it must not mutate before returning an error, except that
    /// user-facing errors are recorded on the snapshot here.
    fn apply<R, F>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&mut WorkflowSnapshot) -> Result<(R, bool)>,
    {
        let mut result = None;
        self.inner.state.send_if_modified(|state| {
            let (value, changed) = match f(state) {
                Ok((value, changed)) => (Ok(value), changed),
                Err(err) => {
                    let changed = match err.user_message() {
                        Some(message) => {
                            state.error = Some(message.to_string());
                            true
                        }
                        None => {
                            debug!(error = %err, "ignored workflow operation");
                            false
                        }
                    };
                    (Err(err), changed)
                }
            };
            result = Some(value);
            changed
        });
        result.expect("watch sender runs the modify closure synchronously")
    }

    /// Stage the class recording, discarding every result tied to the
    /// previous one.
    pub fn stage_video(&self, video: MediaFile) -> Result<()> {
        self.apply(|state| {
            video.ensure_kind(MediaKind::Recording)?;
            info!(
                session = %state.session_id,
                file = video.file_name(),
                bytes = video.len(),
                "video staged"
            );
            state.epoch += 1;
            state.files.video = Some(video);
            state.clear_results();
            state.error = None;
            state.phase = Phase::Staged;
            Ok(((), true))
        })
    }

    pub fn stage_logo(&self, logo: Option<MediaFile>) -> Result<()> {
        self.apply(|state| {
            state.ensure_not_generating("stage_logo")?;
            if let Some(logo) = &logo {
                logo.ensure_kind(MediaKind::Image)?;
            }
            let changed = state.files.logo != logo;
            state.files.logo = logo;
            Ok(((), changed))
        })
    }

    pub fn stage_session_photo(&self, photo: Option<MediaFile>) -> Result<()> {
        self.apply(|state| {
            state.ensure_not_generating("stage_session_photo")?;
            if let Some(photo) = &photo {
                photo.ensure_kind(MediaKind::Image)?;
            }
            let changed = state.files.session_photo != photo;
            state.files.session_photo = photo;
            Ok(((), changed))
        })
    }

    pub fn set_metadata(&self, metadata: SessionMetadata) -> Result<()> {
        self.apply(|state| {
            state.ensure_not_busy("set_metadata")?;
            metadata.validate()?;
            let changed = state.metadata != metadata;
            state.metadata = metadata;
            Ok(((), changed))
        })
    }

    pub fn update_metadata<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&mut SessionMetadata),
    {
        let mut metadata = self.inner.state.borrow().metadata.clone();
        f(&mut metadata);
        self.set_metadata(metadata)
    }

    /// Send the staged recording for analysis. Resolves once the service has
    /// answered; a failure leaves the workflow in `Failed` with its message.
    pub async fn submit_analysis(&self) -> Result<()> {
        const OP: &str = "submit_analysis";

        let ticket = self.apply(|state| {
            let video = state
                .files
                .video
                .clone()
                .ok_or_else(|| WorkflowError::Validation(MISSING_VIDEO_MESSAGE.to_string()))?;
            state.ensure_phase(OP, Phase::Staged)?;
            if state.in_flight {
                return Err(WorkflowError::Busy { operation: OP });
            }
            state.metadata.validate()?;

            state.phase = Phase::Analyzing;
            state.in_flight = true;
            state.error = None;
            state.clear_results();
            let ticket = CallTicket {
                epoch: state.epoch,
                payload: (video, state.metadata.clone()),
            };
            Ok((ticket, true))
        })?;

        let (video, metadata) = &ticket.payload;
        let span = info_span!("analyze", session = %self.session_id(), file = video.file_name());
        let response = self
            .inner
            .service
            .analyze(video, metadata)
            .instrument(span)
            .await;

        self.apply(|state| {
            if state.epoch != ticket.epoch {
                warn!(session = %state.session_id, "discarding analysis for a replaced video");
                state.in_flight = false;
                return Ok(((), false));
            }
            state.in_flight = false;
            match response {
                Ok(outcome) => {
                    info!(
                        session = %state.session_id,
                        objectives = outcome.draft.objetivos.len(),
                        transcript_chars = outcome.transcript.chars().count(),
                        "analysis received"
                    );
                    state.transcript = Some(outcome.transcript);
                    state.draft = Some(outcome.draft);
                    state.phase = Phase::Reviewing;
                    Ok(((), true))
                }
                Err(err) => {
                    state.phase = Phase::Failed(FailedStep::Analysis);
                    Err(transport_failure(&err, ANALYSIS_FALLBACK_MESSAGE))
                }
            }
        })
    }

    /// Render the edited draft. A failure keeps the draft so the user can
    /// retry without analyzing again.
    pub async fn submit_report(&self) -> Result<()> {
        const OP: &str = "submit_report";

        let ticket = self.apply(|state| {
            state.ensure_phase(OP, Phase::Reviewing)?;
            if state.in_flight {
                return Err(WorkflowError::Busy { operation: OP });
            }
            let draft = state.draft.clone().ok_or(WorkflowError::InvalidState {
                operation: OP,
                phase: state.phase,
            })?;
            state.metadata.validate()?;

            state.phase = Phase::Generating;
            state.in_flight = true;
            state.error = None;
            let request = ReportRequest {
                draft,
                metadata: state.metadata.clone(),
                logo: state.files.logo.clone(),
                session_photo: state.files.session_photo.clone(),
            };
            Ok((
                CallTicket {
                    epoch: state.epoch,
                    payload: request,
                },
                true,
            ))
        })?;

        let span = info_span!("generate", session = %self.session_id());
        let response = self
            .inner
            .service
            .generate(&ticket.payload)
            .instrument(span)
            .await;

        self.apply(|state| {
            if state.epoch != ticket.epoch {
                warn!(session = %state.session_id, "discarding report for a replaced video");
                state.in_flight = false;
                return Ok(((), false));
            }
            state.in_flight = false;
            match response {
                Ok(report) => {
                    info!(
                        session = %state.session_id,
                        image = report.report_image.as_deref().unwrap_or("-"),
                        "report generated"
                    );
                    state.report = Some(report);
                    state.phase = Phase::Reported;
                    Ok(((), true))
                }
                Err(err) => {
                    state.phase = Phase::Failed(FailedStep::Generation);
                    Err(transport_failure(&err, REPORT_FALLBACK_MESSAGE))
                }
            }
        })
    }

    /// Return to the phase preceding the failed call. Nothing is re-sent.
    pub fn retry(&self) -> Result<()> {
        self.apply(|state| {
            let previous = match state.phase {
                Phase::Failed(FailedStep::Analysis) => Phase::Staged,
                Phase::Failed(FailedStep::Generation) => Phase::Reviewing,
                phase => {
                    return Err(WorkflowError::InvalidState {
                        operation: "retry",
                        phase,
                    });
                }
            };
            state.phase = previous;
            state.error = None;
            Ok(((), true))
        })
    }

    /// Drop the rendered report and go back to editing the same draft.
    pub fn reopen_draft(&self) -> Result<()> {
        self.apply(|state| {
            state.ensure_phase("reopen_draft", Phase::Reported)?;
            state.report = None;
            state.phase = Phase::Reviewing;
            Ok(((), true))
        })
    }

    fn edit_draft<F>(&self, operation: &'static str, edit: F) -> Result<()>
    where
        F: FnOnce(&mut AnalysisDraft) -> Result<bool>,
    {
        self.apply(|state| {
            state.ensure_phase(operation, Phase::Reviewing)?;
            let phase = state.phase;
            let draft = state
                .draft
                .as_mut()
                .ok_or(WorkflowError::InvalidState { operation, phase })?;
            let changed = edit(draft)?;
            Ok(((), changed))
        })
    }

    pub fn add_objective(&self) -> Result<()> {
        self.edit_draft("add_objective", |draft| {
            draft.objetivos.push(String::new());
            Ok(true)
        })
    }

    pub fn update_objective(
        &self,
        index: usize,
        value: impl Into<String>,
    ) -> Result<()> {
        let value = value.into();
        self.edit_draft("update_objective", |draft| {
            let len = draft.objetivos.len();
            let slot = draft
                .objetivos
                .get_mut(index)
                .ok_or(WorkflowError::ObjectiveOutOfRange { index, len })?;
            if *slot == value {
                return Ok(false);
            }
            *slot = value;
            Ok(true)
        })
    }

    pub fn remove_objective(&self, index: usize) -> Result<()> {
        self.edit_draft("remove_objective", |draft| {
            let len = draft.objetivos.len();
            if index >= len {
                return Err(WorkflowError::ObjectiveOutOfRange { index, len });
            }
            draft.objetivos.remove(index);
            Ok(true)
        })
    }

    pub fn set_desarrollo(&self, value: impl Into<String>) -> Result<()> {
        let value = value.into();
        self.edit_draft("set_desarrollo", |draft| {
            Ok(replace_if_changed(&mut draft.desarrollo, value))
        })
    }

    pub fn set_actitud(&self, value: impl Into<String>) -> Result<()> {
        let value = value.into();
        self.edit_draft("set_actitud", |draft| {
            Ok(replace_if_changed(&mut draft.actitud, value))
        })
    }

    pub fn set_recomendaciones(&self, value: impl Into<String>) -> Result<()> {
        let value = value.into();
        self.edit_draft("set_recomendaciones", |draft| {
            Ok(replace_if_changed(&mut draft.recomendaciones, value))
        })
    }

    /// Swap in a whole draft, e.g. one edited as freeform JSON.
    pub fn replace_draft(&self, replacement: AnalysisDraft) -> Result<()> {
        self.edit_draft("replace_draft", |draft| {
            Ok(replace_if_changed(draft, replacement))
        })
    }

    /// Fetch the rendered report image. Does not change the phase.
    pub async fn download_report(&self) -> Result<Vec<u8>> {
        const OP: &str = "download_report";

        let url = {
            let state = self.inner.state.borrow();
            if state.phase != Phase::Reported {
                return Err(WorkflowError::InvalidState {
                    operation: OP,
                    phase: state.phase,
                });
            }
            state
                .report
                .as_ref()
                .and_then(|report| report.report_url.clone())
                .ok_or(WorkflowError::InvalidState {
                    operation: OP,
                    phase: state.phase,
                })?
        };

        self.inner
            .service
            .fetch_artifact(&url)
            .instrument(info_span!("download", session = %self.session_id(), %url))
            .await
            .map_err(|err| transport_failure(&err, DOWNLOAD_FALLBACK_MESSAGE))
    }
}

fn replace_if_changed<T: PartialEq>(slot: &mut T, value: T) -> bool {
    if *slot == value {
        return false;
    }
    *slot = value;
    true
}

fn transport_failure(err: &ServiceError, fallback: &str) -> WorkflowError {
    warn!(error = %err, "remote call failed");
    WorkflowError::Transport {
        message: err.remote_message().unwrap_or(fallback).to_string(),
    }
}
