use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use insight_core::{
    AnalysisDraft, AnalysisOutcome, AuditService, FailedStep, MediaFile, Phase, ReportRequest,
    ReportResult, ReviewWorkflow, ServiceError, SessionMetadata, WorkflowError,
    types::{AnalyzeResponse, GenerateResponse},
    workflow::{ANALYSIS_FALLBACK_MESSAGE, MISSING_VIDEO_MESSAGE, REPORT_FALLBACK_MESSAGE},
};
use reqwest::Url;
use serde_json::json;
use tokio::sync::Notify;

/// Scripted stand-in for the audit service.
#[derive(Default)]
struct FakeService {
    analyze_replies: Mutex<VecDeque<Result<AnalysisOutcome, ServiceError>>>,
    generate_replies: Mutex<VecDeque<Result<ReportResult, ServiceError>>>,
    analyzed: Mutex<Vec<(MediaFile, SessionMetadata)>>,
    generated: Mutex<Vec<ReportRequest>>,
    fetched: Mutex<Vec<Url>>,
    gate: Option<Arc<Notify>>,
}

impl FakeService {
    fn gated(gate: Arc<Notify>) -> Self {
        Self {
            gate: Some(gate),
            ..Self::default()
        }
    }

    fn reply_analysis(&self, body: serde_json::Value) {
        let response: AnalyzeResponse = serde_json::from_value(body).unwrap();
        self.analyze_replies
            .lock()
            .unwrap()
            .push_back(response.into_outcome());
    }

    fn fail_analysis(&self, err: ServiceError) {
        self.analyze_replies.lock().unwrap().push_back(Err(err));
    }

    fn reply_report(&self, body: serde_json::Value) {
        let response: GenerateResponse = serde_json::from_value(body).unwrap();
        let report = response.into_report(|path| {
            Ok(Url::parse("http://localhost:8000").unwrap().join(path).unwrap())
        });
        self.generate_replies.lock().unwrap().push_back(report);
    }

    fn fail_report(&self, err: ServiceError) {
        self.generate_replies.lock().unwrap().push_back(Err(err));
    }

    fn analyze_calls(&self) -> usize {
        self.analyzed.lock().unwrap().len()
    }

    fn generate_calls(&self) -> usize {
        self.generated.lock().unwrap().len()
    }
}

#[async_trait]
impl AuditService for FakeService {
    async fn analyze(
        &self,
        video: &MediaFile,
        metadata: &SessionMetadata,
    ) -> Result<AnalysisOutcome, ServiceError> {
        self.analyzed
            .lock()
            .unwrap()
            .push((video.clone(), metadata.clone()));
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        self.analyze_replies
            .lock()
            .unwrap()
            .pop_front()
            .expect("unexpected analyze call")
    }

    async fn generate(&self, request: &ReportRequest) -> Result<ReportResult, ServiceError> {
        self.generated.lock().unwrap().push(request.clone());
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        self.generate_replies
            .lock()
            .unwrap()
            .pop_front()
            .expect("unexpected generate call")
    }

    async fn fetch_artifact(&self, url: &Url) -> Result<Vec<u8>, ServiceError> {
        self.fetched.lock().unwrap().push(url.clone());
        Ok(b"\x89PNG".to_vec())
    }
}

fn video(name: &str) -> MediaFile {
    MediaFile::new(name, "video/mp4", name.as_bytes().to_vec())
}

fn class_analysis() -> serde_json::Value {
    json!({
        "transcript": "...",
        "report": {
            "objetivos": ["Obj A"],
            "desarrollo": "D",
            "actitud": "Good",
            "recomendaciones": "R"
        }
    })
}

async fn reviewing_workflow() -> ReviewWorkflow<FakeService> {
    let workflow = ReviewWorkflow::new(FakeService::default());
    workflow.service().reply_analysis(class_analysis());
    workflow.stage_video(video("class1.mp4")).unwrap();
    workflow.submit_analysis().await.unwrap();
    workflow
}

#[tokio::test]
async fn analysis_populates_the_draft() {
    let workflow = reviewing_workflow().await;

    let snapshot = workflow.snapshot();
    assert_eq!(snapshot.phase, Phase::Reviewing);
    assert_eq!(snapshot.transcript.as_deref(), Some("..."));
    let draft = snapshot.draft.unwrap();
    assert_eq!(draft.objetivos, vec!["Obj A".to_string()]);
    assert_eq!(draft.desarrollo, "D");
    assert_eq!(draft.actitud, "Good");
    assert_eq!(draft.recomendaciones, "R");
    assert_eq!(snapshot.error, None);
}

#[tokio::test]
async fn edited_draft_is_rendered() {
    let workflow = reviewing_workflow().await;

    workflow.add_objective().unwrap();
    workflow.update_objective(1, "Obj B").unwrap();
    assert_eq!(
        workflow.snapshot().draft.unwrap().objetivos,
        vec!["Obj A".to_string(), "Obj B".to_string()]
    );

    workflow
        .service()
        .reply_report(json!({ "status": "success", "report_image": "/reports/x.png" }));
    workflow.submit_report().await.unwrap();

    let snapshot = workflow.snapshot();
    assert_eq!(snapshot.phase, Phase::Reported);
    let report = snapshot.report.unwrap();
    assert_eq!(report.report_image.as_deref(), Some("/reports/x.png"));
    assert_eq!(
        report.report_url.unwrap().as_str(),
        "http://localhost:8000/reports/x.png"
    );

    let sent = workflow.service().generated.lock().unwrap()[0].clone();
    assert_eq!(sent.draft.objetivos, vec!["Obj A", "Obj B"]);
}

#[tokio::test]
async fn analysis_failure_keeps_the_video_for_retry() {
    let workflow = ReviewWorkflow::new(FakeService::default());
    let staged = video("class1.mp4");
    workflow.stage_video(staged.clone()).unwrap();
    workflow.service().fail_analysis(ServiceError::Status {
        status: 422,
        message: Some("bad file".into()),
    });

    let err = workflow.submit_analysis().await.unwrap_err();
    assert!(matches!(err, WorkflowError::Transport { ref message } if message == "bad file"));

    let snapshot = workflow.snapshot();
    assert_eq!(snapshot.phase, Phase::Failed(FailedStep::Analysis));
    assert_eq!(snapshot.error.as_deref(), Some("bad file"));

    workflow.retry().unwrap();
    let snapshot = workflow.snapshot();
    assert_eq!(snapshot.phase, Phase::Staged);
    assert_eq!(snapshot.error, None);
    assert!(snapshot.files.video.unwrap().shares_bytes_with(&staged));
}

#[tokio::test]
async fn unstructured_failures_use_the_fallback_message() {
    let workflow = ReviewWorkflow::new(FakeService::default());
    workflow.stage_video(video("class1.mp4")).unwrap();
    workflow.service().fail_analysis(ServiceError::Status {
        status: 502,
        message: None,
    });

    workflow.submit_analysis().await.unwrap_err();
    assert_eq!(
        workflow.snapshot().error.as_deref(),
        Some(ANALYSIS_FALLBACK_MESSAGE)
    );
}

#[tokio::test]
async fn ok_status_with_error_body_is_a_failure() {
    let workflow = ReviewWorkflow::new(FakeService::default());
    workflow.stage_video(video("class1.mp4")).unwrap();
    workflow
        .service()
        .reply_analysis(json!({ "status": "error", "message": "Whisper no disponible" }));

    workflow.submit_analysis().await.unwrap_err();
    let snapshot = workflow.snapshot();
    assert_eq!(snapshot.phase, Phase::Failed(FailedStep::Analysis));
    assert_eq!(snapshot.error.as_deref(), Some("Whisper no disponible"));
}

#[tokio::test]
async fn generation_failure_preserves_the_draft() {
    let workflow = reviewing_workflow().await;
    workflow.set_actitud("Participativo").unwrap();
    workflow.service().fail_report(ServiceError::Rejected { message: None });

    let err = workflow.submit_report().await.unwrap_err();
    assert_eq!(err.user_message(), Some(REPORT_FALLBACK_MESSAGE));
    assert_eq!(
        workflow.phase(),
        Phase::Failed(FailedStep::Generation)
    );

    workflow.retry().unwrap();
    let snapshot = workflow.snapshot();
    assert_eq!(snapshot.phase, Phase::Reviewing);
    assert_eq!(snapshot.draft.unwrap().actitud, "Participativo");
    assert_eq!(workflow.service().analyze_calls(), 1);

    workflow
        .service()
        .reply_report(json!({ "status": "success", "report_image": "/reports/y.png" }));
    workflow.submit_report().await.unwrap();
    assert_eq!(workflow.phase(), Phase::Reported);
    assert_eq!(workflow.service().generate_calls(), 2);
}

#[tokio::test]
async fn missing_video_fails_validation_without_a_call() {
    let workflow = ReviewWorkflow::new(FakeService::default());

    let err = workflow.submit_analysis().await.unwrap_err();
    assert!(matches!(err, WorkflowError::Validation(_)));

    let snapshot = workflow.snapshot();
    assert_eq!(snapshot.phase, Phase::Idle);
    assert_eq!(snapshot.error.as_deref(), Some(MISSING_VIDEO_MESSAGE));
    assert_eq!(workflow.service().analyze_calls(), 0);
}

#[tokio::test]
async fn latest_staged_video_is_analyzed() {
    let workflow = ReviewWorkflow::new(FakeService::default());
    workflow.service().reply_analysis(class_analysis());
    workflow.service().reply_analysis(class_analysis());

    workflow.stage_video(video("first.mp4")).unwrap();
    workflow.stage_video(video("second.mp4")).unwrap();
    let third = video("third.mp4");
    workflow.stage_video(third.clone()).unwrap();
    workflow.submit_analysis().await.unwrap();

    {
        let analyzed = workflow.service().analyzed.lock().unwrap();
        assert_eq!(analyzed.len(), 1);
        assert!(analyzed[0].0.shares_bytes_with(&third));
    }

    workflow.stage_video(video("fourth.mp4")).unwrap();
    let snapshot = workflow.snapshot();
    assert_eq!(snapshot.phase, Phase::Staged);
    assert_eq!(snapshot.draft, None);
    assert_eq!(snapshot.transcript, None);
    assert_eq!(snapshot.report, None);
}

#[tokio::test]
async fn restaging_clears_a_rendered_report() {
    let workflow = reviewing_workflow().await;
    workflow
        .service()
        .reply_report(json!({ "status": "success", "report_image": "/reports/x.png" }));
    workflow.submit_report().await.unwrap();

    workflow.stage_video(video("class2.mp4")).unwrap();
    let snapshot = workflow.snapshot();
    assert_eq!(snapshot.phase, Phase::Staged);
    assert_eq!(snapshot.report, None);
    assert_eq!(snapshot.draft, None);
}

#[tokio::test]
async fn non_video_files_are_not_staged() {
    let workflow = ReviewWorkflow::new(FakeService::default());
    let photo = MediaFile::new("photo.png", "image/png", vec![1u8, 2, 3]);

    let err = workflow.stage_video(photo.clone()).unwrap_err();
    assert!(matches!(err, WorkflowError::Validation(_)));
    assert_eq!(workflow.phase(), Phase::Idle);
    assert!(workflow.snapshot().files.video.is_none());

    workflow.stage_logo(Some(photo)).unwrap();
    assert!(matches!(
        workflow.stage_session_photo(Some(video("class1.mp4"))),
        Err(WorkflowError::Validation(_))
    ));
}

#[tokio::test]
async fn no_op_objective_update_changes_nothing() {
    let workflow = reviewing_workflow().await;
    let mut rx = workflow.subscribe();
    let _ = rx.borrow_and_update();
    let before = serde_json::to_vec(&workflow.snapshot().draft).unwrap();

    workflow.update_objective(0, "Obj A").unwrap();

    let after = serde_json::to_vec(&workflow.snapshot().draft).unwrap();
    assert_eq!(before, after);
    assert!(!rx.has_changed().unwrap());
}

#[tokio::test]
async fn removing_an_objective_preserves_order() {
    let workflow = reviewing_workflow().await;
    workflow
        .replace_draft(AnalysisDraft {
            objetivos: vec!["a".into(), "b".into(), "c".into(), "d".into()],
            ..AnalysisDraft::default()
        })
        .unwrap();

    workflow.remove_objective(1).unwrap();
    assert_eq!(
        workflow.snapshot().draft.unwrap().objetivos,
        vec!["a", "c", "d"]
    );
}

#[tokio::test]
async fn out_of_range_indices_are_programming_errors() {
    let workflow = reviewing_workflow().await;

    assert!(matches!(
        workflow.update_objective(5, "x"),
        Err(WorkflowError::ObjectiveOutOfRange { index: 5, len: 1 })
    ));
    assert!(matches!(
        workflow.remove_objective(1),
        Err(WorkflowError::ObjectiveOutOfRange { index: 1, len: 1 })
    ));

    let snapshot = workflow.snapshot();
    assert_eq!(snapshot.phase, Phase::Reviewing);
    assert_eq!(snapshot.error, None);
    assert_eq!(snapshot.draft.unwrap().objetivos, vec!["Obj A"]);
}

#[tokio::test]
async fn missing_objectives_become_an_empty_list() {
    let workflow = ReviewWorkflow::new(FakeService::default());
    workflow.service().reply_analysis(json!({
        "transcript": "hola",
        "report": { "desarrollo": "D" }
    }));
    workflow.stage_video(video("class1.mp4")).unwrap();
    workflow.submit_analysis().await.unwrap();

    let draft = workflow.snapshot().draft.unwrap();
    assert!(draft.objetivos.is_empty());
    assert_eq!(draft.recomendaciones, "");
}

#[tokio::test]
async fn operations_in_the_wrong_phase_are_ignored() {
    let workflow = ReviewWorkflow::new(FakeService::default());

    assert!(matches!(
        workflow.add_objective(),
        Err(WorkflowError::InvalidState { phase: Phase::Idle, .. })
    ));
    assert!(matches!(
        workflow.submit_report().await,
        Err(WorkflowError::InvalidState { .. })
    ));
    assert!(matches!(
        workflow.retry(),
        Err(WorkflowError::InvalidState { .. })
    ));
    assert!(matches!(
        workflow.download_report().await,
        Err(WorkflowError::InvalidState { .. })
    ));

    let snapshot = workflow.snapshot();
    assert_eq!(snapshot.phase, Phase::Idle);
    assert_eq!(snapshot.error, None);
    assert_eq!(workflow.service().generate_calls(), 0);
}

#[tokio::test]
async fn second_submit_while_analyzing_is_a_no_op() {
    let gate = Arc::new(Notify::new());
    let workflow = ReviewWorkflow::new(FakeService::gated(Arc::clone(&gate)));
    workflow.service().reply_analysis(class_analysis());
    workflow.stage_video(video("class1.mp4")).unwrap();

    let mut rx = workflow.subscribe();
    let running = tokio::spawn({
        let workflow = workflow.clone();
        async move { workflow.submit_analysis().await }
    });
    rx.wait_for(|s| s.phase == Phase::Analyzing).await.unwrap();

    // The session stays readable while the call is suspended.
    assert_eq!(workflow.snapshot().phase, Phase::Analyzing);
    assert!(matches!(
        workflow.submit_analysis().await,
        Err(WorkflowError::InvalidState { phase: Phase::Analyzing, .. })
    ));
    assert!(matches!(
        workflow.set_metadata(SessionMetadata::default()),
        Err(WorkflowError::InvalidState { .. })
    ));

    gate.notify_one();
    running.await.unwrap().unwrap();

    assert_eq!(workflow.phase(), Phase::Reviewing);
    assert_eq!(workflow.service().analyze_calls(), 1);
}

#[tokio::test]
async fn result_for_a_replaced_video_is_discarded() {
    let gate = Arc::new(Notify::new());
    let workflow = ReviewWorkflow::new(FakeService::gated(Arc::clone(&gate)));
    workflow.service().reply_analysis(class_analysis());
    workflow.stage_video(video("old.mp4")).unwrap();

    let mut rx = workflow.subscribe();
    let running = tokio::spawn({
        let workflow = workflow.clone();
        async move { workflow.submit_analysis().await }
    });
    rx.wait_for(|s| s.phase == Phase::Analyzing).await.unwrap();

    let replacement = video("new.mp4");
    workflow.stage_video(replacement.clone()).unwrap();
    assert!(matches!(
        workflow.submit_analysis().await,
        Err(WorkflowError::Busy { .. })
    ));

    gate.notify_one();
    running.await.unwrap().unwrap();

    let snapshot = workflow.snapshot();
    assert_eq!(snapshot.phase, Phase::Staged);
    assert_eq!(snapshot.draft, None);
    assert!(snapshot.files.video.unwrap().shares_bytes_with(&replacement));
}

#[tokio::test]
async fn report_for_a_replaced_video_is_discarded() {
    let gate = Arc::new(Notify::new());
    let workflow = ReviewWorkflow::new(FakeService::gated(Arc::clone(&gate)));
    workflow.service().reply_analysis(class_analysis());
    workflow.stage_video(video("old.mp4")).unwrap();
    let analysis = tokio::spawn({
        let workflow = workflow.clone();
        async move { workflow.submit_analysis().await }
    });
    let mut rx = workflow.subscribe();
    rx.wait_for(|s| s.phase == Phase::Analyzing).await.unwrap();
    gate.notify_one();
    analysis.await.unwrap().unwrap();
    assert_eq!(workflow.phase(), Phase::Reviewing);

    workflow
        .service()
        .reply_report(json!({ "status": "success", "report_image": "/reports/x.png" }));
    let running = tokio::spawn({
        let workflow = workflow.clone();
        async move { workflow.submit_report().await }
    });
    rx.wait_for(|s| s.phase == Phase::Generating).await.unwrap();

    workflow.stage_video(video("new.mp4")).unwrap();
    gate.notify_one();
    running.await.unwrap().unwrap();

    let snapshot = workflow.snapshot();
    assert_eq!(snapshot.phase, Phase::Staged);
    assert_eq!(snapshot.report, None);
    assert_eq!(snapshot.draft, None);
    assert_eq!(snapshot.error, None);
    assert_eq!(workflow.service().generate_calls(), 1);
}

#[tokio::test]
async fn images_can_change_while_analyzing() {
    let gate = Arc::new(Notify::new());
    let workflow = ReviewWorkflow::new(FakeService::gated(Arc::clone(&gate)));
    workflow.service().reply_analysis(class_analysis());
    workflow.stage_video(video("class1.mp4")).unwrap();

    let mut rx = workflow.subscribe();
    let running = tokio::spawn({
        let workflow = workflow.clone();
        async move { workflow.submit_analysis().await }
    });
    rx.wait_for(|s| s.phase == Phase::Analyzing).await.unwrap();

    let logo = MediaFile::new("logo.png", "image/png", vec![1u8]);
    let photo = MediaFile::new("photo.jpg", "image/jpeg", vec![2u8]);
    workflow.stage_logo(Some(logo.clone())).unwrap();
    workflow.stage_session_photo(Some(photo.clone())).unwrap();
    assert_eq!(workflow.phase(), Phase::Analyzing);

    gate.notify_one();
    running.await.unwrap().unwrap();

    let files = workflow.snapshot().files;
    assert_eq!(files.logo, Some(logo));
    assert_eq!(files.session_photo, Some(photo));
}

#[tokio::test]
async fn images_are_frozen_while_generating() {
    let gate = Arc::new(Notify::new());
    let workflow = ReviewWorkflow::new(FakeService::gated(Arc::clone(&gate)));
    workflow.service().reply_analysis(class_analysis());
    workflow.stage_video(video("class1.mp4")).unwrap();
    let mut rx = workflow.subscribe();
    let analysis = tokio::spawn({
        let workflow = workflow.clone();
        async move { workflow.submit_analysis().await }
    });
    rx.wait_for(|s| s.phase == Phase::Analyzing).await.unwrap();
    gate.notify_one();
    analysis.await.unwrap().unwrap();

    workflow
        .service()
        .reply_report(json!({ "status": "success", "report_image": "/reports/x.png" }));
    let running = tokio::spawn({
        let workflow = workflow.clone();
        async move { workflow.submit_report().await }
    });
    rx.wait_for(|s| s.phase == Phase::Generating).await.unwrap();

    assert!(matches!(
        workflow.stage_logo(Some(MediaFile::new("logo.png", "image/png", vec![1u8]))),
        Err(WorkflowError::InvalidState { phase: Phase::Generating, .. })
    ));

    gate.notify_one();
    running.await.unwrap().unwrap();
    assert_eq!(workflow.phase(), Phase::Reported);
    assert_eq!(workflow.snapshot().files.logo, None);
}

#[tokio::test]
async fn subscribers_see_each_transition() {
    let workflow = ReviewWorkflow::new(FakeService::default());
    workflow.service().reply_analysis(class_analysis());
    let mut rx = workflow.subscribe();
    assert_eq!(rx.borrow_and_update().phase, Phase::Idle);

    workflow.stage_video(video("class1.mp4")).unwrap();
    assert!(rx.has_changed().unwrap());
    assert_eq!(rx.borrow_and_update().phase, Phase::Staged);

    workflow.submit_analysis().await.unwrap();
    assert!(rx.has_changed().unwrap());
    let snapshot = rx.borrow_and_update().clone();
    assert_eq!(snapshot.phase, Phase::Reviewing);
    assert_eq!(snapshot.session_id, workflow.session_id());
}

#[tokio::test]
async fn reported_session_can_be_reopened_and_downloaded() {
    let workflow = reviewing_workflow().await;
    workflow
        .service()
        .reply_report(json!({ "status": "success", "report_image": "/reports/x.png" }));
    workflow.submit_report().await.unwrap();

    let bytes = workflow.download_report().await.unwrap();
    assert_eq!(bytes, b"\x89PNG");
    assert_eq!(
        workflow.service().fetched.lock().unwrap()[0].as_str(),
        "http://localhost:8000/reports/x.png"
    );

    workflow.reopen_draft().unwrap();
    let snapshot = workflow.snapshot();
    assert_eq!(snapshot.phase, Phase::Reviewing);
    assert_eq!(snapshot.report, None);
    assert_eq!(snapshot.draft.unwrap().objetivos, vec!["Obj A"]);
}

#[tokio::test]
async fn metadata_and_images_travel_with_the_report() {
    let workflow = ReviewWorkflow::new(FakeService::default());
    workflow
        .update_metadata(|m| {
            m.teacher_name = "Juan Pérez".into();
            m.student_name = "María García".into();
            m.session_number = 3;
        })
        .unwrap();
    assert!(matches!(
        workflow.update_metadata(|m| m.total_sessions = 0),
        Err(WorkflowError::Validation(_))
    ));

    workflow.service().reply_analysis(class_analysis());
    workflow.stage_video(video("class1.mp4")).unwrap();
    workflow
        .stage_logo(Some(MediaFile::new("logo.png", "image/png", vec![1u8])))
        .unwrap();
    workflow.submit_analysis().await.unwrap();

    workflow
        .service()
        .reply_report(json!({ "status": "success", "report_image": "/reports/x.png" }));
    workflow.submit_report().await.unwrap();

    let (_, analyzed_meta) = workflow.service().analyzed.lock().unwrap()[0].clone();
    assert_eq!(analyzed_meta.teacher_name, "Juan Pérez");
    assert_eq!(analyzed_meta.total_sessions, 8);

    let request = workflow.service().generated.lock().unwrap()[0].clone();
    assert_eq!(request.metadata.session_number, 3);
    assert_eq!(request.logo.unwrap().file_name(), "logo.png");
    assert!(request.session_photo.is_none());
}
