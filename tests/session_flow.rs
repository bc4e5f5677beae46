mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use common::{
    devices, devices_with_visibility, face, proctor_config, sample_quiz, wait_until, FakeCamera,
    PollingSource, ScriptedDetector,
};
use quiz_proctor::error::{CaptureError, SessionError};
use quiz_proctor::infrastructure::{CaptureStatus, VisibilityEvent};
use quiz_proctor::services::visibility::WINDOW_SWITCH_MESSAGE;
use quiz_proctor::services::{ScoreReport, Verdict, WarningChannel};
use quiz_proctor::workflow::{start_session, ProctorDevices, SessionState};
use tokio_test::{assert_err, assert_ok};

const TAB_MESSAGE: &str = "You have switched the tab. Please return to the quiz.";

#[tokio::test(start_paused = true)]
async fn third_violation_disqualifies_and_releases_camera() {
    let camera = Arc::new(FakeCamera::granted());
    let probe = Arc::clone(&camera.probe);
    let detector = Arc::new(ScriptedDetector::new([
        Ok(vec![]),
        Ok(vec![face(120.0), face(121.0)]),
        Ok(vec![face(132.0)]),
    ]));

    let handle = start_session(
        sample_quiz(),
        proctor_config(),
        devices(Some(camera), detector.clone()),
    );
    let mut updates = handle.subscribe();

    let snapshot = wait_until(&mut updates, |s| s.state == SessionState::Disqualified).await;
    assert_eq!(snapshot.violations.count, 3);
    assert!(snapshot.violations.disqualified);
    assert_eq!(snapshot.violations.reason.as_deref(), Some("Head turned left."));
    assert_eq!(snapshot.camera, CaptureStatus::Released);
    assert!(snapshot.warnings.is_empty());
    assert!(snapshot.violation_indicator().is_none());
    assert_eq!(probe.released(), 1);

    // 终止后不再推理
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(detector.calls(), 3);
    assert_eq!(handle.snapshot().violations.count, 3);

    let err = assert_err!(handle.submit().await);
    assert!(matches!(err, SessionError::InvalidTransition { .. }));
    assert_err!(handle.select_answer(0, 1).await);

    assert!(!handle.exit_requested());
    assert_ok!(handle.acknowledge_disqualification().await);
    handle.wait_for_exit().await;
    assert!(handle.exit_requested());

    handle.shutdown().await;
    assert_eq!(probe.released(), 1);
}

#[tokio::test(start_paused = true)]
async fn two_violations_keep_session_active() {
    let camera = Arc::new(FakeCamera::granted());
    let detector = Arc::new(ScriptedDetector::new([
        Ok(vec![]),
        Err(CaptureError::detection_failure("model not ready")),
        Ok(vec![face(110.0)]),
    ]));

    let handle = start_session(
        sample_quiz(),
        proctor_config(),
        devices(Some(camera), detector.clone()),
    );
    let mut updates = handle.subscribe();

    let snapshot = wait_until(&mut updates, |s| s.violations.count == 2).await;
    assert_eq!(snapshot.state, SessionState::Active);
    assert_eq!(
        snapshot.warning(WarningChannel::Proctoring),
        Some("Head turned right.")
    );
    assert_eq!(
        snapshot.violation_indicator().as_deref(),
        Some("Proctoring Violations: 2/3")
    );

    tokio::time::sleep(Duration::from_secs(30)).await;
    let snapshot = handle.snapshot();
    assert_eq!(snapshot.violations.count, 2);
    assert!(!snapshot.violations.disqualified);
    assert_eq!(snapshot.state, SessionState::Active);
    assert_eq!(snapshot.warning(WarningChannel::Proctoring), None);
    assert!(detector.calls() > 3);

    handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn incomplete_submission_is_rejected_then_scored() {
    let handle = start_session(
        sample_quiz(),
        proctor_config(),
        devices(None, Arc::new(ScriptedDetector::default())),
    );

    assert_ok!(handle.select_answer(0, 1).await);
    let err = assert_err!(handle.submit().await);
    assert_eq!(err, SessionError::IncompleteSubmission { unanswered: vec![2] });
    assert_eq!(handle.snapshot().state, SessionState::Active);
    assert_err!(handle.review().await);

    assert_ok!(handle.select_answer(1, 1).await);
    let score = assert_ok!(handle.submit().await);
    assert_eq!(score, ScoreReport { correct: 1, total: 2 });

    let snapshot = handle.snapshot();
    assert_eq!(snapshot.state, SessionState::Submitted);
    assert_eq!(snapshot.score, Some(score));
    assert_eq!(snapshot.camera, CaptureStatus::Released);

    let review = assert_ok!(handle.review().await);
    assert_eq!(review[0].verdict, Verdict::Correct);
    assert_eq!(review[1].verdict, Verdict::Incorrect);
    assert_eq!(review[1].your_answer.as_deref(), Some("Rome"));
    assert_eq!(review[1].correct_answer.as_deref(), Some("Paris"));

    // 提交后不能再改答案或再次提交
    assert_err!(handle.select_answer(1, 0).await);
    assert_err!(handle.submit().await);

    handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn selecting_out_of_range_is_rejected() {
    let handle = start_session(
        sample_quiz(),
        proctor_config(),
        devices(None, Arc::new(ScriptedDetector::default())),
    );

    assert_eq!(
        handle.select_answer(5, 0).await,
        Err(SessionError::QuestionOutOfRange { index: 5, len: 2 })
    );
    assert_eq!(
        handle.select_answer(0, 4).await,
        Err(SessionError::OptionOutOfRange { index: 4, len: 4 })
    );
    assert_eq!(handle.snapshot().answered, 0);

    // 重新选择覆盖之前的答案
    assert_ok!(handle.select_answer(0, 0).await);
    assert_ok!(handle.select_answer(0, 2).await);
    assert_eq!(handle.snapshot().answered, 1);

    handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn ending_requires_confirmation() {
    let camera = Arc::new(FakeCamera::granted());
    let probe = Arc::clone(&camera.probe);
    let handle = start_session(
        sample_quiz(),
        proctor_config(),
        devices(Some(camera), Arc::new(ScriptedDetector::default())),
    );
    let mut updates = handle.subscribe();
    wait_until(&mut updates, |s| s.camera == CaptureStatus::Live).await;

    assert_eq!(handle.confirm_end().await, Err(SessionError::EndNotRequested));

    assert_ok!(handle.request_end().await);
    assert!(handle.snapshot().end_confirmation_pending);
    assert_ok!(handle.cancel_end().await);
    let snapshot = handle.snapshot();
    assert!(!snapshot.end_confirmation_pending);
    assert_eq!(snapshot.state, SessionState::Active);

    assert_ok!(handle.request_end().await);
    assert_ok!(handle.confirm_end().await);
    let snapshot = handle.snapshot();
    assert_eq!(snapshot.state, SessionState::Ended);
    assert_eq!(snapshot.score, None);
    assert!(!snapshot.end_confirmation_pending);
    assert_eq!(snapshot.camera, CaptureStatus::Released);
    assert!(handle.exit_requested());
    assert_eq!(probe.released(), 1);

    handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn acknowledge_only_after_disqualification() {
    let handle = start_session(
        sample_quiz(),
        proctor_config(),
        devices(None, Arc::new(ScriptedDetector::default())),
    );

    let err = assert_err!(handle.acknowledge_disqualification().await);
    assert_eq!(
        err,
        SessionError::InvalidTransition {
            state: "Active",
            action: "acknowledge_disqualification"
        }
    );
    assert!(!handle.exit_requested());

    handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn denied_camera_degrades_to_focus_monitoring() {
    let camera = Arc::new(FakeCamera::denied());
    let detector = Arc::new(ScriptedDetector::default());
    let handle = start_session(
        sample_quiz(),
        proctor_config(),
        devices(Some(camera), detector.clone()),
    );
    let mut updates = handle.subscribe();

    let snapshot = wait_until(&mut updates, |s| s.state == SessionState::Active).await;
    assert!(matches!(snapshot.camera, CaptureStatus::Unavailable(_)));

    tokio::time::sleep(Duration::from_secs(20)).await;
    assert_eq!(detector.calls(), 0);

    assert_ok!(handle.select_answer(0, 1).await);
    assert_ok!(handle.select_answer(1, 0).await);
    let score = assert_ok!(handle.submit().await);
    assert_eq!(score, ScoreReport { correct: 2, total: 2 });

    handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn late_grant_after_timeout_still_starts_proctoring() {
    let camera = Arc::new(FakeCamera::delayed(Duration::from_secs(20)));
    let detector = Arc::new(ScriptedDetector::new([Ok(vec![])]));
    let handle = start_session(
        sample_quiz(),
        proctor_config(),
        devices(Some(camera), detector.clone()),
    );
    let mut updates = handle.subscribe();

    // 超时后先开放答题，申请仍在等待
    let snapshot = wait_until(&mut updates, |s| s.state == SessionState::Active).await;
    assert_eq!(snapshot.camera, CaptureStatus::Acquiring);
    assert_ok!(handle.select_answer(0, 1).await);

    wait_until(&mut updates, |s| s.camera == CaptureStatus::Live).await;
    let snapshot = wait_until(&mut updates, |s| s.violations.count == 1).await;
    assert_eq!(
        snapshot.warning(WarningChannel::Proctoring),
        Some("No face detected. Please stay in front of the camera.")
    );
    assert!(detector.calls() > 0);

    handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn late_grant_after_submission_is_released() {
    let camera = Arc::new(FakeCamera::delayed(Duration::from_secs(60)));
    let probe = Arc::clone(&camera.probe);
    let detector = Arc::new(ScriptedDetector::default());
    let handle = start_session(
        sample_quiz(),
        proctor_config(),
        devices(Some(camera), detector.clone()),
    );
    let mut updates = handle.subscribe();
    wait_until(&mut updates, |s| s.state == SessionState::Active).await;

    assert_ok!(handle.select_answer(0, 1).await);
    assert_ok!(handle.select_answer(1, 0).await);
    assert_ok!(handle.submit().await);
    assert_eq!(handle.snapshot().camera, CaptureStatus::Released);
    assert_eq!(probe.cancelled(), 1);

    tokio::time::sleep(Duration::from_secs(90)).await;
    assert_eq!(probe.acquired(), 1);
    assert_eq!(probe.released(), 1);
    assert_eq!(detector.calls(), 0);

    handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn submit_replies_after_tracks_are_stopped() {
    let camera = Arc::new(FakeCamera::granted().slow_release(Duration::from_secs(2)));
    let probe = Arc::clone(&camera.probe);
    let handle = start_session(
        sample_quiz(),
        proctor_config(),
        devices(Some(camera), Arc::new(ScriptedDetector::default())),
    );
    let mut updates = handle.subscribe();
    wait_until(&mut updates, |s| s.camera == CaptureStatus::Live).await;

    assert_ok!(handle.select_answer(0, 1).await);
    assert_ok!(handle.select_answer(1, 0).await);
    assert_ok!(handle.submit().await);
    assert_eq!(probe.released(), 1);
    assert_eq!(handle.snapshot().camera, CaptureStatus::Released);

    handle.shutdown().await;
    assert_eq!(probe.released(), 1);
}

#[tokio::test(start_paused = true)]
async fn visibility_polling_stops_after_submission() {
    let source = PollingSource::default();
    let polls = Arc::clone(&source.polls);
    let devices = ProctorDevices {
        camera: None,
        detector: Arc::new(ScriptedDetector::default()),
        visibility: Some(Box::new(source)),
    };
    let handle = start_session(sample_quiz(), proctor_config(), devices);

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert!(polls.load(Ordering::SeqCst) > 0);

    assert_ok!(handle.select_answer(0, 1).await);
    assert_ok!(handle.select_answer(1, 0).await);
    assert_ok!(handle.submit().await);
    let after_submit = polls.load(Ordering::SeqCst);

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(polls.load(Ordering::SeqCst), after_submit);

    handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn repeated_tab_switch_shows_one_warning_then_clears() {
    let (devices, visibility) =
        devices_with_visibility(None, Arc::new(ScriptedDetector::default()));
    let handle = start_session(sample_quiz(), proctor_config(), devices);
    let mut updates = handle.subscribe();

    visibility.send(VisibilityEvent::Hidden).unwrap();
    wait_until(&mut updates, |s| s.warning(WarningChannel::FocusLoss) == Some(TAB_MESSAGE)).await;

    visibility.send(VisibilityEvent::Visible).unwrap();
    visibility.send(VisibilityEvent::Hidden).unwrap();
    visibility.send(VisibilityEvent::Blur).unwrap();
    let snapshot = wait_until(&mut updates, |s| {
        s.warning(WarningChannel::FocusLoss) == Some(WINDOW_SWITCH_MESSAGE)
    })
    .await;
    assert_eq!(snapshot.warnings.len(), 1);
    // 默认只提示不计数
    assert_eq!(snapshot.violations.count, 0);

    visibility.send(VisibilityEvent::Focus).unwrap();
    tokio::time::sleep(Duration::from_secs(9)).await;
    assert!(handle.snapshot().warning(WarningChannel::FocusLoss).is_some());

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert!(handle.snapshot().warnings.is_empty());
    assert_eq!(handle.snapshot().state, SessionState::Active);

    handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn focus_loss_can_count_once_per_episode() {
    let mut config = proctor_config();
    config.count_focus_loss_as_violation = true;
    config.violation_threshold = 2;

    let (devices, visibility) =
        devices_with_visibility(None, Arc::new(ScriptedDetector::default()));
    let handle = start_session(sample_quiz(), config, devices);
    let mut updates = handle.subscribe();

    // hidden 和 blur 属于同一次离开
    visibility.send(VisibilityEvent::Hidden).unwrap();
    visibility.send(VisibilityEvent::Blur).unwrap();
    let snapshot = wait_until(&mut updates, |s| {
        s.warning(WarningChannel::FocusLoss) == Some(WINDOW_SWITCH_MESSAGE)
    })
    .await;
    assert_eq!(snapshot.violations.count, 1);

    visibility.send(VisibilityEvent::Visible).unwrap();
    visibility.send(VisibilityEvent::Hidden).unwrap();
    let snapshot = wait_until(&mut updates, |s| s.state == SessionState::Disqualified).await;
    assert_eq!(snapshot.violations.count, 2);
    assert!(snapshot.warnings.is_empty());

    // 取消资格后切屏监听已停止，事件可能直接发送失败
    let _ = visibility.send(VisibilityEvent::Visible);
    let _ = visibility.send(VisibilityEvent::Hidden);
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(handle.snapshot().violations.count, 2);
    assert!(handle.snapshot().warnings.is_empty());

    handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn dropping_handle_releases_camera() {
    let camera = Arc::new(FakeCamera::granted());
    let probe = Arc::clone(&camera.probe);
    let handle = start_session(
        sample_quiz(),
        proctor_config(),
        devices(Some(camera), Arc::new(ScriptedDetector::default())),
    );
    let mut updates = handle.subscribe();
    wait_until(&mut updates, |s| s.camera == CaptureStatus::Live).await;

    drop(handle);
    let snapshot = wait_until(&mut updates, |s| s.camera == CaptureStatus::Released).await;
    assert_eq!(snapshot.state, SessionState::Active);
    assert_eq!(probe.released(), 1);
}
