//! Integration tests for explicit cancellation and session timeouts.

use std::time::{Duration, Instant};

use headless_swarm::models::session::{ErrorKind, SessionStatus};
use tokio_util::sync::CancellationToken;

use super::test_helpers::{cat, Workspace, REST_API_STREAM, TEST_DEADLINE};

/// Emits the scenario stream, then hangs.
fn hanging_script(ws: &Workspace) -> String {
    let stream = ws.fixture("stream.jsonl", REST_API_STREAM);
    format!("{}; exec sleep 30", cat(&stream))
}

#[tokio::test]
async fn timeout_fails_session_and_keeps_partial_summary() {
    let ws = Workspace::setup();
    let mut config = ws.config(&hanging_script(&ws));
    config.session_timeout_seconds = 1;
    let (runner, session, execution) = ws.prepare(&config, "Build a REST API", true);

    let started = Instant::now();
    let report = tokio::time::timeout(
        TEST_DEADLINE,
        runner.run(&session, execution, CancellationToken::new()),
    )
    .await
    .expect("runner honours its timeout")
    .expect("run returns a report");

    assert!(started.elapsed() < Duration::from_secs(15));
    assert_eq!(report.session.status, SessionStatus::Failed);
    assert_eq!(report.exit_code(), 1);
    assert!(report
        .session
        .errors
        .iter()
        .any(|err| err.kind == ErrorKind::Cancelled && err.message.contains("time limit")));
    assert_eq!(report.summary.agents.len(), 2);
    assert_eq!(report.summary.tasks.len(), 1);
    assert!(report.summary.finalized);
    assert!(report.session.paths.summary.exists());
}

#[tokio::test]
async fn explicit_cancel_terminates_collaborator() {
    let ws = Workspace::setup();
    let config = ws.config(&hanging_script(&ws));
    let (runner, session, execution) = ws.prepare(&config, "Build a REST API", true);

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(500)).await;
        trigger.cancel();
    });

    let report = tokio::time::timeout(TEST_DEADLINE, runner.run(&session, execution, cancel))
        .await
        .expect("cancellation is prompt")
        .expect("run returns a report");

    assert_eq!(report.session.status, SessionStatus::Failed);
    assert!(report
        .session
        .errors
        .iter()
        .any(|err| err.kind == ErrorKind::Cancelled && err.message == "session cancelled"));
    assert_eq!(report.summary.agents.len(), 2);
    assert_eq!(
        runner.tracker().status(&session.id).expect("record").status,
        SessionStatus::Failed
    );
}

#[tokio::test]
async fn already_cancelled_token_stops_immediately() {
    let ws = Workspace::setup();
    let config = ws.config("exec sleep 30");
    let (runner, session, execution) = ws.prepare(&config, "Build a REST API", true);

    let cancel = CancellationToken::new();
    cancel.cancel();

    let report = tokio::time::timeout(TEST_DEADLINE, runner.run(&session, execution, cancel))
        .await
        .expect("cancellation is prompt")
        .expect("run returns a report");

    assert_eq!(report.session.status, SessionStatus::Failed);
    assert!(report.summary.is_empty());
    assert!(report
        .session
        .errors
        .iter()
        .any(|err| err.kind == ErrorKind::Cancelled));
}

#[tokio::test]
async fn cancelled_session_records_the_exit_code_seen_during_shutdown() {
    let ws = Workspace::setup();
    let stream = ws.fixture("stream.jsonl", REST_API_STREAM);
    let script = format!(
        "trap 'exit 7' TERM; {}; while :; do sleep 0.1; done",
        cat(&stream)
    );
    let config = ws.config(&script);
    let (runner, session, execution) = ws.prepare(&config, "Build a REST API", true);

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(500)).await;
        trigger.cancel();
    });

    let report = tokio::time::timeout(TEST_DEADLINE, runner.run(&session, execution, cancel))
        .await
        .expect("cancellation is prompt")
        .expect("run returns a report");

    assert_eq!(report.session.status, SessionStatus::Failed);
    assert_eq!(report.session.exit_code, Some(7));
    assert_eq!(
        runner.tracker().status(&session.id).expect("record").exit_code,
        Some(7)
    );
}
