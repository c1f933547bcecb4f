//! Integration tests for headless session outcomes.
//!
//! Validates:
//! - a successful orchestration run ends `complete` with its summary
//! - a missing collaborator binary fails the launch before `running`
//! - a non-zero exit keeps the partial summary
//! - a clean exit without orchestration output is `failed`
//! - malformed lines are recorded and skipped

use headless_swarm::models::session::{ErrorKind, SessionStatus};
use headless_swarm::AppError;
use tokio_util::sync::CancellationToken;

use super::test_helpers::{cat, Workspace, REST_API_STREAM, TEST_DEADLINE};

#[tokio::test]
async fn rest_api_scenario_completes() {
    let ws = Workspace::setup();
    let stream = ws.fixture("stream.jsonl", REST_API_STREAM);
    let config = ws.config(&format!("{}; exit 0", cat(&stream)));
    let (runner, session, execution) = ws.prepare(&config, "Build a REST API", true);

    let report = tokio::time::timeout(
        TEST_DEADLINE,
        runner.run(&session, execution, CancellationToken::new()),
    )
    .await
    .expect("within deadline")
    .expect("run succeeds");

    assert_eq!(report.session.status, SessionStatus::Complete);
    assert_eq!(report.exit_code(), 0);
    assert_eq!(report.session.exit_code, Some(0));
    assert!(report.session.errors.is_empty(), "{:?}", report.session.errors);
    assert_eq!(report.summary.agents.len(), 2);
    assert_eq!(report.summary.tasks.len(), 1);
    assert!(report.summary.finalized);

    let paths = &report.session.paths;
    let captured = std::fs::read_to_string(&paths.output).expect("stream capture");
    assert_eq!(captured, REST_API_STREAM);
    assert!(paths.error_log.exists());
    assert!(paths.mcp_config.exists());

    let persisted = runner.tracker().summary(&session.id).expect("summary file");
    assert_eq!(persisted, report.summary);
    assert_eq!(
        runner.tracker().status(&session.id).expect("record").status,
        SessionStatus::Complete
    );
}

#[tokio::test]
async fn missing_binary_fails_before_running() {
    let ws = Workspace::setup();
    let mut config = ws.config("exit 0");
    config.host_cli = "/nonexistent/headless-swarm-agent".into();
    let (runner, session, execution) = ws.prepare(&config, "Build a REST API", true);

    let result = runner.run(&session, execution, CancellationToken::new()).await;
    assert!(matches!(result, Err(AppError::Launch(_))), "{result:?}");

    let record = runner.tracker().status(&session.id).expect("record");
    assert_eq!(record.status, SessionStatus::Failed);
    assert_eq!(record.status.exit_code(), 1);
    assert_eq!(record.errors.len(), 1);
    assert_eq!(record.errors[0].kind, ErrorKind::Launch);
    assert!(!record.paths.output.exists());
    assert!(runner.tracker().summary(&session.id).expect("summary").is_empty());
}

#[tokio::test]
async fn non_zero_exit_keeps_partial_summary() {
    let ws = Workspace::setup();
    let stream = ws.fixture("stream.jsonl", REST_API_STREAM);
    let config = ws.config(&format!("{}; exit 3", cat(&stream)));
    let (runner, session, execution) = ws.prepare(&config, "Build a REST API", true);

    let report = runner
        .run(&session, execution, CancellationToken::new())
        .await
        .expect("run returns a report");

    assert_eq!(report.session.status, SessionStatus::Failed);
    assert_eq!(report.session.exit_code, Some(3));
    assert_eq!(report.exit_code(), 1);
    assert_eq!(report.summary.agents.len(), 2);
    assert!(report
        .session
        .errors
        .iter()
        .any(|err| err.kind == ErrorKind::Process && err.message.contains("code 3")));
}

#[tokio::test]
async fn clean_exit_without_output_is_empty_output_failure() {
    let ws = Workspace::setup();
    let config = ws.config("exit 0");
    let (runner, session, execution) = ws.prepare(&config, "Build a REST API", true);

    let report = runner
        .run(&session, execution, CancellationToken::new())
        .await
        .expect("run returns a report");

    assert_eq!(report.session.status, SessionStatus::Failed);
    assert_eq!(report.session.exit_code, Some(0));
    assert!(report
        .session
        .errors
        .iter()
        .any(|err| err.kind == ErrorKind::EmptyOutput));
    assert!(report.summary.is_empty());
}

#[tokio::test]
async fn untracked_tool_calls_alone_are_empty_output() {
    let ws = Workspace::setup();
    let stream = ws.fixture(
        "stream.jsonl",
        "{\"type\":\"tool_call\",\"tool\":\"mcp__claude-flow__swarm_status\"}\n",
    );
    let config = ws.config(&cat(&stream));
    let (runner, session, execution) = ws.prepare(&config, "status", true);

    let report = runner
        .run(&session, execution, CancellationToken::new())
        .await
        .expect("run returns a report");

    assert_eq!(report.session.status, SessionStatus::Failed);
    assert_eq!(report.summary.tool_call_count, 1);
    assert!(report
        .session
        .errors
        .iter()
        .any(|err| err.kind == ErrorKind::EmptyOutput));
}

#[tokio::test]
async fn malformed_line_is_recorded_and_skipped() {
    let ws = Workspace::setup();
    let body = format!("{REST_API_STREAM}{{\"type\":\"tool_call\",\n{REST_API_STREAM}");
    let stream = ws.fixture("stream.jsonl", &body);
    let config = ws.config(&cat(&stream));
    let (runner, session, execution) = ws.prepare(&config, "Build a REST API", true);

    let report = runner
        .run(&session, execution, CancellationToken::new())
        .await
        .expect("run returns a report");

    assert_eq!(report.session.status, SessionStatus::Complete);
    assert_eq!(report.summary.agents.len(), 4);
    assert_eq!(report.summary.tasks.len(), 2);
    assert_eq!(report.summary.parse_errors.len(), 1);
    assert_eq!(report.summary.parse_errors[0].line, 5);
    let parse_errors: Vec<_> = report
        .session
        .errors
        .iter()
        .filter(|err| err.kind == ErrorKind::Parse)
        .collect();
    assert_eq!(parse_errors.len(), 1);
}

#[tokio::test]
async fn task_reaches_stdin_and_session_id_reaches_environment() {
    let ws = Workspace::setup();
    let stream = ws.fixture("stream.jsonl", REST_API_STREAM);
    let task_out = ws.root.join("received-task.txt");
    let env_out = ws.root.join("received-id.txt");
    let script = format!(
        "cat > '{}'; printf '%s' \"$SWARM_SESSION_ID\" > '{}'; {}",
        task_out.display(),
        env_out.display(),
        cat(&stream)
    );
    let config = ws.config(&script);
    let (runner, session, execution) = ws.prepare(&config, "Build a REST API\nwith auth", true);

    let report = runner
        .run(&session, execution, CancellationToken::new())
        .await
        .expect("run returns a report");

    assert_eq!(report.session.status, SessionStatus::Complete);
    assert_eq!(
        std::fs::read_to_string(&task_out).expect("task"),
        "Build a REST API\nwith auth"
    );
    assert_eq!(std::fs::read_to_string(&env_out).expect("id"), session.id);
}

#[tokio::test]
async fn stderr_is_captured_in_error_log() {
    let ws = Workspace::setup();
    let stream = ws.fixture("stream.jsonl", REST_API_STREAM);
    let config = ws.config(&format!("echo 'warning: slow tools' >&2; {}", cat(&stream)));
    let (runner, session, execution) = ws.prepare(&config, "Build a REST API", true);

    let report = runner
        .run(&session, execution, CancellationToken::new())
        .await
        .expect("run returns a report");

    let log = std::fs::read_to_string(&report.session.paths.error_log).expect("error log");
    assert!(log.contains("warning: slow tools"), "{log}");
}
