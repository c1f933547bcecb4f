//! Integration tests for concurrent sessions sharing one output directory.

use headless_swarm::models::session::SessionStatus;
use tokio_util::sync::CancellationToken;

use super::test_helpers::{cat, Workspace, REST_API_STREAM};

#[tokio::test]
async fn concurrent_sessions_keep_separate_artifacts() {
    let ws = Workspace::setup();
    let stream = ws.fixture("stream.jsonl", REST_API_STREAM);
    let config = ws.config(&cat(&stream));

    let (runner_a, session_a, execution_a) = ws.prepare(&config, "first swarm", true);
    let (runner_b, session_b, execution_b) = ws.prepare(&config, "second swarm", true);
    assert_ne!(session_a.id, session_b.id);

    let (report_a, report_b) = tokio::join!(
        runner_a.run(&session_a, execution_a, CancellationToken::new()),
        runner_b.run(&session_b, execution_b, CancellationToken::new()),
    );
    let report_a = report_a.expect("first run");
    let report_b = report_b.expect("second run");

    for report in [&report_a, &report_b] {
        assert_eq!(report.session.status, SessionStatus::Complete);
        assert_eq!(report.summary.agents.len(), 2);
        let captured = std::fs::read_to_string(&report.session.paths.output).expect("capture");
        assert_eq!(captured, REST_API_STREAM);
    }
    assert_ne!(report_a.session.paths.output, report_b.session.paths.output);
    assert_ne!(report_a.session.paths.summary, report_b.session.paths.summary);

    let listed = runner_a.tracker().list().expect("list");
    assert_eq!(listed.len(), 2);
    assert!(listed
        .iter()
        .all(|session| session.status == SessionStatus::Complete));
}
