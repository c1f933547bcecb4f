//! Orchestration-state reconstructor.
//!
//! A strictly sequential fold of [`ReaderMessage`]s into an
//! [`OrchestrationSummary`]. No locking: each session owns its own
//! reconstructor and feeds it from a single channel.

use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::models::summary::OrchestrationSummary;
use crate::stream::reader::ReaderMessage;

/// Incremental summary builder for one session.
#[derive(Debug, Clone)]
pub struct Reconstructor {
    session_id: String,
    summary: OrchestrationSummary,
}

impl Reconstructor {
    /// Start an empty summary for `session_id`.
    #[must_use]
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            summary: OrchestrationSummary::default(),
        }
    }

    /// Fold one message into the summary. Ignored after finalization.
    pub fn apply(&mut self, message: ReaderMessage) {
        let accepted = match message {
            ReaderMessage::Event { line, event } => {
                trace!(session_id = self.session_id, line, ?event, "event recorded");
                self.summary.record(event)
            }
            ReaderMessage::Malformed { line, error } => {
                debug!(session_id = self.session_id, line, error, "malformed line recorded");
                self.summary.record_parse_error(line, error)
            }
        };
        if !accepted {
            debug!(
                session_id = self.session_id,
                "summary already finalized, dropping message"
            );
        }
    }

    /// Summary accumulated so far.
    #[must_use]
    pub fn summary(&self) -> &OrchestrationSummary {
        &self.summary
    }

    /// `true` once [`finalize`](Self::finalize) has run.
    #[must_use]
    pub fn is_finalized(&self) -> bool {
        self.summary.finalized
    }

    /// Freeze and return the summary. Repeated calls return the same value.
    pub fn finalize(&mut self) -> OrchestrationSummary {
        self.summary.finalize();
        self.summary.clone()
    }

    /// Drain `rx` until every sender is dropped, then finalize.
    pub async fn consume(&mut self, rx: &mut mpsc::Receiver<ReaderMessage>) -> OrchestrationSummary {
        while let Some(message) = rx.recv().await {
            self.apply(message);
        }
        self.finalize()
    }
}

/// Fold a complete message sequence into a finalized summary.
#[must_use]
pub fn fold<I>(session_id: &str, messages: I) -> OrchestrationSummary
where
    I: IntoIterator<Item = ReaderMessage>,
{
    let mut reconstructor = Reconstructor::new(session_id);
    for message in messages {
        reconstructor.apply(message);
    }
    reconstructor.finalize()
}
