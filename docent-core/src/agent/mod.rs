//! The solver/verifier orchestration loop and its event model.

pub mod context;
pub mod events;
pub mod orchestrator;
pub mod solver;
pub mod verifier;

pub use context::{AgentMode, AgentRequestContext};
pub use events::{AgentEvent, AgentStage, AgentVisibility};
pub use orchestrator::{AgentRun, Orchestrator};
pub use solver::SolverAgent;
pub use verifier::{VerificationResult, VerifierAgent};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Publishes events into one run's channel, going quiet once the run is
/// cancelled. Cheap to clone; each run has exactly one underlying channel.
#[derive(Clone)]
pub(crate) struct EventPublisher {
    tx: mpsc::Sender<AgentEvent>,
    cancel: CancellationToken,
}

impl EventPublisher {
    pub(crate) fn new(tx: mpsc::Sender<AgentEvent>, cancel: CancellationToken) -> Self {
        Self { tx, cancel }
    }

    pub(crate) async fn publish(&self, event: AgentEvent) {
        if self.cancel.is_cancelled() {
            return;
        }
        // A dropped receiver means the caller went away; nothing to do.
        let _ = self.tx.send(event).await;
    }
}
