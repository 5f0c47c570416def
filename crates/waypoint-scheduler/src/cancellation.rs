use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use waypoint_types::RunId;

/// Per-run cancellation tokens. The teacher's own `tandem-core`
/// re-exports a `CancellationRegistry` with this name (see
/// `tandem-core::engine_loop::EngineLoop`'s `cancellations` field and
/// `tokio_util::sync::CancellationToken` import) but its source file
/// wasn't part of the retrieval pack; this reconstructs the idiom the
/// import implies: one `CancellationToken` per run, registered at start
/// and checked at checkpoint fences (spec.md §5).
#[derive(Clone, Default)]
pub struct CancellationRegistry {
    tokens: Arc<RwLock<HashMap<RunId, CancellationToken>>>,
}

impl CancellationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, run_id: RunId) -> CancellationToken {
        let token = CancellationToken::new();
        self.tokens.write().await.insert(run_id, token.clone());
        token
    }

    /// Signals cancellation by deleting the run's work claim (spec.md
    /// §5: "User cancellation is signaled by deleting the run's work
    /// claim").
    pub async fn cancel(&self, run_id: &RunId) -> bool {
        match self.tokens.write().await.remove(run_id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    pub async fn is_cancelled(&self, run_id: &RunId) -> bool {
        self.tokens
            .read()
            .await
            .get(run_id)
            .map(|token| token.is_cancelled())
            .unwrap_or(false)
    }
}
