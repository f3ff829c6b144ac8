use std::panic::AssertUnwindSafe;

use futures::FutureExt;
use tokio_util::sync::CancellationToken;

use crate::resolver::Handle;
use crate::runtime::token::scoped;

/// Options for `Container::shutdown`.
#[derive(Debug, Clone, Default)]
pub struct ShutdownOptions {
    parent: Option<CancellationToken>,
}

impl ShutdownOptions {
    /// Derive the shutdown scope from `parent` (typically a deadline-bound token)
    /// instead of the root.
    pub fn with_parent(mut self, parent: CancellationToken) -> Self {
        self.parent = Some(parent);
        self
    }

    pub(crate) fn parent(&self) -> Option<&CancellationToken> {
        self.parent.as_ref()
    }
}

/// Release shutdown-capable components last-constructed first, one at a time,
/// then cancel the root token.
pub(crate) async fn shutdown_all(
    root: &CancellationToken,
    shutdowners: &[Handle],
    parent: Option<&CancellationToken>,
) {
    let scope = scoped(root, parent);
    tracing::info!(components = shutdowners.len(), "Phase: shutdown");

    for handle in shutdowners.iter().rev() {
        let Some(component) = handle.component.as_shutdownable() else {
            continue;
        };
        tracing::debug!(kind = %handle.kind, "Shutting down component");
        let stopped = AssertUnwindSafe(component.shutdown(scope.clone()))
            .catch_unwind()
            .await;
        if stopped.is_err() {
            tracing::warn!(kind = %handle.kind, "Component panicked during shutdown");
        }
    }

    scope.cancel();
    root.cancel();
    tracing::info!("Root token cancelled");
}
