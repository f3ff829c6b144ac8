use std::panic::AssertUnwindSafe;

use futures::FutureExt;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::errors::RunError;
use crate::resolver::Handle;
use crate::runtime::token::scoped;

type ErrorObserver = Box<dyn FnMut(&CancellationToken, &anyhow::Error) + Send>;

/// Options for `Container::run`.
#[derive(Default)]
pub struct RunOptions {
    parent: Option<CancellationToken>,
    observer: Option<ErrorObserver>,
}

impl RunOptions {
    /// Derive the run scope from `parent` instead of the root.
    /// Root cancellation still reaches the runners.
    pub fn with_parent(mut self, parent: CancellationToken) -> Self {
        self.parent = Some(parent);
        self
    }

    /// Called once per failure after the first, in completion order, with the
    /// run's parent scope token.
    pub fn on_error<F>(mut self, observer: F) -> Self
    where
        F: FnMut(&CancellationToken, &anyhow::Error) + Send + 'static,
    {
        self.observer = Some(Box::new(observer));
        self
    }
}

impl std::fmt::Debug for RunOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunOptions")
            .field("parent", &self.parent)
            .field("observer", &self.observer.is_some())
            .finish()
    }
}

/// Drive every runner concurrently. The first failure cancels the shared
/// runner token; the rest are collected once every task has returned.
pub(crate) async fn run_all(
    root: &CancellationToken,
    runners: &[Handle],
    options: RunOptions,
) -> Result<(), RunError> {
    let RunOptions {
        parent,
        mut observer,
    } = options;

    let scope = scoped(root, parent.as_ref());
    let _scope_guard = scope.clone().drop_guard();

    if runners.is_empty() {
        tracing::info!("Phase: run (no runners)");
        return Ok(());
    }

    let cancel = scope.child_token();
    let mut tasks = JoinSet::new();

    tracing::info!(runners = runners.len(), "Phase: run");
    for handle in runners {
        let Handle { kind, component } = handle.clone();
        let cancel = cancel.clone();
        tasks.spawn(async move {
            let Some(runnable) = component.as_runnable() else {
                return (kind, Ok(()));
            };
            let result = match AssertUnwindSafe(runnable.run(cancel)).catch_unwind().await {
                Ok(result) => result,
                Err(panic) => Err(anyhow::anyhow!(
                    "runner '{kind}' panicked: {}",
                    panic_message(panic.as_ref())
                )),
            };
            (kind, result)
        });
        tracing::debug!(kind = %kind, "Runner started");
    }

    let mut primary: Option<anyhow::Error> = None;
    let mut secondary = Vec::new();

    while let Some(joined) = tasks.join_next().await {
        let err = match joined {
            Ok((kind, Ok(()))) => {
                tracing::debug!(kind = %kind, "Runner finished");
                continue;
            }
            Ok((kind, Err(err))) => {
                tracing::warn!(kind = %kind, error = %format!("{err:#}"), "Runner failed");
                err
            }
            Err(join_err) => {
                tracing::warn!(error = %join_err, "Runner task aborted");
                anyhow::anyhow!("runner task did not complete: {join_err}")
            }
        };

        if primary.is_none() {
            tracing::info!("First runner failure; cancelling remaining runners");
            cancel.cancel();
            primary = Some(err);
        } else {
            secondary.push(err);
        }
    }

    let Some(primary) = primary else {
        tracing::info!("All runners finished");
        return Ok(());
    };

    if let Some(observer) = observer.as_mut() {
        for err in &secondary {
            observer(&scope, err);
        }
    }

    Err(RunError::new(primary, secondary))
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> &str {
    panic
        .downcast_ref::<&'static str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}
