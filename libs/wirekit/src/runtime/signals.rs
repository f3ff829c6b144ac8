//! Interrupt wiring for the container's root token.
//!
//! The container subscribes once at build time. Signal listeners are installed
//! before `subscribe` returns; only the wait runs on a spawned watcher task,
//! which cancels the root when the interrupt fires and exits once the root is
//! cancelled.
//!
//! Exiting the watcher does not restore the default disposition of the
//! subscribed signals: the runtime keeps its handlers for the rest of the
//! process, so a later SIGTERM or SIGHUP is swallowed rather than fatal.

use std::fmt;
use std::future::Future;
use std::pin::Pin;

#[cfg(unix)]
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

/// OS signals that may cancel the root token, in addition to Ctrl+C.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Signal {
    Interrupt,
    Terminate,
    Hangup,
    Quit,
    User1,
    User2,
}

#[cfg(unix)]
impl Signal {
    fn unix_kind(self) -> tokio::signal::unix::SignalKind {
        use tokio::signal::unix::SignalKind;
        match self {
            Signal::Interrupt => SignalKind::interrupt(),
            Signal::Terminate => SignalKind::terminate(),
            Signal::Hangup => SignalKind::hangup(),
            Signal::Quit => SignalKind::quit(),
            Signal::User1 => SignalKind::user_defined1(),
            Signal::User2 => SignalKind::user_defined2(),
        }
    }
}

/// What cancels the container's root token from the outside.
pub enum InterruptSource {
    /// Ctrl+C plus the listed signals.
    Signals(Vec<Signal>),
    /// An external token controls the lifecycle.
    Token(CancellationToken),
    /// An arbitrary future; when it completes the root is cancelled.
    Future(Pin<Box<dyn Future<Output = ()> + Send>>),
    /// Only explicit shutdown (or dropping the container) cancels the root.
    Disabled,
}

impl Default for InterruptSource {
    fn default() -> Self {
        InterruptSource::Signals(Vec::new())
    }
}

impl fmt::Debug for InterruptSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InterruptSource::Signals(extra) => f.debug_tuple("Signals").field(extra).finish(),
            InterruptSource::Token(_) => f.write_str("Token"),
            InterruptSource::Future(_) => f.write_str("Future"),
            InterruptSource::Disabled => f.write_str("Disabled"),
        }
    }
}

/// Subscribe `root` to `source`. Listeners exist when this returns; the wait
/// itself runs on a spawned task.
pub(crate) fn subscribe(root: &CancellationToken, source: InterruptSource) {
    let root = root.clone();
    match source {
        InterruptSource::Disabled => {
            tracing::debug!("interrupt: disabled, root token is cancelled by shutdown only");
        }
        InterruptSource::Token(token) => {
            tokio::spawn(async move {
                tokio::select! {
                    _ = token.cancelled() => {
                        tracing::info!("interrupt: external token cancelled");
                        root.cancel();
                    }
                    _ = root.cancelled() => {}
                }
            });
        }
        InterruptSource::Future(waiter) => {
            tokio::spawn(async move {
                tokio::select! {
                    _ = waiter => {
                        tracing::info!("interrupt: external future completed");
                        root.cancel();
                    }
                    _ = root.cancelled() => {}
                }
            });
        }
        InterruptSource::Signals(extra) => {
            let listeners = Listeners::install(extra);
            tokio::spawn(async move {
                tokio::select! {
                    signal = listeners.recv() => {
                        tracing::info!(?signal, "interrupt: signal received");
                        root.cancel();
                    }
                    _ = root.cancelled() => {}
                }
            });
        }
    }
}

/// OS signal streams registered with the runtime. Deliveries between
/// `install` and the first `recv` are kept by the streams.
struct Listeners {
    #[cfg(unix)]
    streams: Vec<(Signal, tokio::signal::unix::Signal)>,
    #[cfg(windows)]
    ctrl_c: Option<tokio::signal::windows::CtrlC>,
}

impl Listeners {
    /// Ctrl+C (SIGINT) is always included. Failed installs are logged and skipped.
    #[cfg(unix)]
    fn install(extra: Vec<Signal>) -> Self {
        let mut streams = Vec::new();
        let mut seen = Vec::new();
        for signal in std::iter::once(Signal::Interrupt).chain(extra) {
            if seen.contains(&signal) {
                continue;
            }
            seen.push(signal);
            match tokio::signal::unix::signal(signal.unix_kind()) {
                Ok(stream) => streams.push((signal, stream)),
                Err(e) => tracing::warn!(?signal, %e, "Failed to install signal handler; skipping"),
            }
        }
        Self { streams }
    }

    #[cfg(unix)]
    async fn recv(self) -> Signal {
        if self.streams.is_empty() {
            return std::future::pending().await;
        }
        let waits = self.streams.into_iter().map(|(signal, mut stream)| {
            async move {
                if stream.recv().await.is_none() {
                    return std::future::pending().await;
                }
                signal
            }
            .boxed()
        });
        futures::future::select_all(waits).await.0
    }

    #[cfg(windows)]
    fn install(extra: Vec<Signal>) -> Self {
        if extra.iter().any(|s| *s != Signal::Interrupt) {
            tracing::warn!(?extra, "Only Ctrl+C is supported on this platform; ignoring extra signals");
        }
        let ctrl_c = match tokio::signal::windows::ctrl_c() {
            Ok(listener) => Some(listener),
            Err(e) => {
                tracing::error!(%e, "Failed to install Ctrl+C handler");
                None
            }
        };
        Self { ctrl_c }
    }

    #[cfg(windows)]
    async fn recv(self) -> Signal {
        if let Some(mut ctrl_c) = self.ctrl_c {
            if ctrl_c.recv().await.is_some() {
                return Signal::Interrupt;
            }
        }
        std::future::pending().await
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn signal_names_are_lowercase() {
        let parsed: Vec<Signal> = serde_json::from_str(r#"["terminate", "hangup", "user1"]"#).unwrap();
        assert_eq!(parsed, vec![Signal::Terminate, Signal::Hangup, Signal::User1]);
        assert_eq!(serde_json::to_string(&Signal::Quit).unwrap(), r#""quit""#);
    }

    #[tokio::test]
    async fn external_token_cancels_root() {
        let root = CancellationToken::new();
        let external = CancellationToken::new();
        subscribe(&root, InterruptSource::Token(external.clone()));

        external.cancel();
        tokio::time::timeout(Duration::from_secs(1), root.cancelled())
            .await
            .expect("root follows external token");
    }

    #[tokio::test]
    async fn external_future_cancels_root() {
        let root = CancellationToken::new();
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        subscribe(
            &root,
            InterruptSource::Future(Box::pin(async move {
                let _ = rx.await;
            })),
        );

        assert!(!root.is_cancelled());
        tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(1), root.cancelled())
            .await
            .expect("root follows future");
    }

    #[cfg(unix)]
    fn raise(signal: &str) {
        let status = std::process::Command::new("sh")
            .arg("-c")
            .arg(format!("kill -{signal} {}", std::process::id()))
            .status()
            .unwrap();
        assert!(status.success());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn signal_right_after_subscribe_cancels_root() {
        let root = CancellationToken::new();
        subscribe(&root, InterruptSource::Signals(vec![Signal::User2, Signal::User2]));

        // No yield: the watcher task has not been polled yet.
        raise("USR2");
        tokio::time::timeout(Duration::from_secs(5), root.cancelled())
            .await
            .expect("root follows SIGUSR2");
    }

    #[tokio::test]
    async fn disabled_source_leaves_root_alone() {
        let root = CancellationToken::new();
        subscribe(&root, InterruptSource::Disabled);
        tokio::task::yield_now().await;
        assert!(!root.is_cancelled());
    }
}
