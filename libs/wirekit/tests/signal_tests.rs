//! OS signals delivered through the container's interrupt source.
#![cfg(unix)]

use std::time::Duration;

use wirekit::{Container, Lifecycle, Signal, ShutdownOptions};

fn raise(signal: &str) {
    let status = std::process::Command::new("sh")
        .arg("-c")
        .arg(format!("kill -{signal} {}", std::process::id()))
        .status()
        .unwrap();
    assert!(status.success());
}

#[tokio::test]
async fn signal_sent_right_after_build_cancels_root() {
    let container = Container::builder()
        .with_signals([Signal::User1])
        .build()
        .await
        .unwrap();

    // Delivered before the runtime gets a chance to poll the watcher.
    raise("USR1");

    tokio::time::timeout(Duration::from_secs(5), container.token().cancelled())
        .await
        .expect("root token follows SIGUSR1");
    assert_eq!(container.state(), Lifecycle::Ready);

    container.shutdown(ShutdownOptions::default()).await;
    assert_eq!(container.state(), Lifecycle::ShutDown);
}
