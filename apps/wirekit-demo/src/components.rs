//! Components of the demo service: a health/stats HTTP endpoint and a heartbeat runner.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use parking_lot::Mutex;
use serde::Deserialize;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use wirekit::{component, FuncRunner, Module, Runnable, Shutdownable};
use wirekit_bootstrap::AppConfig;

/// Loaded application configuration, shared by every constructor that needs it.
#[derive(Clone)]
pub struct Settings(pub Arc<AppConfig>);

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HttpConfig {
    pub bind_addr: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8087".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HeartbeatConfig {
    pub interval_ms: u64,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self { interval_ms: 1000 }
    }
}

/// Heartbeat counter, exposed on `/stats`.
#[derive(Clone, Default)]
pub struct Beats(Arc<AtomicU64>);

impl Beats {
    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }

    fn bump(&self) -> u64 {
        self.0.fetch_add(1, Ordering::Relaxed) + 1
    }
}

component!(Settings, HttpConfig, HeartbeatConfig, Beats);

/// Tag for the heartbeat runner kind.
pub struct Heartbeat;

pub type HeartbeatRunner = FuncRunner<Heartbeat>;

/// HTTP endpoint. The socket is bound at construction so that a taken port
/// fails assembly instead of the run phase.
pub struct HttpServer {
    addr: SocketAddr,
    listener: Mutex<Option<TcpListener>>,
    router: Router,
    serving: AtomicBool,
}

impl HttpServer {
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn is_serving(&self) -> bool {
        self.serving.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Runnable for HttpServer {
    async fn run(&self, cancel: CancellationToken) -> anyhow::Result<()> {
        // Take the listener so the guard is dropped before awaits
        let stored = self.listener.lock().take();
        let listener = match stored {
            Some(listener) => listener,
            None => TcpListener::bind(self.addr)
                .await
                .with_context(|| format!("failed to re-bind {}", self.addr))?,
        };

        self.serving.store(true, Ordering::SeqCst);
        tracing::info!(addr = %self.addr, "HTTP server serving");

        let shutdown = async move {
            cancel.cancelled().await;
            tracing::info!("HTTP server shutting down gracefully (cancellation)");
        };

        let served = axum::serve(listener, self.router.clone())
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| anyhow::anyhow!(e));
        self.serving.store(false, Ordering::SeqCst);
        served
    }
}

#[async_trait]
impl Shutdownable for HttpServer {
    async fn shutdown(&self, _cancel: CancellationToken) {
        // Drop a listener that was never served.
        let unused = self.listener.lock().take();
        tracing::info!(
            addr = %self.addr,
            never_served = unused.is_some(),
            still_serving = self.is_serving(),
            "HTTP server released"
        );
    }
}

component!(HttpServer => runnable, shutdownable);

async fn stats(State(beats): State<Beats>) -> Json<serde_json::Value> {
    Json(serde_json::json!({ "beats": beats.get() }))
}

pub async fn new_http_config(settings: Settings) -> anyhow::Result<HttpConfig> {
    Ok(settings.0.component_config_or_default("http")?)
}

pub async fn new_heartbeat_config(settings: Settings) -> anyhow::Result<HeartbeatConfig> {
    Ok(settings.0.component_config_or_default("heartbeat")?)
}

pub async fn new_http_server(config: HttpConfig, beats: Beats) -> anyhow::Result<Arc<HttpServer>> {
    let addr: SocketAddr = config
        .bind_addr
        .parse()
        .with_context(|| format!("invalid bind address '{}'", config.bind_addr))?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    let addr = listener.local_addr()?;
    tracing::info!(%addr, "HTTP server bound");

    let router = Router::new()
        .route("/healthz", get(|| async { "ok" }))
        .route("/stats", get(stats))
        .with_state(beats);

    Ok(Arc::new(HttpServer {
        addr,
        listener: Mutex::new(Some(listener)),
        router,
        serving: AtomicBool::new(false),
    }))
}

pub async fn new_heartbeat(config: HeartbeatConfig, beats: Beats) -> anyhow::Result<HeartbeatRunner> {
    if config.interval_ms == 0 {
        anyhow::bail!("heartbeat interval must be positive");
    }
    let interval = Duration::from_millis(config.interval_ms);

    Ok(FuncRunner::new(move |cancel: CancellationToken| {
        let beats = beats.clone();
        async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => return Ok(()),
                    _ = ticker.tick() => {
                        let n = beats.bump();
                        tracing::trace!(beats = n, "heartbeat");
                    }
                }
            }
        }
    }))
}

async fn announce(server: Arc<HttpServer>, _heartbeat: HeartbeatRunner) -> anyhow::Result<()> {
    tracing::info!(
        health = %format!("http://{}/healthz", server.local_addr()),
        "Demo service assembled"
    );
    Ok(())
}

/// Everything the demo service needs apart from `Settings`.
pub fn module() -> Module {
    Module::new("demo")
        .provide(new_http_config)
        .provide(new_heartbeat_config)
        .provide(new_http_server)
        .provide(new_heartbeat)
        .invoke(announce)
        .with_component(Beats::default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use wirekit::{AssemblyError, Container, InterruptSource, RunOptions, ShutdownOptions};

    fn settings(http: serde_json::Value, heartbeat: serde_json::Value) -> Settings {
        let mut config = AppConfig::default();
        config.components.insert("http".to_string(), http);
        config.components.insert("heartbeat".to_string(), heartbeat);
        Settings(Arc::new(config))
    }

    async fn http_get(addr: SocketAddr, path: &str) -> String {
        let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
        let request = format!("GET {path} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n");
        stream.write_all(request.as_bytes()).await.unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        response
    }

    #[tokio::test]
    async fn demo_service_serves_until_cancelled() {
        let container = Container::builder()
            .with_interrupt(InterruptSource::Disabled)
            .with_component(settings(
                serde_json::json!({ "bind_addr": "127.0.0.1:0" }),
                serde_json::json!({ "interval_ms": 10 }),
            ))
            .with_module(module())
            .build()
            .await
            .unwrap();

        let server = container.get::<Arc<HttpServer>>().unwrap();
        let stop = CancellationToken::new();
        let run = {
            let container = container.clone();
            let options = RunOptions::default().with_parent(stop.clone());
            tokio::spawn(async move { container.run(options).await })
        };

        let health = http_get(server.local_addr(), "/healthz").await;
        assert!(health.starts_with("HTTP/1.1 200"));
        assert!(health.ends_with("ok"));

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(container.get::<Beats>().unwrap().get() > 0);

        stop.cancel();
        run.await.unwrap().unwrap();
        assert!(!server.is_serving());

        container.shutdown(ShutdownOptions::default()).await;
        assert!(container.token().is_cancelled());
    }

    #[tokio::test]
    async fn invalid_component_config_fails_assembly() {
        let err = Container::builder()
            .with_interrupt(InterruptSource::Disabled)
            .with_component(settings(
                serde_json::json!({ "bind_addr": "127.0.0.1:0" }),
                serde_json::json!({ "interval_ms": 0 }),
            ))
            .with_module(module())
            .build()
            .await
            .unwrap_err();

        match err {
            AssemblyError::ConstructorFailure { constructor, source } => {
                assert!(constructor.ends_with("new_heartbeat"));
                assert!(source.to_string().contains("positive"));
            }
            other => panic!("expected ConstructorFailure, got: {other:?}"),
        }
    }

    #[tokio::test]
    async fn bad_bind_address_is_reported() {
        let err = Container::builder()
            .with_interrupt(InterruptSource::Disabled)
            .with_component(settings(
                serde_json::json!({ "bind_addr": "not-an-address" }),
                serde_json::json!({ "interval_ms": 10 }),
            ))
            .with_module(module())
            .build()
            .await
            .unwrap_err();

        let cause = err.cause().unwrap();
        assert!(format!("{cause:#}").contains("invalid bind address"));
    }
}
