use anyhow::Result;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use wirekit::{AssemblyError, Container, InterruptSource, RunOptions, ShutdownOptions};
use wirekit_bootstrap::{AppConfig, CliArgs};

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

mod components;

use components::Settings;

/// Wirekit demo - a health endpoint and a heartbeat wired by the container
#[derive(Parser)]
#[command(name = "wirekit-demo")]
#[command(about = "Wirekit demo - a health endpoint and a heartbeat wired by the container")]
#[command(version = "0.1.0")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Print effective configuration (YAML) and exit
    #[arg(long)]
    print_config: bool,

    /// Log verbosity level (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Assemble the service and run until interrupted
    Run,
    /// Assemble the service, print the construction order, then shut it down
    Check,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let args = CliArgs {
        verbose: cli.verbose,
    };

    // 1) defaults -> 2) YAML (if provided) -> 3) env (APP__*) -> 4) CLI overrides
    let mut config = AppConfig::load_or_default(cli.config.as_deref())?;
    config.apply_cli_overrides(&args);

    // Relative log files live next to the config file.
    let base_dir = cli
        .config
        .as_deref()
        .and_then(Path::parent)
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
    let logging_config = config.logging.clone().unwrap_or_default();
    wirekit_bootstrap::init_logging(&logging_config, &base_dir);

    if cli.print_config {
        println!("{}", config.to_yaml()?);
        print_console_levels(&logging_config);
        return Ok(());
    }

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run_service(config).await,
        Commands::Check => check_wiring(config).await,
    }
}

fn print_console_levels(logging: &wirekit_bootstrap::LoggingConfig) {
    let mut levels: Vec<_> = wirekit_bootstrap::console_levels(logging).into_iter().collect();
    levels.sort();
    println!("# effective console levels");
    for (target, level) in levels {
        println!("#   {target}: {level}");
    }
}

async fn assemble(config: AppConfig, interrupt: InterruptSource) -> Result<Container, AssemblyError> {
    Container::builder()
        .with_interrupt(interrupt)
        .with_component(Settings(Arc::new(config)))
        .with_module(components::module())
        .build()
        .await
}

async fn run_service(config: AppConfig) -> Result<()> {
    let signals = config.runtime.signals.clone();
    let shutdown_timeout = config.runtime.shutdown_timeout_sec;

    let container = assemble(config, InterruptSource::Signals(signals)).await?;
    tracing::info!(
        components = container.construction_order().len(),
        "wirekit demo started; press Ctrl+C to stop"
    );

    let outcome = container
        .run(RunOptions::default().on_error(|_, err| {
            tracing::warn!(error = %format!("{err:#}"), "Additional runner failure");
        }))
        .await;

    container.shutdown(shutdown_options(shutdown_timeout)).await;
    tracing::info!("wirekit demo stopped");

    outcome.map_err(anyhow::Error::from)
}

async fn check_wiring(config: AppConfig) -> Result<()> {
    tracing::info!("Checking component wiring…");
    let container = assemble(config, InterruptSource::Disabled).await?;

    println!("Wiring is valid; construction order:");
    for (i, kind) in container.construction_order().iter().enumerate() {
        println!("  {:>2}. {kind}", i + 1);
    }

    container.shutdown(ShutdownOptions::default()).await;
    Ok(())
}

/// Shutdown scope bounded by `runtime.shutdown_timeout_sec` (0 = unbounded).
fn shutdown_options(timeout_sec: u64) -> ShutdownOptions {
    if timeout_sec == 0 {
        return ShutdownOptions::default();
    }
    let deadline = CancellationToken::new();
    let expire = deadline.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(timeout_sec)).await;
        tracing::warn!(timeout_sec, "Shutdown deadline reached");
        expire.cancel();
    });
    ShutdownOptions::default().with_parent(deadline)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn check_assembles_from_a_config_file() {
        let tmp = tempdir().unwrap();
        let cfg_path = tmp.path().join("demo.yaml");
        std::fs::write(
            &cfg_path,
            r#"
runtime:
  shutdown_timeout_sec: 1
components:
  http:
    bind_addr: "127.0.0.1:0"
  heartbeat:
    interval_ms: 25
"#,
        )
        .unwrap();

        let config = AppConfig::load_or_default(Some(&cfg_path)).unwrap();
        assert_eq!(config.runtime.shutdown_timeout_sec, 1);

        let container = assemble(config, InterruptSource::Disabled).await.unwrap();
        let server = container.get::<Arc<components::HttpServer>>().unwrap();
        assert_eq!(server.local_addr().ip().to_string(), "127.0.0.1");
        assert!(container
            .construction_order()
            .contains(&wirekit::Kind::of::<components::HeartbeatRunner>()));

        container.shutdown(shutdown_options(1)).await;
        assert!(container.token().is_cancelled());
    }
}
