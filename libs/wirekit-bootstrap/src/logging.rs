//! Logging initialization driven by the `logging` config section.
//!
//! Console output goes to a non-blocking stderr writer. Targets with a `file`
//! get a JSON file sink with size-based rotation; targets without one fall back
//! to the `default` file. `RUST_LOG`, when set, caps both sinks.

use std::collections::HashMap;
use std::io::{IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use file_rotate::compression::Compression;
use file_rotate::suffix::{AppendTimestamp, FileLimit};
use file_rotate::{ContentLimit, FileRotate};
use parking_lot::Mutex;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::filter::Targets;
use tracing_subscriber::fmt::{self, MakeWriter};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

use crate::config::{LoggingConfig, Section};

const DEFAULT_SECTION: &str = "default";
const DEFAULT_MAX_SIZE_MB: u64 = 100;

// The non-blocking console worker must outlive every log call.
static CONSOLE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();

/// `None` means the sink is switched off for that target.
fn parse_level(s: &str) -> Option<LevelFilter> {
    match s.trim().to_ascii_lowercase().as_str() {
        "trace" => Some(LevelFilter::TRACE),
        "debug" => Some(LevelFilter::DEBUG),
        "info" | "" => Some(LevelFilter::INFO),
        "warn" => Some(LevelFilter::WARN),
        "error" => Some(LevelFilter::ERROR),
        "off" | "none" => None,
        other => {
            eprintln!("Unknown log level '{other}', using info");
            Some(LevelFilter::INFO)
        }
    }
}

/// `target` is `prefix` itself or one of its `::` children.
fn has_prefix(target: &str, prefix: &str) -> bool {
    target
        .strip_prefix(prefix)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with("::"))
}

/// Per-sink level rules derived from the config, before any I/O happens.
#[derive(Debug)]
struct LevelPlan {
    console: Targets,
    file: Targets,
}

fn plan_levels(cfg: &LoggingConfig, has_default_file: bool) -> LevelPlan {
    let default = cfg.get(DEFAULT_SECTION);

    let console_default = default
        .map(|s| parse_level(&s.console_level).unwrap_or(LevelFilter::OFF))
        .unwrap_or(LevelFilter::INFO);
    let file_default = match default {
        Some(s) if has_default_file => parse_level(&s.file_level).unwrap_or(LevelFilter::OFF),
        _ => LevelFilter::OFF,
    };

    let mut console = Targets::new().with_default(console_default);
    let mut file = Targets::new().with_default(file_default);

    for (target, section) in cfg.iter().filter(|(k, _)| k.as_str() != DEFAULT_SECTION) {
        console = console.with_target(
            target.clone(),
            parse_level(&section.console_level).unwrap_or(LevelFilter::OFF),
        );
        if !section.file.trim().is_empty() {
            file = file.with_target(
                target.clone(),
                parse_level(&section.file_level).unwrap_or(LevelFilter::OFF),
            );
        }
    }

    LevelPlan { console, file }
}

/* ----------------------------- file sinks ----------------------------- */

type SharedRotate = Arc<Mutex<FileRotate<AppendTimestamp>>>;

/// Write handle onto one rotating file, or a sink that drops everything.
struct FileHandle(Option<SharedRotate>);

impl Write for FileHandle {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match &self.0 {
            Some(file) => file.lock().write(buf),
            None => Ok(buf.len()),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match &self.0 {
            Some(file) => file.lock().flush(),
            None => Ok(()),
        }
    }
}

/// Routes each record to the file of the longest matching target prefix.
#[derive(Default)]
struct FileRouter {
    default: Option<SharedRotate>,
    by_prefix: Vec<(String, SharedRotate)>,
}

impl FileRouter {
    fn build(cfg: &LoggingConfig, base_dir: &Path) -> Self {
        let mut router = FileRouter::default();
        for (target, section) in cfg {
            let Some(file) = open_rotating(target, section, base_dir) else {
                continue;
            };
            if target == DEFAULT_SECTION {
                router.default = Some(file);
            } else {
                router.by_prefix.push((target.clone(), file));
            }
        }
        router
            .by_prefix
            .sort_by(|(a, _), (b, _)| b.len().cmp(&a.len()));
        router
    }

    fn is_empty(&self) -> bool {
        self.default.is_none() && self.by_prefix.is_empty()
    }

    fn route(&self, target: &str) -> Option<SharedRotate> {
        self.by_prefix
            .iter()
            .find(|(prefix, _)| has_prefix(target, prefix))
            .map(|(_, file)| file)
            .or(self.default.as_ref())
            .cloned()
    }
}

impl<'a> MakeWriter<'a> for FileRouter {
    type Writer = FileHandle;

    fn make_writer(&'a self) -> Self::Writer {
        FileHandle(self.default.clone())
    }

    fn make_writer_for(&'a self, meta: &tracing::Metadata<'_>) -> Self::Writer {
        FileHandle(self.route(meta.target()))
    }
}

fn resolve_log_path(file: &str, base_dir: &Path) -> PathBuf {
    let path = Path::new(file);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base_dir.join(path)
    }
}

fn open_rotating(target: &str, section: &Section, base_dir: &Path) -> Option<SharedRotate> {
    if section.file.trim().is_empty() {
        return None;
    }
    let path = resolve_log_path(&section.file, base_dir);
    if let Some(parent) = path.parent() {
        if let Err(e) = std::fs::create_dir_all(parent) {
            eprintln!(
                "Failed to create log directory for '{target}': {} ({e})",
                parent.display()
            );
            return None;
        }
    }

    // Keep a fixed number of backups when configured, otherwise prune by age.
    let limit = match section.max_backups {
        Some(n) => FileLimit::MaxFiles(n),
        None => FileLimit::Age(chrono::Duration::days(
            i64::from(section.max_age_days.unwrap_or(1)),
        )),
    };
    let max_bytes = section.max_size_mb.unwrap_or(DEFAULT_MAX_SIZE_MB) as usize * 1024 * 1024;

    let rotate = FileRotate::new(
        &path,
        AppendTimestamp::default(limit),
        ContentLimit::BytesSurpassed(max_bytes),
        Compression::None,
        None,
    );
    Some(Arc::new(Mutex::new(rotate)))
}

/* ------------------------------- install ------------------------------- */

/// Install the global subscriber. Safe to call more than once; later calls are no-ops.
pub fn init_logging(cfg: &LoggingConfig, base_dir: &Path) {
    // Bridge `log` records into tracing before the subscriber goes in.
    if let Err(e) = tracing_log::LogTracer::init() {
        eprintln!("LogTracer init skipped: {e}");
    }

    if cfg.is_empty() {
        init_minimal();
        return;
    }

    let router = FileRouter::build(cfg, base_dir);
    let plan = plan_levels(cfg, router.default.is_some());

    let (stderr, guard) = tracing_appender::non_blocking(std::io::stderr());
    let _ = CONSOLE_GUARD.set(guard);

    let console_layer = fmt::layer()
        .with_writer(stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .with_target(true)
        .with_timer(fmt::time::UtcTime::rfc_3339())
        .with_filter(plan.console);

    let file_layer = (!router.is_empty()).then(|| {
        fmt::layer()
            .json()
            .with_ansi(false)
            .with_target(true)
            .with_timer(fmt::time::UtcTime::rfc_3339())
            .with_writer(router)
            .with_filter(plan.file)
    });

    let _ = Registry::default()
        .with(EnvFilter::try_from_default_env().ok())
        .with(console_layer)
        .with(file_layer)
        .try_init();
}

/// Console only, INFO unless `RUST_LOG` says otherwise.
fn init_minimal() {
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = Registry::default()
        .with(env)
        .with(
            fmt::layer()
                .with_target(true)
                .with_timer(fmt::time::UtcTime::rfc_3339()),
        )
        .try_init();
}

/// Map of target → effective console level, for `--print-config` style diagnostics.
pub fn console_levels(cfg: &LoggingConfig) -> HashMap<String, String> {
    cfg.iter()
        .map(|(target, section)| {
            let level = parse_level(&section.console_level)
                .map_or_else(|| "off".to_string(), |l| l.to_string().to_lowercase());
            (target.clone(), level)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::default_logging_config;

    fn section(console: &str, file: &str, file_level: &str) -> Section {
        Section {
            console_level: console.to_string(),
            file: file.to_string(),
            file_level: file_level.to_string(),
            max_age_days: None,
            max_backups: Some(1),
            max_size_mb: Some(1),
        }
    }

    #[test]
    fn level_parsing() {
        assert_eq!(parse_level("DEBUG"), Some(LevelFilter::DEBUG));
        assert_eq!(parse_level(""), Some(LevelFilter::INFO));
        assert_eq!(parse_level("off"), None);
        assert_eq!(parse_level("loud"), Some(LevelFilter::INFO));
    }

    #[test]
    fn prefix_matching_respects_path_segments() {
        assert!(has_prefix("wirekit", "wirekit"));
        assert!(has_prefix("wirekit::runtime", "wirekit"));
        assert!(!has_prefix("wirekit_bootstrap", "wirekit"));
    }

    #[test]
    fn targets_follow_sections() {
        let mut cfg = default_logging_config();
        cfg.insert("wirekit".to_string(), section("warn", "", ""));
        cfg.insert("hyper".to_string(), section("off", "", ""));

        let plan = plan_levels(&cfg, false);
        assert!(plan.console.would_enable("wirekit::runtime", &tracing::Level::WARN));
        assert!(!plan.console.would_enable("wirekit::runtime", &tracing::Level::INFO));
        assert!(!plan.console.would_enable("hyper::proto", &tracing::Level::ERROR));
        assert!(plan.console.would_enable("app", &tracing::Level::INFO));
        // No default file: file sink stays off.
        assert!(!plan.file.would_enable("app", &tracing::Level::ERROR));
    }

    #[test]
    fn router_picks_longest_prefix() {
        let tmp = tempfile::tempdir().unwrap();
        let mut cfg = LoggingConfig::new();
        cfg.insert(DEFAULT_SECTION.to_string(), section("info", "all.log", "info"));
        cfg.insert("app".to_string(), section("info", "app.log", "debug"));
        cfg.insert("app::http".to_string(), section("info", "http.log", "debug"));

        let router = FileRouter::build(&cfg, tmp.path());
        assert!(!router.is_empty());

        let http = router.route("app::http::server").unwrap();
        let app = router.route("app::jobs").unwrap();
        let other = router.route("tokio").unwrap();
        assert!(!Arc::ptr_eq(&http, &app));
        assert!(Arc::ptr_eq(&other, router.default.as_ref().unwrap()));

        let mut handle = FileHandle(Some(http));
        handle.write_all(b"{}\n").unwrap();
        handle.flush().unwrap();
        assert!(tmp.path().join("http.log").exists());
    }

    #[test]
    fn console_levels_report() {
        let mut cfg = default_logging_config();
        cfg.insert("noisy".to_string(), section("off", "", ""));
        let levels = console_levels(&cfg);
        assert_eq!(levels["default"], "info");
        assert_eq!(levels["noisy"], "off");
    }
}
