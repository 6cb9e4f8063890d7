//! Logging system configuration and initialization
//!
//! - Console and/or file output, optional JSON file format
//! - Configuration based log level, `RUST_LOG` takes precedence
//! - Log files stored relative to the executable unless a directory is configured
//! - JST (Japan Standard Time) timestamps, matching the marketplace's zone

#![allow(clippy::uninlined_format_args)]

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Result, anyhow};
use chrono::{DateTime, FixedOffset, Offset, Utc};
use lazy_static::lazy_static;
use tracing::{info, warn};
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{
    EnvFilter, Layer, Registry,
    fmt::{self, time::FormatTime},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

pub use crate::infrastructure::config::LoggingConfig;

const JST_OFFSET_SECS: i32 = 9 * 3600;

/// Dependency targets turned down unless the level is `trace`
const NOISY_TARGETS: &[(&str, &str)] = &[
    ("reqwest", "info"),
    ("hyper", "warn"),
    ("hyper_util", "warn"),
    ("h2", "warn"),
    ("tokio", "info"),
    ("runtime", "warn"),
    ("headless_chrome", "warn"),
    ("tungstenite", "warn"),
    ("html5ever", "warn"),
    ("selectors", "warn"),
];

lazy_static! {
    static ref LOG_GUARDS: Mutex<Vec<tracing_appender::non_blocking::WorkerGuard>> =
        Mutex::new(Vec::new());
}

fn jst_offset() -> FixedOffset {
    FixedOffset::east_opt(JST_OFFSET_SECS).unwrap_or_else(|| Utc.fix())
}

fn jst_now() -> DateTime<FixedOffset> {
    Utc::now().with_timezone(&jst_offset())
}

/// Time formatter for JST (UTC+9)
struct JstTimeFormatter;

impl FormatTime for JstTimeFormatter {
    fn format_time(&self, w: &mut fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(w, "{}", jst_now().format("%Y-%m-%d %H:%M:%S%.3f %:z"))
    }
}

/// Get the log directory relative to the executable location
pub fn get_log_directory() -> PathBuf {
    let exe_dir = std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_default());

    exe_dir.join("logs")
}

fn resolve_log_directory(config: &LoggingConfig) -> PathBuf {
    config.log_dir.clone().unwrap_or_else(get_log_directory)
}

/// Initialize the logging system with default configuration
pub fn init_logging() -> Result<()> {
    init_logging_with_config(LoggingConfig::default())
}

/// Rename an existing log file with its modification time so each run starts fresh
fn rotate_existing_log_file(log_dir: &Path, log_file_name: &str) -> Result<Option<PathBuf>> {
    let log_file_path = log_dir.join(log_file_name);
    if !log_file_path.exists() {
        return Ok(None);
    }

    let metadata = std::fs::metadata(&log_file_path)
        .map_err(|e| anyhow!("Failed to get log file metadata: {}", e))?;
    let file_time = metadata
        .modified()
        .or_else(|_| metadata.created())
        .unwrap_or_else(|_| std::time::SystemTime::now());
    let datetime: DateTime<Utc> = file_time.into();
    let stamp = datetime.with_timezone(&jst_offset()).format("%Y%m%dT%H%M%S");

    let file_stem = log_file_name.trim_end_matches(".log");
    let timestamped_path = log_dir.join(format!("{}.{}.log", file_stem, stamp));

    std::fs::rename(&log_file_path, &timestamped_path).map_err(|e| {
        anyhow!(
            "Failed to rotate log file {} to {}: {}",
            log_file_path.display(),
            timestamped_path.display(),
            e
        )
    })?;

    Ok(Some(timestamped_path))
}

/// Build the level filter. `RUST_LOG` wins when set.
fn build_env_filter(config: &LoggingConfig) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let mut filter = EnvFilter::new(&config.level);

        if !config.level.to_lowercase().contains("trace") {
            for (target, level) in NOISY_TARGETS {
                if let Ok(directive) = format!("{}={}", target, level).parse() {
                    filter = filter.add_directive(directive);
                }
            }
        }

        for (module, level) in &config.module_filters {
            match format!("{}={}", module, level).parse() {
                Ok(directive) => filter = filter.add_directive(directive),
                Err(e) => eprintln!("Ignoring invalid log filter {}={}: {}", module, level, e),
            }
        }

        if let Ok(directive) = format!("market_scout={}", config.level).parse() {
            filter = filter.add_directive(directive);
        }

        filter
    })
}

/// Initialize logging with custom configuration
///
/// Noisy dependency targets (HTTP stack, runtime, browser driver, HTML
/// parser internals) are held at `info`/`warn` unless the level is `trace`.
///
/// ```bash
/// # Show HTTP details on a debug run
/// RUST_LOG="debug,reqwest=debug,hyper=debug" cargo run
/// ```
pub fn init_logging_with_config(config: LoggingConfig) -> Result<()> {
    if !config.file_output && !config.console_output {
        return Err(anyhow!("No logging output configured"));
    }

    let log_dir = resolve_log_directory(&config);
    let mut rotated = None;

    let file_layer = if config.file_output {
        std::fs::create_dir_all(&log_dir)
            .map_err(|e| anyhow!("Failed to create log directory {:?}: {}", log_dir, e))?;

        rotated = rotate_existing_log_file(&log_dir, &config.file_name)?;
        if config.auto_cleanup_logs {
            cleanup_old_logs(&log_dir, &config)?;
        }

        let file_appender = rolling::never(&log_dir, &config.file_name);
        let (file_writer, file_guard) = non_blocking(file_appender);
        LOG_GUARDS
            .lock()
            .map_err(|_| anyhow!("Log guard registry poisoned"))?
            .push(file_guard);

        let layer = if config.json_format {
            fmt::Layer::new()
                .json()
                .with_writer(file_writer)
                .with_timer(JstTimeFormatter)
                .with_target(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true)
                .with_ansi(false)
                .boxed()
        } else {
            fmt::Layer::new()
                .with_writer(file_writer)
                .with_timer(JstTimeFormatter)
                .with_target(false)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false)
                .with_ansi(false)
                .boxed()
        };
        Some(layer)
    } else {
        None
    };

    let console_layer = config.console_output.then(|| {
        fmt::Layer::new()
            .with_writer(std::io::stdout)
            .with_timer(JstTimeFormatter)
            .with_target(false)
    });

    Registry::default()
        .with(file_layer)
        .with(console_layer)
        .with(build_env_filter(&config))
        .try_init()
        .map_err(|e| anyhow!("Failed to install tracing subscriber: {}", e))?;

    info!("Logging system initialized");
    info!("Log directory: {:?}", log_dir);
    info!("Log level: {}", config.level);
    if let Some(path) = rotated {
        info!("Rotated previous log file to: {:?}", path);
    }
    if config.level.to_lowercase().contains("trace") {
        info!("TRACE level active, dependency logs are not filtered");
    }
    info!(
        "Outputs: console={} file={} json={}",
        config.console_output, config.file_output, config.json_format
    );

    Ok(())
}

/// Log system information for diagnostics
pub fn log_system_info() {
    info!("=== Market Scout System Information ===");
    info!("Application version: {}", env!("CARGO_PKG_VERSION"));
    info!("Operating system: {}", std::env::consts::OS);
    info!("Architecture: {}", std::env::consts::ARCH);

    if let Ok(current_dir) = std::env::current_dir() {
        info!("Working directory: {:?}", current_dir);
    }
    info!("Started at: {}", jst_now().format("%Y-%m-%d %H:%M:%S %:z"));
    info!("=======================================");
}

/// `*.log` files in `log_dir`, newest first
fn collect_log_files(log_dir: &Path) -> Result<Vec<PathBuf>> {
    let mut log_files = Vec::new();
    for entry in std::fs::read_dir(log_dir)? {
        let entry = entry?;
        let path = entry.path();
        let is_log = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.ends_with(".log"));
        if path.is_file() && is_log {
            if let Ok(modified) = entry.metadata().and_then(|m| m.modified()) {
                log_files.push((path, modified));
            }
        }
    }
    log_files.sort_by(|a, b| b.1.cmp(&a.1));
    Ok(log_files.into_iter().map(|(path, _)| path).collect())
}

/// Clean up old log files based on configuration. Returns the number removed.
pub fn cleanup_old_logs(log_dir: &Path, config: &LoggingConfig) -> Result<usize> {
    if !log_dir.exists() {
        return Ok(0);
    }

    let log_files = collect_log_files(log_dir)?;
    let keep = if config.keep_only_latest {
        1
    } else {
        config.max_files as usize
    };
    if log_files.len() <= keep {
        return Ok(0);
    }

    let mut removed = 0;
    for path in log_files.iter().skip(keep) {
        if let Err(e) = std::fs::remove_file(path) {
            warn!("Failed to remove old log file {:?}: {}", path, e);
        } else {
            removed += 1;
        }
    }
    info!("Removed {} old log files (kept {})", removed, keep);
    Ok(removed)
}
