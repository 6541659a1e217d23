//! Logging setup for the CLI

use reindex_core::LogConfig;
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

/// Parse log level from config string
fn parse_log_level(level: &str) -> tracing::Level {
  match level.to_lowercase().as_str() {
    "off" | "error" => tracing::Level::ERROR,
    "warn" => tracing::Level::WARN,
    "info" => tracing::Level::INFO,
    "debug" => tracing::Level::DEBUG,
    "trace" => tracing::Level::TRACE,
    _ => tracing::Level::INFO,
  }
}

/// Initialize logging from config.
///
/// Logs to the console, or to a rolling file when `log_file` is given.
/// Returns the guard that must be kept alive for the duration of the program.
pub fn init_logging(config: &LogConfig, log_file: Option<&Path>) -> Option<WorkerGuard> {
  let level = parse_log_level(&config.level);

  // Build env filter (allows RUST_LOG override)
  let env_filter = EnvFilter::builder()
    .with_default_directive(level.into())
    .from_env_lossy();

  let Some(log_file) = log_file else {
    tracing_subscriber::fmt()
      .with_env_filter(env_filter)
      .with_target(false)
      .with_writer(std::io::stderr)
      .init();
    return None;
  };

  let log_dir = log_file.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));
  let file_name = log_file
    .file_name()
    .map(|n| n.to_string_lossy().into_owned())
    .unwrap_or_else(|| "reindex.log".to_string());

  if std::fs::create_dir_all(log_dir).is_err() {
    // Fall back to console-only logging
    tracing_subscriber::fmt()
      .with_env_filter(env_filter)
      .with_writer(std::io::stderr)
      .init();
    return None;
  }

  // Create rolling file appender based on config
  let file_appender = match config.rotation.as_str() {
    "hourly" => tracing_appender::rolling::hourly(log_dir, &file_name),
    "never" => tracing_appender::rolling::never(log_dir, &file_name),
    _ => tracing_appender::rolling::daily(log_dir, &file_name),
  };

  let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

  tracing_subscriber::fmt()
    .with_env_filter(env_filter)
    .with_target(true)
    .with_ansi(false)
    .with_writer(file_writer)
    .init();

  Some(guard)
}
