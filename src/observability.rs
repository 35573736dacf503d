// SPDX-License-Identifier: Apache-2.0

//! Logging and observability helpers.

pub mod sensitive;

pub use sensitive::Sensitive;

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tracing_appender::rolling::RollingFileAppender;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::EnvFilter;

const LOG_FILE_PREFIX: &str = "fabricsql-node.log";
const LOG_RETENTION_DAYS: u64 = 14;
const LOG_FILTER_ENV: &str = "FABRICSQL_LOG";
const LOG_DIR_ENV: &str = "FABRICSQL_LOG_DIR";
const DEFAULT_FILTER: &str = "fabricsql_node=info";

/// Installs the global JSON subscriber.
///
/// Events go to a daily rolling file when `FABRICSQL_LOG_DIR` is set, and to
/// stderr otherwise; stdout stays reserved for output records. The filter
/// comes from `FABRICSQL_LOG` (EnvFilter syntax).
pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_env(LOG_FILTER_ENV)
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let log_dir = std::env::var_os(LOG_DIR_ENV).map(PathBuf::from);

    match &log_dir {
        Some(dir) => {
            let _ = fs::create_dir_all(dir);
            if let Err(e) = cleanup_old_logs(dir, LOG_RETENTION_DAYS) {
                eprintln!("Failed to clean up old logs: {}", e);
            }

            let file_appender: RollingFileAppender =
                tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let _ = tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_writer(file_appender)
                .json()
                .with_file(true)
                .with_line_number(true)
                .with_current_span(true)
                .with_span_list(true)
                .with_ansi(false)
                .with_span_events(FmtSpan::CLOSE)
                .try_init();
        }
        None => {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .json()
                .with_current_span(true)
                .with_ansi(false)
                .try_init();
        }
    }

    let previous_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        let payload = panic_info.payload();
        let location = panic_info
            .location()
            .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()))
            .unwrap_or_else(|| "unknown".to_string());

        let msg = if let Some(s) = payload.downcast_ref::<&str>() {
            format!("PANIC: {}", s)
        } else if let Some(s) = payload.downcast_ref::<String>() {
            format!("PANIC: {}", s)
        } else {
            "PANIC: unknown cause".to_string()
        };

        tracing::error!(target: "panic", location = %location, message = %msg, "Connector panicked");
        previous_hook(panic_info);
    }));

    tracing::debug!(log_dir = ?log_dir, "Tracing initialized");
}

fn cleanup_old_logs(log_dir: &Path, retention_days: u64) -> std::io::Result<()> {
    let now = SystemTime::now();
    let retention = Duration::from_secs(retention_days * 24 * 60 * 60);

    for entry in fs::read_dir(log_dir)? {
        let path = entry?.path();

        let is_ours = path
            .file_name()
            .and_then(|name| name.to_str())
            .map(|name| name.starts_with(LOG_FILE_PREFIX))
            .unwrap_or(false);
        if !is_ours {
            continue;
        }

        let age = fs::metadata(&path)
            .and_then(|m| m.modified())
            .ok()
            .and_then(|modified| now.duration_since(modified).ok());

        if matches!(age, Some(age) if age > retention) {
            if let Err(e) = fs::remove_file(&path) {
                eprintln!("Failed to remove old log file {:?}: {}", path, e);
            }
        }
    }
    Ok(())
}
