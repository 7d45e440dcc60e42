//! Logging Infrastructure
//!
//! Structured `tracing` setup for hosts embedding the engine:
//! - console output, pretty for development or JSON for production
//! - optional daily rotating file logs under `<log_dir>/sync/`
//! - payment events (target `payment`) additionally go to `<log_dir>/payment/`
//!
//! The engine itself only emits events; the host decides whether to install
//! a subscriber.

use std::fs;
use std::path::{Path, PathBuf};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing::Subscriber;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{EnvFilter, Layer, fmt, prelude::*};

/// Rotated sync logs older than this are removed
pub const LOG_RETENTION_DAYS: i64 = 14;

/// Delete `sync-YYYY-MM-DD` files older than [`LOG_RETENTION_DAYS`].
///
/// Payment logs are kept. Returns the number of deleted files.
pub fn cleanup_old_logs(log_dir: &Path) -> anyhow::Result<usize> {
    let cutoff = chrono::Local::now().date_naive() - chrono::Duration::days(LOG_RETENTION_DAYS);
    let sync_dir = log_dir.join("sync");
    if !sync_dir.exists() {
        return Ok(0);
    }

    let mut deleted = 0;
    for entry in fs::read_dir(sync_dir)? {
        let path = entry?.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        // RollingFileAppender names files "<prefix>.YYYY-MM-DD"
        if let Some(date_part) = name.strip_prefix("sync.")
            && let Ok(date) = chrono::NaiveDate::parse_from_str(date_part, "%Y-%m-%d")
            && date < cutoff
        {
            fs::remove_file(&path)?;
            deleted += 1;
            tracing::info!(file = %name, "Deleted old log file");
        }
    }
    Ok(deleted)
}

/// Initialize logging with optional daily rotating files
///
/// # Arguments
/// * `level` - default filter when `RUST_LOG` is unset (e.g. "info", "order_sync=debug")
/// * `json_format` - JSON console output (production) instead of pretty output
/// * `log_dir` - directory for file logs; `None` logs to the console only
///
/// Must be called inside a Tokio runtime when `log_dir` is set, since a
/// cleanup task is spawned.
pub fn init_logger_with_file(
    level: &str,
    json_format: bool,
    log_dir: Option<&str>,
) -> anyhow::Result<()> {
    let directives = filter_directives(level);

    let console_layer = if json_format {
        fmt::layer()
            .json()
            .with_target(true)
            .with_current_span(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .boxed()
    } else {
        fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_file(true)
            .with_line_number(true)
            .boxed()
    };

    let files = match log_dir {
        Some(dir) => {
            let log_dir = Path::new(dir);
            let layers = file_layers(log_dir, &directives)?;
            tokio::spawn(periodic_cleanup(log_dir.to_path_buf()));
            Some(layers)
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(console_layer.with_filter(EnvFilter::new(&directives)))
        .with(files)
        .try_init()?;

    Ok(())
}

/// `RUST_LOG` when set, otherwise `level`
fn filter_directives(level: &str) -> String {
    std::env::var(EnvFilter::DEFAULT_ENV)
        .ok()
        .filter(|d| !d.trim().is_empty())
        .unwrap_or_else(|| level.to_string())
}

/// Daily rotating JSON layers: everything passing `directives` to
/// `<log_dir>/sync/`, payment events to `<log_dir>/payment/`
fn file_layers<S>(
    log_dir: &Path,
    directives: &str,
) -> anyhow::Result<Vec<Box<dyn Layer<S> + Send + Sync>>>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    let sync_dir = log_dir.join("sync");
    let payment_dir = log_dir.join("payment");
    fs::create_dir_all(&sync_dir)?;
    fs::create_dir_all(&payment_dir)?;

    let sync_log = RollingFileAppender::new(Rotation::DAILY, sync_dir, "sync");
    let sync_layer = fmt::layer()
        .json()
        .with_target(true)
        .with_current_span(true)
        .with_file(true)
        .with_line_number(true)
        .with_writer(std::sync::Mutex::new(sync_log))
        .with_filter(EnvFilter::new(directives))
        .boxed();

    // Payment trail is never cleaned up
    let payment_log = RollingFileAppender::new(Rotation::DAILY, payment_dir, "payment");
    let payment_layer = fmt::layer()
        .json()
        .with_target(true)
        .with_writer(std::sync::Mutex::new(payment_log))
        .with_filter(tracing_subscriber::filter::filter_fn(|meta| {
            meta.target() == "payment"
        }))
        .boxed();

    Ok(vec![sync_layer, payment_layer])
}

/// Hourly log cleanup
async fn periodic_cleanup(log_dir: PathBuf) {
    use tokio::time::{Duration, sleep};

    loop {
        sleep(Duration::from_secs(3600)).await;

        if let Err(e) = cleanup_old_logs(&log_dir) {
            tracing::error!(error = %e, "Failed to cleanup old logs");
        }
    }
}

/// Initialize console-only logging
pub fn init_logger(level: &str, json_format: bool) -> anyhow::Result<()> {
    init_logger_with_file(level, json_format, None)
}

/// Record a payment lifecycle event to the `payment` log target
///
/// ```no_run
/// order_sync::payment_log!("u1", "ORD-000001", "session_opened");
/// order_sync::payment_log!("u1", "ORD-000001", "failed", "card declined");
/// ```
#[macro_export]
macro_rules! payment_log {
    ($owner_id:expr, $order_id:expr, $event:expr) => {
        tracing::info!(
            target: "payment",
            owner_id = $owner_id,
            order_id = $order_id,
            event = $event,
            "PAYMENT"
        );
    };
    ($owner_id:expr, $order_id:expr, $event:expr, $details:expr) => {
        tracing::info!(
            target: "payment",
            owner_id = $owner_id,
            order_id = $order_id,
            event = $event,
            details = $details,
            "PAYMENT"
        );
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cleanup_removes_only_old_sync_logs() {
        let dir = tempfile::tempdir().unwrap();
        let sync_dir = dir.path().join("sync");
        let payment_dir = dir.path().join("payment");
        fs::create_dir_all(&sync_dir).unwrap();
        fs::create_dir_all(&payment_dir).unwrap();

        let today = chrono::Local::now().date_naive();
        let old = today - chrono::Duration::days(LOG_RETENTION_DAYS + 3);
        fs::write(sync_dir.join(format!("sync.{}", old.format("%Y-%m-%d"))), "x").unwrap();
        fs::write(sync_dir.join(format!("sync.{}", today.format("%Y-%m-%d"))), "x").unwrap();
        fs::write(payment_dir.join(format!("payment.{}", old.format("%Y-%m-%d"))), "x").unwrap();

        assert_eq!(cleanup_old_logs(dir.path()).unwrap(), 1);
        assert_eq!(fs::read_dir(&sync_dir).unwrap().count(), 1);
        assert_eq!(fs::read_dir(&payment_dir).unwrap().count(), 1);
    }

    fn read_all(dir: &Path) -> String {
        fs::read_dir(dir)
            .unwrap()
            .map(|entry| fs::read_to_string(entry.unwrap().path()).unwrap())
            .collect()
    }

    #[test]
    fn test_sync_file_honours_level() {
        let dir = tempfile::tempdir().unwrap();
        let layers = file_layers::<tracing_subscriber::Registry>(dir.path(), "warn").unwrap();
        let subscriber = tracing_subscriber::registry().with(layers);

        tracing::subscriber::with_default(subscriber, || {
            tracing::debug!("dependency chatter");
            tracing::warn!("cart delta rejected");
            crate::payment_log!("u1", "ORD-1", "confirmed");
        });

        let sync = read_all(&dir.path().join("sync"));
        assert!(sync.contains("cart delta rejected"));
        assert!(!sync.contains("dependency chatter"));
        // Info-level payment events follow the level in the sync log
        assert!(!sync.contains("ORD-1"));
        assert!(read_all(&dir.path().join("payment")).contains("ORD-1"));
    }

    #[test]
    fn test_cleanup_without_dir() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(cleanup_old_logs(dir.path()).unwrap(), 0);
    }
}
