//! # Observability
//!
//! Structured logging for sentinel binaries.
//!
//! ## Logging Architecture
//! - **console**: WARN only, written to stderr so command output on stdout
//!   stays machine-readable
//! - **file**: INFO for sentinel crates, WARN for deps (daily rotation)
//! - **RUST_LOG**: Honored for file logs only; console always bounded to WARN

use std::{fs, path::Path};

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Default directory for rotated log files.
pub const DEFAULT_LOG_DIR: &str = "logs";

/// File filter used when `RUST_LOG` is unset.
pub const DEFAULT_FILE_FILTER: &str = "sentinel=info,warn";

/// Guards that must be held for the lifetime of the process.
/// Dropping this will cause buffered logs to be lost.
pub struct TracingGuards {
    _file_guard: WorkerGuard,
}

/// Ensures the log directory exists. Returns whether it is usable.
fn ensure_log_dir(dir: &Path) -> bool {
    dir.is_dir() || fs::create_dir_all(dir).is_ok()
}

/// File filter honoring `RUST_LOG`.
fn file_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILE_FILTER))
}

/// Initializes tracing with a bounded console layer and rotated file logs under `logs/`.
///
/// # Returns
/// `TracingGuards` - Must be held for the lifetime of the process or logs may be lost.
pub fn init_tracing(service_name: &str) -> TracingGuards {
    init_tracing_in(Path::new(DEFAULT_LOG_DIR), service_name)
}

/// Same as [`init_tracing`] with an explicit log directory.
pub fn init_tracing_in(log_dir: &Path, service_name: &str) -> TracingGuards {
    // Console logging still works if the directory is unusable.
    let _ = ensure_log_dir(log_dir);

    let file_appender = tracing_appender::rolling::daily(log_dir, format!("{}.log", service_name));
    let (file_writer, file_guard) = tracing_appender::non_blocking(file_appender);

    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_level(true)
        .with_ansi(true)
        .compact()
        .with_filter(EnvFilter::new("warn"));

    let file_layer = fmt::layer()
        .with_writer(file_writer)
        .with_ansi(false)
        .with_target(true)
        .with_level(true)
        .with_thread_ids(true)
        .with_thread_names(true)
        .with_filter(file_filter());

    // A subscriber may already be installed (tests, embedding hosts).
    let _ = tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .try_init();

    tracing::info!(
        service = service_name,
        log_dir = %log_dir.display(),
        "Observability initialized (console=WARN)"
    );

    TracingGuards {
        _file_guard: file_guard,
    }
}
