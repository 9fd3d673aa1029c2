//! Logging setup utilities for the Yoyaku binaries.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the tracing subscriber with the specified default log level.
///
/// Both the library crates of the workspace and the binary itself log at
/// `default_log_level` unless `RUST_LOG` says otherwise.
///
/// # Arguments
///
/// * `binary_name` - The name of the binary (e.g., "yoyaku-client")
/// * `default_log_level` - The default log level (e.g., "debug", "info", "warn", "error")
///
/// # Examples
///
/// ```no_run
/// use yoyaku_shared::logger::setup_logger;
///
/// setup_logger("yoyaku-client", "info");
/// ```
pub fn setup_logger(binary_name: &str, default_log_level: &str) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter(binary_name, default_log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Build the filter directive used when `RUST_LOG` is not set.
fn default_filter(binary_name: &str, default_log_level: &str) -> String {
    ["yoyaku_client", "yoyaku_shared", &binary_name.replace('-', "_")]
        .iter()
        .map(|target| format!("{}={}", target, default_log_level))
        .collect::<Vec<_>>()
        .join(",")
}
