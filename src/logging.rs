use std::sync::Once;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

// Ensure initialization happens only once
static INIT: Once = Once::new();

/// Initialize the logging system with sensible defaults.
///
/// Log level can be set using the RUST_LOG environment variable.
/// Example: RUST_LOG=debug,token_limiter=trace
pub fn init() {
    init_with_default("info");
}

/// Same as [`init`], but with a caller-chosen filter when RUST_LOG is unset.
pub fn init_with_default(default_filter: &str) {
    INIT.call_once(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_target(true) // Include module path in logs
                    .with_thread_ids(true) // Monitor task vs request tasks
                    .with_line_number(true),
            )
            .init();

        tracing::debug!("Logging initialized");
    });
}

/// Macro for logging one admission decision
#[macro_export]
macro_rules! admission_event {
    ($key:expr, $allowed:expr, $requested:expr, $path:expr) => {
        tracing::trace!(
            key = $key,
            allowed = $allowed,
            requested = $requested,
            path = $path,
            "Admission decision"
        )
    };
}

/// Macro for logging quota store round trips with timing
#[macro_export]
macro_rules! store_op {
    ($operation:expr, $key:expr, $success:expr, $elapsed_ms:expr) => {
        tracing::debug!(
            operation = $operation,
            key = $key,
            success = $success,
            elapsed_ms = $elapsed_ms,
            "Quota store operation"
        )
    };
}
