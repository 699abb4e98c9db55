//! Tracing setup and the injectable logging capability.

/// Initialize process-wide tracing using `LOG_FORMAT` (json by default).
///
/// This is safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    tracing::init(tracing::LogFormat::from_env());
}

/// Tracing subscriber configuration (filters, formatter).
pub mod tracing;

/// Component-scoped logger trait and its implementations.
pub mod logger;

pub use logger::{Level, LogRecord, Logger, MemoryLogger, NoopLogger, TracingLogger};
