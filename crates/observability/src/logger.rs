//! Logging capability handed to components at construction.
//!
//! Production code passes [`TracingLogger`]; tests use [`NoopLogger`] or
//! [`MemoryLogger`] when they need to assert on what was logged.

use std::sync::Mutex;

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    Debug,
    Info,
    Warn,
    Error,
}

pub trait Logger: Send + Sync {
    fn log(&self, level: Level, component: &str, message: &str);

    fn debug(&self, component: &str, message: &str) {
        self.log(Level::Debug, component, message);
    }

    fn info(&self, component: &str, message: &str) {
        self.log(Level::Info, component, message);
    }

    fn warn(&self, component: &str, message: &str) {
        self.log(Level::Warn, component, message);
    }

    fn error(&self, component: &str, message: &str) {
        self.log(Level::Error, component, message);
    }
}

/// Forwards to `tracing`, tagging each event with a `component` field.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn log(&self, level: Level, component: &str, message: &str) {
        match level {
            Level::Debug => tracing::debug!(component, "{message}"),
            Level::Info => tracing::info!(component, "{message}"),
            Level::Warn => tracing::warn!(component, "{message}"),
            Level::Error => tracing::error!(component, "{message}"),
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopLogger;

impl Logger for NoopLogger {
    fn log(&self, _level: Level, _component: &str, _message: &str) {}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub level: Level,
    pub component: String,
    pub message: String,
}

/// Keeps every record in memory.
#[derive(Debug, Default)]
pub struct MemoryLogger {
    records: Mutex<Vec<LogRecord>>,
}

impl MemoryLogger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<LogRecord> {
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn records_at(&self, level: Level) -> Vec<LogRecord> {
        self.records().into_iter().filter(|r| r.level == level).collect()
    }
}

impl Logger for MemoryLogger {
    fn log(&self, level: Level, component: &str, message: &str) {
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(LogRecord {
                level,
                component: component.to_string(),
                message: message.to_string(),
            });
    }
}
