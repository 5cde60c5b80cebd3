//! Run log sinks.
//!
//! The run log is what a user reads: compiled expressions, results, errors
//! and document warnings, one line each. It is separate from diagnostic
//! tracing.

use std::sync::{Mutex, PoisonError};

pub trait LogSink: Send + Sync {
    fn log_line(&self, line: &str);
}

/// Forwards run log lines to `tracing` at info level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLog;

impl LogSink for TracingLog {
    fn log_line(&self, line: &str) {
        tracing::info!(target: "dynaflow::run", "{}", line);
    }
}

/// Keeps run log lines in memory.
#[derive(Debug, Default)]
pub struct MemoryLog {
    lines: Mutex<Vec<String>>,
}

impl MemoryLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn take(&self) -> Vec<String> {
        std::mem::take(&mut *self.lines.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

impl LogSink for MemoryLog {
    fn log_line(&self, line: &str) {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(line.to_string());
    }
}
