//! Injected diagnostics sink.
//!
//! Components never log through a global instance of their own. They receive
//! a `&dyn DiagnosticSink` (or own an `Arc<dyn DiagnosticSink>`) and report
//! validation failures and phase transitions through it. [`LogSink`] forwards
//! everything to the `log` facade and is what callers get by default.

use std::fmt;
use std::panic::Location;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

/// Severity taxonomy shared by every diagnostic.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Debug,
    Info,
    Warning,
    Critical,
}

/// `log` target of every record [`LogSink`] forwards.
pub const DIAGNOSTIC_TARGET: &str = "sheetscan";

impl Severity {
    pub(crate) fn from_log_level(level: log::Level) -> Self {
        match level {
            log::Level::Error => Severity::Critical,
            log::Level::Warn => Severity::Warning,
            log::Level::Info => Severity::Info,
            log::Level::Debug | log::Level::Trace => Severity::Debug,
        }
    }

    fn as_log_level(self) -> log::Level {
        match self {
            Severity::Debug => log::Level::Debug,
            Severity::Info => log::Level::Info,
            Severity::Warning => log::Level::Warn,
            Severity::Critical => log::Level::Error,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Debug => "DEBUG",
            Severity::Info => "INFO",
            Severity::Warning => "WARNING",
            Severity::Critical => "CRITICAL",
        };
        f.pad(s)
    }
}

/// One structured diagnostic.
#[derive(Clone, Debug)]
pub struct Diagnostic {
    pub severity: Severity,
    pub location: &'static Location<'static>,
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}:{} {}",
            self.severity,
            self.location.file(),
            self.location.line(),
            self.message
        )
    }
}

/// Fire-and-forget receiver of diagnostics.
pub trait DiagnosticSink: Send + Sync {
    fn emit(&self, diagnostic: Diagnostic);
}

impl dyn DiagnosticSink + '_ {
    #[track_caller]
    fn emit_here(&self, severity: Severity, message: String) {
        self.emit(Diagnostic {
            severity,
            location: Location::caller(),
            message,
        });
    }

    #[track_caller]
    pub fn debug(&self, message: impl Into<String>) {
        self.emit_here(Severity::Debug, message.into());
    }

    #[track_caller]
    pub fn info(&self, message: impl Into<String>) {
        self.emit_here(Severity::Info, message.into());
    }

    #[track_caller]
    pub fn warning(&self, message: impl Into<String>) {
        self.emit_here(Severity::Warning, message.into());
    }

    #[track_caller]
    pub fn critical(&self, message: impl Into<String>) {
        self.emit_here(Severity::Critical, message.into());
    }
}

/// Forwards diagnostics to the `log` facade.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogSink;

impl DiagnosticSink for LogSink {
    fn emit(&self, diagnostic: Diagnostic) {
        log::log!(
            target: DIAGNOSTIC_TARGET,
            diagnostic.severity.as_log_level(),
            "{}:{} {}",
            diagnostic.location.file(),
            diagnostic.location.line(),
            diagnostic.message
        );
    }
}

/// Discards everything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullSink;

impl DiagnosticSink for NullSink {
    fn emit(&self, _diagnostic: Diagnostic) {}
}

/// Keeps every diagnostic in memory, in emission order.
#[derive(Debug, Default)]
pub struct CollectingSink {
    records: Mutex<Vec<Diagnostic>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything emitted so far.
    pub fn records(&self) -> Vec<Diagnostic> {
        match self.records.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Number of diagnostics at `severity` or above.
    pub fn count_at_least(&self, severity: Severity) -> usize {
        self.records()
            .iter()
            .filter(|d| d.severity >= severity)
            .count()
    }

    pub fn clear(&self) {
        match self.records.lock() {
            Ok(mut guard) => guard.clear(),
            Err(poisoned) => poisoned.into_inner().clear(),
        }
    }
}

impl DiagnosticSink for CollectingSink {
    fn emit(&self, diagnostic: Diagnostic) {
        match self.records.lock() {
            Ok(mut guard) => guard.push(diagnostic),
            Err(poisoned) => poisoned.into_inner().push(diagnostic),
        }
    }
}
