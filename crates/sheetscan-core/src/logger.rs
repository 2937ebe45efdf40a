//! Stderr logger for scan runs.
//!
//! Diagnostics forwarded by [`LogSink`](crate::LogSink) print as
//! `[elapsed SEVERITY] file:line message`, using the diagnostic severity
//! names. Records from other targets keep their `log` level and target, and
//! anything outside the `sheetscan` crates is held to warnings and above so
//! image decoders do not drown the scan output. Install it once at startup
//! with [`init_with_level`]; with the `tracing` feature, [`init_tracing`]
//! installs a `tracing-subscriber` instead.

use std::fmt;
use std::io::Write;
use std::str::FromStr;
use std::sync::OnceLock;
use std::time::Instant;

use log::{Level, LevelFilter, Log, Metadata, Record};

#[cfg(feature = "tracing")]
use tracing_subscriber::fmt::format::FmtSpan;
#[cfg(feature = "tracing")]
use tracing_subscriber::util::SubscriberInitExt;
#[cfg(feature = "tracing")]
use tracing_subscriber::{fmt as tracing_fmt, EnvFilter};

use crate::diagnostics::{Severity, DIAGNOSTIC_TARGET};

/// Cap for records that do not come from a `sheetscan` crate.
const FOREIGN_LEVEL: LevelFilter = LevelFilter::Warn;

struct ScanLogger {
    level: LevelFilter,
    started: Instant,
}

fn is_scan_target(target: &str) -> bool {
    target
        .strip_prefix(DIAGNOSTIC_TARGET)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with(['_', '-', ':']))
}

fn allowed(level: LevelFilter, record_level: Level, target: &str) -> bool {
    let cap = if is_scan_target(target) {
        level
    } else {
        level.min(FOREIGN_LEVEL)
    };
    record_level <= cap
}

fn format_line(elapsed: f64, level: Level, target: &str, args: &fmt::Arguments<'_>) -> String {
    if target == DIAGNOSTIC_TARGET {
        format!("[{elapsed:7.3}s {:>8}] {args}", Severity::from_log_level(level))
    } else {
        format!("[{elapsed:7.3}s {level:>8} {target}] {args}")
    }
}

impl Log for ScanLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        allowed(self.level, metadata.level(), metadata.target())
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let line = format_line(
            self.started.elapsed().as_secs_f64(),
            record.level(),
            record.target(),
            record.args(),
        );
        let _ = writeln!(std::io::stderr().lock(), "{line}");
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

static LOGGER: OnceLock<ScanLogger> = OnceLock::new();

/// Install the stderr logger with the provided level filter.
///
/// Calling this more than once is a no-op after the first successful
/// initialization.
pub fn init_with_level(level: LevelFilter) -> Result<(), log::SetLoggerError> {
    if LOGGER.get().is_none() {
        let logger = LOGGER.get_or_init(|| ScanLogger {
            level,
            started: Instant::now(),
        });
        log::set_logger(logger)?;
        log::set_max_level(level);
    }
    Ok(())
}

/// Parse a level name (`"warn"`, `"debug"`, ...) falling back to `Info`.
///
/// The diagnostic names `"warning"` and `"critical"` are accepted too.
pub fn level_from_str(name: &str) -> LevelFilter {
    match name.to_ascii_lowercase().as_str() {
        "warning" => LevelFilter::Warn,
        "critical" => LevelFilter::Error,
        other => LevelFilter::from_str(other).unwrap_or(LevelFilter::Info),
    }
}

#[cfg(feature = "tracing")]
pub fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("warn,{DIAGNOSTIC_TARGET}=info")));
    if json {
        let _ = tracing_fmt()
            .with_env_filter(filter)
            .with_span_events(FmtSpan::CLOSE)
            .json()
            .flatten_event(true)
            .finish()
            .try_init();
    } else {
        let _ = tracing_fmt()
            .with_env_filter(filter)
            .with_span_events(FmtSpan::CLOSE)
            .with_timer(tracing_fmt::time::Uptime::default())
            .finish()
            .try_init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_names_parse_case_insensitively() {
        assert_eq!(level_from_str("debug"), LevelFilter::Debug);
        assert_eq!(level_from_str("WARN"), LevelFilter::Warn);
        assert_eq!(level_from_str("Warning"), LevelFilter::Warn);
        assert_eq!(level_from_str("critical"), LevelFilter::Error);
        assert_eq!(level_from_str("nonsense"), LevelFilter::Info);
    }

    #[test]
    fn foreign_targets_are_held_to_warnings() {
        assert!(allowed(LevelFilter::Debug, Level::Debug, "sheetscan"));
        assert!(allowed(LevelFilter::Debug, Level::Debug, "sheetscan_detect::surface"));
        assert!(!allowed(LevelFilter::Debug, Level::Info, "png::decoder"));
        assert!(!allowed(LevelFilter::Debug, Level::Info, "sheetscanner"));
        assert!(allowed(LevelFilter::Debug, Level::Warn, "png::decoder"));
        assert!(!allowed(LevelFilter::Error, Level::Warn, "png::decoder"));
    }

    #[test]
    fn diagnostics_print_with_severity_names() {
        let line = format_line(1.5, Level::Error, DIAGNOSTIC_TARGET, &format_args!("a.rs:3 bad"));
        assert_eq!(line, "[  1.500s CRITICAL] a.rs:3 bad");
        let line = format_line(0.0, Level::Warn, "sheetscan::run", &format_args!("x"));
        assert_eq!(line, "[  0.000s     WARN sheetscan::run] x");
    }
}
