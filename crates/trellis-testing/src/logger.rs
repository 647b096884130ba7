//! Process-wide capturing logger for asserting on diagnostics.
//!
//! Tests in one binary share the logger, so assertions should look for
//! lines unique to the test (a component tag, an address) rather than
//! count everything.

use std::sync::{Mutex, OnceLock, PoisonError};

use log::{Level, LevelFilter, Log, Metadata, Record};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedLog {
    pub level: Level,
    pub message: String,
}

struct CaptureLogger {
    lines: Mutex<Vec<CapturedLog>>,
}

impl Log for CaptureLogger {
    fn enabled(&self, _metadata: &Metadata) -> bool {
        true
    }

    fn log(&self, record: &Record) {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(CapturedLog {
                level: record.level(),
                message: record.args().to_string(),
            });
    }

    fn flush(&self) {}
}

fn logger() -> &'static CaptureLogger {
    static LOGGER: OnceLock<&'static CaptureLogger> = OnceLock::new();
    LOGGER.get_or_init(|| {
        let logger: &'static CaptureLogger = Box::leak(Box::new(CaptureLogger {
            lines: Mutex::new(Vec::new()),
        }));
        if log::set_logger(logger).is_ok() {
            log::set_max_level(LevelFilter::Trace);
        }
        logger
    })
}

/// Installs the capturing logger unless one is already set.
pub fn install() {
    logger();
}

/// Installs the capturing logger (once) and returns everything logged so
/// far.
pub fn captured_logs() -> Vec<CapturedLog> {
    logger()
        .lines
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
}

/// Messages logged at `level` that contain `needle`.
pub fn logs_at(level: Level, needle: &str) -> Vec<String> {
    captured_logs()
        .into_iter()
        .filter(|line| line.level == level && line.message.contains(needle))
        .map(|line| line.message)
        .collect()
}
