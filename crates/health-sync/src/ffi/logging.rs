//! FFI logging backend that routes logs to Swift/Kotlin via callback
//!
//! A custom `log` backend forwards records to a UniFFI callback, so engine
//! logs show up in os_log on iOS and Logcat on Android. Records from other
//! crates (HTTP client, migrations) are capped at `Warn`.

use std::sync::{Arc, OnceLock, RwLock};

use log::{Level, Log, Metadata, Record, SetLoggerError};

use super::types::{FfiLogLevel, LogCallback};

/// Target prefix of this crate's records
const ENGINE_TARGET: &str = "health_sync";

/// Ceiling for records from dependencies
const DEPENDENCY_MAX_LEVEL: Level = Level::Warn;

/// Global storage for the FFI logger
static FFI_LOGGER: OnceLock<FfiLogger> = OnceLock::new();

/// Logger that forwards to a callback when one is set
struct FfiLogger {
    callback: RwLock<Option<Arc<dyn LogCallback>>>,
    max_level: RwLock<Level>,
}

impl FfiLogger {
    fn new(max_level: Level) -> Self {
        Self {
            callback: RwLock::new(None),
            max_level: RwLock::new(max_level),
        }
    }

    fn set_callback(&self, callback: Option<Arc<dyn LogCallback>>) {
        if let Ok(mut guard) = self.callback.write() {
            *guard = callback;
        }
    }

    fn set_max_level(&self, level: Level) {
        if let Ok(mut guard) = self.max_level.write() {
            *guard = level;
        }
    }

    fn max_level(&self) -> Level {
        self.max_level.read().map(|l| *l).unwrap_or(Level::Info)
    }

    /// Most verbose level forwarded for `target`
    fn level_for(&self, target: &str) -> Level {
        let max = self.max_level();
        if target.starts_with(ENGINE_TARGET) {
            max
        } else {
            max.min(DEPENDENCY_MAX_LEVEL)
        }
    }
}

impl Log for FfiLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level_for(metadata.target())
            && self.callback.read().ok().is_some_and(|cb| cb.is_some())
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        if let Ok(guard) = self.callback.read() {
            if let Some(ref callback) = *guard {
                // Callback failures are ignored; logging them would recurse
                callback.on_log(
                    FfiLogLevel::from(record.level()),
                    record.target().to_string(),
                    record.args().to_string(),
                );
            }
        }
    }

    fn flush(&self) {}
}

/// Install the FFI logger as the global logger
///
/// Call once at startup. Until a callback is set via [`set_log_callback`],
/// records are dropped.
///
/// # Returns
/// Err if another logger was already installed.
pub fn init_ffi_logger(max_level: Level) -> Result<(), SetLoggerError> {
    let logger = FFI_LOGGER.get_or_init(|| FfiLogger::new(max_level));

    log::set_logger(logger)?;
    log::set_max_level(max_level.to_level_filter());
    Ok(())
}

/// Set the callback that receives log records; `None` silences logging
///
/// Thread-safe; may be called at any time after [`init_ffi_logger`].
pub fn set_log_callback(callback: Option<Arc<dyn LogCallback>>) {
    if let Some(logger) = FFI_LOGGER.get() {
        logger.set_callback(callback);
    }
}

/// Update the maximum log level
pub fn set_log_level(level: Level) {
    if let Some(logger) = FFI_LOGGER.get() {
        logger.set_max_level(level);
        log::set_max_level(level.to_level_filter());
    }
}
