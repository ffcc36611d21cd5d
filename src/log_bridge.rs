use std::sync::Arc;

use log::{LevelFilter, Log, Metadata, Record, SetLoggerError};

use crate::level::Level;
use crate::log_manager::{LogManager, Shared};
use crate::string_registry::intern;

/// Backend for the `log` crate facade.
///
/// Each record becomes a builder-style event: the record target is the logger
/// name and the message is formatted straight into the event buffer as one
/// string argument. `log` has no fatal level, so bridged events are at most
/// `Error`.
///
/// Record targets are interned on first sight, which takes a lock; after
/// that the path is the same as a native logger's.
pub struct LogBridge {
    shared: Arc<Shared>,
}

impl LogBridge {
    pub fn new(manager: &LogManager) -> Self {
        Self {
            shared: Arc::clone(manager.shared()),
        }
    }

    /// Installs a bridge to `manager` as the global `log` backend.
    ///
    /// # Errors
    ///
    /// Fails if a `log` backend is already installed.
    pub fn install(manager: &LogManager, max_level: LevelFilter) -> Result<(), SetLoggerError> {
        log::set_boxed_logger(Box::new(Self::new(manager)))?;
        log::set_max_level(max_level);
        Ok(())
    }
}

impl Log for LogBridge {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        self.shared.is_enabled(Level::from(metadata.level()))
    }

    fn log(&self, record: &Record<'_>) {
        let level = Level::from(record.level());
        if !self.shared.is_enabled(level) {
            return;
        }
        if let Some(mut claim) = self.shared.begin_event(intern(record.target()), level, None) {
            claim.event_mut().append(|encoder| encoder.append_fmt(*record.args()));
            self.shared.publish(claim);
        }
    }

    fn flush(&self) {}
}
