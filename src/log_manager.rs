use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::Mutex;
use tracing::{error, info};

use crate::config::LogConfig;
use crate::efficient_clock::{current_thread_id, EventClock};
use crate::error::{ConfigError, ShutdownError};
#[cfg(test)]
use crate::event_queue::ConsumerCursor;
use crate::event_queue::{Claim, EventQueue};
use crate::formatter::MessageFormatter;
use crate::level::Level;
use crate::log_event::LogEventHeader;
use crate::logger::Logger;
use crate::string_registry::{intern, LoggerName};
use crate::type_registry::TypeRegistry;
use crate::writer::{BackgroundWriter, ShutdownReport, ShutdownRequest, WriterOutcome, WriterSignal, WriterState};

/// Everything producers touch, shared by loggers and the writer.
pub(crate) struct Shared {
    pub(crate) queue: EventQueue,
    pub(crate) signal: WriterSignal,
    pub(crate) clock: EventClock,
    level: Level,
    accepting: AtomicBool,
}

impl Shared {
    #[inline]
    pub(crate) fn is_enabled(&self, level: Level) -> bool {
        level >= self.level && self.accepting.load(Ordering::Relaxed)
    }

    /// Claims a slot and writes the header. `None` when the level is
    /// filtered out, the manager is shut down, or the queue is full.
    #[inline]
    pub(crate) fn begin_event(
        &self,
        logger: LoggerName,
        level: Level,
        template: Option<&'static str>,
    ) -> Option<Claim<'_>> {
        if !self.is_enabled(level) {
            return None;
        }
        let mut claim = self.queue.claim()?;
        let header = LogEventHeader::new(self.clock.now(), level, logger, current_thread_id());
        claim.event_mut().reset(header, template);
        Some(claim)
    }

    #[inline]
    pub(crate) fn publish(&self, claim: Claim<'_>) {
        claim.commit();
        self.signal.notify_published();
    }

    /// A pipeline with no writer thread; the caller consumes directly.
    #[cfg(test)]
    pub(crate) fn detached(capacity: usize, buffer_size: usize, level: Level) -> (Arc<Shared>, ConsumerCursor) {
        let (queue, cursor) = EventQueue::new(capacity, buffer_size, crate::config::QueueFullPolicy::Drop);
        let shared = Arc::new(Shared {
            queue,
            signal: WriterSignal::new(),
            clock: EventClock::new(),
            level,
            accepting: AtomicBool::new(true),
        });
        (shared, cursor)
    }
}

/// Owner of the logging pipeline: the event pool, the writer thread, the
/// appenders and the type registry.
///
/// A manager is created with [`configure`](LogManager::configure) and lives
/// until [`shutdown`](LogManager::shutdown), [`shutdown_now`](LogManager::shutdown_now)
/// or drop. Loggers handed out by it keep working (and silently drop their
/// events) after it is gone.
///
/// # Examples
///
/// ```
/// # use zero_alloc_logger::{LogConfig, LogManager, TypeRegistry};
/// let manager = LogManager::configure(LogConfig::default(), TypeRegistry::new()).unwrap();
/// let logger = manager.get_logger("app");
/// logger.info().append("started").log();
/// let report = manager.shutdown().unwrap();
/// assert_eq!(report.events_written, 1);
/// ```
pub struct LogManager {
    shared: Arc<Shared>,
    registry: Arc<TypeRegistry>,
    loggers: Mutex<HashMap<&'static str, Logger>>,
    writer: Option<JoinHandle<WriterOutcome>>,
}

impl LogManager {
    /// Validates `config`, allocates the event pool and starts the writer.
    ///
    /// The registry is frozen from here on: register every enum and
    /// unmanaged type before calling this.
    pub fn configure(config: LogConfig, registry: TypeRegistry) -> Result<LogManager, ConfigError> {
        config.validate()?;
        let LogConfig {
            appenders,
            log_event_queue_size,
            log_event_buffer_size,
            level,
            queue_full_policy,
            null_display,
            truncated_message_suffix,
        } = config;

        let (queue, cursor) = EventQueue::new(log_event_queue_size, log_event_buffer_size, queue_full_policy);
        let shared = Arc::new(Shared {
            queue,
            signal: WriterSignal::new(),
            clock: EventClock::new(),
            level,
            accepting: AtomicBool::new(true),
        });
        let registry = Arc::new(registry);
        let appender_count = appenders.len();

        let writer = BackgroundWriter::new(
            Arc::clone(&shared),
            cursor,
            appenders,
            Arc::clone(&registry),
            MessageFormatter::new(null_display, truncated_message_suffix),
        );
        let handle = thread::Builder::new()
            .name("log-writer".to_string())
            .spawn(move || writer.run())
            .map_err(ConfigError::WriterSpawn)?;
        shared.signal.register(handle.thread().clone());

        info!(
            queue_size = log_event_queue_size,
            buffer_size = log_event_buffer_size,
            level = %level,
            policy = ?queue_full_policy,
            appenders = appender_count,
            registered_types = registry.len(),
            "log manager configured"
        );

        Ok(LogManager {
            shared,
            registry,
            loggers: Mutex::new(HashMap::new()),
            writer: Some(handle),
        })
    }

    /// Returns the logger for `name`, creating it on first use. Repeated
    /// calls with the same name return the same handle.
    pub fn get_logger(&self, name: &str) -> Logger {
        let mut loggers = self.loggers.lock();
        if let Some(logger) = loggers.get(name) {
            return logger.clone();
        }
        let interned = intern(name);
        let logger = Logger::new(interned, Arc::clone(&self.shared));
        loggers.insert(interned.name, logger.clone());
        logger
    }

    pub fn writer_state(&self) -> WriterState {
        self.shared.signal.state()
    }

    pub fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    pub fn level(&self) -> Level {
        self.shared.level
    }

    /// Events rejected so far because the queue was full.
    pub fn dropped_count(&self) -> u64 {
        self.shared.queue.dropped_count()
    }

    /// Approximate number of events waiting for the writer.
    pub fn pending_events(&self) -> usize {
        self.shared.queue.len()
    }

    pub(crate) fn shared(&self) -> &Arc<Shared> {
        &self.shared
    }

    /// Stops accepting events, writes everything already queued, then flushes
    /// and closes every appender.
    ///
    /// # Errors
    ///
    /// Returns the first appender flush or close failure, or
    /// [`ShutdownError::WriterPanicked`].
    pub fn shutdown(mut self) -> Result<ShutdownReport, ShutdownError> {
        self.stop(ShutdownRequest::Graceful)
    }

    /// Like [`shutdown`](LogManager::shutdown), but queued events are released
    /// without being written. They are counted in
    /// [`ShutdownReport::events_abandoned`].
    pub fn shutdown_now(mut self) -> Result<ShutdownReport, ShutdownError> {
        self.stop(ShutdownRequest::Immediate)
    }

    fn stop(&mut self, request: ShutdownRequest) -> Result<ShutdownReport, ShutdownError> {
        let handle = self.writer.take().ok_or(ShutdownError::NotConfigured)?;
        self.shared.accepting.store(false, Ordering::SeqCst);
        self.shared.signal.request_shutdown(request);

        let outcome = handle.join().map_err(|_| ShutdownError::WriterPanicked)?;
        match outcome.error {
            Some(err) => Err(err),
            None => Ok(outcome.report),
        }
    }
}

impl Drop for LogManager {
    fn drop(&mut self) {
        if self.writer.is_some() {
            if let Err(err) = self.stop(ShutdownRequest::Graceful) {
                error!(error = %err, "log manager shutdown failed");
            }
        }
    }
}

/// Process-wide manager slot for applications that prefer ambient access.
///
/// ```
/// # use zero_alloc_logger::{log_manager::global, LogConfig, TypeRegistry};
/// global::configure(LogConfig::default(), TypeRegistry::new()).unwrap();
/// let logger = global::get_logger("app").unwrap();
/// logger.info().append("hello").log();
/// global::shutdown().unwrap();
/// assert!(!global::is_configured());
/// ```
pub mod global {
    use lazy_static::lazy_static;
    use parking_lot::Mutex;

    use super::LogManager;
    use crate::config::LogConfig;
    use crate::error::{ConfigError, ShutdownError};
    use crate::logger::Logger;
    use crate::type_registry::TypeRegistry;
    use crate::writer::ShutdownReport;

    lazy_static! {
        static ref MANAGER: Mutex<Option<LogManager>> = Mutex::new(None);
    }

    /// Configures the global manager. Fails if one is already running; shut
    /// it down first to reconfigure.
    pub fn configure(config: LogConfig, registry: TypeRegistry) -> Result<(), ConfigError> {
        let mut slot = MANAGER.lock();
        if slot.is_some() {
            return Err(ConfigError::AlreadyConfigured);
        }
        *slot = Some(LogManager::configure(config, registry)?);
        Ok(())
    }

    /// `None` when no global manager is configured.
    pub fn get_logger(name: &str) -> Option<Logger> {
        MANAGER.lock().as_ref().map(|manager| manager.get_logger(name))
    }

    /// Shuts the global manager down and empties the slot, releasing its
    /// event pool.
    pub fn shutdown() -> Result<ShutdownReport, ShutdownError> {
        let manager = MANAGER.lock().take().ok_or(ShutdownError::NotConfigured)?;
        manager.shutdown()
    }

    pub fn is_configured() -> bool {
        MANAGER.lock().is_some()
    }
}
