use std::fmt;
use std::sync::Arc;

use crate::argument::LogArg;
use crate::encoder::ArgumentEncoder;
use crate::event_queue::Claim;
use crate::level::Level;
use crate::log_manager::Shared;
use crate::string_registry::LoggerName;
use crate::type_registry::{LogEnum, Unmanaged};

/// A named handle for recording events.
///
/// Loggers are cheap to clone and can be shared freely between threads.
/// Every recording method returns `()`: when the level is disabled, the queue
/// is full or the manager has shut down, the event is silently discarded.
///
/// Two calling conventions produce identically encoded arguments:
///
/// ```
/// # use zero_alloc_logger::{info, LogConfig, LogManager, TypeRegistry};
/// # let manager = LogManager::configure(LogConfig::default(), TypeRegistry::new()).unwrap();
/// let logger = manager.get_logger("orders");
///
/// // Template call: the template is stored by reference.
/// info!(logger, "order {} filled at {:.2}", 1042u32, 99.5f64);
///
/// // Builder: arguments are appended one by one and rendered back to back.
/// logger.info().append("order ").append(1042u32).append(" filled").log();
/// # manager.shutdown().unwrap();
/// ```
#[derive(Clone)]
pub struct Logger {
    name: LoggerName,
    shared: Arc<Shared>,
}

impl Logger {
    pub(crate) fn new(name: LoggerName, shared: Arc<Shared>) -> Self {
        Self { name, shared }
    }

    pub fn name(&self) -> &'static str {
        self.name.name
    }

    /// Interned id of the logger name.
    pub fn id(&self) -> u32 {
        self.name.id
    }

    /// True when events at `level` would currently be recorded.
    #[inline]
    pub fn is_enabled(&self, level: Level) -> bool {
        self.shared.is_enabled(level)
    }

    /// Starts a builder-style event.
    #[inline]
    pub fn at(&self, level: Level) -> LogBuilder<'_> {
        LogBuilder {
            claim: self.shared.begin_event(self.name, level, None),
            shared: &self.shared,
        }
    }

    pub fn trace(&self) -> LogBuilder<'_> {
        self.at(Level::Trace)
    }

    pub fn debug(&self) -> LogBuilder<'_> {
        self.at(Level::Debug)
    }

    pub fn info(&self) -> LogBuilder<'_> {
        self.at(Level::Info)
    }

    pub fn warn(&self) -> LogBuilder<'_> {
        self.at(Level::Warn)
    }

    pub fn error(&self) -> LogBuilder<'_> {
        self.at(Level::Error)
    }

    pub fn fatal(&self) -> LogBuilder<'_> {
        self.at(Level::Fatal)
    }

    /// Records a template call. `template` is kept by reference and rendered
    /// by the writer; `args` are encoded in order.
    pub fn log_format(&self, level: Level, template: &'static str, args: &[&dyn LogArg]) {
        if let Some(mut claim) = self.shared.begin_event(self.name, level, Some(template)) {
            claim.event_mut().append(|encoder| {
                for arg in args {
                    encoder.append_arg(*arg);
                }
            });
            self.shared.publish(claim);
        }
    }

    pub fn trace_format(&self, template: &'static str, args: &[&dyn LogArg]) {
        self.log_format(Level::Trace, template, args)
    }

    pub fn debug_format(&self, template: &'static str, args: &[&dyn LogArg]) {
        self.log_format(Level::Debug, template, args)
    }

    pub fn info_format(&self, template: &'static str, args: &[&dyn LogArg]) {
        self.log_format(Level::Info, template, args)
    }

    pub fn warn_format(&self, template: &'static str, args: &[&dyn LogArg]) {
        self.log_format(Level::Warn, template, args)
    }

    pub fn error_format(&self, template: &'static str, args: &[&dyn LogArg]) {
        self.log_format(Level::Error, template, args)
    }

    pub fn fatal_format(&self, template: &'static str, args: &[&dyn LogArg]) {
        self.log_format(Level::Fatal, template, args)
    }
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger")
            .field("name", &self.name.name)
            .field("id", &self.name.id)
            .finish()
    }
}

/// An event under construction.
///
/// Each `append*` call encodes one argument directly into the claimed event.
/// [`log`](LogBuilder::log) publishes it. A builder dropped without `log` is
/// abandoned: its slot is handed back to the writer flagged as such and
/// nothing is written.
#[must_use = "nothing is recorded until `log()` is called"]
pub struct LogBuilder<'a> {
    claim: Option<Claim<'a>>,
    shared: &'a Shared,
}

impl<'a> LogBuilder<'a> {
    /// False when this builder discards everything (level disabled, queue
    /// full or manager shut down).
    pub fn is_recording(&self) -> bool {
        self.claim.is_some()
    }

    #[inline]
    fn encode<F>(mut self, encode: F) -> Self
    where
        F: FnOnce(&mut ArgumentEncoder<'_>),
    {
        if let Some(claim) = self.claim.as_mut() {
            claim.event_mut().append(encode);
        }
        self
    }

    /// Appends any loggable value, including `Option`s of one.
    pub fn append<T: LogArg>(self, value: T) -> Self {
        self.encode(|encoder| value.encode(encoder))
    }

    pub fn append_enum<E: LogEnum>(self, value: E) -> Self {
        self.encode(|encoder| encoder.append_enum(value))
    }

    pub fn append_enum_opt<E: LogEnum>(self, value: Option<E>) -> Self {
        self.encode(|encoder| match value {
            Some(value) => encoder.append_present(|inner| inner.append_enum(value)),
            None => encoder.append_null(),
        })
    }

    pub fn append_unmanaged<T: Unmanaged>(self, value: T) -> Self {
        self.encode(|encoder| encoder.append_unmanaged(&value))
    }

    pub fn append_unmanaged_opt<T: Unmanaged>(self, value: Option<T>) -> Self {
        self.encode(|encoder| match value {
            Some(value) => encoder.append_present(|inner| inner.append_unmanaged(&value)),
            None => encoder.append_null(),
        })
    }

    /// Appends `Display` output as a string argument, formatted straight into
    /// the event buffer.
    pub fn append_fmt(self, args: fmt::Arguments<'_>) -> Self {
        self.encode(|encoder| encoder.append_fmt(args))
    }

    /// Publishes the event.
    pub fn log(mut self) {
        if let Some(claim) = self.claim.take() {
            self.shared.publish(claim);
        }
    }
}

/// Records a template call at an explicit level.
///
/// Arguments are only evaluated when the level is enabled.
///
/// ```
/// # use zero_alloc_logger::{log_event, Level, LogConfig, LogManager, TypeRegistry};
/// # let manager = LogManager::configure(LogConfig::default(), TypeRegistry::new()).unwrap();
/// # let logger = manager.get_logger("doc");
/// log_event!(logger, Level::Warn, "disk {} at {}%", "/var", 91u8);
/// # manager.shutdown().unwrap();
/// ```
#[macro_export]
macro_rules! log_event {
    ($logger:expr, $level:expr, $template:literal $(, $arg:expr)* $(,)?) => {{
        let logger = &$logger;
        let level = $level;
        if logger.is_enabled(level) {
            logger.log_format(level, $template, &[$(&$arg as &dyn $crate::argument::LogArg),*]);
        }
    }};
}

#[macro_export]
macro_rules! trace {
    ($logger:expr, $($rest:tt)+) => {
        $crate::log_event!($logger, $crate::Level::Trace, $($rest)+)
    };
}

#[macro_export]
macro_rules! debug {
    ($logger:expr, $($rest:tt)+) => {
        $crate::log_event!($logger, $crate::Level::Debug, $($rest)+)
    };
}

#[macro_export]
macro_rules! info {
    ($logger:expr, $($rest:tt)+) => {
        $crate::log_event!($logger, $crate::Level::Info, $($rest)+)
    };
}

#[macro_export]
macro_rules! warn {
    ($logger:expr, $($rest:tt)+) => {
        $crate::log_event!($logger, $crate::Level::Warn, $($rest)+)
    };
}

#[macro_export]
macro_rules! error {
    ($logger:expr, $($rest:tt)+) => {
        $crate::log_event!($logger, $crate::Level::Error, $($rest)+)
    };
}

#[macro_export]
macro_rules! fatal {
    ($logger:expr, $($rest:tt)+) => {
        $crate::log_event!($logger, $crate::Level::Fatal, $($rest)+)
    };
}
