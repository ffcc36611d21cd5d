use std::fmt;
use std::time::Duration;

use crate::appender::Appender;
use crate::error::ConfigError;
use crate::level::Level;

/// What a producer does when every slot of the event queue is taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QueueFullPolicy {
    /// Drop the event and count it.
    #[default]
    Drop,
    /// Drop the event and count it; the writer later emits one `Warn` event
    /// reporting how many events were lost since the previous notice.
    DropAndNotify,
    /// Spin, then yield, until a slot frees or `timeout` elapses. After the
    /// timeout the event is dropped and counted.
    Block { timeout: Duration },
}

/// Configuration of a [`LogManager`](crate::LogManager).
///
/// All sizes are fixed for the lifetime of the manager: the event pool is
/// allocated once at configure time and never grows.
///
/// # Examples
///
/// ```
/// # use zero_alloc_logger::{ConsoleAppender, Level, LogConfig, QueueFullPolicy};
/// let config = LogConfig::default()
///     .with_appender(ConsoleAppender::new())
///     .with_queue_size(4096)
///     .with_buffer_size(256)
///     .with_level(Level::Info)
///     .with_queue_full_policy(QueueFullPolicy::DropAndNotify);
/// assert!(config.validate().is_ok());
/// ```
pub struct LogConfig {
    pub appenders: Vec<Box<dyn Appender>>,
    /// Number of pooled events, which is also the queue capacity.
    pub log_event_queue_size: usize,
    /// Argument bytes available to a single event.
    pub log_event_buffer_size: usize,
    /// Minimum level that is recorded.
    pub level: Level,
    pub queue_full_policy: QueueFullPolicy,
    /// Rendered for an absent nullable argument.
    pub null_display: String,
    /// Appended to the message of a truncated event.
    pub truncated_message_suffix: String,
}

pub const DEFAULT_QUEUE_SIZE: usize = 1024;
pub const DEFAULT_BUFFER_SIZE: usize = 128;

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            appenders: Vec::new(),
            log_event_queue_size: DEFAULT_QUEUE_SIZE,
            log_event_buffer_size: DEFAULT_BUFFER_SIZE,
            level: Level::Trace,
            queue_full_policy: QueueFullPolicy::Drop,
            null_display: "null".to_string(),
            truncated_message_suffix: " [TRUNCATED]".to_string(),
        }
    }
}

impl LogConfig {
    pub fn with_appender(mut self, appender: impl Appender + 'static) -> Self {
        self.appenders.push(Box::new(appender));
        self
    }

    pub fn with_queue_size(mut self, size: usize) -> Self {
        self.log_event_queue_size = size;
        self
    }

    pub fn with_buffer_size(mut self, size: usize) -> Self {
        self.log_event_buffer_size = size;
        self
    }

    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    pub fn with_queue_full_policy(mut self, policy: QueueFullPolicy) -> Self {
        self.queue_full_policy = policy;
        self
    }

    pub fn with_null_display(mut self, text: impl Into<String>) -> Self {
        self.null_display = text.into();
        self
    }

    pub fn with_truncated_message_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.truncated_message_suffix = suffix.into();
        self
    }

    /// Checks the sizes before anything is allocated.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.log_event_queue_size == 0 {
            return Err(ConfigError::InvalidParameter {
                parameter: "log_event_queue_size",
                message: "must be at least 1".to_string(),
            });
        }
        if self.log_event_buffer_size == 0 {
            return Err(ConfigError::InvalidParameter {
                parameter: "log_event_buffer_size",
                message: "must be at least 1".to_string(),
            });
        }
        if self.log_event_buffer_size as u64 > u32::MAX as u64 {
            return Err(ConfigError::InvalidParameter {
                parameter: "log_event_buffer_size",
                message: format!("must not exceed {}", u32::MAX),
            });
        }
        Ok(())
    }
}

impl fmt::Debug for LogConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let appenders: Vec<&str> = self.appenders.iter().map(|a| a.name()).collect();
        f.debug_struct("LogConfig")
            .field("appenders", &appenders)
            .field("log_event_queue_size", &self.log_event_queue_size)
            .field("log_event_buffer_size", &self.log_event_buffer_size)
            .field("level", &self.level)
            .field("queue_full_policy", &self.queue_full_policy)
            .field("null_display", &self.null_display)
            .field("truncated_message_suffix", &self.truncated_message_suffix)
            .finish()
    }
}
