use std::io;

use thiserror::Error;

/// Reasons [`LogManager::configure`](crate::LogManager::configure) can fail.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid configuration parameter `{parameter}`: {message}")]
    InvalidParameter {
        parameter: &'static str,
        message: String,
    },
    #[error("failed to spawn the background writer thread")]
    WriterSpawn(#[source] io::Error),
    #[error("the global log manager is already configured")]
    AlreadyConfigured,
}

/// Failures reported once, when a manager shuts down.
#[derive(Debug, Error)]
pub enum ShutdownError {
    #[error("appender `{name}` failed to {action}")]
    Appender {
        name: String,
        action: &'static str,
        #[source]
        source: io::Error,
    },
    #[error("the background writer thread panicked")]
    WriterPanicked,
    #[error("no log manager is configured")]
    NotConfigured,
}
