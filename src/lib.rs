//! # Zero-Alloc Logger
//!
//! An asynchronous logging engine for latency-sensitive applications. Logging
//! threads never allocate, never take a lock and never do I/O:
//!
//! * **Allocation-free recording**: arguments are encoded as compact
//!   `(type tag, payload)` pairs into pre-allocated, pooled events
//! * **Lock-free hand-off**: a bounded multi-producer queue with per-slot
//!   sequence numbers passes events to a single background writer
//! * **Deferred formatting**: templates are kept by reference and rendered,
//!   together with the decoded arguments, on the writer thread
//! * **Typed values**: enums and plain-old-data structs are logged by value
//!   and rendered through a type registry built before start-up
//!
//! ## Main Components
//!
//! * `LogManager`: owns the event pool, the writer thread and the appenders
//! * `Logger`: per-name handle offering template calls and a fluent builder
//! * `TypeRegistry`: formatting behavior for enum and unmanaged types
//! * `Appender`: output destination; console and daily file appenders ship
//!   with the crate
//! * `LogBridge`: routes records from the `log` facade into the engine
//!
//! ## Quick Start
//!
//! ```
//! use zero_alloc_logger::{info, log_enum, ConsoleAppender, Level, LogConfig, LogManager, TypeRegistry};
//!
//! log_enum! {
//!     pub enum Side { Buy, Sell }
//! }
//!
//! let mut registry = TypeRegistry::new();
//! registry.register_enum::<Side>();
//!
//! let config = LogConfig::default()
//!     .with_appender(ConsoleAppender::new())
//!     .with_level(Level::Info);
//! let manager = LogManager::configure(config, registry).unwrap();
//!
//! let logger = manager.get_logger("orders");
//! info!(logger, "{} {} @ {:.2}", Side::Buy, 100u32, 10.5f64);
//! logger.warn().append("rejected: ").append(Side::Sell).log();
//!
//! manager.shutdown().unwrap();
//! ```

pub mod appender;
pub mod argument;
pub mod config;
pub mod decoder;
pub mod efficient_clock;
pub mod encoder;
pub mod error;
pub mod event_queue;
pub mod formatter;
pub mod level;
pub mod log_bridge;
pub mod log_event;
pub mod log_manager;
pub mod logger;
pub mod string_registry;
pub mod type_registry;
pub mod writer;

pub use appender::{Appender, ConsoleAppender, FileAppender};
pub use argument::{EnumArg, LogArg, TypeTag, UnmanagedArg};
pub use config::{LogConfig, QueueFullPolicy};
pub use error::{ConfigError, ShutdownError};
pub use level::Level;
pub use log_bridge::LogBridge;
pub use log_event::LogEventHeader;
pub use log_manager::LogManager;
pub use logger::{LogBuilder, Logger};
pub use type_registry::{LogEnum, RenderOutcome, TypeRegistry, Unmanaged};
pub use writer::{ShutdownReport, WriterState};
