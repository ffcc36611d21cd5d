use std::env;
use std::fmt;
use std::io::{self, IsTerminal};
use std::thread;
use std::time::Instant;

use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use zero_alloc_logger::{
    info, log_enum, warn, ConsoleAppender, FileAppender, Level, LogBridge, LogConfig, LogManager,
    QueueFullPolicy, TypeRegistry, Unmanaged, UnmanagedArg,
};

log_enum! {
    pub enum Venue {
        Lse = 1,
        Xetra,
    }
}

#[repr(C)]
#[derive(Clone, Copy)]
struct Quote {
    bid: f64,
    ask: f64,
}

// SAFETY: two f64 fields, no padding and no pointers.
unsafe impl Unmanaged for Quote {}

impl fmt::Display for Quote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}/{:.2}", self.bid, self.ask)
    }
}

/// Subscriber for the crate's own diagnostics: filtered by `RUST_LOG`
/// (default `info`) and stamped with RFC 3339 UTC times.
fn diagnostics<W>(writer: W, ansi: bool) -> impl tracing::Subscriber + Send + Sync
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_timer(UtcTime::rfc_3339())
        .with_ansi(ansi)
        .with_writer(writer)
        .finish()
}

const PRODUCERS: usize = 4;
const EVENTS_PER_PRODUCER: usize = 10_000;

/// Logs a burst from several threads and prints the shutdown report.
///
/// Usage: `zero_alloc_logger [log directory]`. Without a directory events go
/// to stdout. Internal diagnostics follow `RUST_LOG`.
fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Only the tracing dispatcher is set: the `log` facade belongs to LogBridge.
    let ansi = io::stderr().is_terminal();
    tracing::subscriber::set_global_default(diagnostics(io::stderr, ansi))?;

    let mut registry = TypeRegistry::new();
    registry.register_enum::<Venue>().register_unmanaged::<Quote>();

    let mut config = LogConfig::default()
        .with_queue_size(8192)
        .with_level(Level::Debug)
        .with_queue_full_policy(QueueFullPolicy::DropAndNotify);
    config = match env::args().nth(1) {
        Some(directory) => config.with_appender(FileAppender::daily(directory, "demo")?),
        None => config.with_appender(ConsoleAppender::new()),
    };

    let manager = LogManager::configure(config, registry)?;
    LogBridge::install(&manager, log::LevelFilter::Info)?;
    log::info!(target: "demo.bridge", "bridge installed, {} producers", PRODUCERS);

    let started = Instant::now();
    thread::scope(|scope| {
        for producer in 0..PRODUCERS {
            let logger = manager.get_logger(&format!("demo.producer{}", producer));
            scope.spawn(move || {
                let session = Uuid::new_v4();
                for i in 0..EVENTS_PER_PRODUCER {
                    let quote = Quote {
                        bid: 100.0 + i as f64 / 100.0,
                        ask: 100.05 + i as f64 / 100.0,
                    };
                    if i % 2 == 0 {
                        info!(logger, "#{} {} quote {} session {}", i, Venue::Lse, UnmanagedArg(quote), session);
                    } else {
                        logger
                            .debug()
                            .append("#")
                            .append(i)
                            .append(" ")
                            .append(Venue::Xetra)
                            .append(" spread ")
                            .append(quote.ask - quote.bid)
                            .append(" elapsed ")
                            .append(started.elapsed())
                            .log();
                    }
                }
            });
        }
    });

    let logger = manager.get_logger("demo");
    warn!(logger, "burst finished in {} (dropped so far: {})", started.elapsed(), manager.dropped_count());

    let report = manager.shutdown()?;
    tracing::info!(
        written = report.events_written,
        dropped = report.events_dropped,
        appender_errors = report.appender_errors,
        "demo finished"
    );
    Ok(())
}
