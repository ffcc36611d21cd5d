use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{fence, AtomicU8, Ordering};
use std::sync::{Arc, OnceLock};
use std::thread::{self, Thread};
use std::time::{Duration, Instant};

use tracing::{debug, error, info, trace, warn};

use crate::appender::Appender;
use crate::config::QueueFullPolicy;
use crate::efficient_clock::current_thread_id;
use crate::error::ShutdownError;
use crate::event_queue::ConsumerCursor;
use crate::formatter::{MessageFormatter, INVALID_MARKER};
use crate::level::Level;
use crate::log_event::{LogEvent, LogEventHeader};
use crate::log_manager::Shared;
use crate::string_registry::{intern, LoggerName};
use crate::type_registry::TypeRegistry;

/// How long the idle writer parks before checking the queue on its own.
const IDLE_PARK: Duration = Duration::from_millis(10);

/// How long a graceful shutdown waits for a claimed slot to be published.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

/// Logger name of the events the writer emits itself.
const WRITER_LOGGER: &str = "zero_alloc_logger";

/// Lifecycle of the background writer.
///
/// ```text
/// Idle ──(events published)──> Draining ──(queue empty, appenders flushed)──> Idle
///   │                             │
///   └──────(shutdown)─────────────┴──> ShuttingDown ──(drained, closed)──> Stopped
/// ```
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriterState {
    Idle = 0,
    Draining = 1,
    ShuttingDown = 2,
    Stopped = 3,
}

impl WriterState {
    fn from_u8(value: u8) -> WriterState {
        match value {
            0 => WriterState::Idle,
            1 => WriterState::Draining,
            2 => WriterState::ShuttingDown,
            _ => WriterState::Stopped,
        }
    }
}

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) enum ShutdownRequest {
    None = 0,
    /// Write every pending event, then stop.
    Graceful = 1,
    /// Release pending events unwritten, then stop.
    Immediate = 2,
}

/// State shared between producers, the manager and the writer thread.
#[derive(Debug)]
pub(crate) struct WriterSignal {
    state: AtomicU8,
    request: AtomicU8,
    thread: OnceLock<Thread>,
}

impl WriterSignal {
    pub(crate) fn new() -> Self {
        Self {
            state: AtomicU8::new(WriterState::Idle as u8),
            request: AtomicU8::new(ShutdownRequest::None as u8),
            thread: OnceLock::new(),
        }
    }

    pub(crate) fn register(&self, thread: Thread) {
        let _ = self.thread.set(thread);
    }

    pub(crate) fn state(&self) -> WriterState {
        WriterState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: WriterState) {
        self.state.store(state as u8, Ordering::Release);
    }

    fn request(&self) -> ShutdownRequest {
        match self.request.load(Ordering::Acquire) {
            0 => ShutdownRequest::None,
            1 => ShutdownRequest::Graceful,
            _ => ShutdownRequest::Immediate,
        }
    }

    /// Asks the writer to stop. An immediate request is never downgraded.
    pub(crate) fn request_shutdown(&self, request: ShutdownRequest) {
        self.request.fetch_max(request as u8, Ordering::AcqRel);
        self.wake();
    }

    fn wake(&self) {
        if let Some(thread) = self.thread.get() {
            thread.unpark();
        }
    }

    /// Called by producers after publishing. Only an idle writer is woken.
    #[inline]
    pub(crate) fn notify_published(&self) {
        // Pairs with the fence the writer issues after storing `Idle`.
        fence(Ordering::SeqCst);
        if self.state.load(Ordering::Relaxed) == WriterState::Idle as u8 {
            self.wake();
        }
    }
}

/// Totals returned by [`LogManager::shutdown`](crate::LogManager::shutdown).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Events rendered and handed to the appenders.
    pub events_written: u64,
    /// Events rejected because the queue was full.
    pub events_dropped: u64,
    /// Events released unwritten by `shutdown_now`.
    pub events_abandoned: u64,
    /// Appender write, flush and close failures, including panics.
    pub appender_errors: u64,
}

pub(crate) struct WriterOutcome {
    pub(crate) report: ShutdownReport,
    pub(crate) error: Option<ShutdownError>,
}

/// Runs an appender operation, turning a panic into an error.
fn guarded<F>(appender: &mut dyn Appender, action: &'static str, op: F) -> io::Result<()>
where
    F: FnOnce(&mut dyn Appender) -> io::Result<()>,
{
    match panic::catch_unwind(AssertUnwindSafe(|| op(appender))) {
        Ok(result) => result,
        Err(_) => Err(io::Error::other(format!("panicked during {}", action))),
    }
}

/// Rendering and delivery half of the writer.
struct Sinks {
    appenders: Vec<Box<dyn Appender>>,
    registry: Arc<TypeRegistry>,
    formatter: MessageFormatter,
    report: ShutdownReport,
}

impl Sinks {
    fn write(&mut self, event: &LogEvent) {
        if event.is_abandoned() {
            trace!(logger = event.header().logger_name, "skipping abandoned event");
            return;
        }
        let formatted = panic::catch_unwind(AssertUnwindSafe(|| {
            self.formatter.format(event, &self.registry);
        }));
        let message = match formatted {
            Ok(()) => self.formatter.output(),
            Err(_) => {
                error!(logger = event.header().logger_name, "formatting panicked");
                self.formatter.format_text(format_args!("{}", INVALID_MARKER))
            }
        };
        Self::deliver(&mut self.appenders, &mut self.report, event.header(), message.as_bytes());
        self.report.events_written += 1;
    }

    fn write_notice(&mut self, header: &LogEventHeader, args: std::fmt::Arguments<'_>) {
        let message = self.formatter.format_text(args);
        Self::deliver(&mut self.appenders, &mut self.report, header, message.as_bytes());
    }

    fn deliver(
        appenders: &mut [Box<dyn Appender>],
        report: &mut ShutdownReport,
        header: &LogEventHeader,
        message: &[u8],
    ) {
        for appender in appenders.iter_mut() {
            let result = guarded(appender.as_mut(), "write", |a| a.write_event(header, message));
            if let Err(err) = result {
                report.appender_errors += 1;
                warn!(appender = appender.name(), error = %err, "appender failed to write event");
            }
        }
    }

    fn flush(&mut self) {
        for appender in self.appenders.iter_mut() {
            if let Err(err) = guarded(appender.as_mut(), "flush", |a| a.flush()) {
                self.report.appender_errors += 1;
                warn!(appender = appender.name(), error = %err, "appender failed to flush");
            }
        }
    }

    /// Final flush and close. Returns the first failure.
    fn close(&mut self) -> Option<ShutdownError> {
        let mut first = None;
        for appender in self.appenders.iter_mut() {
            for action in ["flush", "close"] {
                let result = guarded(appender.as_mut(), action, |a| match action {
                    "flush" => a.flush(),
                    _ => a.close(),
                });
                if let Err(err) = result {
                    self.report.appender_errors += 1;
                    error!(appender = appender.name(), error = %err, "appender failed to {}", action);
                    if first.is_none() {
                        first = Some(ShutdownError::Appender {
                            name: appender.name().to_string(),
                            action,
                            source: err,
                        });
                    }
                }
            }
        }
        first
    }
}

/// The single consumer of the event queue.
pub(crate) struct BackgroundWriter {
    shared: Arc<Shared>,
    cursor: ConsumerCursor,
    sinks: Sinks,
    notice_logger: LoggerName,
    notified_drops: u64,
}

impl BackgroundWriter {
    pub(crate) fn new(
        shared: Arc<Shared>,
        cursor: ConsumerCursor,
        appenders: Vec<Box<dyn Appender>>,
        registry: Arc<TypeRegistry>,
        formatter: MessageFormatter,
    ) -> Self {
        Self {
            shared,
            cursor,
            sinks: Sinks {
                appenders,
                registry,
                formatter,
                report: ShutdownReport::default(),
            },
            notice_logger: intern(WRITER_LOGGER),
            notified_drops: 0,
        }
    }

    pub(crate) fn run(mut self) -> WriterOutcome {
        debug!(appenders = self.sinks.appenders.len(), "background writer started");
        let shared = Arc::clone(&self.shared);
        let signal = &shared.signal;

        let request = loop {
            let request = signal.request();
            if request != ShutdownRequest::None {
                break request;
            }

            if shared.queue.has_ready(&self.cursor) {
                signal.set_state(WriterState::Draining);
                self.drain_ready();
                continue;
            }

            let notified = self.notify_drops();
            if notified || signal.state() == WriterState::Draining {
                self.sinks.flush();
            }
            signal.set_state(WriterState::Idle);

            // A producer that published before this fence sees `Draining` and
            // skips the unpark, so look again before parking.
            fence(Ordering::SeqCst);
            if shared.queue.has_ready(&self.cursor) || signal.request() != ShutdownRequest::None {
                continue;
            }
            thread::park_timeout(IDLE_PARK);
        };

        signal.set_state(WriterState::ShuttingDown);
        match request {
            ShutdownRequest::Immediate => self.abandon_pending(),
            _ => self.drain_to_completion(),
        }
        self.notify_drops();

        let error = self.sinks.close();
        let mut report = self.sinks.report;
        report.events_dropped = shared.queue.dropped_count();
        signal.set_state(WriterState::Stopped);

        info!(
            written = report.events_written,
            dropped = report.events_dropped,
            abandoned = report.events_abandoned,
            appender_errors = report.appender_errors,
            "background writer stopped"
        );
        WriterOutcome { report, error }
    }

    /// Writes every published event, stopping early on an immediate
    /// shutdown request.
    fn drain_ready(&mut self) -> usize {
        let mut count = 0;
        while self.shared.signal.request() != ShutdownRequest::Immediate
            && self
                .shared
                .queue
                .try_consume(&mut self.cursor, |event| self.sinks.write(event))
                .is_some()
        {
            count += 1;
        }
        count
    }

    /// Writes events until every claimed slot is consumed. A slot that stays
    /// claimed but unpublished for longer than the grace period is given up
    /// on.
    fn drain_to_completion(&mut self) {
        let mut stalled_since = Instant::now();
        loop {
            if self.drain_ready() > 0 {
                stalled_since = Instant::now();
                continue;
            }
            if self.shared.queue.is_drained(&self.cursor) {
                break;
            }
            if stalled_since.elapsed() >= SHUTDOWN_GRACE {
                warn!(pending = self.shared.queue.len(), "giving up on unpublished events at shutdown");
                break;
            }
            thread::yield_now();
        }
    }

    fn abandon_pending(&mut self) {
        let report = &mut self.sinks.report;
        while let Some(abandoned) = self
            .shared
            .queue
            .try_consume(&mut self.cursor, |event| event.is_abandoned())
        {
            if !abandoned {
                report.events_abandoned += 1;
            }
        }
        debug!(abandoned = report.events_abandoned, "pending events released at shutdown");
    }

    /// Emits the full-queue notice when drops happened since the last one.
    fn notify_drops(&mut self) -> bool {
        if self.shared.queue.policy() != QueueFullPolicy::DropAndNotify {
            return false;
        }
        let dropped = self.shared.queue.dropped_count();
        let pending = dropped - self.notified_drops;
        if pending == 0 {
            return false;
        }
        self.notified_drops = dropped;

        let header = LogEventHeader::new(
            self.shared.clock.now(),
            Level::Warn,
            self.notice_logger,
            current_thread_id(),
        );
        self.sinks.write_notice(
            &header,
            format_args!("Log message skipped due to full queue ({} dropped)", pending),
        );
        true
    }
}
