//! Low-overhead timestamp capture for log event headers.
//!
//! Reading the wall clock on every log call is comparatively expensive and is
//! not monotonic. Instead the clock samples the wall clock once, when it is
//! created, and derives every later wall-clock reading from the monotonic
//! `Instant` elapsed since then. A single clock read per event yields both a
//! monotonic and a wall-clock value that can never disagree in ordering.

use std::cell::Cell;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Utc};

/// A point in time captured by an [`EventClock`].
///
/// # Examples
///
/// ```
/// # use zero_alloc_logger::efficient_clock::EventClock;
/// let clock = EventClock::new();
/// let first = clock.now();
/// let second = clock.now();
/// assert!(second.monotonic() >= first.monotonic());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Timestamp {
    monotonic: Duration,
    unix_nanos: u64,
}

impl Timestamp {
    /// Time elapsed since the owning clock was created.
    pub fn monotonic(&self) -> Duration {
        self.monotonic
    }

    /// Nanoseconds since the Unix epoch.
    pub fn unix_nanos(&self) -> u64 {
        self.unix_nanos
    }

    pub fn system_time(&self) -> SystemTime {
        UNIX_EPOCH + Duration::from_nanos(self.unix_nanos)
    }

    /// The wall-clock reading as a UTC date-time, for rendering.
    pub fn to_datetime(&self) -> DateTime<Utc> {
        DateTime::<Utc>::from(self.system_time())
    }
}

/// Converts a single monotonic reading into both header timestamps.
///
/// Every method takes `&self`; one instance lives in the manager and is read
/// concurrently by all producers.
#[derive(Debug, Clone)]
pub struct EventClock {
    origin: Instant,
    origin_unix_nanos: u64,
}

impl EventClock {
    /// Creates a clock anchored at the current wall-clock time.
    pub fn new() -> Self {
        let origin_unix_nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0);
        Self {
            origin: Instant::now(),
            origin_unix_nanos,
        }
    }

    /// Captures the current time.
    ///
    /// This performs one monotonic clock read and no allocation.
    #[inline]
    pub fn now(&self) -> Timestamp {
        let monotonic = self.origin.elapsed();
        Timestamp {
            monotonic,
            unix_nanos: self
                .origin_unix_nanos
                .saturating_add(monotonic.as_nanos() as u64),
        }
    }
}

impl Default for EventClock {
    fn default() -> Self {
        Self::new()
    }
}

static NEXT_THREAD_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static THREAD_ID: Cell<u64> = const { Cell::new(0) };
}

/// Small sequential id of the calling thread, assigned on first use.
///
/// `std::thread::ThreadId` has no stable integer form, and `thread::current()`
/// may allocate the first time it is called on a thread, so producers use this
/// instead.
#[inline]
pub fn current_thread_id() -> u64 {
    THREAD_ID.with(|id| {
        let mut value = id.get();
        if value == 0 {
            value = NEXT_THREAD_ID.fetch_add(1, Ordering::Relaxed);
            id.set(value);
        }
        value
    })
}
