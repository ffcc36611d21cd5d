use std::alloc::{GlobalAlloc, Layout, System};
use std::cell::Cell;
use std::fmt;
use std::io;
use std::time::{Duration, SystemTime};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use zero_alloc_logger::{
    info, log_enum, warn, Appender, EnumArg, LogConfig, LogEnum, LogEventHeader, LogManager,
    QueueFullPolicy, TypeRegistry, Unmanaged, UnmanagedArg,
};

/// Counts allocations made by the current thread.
struct CountingAllocator;

thread_local! {
    static ALLOCATIONS: Cell<usize> = const { Cell::new(0) };
}

fn record_allocation() {
    let _ = ALLOCATIONS.try_with(|count| count.set(count.get() + 1));
}

fn allocations() -> usize {
    ALLOCATIONS.with(|count| count.get())
}

unsafe impl GlobalAlloc for CountingAllocator {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        record_allocation();
        System.alloc(layout)
    }

    unsafe fn alloc_zeroed(&self, layout: Layout) -> *mut u8 {
        record_allocation();
        System.alloc_zeroed(layout)
    }

    unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
        record_allocation();
        System.realloc(ptr, layout, new_size)
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        System.dealloc(ptr, layout)
    }
}

#[global_allocator]
static ALLOCATOR: CountingAllocator = CountingAllocator;

struct Discard;

impl Appender for Discard {
    fn name(&self) -> &str {
        "discard"
    }

    fn write_event(&mut self, _header: &LogEventHeader, _message: &[u8]) -> io::Result<()> {
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

log_enum! {
    enum Registered { First, Second }
}

log_enum! {
    enum Unregistered { Only = 9 }
}

#[derive(Debug, Clone, Copy)]
enum HandWritten {
    Value,
}

impl LogEnum for HandWritten {
    fn to_i64(self) -> i64 {
        0
    }

    fn from_i64(value: i64) -> Option<Self> {
        (value == 0).then_some(HandWritten::Value)
    }
}

#[repr(C)]
#[derive(Clone, Copy)]
struct Vector {
    x: f64,
    y: f64,
}

unsafe impl Unmanaged for Vector {}

impl fmt::Display for Vector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}, {}>", self.x, self.y)
    }
}

#[repr(C)]
#[derive(Clone, Copy)]
struct Opaque {
    bits: u64,
}

unsafe impl Unmanaged for Opaque {}

const WARM_UP: usize = 64;
const BURST: usize = 20_480;

/// Events a burst of `count` iterations hands to the writer: two on even
/// iterations, one on odd ones.
fn written_by(count: usize) -> u64 {
    (count / 2 * 3 + count % 2 * 2) as u64
}

#[test]
fn test_producer_path_does_not_allocate() {
    let mut registry = TypeRegistry::new();
    registry
        .register_enum::<Registered>()
        .register_enum::<HandWritten>()
        .register_unmanaged::<Vector>();
    // Producers wait for the writer instead of dropping, so every event takes
    // the full claim, encode and publish path.
    let config = LogConfig::default()
        .with_appender(Discard)
        .with_buffer_size(512)
        .with_queue_size(2048)
        .with_queue_full_policy(QueueFullPolicy::Block {
            timeout: Duration::from_secs(60),
        });
    let manager = LogManager::configure(config, registry).unwrap();
    let logger = manager.get_logger("allocation");

    let id = Uuid::new_v4();
    let at: DateTime<Utc> = DateTime::from_timestamp(1_700_000_000, 5).unwrap();
    let now = SystemTime::now();
    let text = String::from("owned text");
    let vector = Vector { x: 1.5, y: -2.0 };
    let opaque = Opaque { bits: 0xdead_beef };
    let present: Option<u32> = Some(4);
    let absent: Option<Registered> = None;

    let burst = |count: usize| {
        for i in 0..count {
            if i % 2 == 0 {
                info!(
                    logger,
                    "{} {} {} {} {} {} {} {} {} {} {} {} {} {} {} {} {} {} {} {} {} {}",
                    true,
                    i as u8,
                    -1i8,
                    2u16,
                    -3i16,
                    4u32,
                    -5i32,
                    i as u64,
                    -7i64,
                    8u128,
                    -9i128,
                    1.5f32,
                    2.5f64,
                    'x',
                    "static",
                    text,
                    id,
                    Duration::from_micros(i as u64),
                    at,
                    now,
                    Registered::Second,
                    Unregistered::Only
                );
                warn!(
                    logger,
                    "{} {} {} {} {}",
                    EnumArg(HandWritten::Value),
                    UnmanagedArg(vector),
                    UnmanagedArg(opaque),
                    present,
                    absent
                );
            } else {
                logger
                    .info()
                    .append(i)
                    .append("static")
                    .append(&text)
                    .append(id)
                    .append(at)
                    .append(Registered::First)
                    .append(Unregistered::Only)
                    .append_enum(HandWritten::Value)
                    .append_unmanaged(vector)
                    .append_unmanaged(opaque)
                    .append(present)
                    .append_enum_opt(absent)
                    .append_unmanaged_opt(Some(vector))
                    .append_fmt(format_args!("{}-{}", i, 'z'))
                    .log();
                let _abandoned = logger.debug().append(i);
            }
        }
    };

    // Warm-up: first-use work such as thread id assignment happens here.
    burst(WARM_UP);

    let before = allocations();
    burst(BURST);
    let after = allocations();
    assert_eq!(after - before, 0, "The producer path allocated {} times", after - before);

    let report = manager.shutdown().unwrap();
    assert_eq!(report.events_dropped, 0);
    assert_eq!(report.appender_errors, 0);
    assert_eq!(report.events_written, written_by(WARM_UP) + written_by(BURST));
}
