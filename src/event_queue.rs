use std::cell::UnsafeCell;
use std::hint;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::thread;
use std::time::Instant;

use crate::config::QueueFullPolicy;
use crate::log_event::LogEvent;

/// Bounded multi-producer, single-consumer queue over a pool of log events.
///
/// The queue is an arena of slots indexed by a monotonically increasing
/// position modulo the capacity. Each slot carries its own atomic sequence,
/// which encodes its state relative to the position `p` that maps onto it:
///
/// | slot sequence | state |
/// |---------------|-------|
/// | `2p`              | free, claimable for position `p` |
/// | (unchanged, CAS won on the enqueue cursor) | claimed by one producer |
/// | `2p + 1`          | published, readable by the consumer |
/// | `2(p + capacity)` | consumed and free again for position `p + capacity` |
///
/// Sequences step by two per position so a published slot is never mistaken
/// for a free one, even with a capacity of one.
///
/// Producers race only on the enqueue cursor; a successful CAS hands them
/// exclusive ownership of the slot until they publish it. No lock is taken
/// and no event is ever allocated after construction.
///
/// The consumer reads positions strictly in order, so events from a single
/// producer are seen in the order that producer logged them.
pub struct EventQueue {
    slots: Box<[Slot]>,
    capacity: usize,
    enqueue_pos: AtomicUsize,
    /// Mirror of the consumer cursor, for length queries.
    dequeue_pos: AtomicUsize,
    dropped: AtomicU64,
    policy: QueueFullPolicy,
}

struct Slot {
    sequence: AtomicUsize,
    event: UnsafeCell<LogEvent>,
}

// SAFETY: access to each slot's event is serialized by the sequence protocol:
// only the producer that won the CAS for a position writes the event, and the
// consumer reads it only after observing the release-store publishing it.
unsafe impl Sync for EventQueue {}

/// Read position of the single consumer.
///
/// Exactly one cursor is created per queue and it cannot be cloned, so only
/// its owner can consume.
#[derive(Debug)]
pub struct ConsumerCursor {
    pos: usize,
}

/// Spins before falling back to `yield_now` under the blocking policy.
const SPIN_LIMIT: u32 = 64;

#[inline]
fn free_sequence(pos: usize) -> usize {
    pos.wrapping_mul(2)
}

#[inline]
fn published_sequence(pos: usize) -> usize {
    pos.wrapping_mul(2).wrapping_add(1)
}

impl EventQueue {
    /// Allocates `capacity` events of `buffer_size` bytes each.
    pub fn new(capacity: usize, buffer_size: usize, policy: QueueFullPolicy) -> (Self, ConsumerCursor) {
        let capacity = capacity.max(1);
        let slots = (0..capacity)
            .map(|index| Slot {
                sequence: AtomicUsize::new(free_sequence(index)),
                event: UnsafeCell::new(LogEvent::with_capacity(buffer_size)),
            })
            .collect::<Vec<_>>()
            .into_boxed_slice();

        let queue = Self {
            slots,
            capacity,
            enqueue_pos: AtomicUsize::new(0),
            dequeue_pos: AtomicUsize::new(0),
            dropped: AtomicU64::new(0),
            policy,
        };
        (queue, ConsumerCursor { pos: 0 })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn policy(&self) -> QueueFullPolicy {
        self.policy
    }

    /// Approximate number of claimed or published events not yet consumed.
    pub fn len(&self) -> usize {
        let enqueued = self.enqueue_pos.load(Ordering::Acquire);
        let dequeued = self.dequeue_pos.load(Ordering::Acquire);
        enqueued.wrapping_sub(dequeued).min(self.capacity)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Events rejected because the queue was full.
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Claims a free slot without waiting. Returns `None` when full.
    pub fn try_claim(&self) -> Option<Claim<'_>> {
        let mut pos = self.enqueue_pos.load(Ordering::Relaxed);
        loop {
            let slot = &self.slots[pos % self.capacity];
            let sequence = slot.sequence.load(Ordering::Acquire);
            let diff = sequence.wrapping_sub(free_sequence(pos)) as isize;

            if diff == 0 {
                match self.enqueue_pos.compare_exchange_weak(
                    pos,
                    pos.wrapping_add(1),
                    Ordering::Relaxed,
                    Ordering::Relaxed,
                ) {
                    Ok(_) => {
                        return Some(Claim {
                            slot,
                            pos,
                            committed: false,
                        })
                    }
                    Err(current) => pos = current,
                }
            } else if diff < 0 {
                // The slot still holds an event from the previous lap.
                return None;
            } else {
                pos = self.enqueue_pos.load(Ordering::Relaxed);
            }
        }
    }

    /// Claims a slot, applying the full-queue policy when none is free.
    ///
    /// Returns `None` when the event must be dropped; the drop is counted.
    pub fn claim(&self) -> Option<Claim<'_>> {
        if let Some(claim) = self.try_claim() {
            return Some(claim);
        }

        match self.policy {
            QueueFullPolicy::Drop | QueueFullPolicy::DropAndNotify => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                None
            }
            QueueFullPolicy::Block { timeout } => {
                let started = Instant::now();
                let mut spins = 0u32;
                loop {
                    if spins < SPIN_LIMIT {
                        spins += 1;
                        hint::spin_loop();
                    } else {
                        thread::yield_now();
                    }
                    if let Some(claim) = self.try_claim() {
                        return Some(claim);
                    }
                    if started.elapsed() >= timeout {
                        self.dropped.fetch_add(1, Ordering::Relaxed);
                        return None;
                    }
                }
            }
        }
    }

    /// True when the next position is published and ready to consume.
    pub fn has_ready(&self, cursor: &ConsumerCursor) -> bool {
        let slot = &self.slots[cursor.pos % self.capacity];
        slot.sequence.load(Ordering::Acquire) == published_sequence(cursor.pos)
    }

    /// True when every claimed position has been consumed.
    pub fn is_drained(&self, cursor: &ConsumerCursor) -> bool {
        self.enqueue_pos.load(Ordering::Acquire) == cursor.pos
    }

    /// Hands the next published event to `read`, then frees its slot.
    ///
    /// Returns `None` without calling `read` if the next position has not
    /// been published yet. The slot is freed and the cursor advanced even if
    /// `read` panics.
    pub fn try_consume<R, F>(&self, cursor: &mut ConsumerCursor, read: F) -> Option<R>
    where
        F: FnOnce(&LogEvent) -> R,
    {
        let slot = &self.slots[cursor.pos % self.capacity];
        if slot.sequence.load(Ordering::Acquire) != published_sequence(cursor.pos) {
            return None;
        }

        let release = Release {
            queue: self,
            slot,
            cursor,
        };
        // SAFETY: the acquire load above observed the producer's publish, and
        // no producer can claim this slot again until `release` is dropped.
        let result = read(unsafe { &*release.slot.event.get() });
        drop(release);
        Some(result)
    }
}

/// Frees a consumed slot and advances the consumer past it when dropped.
struct Release<'a> {
    queue: &'a EventQueue,
    slot: &'a Slot,
    cursor: &'a mut ConsumerCursor,
}

impl Drop for Release<'_> {
    fn drop(&mut self) {
        let pos = self.cursor.pos;
        self.slot.sequence.store(
            free_sequence(pos.wrapping_add(self.queue.capacity)),
            Ordering::Release,
        );
        self.cursor.pos = pos.wrapping_add(1);
        self.queue.dequeue_pos.store(self.cursor.pos, Ordering::Release);
    }
}

/// Exclusive ownership of one claimed slot.
///
/// The slot is always published when the claim is dropped, so ownership can
/// never leak. A claim dropped without [`commit`](Claim::commit) is published
/// as abandoned and the consumer skips it.
pub struct Claim<'q> {
    slot: &'q Slot,
    pos: usize,
    committed: bool,
}

impl Claim<'_> {
    pub fn event_mut(&mut self) -> &mut LogEvent {
        // SAFETY: winning the CAS for `pos` grants exclusive access to the
        // slot until it is published in `drop`.
        unsafe { &mut *self.slot.event.get() }
    }

    /// Sequence position of this claim.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Publishes the event to the consumer.
    pub fn commit(mut self) {
        self.committed = true;
    }
}

impl Drop for Claim<'_> {
    fn drop(&mut self) {
        let abandoned = !self.committed;
        self.event_mut().seal(abandoned);
        self.slot
            .sequence
            .store(published_sequence(self.pos), Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::efficient_clock::EventClock;
    use crate::level::Level;
    use crate::log_event::LogEventHeader;
    use crate::string_registry::intern;
    use std::time::Duration;

    fn header() -> LogEventHeader {
        LogEventHeader::new(EventClock::new().now(), Level::Info, intern("queue-tests"), 1)
    }

    fn publish(queue: &EventQueue, value: u32) -> bool {
        match queue.claim() {
            Some(mut claim) => {
                let event = claim.event_mut();
                event.reset(header(), None);
                event.append(|encoder| encoder.append_u32(value));
                claim.commit();
                true
            }
            None => false,
        }
    }

    fn consume(queue: &EventQueue, cursor: &mut ConsumerCursor) -> Option<u32> {
        queue.try_consume(cursor, |event| {
            let payload = event.payload();
            u32::from_le_bytes(payload[1..5].try_into().unwrap())
        })
    }

    #[test]
    fn test_fifo_and_slot_reuse() {
        let (queue, mut cursor) = EventQueue::new(3, 16, QueueFullPolicy::Drop);
        for lap in 0..4 {
            for i in 0..3 {
                assert!(publish(&queue, lap * 10 + i));
            }
            assert_eq!(queue.len(), 3);
            for i in 0..3 {
                assert_eq!(consume(&queue, &mut cursor), Some(lap * 10 + i));
            }
            assert!(queue.is_drained(&cursor));
        }
        assert_eq!(consume(&queue, &mut cursor), None);
    }

    #[test]
    fn test_drop_policy_counts() {
        let (queue, _cursor) = EventQueue::new(2, 16, QueueFullPolicy::Drop);
        assert!(publish(&queue, 1));
        assert!(publish(&queue, 2));
        assert!(!publish(&queue, 3));
        assert!(!publish(&queue, 4));
        assert_eq!(queue.dropped_count(), 2);
    }

    #[test]
    fn test_block_policy_times_out() {
        let policy = QueueFullPolicy::Block {
            timeout: Duration::from_millis(5),
        };
        let (queue, _cursor) = EventQueue::new(1, 16, policy);
        assert!(publish(&queue, 1));
        let started = Instant::now();
        assert!(!publish(&queue, 2));
        assert!(started.elapsed() >= Duration::from_millis(5));
        assert_eq!(queue.dropped_count(), 1);
    }

    #[test]
    fn test_capacity_one_never_overwrites_unread_event() {
        let (queue, mut cursor) = EventQueue::new(1, 16, QueueFullPolicy::Drop);
        assert!(publish(&queue, 1));
        assert!(!publish(&queue, 2));
        assert_eq!(consume(&queue, &mut cursor), Some(1));
        assert!(publish(&queue, 3));
        assert_eq!(consume(&queue, &mut cursor), Some(3));
        assert_eq!(queue.dropped_count(), 1);
    }

    #[test]
    fn test_unpublished_claim_blocks_consumer() {
        let (queue, mut cursor) = EventQueue::new(4, 16, QueueFullPolicy::Drop);
        let mut first = queue.try_claim().unwrap();
        first.event_mut().reset(header(), None);
        assert!(publish(&queue, 2));

        assert!(!queue.has_ready(&cursor));
        assert_eq!(consume(&queue, &mut cursor), None);

        first.event_mut().append(|encoder| encoder.append_u32(1));
        first.commit();
        assert_eq!(consume(&queue, &mut cursor), Some(1));
        assert_eq!(consume(&queue, &mut cursor), Some(2));
    }

    #[test]
    fn test_dropped_claim_is_published_as_abandoned() {
        let (queue, mut cursor) = EventQueue::new(2, 16, QueueFullPolicy::Drop);
        {
            let mut claim = queue.try_claim().unwrap();
            claim.event_mut().reset(header(), None);
        }
        let abandoned = queue.try_consume(&mut cursor, |event| event.is_abandoned());
        assert_eq!(abandoned, Some(true));
    }

    #[test]
    fn test_panicking_reader_still_frees_slot() {
        let (queue, mut cursor) = EventQueue::new(1, 16, QueueFullPolicy::Drop);
        assert!(publish(&queue, 1));

        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            queue.try_consume(&mut cursor, |_| -> u32 { panic!("reader failed") })
        }));
        assert!(outcome.is_err());
        assert_eq!(queue.len(), 0);

        assert!(publish(&queue, 2));
        assert_eq!(consume(&queue, &mut cursor), Some(2));
        assert_eq!(queue.dropped_count(), 0);
    }
}
