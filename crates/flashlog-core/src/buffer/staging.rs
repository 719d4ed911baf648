use std::cell::{Cell, UnsafeCell};
use std::ptr::NonNull;
use std::sync::atomic::{fence, AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::thread;

use crossbeam_utils::CachePadded;

use crate::clock;
use crate::error::FlashlogError;
use crate::types::Result;

/// Producer-updated half of the queue state.
///
/// `min_free_space` is a producer-private lower bound on the contiguous free
/// bytes at `pos`; it is a plain `Cell` because nothing but the producer
/// thread ever touches it.
struct ProducerHalf {
    /// Offset of the next byte the producer will write.
    pos: AtomicUsize,
    /// Highest offset the consumer may read before rolling back to zero.
    /// Republished by the producer on every wrap.
    end_of_recorded: AtomicUsize,
    /// Lower bound on contiguous free bytes at `pos`, refreshed on the slow
    /// path and shrunk by every commit.
    min_free_space: Cell<usize>,
    /// Cycles spent spinning in `reserve` while the queue was full.
    cycles_blocked: AtomicU64,
}

/// Consumer-updated half of the queue state.
struct ConsumerHalf {
    /// Offset of the next byte the consumer will read.
    pos: AtomicUsize,
    /// Set once when the owning thread terminates; the worker drains the
    /// remaining bytes and then reaps the buffer.
    retired: AtomicBool,
}

/// Single-producer / single-consumer circular byte queue.
///
/// A producer reserves a contiguous region, fills it, and commits it; the
/// consumer peeks at committed runs and consumes them byte-granularly. When
/// the tail of the storage cannot hold a reservation the producer publishes
/// the old tail as the end of recorded space and restarts at offset zero,
/// so a record is never split across the wrap.
///
/// # Safety contract
///
/// Exactly one thread may call the producer methods (`reserve`,
/// `try_reserve`, `commit`, `push`) and exactly one thread may call the
/// consumer methods (`peek`, `consume`, `can_reap`). The runtime enforces
/// this by handing each buffer to one logging thread and one worker.
pub struct StagingBuffer {
    producer: CachePadded<ProducerHalf>,
    consumer: CachePadded<ConsumerHalf>,
    id: u32,
    storage: Box<[UnsafeCell<u8>]>,
}

// The single-writer discipline documented on the type makes the interior
// Cell and UnsafeCell accesses race-free.
unsafe impl Send for StagingBuffer {}
unsafe impl Sync for StagingBuffer {}

impl StagingBuffer {
    pub fn new(id: u32, capacity: usize) -> Self {
        assert!(capacity > 0, "staging buffer capacity must be non-zero");
        let storage = (0..capacity)
            .map(|_| UnsafeCell::new(0u8))
            .collect::<Box<[_]>>();
        Self {
            producer: CachePadded::new(ProducerHalf {
                pos: AtomicUsize::new(0),
                end_of_recorded: AtomicUsize::new(capacity),
                min_free_space: Cell::new(capacity),
                cycles_blocked: AtomicU64::new(0),
            }),
            consumer: CachePadded::new(ConsumerHalf {
                pos: AtomicUsize::new(0),
                retired: AtomicBool::new(false),
            }),
            id,
            storage,
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn capacity(&self) -> usize {
        self.storage.len()
    }

    /// Reserves `nbytes` contiguous writable bytes, blocking behind the
    /// consumer when the queue is full.
    ///
    /// The returned region is invisible to the consumer until the matching
    /// [`commit`](Self::commit).
    #[inline]
    pub fn reserve(&self, nbytes: usize) -> Result<NonNull<u8>> {
        // Fast path: the cached bound already proves the space exists.
        if nbytes < self.producer.min_free_space.get() {
            return Ok(self.producer_ptr());
        }
        match self.reserve_slow(nbytes, true)? {
            Some(ptr) => Ok(ptr),
            // Blocking mode only returns through the success or error arms.
            None => unreachable!("blocking reserve returned without space"),
        }
    }

    /// Non-blocking [`reserve`](Self::reserve): returns `None` when the
    /// space is not available right now.
    #[inline]
    pub fn try_reserve(&self, nbytes: usize) -> Result<Option<NonNull<u8>>> {
        if nbytes < self.producer.min_free_space.get() {
            return Ok(Some(self.producer_ptr()));
        }
        self.reserve_slow(nbytes, false)
    }

    fn reserve_slow(&self, nbytes: usize, blocking: bool) -> Result<Option<NonNull<u8>>> {
        let capacity = self.capacity();
        if nbytes >= capacity {
            return Err(FlashlogError::RecordTooLarge { nbytes, capacity });
        }

        let mut blocked_since: Option<u64> = None;
        loop {
            let pos = self.producer.pos.load(Ordering::Relaxed);
            let consumer = self.consumer.pos.load(Ordering::Acquire);

            // The cached bound is refreshed on every recompute so the fast
            // path stays sound even when this attempt gives up.
            if consumer <= pos {
                let tail = capacity - pos;
                self.producer.min_free_space.set(tail);
                if tail >= nbytes {
                    break;
                }
                // The tail cannot hold the record: roll over to the front.
                // A consumer sitting at offset zero forbids the roll, since
                // landing on it would make the queue look empty while the
                // recorded tail still holds data.
                if consumer != 0 {
                    self.producer.end_of_recorded.store(pos, Ordering::Release);
                    self.producer.pos.store(0, Ordering::Release);
                    self.producer.min_free_space.set(consumer);
                    if consumer > nbytes {
                        break;
                    }
                }
            } else {
                let gap = consumer - pos;
                self.producer.min_free_space.set(gap);
                // Strictly greater: the producer must never advance onto the
                // consumer while a wrap is pending.
                if gap > nbytes {
                    break;
                }
            }

            if !blocking {
                self.record_blocked(blocked_since);
                return Ok(None);
            }
            if blocked_since.is_none() {
                blocked_since = Some(clock::ticks());
            }
            thread::yield_now();
        }

        self.record_blocked(blocked_since);
        Ok(Some(self.producer_ptr()))
    }

    fn record_blocked(&self, blocked_since: Option<u64>) {
        if let Some(start) = blocked_since {
            self.producer
                .cycles_blocked
                .fetch_add(clock::ticks().saturating_sub(start), Ordering::Relaxed);
        }
    }

    /// Publishes `nbytes` previously returned by [`reserve`](Self::reserve)
    /// to the consumer.
    ///
    /// `nbytes` must not exceed the reserved size; committing exactly the
    /// reserved size is supported.
    #[inline]
    pub fn commit(&self, nbytes: usize) {
        debug_assert!(
            nbytes <= self.producer.min_free_space.get(),
            "commit of {nbytes} bytes exceeds the reserved space"
        );
        // The consumer must observe fully-initialized bytes before the
        // position bump.
        fence(Ordering::Release);
        self.producer
            .min_free_space
            .set(self.producer.min_free_space.get() - nbytes);
        let pos = self.producer.pos.load(Ordering::Relaxed);
        self.producer.pos.store(pos + nbytes, Ordering::Release);
    }

    /// Reserves, copies, and commits `bytes` as one contiguous record.
    pub fn push(&self, bytes: &[u8]) -> Result<()> {
        let ptr = self.reserve(bytes.len())?;
        // SAFETY: `reserve` returned `bytes.len()` writable bytes.
        unsafe { std::ptr::copy_nonoverlapping(bytes.as_ptr(), ptr.as_ptr(), bytes.len()) };
        self.commit(bytes.len());
        Ok(())
    }

    /// Returns the next contiguous run of committed bytes, empty when the
    /// queue is drained.
    ///
    /// While a wrap is pending the recorded tail is returned first; once the
    /// tail is exhausted the consumer position rolls back to offset zero.
    pub fn peek(&self) -> &[u8] {
        let pos = self.producer.pos.load(Ordering::Acquire);
        let mut consumer = self.consumer.pos.load(Ordering::Relaxed);
        if consumer > pos {
            let end = self.producer.end_of_recorded.load(Ordering::Acquire);
            if consumer < end {
                // SAFETY: [consumer, end) was committed before the wrap was
                // published and the producer no longer writes there.
                return unsafe { self.committed_slice(consumer, end - consumer) };
            }
            self.consumer.pos.store(0, Ordering::Release);
            consumer = 0;
        }
        // SAFETY: [consumer, pos) is committed and owned by the consumer.
        unsafe { self.committed_slice(consumer, pos - consumer) }
    }

    /// Releases `nbytes` back to the producer.
    ///
    /// `nbytes` must not exceed the length of the last [`peek`](Self::peek).
    pub fn consume(&self, nbytes: usize) {
        // All reads of the consumed bytes must complete before the producer
        // is allowed to overwrite them.
        fence(Ordering::Acquire);
        let pos = self.consumer.pos.load(Ordering::Relaxed);
        self.consumer.pos.store(pos + nbytes, Ordering::Release);
    }

    /// Marks the producing thread as terminated; called by its thread-local
    /// retire guard.
    pub fn mark_retired(&self) {
        self.consumer.retired.store(true, Ordering::Release);
    }

    pub fn is_retired(&self) -> bool {
        self.consumer.retired.load(Ordering::Acquire)
    }

    /// True once the producing thread is gone and every committed byte has
    /// been consumed; the worker may then drop the buffer.
    pub fn can_reap(&self) -> bool {
        self.consumer.retired.load(Ordering::Acquire)
            && self.consumer.pos.load(Ordering::Relaxed)
                == self.producer.pos.load(Ordering::Acquire)
    }

    /// Cycles the producer spent blocked on a full queue.
    pub fn cycles_producer_blocked(&self) -> u64 {
        self.producer.cycles_blocked.load(Ordering::Relaxed)
    }

    fn producer_ptr(&self) -> NonNull<u8> {
        let pos = self.producer.pos.load(Ordering::Relaxed);
        let base = self.storage.as_ptr() as *mut u8;
        // SAFETY: `pos` never exceeds the storage length.
        unsafe { NonNull::new_unchecked(base.add(pos)) }
    }

    /// # Safety
    ///
    /// `[offset, offset + len)` must lie inside the storage and hold
    /// committed bytes the producer will not touch until they are consumed.
    unsafe fn committed_slice(&self, offset: usize, len: usize) -> &[u8] {
        let base = self.storage.as_ptr() as *const u8;
        unsafe { std::slice::from_raw_parts(base.add(offset), len) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    fn positions(buffer: &StagingBuffer) -> (usize, usize, usize) {
        (
            buffer.producer.pos.load(Ordering::Relaxed),
            buffer.consumer.pos.load(Ordering::Relaxed),
            buffer.producer.end_of_recorded.load(Ordering::Relaxed),
        )
    }

    fn drain(buffer: &StagingBuffer) -> Vec<u8> {
        let mut out = Vec::new();
        loop {
            let run = buffer.peek();
            if run.is_empty() {
                break;
            }
            out.extend_from_slice(run);
            let len = run.len();
            buffer.consume(len);
        }
        out
    }

    #[test]
    fn round_trips_records_in_order() {
        let buffer = StagingBuffer::new(1, 256);
        buffer.push(&[1; 10]).unwrap();
        buffer.push(&[2; 20]).unwrap();
        buffer.push(&[3; 30]).unwrap();

        let mut expected = vec![1u8; 10];
        expected.extend_from_slice(&[2; 20]);
        expected.extend_from_slice(&[3; 30]);
        assert_eq!(drain(&buffer), expected);
    }

    #[test]
    fn empty_peek_is_empty() {
        let buffer = StagingBuffer::new(1, 64);
        assert!(buffer.peek().is_empty());
    }

    #[test]
    fn reserve_of_full_capacity_is_rejected() {
        let buffer = StagingBuffer::new(1, 64);
        assert!(matches!(
            buffer.reserve(64),
            Err(FlashlogError::RecordTooLarge { nbytes: 64, capacity: 64 })
        ));
    }

    #[test]
    fn tail_exact_reserve_succeeds_without_wrap() {
        let buffer = StagingBuffer::new(1, 64);
        buffer.push(&[7; 16]).unwrap();
        assert_eq!(buffer.peek().len(), 16);
        buffer.consume(16);

        // Exactly the remaining tail: must not wrap.
        buffer.push(&[8; 48]).unwrap();
        let (producer, consumer, end) = positions(&buffer);
        assert_eq!(producer, 64);
        assert_eq!(consumer, 16);
        assert_eq!(end, 64);
        assert_eq!(drain(&buffer), vec![8; 48]);
    }

    #[test]
    fn wraps_when_tail_cannot_fit() {
        let buffer = StagingBuffer::new(1, 128);
        buffer.push(&[0xAA; 60]).unwrap();
        assert_eq!(buffer.peek().len(), 60);
        buffer.consume(60);

        // The 68-byte tail cannot hold 80 bytes: the reserve publishes the
        // wrap immediately but cannot complete until the consumer rolls past
        // the recorded tail.
        assert!(buffer.try_reserve(80).unwrap().is_none());
        let (producer, consumer, end) = positions(&buffer);
        assert_eq!(end, 60);
        assert_eq!(producer, 0);
        assert_eq!(consumer, 60);

        // The next consume pass finds the tail exhausted and rolls to the
        // front.
        assert!(buffer.peek().is_empty());
        let (_, consumer, _) = positions(&buffer);
        assert_eq!(consumer, 0);

        buffer.push(&[0xBB; 80]).unwrap();
        let (producer, _, end) = positions(&buffer);
        assert_eq!(end, 60);
        assert_eq!(producer, 80);
        assert_eq!(drain(&buffer), vec![0xBB; 80]);
    }

    #[test]
    fn wrap_serves_residual_tail_before_front_bytes() {
        let buffer = StagingBuffer::new(1, 128);
        buffer.push(&[0x11; 100]).unwrap();
        assert_eq!(buffer.peek().len(), 100);
        buffer.consume(40);

        // 28 tail bytes cannot hold 50; the front (40 free before the
        // consumer, minus the strict gap) can.
        buffer.push(&[0x22; 30]).unwrap();
        let run = buffer.peek();
        assert_eq!(run, &[0x11; 60][..], "residual tail must come first");
        buffer.consume(60);

        assert_eq!(drain(&buffer), vec![0x22; 30]);
    }

    #[test]
    fn try_reserve_refuses_when_full() {
        let buffer = StagingBuffer::new(1, 64);
        buffer.push(&[9; 48]).unwrap();
        assert!(buffer.try_reserve(32).unwrap().is_none());
        // The committed bytes are untouched by the refusal.
        assert_eq!(buffer.peek().len(), 48);
    }

    #[test]
    fn commit_of_exactly_reserved_size_is_accepted() {
        let buffer = StagingBuffer::new(1, 64);
        buffer.push(&[1; 16]).unwrap();
        buffer.consume(buffer.peek().len());

        let ptr = buffer.reserve(48).unwrap();
        // SAFETY: 48 bytes were just reserved.
        unsafe { std::ptr::write_bytes(ptr.as_ptr(), 5, 48) };
        buffer.commit(48);
        assert_eq!(drain(&buffer), vec![5; 48]);
    }

    #[test]
    fn blocked_producer_resumes_and_counts_cycles() {
        let buffer = Arc::new(StagingBuffer::new(1, 128));
        let producer = Arc::clone(&buffer);
        let writer = std::thread::spawn(move || {
            producer.push(&[1; 100]).unwrap();
            // The queue is now too full for another 100 bytes; this blocks
            // until the consumer below frees space.
            producer.push(&[2; 100]).unwrap();
        });

        std::thread::sleep(Duration::from_millis(50));
        let mut seen = Vec::new();
        while seen.len() < 200 {
            let run = buffer.peek();
            if run.is_empty() {
                std::thread::yield_now();
                continue;
            }
            seen.extend_from_slice(run);
            let len = run.len();
            buffer.consume(len);
        }
        writer.join().unwrap();

        let mut expected = vec![1u8; 100];
        expected.extend_from_slice(&[2; 100]);
        assert_eq!(seen, expected);
        assert!(buffer.cycles_producer_blocked() > 0);
    }

    #[test]
    fn reap_requires_retirement_and_empty_queue() {
        let buffer = StagingBuffer::new(1, 64);
        buffer.push(&[3; 8]).unwrap();
        assert!(!buffer.can_reap());

        buffer.mark_retired();
        assert!(!buffer.can_reap(), "unconsumed bytes must block the reap");

        buffer.consume(buffer.peek().len());
        assert!(buffer.can_reap());
    }
}
