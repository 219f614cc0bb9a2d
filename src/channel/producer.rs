//! Producer endpoint: reserve/commit zero-copy writes, copying pushes,
//! blocking pushes, and batched pushes.
//!
//! Exactly one producer exists per channel. The endpoint is move-only and
//! every mutating operation takes `&mut self`, which is what enforces the
//! single-producer half of the protocol. Dropping the endpoint clears
//! `producer_alive` and wakes a consumer blocked on `write_index`.

use std::sync::atomic::{fence, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::channel::ring::SpscRing;
use crate::channel::{slot, wait};
use crate::config::ChannelConfig;
use crate::error::PushError;

/// Relaxed counters updated by the owning endpoint, readable from any
/// thread through [`Producer::stats`]. The counts are approximate and
/// carry no happens-before with the messages themselves.
#[derive(Debug, Default)]
struct ProducerCounters {
    messages_sent: AtomicU64,
    bytes_sent: AtomicU64,
    failed_pushes: AtomicU64,
}

/// Snapshot of a producer's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProducerStats {
    /// Messages successfully committed.
    pub messages_sent: u64,
    /// Payload bytes successfully committed.
    pub bytes_sent: u64,
    /// Pushes that failed with timeout, closed channel, full queue, or an
    /// invalid size. The counter does not distinguish the cause.
    pub failed_pushes: u64,
}

/// Writing endpoint of a channel.
///
/// Obtained from [`crate::registry::ChannelRegistry::request_channel`].
/// Not cloneable; send it to the one thread that produces.
pub struct Producer {
    ring: Arc<SpscRing>,
    /// Index of the slot held by an uncommitted [`Producer::reserve`].
    /// At most one reservation is outstanding at any time.
    reserved: Option<u64>,
    counters: ProducerCounters,
}

impl Producer {
    pub(crate) fn new(ring: Arc<SpscRing>) -> Self {
        ring.producer_alive.0.store(true, Ordering::Release);
        Self {
            ring,
            reserved: None,
            counters: ProducerCounters::default(),
        }
    }

    /// Reserve a slot and return its payload region for in-place writing.
    ///
    /// The returned view always spans the full `max_message_size` bytes so
    /// a caller can build a message directly in the ring and commit a
    /// smaller final size. Nothing is visible to the consumer until
    /// [`commit`](Self::commit); dropping the view without committing
    /// leaves the ring unchanged, and [`rollback`](Self::rollback) clears
    /// the reservation explicitly.
    pub fn reserve(&mut self, len: usize) -> Result<&mut [u8], PushError> {
        if !slot::is_valid_message_size(len, self.ring.max_message_size) {
            return Err(PushError::InvalidSize);
        }
        if self.reserved.is_some() {
            return Err(PushError::ReservationHeld);
        }
        if !self.ring.consumer_alive.0.load(Ordering::Relaxed) {
            return Err(PushError::ChannelClosed);
        }

        let write = self.ring.write_index.0.load(Ordering::Relaxed);
        let read = self.ring.read_index.0.load(Ordering::Acquire);
        if slot::is_full(write, read, self.ring.capacity) {
            return Err(PushError::QueueFull);
        }

        self.reserved = Some(write);
        let payload = unsafe { slot::payload_ptr(self.ring.slot_ptr(write)) };
        // SAFETY: the full check above proves the slot at `write & mask` is
        // outside `[read, write)`, so the consumer will not touch it, and
        // `write_index` does not advance until commit. The borrow of self
        // keeps a second reservation from aliasing the region.
        Ok(unsafe { std::slice::from_raw_parts_mut(payload, self.ring.max_message_size) })
    }

    /// Publish the reserved slot with `actual` payload bytes.
    ///
    /// Writes the length prefix, release-stores the advanced `write_index`
    /// (the point at which the payload becomes visible to the consumer's
    /// acquire load), and wakes one blocked consumer.
    pub fn commit(&mut self, actual: usize) -> Result<(), PushError> {
        if !slot::is_valid_message_size(actual, self.ring.max_message_size) {
            // The reservation stays outstanding; the caller may retry with
            // a valid size or roll back.
            return Err(PushError::InvalidSize);
        }
        let Some(index) = self.reserved else {
            return Err(PushError::NoReservation);
        };

        // SAFETY: the reserved slot is producer-owned until the release
        // store below publishes it.
        unsafe {
            slot::write_len_prefix(self.ring.slot_ptr(index), actual);
        }
        self.ring
            .write_index
            .0
            .store(index.wrapping_add(1), Ordering::Release);
        self.ring.wake_consumer();

        self.counters.messages_sent.fetch_add(1, Ordering::Relaxed);
        self.counters
            .bytes_sent
            .fetch_add(actual as u64, Ordering::Relaxed);
        self.reserved = None;
        Ok(())
    }

    /// Discard the outstanding reservation without advancing the ring.
    /// A no-op when nothing is reserved.
    pub fn rollback(&mut self) {
        self.reserved = None;
    }

    /// Copy `data` into the next free slot and publish it.
    pub fn try_push(&mut self, data: &[u8]) -> Result<(), PushError> {
        match self.push_once(data) {
            Ok(()) => Ok(()),
            Err(e @ (PushError::ChannelClosed | PushError::QueueFull)) => {
                self.counters.failed_pushes.fetch_add(1, Ordering::Relaxed);
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    /// Copy `data` into the ring, waiting up to `timeout` for space.
    ///
    /// `Duration::MAX` (or any deadline past the representable range)
    /// waits forever; the infinite path skips the spin phase and parks on
    /// `read_index` directly. The consumer dying unblocks the wait with
    /// [`PushError::ChannelClosed`] even if the queue is still full.
    pub fn blocking_push(&mut self, data: &[u8], timeout: Duration) -> Result<(), PushError> {
        if !slot::is_valid_message_size(data.len(), self.ring.max_message_size) {
            self.counters.failed_pushes.fetch_add(1, Ordering::Relaxed);
            return Err(PushError::InvalidSize);
        }
        let deadline = Instant::now().checked_add(timeout);

        loop {
            match self.push_once(data) {
                Ok(()) => return Ok(()),
                Err(PushError::QueueFull) => {}
                Err(e @ PushError::ChannelClosed) => {
                    self.counters.failed_pushes.fetch_add(1, Ordering::Relaxed);
                    return Err(e);
                }
                Err(e) => return Err(e),
            }

            if let Some(d) = deadline {
                if Instant::now() >= d {
                    self.counters.failed_pushes.fetch_add(1, Ordering::Relaxed);
                    return Err(PushError::Timeout);
                }
            }

            self.wait_for_space(deadline);
        }
    }

    /// Push as many of `messages` as fit, stopping at the first that would
    /// fill the queue. Returns the number written, in `[0, messages.len()]`.
    ///
    /// All sizes are validated up front; any invalid message fails the
    /// whole batch with 0 and no change. The consumer-alive check runs
    /// once for the batch, each message is published with its own release
    /// store, and exactly one wake and one statistics update happen at the
    /// end.
    pub fn batch_push(&mut self, messages: &[&[u8]]) -> usize {
        if messages.is_empty() {
            return 0;
        }
        for msg in messages {
            if !slot::is_valid_message_size(msg.len(), self.ring.max_message_size) {
                return 0;
            }
        }
        if self.reserved.is_some() {
            // The reserved slot is the next write slot; batching over it
            // would tear the reservation.
            return 0;
        }
        if !self.ring.consumer_alive.0.load(Ordering::Relaxed) {
            return 0;
        }

        let mut pushed = 0usize;
        let mut total_bytes = 0u64;
        for msg in messages {
            let write = self.ring.write_index.0.load(Ordering::Relaxed);
            let read = self.ring.read_index.0.load(Ordering::Acquire);
            if slot::is_full(write, read, self.ring.capacity) {
                break;
            }

            let slot_ptr = self.ring.slot_ptr(write);
            // SAFETY: the full check proves this slot is free and
            // producer-owned until the release store publishes it.
            unsafe {
                slot::write_len_prefix(slot_ptr, msg.len());
                std::ptr::copy_nonoverlapping(msg.as_ptr(), slot::payload_ptr(slot_ptr), msg.len());
            }
            self.ring
                .write_index
                .0
                .store(write.wrapping_add(1), Ordering::Release);

            pushed += 1;
            total_bytes += msg.len() as u64;
        }

        if pushed > 0 {
            self.ring.wake_consumer();
            self.counters
                .messages_sent
                .fetch_add(pushed as u64, Ordering::Relaxed);
            self.counters
                .bytes_sent
                .fetch_add(total_bytes, Ordering::Relaxed);
        }
        pushed
    }

    /// Whether the consumer endpoint still exists (relaxed, may be stale).
    #[inline]
    pub fn is_connected(&self) -> bool {
        self.ring.consumer_alive.0.load(Ordering::Relaxed)
    }

    /// Ring capacity in slots.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.ring.capacity
    }

    /// Largest payload a single message may carry.
    #[inline]
    pub fn max_message_size(&self) -> usize {
        self.ring.max_message_size
    }

    /// Approximate free slots, from relaxed index reads.
    #[inline]
    pub fn available_slots(&self) -> usize {
        let write = self.ring.write_index.0.load(Ordering::Relaxed);
        let read = self.ring.read_index.0.load(Ordering::Relaxed);
        slot::free_slots(write, read, self.ring.capacity)
    }

    /// The normalized configuration this channel was created with.
    pub fn config(&self) -> ChannelConfig {
        ChannelConfig {
            capacity: self.ring.capacity,
            max_message_size: self.ring.max_message_size,
        }
    }

    /// Snapshot of this endpoint's counters.
    pub fn stats(&self) -> ProducerStats {
        ProducerStats {
            messages_sent: self.counters.messages_sent.load(Ordering::Relaxed),
            bytes_sent: self.counters.bytes_sent.load(Ordering::Relaxed),
            failed_pushes: self.counters.failed_pushes.load(Ordering::Relaxed),
        }
    }

    /// Reserve, copy, commit. Shared by `try_push` and `blocking_push`.
    fn push_once(&mut self, data: &[u8]) -> Result<(), PushError> {
        let payload = self.reserve(data.len())?;
        payload[..data.len()].copy_from_slice(data);
        self.commit(data.len())
    }

    /// One round of the wait loop from the blocking path: spin briefly on
    /// the space predicate (skipped for infinite waits), then park on
    /// `read_index` unless space appeared, the deadline applies, or the
    /// consumer died in the meantime.
    fn wait_for_space(&self, deadline: Option<Instant>) {
        let ring = &self.ring;
        let have_space = || {
            let write = ring.write_index.0.load(Ordering::Relaxed);
            let read = ring.read_index.0.load(Ordering::Acquire);
            !slot::is_full(write, read, ring.capacity)
        };

        if deadline.is_some() && wait::spin_then_yield(have_space) {
            return;
        }

        let read = ring.read_index.0.load(Ordering::Acquire);
        let write = ring.write_index.0.load(Ordering::Relaxed);
        if !slot::is_full(write, read, ring.capacity) {
            return;
        }
        wait::park_on(&ring.read_index.0, read, &ring.consumer_alive.0, deadline);
    }
}

impl Drop for Producer {
    fn drop(&mut self) {
        // The fence keeps earlier slot writes from being reordered past the
        // liveness store; a consumer that sees the flag down must also see
        // every message published before it.
        fence(Ordering::SeqCst);
        self.ring.producer_alive.0.store(false, Ordering::Release);
        self.ring.wake_consumer();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry;

    fn channel(
        name: &str,
        capacity: usize,
        max_message_size: usize,
    ) -> (Producer, crate::channel::Consumer) {
        registry::registry()
            .request_channel(
                &format!("{}_{}", name, std::process::id()),
                ChannelConfig {
                    capacity,
                    max_message_size,
                },
            )
            .unwrap()
    }

    #[test]
    fn test_reserve_commit_publishes() {
        let (mut producer, mut consumer) = channel("producer_reserve_commit", 8, 64);

        let payload = producer.reserve(4).unwrap();
        assert_eq!(payload.len(), 64);
        payload[..4].copy_from_slice(&[1, 2, 3, 4]);
        producer.commit(4).unwrap();

        let msg = consumer.try_pop().unwrap();
        assert_eq!(&*msg, &[1, 2, 3, 4]);
    }

    #[test]
    fn test_commit_smaller_than_reserved() {
        let (mut producer, mut consumer) = channel("producer_commit_smaller", 8, 64);

        let payload = producer.reserve(64).unwrap();
        payload[..2].copy_from_slice(&[9, 9]);
        producer.commit(2).unwrap();

        assert_eq!(consumer.try_pop().unwrap().len(), 2);
    }

    #[test]
    fn test_double_reserve_rejected() {
        let (mut producer, _consumer) = channel("producer_double_reserve", 8, 64);

        producer.reserve(4).unwrap();
        assert_eq!(producer.reserve(4).err(), Some(PushError::ReservationHeld));
        // The endpoint stays usable.
        producer.commit(4).unwrap();
        producer.reserve(4).unwrap();
    }

    #[test]
    fn test_commit_without_reserve_rejected() {
        let (mut producer, _consumer) = channel("producer_commit_bare", 8, 64);
        assert_eq!(producer.commit(4).err(), Some(PushError::NoReservation));
    }

    #[test]
    fn test_commit_invalid_size_keeps_reservation() {
        let (mut producer, mut consumer) = channel("producer_commit_invalid", 8, 64);

        producer.reserve(4).unwrap();
        assert_eq!(producer.commit(65).err(), Some(PushError::InvalidSize));
        assert_eq!(producer.commit(0).err(), Some(PushError::InvalidSize));
        // Still committable with a valid size.
        producer.commit(4).unwrap();
        assert!(consumer.try_pop().is_ok());
    }

    #[test]
    fn test_rollback_leaves_ring_untouched() {
        let (mut producer, mut consumer) = channel("producer_rollback", 8, 64);

        let payload = producer.reserve(8).unwrap();
        payload[..8].fill(0xFF);
        producer.rollback();

        assert_eq!(consumer.try_pop().err(), Some(crate::error::PopError::Empty));
        assert_eq!(consumer.available_messages(), 0);
        assert_eq!(producer.available_slots(), 7);
        assert_eq!(producer.stats().messages_sent, 0);

        // The next push reuses the slot cleanly.
        producer.try_push(&[1]).unwrap();
        assert_eq!(&*consumer.try_pop().unwrap(), &[1]);
    }

    #[test]
    fn test_queue_full_at_capacity_minus_one() {
        let (mut producer, consumer) = channel("producer_full", 8, 64);

        for i in 0..7u8 {
            producer.try_push(&[i]).unwrap();
        }
        assert_eq!(producer.try_push(&[7]).err(), Some(PushError::QueueFull));
        assert_eq!(producer.available_slots(), 0);
        assert_eq!(consumer.available_messages(), 7);
        assert_eq!(producer.stats().failed_pushes, 1);
    }

    #[test]
    fn test_batch_push_single_wake() {
        let (mut producer, _consumer) = channel("producer_batch_wake", 128, 64);

        let payloads: Vec<[u8; 2]> = (0..100u8).map(|i| [i, i]).collect();
        let messages: Vec<&[u8]> = payloads.iter().map(|m| m.as_slice()).collect();

        let before = producer.ring.consumer_wakes.load(Ordering::Relaxed);
        assert_eq!(producer.batch_push(&messages), 100);
        let after = producer.ring.consumer_wakes.load(Ordering::Relaxed);

        assert_eq!(after - before, 1);
        assert_eq!(producer.ring.write_index.0.load(Ordering::Relaxed), 100);
        assert_eq!(producer.stats().messages_sent, 100);
        assert_eq!(producer.stats().bytes_sent, 200);
    }

    #[test]
    fn test_batch_push_stops_when_full() {
        let (mut producer, _consumer) = channel("producer_batch_full", 8, 64);

        let payloads: Vec<[u8; 1]> = (0..10u8).map(|i| [i]).collect();
        let messages: Vec<&[u8]> = payloads.iter().map(|m| m.as_slice()).collect();

        assert_eq!(producer.batch_push(&messages), 7);
        assert_eq!(producer.available_slots(), 0);
    }

    #[test]
    fn test_batch_push_validates_up_front() {
        let (mut producer, consumer) = channel("producer_batch_invalid", 8, 64);

        let big = [0u8; 65];
        let messages: Vec<&[u8]> = vec![&[1], &big, &[2]];
        assert_eq!(producer.batch_push(&messages), 0);
        assert_eq!(consumer.available_messages(), 0);
    }

    #[test]
    fn test_batch_push_rejected_while_reserved() {
        let (mut producer, _consumer) = channel("producer_batch_reserved", 8, 64);

        producer.reserve(4).unwrap();
        assert_eq!(producer.batch_push(&[&[1u8][..]]), 0);
        producer.rollback();
        assert_eq!(producer.batch_push(&[&[1u8][..]]), 1);
    }

    #[test]
    fn test_push_after_consumer_drop_reports_closed() {
        let (mut producer, consumer) = channel("producer_peer_death", 8, 64);
        drop(consumer);

        assert_eq!(producer.try_push(&[1]).err(), Some(PushError::ChannelClosed));
        assert!(!producer.is_connected());
        assert_eq!(
            producer.blocking_push(&[1], Duration::from_millis(100)).err(),
            Some(PushError::ChannelClosed)
        );
        assert_eq!(producer.batch_push(&[&[1u8][..]]), 0);
    }

    #[test]
    fn test_blocking_push_times_out_when_full() {
        let (mut producer, _consumer) = channel("producer_block_timeout", 8, 64);

        for i in 0..7u8 {
            producer.try_push(&[i]).unwrap();
        }
        let failed_before = producer.stats().failed_pushes;
        let start = Instant::now();
        let result = producer.blocking_push(&[7], Duration::from_millis(100));
        let elapsed = start.elapsed();

        assert_eq!(result.err(), Some(PushError::Timeout));
        assert!(elapsed >= Duration::from_millis(100));
        assert!(elapsed < Duration::from_millis(500));
        assert_eq!(producer.stats().failed_pushes, failed_before + 1);
    }
}
