//! Consumer endpoint: non-blocking, blocking, and batched pops with
//! zero-copy message views.
//!
//! Exactly one consumer exists per channel; every pop takes `&mut self`,
//! which both enforces the single-consumer half of the protocol and ties
//! each returned view's lifetime to the endpoint. A view stays readable
//! until the next pop because the slot it lives in is the ring's one
//! permanently-empty slot until `read_index` advances again.

use std::sync::atomic::{fence, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::channel::ring::SpscRing;
use crate::channel::{slot, wait};
use crate::config::ChannelConfig;
use crate::error::PopError;

/// Relaxed counters updated by the owning endpoint, readable from any
/// thread through [`Consumer::stats`].
#[derive(Debug, Default)]
struct ConsumerCounters {
    messages_received: AtomicU64,
    bytes_received: AtomicU64,
    failed_pops: AtomicU64,
}

/// Snapshot of a consumer's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConsumerStats {
    /// Messages successfully popped.
    pub messages_received: u64,
    /// Payload bytes successfully popped.
    pub bytes_received: u64,
    /// Pops that failed with timeout or a closed channel.
    pub failed_pops: u64,
}

/// A zero-copy view of one message's payload, borrowed from the ring.
///
/// The view borrows the consumer, so the borrow checker rejects any pop
/// while it is alive; the bytes it points at are stable until then.
#[derive(Debug)]
pub struct Message<'a> {
    data: &'a [u8],
}

impl<'a> Message<'a> {
    /// The message payload.
    #[inline]
    pub fn bytes(&self) -> &'a [u8] {
        self.data
    }

    /// Payload length in bytes. Never zero.
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl std::ops::Deref for Message<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.data
    }
}

impl AsRef<[u8]> for Message<'_> {
    fn as_ref(&self) -> &[u8] {
        self.data
    }
}

/// Reading endpoint of a channel.
///
/// Obtained from [`crate::registry::ChannelRegistry::request_channel`].
/// Not cloneable; send it to the one thread that consumes.
pub struct Consumer {
    ring: Arc<SpscRing>,
    counters: ConsumerCounters,
}

impl Consumer {
    pub(crate) fn new(ring: Arc<SpscRing>) -> Self {
        ring.consumer_alive.0.store(true, Ordering::Release);
        Self {
            ring,
            counters: ConsumerCounters::default(),
        }
    }

    /// Pop the next message without blocking.
    ///
    /// Returns [`PopError::Empty`] when nothing is pending and the
    /// producer is alive; [`PopError::ChannelClosed`] once the producer is
    /// gone and the queue is drained. Remaining messages from a dead
    /// producer are still delivered in order.
    pub fn try_pop(&mut self) -> Result<Message<'_>, PopError> {
        let read = self.ring.read_index.0.load(Ordering::Relaxed);
        let mut write = self.ring.write_index.0.load(Ordering::Acquire);

        if slot::is_empty(read, write, self.ring.capacity) {
            if self.ring.producer_alive.0.load(Ordering::Relaxed) {
                return Err(PopError::Empty);
            }
            // The flag was cleared with release after the producer's last
            // publish; this fence pairs with that store so the re-loaded
            // write_index cannot miss a message committed just before
            // death.
            fence(Ordering::Acquire);
            write = self.ring.write_index.0.load(Ordering::Acquire);
            if slot::is_empty(read, write, self.ring.capacity) {
                self.counters.failed_pops.fetch_add(1, Ordering::Relaxed);
                return Err(PopError::ChannelClosed);
            }
        }

        let slot_ptr = self.ring.slot_ptr(read);
        // SAFETY: `read < write`, so this slot holds a committed message
        // published by the producer's release store; the acquire load of
        // `write_index` above makes its bytes visible.
        let len = unsafe { slot::read_len_prefix(slot_ptr) };
        let payload = unsafe { slot::payload_ptr(slot_ptr) as *const u8 };

        // Freeing the slot before returning the view is sound: after this
        // store the consumed slot is exactly the ring's one reserved empty
        // slot, so the producer's full check blocks it from writing there
        // until read_index advances again, and advancing requires another
        // `&mut self` call, which the returned borrow forbids.
        self.ring
            .read_index
            .0
            .store(read.wrapping_add(1), Ordering::Release);
        self.ring.wake_producer();

        self.counters
            .messages_received
            .fetch_add(1, Ordering::Relaxed);
        self.counters
            .bytes_received
            .fetch_add(len as u64, Ordering::Relaxed);

        // SAFETY: the payload stays untouched until the next pop, per the
        // one-empty-slot argument above.
        Ok(Message {
            data: unsafe { std::slice::from_raw_parts(payload, len) },
        })
    }

    /// Pop the next message, waiting up to `timeout` for one to arrive.
    ///
    /// `Duration::MAX` (or any deadline past the representable range)
    /// waits forever; the infinite path skips the spin phase and parks on
    /// `write_index` directly. A producer dying mid-wait unblocks the call,
    /// which then drains remaining messages before reporting
    /// [`PopError::ChannelClosed`].
    pub fn blocking_pop(&mut self, timeout: Duration) -> Result<Message<'_>, PopError> {
        let deadline = Instant::now().checked_add(timeout);

        loop {
            let read = self.ring.read_index.0.load(Ordering::Relaxed);
            let write = self.ring.write_index.0.load(Ordering::Acquire);
            if !slot::is_empty(read, write, self.ring.capacity) {
                break;
            }
            if !self.ring.producer_alive.0.load(Ordering::Relaxed) {
                break;
            }
            if let Some(d) = deadline {
                if Instant::now() >= d {
                    self.counters.failed_pops.fetch_add(1, Ordering::Relaxed);
                    return Err(PopError::Timeout);
                }
            }
            self.wait_for_data(deadline);
        }

        self.try_pop()
    }

    /// Pop up to `max_count` messages as one batch of zero-copy views.
    ///
    /// With a non-zero `timeout` and an empty queue, the call first waits
    /// for a message to arrive (or for the deadline or producer death).
    /// The batch holds its slots until it is dropped; the per-slot
    /// `read_index` advances and the single producer wake happen at that
    /// point, so the whole call wakes the producer at most once no matter
    /// how many messages it drained.
    pub fn batch_pop(&mut self, max_count: usize, timeout: Duration) -> Result<Batch<'_>, PopError> {
        if max_count == 0 {
            return Err(PopError::Empty);
        }
        let deadline = Instant::now().checked_add(timeout);

        loop {
            let read = self.ring.read_index.0.load(Ordering::Relaxed);
            let write = self.ring.write_index.0.load(Ordering::Acquire);
            if !slot::is_empty(read, write, self.ring.capacity) {
                let pending = write.wrapping_sub(read) as usize;
                let count = pending.min(max_count);
                return Ok(Batch {
                    consumer: self,
                    first: read,
                    count,
                });
            }
            if !self.ring.producer_alive.0.load(Ordering::Relaxed) {
                // Same pairing as in try_pop: re-check for a message
                // committed just before the producer died.
                fence(Ordering::Acquire);
                let write = self.ring.write_index.0.load(Ordering::Acquire);
                if !slot::is_empty(read, write, self.ring.capacity) {
                    continue;
                }
                self.counters.failed_pops.fetch_add(1, Ordering::Relaxed);
                return Err(PopError::ChannelClosed);
            }
            if timeout.is_zero() {
                return Err(PopError::Empty);
            }
            if let Some(d) = deadline {
                if Instant::now() >= d {
                    self.counters.failed_pops.fetch_add(1, Ordering::Relaxed);
                    return Err(PopError::Timeout);
                }
            }
            self.wait_for_data(deadline);
        }
    }

    /// Whether the producer endpoint still exists (relaxed, may be stale).
    #[inline]
    pub fn is_connected(&self) -> bool {
        self.ring.producer_alive.0.load(Ordering::Relaxed)
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

    /// Approximate pending message count, from relaxed index reads.
    #[inline]
    pub fn available_messages(&self) -> usize {
        let read = self.ring.read_index.0.load(Ordering::Relaxed);
        let write = self.ring.write_index.0.load(Ordering::Relaxed);
        slot::pending_messages(read, write, self.ring.capacity)
    }

    /// The normalized configuration this channel was created with.
    pub fn config(&self) -> ChannelConfig {
        ChannelConfig {
            capacity: self.ring.capacity,
            max_message_size: self.ring.max_message_size,
        }
    }

    /// Snapshot of this endpoint's counters.
    pub fn stats(&self) -> ConsumerStats {
        ConsumerStats {
            messages_received: self.counters.messages_received.load(Ordering::Relaxed),
            bytes_received: self.counters.bytes_received.load(Ordering::Relaxed),
            failed_pops: self.counters.failed_pops.load(Ordering::Relaxed),
        }
    }

    /// One round of the wait loop from the blocking paths: spin briefly on
    /// the data predicate (skipped for infinite waits), then park on
    /// `write_index` unless data appeared or the producer died.
    fn wait_for_data(&self, deadline: Option<Instant>) {
        let ring = &self.ring;
        let have_data = || {
            let read = ring.read_index.0.load(Ordering::Relaxed);
            let write = ring.write_index.0.load(Ordering::Acquire);
            !slot::is_empty(read, write, ring.capacity)
        };

        if deadline.is_some() && wait::spin_then_yield(have_data) {
            return;
        }

        let write = ring.write_index.0.load(Ordering::Acquire);
        let read = ring.read_index.0.load(Ordering::Relaxed);
        if !slot::is_empty(read, write, ring.capacity) {
            return;
        }
        wait::park_on(
            &ring.write_index.0,
            write,
            &ring.producer_alive.0,
            deadline,
        );
    }
}

impl Drop for Consumer {
    fn drop(&mut self) {
        // The fence keeps earlier slot reads from being reordered past the
        // liveness store; a producer that sees the flag down may reuse any
        // slot this endpoint already released.
        fence(Ordering::SeqCst);
        self.ring.consumer_alive.0.store(false, Ordering::Release);
        self.ring.wake_producer();
    }
}

/// A drained batch of messages, all borrowed from the ring.
///
/// Views are valid for the lifetime of the batch. Dropping the batch
/// releases the consumed slots (one release store per slot), wakes a
/// blocked producer once, and folds the batch into the endpoint counters.
pub struct Batch<'a> {
    consumer: &'a mut Consumer,
    first: u64,
    count: usize,
}

impl<'a> Batch<'a> {
    /// Number of messages in the batch. At least one.
    #[inline]
    pub fn len(&self) -> usize {
        self.count
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Payload view of the `i`-th message, in pop order.
    pub fn get(&self, i: usize) -> Option<&[u8]> {
        (i < self.count).then(|| self.view(i))
    }

    /// Iterate the payload views in pop order.
    pub fn iter(&self) -> impl Iterator<Item = &[u8]> {
        (0..self.count).map(move |i| self.view(i))
    }

    fn view(&self, i: usize) -> &[u8] {
        debug_assert!(i < self.count);
        let ring = &self.consumer.ring;
        let slot_ptr = ring.slot_ptr(self.first.wrapping_add(i as u64));
        // SAFETY: every index in `[first, first + count)` was committed
        // before the batch was created, and none of those slots is released
        // until the batch drops, so the producer cannot overwrite them.
        unsafe {
            let len = slot::read_len_prefix(slot_ptr);
            std::slice::from_raw_parts(slot::payload_ptr(slot_ptr) as *const u8, len)
        }
    }
}

impl Drop for Batch<'_> {
    fn drop(&mut self) {
        let ring = &self.consumer.ring;
        let mut total_bytes = 0u64;
        for i in 0..self.count {
            let index = self.first.wrapping_add(i as u64);
            // SAFETY: the slot is still owned by this batch; it is released
            // by the store below.
            total_bytes += unsafe { slot::read_len_prefix(ring.slot_ptr(index)) } as u64;
            ring.read_index
                .0
                .store(index.wrapping_add(1), Ordering::Release);
        }
        if self.count > 0 {
            ring.wake_producer();
            self.consumer
                .counters
                .messages_received
                .fetch_add(self.count as u64, Ordering::Relaxed);
            self.consumer
                .counters
                .bytes_received
                .fetch_add(total_bytes, Ordering::Relaxed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::Producer;
    use crate::error::PushError;
    use crate::registry;

    fn channel(name: &str, capacity: usize, max_message_size: usize) -> (Producer, Consumer) {
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
    fn test_try_pop_empty_then_data() {
        let (mut producer, mut consumer) = channel("consumer_try_pop", 8, 64);

        assert_eq!(consumer.try_pop().err(), Some(PopError::Empty));
        producer.try_push(&[42]).unwrap();
        assert_eq!(&*consumer.try_pop().unwrap(), &[42]);
        assert_eq!(consumer.try_pop().err(), Some(PopError::Empty));
    }

    #[test]
    fn test_view_stable_until_next_pop() {
        let (mut producer, mut consumer) = channel("consumer_view_stable", 8, 64);

        producer.try_push(b"first").unwrap();
        let msg = consumer.try_pop().unwrap();

        // The popped slot is the ring's reserved empty slot; filling the
        // remaining slots must not touch it.
        for i in 0..6u8 {
            producer.try_push(&[i]).unwrap();
        }
        assert_eq!(producer.try_push(&[9]).err(), Some(PushError::QueueFull));
        assert_eq!(&*msg, b"first");
    }

    #[test]
    fn test_pop_drains_after_producer_drop() {
        let (mut producer, mut consumer) = channel("consumer_drain", 32, 64);

        for i in 0..10u8 {
            producer.try_push(&[i]).unwrap();
        }
        drop(producer);

        for i in 0..10u8 {
            assert_eq!(&*consumer.try_pop().unwrap(), &[i]);
        }
        assert_eq!(consumer.try_pop().err(), Some(PopError::ChannelClosed));
        assert!(!consumer.is_connected());
        assert_eq!(consumer.stats().messages_received, 10);
        assert_eq!(consumer.stats().failed_pops, 1);
    }

    #[test]
    fn test_blocking_pop_times_out() {
        let (_producer, mut consumer) = channel("consumer_block_timeout", 8, 64);

        let start = Instant::now();
        let result = consumer.blocking_pop(Duration::from_millis(100));
        let elapsed = start.elapsed();

        assert!(matches!(result.err(), Some(PopError::Timeout)));
        assert!(elapsed >= Duration::from_millis(100));
        assert_eq!(consumer.stats().failed_pops, 1);
    }

    #[test]
    fn test_blocking_pop_woken_by_push() {
        let (mut producer, mut consumer) = channel("consumer_block_wake", 8, 64);

        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(50));
            producer.try_push(&[7]).unwrap();
            producer
        });

        let msg = consumer.blocking_pop(Duration::from_secs(5)).unwrap();
        assert_eq!(&*msg, &[7]);
        drop(msg);
        handle.join().unwrap();
    }

    #[test]
    fn test_blocking_pop_woken_by_producer_death() {
        let (producer, mut consumer) = channel("consumer_block_death", 8, 64);

        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(50));
            drop(producer);
        });

        let result = consumer.blocking_pop(Duration::from_secs(5));
        assert!(matches!(result.err(), Some(PopError::ChannelClosed)));
        handle.join().unwrap();
    }

    #[test]
    fn test_batch_pop_drains_up_to_max() {
        let (mut producer, mut consumer) = channel("consumer_batch", 32, 64);

        for i in 0..5u8 {
            producer.try_push(&[i, i]).unwrap();
        }

        let batch = consumer.batch_pop(3, Duration::ZERO).unwrap();
        assert_eq!(batch.len(), 3);
        for (i, view) in batch.iter().enumerate() {
            assert_eq!(view, &[i as u8, i as u8]);
        }
        assert_eq!(batch.get(2), Some(&[2u8, 2u8][..]));
        assert_eq!(batch.get(3), None);
        drop(batch);

        let batch = consumer.batch_pop(10, Duration::ZERO).unwrap();
        assert_eq!(batch.len(), 2);
        drop(batch);

        assert_eq!(
            consumer.batch_pop(10, Duration::ZERO).err(),
            Some(PopError::Empty)
        );
        assert_eq!(consumer.stats().messages_received, 5);
    }

    #[test]
    fn test_batch_pop_single_wake() {
        let (mut producer, mut consumer) = channel("consumer_batch_wake", 32, 64);

        for i in 0..10u8 {
            producer.try_push(&[i]).unwrap();
        }

        let before = consumer.ring.producer_wakes.load(Ordering::Relaxed);
        let batch = consumer.batch_pop(10, Duration::ZERO).unwrap();
        assert_eq!(batch.len(), 10);
        drop(batch);
        let after = consumer.ring.producer_wakes.load(Ordering::Relaxed);

        assert_eq!(after - before, 1);
    }

    #[test]
    fn test_batch_holds_slots_until_dropped() {
        let (mut producer, mut consumer) = channel("consumer_batch_holds", 8, 64);

        for i in 0..7u8 {
            producer.try_push(&[i]).unwrap();
        }

        let batch = consumer.batch_pop(7, Duration::ZERO).unwrap();
        assert_eq!(batch.len(), 7);
        // Slots are not released while the views are alive.
        assert_eq!(producer.try_push(&[9]).err(), Some(PushError::QueueFull));
        drop(batch);
        producer.try_push(&[9]).unwrap();
    }

    #[test]
    fn test_batch_pop_blocking_prefix() {
        let (mut producer, mut consumer) = channel("consumer_batch_block", 8, 64);

        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(50));
            producer.try_push(&[1]).unwrap();
            producer.try_push(&[2]).unwrap();
            producer
        });

        let batch = consumer.batch_pop(8, Duration::from_secs(5)).unwrap();
        assert!(!batch.is_empty());
        assert_eq!(batch.get(0), Some(&[1u8][..]));
        drop(batch);
        handle.join().unwrap();
    }

    #[test]
    fn test_batch_pop_timeout_and_closed() {
        let (producer, mut consumer) = channel("consumer_batch_status", 8, 64);

        assert_eq!(
            consumer.batch_pop(4, Duration::from_millis(50)).err(),
            Some(PopError::Timeout)
        );

        drop(producer);
        assert_eq!(
            consumer.batch_pop(4, Duration::ZERO).err(),
            Some(PopError::ChannelClosed)
        );
    }

    #[test]
    fn test_batch_pop_zero_count() {
        let (_producer, mut consumer) = channel("consumer_batch_zero", 8, 64);
        assert_eq!(
            consumer.batch_pop(0, Duration::ZERO).err(),
            Some(PopError::Empty)
        );
    }
}
