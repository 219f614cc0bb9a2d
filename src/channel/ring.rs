//! Shared ring state for one channel.
//!
//! The ring owns the slot buffer and the four atomics the endpoints
//! coordinate through. The producer owns `write_index` and the consumer
//! owns `read_index`; each index lives on its own cache line, as do the
//! two liveness flags, so that a hot producer never invalidates the
//! consumer's line and vice versa.
//!
//! Index protocol: an endpoint loads its own index relaxed, the remote
//! index with acquire, and publishes its own advance with release. The
//! release store of `write_index` is the publication point that makes the
//! freshly written slot bytes visible to the consumer's acquire load, and
//! symmetrically for `read_index` freeing a slot.

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicBool, AtomicU64};

#[cfg(test)]
use std::sync::atomic::Ordering;

use crate::channel::{slot, wait};
use crate::config::ChannelConfig;
use crate::error::ChannelError;

/// Cache-line aligned wrapper to prevent false sharing between producer
/// and consumer state.
#[repr(C, align(64))]
pub(crate) struct CachePadded<T>(pub T);

/// Lock-free SPSC byte ring with liveness tracking.
///
/// Geometry is immutable after construction. `capacity` is a power of two
/// and `slot_size` already includes the 4-byte length prefix and alignment
/// padding, so slot `i` starts at byte offset `(i & mask) * slot_size`.
pub(crate) struct SpscRing {
    /// Producer-owned sequence counter (separate cache line).
    pub(crate) write_index: CachePadded<AtomicU64>,
    /// Consumer-owned sequence counter (separate cache line).
    pub(crate) read_index: CachePadded<AtomicU64>,
    /// Cleared by the producer endpoint's destructor.
    pub(crate) producer_alive: CachePadded<AtomicBool>,
    /// Cleared by the consumer endpoint's destructor.
    pub(crate) consumer_alive: CachePadded<AtomicBool>,

    /// Number of slots, a power of two.
    pub(crate) capacity: usize,
    /// Largest payload a single message may carry.
    pub(crate) max_message_size: usize,
    /// Bytes per slot, 8-byte aligned.
    pub(crate) slot_size: usize,

    /// Zero-initialized slot storage.
    buffer: Box<[UnsafeCell<u8>]>,

    #[cfg(test)]
    pub(crate) consumer_wakes: AtomicU64,
    #[cfg(test)]
    pub(crate) producer_wakes: AtomicU64,
}

// SAFETY: the buffer is plain bytes behind UnsafeCell. The producer only
// writes the slot at `write_index & mask` while holding a reservation, and
// the consumer only reads slots in `[read_index, write_index)`. The
// full/empty checks plus the one-empty-slot rule keep those regions
// disjoint, and the release/acquire pairing on the indices orders the
// byte accesses.
unsafe impl Send for SpscRing {}
unsafe impl Sync for SpscRing {}

impl SpscRing {
    /// Allocate a ring for an already-normalized config.
    ///
    /// Allocation is fallible so that the registry can report it as an
    /// error value instead of aborting the process.
    pub(crate) fn new(config: &ChannelConfig) -> Result<Self, ChannelError> {
        debug_assert!(config.is_valid());

        let slot_size = slot::slot_size(config.max_message_size);
        let len = config
            .capacity
            .checked_mul(slot_size)
            .ok_or(ChannelError::AllocationFailed)?;

        let mut buffer = Vec::new();
        buffer
            .try_reserve_exact(len)
            .map_err(|_| ChannelError::AllocationFailed)?;
        buffer.extend((0..len).map(|_| UnsafeCell::new(0u8)));

        Ok(Self {
            write_index: CachePadded(AtomicU64::new(0)),
            read_index: CachePadded(AtomicU64::new(0)),
            producer_alive: CachePadded(AtomicBool::new(true)),
            consumer_alive: CachePadded(AtomicBool::new(true)),
            capacity: config.capacity,
            max_message_size: config.max_message_size,
            slot_size,
            buffer: buffer.into_boxed_slice(),
            #[cfg(test)]
            consumer_wakes: AtomicU64::new(0),
            #[cfg(test)]
            producer_wakes: AtomicU64::new(0),
        })
    }

    /// Raw pointer to the slot for a monotonic index.
    #[inline]
    pub(crate) fn slot_ptr(&self, index: u64) -> *mut u8 {
        let offset = slot::slot_index(index, self.capacity) * self.slot_size;
        // SAFETY: offset < capacity * slot_size == buffer.len().
        unsafe { UnsafeCell::raw_get(self.buffer.as_ptr().add(offset)) }
    }

    /// Wake a consumer blocked on `write_index`, if any.
    #[inline]
    pub(crate) fn wake_consumer(&self) {
        #[cfg(test)]
        self.consumer_wakes.fetch_add(1, Ordering::Relaxed);
        wait::wake_one(&self.write_index.0);
    }

    /// Wake a producer blocked on `read_index`, if any.
    #[inline]
    pub(crate) fn wake_producer(&self) {
        #[cfg(test)]
        self.producer_wakes.fetch_add(1, Ordering::Relaxed);
        wait::wake_one(&self.read_index.0);
    }
}
