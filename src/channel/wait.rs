//! Hybrid spin-then-park wait strategy for the blocking paths.
//!
//! A blocked endpoint first spins briefly re-checking its predicate, then
//! yields once, and only then parks on the index it is waiting for. The
//! spin phase catches the common case where the peer responds within a
//! microsecond or two and a context switch would cost more than it saves.
//!
//! Parking uses `parking_lot_core`, which gives futex semantics on every
//! platform: the park call re-validates the watched index (and the peer's
//! liveness flag) under the internal bucket lock, so a wake issued between
//! the caller's last check and the park itself is never lost. Spurious
//! wakeups are allowed; callers re-evaluate in their outer loop.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Instant;

use parking_lot_core::{DEFAULT_PARK_TOKEN, DEFAULT_UNPARK_TOKEN};

/// Spin iterations before yielding, tuned so the spin phase lasts roughly
/// one to two microseconds on commodity hardware.
const SPIN_LIMIT: u32 = 1000;

/// Bounded spin on `ready`, then a single cooperative yield.
///
/// Returns true as soon as the predicate holds; returns false after the
/// yield so the caller re-checks deadline and liveness before parking.
#[inline]
pub(crate) fn spin_then_yield(mut ready: impl FnMut() -> bool) -> bool {
    for _ in 0..SPIN_LIMIT {
        if ready() {
            return true;
        }
        std::hint::spin_loop();
    }
    std::thread::yield_now();
    false
}

/// Park the calling thread until `index` moves past `observed`, the peer
/// dies, the deadline passes, or a spurious wake occurs.
///
/// The validate closure runs with the parking bucket locked: if the index
/// already changed or the peer already died, the thread does not sleep.
/// A waker that stores first and then calls [`wake_one`] therefore cannot
/// be missed.
pub(crate) fn park_on(
    index: &AtomicU64,
    observed: u64,
    peer_alive: &AtomicBool,
    deadline: Option<Instant>,
) {
    let key = index as *const AtomicU64 as usize;
    // SAFETY: the key is the address of an atomic owned by the shared ring,
    // which outlives this call (the caller holds an Arc to it). The
    // validate and timeout closures do not call into parking_lot_core.
    unsafe {
        let _ = parking_lot_core::park(
            key,
            || index.load(Ordering::Relaxed) == observed && peer_alive.load(Ordering::Relaxed),
            || {},
            |_, _| {},
            DEFAULT_PARK_TOKEN,
            deadline,
        );
    }
}

/// Wake one thread parked on `index`, if any.
pub(crate) fn wake_one(index: &AtomicU64) {
    let key = index as *const AtomicU64 as usize;
    // SAFETY: same key discipline as `park_on`; the callback does not call
    // into parking_lot_core.
    unsafe {
        parking_lot_core::unpark_one(key, |_| DEFAULT_UNPARK_TOKEN);
    }
}
