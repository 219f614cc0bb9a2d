//! Process-wide directory of named channels.
//!
//! The registry maps unique channel names to their shared rings behind a
//! read/write lock; existence checks and statistics take the read lock,
//! creation and removal take the write lock. Lock hold times are map
//! operations only and never overlap a push or pop.
//!
//! The global instance lives in storage that is never destructed, so an
//! endpoint destructor running during process teardown can never observe
//! a dead registry. Endpoints hold only their ring, not the registry.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use lazy_static::lazy_static;
use parking_lot::RwLock;

use crate::channel::{Consumer, Producer, SpscRing};
use crate::config::ChannelConfig;
use crate::error::ChannelError;

struct ChannelEntry {
    ring: Arc<SpscRing>,
    created_at: Instant,
}

/// Snapshot of registry-level counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegistryStats {
    /// Channels currently registered.
    pub active_channels: usize,
    /// Channels created over the process lifetime.
    pub total_channels_created: u64,
}

/// Named-channel directory. Use [`registry`] for the process-wide
/// instance.
pub struct ChannelRegistry {
    channels: RwLock<HashMap<String, ChannelEntry>>,
    total_created: AtomicU64,
}

lazy_static! {
    static ref REGISTRY: ChannelRegistry = ChannelRegistry::new();
}

/// The process-wide registry.
pub fn registry() -> &'static ChannelRegistry {
    &REGISTRY
}

impl ChannelRegistry {
    fn new() -> Self {
        Self {
            channels: RwLock::new(HashMap::new()),
            total_created: AtomicU64::new(0),
        }
    }

    /// Create a channel and return its two endpoints.
    ///
    /// The config is normalized first (clamped, capacity rounded up to a
    /// power of two); the endpoints report the normalized values from
    /// `config()`. Names must be non-empty and unused.
    pub fn request_channel(
        &self,
        name: &str,
        config: ChannelConfig,
    ) -> Result<(Producer, Consumer), ChannelError> {
        if name.is_empty() {
            return Err(ChannelError::InvalidConfig);
        }
        let normalized = config.normalize();
        if !normalized.is_valid() {
            return Err(ChannelError::InvalidConfig);
        }

        let ring = {
            let mut channels = self.channels.write();
            if channels.contains_key(name) {
                return Err(ChannelError::NameExists);
            }
            let ring = Arc::new(SpscRing::new(&normalized)?);
            channels.insert(
                name.to_string(),
                ChannelEntry {
                    ring: Arc::clone(&ring),
                    created_at: Instant::now(),
                },
            );
            self.total_created.fetch_add(1, Ordering::Relaxed);
            ring
        };

        log::debug!(
            "channel '{}' created (capacity={}, max_message_size={})",
            name,
            normalized.capacity,
            normalized.max_message_size
        );
        Ok((Producer::new(Arc::clone(&ring)), Consumer::new(ring)))
    }

    /// Whether a channel with this name is registered. May be stale the
    /// moment it returns.
    pub fn has_channel(&self, name: &str) -> bool {
        self.channels.read().contains_key(name)
    }

    /// Remove a channel, but only after both of its endpoints have been
    /// dropped. Returns false if the name is unknown or an endpoint is
    /// still alive.
    pub fn remove_channel(&self, name: &str) -> bool {
        let mut channels = self.channels.write();
        let Some(entry) = channels.get(name) else {
            return false;
        };
        // Acquire pairs with the release stores in the endpoint
        // destructors, so the ring state is settled once both flags read
        // false.
        if entry.ring.producer_alive.0.load(Ordering::Acquire)
            || entry.ring.consumer_alive.0.load(Ordering::Acquire)
        {
            return false;
        }
        let entry = channels.remove(name).expect("entry checked above");
        log::debug!(
            "channel '{}' removed after {:?}",
            name,
            entry.created_at.elapsed()
        );
        true
    }

    /// Registry-level counters.
    pub fn stats(&self) -> RegistryStats {
        RegistryStats {
            active_channels: self.channels.read().len(),
            total_channels_created: self.total_created.load(Ordering::Relaxed),
        }
    }

    /// Signal shutdown to every registered channel: clear both liveness
    /// flags and wake any blocked endpoint.
    ///
    /// Signal-only: this never waits for endpoint destruction, and calling
    /// it while endpoints are still in use is a caller error. Not safe to
    /// call from a signal handler.
    pub fn shutdown(&self) {
        let channels = self.channels.write();
        for entry in channels.values() {
            entry.ring.producer_alive.0.store(false, Ordering::Release);
            entry.ring.consumer_alive.0.store(false, Ordering::Release);
            entry.ring.wake_consumer();
            entry.ring.wake_producer();
        }
        log::info!("shutdown signalled to {} channels", channels.len());
    }
}
