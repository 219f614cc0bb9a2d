//! Channel configuration and normalization.
//!
//! A `ChannelConfig` is a size hint, not a contract: the registry clamps
//! both fields into their allowed ranges and rounds the capacity up to the
//! next power of two before allocating the ring. The normalized values are
//! what the endpoints later report from `config()`.

use serde::{Deserialize, Serialize};

/// Smallest accepted ring capacity (slots).
pub const MIN_CAPACITY: usize = 8;
/// Largest accepted ring capacity (slots).
pub const MAX_CAPACITY: usize = 524_288;
/// Smallest accepted per-message byte limit.
pub const MIN_MESSAGE_SIZE: usize = 64;
/// Largest accepted per-message byte limit.
pub const MAX_MESSAGE_SIZE: usize = 1_048_576;

/// Configuration for a single channel.
///
/// Unknown fields are rejected during deserialization so that a typo in a
/// config file fails loudly instead of silently using defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ChannelConfig {
    /// Ring capacity in slots. Clamped to [`MIN_CAPACITY`, `MAX_CAPACITY`]
    /// and rounded up to a power of two. One slot is permanently reserved
    /// to distinguish full from empty, so `capacity - 1` messages fit.
    pub capacity: usize,

    /// Maximum payload size of a single message in bytes. Clamped to
    /// [`MIN_MESSAGE_SIZE`, `MAX_MESSAGE_SIZE`].
    pub max_message_size: usize,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            capacity: 1024,
            max_message_size: 4096,
        }
    }
}

impl ChannelConfig {
    /// Clamp both fields into range, then round the capacity up to the next
    /// power of two. Clamping happens first so that a capacity above the
    /// maximum does not round up past it. Idempotent.
    #[must_use]
    pub fn normalize(self) -> Self {
        let capacity = self
            .capacity
            .clamp(MIN_CAPACITY, MAX_CAPACITY)
            .next_power_of_two();
        let max_message_size = self.max_message_size.clamp(MIN_MESSAGE_SIZE, MAX_MESSAGE_SIZE);
        Self {
            capacity,
            max_message_size,
        }
    }

    /// Whether this config can be used as-is, without normalization.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.capacity.is_power_of_two()
            && (MIN_CAPACITY..=MAX_CAPACITY).contains(&self.capacity)
            && (MIN_MESSAGE_SIZE..=MAX_MESSAGE_SIZE).contains(&self.max_message_size)
    }
}
