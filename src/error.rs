//! Error types for channel creation, push, and pop operations.
//!
//! Every fallible surface operation returns one of these enums as the error
//! half of a `Result`. Peer death is reported as `ChannelClosed` and never
//! tears down the channel itself; the surviving endpoint stays usable.

use thiserror::Error;

/// Errors produced when requesting a channel from the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ChannelError {
    /// A channel with this name is already registered.
    #[error("a channel with this name already exists")]
    NameExists,

    /// The configuration (or the channel name) is invalid even after
    /// normalization.
    #[error("invalid channel configuration")]
    InvalidConfig,

    /// The ring buffer allocation failed.
    #[error("ring buffer allocation failed")]
    AllocationFailed,
}

/// Errors produced by producer-side operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PushError {
    /// No free slot is available; one slot is always kept empty to
    /// distinguish a full ring from an empty one.
    #[error("queue full")]
    QueueFull,

    /// The deadline passed before space became available. Nothing was
    /// published.
    #[error("timed out waiting for queue space")]
    Timeout,

    /// The consumer endpoint no longer exists.
    #[error("channel closed by peer")]
    ChannelClosed,

    /// The message size is zero or exceeds the channel's maximum.
    #[error("invalid message size")]
    InvalidSize,

    /// A previous reservation has not been committed or rolled back.
    #[error("a reservation is already outstanding")]
    ReservationHeld,

    /// Commit was called without an outstanding reservation.
    #[error("no outstanding reservation")]
    NoReservation,
}

/// Errors produced by consumer-side operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PopError {
    /// No message is pending and the producer is still alive.
    #[error("queue empty")]
    Empty,

    /// The deadline passed before a message arrived.
    #[error("timed out waiting for a message")]
    Timeout,

    /// The producer endpoint no longer exists and the queue is drained.
    #[error("channel closed by peer")]
    ChannelClosed,
}
