//! # bytelane
//!
//! Named in-process SPSC byte-message channels with bounded capacity,
//! zero-copy reads, and liveness-aware blocking.
//!
//! A channel is a lock-free single-producer/single-consumer ring of
//! fixed-size slots, each carrying one length-prefixed byte message.
//! Channels are obtained by name from a process-wide [`registry`], which
//! returns the channel's two endpoints:
//!
//! - [`Producer`]: copying pushes, blocking pushes with a timeout, batch
//!   pushes, and a reserve/commit protocol for building messages in place.
//! - [`Consumer`]: non-blocking, blocking, and batch pops, all returning
//!   borrowed views directly into the ring; payload bytes are never copied
//!   on the read side.
//!
//! Endpoints are move-only and coordinate only through the ring's atomics.
//! Dropping an endpoint signals the peer: a producer whose consumer is
//! gone gets `ChannelClosed`, a consumer whose producer is gone drains the
//! remaining messages first.
//!
//! ## Quick start
//!
//! ```
//! use bytelane::{registry, ChannelConfig};
//!
//! let (mut producer, mut consumer) = registry()
//!     .request_channel("telemetry", ChannelConfig::default())
//!     .expect("channel");
//!
//! producer.try_push(b"hello").unwrap();
//! let msg = consumer.try_pop().unwrap();
//! assert_eq!(&*msg, b"hello");
//! ```

pub mod channel;
pub mod config;
pub mod error;
pub mod registry;

pub use channel::{Batch, Consumer, ConsumerStats, Message, Producer, ProducerStats};
pub use config::ChannelConfig;
pub use error::{ChannelError, PopError, PushError};
pub use registry::{registry, ChannelRegistry, RegistryStats};
