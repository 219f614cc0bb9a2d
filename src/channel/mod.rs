//! The SPSC channel core: ring state, slot codec, the two endpoints, and
//! the hybrid wait strategy.
//!
//! A channel is one [`SpscRing`] shared by exactly one [`Producer`] and
//! one [`Consumer`]. Endpoints are created together by the registry and
//! coordinate only through the ring's atomics; no lock is ever held
//! across a push or a pop.

mod consumer;
mod producer;
mod ring;
mod slot;
mod wait;

pub use consumer::{Batch, Consumer, ConsumerStats, Message};
pub use producer::{Producer, ProducerStats};

pub(crate) use ring::SpscRing;
