//! Storage primitives for the packet scheduler.
//!
//! Provides the leaf building blocks every other layer sits on:
//! - [`RingRam`]: fixed-depth memory with one write port, one read port and
//!   same-address read-after-write bypass
//! - [`RingQueue`]: bounded FIFO laid over a [`RingRam`]
//! - [`CreditCounter`]: producer-held credit with a per-round signed delta
//!
//! This is the lowest layer of pktsched. Nothing here knows about records,
//! frames or lanes.

pub mod credit;
pub mod error;
pub mod queue;
pub mod ram;
pub mod traits;

pub use credit::CreditCounter;
pub use error::{Result, RingError};
pub use queue::RingQueue;
pub use ram::RingRam;
pub use traits::WordMemory;
