//! Multi-lane packet aggregation and frame scheduling.
//!
//! N ingress lanes carry time-stamped frames of hits. pktsched merges every
//! lane's contribution to a frame into one egress frame, in timestamp order,
//! under credit-based flow control and a shared paged storage.
//!
//! # Crate Structure
//!
//! - [`ring`] - Circular queue, circular RAM and credit counter primitives
//! - [`record`] - Word format, record types and stream file framing
//! - [`scheduler`] - Parsers, allocator, movers, arbiter, frame table and scheduler

/// Re-export storage primitives.
pub mod ring {
    pub use pktsched_ring::*;
}

/// Re-export word and record types.
pub mod record {
    pub use pktsched_record::*;
}

/// Re-export the scheduling pipeline.
pub mod scheduler {
    pub use pktsched_core::*;
}
