//! Multi-lane packet aggregation pipeline.
//!
//! N lanes stream framed records in; one ordered stream of frames comes out.
//! Each round every component advances once, in lock-step:
//!
//! ```text
//! LaneParser ─▶ LaneStaging ─▶ PageAllocator ─▶ handle queue ─▶ BlockMover
//!     (×N)         (×N)             (1)             (×N)           (×N)
//!                                   │                               │
//!                                   └────────▶ WriteArbiter ◀───────┘
//!                                                   │
//!                                  FrameTable (mapper · tracker · presenter) ─▶ egress
//! ```
//!
//! Malformed or late input never stalls the pipeline: it is masked or
//! dropped and shows up only in [`Diagnostics`].

pub mod allocator;
pub mod arbiter;
pub mod config;
pub mod descriptor;
pub mod diagnostics;
pub mod driver;
pub mod error;
pub mod frame_table;
pub mod mover;
pub mod parser;
pub mod scheduler;
pub mod staging;

pub use allocator::{AllocatorState, PageAllocator};
pub use arbiter::{Grant, WriteArbiter};
pub use config::SchedulerConfig;
pub use descriptor::{BlockDescriptor, Descriptor, FrameStartDescriptor, Handle};
pub use diagnostics::Diagnostics;
pub use driver::{always_ready, Driver};
pub use error::{Result, SchedulerError};
pub use frame_table::{FrameTable, PresenterState};
pub use mover::{BlockMover, MoverState};
pub use parser::{LaneParser, ParserState};
pub use scheduler::Scheduler;
pub use staging::LaneStaging;
