//! Tickets passed between pipeline stages.

use pktsched_record::ErrorFlags;

/// A buffered block, ready to be placed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BlockDescriptor {
    /// Frame timestamp plus slot index, in slot units.
    pub timestamp: u64,
    /// First hit's position in the lane's Payload Queue.
    pub offset: usize,
    /// Hits buffered for this block.
    pub len: usize,
    /// First block of its frame.
    pub sof: bool,
    /// Last declared block of its frame.
    pub eof: bool,
    /// Errors folded into this block while it was parsed.
    pub err: ErrorFlags,
    /// Set when the block was masked for lack of credit.
    pub masked: bool,
}

/// A lane has seen a complete frame header.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStartDescriptor {
    pub timestamp: u64,
    pub serial: u32,
    pub subheader_count: u16,
    pub hit_count: u16,
}

/// Descriptor Queue item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Descriptor {
    Block(BlockDescriptor),
    FrameStart(FrameStartDescriptor),
}

impl Default for Descriptor {
    fn default() -> Self {
        Descriptor::Block(BlockDescriptor::default())
    }
}

impl Descriptor {
    pub fn timestamp(&self) -> u64 {
        match self {
            Descriptor::Block(b) => b.timestamp,
            Descriptor::FrameStart(f) => f.timestamp,
        }
    }

    /// Payload words this descriptor holds in the Payload Queue.
    pub fn payload_len(&self) -> usize {
        match self {
            Descriptor::Block(b) => b.len,
            Descriptor::FrameStart(_) => 0,
        }
    }

    pub fn is_frame_start(&self) -> bool {
        matches!(self, Descriptor::FrameStart(_))
    }
}

/// Movement order from the allocator to a lane's mover.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Handle {
    /// Source position in the lane's Payload Queue.
    pub src: usize,
    /// Destination, as an offset from the start of the open frame.
    pub dst: usize,
    /// Words to move (or to release, when skipped).
    pub len: usize,
    /// Release the payload without moving it.
    pub skip: bool,
}

impl Handle {
    /// A handle that only returns `len` words of payload credit.
    pub fn skip(src: usize, len: usize) -> Self {
        Self {
            src,
            dst: 0,
            len,
            skip: true,
        }
    }
}
