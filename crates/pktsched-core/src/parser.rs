//! Lane parser: raw words in, descriptors and payload out.
//!
//! The parser never blocks its lane. When a queue has no credit the affected
//! block or frame is masked; when a word is malformed the enclosing block or
//! frame is masked. Both are counted, neither is an error.
//!
//! A credit-masked block still reports itself with a zero-length descriptor
//! so the allocator learns where the lane's frame ends. If even the reserved
//! credit is gone, the descriptor waits in the parser. Later masked blocks of
//! the same frame fold into it, and it is pushed ahead of anything newer as
//! soon as one credit comes back.

use pktsched_record::{classify, ErrorFlags, Header, Subheader, Word, WordKind, HEADER_WORDS};
use pktsched_ring::WordMemory;
use serde::Serialize;

use crate::config::SchedulerConfig;
use crate::descriptor::{BlockDescriptor, Descriptor, FrameStartDescriptor};
use crate::staging::LaneStaging;

/// Descriptor credit kept back so a credit-masked block can still report
/// itself with a zero-length descriptor.
const MASK_RESERVE: usize = 1;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ParserState {
    #[default]
    Idle,
    UpdateHeaderFields,
    MaskBlock,
    MaskFrame,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ParserCounters {
    pub words: u64,
    pub hits_accepted: u64,
    pub hits_dropped: u64,
    pub descriptors: u64,
    pub descriptors_dropped: u64,
    pub blocks_masked: u64,
    pub frames_masked: u64,
    pub credit_masks: u64,
    /// Masked blocks folded into a descriptor still waiting for credit.
    pub masks_merged: u64,
    pub hit_errors: u64,
    pub block_errors: u64,
    pub frame_errors: u64,
}

#[derive(Debug, Clone, Copy)]
struct FrameContext {
    timestamp: u64,
    subheader_count: u16,
    blocks_seen: u16,
    last_slot: Option<u8>,
}

#[derive(Debug, Clone, Copy)]
struct BlockContext {
    timestamp: u64,
    offset: usize,
    declared: usize,
    received: usize,
    sof: bool,
    eof: bool,
}

/// One lane's record parser.
#[derive(Debug, Clone)]
pub struct LaneParser {
    lane: usize,
    state: ParserState,
    max_hits: usize,
    max_blocks: usize,
    fields: [u32; HEADER_WORDS - 1],
    field_idx: usize,
    frame: Option<FrameContext>,
    block: Option<BlockContext>,
    wptr: usize,
    last_ts: Option<u64>,
    pending_mask: Option<BlockDescriptor>,
    counters: ParserCounters,
}

impl LaneParser {
    pub fn new(lane: usize, config: &SchedulerConfig) -> Self {
        Self {
            lane,
            state: ParserState::Idle,
            max_hits: config.max_hits_per_block,
            max_blocks: config.max_blocks_per_frame,
            fields: [0; HEADER_WORDS - 1],
            field_idx: 0,
            frame: None,
            block: None,
            wptr: 0,
            last_ts: None,
            pending_mask: None,
            counters: ParserCounters::default(),
        }
    }

    pub fn lane(&self) -> usize {
        self.lane
    }

    pub fn state(&self) -> ParserState {
        self.state
    }

    pub fn counters(&self) -> &ParserCounters {
        &self.counters
    }

    /// Back to the reset state. Counters are kept.
    pub fn reset(&mut self) {
        self.state = ParserState::Idle;
        self.field_idx = 0;
        self.frame = None;
        self.block = None;
        self.wptr = 0;
        self.last_ts = None;
        self.pending_mask = None;
    }

    /// A masked-block descriptor is waiting for descriptor credit.
    pub fn has_pending_mask(&self) -> bool {
        self.pending_mask.is_some()
    }

    /// Push the waiting masked-block descriptor if a credit has come back.
    /// Runs every round, with or without an ingress word.
    pub fn flush_pending(&mut self, staging: &mut LaneStaging) {
        let Some(desc) = self.pending_mask else {
            return;
        };
        if !staging.descriptor_credit.try_spend(1) {
            return;
        }
        self.pending_mask = None;
        tracing::trace!(lane = self.lane, ts = desc.timestamp, eof = desc.eof, "masked block released");
        self.push(Descriptor::Block(desc), staging);
    }

    /// Consume one lane word.
    pub fn step(&mut self, word: Word, staging: &mut LaneStaging) {
        self.flush_pending(staging);
        self.counters.words += 1;

        if word.err.contains(ErrorFlags::FRAME) && self.state != ParserState::MaskFrame {
            self.frame_error(staging, "frame error flag");
            return;
        }

        match self.state {
            ParserState::Idle => self.on_idle(word, staging),
            ParserState::UpdateHeaderFields => self.on_header_field(word, staging),
            ParserState::MaskBlock => self.on_mask_block(word, staging),
            ParserState::MaskFrame => self.on_mask_frame(word),
        }
    }

    fn on_idle(&mut self, word: Word, staging: &mut LaneStaging) {
        match classify(&word) {
            WordKind::Preamble => {
                self.truncate_block(staging);
                self.begin_header();
            }
            WordKind::Subheader => {
                self.truncate_block(staging);
                self.on_subheader(word, staging);
            }
            WordKind::Trailer => {
                self.truncate_block(staging);
                self.frame = None;
            }
            WordKind::Data => self.on_hit(word, staging),
            WordKind::UnknownControl => {
                self.block_error(staging, "unknown control symbol");
            }
        }
    }

    fn on_hit(&mut self, word: Word, staging: &mut LaneStaging) {
        let Some(mut block) = self.block else {
            self.counters.hits_dropped += 1;
            self.block_error(staging, "hit outside a block");
            return;
        };

        if word.err.contains(ErrorFlags::BLOCK) {
            self.block_error(staging, "block error flag");
            return;
        }
        if word.err.contains(ErrorFlags::HIT) {
            self.counters.hit_errors += 1;
            self.counters.hits_dropped += 1;
            tracing::trace!(lane = self.lane, good = block.received, "hit error");
            self.close_block(ErrorFlags::HIT, staging);
            self.state = ParserState::MaskBlock;
            return;
        }

        staging.payload.write(self.wptr, word);
        self.wptr = (self.wptr + 1) % staging.payload.depth();
        block.received += 1;
        self.counters.hits_accepted += 1;
        self.block = Some(block);
        if block.received == block.declared {
            self.close_block(ErrorFlags::NONE, staging);
        }
    }

    fn on_subheader(&mut self, word: Word, staging: &mut LaneStaging) {
        let sub = Subheader::from_data(word.data);
        let hits = usize::from(sub.hit_count);

        if word.err.contains(ErrorFlags::BLOCK) {
            self.block_error(staging, "block error flag");
            return;
        }
        let Some(mut frame) = self.frame else {
            self.block_error(staging, "subheader outside a frame");
            return;
        };
        if hits > self.max_hits {
            self.block_error(staging, "hit count over limit");
            return;
        }
        if frame.blocks_seen >= frame.subheader_count {
            self.block_error(staging, "more blocks than declared");
            return;
        }
        if frame.last_slot.is_some_and(|last| sub.slot < last) {
            self.block_error(staging, "slot went backwards");
            return;
        }

        frame.blocks_seen += 1;
        frame.last_slot = Some(sub.slot);
        self.frame = Some(frame);

        let timestamp = frame.timestamp + u64::from(sub.slot);
        let sof = frame.blocks_seen == 1;
        let eof = frame.blocks_seen == frame.subheader_count;

        let has_credit = self.pending_mask.is_none()
            && staging.descriptor_credit.spendable() > MASK_RESERVE
            && staging.payload_credit.spendable() >= hits;
        if !has_credit {
            self.counters.credit_masks += 1;
            self.counters.blocks_masked += 1;
            tracing::trace!(lane = self.lane, slot = sub.slot, hits, "block masked, no credit");
            self.mask_block(timestamp, sof, eof, staging);
            self.state = ParserState::MaskBlock;
            return;
        }

        // Checked above; both spends succeed.
        staging.descriptor_credit.try_spend(1);
        staging.payload_credit.try_spend(hits);
        self.block = Some(BlockContext {
            timestamp,
            offset: self.wptr,
            declared: hits,
            received: 0,
            sof,
            eof,
        });
        self.state = ParserState::Idle;
        if hits == 0 {
            self.close_block(ErrorFlags::NONE, staging);
        }
    }

    fn begin_header(&mut self) {
        self.frame = None;
        self.field_idx = 0;
        self.state = ParserState::UpdateHeaderFields;
    }

    fn on_header_field(&mut self, word: Word, staging: &mut LaneStaging) {
        if classify(&word) != WordKind::Data {
            self.frame_error(staging, "control word inside header");
            // The word itself may open the next frame.
            self.on_mask_frame(word);
            return;
        }

        self.fields[self.field_idx] = word.data;
        self.field_idx += 1;
        if self.field_idx < self.fields.len() {
            return;
        }

        let header = Header::from_field_words(self.fields);
        if usize::from(header.subheader_count) > self.max_blocks {
            self.frame_error(staging, "subheader count over limit");
            return;
        }
        if self.last_ts.is_some_and(|last| header.timestamp < last) {
            self.frame_error(staging, "frame timestamp went backwards");
            return;
        }
        if self.pending_mask.is_some() || staging.descriptor_credit.spendable() <= MASK_RESERVE {
            self.counters.credit_masks += 1;
            self.counters.frames_masked += 1;
            tracing::trace!(lane = self.lane, ts = header.timestamp, "frame masked, no credit");
            self.state = ParserState::MaskFrame;
            return;
        }

        staging.descriptor_credit.try_spend(1);
        let desc = FrameStartDescriptor {
            timestamp: header.timestamp,
            serial: header.serial,
            subheader_count: header.subheader_count,
            hit_count: header.hit_count,
        };
        self.push(Descriptor::FrameStart(desc), staging);
        self.last_ts = Some(header.timestamp);
        self.frame = Some(FrameContext {
            timestamp: header.timestamp,
            subheader_count: header.subheader_count,
            blocks_seen: 0,
            last_slot: None,
        });
        self.state = ParserState::Idle;
    }

    /// Record a credit-masked block. It takes the waiting descriptor's place
    /// if one exists, keeping the earlier start-of-frame and the later
    /// timestamp and end-of-frame.
    fn mask_block(&mut self, timestamp: u64, sof: bool, eof: bool, staging: &mut LaneStaging) {
        let desc = match self.pending_mask.take() {
            Some(prev) => {
                self.counters.masks_merged += 1;
                BlockDescriptor {
                    timestamp,
                    sof: prev.sof || sof,
                    eof: prev.eof || eof,
                    ..prev
                }
            }
            None => BlockDescriptor {
                timestamp,
                offset: self.wptr,
                len: 0,
                sof,
                eof,
                err: ErrorFlags::NONE,
                masked: true,
            },
        };
        self.pending_mask = Some(desc);
        self.last_ts = Some(timestamp);
        self.flush_pending(staging);
    }

    fn on_mask_block(&mut self, word: Word, staging: &mut LaneStaging) {
        match classify(&word) {
            WordKind::Preamble => self.begin_header(),
            WordKind::Subheader => self.on_subheader(word, staging),
            WordKind::Trailer => {
                self.frame = None;
                self.state = ParserState::Idle;
            }
            WordKind::Data => self.counters.hits_dropped += 1,
            WordKind::UnknownControl => {}
        }
    }

    fn on_mask_frame(&mut self, word: Word) {
        match classify(&word) {
            WordKind::Preamble => self.begin_header(),
            WordKind::Trailer => {
                self.frame = None;
                self.state = ParserState::Idle;
            }
            WordKind::Data => self.counters.hits_dropped += 1,
            _ => {}
        }
    }

    fn block_error(&mut self, staging: &mut LaneStaging, reason: &'static str) {
        self.counters.block_errors += 1;
        self.counters.blocks_masked += 1;
        tracing::trace!(lane = self.lane, reason, "block masked");
        self.truncate_block(staging);
        self.state = ParserState::MaskBlock;
    }

    fn frame_error(&mut self, staging: &mut LaneStaging, reason: &'static str) {
        self.counters.frame_errors += 1;
        self.counters.frames_masked += 1;
        tracing::debug!(lane = self.lane, reason, "frame masked");
        if self.block.is_some() {
            self.close_block(ErrorFlags::BLOCK | ErrorFlags::FRAME, staging);
        }
        self.frame = None;
        self.state = ParserState::MaskFrame;
    }

    /// A block that ends before all its hits arrived.
    fn truncate_block(&mut self, staging: &mut LaneStaging) {
        if self.block.is_some() {
            self.close_block(ErrorFlags::BLOCK, staging);
        }
    }

    /// Emit the open block's descriptor with the hits received so far and
    /// hand back any payload credit reserved for hits that never came.
    fn close_block(&mut self, err: ErrorFlags, staging: &mut LaneStaging) {
        let Some(block) = self.block.take() else {
            return;
        };
        let unused = block.declared - block.received;
        if unused > 0 {
            staging.payload_credit.give_back(unused);
        }
        let desc = BlockDescriptor {
            timestamp: block.timestamp,
            offset: block.offset,
            len: block.received,
            sof: block.sof,
            eof: block.eof,
            err,
            masked: false,
        };
        self.push(Descriptor::Block(desc), staging);
        self.last_ts = Some(block.timestamp);
    }

    fn push(&mut self, desc: Descriptor, staging: &mut LaneStaging) {
        match staging.descriptors.push(desc) {
            Ok(()) => self.counters.descriptors += 1,
            Err(err) => {
                self.counters.descriptors_dropped += 1;
                tracing::warn!(lane = self.lane, %err, "descriptor queue overrun");
            }
        }
    }
}
