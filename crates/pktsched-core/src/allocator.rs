//! Page allocator: aligns lanes slot by slot and lays out the egress frame.
//!
//! ```text
//! Idle ─▶ FetchDescriptor ─▶ AllocatePage ─▶ WritePage ─▶ Idle
//!   │                                                       ▲
//!   └── (every lane done) ─▶ WriteHeader ─▶ WriteTrailer ───┘
//! ```
//!
//! Frame layout is fixed at open time: the header is reserved at offset 0
//! and written last, once the real page and hit counts are known. Pages
//! follow from offset `HEADER_WORDS`, then the trailer.
//!
//! A lane is done with the open frame once its end-of-frame block has been
//! taken, once its queue shows the next frame start, or, while draining,
//! once its queue is empty. The frame closes when every lane is done.

use pktsched_record::{
    ErrorFlags, Header, Subheader, Word, HEADER_WORDS, SUBHEADER_WORDS, TRAILER, TRAILER_WORDS,
};
use serde::Serialize;

use crate::config::SchedulerConfig;
use crate::descriptor::{BlockDescriptor, Descriptor, FrameStartDescriptor, Handle};
use crate::frame_table::FrameTable;
use crate::staging::LaneStaging;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AllocatorState {
    #[default]
    Idle,
    FetchDescriptor,
    AllocatePage,
    WritePage,
    WriteHeader,
    WriteTrailer,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AllocatorCounters {
    pub frames_opened: u64,
    pub headers_written: u64,
    pub headers_dropped: u64,
    pub subheaders_written: u64,
    pub subheaders_dropped: u64,
    pub hits_written: u64,
    pub hits_dropped: u64,
    /// Slots that passed with every lane masked.
    pub slots_skipped: u64,
    /// Blocks that would have run past the frame's reserved span.
    pub overflow_drops: u64,
}

/// Per-lane outcome of one fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Fetched {
    /// Nothing taken this round.
    Held,
    OnTime(BlockDescriptor),
    /// Taken and discarded; its payload still has to be released.
    Dropped(BlockDescriptor),
}

#[derive(Debug, Clone, Copy)]
struct OpenFrame {
    timestamp: u64,
    serial: u32,
    max_span: usize,
    /// Declared blocks not yet taken; each may still need a page.
    blocks_left: usize,
    page_ptr: usize,
    pages: usize,
    hits: usize,
    err: ErrorFlags,
}

#[derive(Debug, Clone, Copy)]
struct PendingPage {
    ptr: usize,
    len: usize,
    hits: usize,
    err: ErrorFlags,
}

#[derive(Debug, Clone)]
pub struct PageAllocator {
    state: AllocatorState,
    future_slack: u64,
    serial: u32,
    running_ts: u64,
    frame: Option<OpenFrame>,
    fetched: Vec<Fetched>,
    done: Vec<bool>,
    page: Option<PendingPage>,
    header_idx: usize,
    draining: bool,
    counters: AllocatorCounters,
}

impl PageAllocator {
    pub fn new(config: &SchedulerConfig) -> Self {
        Self {
            state: AllocatorState::Idle,
            future_slack: config.future_slack,
            serial: 0,
            running_ts: 0,
            frame: None,
            fetched: vec![Fetched::Held; config.lanes],
            done: vec![false; config.lanes],
            page: None,
            header_idx: 0,
            draining: false,
            counters: AllocatorCounters::default(),
        }
    }

    pub fn state(&self) -> AllocatorState {
        self.state
    }

    pub fn serial(&self) -> u32 {
        self.serial
    }

    pub fn running_timestamp(&self) -> u64 {
        self.running_ts
    }

    pub fn counters(&self) -> &AllocatorCounters {
        &self.counters
    }

    pub fn has_open_frame(&self) -> bool {
        self.frame.is_some()
    }

    /// Current slot within the open frame.
    pub fn slot(&self) -> Option<u64> {
        self.frame.map(|f| self.running_ts - f.timestamp)
    }

    /// When set, lanes with nothing queued no longer hold up the open frame;
    /// they count as masked so the frame can finish.
    pub fn set_draining(&mut self, draining: bool) {
        self.draining = draining;
    }

    pub fn is_idle(&self) -> bool {
        self.state == AllocatorState::Idle && self.frame.is_none()
    }

    pub fn reset(&mut self) {
        self.state = AllocatorState::Idle;
        self.running_ts = 0;
        self.frame = None;
        self.fetched.fill(Fetched::Held);
        self.done.fill(false);
        self.page = None;
        self.header_idx = 0;
        self.draining = false;
    }

    /// Wants the write port this round. The trailer waits until every
    /// block of the frame has landed.
    pub fn write_request(&self, moves_pending: bool) -> bool {
        match self.state {
            AllocatorState::WritePage | AllocatorState::WriteHeader => true,
            AllocatorState::WriteTrailer => !moves_pending,
            _ => false,
        }
    }

    /// Advance one round. Returns true when the running timestamp moved on
    /// by one slot.
    pub fn step(
        &mut self,
        granted: bool,
        staging: &mut [LaneStaging],
        table: &mut FrameTable,
    ) -> bool {
        match self.state {
            AllocatorState::Idle => {
                self.idle(staging);
                false
            }
            AllocatorState::FetchDescriptor => self.fetch(staging, table),
            AllocatorState::AllocatePage => {
                self.allocate_page(staging);
                false
            }
            AllocatorState::WritePage => granted && self.write_page(table),
            AllocatorState::WriteHeader => {
                if granted {
                    self.write_header(table);
                }
                false
            }
            AllocatorState::WriteTrailer => {
                if granted {
                    self.write_trailer(table);
                }
                false
            }
        }
    }

    fn idle(&mut self, staging: &[LaneStaging]) {
        if self.frame.is_some() {
            for (done, s) in self.done.iter_mut().zip(staging) {
                match s.head() {
                    Some(Descriptor::FrameStart(_)) => *done = true,
                    None if self.draining => *done = true,
                    _ => {}
                }
            }
            if self.done.iter().all(|&d| d) {
                self.state = AllocatorState::WriteHeader;
                return;
            }
        }
        if !staging.iter().all(LaneStaging::handle_room) {
            return;
        }
        let ready = match self.frame {
            Some(_) => self
                .done
                .iter()
                .zip(staging)
                .all(|(&done, s)| done || s.head().is_some()),
            None => self.frame_start_ready(staging),
        };
        if ready {
            self.state = AllocatorState::FetchDescriptor;
        }
    }

    /// With no frame open: every lane shows something, or we are draining
    /// and some lane holds a block that can only be discarded.
    fn frame_start_ready(&self, staging: &[LaneStaging]) -> bool {
        staging.iter().all(|s| s.head().is_some())
            || (self.draining
                && staging
                    .iter()
                    .any(|s| matches!(s.head(), Some(Descriptor::Block(_)))))
    }

    /// Nothing left to do until new descriptors arrive.
    pub fn is_settled(&self, staging: &[LaneStaging]) -> bool {
        self.is_idle() && !self.frame_start_ready(staging)
    }

    fn fetch(&mut self, staging: &mut [LaneStaging], table: &mut FrameTable) -> bool {
        self.fetched.fill(Fetched::Held);
        match self.frame {
            None => {
                self.fetch_frame_start(staging, table);
                self.state = AllocatorState::Idle;
                false
            }
            Some(_) => self.fetch_blocks(staging),
        }
    }

    fn fetch_frame_start(&mut self, staging: &mut [LaneStaging], table: &mut FrameTable) {
        let starts: Option<Vec<FrameStartDescriptor>> = staging
            .iter()
            .map(|s| match s.head() {
                Some(Descriptor::FrameStart(f)) => Some(f),
                _ => None,
            })
            .collect();

        let Some(starts) = starts else {
            // Blocks with no frame to land in are stale.
            for (lane, s) in staging.iter_mut().enumerate() {
                if let Some(Descriptor::Block(b)) = s.head() {
                    s.pop_descriptor();
                    self.drop_block(lane, b, s);
                }
            }
            return;
        };

        let newest = starts.iter().map(|f| f.timestamp).max().unwrap_or(0);
        if starts.iter().any(|f| f.timestamp != newest) {
            for (lane, (s, f)) in staging.iter_mut().zip(&starts).enumerate() {
                if f.timestamp < newest {
                    s.pop_descriptor();
                    self.counters.headers_dropped += 1;
                    tracing::debug!(lane, ts = f.timestamp, newest, "stale frame start dropped");
                }
            }
            return;
        }

        for s in staging.iter_mut() {
            s.pop_descriptor();
        }
        let serial = self.serial;
        self.serial = self.serial.wrapping_add(1);

        let blocks: usize = starts.iter().map(|f| usize::from(f.subheader_count)).sum();
        let hits: usize = starts.iter().map(|f| usize::from(f.hit_count)).sum();
        let max_span = HEADER_WORDS + blocks * SUBHEADER_WORDS + hits + TRAILER_WORDS;

        match table.map_frame(max_span) {
            Ok(placement) => {
                self.running_ts = newest;
                for (done, f) in self.done.iter_mut().zip(&starts) {
                    *done = f.subheader_count == 0;
                }
                self.frame = Some(OpenFrame {
                    timestamp: newest,
                    serial,
                    max_span,
                    blocks_left: blocks,
                    page_ptr: HEADER_WORDS,
                    pages: 0,
                    hits: 0,
                    err: ErrorFlags::NONE,
                });
                self.counters.frames_opened += 1;
                tracing::debug!(
                    serial,
                    ts = newest,
                    blocks,
                    max_span,
                    tile = placement.tile,
                    start = placement.start,
                    "frame opened"
                );
            }
            Err(rejection) => {
                self.counters.headers_dropped += starts.len() as u64;
                tracing::warn!(serial, ts = newest, max_span, ?rejection, "frame not placed");
            }
        }
    }

    fn fetch_blocks(&mut self, staging: &mut [LaneStaging]) -> bool {
        let running = self.running_ts;
        let mut earliest_held: Option<u64> = None;

        for (lane, s) in staging.iter_mut().enumerate() {
            if self.done[lane] {
                continue;
            }
            let Some(Descriptor::Block(b)) = s.head() else {
                // Nothing yet while draining.
                continue;
            };
            if b.timestamp == running {
                s.pop_descriptor();
                self.fetched[lane] = Fetched::OnTime(b);
            } else if b.timestamp > running {
                // Re-offered every slot until its turn comes; no credit moves.
                earliest_held = Some(earliest_held.map_or(b.timestamp, |t| t.min(b.timestamp)));
                continue;
            } else {
                s.pop_descriptor();
                self.fetched[lane] = Fetched::Dropped(b);
            }
            self.done[lane] = b.eof;
            if let Some(frame) = self.frame.as_mut() {
                frame.blocks_left = frame.blocks_left.saturating_sub(1);
            }
        }

        let any_taken = self.fetched.iter().any(|f| *f != Fetched::Held);
        if any_taken {
            self.state = AllocatorState::AllocatePage;
            return false;
        }

        self.state = AllocatorState::Idle;
        match earliest_held {
            Some(next) if next - running > self.future_slack => self.fast_forward(next),
            _ => {
                // Every lane masked: the slot passes without a page.
                self.counters.slots_skipped += 1;
                tracing::trace!(ts = running, "slot skipped");
                self.advance_slot()
            }
        }
    }

    /// Every lane is held further ahead than the slack window: jump straight
    /// to the earliest held slot instead of stepping through the gap.
    fn fast_forward(&mut self, next: u64) -> bool {
        if self.frame.is_none() {
            return false;
        }
        let skipped = next - self.running_ts;
        self.counters.slots_skipped += skipped;
        tracing::debug!(from = self.running_ts, to = next, skipped, "running timestamp fast-forwarded");
        self.running_ts = next;
        true
    }

    fn allocate_page(&mut self, staging: &mut [LaneStaging]) {
        let Some(frame) = self.frame else {
            self.state = AllocatorState::Idle;
            return;
        };
        // Room for the trailer and for one subheader per block still to come.
        let limit = frame
            .max_span
            .saturating_sub(TRAILER_WORDS + frame.blocks_left * SUBHEADER_WORDS);
        let page_fits = frame.page_ptr + SUBHEADER_WORDS <= limit;

        let mut dst = frame.page_ptr + SUBHEADER_WORDS;
        let mut hits = 0;
        let mut err = ErrorFlags::NONE;
        let mut on_time = false;

        for lane in 0..self.fetched.len() {
            match self.fetched[lane] {
                Fetched::Held => {}
                Fetched::Dropped(b) => self.drop_block(lane, b, &mut staging[lane]),
                Fetched::OnTime(b) if !page_fits => {
                    self.counters.overflow_drops += 1;
                    self.drop_block(lane, b, &mut staging[lane]);
                }
                Fetched::OnTime(b) => {
                    on_time = true;
                    err |= b.err;
                    if b.len == 0 {
                        continue;
                    }
                    if dst + b.len > limit {
                        self.counters.overflow_drops += 1;
                        self.counters.hits_dropped += b.len as u64;
                        tracing::warn!(lane, len = b.len, ts = b.timestamp, "block overruns frame, dropped");
                        push_handle(lane, &mut staging[lane], Handle::skip(b.offset, b.len));
                        continue;
                    }
                    let handle = Handle {
                        src: b.offset,
                        dst,
                        len: b.len,
                        skip: false,
                    };
                    push_handle(lane, &mut staging[lane], handle);
                    dst += b.len;
                    hits += b.len;
                }
            }
        }

        if on_time {
            self.page = Some(PendingPage {
                ptr: frame.page_ptr,
                len: dst - frame.page_ptr,
                hits,
                err,
            });
            self.state = AllocatorState::WritePage;
        } else {
            self.state = AllocatorState::Idle;
        }
    }

    fn write_page(&mut self, table: &mut FrameTable) -> bool {
        let (Some(page), Some(mut frame)) = (self.page.take(), self.frame) else {
            self.state = AllocatorState::Idle;
            return false;
        };
        let sub = Subheader {
            slot: (self.running_ts - frame.timestamp) as u8,
            hit_count: u16::try_from(page.hits).unwrap_or(u16::MAX),
        };
        table.write(page.ptr, sub.to_word().with_err(page.err));

        frame.page_ptr += page.len;
        frame.pages += 1;
        frame.hits += page.hits;
        frame.err |= page.err;
        self.frame = Some(frame);
        self.counters.subheaders_written += 1;
        self.counters.hits_written += page.hits as u64;
        self.state = AllocatorState::Idle;
        self.advance_slot()
    }

    fn write_header(&mut self, table: &mut FrameTable) {
        let Some(frame) = self.frame else {
            self.state = AllocatorState::Idle;
            return;
        };
        let header = Header {
            timestamp: frame.timestamp,
            serial: frame.serial,
            subheader_count: u16::try_from(frame.pages).unwrap_or(u16::MAX),
            hit_count: u16::try_from(frame.hits).unwrap_or(u16::MAX),
        };
        table.write(self.header_idx, header.to_words()[self.header_idx]);
        self.header_idx += 1;
        if self.header_idx == HEADER_WORDS {
            self.header_idx = 0;
            self.state = AllocatorState::WriteTrailer;
        }
    }

    fn write_trailer(&mut self, table: &mut FrameTable) {
        let Some(frame) = self.frame.take() else {
            self.state = AllocatorState::Idle;
            return;
        };
        table.write(frame.page_ptr, Word::control(TRAILER).with_err(frame.err));
        let span = frame.page_ptr + TRAILER_WORDS;
        table.close_frame(span);
        self.counters.headers_written += 1;
        tracing::debug!(
            serial = frame.serial,
            ts = frame.timestamp,
            pages = frame.pages,
            hits = frame.hits,
            span,
            "frame closed"
        );
        self.state = AllocatorState::Idle;
    }

    fn advance_slot(&mut self) -> bool {
        if self.frame.is_none() {
            return false;
        }
        self.running_ts += 1;
        true
    }

    fn drop_block(&mut self, lane: usize, b: BlockDescriptor, staging: &mut LaneStaging) {
        self.counters.subheaders_dropped += 1;
        self.counters.hits_dropped += b.len as u64;
        tracing::trace!(lane, ts = b.timestamp, running = self.running_ts, "stale block dropped");
        if b.len > 0 {
            push_handle(lane, staging, Handle::skip(b.offset, b.len));
        }
    }
}

fn push_handle(lane: usize, staging: &mut LaneStaging, handle: Handle) {
    if let Err(err) = staging.handles.push(handle) {
        tracing::warn!(lane, %err, "handle queue overrun");
    }
}
