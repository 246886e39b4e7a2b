//! Read side: streams complete frames out in order.

use std::collections::VecDeque;

use pktsched_record::{StreamWord, Word};
use pktsched_ring::{RingRam, WordMemory};
use serde::Serialize;

use super::tracker::{FrameEntry, TileTracker};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PresenterState {
    #[default]
    Idle,
    WaitForComplete,
    Presenting,
    Restart,
    Warp,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PresenterCounters {
    pub frames_presented: u64,
    pub words_presented: u64,
    pub restarts: u64,
    pub warps: u64,
    pub tile_crossings: u64,
    /// Times the reader's tile index changed, by crossing or by warp.
    pub tile_changes: u64,
}

#[derive(Debug, Clone, Copy)]
struct ActiveFrame {
    entry: FrameEntry,
    trail: Option<usize>,
}

/// Frame reader with a fixed-depth read pipeline.
///
/// A word leaves the pipeline only when the consumer is ready. If the
/// consumer stalls while a word is waiting, that word is held at the output
/// and the reads in flight behind it are thrown away; reading resumes right
/// after the held word in the round the consumer takes it.
#[derive(Debug, Clone)]
pub struct Presenter {
    state: PresenterState,
    depth: usize,
    tile_size: usize,
    tile: usize,
    frame_tile: usize,
    frame: Option<ActiveFrame>,
    next_read: usize,
    pipe: VecDeque<(usize, StreamWord)>,
    counters: PresenterCounters,
}

impl Presenter {
    pub fn new(depth: usize, tile_size: usize) -> Self {
        Self {
            state: PresenterState::Idle,
            depth,
            tile_size,
            tile: 0,
            frame_tile: 0,
            frame: None,
            next_read: 0,
            pipe: VecDeque::with_capacity(depth),
            counters: PresenterCounters::default(),
        }
    }

    pub fn state(&self) -> PresenterState {
        self.state
    }

    pub fn tile(&self) -> usize {
        self.tile
    }

    pub fn counters(&self) -> &PresenterCounters {
        &self.counters
    }

    pub fn is_presenting(&self) -> bool {
        self.frame.is_some()
    }

    /// Tiles the writer must not claim.
    pub fn locks(&self, trackers: &[TileTracker]) -> Vec<usize> {
        let mut locks = vec![self.tile];
        if self.frame_tile != self.tile {
            locks.push(self.frame_tile);
        }
        let current = &trackers[self.tile];
        if let Some(spill) = current.spill().filter(|_| current.has_unread_spill()) {
            if !locks.contains(&spill.trail_tile) {
                locks.push(spill.trail_tile);
            }
        }
        locks
    }

    pub fn reset(&mut self) {
        self.state = PresenterState::Idle;
        self.tile = 0;
        self.frame_tile = 0;
        self.frame = None;
        self.next_read = 0;
        self.pipe.clear();
    }

    /// Advance one round. Returns the word handed to the consumer, which
    /// only happens when `ready` is set.
    pub fn step(
        &mut self,
        trackers: &mut [TileTracker],
        storage: &RingRam<Word>,
        writer_tile: usize,
        ready: bool,
    ) -> Option<StreamWord> {
        match self.state {
            PresenterState::Idle => {
                self.state = PresenterState::WaitForComplete;
                None
            }
            PresenterState::WaitForComplete => {
                self.wait(trackers, writer_tile);
                None
            }
            PresenterState::Warp => {
                self.warp(trackers);
                None
            }
            PresenterState::Presenting | PresenterState::Restart => {
                self.present(trackers, storage, ready)
            }
        }
    }

    fn wait(&mut self, trackers: &[TileTracker], writer_tile: usize) {
        let tracker = &trackers[self.tile];
        if let Some(entry) = tracker.next_complete() {
            self.frame = Some(ActiveFrame {
                entry,
                trail: tracker.spill_of(tracker.read_idx()).map(|s| s.trail_tile),
            });
            self.frame_tile = self.tile;
            self.next_read = 0;
            self.pipe.clear();
            self.state = PresenterState::Presenting;
            tracing::trace!(tile = self.tile, start = entry.start, span = entry.span, "presenting frame");
        } else if tracker.exhausted() && writer_tile != self.tile {
            self.state = PresenterState::Warp;
        }
    }

    fn warp(&mut self, trackers: &[TileTracker]) {
        let current = trackers[self.tile].epoch();
        let target = trackers
            .iter()
            .enumerate()
            .filter_map(|(t, tracker)| tracker.epoch().map(|e| (t, e)))
            .filter(|&(_, e)| current.is_none_or(|c| e > c))
            .min_by_key(|&(_, e)| e)
            .map(|(t, _)| t);
        if let Some(tile) = target {
            tracing::debug!(from = self.tile, to = tile, "presenter warp");
            self.tile = tile;
            self.frame_tile = tile;
            self.counters.warps += 1;
            self.counters.tile_changes += 1;
        }
        self.state = PresenterState::WaitForComplete;
    }

    fn present(
        &mut self,
        trackers: &mut [TileTracker],
        storage: &RingRam<Word>,
        ready: bool,
    ) -> Option<StreamWord> {
        let Some(frame) = self.frame else {
            self.state = PresenterState::Idle;
            return None;
        };
        let span = frame.entry.span;

        let holding = self.state == PresenterState::Restart;
        let at_output = holding
            || self.pipe.len() >= self.depth
            || (self.next_read >= span && !self.pipe.is_empty());
        if at_output && !ready {
            if !holding {
                if let Some(&(offset, _)) = self.pipe.front() {
                    self.next_read = offset + 1;
                }
                self.pipe.truncate(1);
                self.counters.restarts += 1;
                self.state = PresenterState::Restart;
                tracing::trace!(resume = self.next_read, "consumer stall, holding output word");
            }
            return None;
        }
        self.state = PresenterState::Presenting;

        let out = if at_output { self.pipe.pop_front() } else { None };

        if self.next_read < span {
            let addr = self.address(&frame, self.next_read);
            let word = StreamWord {
                word: storage.read(addr),
                sop: self.next_read == 0,
                eop: self.next_read + 1 == span,
            };
            self.pipe.push_back((self.next_read, word));
            self.next_read += 1;
        }

        let (offset, word) = out?;
        self.counters.words_presented += 1;
        self.cross_boundary(&frame, offset);
        if word.eop {
            self.finish(&frame, trackers);
        }
        Some(word)
    }

    fn address(&self, frame: &ActiveFrame, offset: usize) -> usize {
        let abs = frame.entry.start + offset;
        if abs < self.tile_size {
            return self.frame_tile * self.tile_size + abs;
        }
        match frame.trail {
            Some(trail) => trail * self.tile_size + (abs - self.tile_size),
            None => self.frame_tile * self.tile_size + abs % self.tile_size,
        }
    }

    /// The reader's tile follows the frame into its trail tile when the
    /// first word past the boundary reaches the consumer.
    fn cross_boundary(&mut self, frame: &ActiveFrame, offset: usize) {
        let Some(trail) = frame.trail else {
            return;
        };
        if frame.entry.start + offset >= self.tile_size && self.tile != trail {
            tracing::debug!(from = self.tile, to = trail, "presenter crossing tile boundary");
            self.tile = trail;
            self.counters.tile_crossings += 1;
            self.counters.tile_changes += 1;
        }
    }

    fn finish(&mut self, frame: &ActiveFrame, trackers: &mut [TileTracker]) {
        trackers[self.frame_tile].advance();
        self.counters.frames_presented += 1;
        if let Some(trail) = frame.trail {
            if self.tile != trail {
                self.tile = trail;
                self.counters.tile_changes += 1;
            }
        }
        self.frame_tile = self.tile;
        self.frame = None;
        self.pipe.clear();
        self.state = PresenterState::Idle;
    }
}
