//! Write-side tile placement.

use serde::Serialize;

use super::tracker::{Spill, TileTracker};

/// Where the open frame lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Placement {
    pub tile: usize,
    pub start: usize,
    /// Tile that receives whatever crosses the end of `tile`.
    pub trail: Option<usize>,
}

/// Why a frame could not be placed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapRejection {
    /// The frame's worst-case span is larger than a tile.
    TooLarge,
    /// Every other tile is held by the reader.
    Contention,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MapperCounters {
    pub frames_mapped: u64,
    pub rotations: u64,
    pub spills: u64,
    pub redirects: u64,
    pub frames_overwritten: u64,
    pub contention_drops: u64,
    pub oversize_drops: u64,
}

#[derive(Debug, Clone)]
pub struct Mapper {
    tile_size: usize,
    active: usize,
    wofs: usize,
    next_epoch: u64,
    open: Option<Placement>,
    counters: MapperCounters,
}

impl Mapper {
    /// Starts writing at the beginning of tile 0, which takes epoch 0.
    pub fn new(tile_size: usize, trackers: &mut [TileTracker]) -> Self {
        if let Some(first) = trackers.first_mut() {
            first.flush(0);
        }
        Self {
            tile_size,
            active: 0,
            wofs: 0,
            next_epoch: 1,
            open: None,
            counters: MapperCounters::default(),
        }
    }

    pub fn active_tile(&self) -> usize {
        self.active
    }

    pub fn write_offset(&self) -> usize {
        self.wofs
    }

    pub fn open_frame(&self) -> Option<Placement> {
        self.open
    }

    pub fn counters(&self) -> &MapperCounters {
        &self.counters
    }

    /// Place a frame of at most `max_span` words. `locked` holds the tiles
    /// the reader must keep.
    pub fn map(
        &mut self,
        max_span: usize,
        trackers: &mut [TileTracker],
        locked: &[usize],
    ) -> Result<Placement, MapRejection> {
        if max_span > self.tile_size {
            self.counters.oversize_drops += 1;
            tracing::warn!(max_span, tile_size = self.tile_size, "frame larger than a tile, dropped");
            return Err(MapRejection::TooLarge);
        }

        if trackers[self.active].is_full() || self.wofs >= self.tile_size {
            let fresh = self.claim(trackers, locked)?;
            tracing::debug!(from = self.active, to = fresh, "rotating write tile");
            self.active = fresh;
            self.wofs = 0;
            self.counters.rotations += 1;
        }

        let trail = if max_span <= self.tile_size - self.wofs {
            None
        } else {
            let trail = self.claim(trackers, locked)?;
            trackers[self.active].set_spill(Spill {
                trail_tile: trail,
                remainder: 0,
            });
            self.counters.spills += 1;
            tracing::debug!(tile = self.active, trail, start = self.wofs, max_span, "frame may spill");
            Some(trail)
        };

        trackers[self.active].open(self.wofs);
        let placement = Placement {
            tile: self.active,
            start: self.wofs,
            trail,
        };
        self.open = Some(placement);
        self.counters.frames_mapped += 1;
        Ok(placement)
    }

    /// Physical storage address of word `offset` of the open frame.
    pub fn translate(&self, offset: usize) -> Option<usize> {
        let placement = self.open?;
        let abs = placement.start + offset;
        if abs < self.tile_size {
            return Some(placement.tile * self.tile_size + abs);
        }
        let trail = placement.trail?;
        let rest = abs - self.tile_size;
        (rest < self.tile_size).then_some(trail * self.tile_size + rest)
    }

    /// Commit the open frame with its final span and move the write
    /// position past it.
    pub fn close(&mut self, span: usize, trackers: &mut [TileTracker]) -> Option<Placement> {
        let placement = self.open.take()?;
        trackers[placement.tile].close(span, self.tile_size);
        let end = placement.start + span;
        match placement.trail {
            None => self.wofs = end,
            Some(trail) => {
                let remainder = end.saturating_sub(self.tile_size);
                trackers[placement.tile].set_spill(Spill {
                    trail_tile: trail,
                    remainder,
                });
                trackers[trail].extend_fill(remainder);
                self.active = trail;
                self.wofs = remainder;
            }
        }
        Some(placement)
    }

    /// Take a fresh tile for writing, preferring the one after the active
    /// tile. Its previous contents are discarded.
    fn claim(&mut self, trackers: &mut [TileTracker], locked: &[usize]) -> Result<usize, MapRejection> {
        let n = trackers.len();
        let preferred = (self.active + 1) % n;
        let Some(tile) = (1..n)
            .map(|i| (self.active + i) % n)
            .find(|t| !locked.contains(t))
        else {
            self.counters.contention_drops += 1;
            tracing::warn!(active = self.active, ?locked, "no free tile, frame dropped");
            return Err(MapRejection::Contention);
        };
        if tile != preferred {
            self.counters.redirects += 1;
            tracing::debug!(preferred, tile, "reader holds tile, redirecting");
        }

        let lost = trackers[tile].flush(self.next_epoch);
        self.next_epoch += 1;
        let lost_spills = trackers
            .iter_mut()
            .filter(|t| t.spill().is_some_and(|s| s.trail_tile == tile))
            .map(|t| usize::from(t.drop_spilled()))
            .sum::<usize>();
        let lost = lost + lost_spills;
        if lost > 0 {
            self.counters.frames_overwritten += lost as u64;
            tracing::warn!(tile, lost, "unread frames overwritten");
        }
        Ok(tile)
    }

    pub fn reset(&mut self, trackers: &mut [TileTracker]) {
        for tracker in trackers.iter_mut() {
            tracker.reset();
        }
        if let Some(first) = trackers.first_mut() {
            first.flush(0);
        }
        self.active = 0;
        self.wofs = 0;
        self.next_epoch = 1;
        self.open = None;
    }
}
