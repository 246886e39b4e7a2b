//! Tiled shared storage.
//!
//! Storage is split into equal tiles. The [`Mapper`] places each frame in
//! the active write tile (or lets it spill into a fresh trail tile), the
//! per-tile [`TileTracker`]s record where frames are and whether their
//! trailer is in, and the [`Presenter`] streams completed frames out. The
//! writer never claims a tile the presenter holds.

mod mapper;
mod presenter;
mod tracker;

pub use mapper::{MapRejection, Mapper, MapperCounters, Placement};
pub use presenter::{Presenter, PresenterCounters, PresenterState};
pub use tracker::{FrameEntry, Spill, TileTracker};

use pktsched_record::{StreamWord, Word};
use pktsched_ring::{RingRam, WordMemory};

use crate::config::SchedulerConfig;
use crate::error::Result;

#[derive(Debug, Clone)]
pub struct FrameTable {
    storage: RingRam<Word>,
    tile_size: usize,
    trackers: Vec<TileTracker>,
    mapper: Mapper,
    presenter: Presenter,
    stray_writes: u64,
}

impl FrameTable {
    pub fn new(config: &SchedulerConfig) -> Result<Self> {
        let tile_size = config.tile_words();
        let mut trackers = vec![TileTracker::new(config.entries_per_tile); config.tiles];
        let mapper = Mapper::new(tile_size, &mut trackers);
        Ok(Self {
            storage: RingRam::new(config.storage_words)?,
            tile_size,
            trackers,
            mapper,
            presenter: Presenter::new(config.presenter_pipeline_depth, tile_size),
            stray_writes: 0,
        })
    }

    /// Reserve room for a frame of at most `max_span` words.
    pub fn map_frame(&mut self, max_span: usize) -> std::result::Result<Placement, MapRejection> {
        let locks = self.presenter.locks(&self.trackers);
        self.mapper.map(max_span, &mut self.trackers, &locks)
    }

    /// Write word `offset` of the open frame.
    pub fn write(&mut self, offset: usize, word: Word) {
        match self.mapper.translate(offset) {
            Some(addr) => self.storage.write(addr, word),
            None => {
                self.stray_writes += 1;
                tracing::warn!(offset, "write outside the open frame ignored");
            }
        }
    }

    /// Publish the open frame; it becomes visible to the presenter.
    pub fn close_frame(&mut self, span: usize) -> Option<Placement> {
        self.mapper.close(span, &mut self.trackers)
    }

    /// One presenter round.
    pub fn present(&mut self, ready: bool) -> Option<StreamWord> {
        self.presenter.step(
            &mut self.trackers,
            &self.storage,
            self.mapper.active_tile(),
            ready,
        )
    }

    pub fn reset(&mut self) {
        self.mapper.reset(&mut self.trackers);
        self.presenter.reset();
        self.storage.clear();
    }

    pub fn tile_size(&self) -> usize {
        self.tile_size
    }

    pub fn trackers(&self) -> &[TileTracker] {
        &self.trackers
    }

    pub fn mapper(&self) -> &Mapper {
        &self.mapper
    }

    pub fn presenter(&self) -> &Presenter {
        &self.presenter
    }

    pub fn has_open_frame(&self) -> bool {
        self.mapper.open_frame().is_some()
    }

    /// Nothing written is still waiting to be presented.
    pub fn is_drained(&self) -> bool {
        !self.has_open_frame()
            && !self.presenter.is_presenting()
            && self.trackers.iter().all(|t| t.unread() == 0)
    }

    pub fn stray_writes(&self) -> u64 {
        self.stray_writes
    }
}
