//! Per-tile frame bookkeeping.

use serde::Serialize;

/// Where a frame sits inside its tile. `span` is zero until the trailer is
/// written.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FrameEntry {
    pub start: usize,
    pub span: usize,
}

/// The tile's last frame continues at the start of `trail_tile`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Spill {
    pub trail_tile: usize,
    /// Words of the frame stored in the trail tile.
    pub remainder: usize,
}

/// Append-only frame queue for one tile.
///
/// Frames are opened (header space reserved) and closed (trailer written)
/// in order, so a frame is complete iff its index is below the trailer
/// count. The whole queue is flushed when the writer claims the tile again.
#[derive(Debug, Clone)]
pub struct TileTracker {
    entries: Vec<FrameEntry>,
    capacity: usize,
    read_idx: usize,
    headers_written: usize,
    trailers_written: usize,
    spill: Option<Spill>,
    epoch: Option<u64>,
    fill: usize,
}

impl TileTracker {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
            capacity,
            read_idx: 0,
            headers_written: 0,
            trailers_written: 0,
            spill: None,
            epoch: None,
            fill: 0,
        }
    }

    pub fn is_full(&self) -> bool {
        self.entries.len() >= self.capacity
    }

    /// Reserve an entry for a frame starting at `start`.
    pub fn open(&mut self, start: usize) {
        self.entries.push(FrameEntry { start, span: 0 });
        self.headers_written += 1;
    }

    /// Mark the oldest open frame complete.
    pub fn close(&mut self, span: usize, tile_size: usize) {
        if let Some(entry) = self.entries.get_mut(self.trailers_written) {
            entry.span = span;
            self.fill = self.fill.max((entry.start + span).min(tile_size));
            self.trailers_written += 1;
        }
    }

    pub fn set_spill(&mut self, spill: Spill) {
        self.spill = Some(spill);
    }

    pub fn spill(&self) -> Option<Spill> {
        self.spill
    }

    /// Spill register for entry `idx`, if that entry is the spilled one.
    pub fn spill_of(&self, idx: usize) -> Option<Spill> {
        self.spill.filter(|_| idx + 1 == self.entries.len())
    }

    /// True while the spilled frame has not been fully read.
    pub fn has_unread_spill(&self) -> bool {
        self.spill.is_some() && self.read_idx < self.entries.len()
    }

    pub(crate) fn extend_fill(&mut self, words: usize) {
        self.fill = self.fill.max(words);
    }

    /// Next complete, unread frame.
    pub fn next_complete(&self) -> Option<FrameEntry> {
        (self.read_idx < self.trailers_written).then(|| self.entries[self.read_idx])
    }

    pub fn read_idx(&self) -> usize {
        self.read_idx
    }

    pub fn advance(&mut self) {
        self.read_idx += 1;
    }

    /// Every opened frame has been read.
    pub fn exhausted(&self) -> bool {
        self.read_idx >= self.entries.len()
    }

    /// Drop everything and start over under a new epoch. Returns the number
    /// of complete frames that were never read.
    pub fn flush(&mut self, epoch: u64) -> usize {
        let unread = self.unread();
        self.entries.clear();
        self.read_idx = 0;
        self.headers_written = 0;
        self.trailers_written = 0;
        self.spill = None;
        self.epoch = Some(epoch);
        self.fill = 0;
        unread
    }

    /// Forget the spilled frame because its trail tile was reclaimed.
    /// Returns true if an unread complete frame was lost.
    pub fn drop_spilled(&mut self) -> bool {
        if self.spill.take().is_none() || self.read_idx >= self.entries.len() {
            return false;
        }
        let complete = self.entries.len() <= self.trailers_written;
        self.entries.pop();
        self.headers_written -= 1;
        if complete {
            self.trailers_written -= 1;
        }
        complete
    }

    pub fn epoch(&self) -> Option<u64> {
        self.epoch
    }

    pub fn fill(&self) -> usize {
        self.fill
    }

    pub fn headers_written(&self) -> usize {
        self.headers_written
    }

    pub fn trailers_written(&self) -> usize {
        self.trailers_written
    }

    pub fn unread(&self) -> usize {
        self.trailers_written.saturating_sub(self.read_idx)
    }

    pub fn reset(&mut self) {
        self.flush(0);
        self.epoch = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_visible_only_after_close() {
        let mut t = TileTracker::new(4);
        t.open(0);
        assert_eq!(t.next_complete(), None);
        t.close(12, 64);
        assert_eq!(t.next_complete(), Some(FrameEntry { start: 0, span: 12 }));
        assert_eq!(t.fill(), 12);
        t.advance();
        assert!(t.exhausted());
    }

    #[test]
    fn flush_reports_unread_frames() {
        let mut t = TileTracker::new(4);
        for start in [0, 10, 20] {
            t.open(start);
            t.close(10, 64);
        }
        t.open(30);
        t.advance();
        assert_eq!(t.flush(7), 2);
        assert_eq!(t.epoch(), Some(7));
        assert!(t.exhausted());
        assert_eq!(t.headers_written(), 0);
    }

    #[test]
    fn spill_belongs_to_last_entry() {
        let mut t = TileTracker::new(4);
        t.open(0);
        t.close(40, 64);
        t.open(40);
        t.set_spill(Spill { trail_tile: 1, remainder: 0 });
        assert_eq!(t.spill_of(0), None);
        assert!(t.spill_of(1).is_some());
        assert!(t.has_unread_spill());
    }

    #[test]
    fn dropping_spilled_frame() {
        let mut t = TileTracker::new(4);
        t.open(50);
        t.set_spill(Spill { trail_tile: 2, remainder: 0 });
        t.close(30, 64);
        assert!(t.drop_spilled());
        assert_eq!(t.next_complete(), None);
        assert!(t.exhausted());
    }

    #[test]
    fn full_at_capacity() {
        let mut t = TileTracker::new(2);
        t.open(0);
        t.open(5);
        assert!(t.is_full());
    }
}
