//! Block mover: copies one lane's payload into shared storage.

use serde::Serialize;

use crate::descriptor::Handle;
use crate::frame_table::FrameTable;
use crate::staging::LaneStaging;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MoverState {
    #[default]
    Idle,
    Prepare,
    Move,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MoverCounters {
    pub words_moved: u64,
    pub blocks_moved: u64,
    pub blocks_skipped: u64,
    pub words_skipped: u64,
}

/// Executes handles from its lane's handle queue, one word per granted
/// round.
#[derive(Debug, Clone, Default)]
pub struct BlockMover {
    lane: usize,
    state: MoverState,
    handle: Handle,
    moved: usize,
    counters: MoverCounters,
}

impl BlockMover {
    pub fn new(lane: usize) -> Self {
        Self {
            lane,
            ..Self::default()
        }
    }

    pub fn state(&self) -> MoverState {
        self.state
    }

    pub fn counters(&self) -> &MoverCounters {
        &self.counters
    }

    /// Wants the write port this round.
    pub fn requesting(&self) -> bool {
        self.state == MoverState::Move
    }

    pub fn is_idle(&self) -> bool {
        self.state == MoverState::Idle
    }

    pub fn reset(&mut self) {
        self.state = MoverState::Idle;
        self.handle = Handle::default();
        self.moved = 0;
    }

    pub fn step(&mut self, granted: bool, staging: &mut LaneStaging, table: &mut FrameTable) {
        match self.state {
            MoverState::Idle => {
                if let Some(handle) = staging.handles.pop() {
                    self.handle = handle;
                    self.moved = 0;
                    self.state = MoverState::Prepare;
                }
            }
            MoverState::Prepare => {
                if self.handle.skip {
                    // Abort: release the payload without touching storage.
                    staging.payload_credit.give_back(self.handle.len);
                    self.counters.blocks_skipped += 1;
                    self.counters.words_skipped += self.handle.len as u64;
                    self.state = MoverState::Idle;
                } else if self.handle.len == 0 {
                    self.state = MoverState::Idle;
                } else {
                    self.state = MoverState::Move;
                }
            }
            MoverState::Move => {
                if !granted {
                    return;
                }
                let word = staging.read_payload(self.handle.src + self.moved);
                table.write(self.handle.dst + self.moved, word);
                self.moved += 1;
                self.counters.words_moved += 1;
                if self.moved == self.handle.len {
                    staging.payload_credit.give_back(self.handle.len);
                    self.counters.blocks_moved += 1;
                    tracing::trace!(lane = self.lane, len = self.handle.len, dst = self.handle.dst, "block moved");
                    self.state = MoverState::Idle;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SchedulerConfig;
    use pktsched_record::Word;
    use pktsched_ring::WordMemory;

    fn setup() -> (LaneStaging, FrameTable) {
        let config = SchedulerConfig {
            storage_words: 64,
            tiles: 2,
            ..SchedulerConfig::default()
        };
        (LaneStaging::new(&config).unwrap(), FrameTable::new(&config).unwrap())
    }

    #[test]
    fn moves_block_and_returns_credit_on_last_word() {
        let (mut staging, mut table) = setup();
        for (i, v) in [7u32, 8, 9].iter().enumerate() {
            staging.payload.write(i, Word::data(*v));
        }
        assert!(staging.payload_credit.try_spend(3));
        staging.commit();
        table.map_frame(12).unwrap();
        staging
            .handles
            .push(Handle { src: 0, dst: 6, len: 3, skip: false })
            .unwrap();

        let mut mover = BlockMover::new(0);
        mover.step(false, &mut staging, &mut table);
        assert_eq!(mover.state(), MoverState::Prepare);
        mover.step(false, &mut staging, &mut table);
        assert!(mover.requesting());

        mover.step(true, &mut staging, &mut table);
        mover.step(false, &mut staging, &mut table);
        mover.step(true, &mut staging, &mut table);
        assert_eq!(staging.payload_credit.pending_delta(), 0);
        mover.step(true, &mut staging, &mut table);
        assert!(mover.is_idle());
        assert_eq!(staging.payload_credit.pending_delta(), 3);
        assert_eq!(mover.counters().words_moved, 3);

        table.close_frame(9);
        let out: Vec<u32> = (0..30)
            .filter_map(|_| table.present(true))
            .map(|w| w.word.data)
            .collect();
        assert_eq!(&out[6..9], &[7, 8, 9]);
    }

    #[test]
    fn skip_handle_returns_credit_without_moving() {
        let (mut staging, mut table) = setup();
        staging.handles.push(Handle::skip(0, 5)).unwrap();
        let mut mover = BlockMover::new(1);
        mover.step(false, &mut staging, &mut table);
        mover.step(false, &mut staging, &mut table);
        assert!(mover.is_idle());
        assert_eq!(staging.payload_credit.pending_delta(), 5);
        assert_eq!(mover.counters().blocks_skipped, 1);
        assert_eq!(table.stray_writes(), 0);
    }
}
