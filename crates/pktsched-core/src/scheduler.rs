//! The whole pipeline, advanced one round at a time.

use pktsched_record::{StreamWord, Word};

use crate::allocator::PageAllocator;
use crate::arbiter::{Grant, WriteArbiter};
use crate::config::SchedulerConfig;
use crate::diagnostics::Diagnostics;
use crate::error::{Result, SchedulerError};
use crate::frame_table::FrameTable;
use crate::mover::BlockMover;
use crate::parser::LaneParser;
use crate::staging::LaneStaging;

/// N-lane aggregation pipeline.
///
/// Every call to [`Scheduler::step`] is one round: the presenter offers a
/// word, the arbiter picks the write port owner, movers and the allocator
/// act on that grant, parsers take the round's ingress words, and finally
/// every credit counter applies its net change. Stages only see each
/// other's effects from the next round on.
#[derive(Debug, Clone)]
pub struct Scheduler {
    config: SchedulerConfig,
    parsers: Vec<LaneParser>,
    staging: Vec<LaneStaging>,
    allocator: PageAllocator,
    movers: Vec<BlockMover>,
    arbiter: WriteArbiter,
    table: FrameTable,
    requests: Vec<bool>,
    round: u64,
    resets: u64,
}

impl Scheduler {
    pub fn new(config: SchedulerConfig) -> Result<Self> {
        config.validate()?;
        let staging = (0..config.lanes)
            .map(|_| LaneStaging::new(&config))
            .collect::<Result<Vec<_>>>()?;
        let scheduler = Self {
            parsers: (0..config.lanes).map(|l| LaneParser::new(l, &config)).collect(),
            staging,
            allocator: PageAllocator::new(&config),
            movers: (0..config.lanes).map(BlockMover::new).collect(),
            arbiter: WriteArbiter::new(config.lanes, config.arbiter_quantum),
            table: FrameTable::new(&config)?,
            requests: vec![false; config.lanes],
            round: 0,
            resets: 0,
            config,
        };
        tracing::debug!(
            lanes = scheduler.config.lanes,
            tiles = scheduler.config.tiles,
            tile_words = scheduler.config.tile_words(),
            "scheduler created"
        );
        Ok(scheduler)
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn lanes(&self) -> usize {
        self.config.lanes
    }

    pub fn round(&self) -> u64 {
        self.round
    }

    pub fn resets(&self) -> u64 {
        self.resets
    }

    /// Run one round. `ingress[i]` is the word lane `i` offers this round;
    /// `egress_ready` says whether the consumer takes a word. The returned
    /// word, if any, has been consumed.
    pub fn step(&mut self, ingress: &[Option<Word>], egress_ready: bool) -> Result<Option<StreamWord>> {
        if ingress.len() != self.config.lanes {
            return Err(SchedulerError::LaneCount {
                expected: self.config.lanes,
                got: ingress.len(),
            });
        }
        self.round += 1;

        let egress = self.table.present(egress_ready);

        let moves_pending = self.moves_pending();
        for (req, mover) in self.requests.iter_mut().zip(&self.movers) {
            *req = mover.requesting();
        }
        let grant = self
            .arbiter
            .arbitrate(self.allocator.write_request(moves_pending), &self.requests);

        for (lane, (mover, staging)) in self.movers.iter_mut().zip(&mut self.staging).enumerate() {
            mover.step(grant == Some(Grant::Lane(lane)), staging, &mut self.table);
        }

        let slot_tick = self
            .allocator
            .step(grant == Some(Grant::Allocator), &mut self.staging, &mut self.table);
        if slot_tick {
            self.arbiter.replenish();
        }

        for ((parser, staging), word) in self.parsers.iter_mut().zip(&mut self.staging).zip(ingress) {
            match word {
                Some(word) => parser.step(*word, staging),
                None => parser.flush_pending(staging),
            }
        }

        for staging in &mut self.staging {
            staging.commit();
        }

        if let Some(word) = &egress {
            tracing::trace!(round = self.round, data = word.word.data, sop = word.sop, eop = word.eop, "egress");
        }
        Ok(egress)
    }

    /// Tell the allocator no more ingress is coming, so lanes that have
    /// gone quiet stop holding up the open frame.
    pub fn set_draining(&mut self, draining: bool) {
        self.allocator.set_draining(draining);
    }

    /// Global reset: every component back to its reset state and every
    /// credit back to its maximum. Counters keep accumulating.
    pub fn reset(&mut self) {
        for parser in &mut self.parsers {
            parser.reset();
        }
        for staging in &mut self.staging {
            staging.reset();
        }
        for mover in &mut self.movers {
            mover.reset();
        }
        self.allocator.reset();
        self.arbiter.reset();
        self.table.reset();
        self.resets += 1;
        tracing::debug!(round = self.round, resets = self.resets, "scheduler reset");
    }

    /// No component can make progress without more ingress or egress.
    pub fn is_quiescent(&self) -> bool {
        !self.moves_pending()
            && !self.parsers.iter().any(LaneParser::has_pending_mask)
            && self.allocator.is_settled(&self.staging)
            && self.table.is_drained()
    }

    pub fn diagnostics(&self) -> Diagnostics {
        Diagnostics::capture(self)
    }

    pub fn parsers(&self) -> &[LaneParser] {
        &self.parsers
    }

    pub fn staging(&self) -> &[LaneStaging] {
        &self.staging
    }

    pub fn movers(&self) -> &[BlockMover] {
        &self.movers
    }

    pub fn allocator(&self) -> &PageAllocator {
        &self.allocator
    }

    pub fn arbiter(&self) -> &WriteArbiter {
        &self.arbiter
    }

    pub fn frame_table(&self) -> &FrameTable {
        &self.table
    }

    fn moves_pending(&self) -> bool {
        self.movers.iter().any(|m| !m.is_idle()) || self.staging.iter().any(|s| s.handles_queued() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pktsched_record::{to_words, Header, Record, Subheader};

    #[test]
    fn wrong_lane_count_is_an_error() {
        let mut sched = Scheduler::new(SchedulerConfig::default()).unwrap();
        let err = sched.step(&[None], true).unwrap_err();
        assert!(matches!(err, SchedulerError::LaneCount { expected: 2, got: 1 }));
    }

    #[test]
    fn invalid_config_rejected() {
        let config = SchedulerConfig {
            lanes: 0,
            ..SchedulerConfig::default()
        };
        assert!(matches!(
            Scheduler::new(config),
            Err(SchedulerError::InvalidConfig(_))
        ));
    }

    #[test]
    fn fresh_scheduler_is_quiescent() {
        let sched = Scheduler::new(SchedulerConfig::default()).unwrap();
        assert!(sched.is_quiescent());
    }

    #[test]
    fn reset_restores_credit_and_counts() {
        let mut sched = Scheduler::new(SchedulerConfig::default()).unwrap();
        let words = to_words(&[
            Record::Header(Header {
                timestamp: 1,
                serial: 0,
                subheader_count: 1,
                hit_count: 2,
            }),
            Record::Subheader(Subheader { slot: 0, hit_count: 2 }),
            Record::Hit(1),
        ]);
        for w in &words {
            sched.step(&[Some(*w), None], true).unwrap();
        }
        assert!(sched.staging()[0].payload_credit().outstanding() > 0);

        sched.reset();
        assert_eq!(sched.resets(), 1);
        assert_eq!(sched.staging()[0].payload_credit().outstanding(), 0);
        assert_eq!(sched.staging()[0].descriptor_credit().outstanding(), 0);
        assert_eq!(sched.parsers()[0].counters().words, 7);
        assert!(sched.is_quiescent());
    }
}
