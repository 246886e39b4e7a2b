//! Per-lane staging: Descriptor Queue, Payload Queue and Handle Queue.

use pktsched_record::Word;
use pktsched_ring::{CreditCounter, RingQueue, RingRam, WordMemory};

use crate::config::SchedulerConfig;
use crate::descriptor::{Descriptor, Handle};
use crate::error::Result;

/// Queues between one lane's parser, the allocator and the lane's mover.
///
/// The parser holds both credit counters and spends from them; the allocator
/// returns descriptor credit and the mover returns payload credit. Neither
/// side sees the other's changes until [`LaneStaging::commit`] at the end of
/// the round. The handle queue carries no credit; the allocator checks for
/// room before it fetches.
#[derive(Debug, Clone)]
pub struct LaneStaging {
    pub(crate) descriptors: RingQueue<Descriptor>,
    pub(crate) descriptor_credit: CreditCounter,
    pub(crate) payload: RingRam<Word>,
    pub(crate) payload_credit: CreditCounter,
    pub(crate) handles: RingQueue<Handle>,
}

impl LaneStaging {
    pub fn new(config: &SchedulerConfig) -> Result<Self> {
        Ok(Self {
            descriptors: RingQueue::new(config.descriptor_queue_depth)?,
            descriptor_credit: CreditCounter::new(config.descriptor_queue_depth),
            payload: RingRam::new(config.payload_queue_depth)?,
            payload_credit: CreditCounter::new(config.payload_queue_depth),
            handles: RingQueue::new(config.handle_queue_depth)?,
        })
    }

    /// Apply this round's credit deltas.
    pub fn commit(&mut self) {
        self.descriptor_credit.commit();
        self.payload_credit.commit();
    }

    /// Empty every queue and restore full credit.
    pub fn reset(&mut self) {
        self.descriptors.clear();
        self.descriptor_credit.reset();
        self.payload_credit.reset();
        self.handles.clear();
    }

    pub fn head(&self) -> Option<Descriptor> {
        self.descriptors.peek()
    }

    /// Pop the head descriptor and hand its credit back to the parser.
    pub(crate) fn pop_descriptor(&mut self) -> Option<Descriptor> {
        let desc = self.descriptors.pop()?;
        self.descriptor_credit.give_back(1);
        Some(desc)
    }

    pub(crate) fn read_payload(&self, addr: usize) -> Word {
        self.payload.read(addr)
    }

    pub fn descriptor_credit(&self) -> &CreditCounter {
        &self.descriptor_credit
    }

    pub fn payload_credit(&self) -> &CreditCounter {
        &self.payload_credit
    }

    pub fn descriptors_queued(&self) -> usize {
        self.descriptors.len()
    }

    pub fn handles_queued(&self) -> usize {
        self.handles.len()
    }

    pub fn handle_room(&self) -> bool {
        !self.handles.is_full()
    }

    pub fn payload_depth(&self) -> usize {
        self.payload.depth()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::FrameStartDescriptor;

    #[test]
    fn pop_returns_credit_after_commit() {
        let config = SchedulerConfig {
            descriptor_queue_depth: 2,
            ..SchedulerConfig::default()
        };
        let mut staging = LaneStaging::new(&config).unwrap();
        assert!(staging.descriptor_credit.try_spend(1));
        staging
            .descriptors
            .push(Descriptor::FrameStart(FrameStartDescriptor::default()))
            .unwrap();
        staging.commit();
        assert_eq!(staging.descriptor_credit().available(), 1);

        assert!(staging.pop_descriptor().is_some());
        assert_eq!(staging.descriptor_credit().available(), 1);
        staging.commit();
        assert_eq!(staging.descriptor_credit().available(), 2);
    }

    #[test]
    fn reset_restores_everything() {
        let mut staging = LaneStaging::new(&SchedulerConfig::default()).unwrap();
        assert!(staging.payload_credit.try_spend(100));
        staging.handles.push(Handle::skip(0, 4)).unwrap();
        staging.commit();
        staging.reset();
        assert_eq!(staging.payload_credit().available(), 1024);
        assert_eq!(staging.handles_queued(), 0);
    }
}
