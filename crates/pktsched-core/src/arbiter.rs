//! Shared-storage write port arbitration.

use serde::Serialize;

/// Who owns the write port this round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Grant {
    Allocator,
    Lane(usize),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ArbiterCounters {
    pub allocator_grants: u64,
    pub lane_grants: Vec<u64>,
    /// Allocator grants taken while a lane held the lock.
    pub preemptions: u64,
    /// Locks released because the lane ran out of quantum mid-block.
    pub forced_rotations: u64,
    pub replenishments: u64,
}

/// Deficit round robin with request locking and allocator preemption.
///
/// A granted lane keeps the port while it keeps requesting and has quantum
/// left. Each granted word costs one unit of quantum. Quanta refill on every
/// slot tick, or early when every requesting lane is exhausted.
#[derive(Debug, Clone)]
pub struct WriteArbiter {
    quantum: u32,
    deficit: Vec<u32>,
    priority: usize,
    lock: Option<usize>,
    counters: ArbiterCounters,
}

impl WriteArbiter {
    pub fn new(lanes: usize, quantum: u32) -> Self {
        Self {
            quantum,
            deficit: vec![quantum; lanes],
            priority: 0,
            lock: None,
            counters: ArbiterCounters {
                lane_grants: vec![0; lanes],
                ..ArbiterCounters::default()
            },
        }
    }

    pub fn lock(&self) -> Option<usize> {
        self.lock
    }

    pub fn deficit(&self, lane: usize) -> u32 {
        self.deficit.get(lane).copied().unwrap_or(0)
    }

    pub fn counters(&self) -> &ArbiterCounters {
        &self.counters
    }

    /// Refill every lane's quantum.
    pub fn replenish(&mut self) {
        self.deficit.fill(self.quantum);
        self.counters.replenishments += 1;
    }

    pub fn reset(&mut self) {
        self.deficit.fill(self.quantum);
        self.priority = 0;
        self.lock = None;
    }

    /// Pick this round's write port owner. `lanes[i]` is lane i's request.
    pub fn arbitrate(&mut self, allocator: bool, lanes: &[bool]) -> Option<Grant> {
        if allocator {
            if self.lock.is_some() {
                self.counters.preemptions += 1;
            }
            self.counters.allocator_grants += 1;
            return Some(Grant::Allocator);
        }

        if let Some(lane) = self.lock {
            let requesting = lanes.get(lane).copied().unwrap_or(false);
            if requesting && self.deficit[lane] > 0 {
                return Some(self.charge(lane));
            }
            self.lock = None;
            self.priority = (lane + 1) % self.deficit.len();
            if requesting {
                self.counters.forced_rotations += 1;
                tracing::trace!(lane, "quantum exhausted, rotating");
            }
        }

        if let Some(lane) = self.pick(lanes) {
            self.lock = Some(lane);
            return Some(self.charge(lane));
        }
        if lanes.iter().any(|&r| r) {
            self.replenish();
            let lane = self.pick(lanes)?;
            self.lock = Some(lane);
            return Some(self.charge(lane));
        }
        None
    }

    fn pick(&self, lanes: &[bool]) -> Option<usize> {
        let n = self.deficit.len();
        (0..n)
            .map(|i| (self.priority + i) % n)
            .find(|&l| lanes.get(l).copied().unwrap_or(false) && self.deficit[l] > 0)
    }

    fn charge(&mut self, lane: usize) -> Grant {
        self.deficit[lane] -= 1;
        self.counters.lane_grants[lane] += 1;
        Grant::Lane(lane)
    }
}
