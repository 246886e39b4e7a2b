//! Feeds recorded lane streams through a [`Scheduler`].

use std::collections::VecDeque;

use pktsched_record::{StreamWord, Word};

use crate::error::{Result, SchedulerError};
use crate::scheduler::Scheduler;

/// Rounds allowed per ingress word before [`Driver::run`] gives up.
const ROUNDS_PER_WORD: u64 = 64;
const MIN_ROUND_LIMIT: u64 = 10_000;

/// Egress readiness that never stalls.
pub fn always_ready(_round: u64) -> bool {
    true
}

/// Replays per-lane word sequences, one word per lane per round, and
/// collects egress. `ready` decides egress readiness per round.
pub struct Driver<F> {
    scheduler: Scheduler,
    inputs: Vec<VecDeque<Word>>,
    ready: F,
    egress: Vec<StreamWord>,
    max_rounds: u64,
    ingress: Vec<Option<Word>>,
}

impl<F: FnMut(u64) -> bool> Driver<F> {
    pub fn new(scheduler: Scheduler, inputs: Vec<Vec<Word>>, ready: F) -> Result<Self> {
        if inputs.len() != scheduler.lanes() {
            return Err(SchedulerError::LaneCount {
                expected: scheduler.lanes(),
                got: inputs.len(),
            });
        }
        let total: u64 = inputs.iter().map(|i| i.len() as u64).sum();
        let lanes = inputs.len();
        Ok(Self {
            scheduler,
            inputs: inputs.into_iter().map(VecDeque::from).collect(),
            ready,
            egress: Vec::new(),
            max_rounds: (total * ROUNDS_PER_WORD).max(MIN_ROUND_LIMIT),
            ingress: vec![None; lanes],
        })
    }

    pub fn with_max_rounds(mut self, max_rounds: u64) -> Self {
        self.max_rounds = max_rounds;
        self
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn egress(&self) -> &[StreamWord] {
        &self.egress
    }

    pub fn into_parts(self) -> (Scheduler, Vec<StreamWord>) {
        (self.scheduler, self.egress)
    }

    /// All ingress has been offered.
    pub fn inputs_exhausted(&self) -> bool {
        self.inputs.iter().all(VecDeque::is_empty)
    }

    pub fn is_finished(&self) -> bool {
        self.inputs_exhausted() && self.scheduler.is_quiescent()
    }

    /// Run one round.
    pub fn step(&mut self) -> Result<Option<StreamWord>> {
        for (slot, input) in self.ingress.iter_mut().zip(&mut self.inputs) {
            *slot = input.pop_front();
        }
        if self.inputs_exhausted() {
            self.scheduler.set_draining(true);
        }
        let ready = (self.ready)(self.scheduler.round());
        let word = self.scheduler.step(&self.ingress, ready)?;
        if let Some(word) = word {
            self.egress.push(word);
        }
        Ok(word)
    }

    /// Run until everything offered has either come out or been dropped.
    pub fn run(&mut self) -> Result<&[StreamWord]> {
        self.run_while(|| true)?;
        Ok(&self.egress)
    }

    /// Like [`Driver::run`], but stops early once `keep_going` says so.
    /// Returns true if the pipeline settled.
    pub fn run_while(&mut self, mut keep_going: impl FnMut() -> bool) -> Result<bool> {
        let start = self.scheduler.round();
        while !self.is_finished() {
            if !keep_going() {
                tracing::debug!(round = self.scheduler.round(), "driver stopped early");
                return Ok(false);
            }
            if self.scheduler.round() - start >= self.max_rounds {
                return Err(SchedulerError::RoundLimit(self.max_rounds));
            }
            self.step()?;
        }
        Ok(true)
    }
}
