/// Producer-held credit counter.
///
/// The producer spends credit when it commits an item to a queue; the
/// consumer hands credit back as a count when it retires items. Both sides
/// accumulate into one signed delta during a round and [`commit`] applies it
/// once, so a spend and a return in the same round never double count.
///
/// Credit returned during a round only becomes spendable after the commit.
///
/// [`commit`]: CreditCounter::commit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreditCounter {
    max: usize,
    available: usize,
    spent: usize,
    returned: usize,
}

impl CreditCounter {
    /// Create a counter holding its full `max` credit.
    pub fn new(max: usize) -> Self {
        Self {
            max,
            available: max,
            spent: 0,
            returned: 0,
        }
    }

    /// Credit the producer may still spend this round.
    pub fn spendable(&self) -> usize {
        self.available - self.spent
    }

    /// Credit held at the start of the round.
    pub fn available(&self) -> usize {
        self.available
    }

    /// Maximum credit (the queue depth).
    pub fn max(&self) -> usize {
        self.max
    }

    /// Items currently outstanding with the consumer.
    pub fn outstanding(&self) -> usize {
        self.max - self.available
    }

    /// Spend `n` credits if that many are spendable. Returns whether it did.
    pub fn try_spend(&mut self, n: usize) -> bool {
        if self.spendable() < n {
            return false;
        }
        self.spent += n;
        true
    }

    /// Hand `n` credits back. Takes effect at the next [`commit`](Self::commit).
    pub fn give_back(&mut self, n: usize) {
        self.returned += n;
    }

    /// Signed change that the next commit will apply.
    pub fn pending_delta(&self) -> isize {
        self.returned as isize - self.spent as isize
    }

    /// Apply this round's delta.
    pub fn commit(&mut self) {
        let next = self.available - self.spent + self.returned;
        if next > self.max {
            tracing::warn!(
                max = self.max,
                next,
                "credit return exceeds depth, clamping"
            );
        }
        self.available = next.min(self.max);
        self.spent = 0;
        self.returned = 0;
    }

    /// Drain back to full credit, discarding any pending delta.
    pub fn reset(&mut self) {
        self.available = self.max;
        self.spent = 0;
        self.returned = 0;
    }
}
