use crate::error::{Result, RingError};
use crate::ram::RingRam;
use crate::traits::WordMemory;

/// Bounded FIFO laid over a [`RingRam`].
///
/// Single producer, single consumer. The queue itself never blocks: a push
/// onto a full queue returns [`RingError::Full`], and flow control is the
/// caller's business (credits upstream, or a fullness check).
#[derive(Debug, Clone)]
pub struct RingQueue<T> {
    ram: RingRam<T>,
    head: usize,
    len: usize,
}

impl<T: Copy + Default> RingQueue<T> {
    /// Create an empty queue holding at most `depth` items.
    pub fn new(depth: usize) -> Result<Self> {
        Ok(Self {
            ram: RingRam::new(depth)?,
            head: 0,
            len: 0,
        })
    }

    /// Append an item at the tail.
    pub fn push(&mut self, item: T) -> Result<()> {
        if self.is_full() {
            return Err(RingError::Full(self.capacity()));
        }
        let tail = self.head + self.len;
        self.ram.write(tail, item);
        self.len += 1;
        Ok(())
    }

    /// Look at the head item without removing it.
    pub fn peek(&self) -> Option<T> {
        if self.len == 0 {
            return None;
        }
        Some(self.ram.read(self.head))
    }

    /// Remove and return the head item.
    pub fn pop(&mut self) -> Option<T> {
        let item = self.peek()?;
        self.head = (self.head + 1) % self.capacity();
        self.len -= 1;
        Some(item)
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_full(&self) -> bool {
        self.len == self.capacity()
    }

    pub fn capacity(&self) -> usize {
        self.ram.depth()
    }

    /// Drop every queued item.
    pub fn clear(&mut self) {
        self.head = 0;
        self.len = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fifo_order_across_wraparound() {
        let mut q = RingQueue::<u16>::new(3).unwrap();
        q.push(1).unwrap();
        q.push(2).unwrap();
        assert_eq!(q.pop(), Some(1));
        q.push(3).unwrap();
        q.push(4).unwrap();
        assert!(q.is_full());
        assert_eq!(q.pop(), Some(2));
        assert_eq!(q.pop(), Some(3));
        assert_eq!(q.pop(), Some(4));
        assert_eq!(q.pop(), None);
    }

    #[test]
    fn push_on_full_queue_fails() {
        let mut q = RingQueue::<u8>::new(1).unwrap();
        q.push(9).unwrap();
        assert_eq!(q.push(10), Err(RingError::Full(1)));
        assert_eq!(q.peek(), Some(9));
    }

    #[test]
    fn clear_empties_queue() {
        let mut q = RingQueue::<u8>::new(2).unwrap();
        q.push(1).unwrap();
        q.clear();
        assert!(q.is_empty());
        assert_eq!(q.len(), 0);
    }
}
