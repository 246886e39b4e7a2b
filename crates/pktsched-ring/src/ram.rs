use crate::error::{Result, RingError};
use crate::traits::WordMemory;

/// Heap-backed circular memory.
///
/// Allocated once at construction; nothing grows afterwards.
#[derive(Debug, Clone)]
pub struct RingRam<T> {
    slots: Box<[T]>,
}

impl<T: Copy + Default> RingRam<T> {
    /// Create a memory of `depth` slots, every slot holding `T::default()`.
    pub fn new(depth: usize) -> Result<Self> {
        if depth == 0 {
            return Err(RingError::ZeroDepth);
        }
        Ok(Self {
            slots: vec![T::default(); depth].into_boxed_slice(),
        })
    }

    /// Restore every slot to `T::default()`.
    pub fn clear(&mut self) {
        self.slots.fill(T::default());
    }

    #[inline]
    fn wrap(&self, addr: usize) -> usize {
        addr % self.slots.len()
    }
}

impl<T: Copy + Default> WordMemory<T> for RingRam<T> {
    fn depth(&self) -> usize {
        self.slots.len()
    }

    fn read(&self, addr: usize) -> T {
        self.slots[self.wrap(addr)]
    }

    fn write(&mut self, addr: usize, value: T) {
        let idx = self.wrap(addr);
        self.slots[idx] = value;
    }
}
