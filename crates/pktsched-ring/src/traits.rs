/// A fixed-depth, word-addressed memory with one write port and one read port.
///
/// This is the seam between the scheduler and its storage. Addresses wrap
/// modulo [`depth`](WordMemory::depth): the memory is circular and callers
/// never see an out-of-range address.
///
/// Implementations must honour read-after-write bypass: a read that targets
/// the address written in the same step returns the new value.
pub trait WordMemory<T: Copy> {
    /// Number of addressable slots.
    fn depth(&self) -> usize;

    /// Read the slot at `addr` (wrapped).
    fn read(&self, addr: usize) -> T;

    /// Write `value` to the slot at `addr` (wrapped).
    fn write(&mut self, addr: usize, value: T);

    /// Perform one step of both ports: the optional write lands first, then
    /// the read is served, so a same-address read observes the new value.
    fn step(&mut self, read_addr: usize, write: Option<(usize, T)>) -> T {
        if let Some((addr, value)) = write {
            self.write(addr, value);
        }
        self.read(read_addr)
    }
}
