//! Bookkeeping for live allocations.

use alloc::collections::BTreeMap;

use crate::order::size_of_order;

/// Maps the start address of each allocated block to its order.
#[derive(Clone, Debug, Default)]
pub(crate) struct AllocationTable {
    blocks: BTreeMap<usize, usize>,
    allocated_bytes: usize,
}

impl AllocationTable {
    pub fn new() -> AllocationTable {
        AllocationTable::default()
    }

    /// Records an allocated block.
    pub fn insert(&mut self, addr: usize, order: usize) {
        let prev = self.blocks.insert(addr, order);
        debug_assert!(prev.is_none(), "block {addr:#x} allocated twice");

        self.allocated_bytes += size_of_order(order);
    }

    /// Removes the block starting at `addr`, returning its order.
    pub fn take(&mut self, addr: usize) -> Option<usize> {
        let order = self.blocks.remove(&addr)?;
        self.allocated_bytes -= size_of_order(order);
        Some(order)
    }

    #[inline]
    pub fn contains(&self, addr: usize) -> bool {
        self.blocks.contains_key(&addr)
    }

    #[inline]
    pub fn get(&self, addr: usize) -> Option<usize> {
        self.blocks.get(&addr).copied()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// Total size of all allocated blocks.
    #[inline]
    pub fn allocated_bytes(&self) -> usize {
        self.allocated_bytes
    }

    /// Iterates over `(address, order)` pairs in address order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.blocks.iter().map(|(&addr, &order)| (addr, order))
    }
}
