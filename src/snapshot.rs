//! Read-only views of allocator state.

use alloc::vec::Vec;
use core::fmt;

use crate::order::size_of_order;

/// An allocated block, as recorded in a [`Snapshot`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AllocatedBlock {
    /// The start address of the block.
    pub address: usize,
    /// The order of the block.
    pub order: usize,
}

impl AllocatedBlock {
    /// Returns the size of the block in bytes.
    #[inline]
    pub fn size(&self) -> usize {
        size_of_order(self.order)
    }
}

/// A copy of a [`BuddyAllocator`]'s bookkeeping at one point in time.
///
/// Snapshots are detached from the allocator; later operations don't affect
/// them. Two snapshots compare equal exactly when the allocator would behave
/// identically from both states.
///
/// The `Display` implementation renders a human-readable report.
///
/// [`BuddyAllocator`]: crate::BuddyAllocator
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Snapshot {
    /// The size of the managed address space.
    pub total_size: usize,
    /// The order of a block spanning the whole address space.
    pub max_order: usize,
    /// Allocated blocks, sorted by address.
    pub allocations: Vec<AllocatedBlock>,
    /// Free block addresses, indexed by order.
    ///
    /// Within each order, blocks are listed in the order they will be handed
    /// out.
    pub free_lists: Vec<Vec<usize>>,
}

impl Snapshot {
    /// Returns the free blocks of `order`, or an empty slice if `order` is out
    /// of range.
    pub fn free_list(&self, order: usize) -> &[usize] {
        self.free_lists.get(order).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Returns the total size of all allocated blocks.
    pub fn used_bytes(&self) -> usize {
        self.allocations.iter().map(AllocatedBlock::size).sum()
    }

    /// Returns the total size of all free blocks.
    pub fn free_bytes(&self) -> usize {
        self.free_lists
            .iter()
            .enumerate()
            .map(|(order, list)| list.len() * size_of_order(order))
            .sum()
    }

    /// Returns `true` if nothing is allocated and the whole address space is a
    /// single free block.
    pub fn is_pristine(&self) -> bool {
        self.allocations.is_empty()
            && self.free_lists.iter().enumerate().all(|(order, list)| {
                if order == self.max_order {
                    list.len() == 1 && list[0] == 0
                } else {
                    list.is_empty()
                }
            })
    }
}

impl fmt::Display for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Allocations ===")?;
        if self.allocations.is_empty() {
            writeln!(f, " (none)")?;
        }
        for block in &self.allocations {
            writeln!(f, " Addr {}, Size {}", block.address, block.size())?;
        }

        writeln!(f, "\n=== Free Lists ===")?;
        for (order, list) in self.free_lists.iter().enumerate() {
            writeln!(
                f,
                " Order {} (Size {}): {:?}",
                order,
                size_of_order(order),
                list
            )?;
        }

        Ok(())
    }
}
