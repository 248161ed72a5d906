//! A binary-buddy allocator.
//!
//! The allocator manages the address range `[0, total_size)` as a set of
//! blocks whose sizes are powers of two. A request for `n` bytes is served by a
//! block of the smallest order `k` with `2^k >= n`. If no block of that order
//! is free, the smallest larger free block is split in half repeatedly, and the
//! upper halves are returned to the free lists. When a block is freed it is
//! merged with its buddy for as long as the buddy is also free.
//!
//! ## Characteristics
//!
//! #### Time complexity
//!
//! With `n` free blocks per order and `K` orders:
//!
//! | Operation                | Best-case   | Worst-case     |
//! |--------------------------|-------------|----------------|
//! | Allocate                 | O(log n)    | O(K log n)     |
//! | Deallocate               | O(log n)    | O(K log n)     |
//!
//! #### Fragmentation
//!
//! Because requests are rounded up to the next power of two, internal
//! fragmentation is at most half of each block. Freed blocks are always merged
//! with free buddies, so external fragmentation only persists while
//! neighbouring blocks remain allocated.
//!
//! #### Tie-breaking
//!
//! Among free blocks of the chosen order, the one that became free earliest is
//! handed out first. Allocation is not lowest-address-first.

use alloc::vec::Vec;
use core::cell::RefCell;

#[cfg(feature = "std")]
use std::sync::{Mutex, MutexGuard, PoisonError, RwLock, RwLockWriteGuard};

#[cfg(feature = "log")]
use log::{debug, trace, warn};

use crate::{
    alloc_table::AllocationTable,
    free_list::FreeListTable,
    order::{self, buddy_of, size_of_order},
    snapshot::{AllocatedBlock, Snapshot},
    AllocError, AllocInitError,
};

/// Declares locking wrappers around a [`BuddyAllocator`].
///
/// Each wrapper holds its lock for the full duration of an operation, so a
/// split or merge in progress is never observed by another caller.
macro_rules! declare_wrappers {
    ($($(#[$attr:meta])* $wrapper:ident uses $typename:ident via $method:path)*) => {
        $(
            #[doc = concat!("A `BuddyAllocator` wrapped by a `", stringify!($typename), "`.")]
            ///
            /// Operations take `&self`.
            $(#[$attr])*
            #[derive(Debug)]
            pub struct $wrapper {
                inner: $typename<BuddyAllocator>,
            }

            $(#[$attr])*
            impl $wrapper {
                /// Constructs a new wrapped allocator managing `total_size` bytes.
                ///
                /// # Errors
                ///
                /// Returns [`AllocInitError::InvalidConfig`] unless `total_size` is a
                /// nonzero power of two.
                pub fn new(total_size: usize) -> Result<$wrapper, AllocInitError> {
                    BuddyAllocator::new(total_size).map(<$wrapper>::from)
                }

                /// Returns a reference to the lock around the allocator.
                pub fn inner(&self) -> &$typename<BuddyAllocator> {
                    &self.inner
                }

                /// Allocates a block of at least `size` bytes.
                ///
                /// See [`BuddyAllocator::allocate`].
                pub fn allocate(&self, size: usize) -> Result<usize, AllocError> {
                    $method(&self.inner).allocate(size)
                }

                /// Frees the block starting at `addr`.
                ///
                /// See [`BuddyAllocator::free`].
                pub fn free(&self, addr: usize) -> Result<(), AllocError> {
                    $method(&self.inner).free(addr)
                }

                /// Returns a copy of the allocator's current state.
                pub fn snapshot(&self) -> Snapshot {
                    $method(&self.inner).snapshot()
                }
            }

            $(#[$attr])*
            impl From<BuddyAllocator> for $wrapper {
                fn from(buddy: BuddyAllocator) -> $wrapper {
                    $wrapper {
                        inner: $typename::new(buddy),
                    }
                }
            }
        )*
    };
}

declare_wrappers! {
    RefCellBuddyAllocator uses RefCell via RefCell::borrow_mut
}

#[cfg(feature = "std")]
declare_wrappers! {
    #[cfg_attr(docs_rs, doc(cfg(feature = "std")))]
    MutexBuddyAllocator uses Mutex via lock_mutex

    #[cfg_attr(docs_rs, doc(cfg(feature = "std")))]
    RwLockBuddyAllocator uses RwLock via write_rwlock
}

// Failed operations never leave the allocator half-modified, so a poisoned
// lock still guards a consistent allocator.
#[cfg(feature = "std")]
fn lock_mutex<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(feature = "std")]
fn write_rwlock<T>(rwlock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    rwlock.write().unwrap_or_else(PoisonError::into_inner)
}

/// A binary-buddy allocator.
///
/// For a discussion of buddy allocation, see the [module-level
/// documentation].
///
/// [module-level documentation]: crate::buddy
#[derive(Clone, Debug)]
pub struct BuddyAllocator {
    total_size: usize,
    max_order: usize,
    free_lists: FreeListTable,
    allocations: AllocationTable,
}

impl BuddyAllocator {
    /// Constructs a new `BuddyAllocator` managing the addresses
    /// `0..total_size`.
    ///
    /// Initially the whole range is a single free block.
    ///
    /// # Errors
    ///
    /// Returns [`AllocInitError::InvalidConfig`] unless `total_size` is a
    /// nonzero power of two.
    pub fn new(total_size: usize) -> Result<BuddyAllocator, AllocInitError> {
        let max_order = order::max_order_for(total_size)?;

        let mut free_lists = FreeListTable::new(max_order);
        free_lists.put(max_order, 0);

        debug!(
            "buddy: managing {:#x} bytes, orders 0..={}",
            total_size, max_order
        );

        Ok(BuddyAllocator {
            total_size,
            max_order,
            free_lists,
            allocations: AllocationTable::new(),
        })
    }

    /// Returns the size of the managed address space.
    #[inline]
    pub fn total_size(&self) -> usize {
        self.total_size
    }

    /// Returns the order of a block spanning the whole address space.
    #[inline]
    pub fn max_order(&self) -> usize {
        self.max_order
    }

    /// Returns the total size of all allocated blocks.
    ///
    /// This counts whole blocks, so it may exceed the sum of the requested
    /// sizes.
    #[inline]
    pub fn used_bytes(&self) -> usize {
        self.allocations.allocated_bytes()
    }

    /// Returns the total size of all free blocks.
    #[inline]
    pub fn free_bytes(&self) -> usize {
        self.total_size - self.used_bytes()
    }

    /// Returns the number of outstanding allocations.
    #[inline]
    pub fn num_allocations(&self) -> usize {
        self.allocations.len()
    }

    /// Returns `true` if `addr` is the start of an allocated block.
    #[inline]
    pub fn is_allocated(&self, addr: usize) -> bool {
        self.allocations.contains(addr)
    }

    /// Returns the order of the allocated block starting at `addr`, if any.
    #[inline]
    pub fn block_order(&self, addr: usize) -> Option<usize> {
        self.allocations.get(addr)
    }

    /// Returns the order of the largest free block, or `None` if nothing is
    /// free.
    pub fn largest_free_order(&self) -> Option<usize> {
        (0..=self.max_order)
            .rev()
            .find(|&order| !self.free_lists.is_empty(order))
    }

    /// Allocates a block of at least `size` bytes and returns its address.
    ///
    /// The block's order is the smallest `k` with `2^k >= size`, and its
    /// address is a multiple of `2^k`.
    ///
    /// # Errors
    ///
    /// - [`AllocError::InvalidSize`] if `size` is zero.
    /// - [`AllocError::OutOfMemory`] if no free block is large enough,
    ///   including when `size` exceeds [`total_size`](Self::total_size).
    ///
    /// The allocator is unchanged when an error is returned.
    pub fn allocate(&mut self, size: usize) -> Result<usize, AllocError> {
        let target_order = order::order_for_size(size)?;

        // Find the smallest order at or above the target with a free block.
        let init_order = match (target_order..=self.max_order)
            .find(|&order| !self.free_lists.is_empty(order))
        {
            Some(o) => o,
            None => {
                warn!(
                    "buddy: cannot allocate {:#x} bytes (order {}): out of memory",
                    size, target_order
                );
                return Err(AllocError::OutOfMemory);
            }
        };

        let block = self
            .free_lists
            .take_any(init_order)
            .ok_or(AllocError::OutOfMemory)?;

        // Split the block repeatedly to obtain a suitably sized block. The
        // address of the front half does not change.
        for order in (target_order..init_order).rev() {
            let back_half = block + size_of_order(order);
            trace!(
                "buddy: split {:#x} (order {}), freeing {:#x}",
                block,
                order + 1,
                back_half
            );
            self.free_lists.put(order, back_half);
        }

        debug_assert!(order::is_aligned(block, target_order));
        self.allocations.insert(block, target_order);

        debug!(
            "buddy: allocated {:#x} bytes at {:#x} (order {})",
            size, block, target_order
        );

        Ok(block)
    }

    /// Frees the block starting at `addr`.
    ///
    /// The block is merged with its buddy for as long as the buddy is free.
    ///
    /// # Errors
    ///
    /// Returns [`AllocError::InvalidAddress`] if `addr` is not the start of an
    /// allocated block. This includes freeing the same block twice. The
    /// allocator is unchanged when an error is returned.
    pub fn free(&mut self, addr: usize) -> Result<(), AllocError> {
        let mut order = match self.allocations.take(addr) {
            Some(o) => o,
            None => {
                warn!("buddy: free of unallocated address {:#x}", addr);
                return Err(AllocError::InvalidAddress);
            }
        };

        let mut block = addr;

        // The whole address space has no buddy.
        while order < self.max_order {
            let buddy = buddy_of(block, order);
            if !self.free_lists.contains(order, buddy) {
                break;
            }

            self.free_lists.remove(order, buddy);

            trace!(
                "buddy: merge {:#x} with {:#x} (order {})",
                block,
                buddy,
                order
            );

            block = block.min(buddy);
            order += 1;
        }

        self.free_lists.put(order, block);

        debug!("buddy: freed {:#x}, now free at order {}", addr, order);

        Ok(())
    }

    /// Returns a copy of the allocator's current state.
    pub fn snapshot(&self) -> Snapshot {
        let allocations = self
            .allocations
            .iter()
            .map(|(address, order)| AllocatedBlock { address, order })
            .collect();

        let free_lists = (0..=self.max_order)
            .map(|order| {
                let mut list = Vec::with_capacity(self.free_lists.len(order));
                list.extend(self.free_lists.iter(order));
                list
            })
            .collect();

        Snapshot {
            total_size: self.total_size,
            max_order: self.max_order,
            allocations,
            free_lists,
        }
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use std::vec;

    use super::*;

    #[test]
    fn rejects_bad_sizes() {
        assert_eq!(
            BuddyAllocator::new(0).unwrap_err(),
            AllocInitError::InvalidConfig
        );
        assert_eq!(
            BuddyAllocator::new(96).unwrap_err(),
            AllocInitError::InvalidConfig
        );
        assert!(BuddyAllocator::new(1).is_ok());
    }

    #[test]
    fn initial_state() {
        let buddy = BuddyAllocator::new(64).unwrap();
        assert_eq!(buddy.total_size(), 64);
        assert_eq!(buddy.max_order(), 6);
        assert_eq!(buddy.used_bytes(), 0);
        assert_eq!(buddy.free_bytes(), 64);
        assert_eq!(buddy.largest_free_order(), Some(6));
        assert!(buddy.snapshot().is_pristine());
    }

    #[test]
    fn single_byte_space() {
        let mut buddy = BuddyAllocator::new(1).unwrap();
        assert_eq!(buddy.allocate(1), Ok(0));
        assert_eq!(buddy.allocate(1), Err(AllocError::OutOfMemory));
        assert_eq!(buddy.free(0), Ok(()));
        assert!(buddy.snapshot().is_pristine());
    }

    #[test]
    fn split_pushes_upper_halves() {
        let mut buddy = BuddyAllocator::new(64).unwrap();
        assert_eq!(buddy.allocate(1), Ok(0));

        let snap = buddy.snapshot();
        assert_eq!(
            snap.free_lists,
            vec![vec![1], vec![2], vec![4], vec![8], vec![16], vec![32], vec![]]
        );
        assert_eq!(buddy.block_order(0), Some(0));
        assert_eq!(buddy.largest_free_order(), Some(5));
    }

    #[test]
    fn free_coalesces_recursively() {
        let mut buddy = BuddyAllocator::new(64).unwrap();
        let a = buddy.allocate(1).unwrap();
        let b = buddy.allocate(1).unwrap();
        assert_eq!((a, b), (0, 1));

        buddy.free(a).unwrap();
        // `b` is still allocated, so `a` can't merge.
        assert_eq!(buddy.snapshot().free_list(0), &[0]);

        buddy.free(b).unwrap();
        assert!(buddy.snapshot().is_pristine());
    }

    #[test]
    fn fifo_tie_break() {
        let mut buddy = BuddyAllocator::new(64).unwrap();
        let blocks: Vec<usize> = (0..4).map(|_| buddy.allocate(16).unwrap()).collect();
        assert_eq!(blocks, vec![0, 16, 32, 48]);

        // Free two non-buddies; the first one freed is handed out first.
        buddy.free(48).unwrap();
        buddy.free(0).unwrap();
        assert_eq!(buddy.snapshot().free_list(4), &[48, 0]);
        assert_eq!(buddy.allocate(16), Ok(48));
        assert_eq!(buddy.allocate(16), Ok(0));
    }

    #[test]
    fn interior_address_is_invalid() {
        let mut buddy = BuddyAllocator::new(64).unwrap();
        let a = buddy.allocate(16).unwrap();
        assert_eq!(buddy.free(a + 1), Err(AllocError::InvalidAddress));
        assert_eq!(buddy.free(1000), Err(AllocError::InvalidAddress));
        assert!(buddy.is_allocated(a));
    }

    #[test]
    fn refcell_wrapper() {
        let buddy = RefCellBuddyAllocator::new(64).unwrap();
        let a = buddy.allocate(32).unwrap();
        let b = buddy.allocate(32).unwrap();
        assert_eq!(buddy.allocate(1), Err(AllocError::OutOfMemory));

        buddy.free(a).unwrap();
        buddy.free(b).unwrap();
        assert!(buddy.snapshot().is_pristine());
        assert_eq!(buddy.inner().borrow().num_allocations(), 0);
    }

    #[cfg(feature = "std")]
    #[test]
    fn mutex_wrapper_across_threads() {
        use std::{sync::Arc, thread};

        let buddy = Arc::new(MutexBuddyAllocator::new(1 << 12).unwrap());

        let handles: std::vec::Vec<_> = (0..4)
            .map(|_| {
                let buddy = Arc::clone(&buddy);
                thread::spawn(move || {
                    let addrs: std::vec::Vec<usize> =
                        (0..8).map(|_| buddy.allocate(64).unwrap()).collect();
                    for addr in addrs {
                        buddy.free(addr).unwrap();
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert!(buddy.snapshot().is_pristine());
    }

    #[cfg(feature = "std")]
    #[test]
    fn rwlock_wrapper() {
        let buddy = RwLockBuddyAllocator::new(64).unwrap();
        assert_eq!(buddy.allocate(64), Ok(0));
        assert_eq!(buddy.free(0), Ok(()));
        assert!(buddy.snapshot().is_pristine());
    }
}
