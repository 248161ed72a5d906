//! Per-order free lists.
//!
//! Each order keeps a doubly linked list of free block addresses. The links are
//! stored out of line, keyed by block address, so any entry can be found and
//! unlinked without walking the list. Blocks are handed out in the order they
//! were freed: pushes go to the tail and pops come from the head.

use alloc::{collections::BTreeMap, vec::Vec};

/// A link in a free list.
///
/// Rather than pointers, store only the addresses of the previous and next
/// blocks.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
struct BlockLink {
    prev: Option<usize>,
    next: Option<usize>,
}

/// A FIFO list of free blocks of a single order.
#[derive(Clone, Debug, Default)]
struct FreeList {
    head: Option<usize>,
    tail: Option<usize>,
    links: BTreeMap<usize, BlockLink>,
}

impl FreeList {
    fn new() -> FreeList {
        FreeList::default()
    }

    #[inline]
    fn len(&self) -> usize {
        self.links.len()
    }

    #[inline]
    fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    #[inline]
    fn contains(&self, block: usize) -> bool {
        self.links.contains_key(&block)
    }

    /// Appends a block to the tail of the list.
    fn push(&mut self, block: usize) {
        debug_assert!(!self.contains(block), "block {block:#x} is already free");

        let old_tail = self.tail;

        if let Some(t) = old_tail {
            // Link `old_tail` forward to the new block.
            if let Some(link) = self.links.get_mut(&t) {
                link.next = Some(block);
            }
        }

        self.links.insert(
            block,
            BlockLink {
                prev: old_tail,
                next: None,
            },
        );

        self.tail = Some(block);
        if self.head.is_none() {
            self.head = Some(block);
        }
    }

    /// Removes the specified block from the list.
    ///
    /// Returns `false` if the block was not in the list.
    fn remove(&mut self, block: usize) -> bool {
        let removed = match self.links.remove(&block) {
            Some(link) => link,
            None => return false,
        };

        match removed.prev {
            // Link `prev` forward to `next`.
            Some(p) => {
                if let Some(link) = self.links.get_mut(&p) {
                    link.next = removed.next;
                }
            }

            // If there's no previous block, then `removed` is the head of the
            // list.
            None => self.head = removed.next,
        }

        match removed.next {
            // Link `next` back to `prev`.
            Some(n) => {
                if let Some(link) = self.links.get_mut(&n) {
                    link.prev = removed.prev;
                }
            }

            None => self.tail = removed.prev,
        }

        true
    }

    /// Removes and returns the block at the head of the list.
    fn pop(&mut self) -> Option<usize> {
        let head = self.head?;
        self.remove(head);
        Some(head)
    }

    fn iter(&self) -> Iter<'_> {
        Iter {
            list: self,
            cursor: self.head,
        }
    }
}

/// Iterates over the blocks of one free list, oldest first.
#[derive(Debug)]
pub(crate) struct Iter<'a> {
    list: &'a FreeList,
    cursor: Option<usize>,
}

impl Iterator for Iter<'_> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        let cur = self.cursor?;
        self.cursor = self.list.links.get(&cur).and_then(|link| link.next);
        Some(cur)
    }
}

/// The free lists of every order from `0` to `max_order`, inclusive.
#[derive(Clone, Debug)]
pub(crate) struct FreeListTable {
    lists: Vec<FreeList>,
}

impl FreeListTable {
    /// Creates a table with `max_order + 1` empty lists.
    pub fn new(max_order: usize) -> FreeListTable {
        let mut lists = Vec::with_capacity(max_order + 1);
        lists.resize_with(max_order + 1, FreeList::new);

        FreeListTable { lists }
    }

    /// Removes and returns the earliest-freed block of `order`.
    pub fn take_any(&mut self, order: usize) -> Option<usize> {
        self.lists.get_mut(order)?.pop()
    }

    /// Appends a block to the free list of `order`.
    ///
    /// # Panics
    ///
    /// Panics if `order` exceeds the table's maximum order.
    pub fn put(&mut self, order: usize, block: usize) {
        self.lists[order].push(block);
    }

    pub fn contains(&self, order: usize, block: usize) -> bool {
        self.lists
            .get(order)
            .map(|list| list.contains(block))
            .unwrap_or(false)
    }

    /// Removes `block` from the free list of `order`.
    ///
    /// Returns `false` if it wasn't there.
    pub fn remove(&mut self, order: usize, block: usize) -> bool {
        self.lists
            .get_mut(order)
            .map(|list| list.remove(block))
            .unwrap_or(false)
    }

    pub fn is_empty(&self, order: usize) -> bool {
        self.lists.get(order).map(FreeList::is_empty).unwrap_or(true)
    }

    pub fn len(&self, order: usize) -> usize {
        self.lists.get(order).map(FreeList::len).unwrap_or(0)
    }

    /// Iterates over the free blocks of `order`, oldest first.
    ///
    /// # Panics
    ///
    /// Panics if `order` exceeds the table's maximum order.
    pub fn iter(&self, order: usize) -> Iter<'_> {
        self.lists[order].iter()
    }
}
