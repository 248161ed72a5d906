//! A small library for ~~hating on~~ evaluating the correctness of allocators
//! that hand out integer addresses.
//!
//! The evaluator keeps a shadow map recording which operation owns each
//! address. Every successful allocation claims its range in the map and every
//! deallocation releases it, so overlapping blocks, blocks outside the managed
//! range and blocks released twice are caught as soon as they happen.

use std::ops::Range;

/// Requests at most `2^MAX_SIZE_BITS` bytes.
const MAX_SIZE_BITS: u32 = 20;

/// A wrapper around a request size which implements `Arbitrary`.
///
/// Sizes are spread evenly across powers of two and include zero.
#[derive(Copy, Clone, Debug)]
pub struct ArbSize(pub usize);

impl arbitrary::Arbitrary<'_> for ArbSize {
    fn arbitrary(u: &mut arbitrary::Unstructured<'_>) -> arbitrary::Result<Self> {
        // Select a random bit index and mask to obtain a size below that power
        // of two.
        let exp = u32::from(u8::arbitrary(u)?) % (MAX_SIZE_BITS + 1);
        let size = usize::arbitrary(u)? % (1 << exp);

        Ok(ArbSize(size))
    }
}

#[derive(arbitrary::Arbitrary)]
enum AllocatorOpTag {
    Alloc,
    Dealloc,
    DeallocRaw,
}

#[derive(Clone, Debug)]
pub enum AllocatorOp {
    /// Requests a block of at least this many bytes.
    Alloc(usize),
    /// Releases the outstanding block at this index, modulo the number of
    /// outstanding blocks.
    Dealloc(usize),
    /// Releases an arbitrary address, which the subject must reject unless it
    /// starts an outstanding block.
    DeallocRaw(usize),
}

impl arbitrary::Arbitrary<'_> for AllocatorOp {
    fn arbitrary(u: &mut arbitrary::Unstructured<'_>) -> arbitrary::Result<Self> {
        let tag = AllocatorOpTag::arbitrary(u)?;

        let op = match tag {
            AllocatorOpTag::Alloc => AllocatorOp::Alloc(ArbSize::arbitrary(u)?.0),
            AllocatorOpTag::Dealloc => AllocatorOp::Dealloc(usize::arbitrary(u)?),
            AllocatorOpTag::DeallocRaw => AllocatorOp::DeallocRaw(usize::arbitrary(u)?),
        };

        Ok(op)
    }
}

pub trait Subject {
    type Op: for<'a> arbitrary::Arbitrary<'a>;
    type AllocError;

    /// The size of the address range managed by the subject.
    ///
    /// Every block must lie within `0..extent()`.
    fn extent(&self) -> usize;

    /// Allocates a block of at least `size` bytes and returns its address.
    fn allocate(&mut self, size: usize) -> Result<usize, Self::AllocError>;

    /// Returns the number of bytes actually reserved for a `size`-byte request.
    ///
    /// Defaults to `size`.
    fn block_size(&self, size: usize) -> usize {
        size
    }

    /// Deallocates the block at `addr`.
    fn deallocate(&mut self, addr: usize) -> Result<(), Self::AllocError>;

    fn handle_custom_op(&mut self, op: Self::Op) {
        // To silence the unused variable warning.
        drop(op);
    }
}

/// A list of allocated blocks.
#[derive(Default)]
pub struct Blocks {
    blocks: Vec<Block>,
}

impl Blocks {
    pub fn new() -> Blocks {
        Blocks { blocks: Vec::new() }
    }

    pub fn push(&mut self, block: Block) {
        self.blocks.push(block);
    }

    pub fn remove_modulo(&mut self, idx: usize) -> Option<Block> {
        let len = self.blocks.len();
        (len != 0).then(|| self.blocks.swap_remove(idx % len))
    }

    pub fn contains_addr(&self, addr: usize) -> bool {
        self.blocks.iter().any(|b| b.addr == addr)
    }
}

impl IntoIterator for Blocks {
    type Item = Block;

    type IntoIter = std::vec::IntoIter<Block>;

    fn into_iter(self) -> Self::IntoIter {
        self.blocks.into_iter()
    }
}

/// An allocated block of the address space.
#[derive(Copy, Clone, Debug)]
pub struct Block {
    // The start address.
    addr: usize,
    // The number of bytes reserved for the block.
    len: usize,
    // The unique ID of the operation that allocated this block.
    id: u64,
}

impl Block {
    pub fn addr(&self) -> usize {
        self.addr
    }

    pub fn range(&self) -> Range<usize> {
        self.addr..self.addr + self.len
    }
}

/// Records which block, if any, owns each address.
pub struct ShadowMap {
    owners: Vec<Option<u64>>,
}

impl ShadowMap {
    pub fn new(extent: usize) -> ShadowMap {
        ShadowMap {
            owners: vec![None; extent],
        }
    }

    /// "Paints" the range of `block` with its ID.
    ///
    /// Returns `false` without painting if any part of the range is already
    /// owned or lies outside the map.
    pub fn paint(&mut self, block: &Block) -> bool {
        let owners = match self.owners.get_mut(block.range()) {
            Some(o) => o,
            None => return false,
        };

        if owners.iter().any(Option::is_some) {
            return false;
        }

        owners.fill(Some(block.id));
        true
    }

    /// Verifies that the range of `block` is still owned by it, then clears it.
    pub fn release(&mut self, block: &Block) -> bool {
        let owners = match self.owners.get_mut(block.range()) {
            Some(o) => o,
            None => return false,
        };

        if !owners.iter().all(|&owner| owner == Some(block.id)) {
            return false;
        }

        owners.fill(None);
        true
    }
}

pub struct Evaluator<S: Subject> {
    subject: S,
}

#[derive(Clone, Debug)]
pub struct Failed {
    pub completed: Vec<AllocatorOp>,
    pub failed_op: AllocatorOp,
}

impl<S: Subject> Evaluator<S> {
    pub fn new(subject: S) -> Evaluator<S> {
        Evaluator { subject }
    }

    pub fn into_subject(self) -> S {
        self.subject
    }

    pub fn evaluate<I>(&mut self, ops: I) -> Result<(), Failed>
    where
        I: IntoIterator<Item = AllocatorOp>,
    {
        let mut completed = Vec::new();
        let mut blocks = Blocks::new();
        let mut shadow = ShadowMap::new(self.subject.extent());

        for (op_id, op) in ops.into_iter().enumerate() {
            let op_id: u64 = op_id.try_into().unwrap();

            let ok = match op {
                AllocatorOp::Alloc(size) => match self.subject.allocate(size) {
                    Ok(addr) => {
                        let block = Block {
                            addr,
                            len: self.subject.block_size(size),
                            id: op_id,
                        };

                        let painted = size != 0 && shadow.paint(&block);
                        blocks.push(block);
                        painted
                    }
                    Err(_) => true,
                },

                AllocatorOp::Dealloc(raw_idx) => match blocks.remove_modulo(raw_idx) {
                    Some(block) => {
                        shadow.release(&block) && self.subject.deallocate(block.addr).is_ok()
                    }
                    None => true,
                },

                AllocatorOp::DeallocRaw(raw_addr) => {
                    let addr = raw_addr % self.subject.extent().saturating_mul(2).max(1);
                    blocks.contains_addr(addr) || self.subject.deallocate(addr).is_err()
                }
            };

            if !ok {
                return Err(Failed {
                    completed,
                    failed_op: op,
                });
            }

            completed.push(op);
        }

        for block in blocks {
            if !shadow.release(&block) || self.subject.deallocate(block.addr).is_err() {
                return Err(Failed {
                    completed,
                    failed_op: AllocatorOp::Dealloc(0),
                });
            }
        }

        Ok(())
    }
}
