#![no_main]

use arbitrary::{Arbitrary, Unstructured};
use binbuddy::{order, AllocError, BuddyAllocator, Snapshot};
use libfuzzer_sys::fuzz_target;

const MAX_ORDER: u8 = 16;

#[derive(Clone, Debug, Arbitrary)]
enum BuddyOp {
    Allocate(usize),
    Deallocate(usize),
    DeallocateRaw(usize),
}

#[derive(Clone, Debug)]
struct Args {
    total_size: usize,
    ops: Vec<BuddyOp>,
}

impl Arbitrary<'_> for Args {
    fn arbitrary(un: &mut Unstructured) -> arbitrary::Result<Args> {
        let max_order = u8::arbitrary(un)? % (MAX_ORDER + 1);

        Ok(Args {
            total_size: order::size_of_order(max_order.into()),
            ops: Vec::arbitrary(un)?,
        })
    }
}

/// Checks that the blocks in `snap` exactly tile the address space.
fn assert_partitioned(snap: &Snapshot) {
    let mut blocks: Vec<(usize, usize)> = snap
        .allocations
        .iter()
        .map(|b| (b.address, b.order))
        .collect();

    for (order, list) in snap.free_lists.iter().enumerate() {
        blocks.extend(list.iter().map(|&addr| (addr, order)));
    }

    blocks.sort_unstable();

    let mut next = 0;
    for (addr, order) in blocks {
        assert_eq!(addr, next, "gap or overlap at {addr:#x}");
        assert!(order::is_aligned(addr, order), "misaligned block {addr:#x}");
        next = addr + order::size_of_order(order);
    }

    assert_eq!(next, snap.total_size);
}

fuzz_target!(|args: Args| {
    let mut alloc = match BuddyAllocator::new(args.total_size) {
        Ok(a) => a,
        Err(_) => return,
    };

    let mut outstanding = Vec::new();

    for op in args.ops {
        let before = alloc.snapshot();

        match op {
            BuddyOp::Allocate(size) => match alloc.allocate(size) {
                Ok(addr) => outstanding.push(addr),
                Err(_) => assert_eq!(alloc.snapshot(), before),
            },

            BuddyOp::Deallocate(raw_idx) => {
                if outstanding.is_empty() {
                    continue;
                }

                let idx = raw_idx % outstanding.len();
                let addr = outstanding.swap_remove(idx);
                alloc.free(addr).expect("failed to free outstanding block");
                assert_eq!(alloc.free(addr), Err(AllocError::InvalidAddress));
            }

            BuddyOp::DeallocateRaw(addr) => {
                if outstanding.contains(&addr) {
                    continue;
                }

                assert_eq!(alloc.free(addr), Err(AllocError::InvalidAddress));
                assert_eq!(alloc.snapshot(), before);
            }
        }

        assert_partitioned(&alloc.snapshot());
    }

    for addr in outstanding {
        alloc.free(addr).expect("failed to free outstanding block");
    }

    assert!(alloc.snapshot().is_pristine());
});
