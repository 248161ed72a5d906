#![no_main]

use alloc_hater::{AllocatorOp, Evaluator};
use arbitrary::{Arbitrary, Unstructured};
use binbuddy_hater::BuddySubject;
use libfuzzer_sys::fuzz_target;

const MAX_ORDER: u8 = 16;

#[derive(Clone, Debug)]
struct Args {
    total_size: usize,
    ops: Vec<AllocatorOp>,
}

impl Arbitrary<'_> for Args {
    fn arbitrary(un: &mut Unstructured) -> arbitrary::Result<Args> {
        let max_order = u8::arbitrary(un)? % (MAX_ORDER + 1);

        Ok(Args {
            total_size: 1 << max_order,
            ops: Vec::arbitrary(un)?,
        })
    }
}

fuzz_target!(|args: Args| {
    let subject = match BuddySubject::new(args.total_size) {
        Ok(s) => s,
        Err(_) => return,
    };

    let mut eval = Evaluator::new(subject);
    if let Err(failed) = eval.evaluate(args.ops) {
        panic!("evaluation failed: {failed:?}");
    }

    assert!(eval.into_subject().allocator().snapshot().is_pristine());
});
