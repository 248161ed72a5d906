use alloc_hater::Subject;
use binbuddy::{order, AllocError, AllocInitError, BuddyAllocator};

pub struct BuddySubject(BuddyAllocator);

impl BuddySubject {
    pub fn new(total_size: usize) -> Result<Self, AllocInitError> {
        let b = BuddyAllocator::new(total_size)?;
        Ok(BuddySubject(b))
    }

    pub fn allocator(&self) -> &BuddyAllocator {
        &self.0
    }
}

impl Subject for BuddySubject {
    type Op = ();
    type AllocError = AllocError;

    fn extent(&self) -> usize {
        self.0.total_size()
    }

    fn allocate(&mut self, size: usize) -> Result<usize, Self::AllocError> {
        self.0.allocate(size)
    }

    fn block_size(&self, size: usize) -> usize {
        order::order_for_size(size)
            .map(order::size_of_order)
            .unwrap_or(0)
    }

    fn deallocate(&mut self, addr: usize) -> Result<(), Self::AllocError> {
        self.0.free(addr)
    }

    fn handle_custom_op(&mut self, (): ()) {}
}

#[cfg(test)]
mod tests {
    use alloc_hater::{AllocatorOp, Evaluator};

    use super::*;

    #[test]
    fn worked_scenario_passes_evaluation() {
        let subject = BuddySubject::new(64).unwrap();
        let mut eval = Evaluator::new(subject);

        let ops = [
            AllocatorOp::Alloc(10),
            AllocatorOp::Alloc(20),
            AllocatorOp::Alloc(5),
            AllocatorOp::Dealloc(1),
            AllocatorOp::Alloc(18),
            AllocatorOp::DeallocRaw(24),
            AllocatorOp::Alloc(64),
            AllocatorOp::Alloc(0),
        ];

        eval.evaluate(ops).unwrap();
        assert!(eval.into_subject().allocator().snapshot().is_pristine());
    }

    #[test]
    fn churn_passes_evaluation() {
        let subject = BuddySubject::new(1 << 10).unwrap();
        let mut eval = Evaluator::new(subject);

        let ops = (0..512).map(|i| match i % 5 {
            0 | 1 | 3 => AllocatorOp::Alloc((i * 37) % 200 + 1),
            2 => AllocatorOp::Dealloc(i * 7),
            _ => AllocatorOp::DeallocRaw(i * 13),
        });

        eval.evaluate(ops).unwrap();
        assert!(eval.into_subject().allocator().snapshot().is_pristine());
    }
}
