//! Conversions between byte sizes and block orders.
//!
//! A block of order `k` is `2^k` bytes long and starts at a multiple of `2^k`.

use crate::{AllocError, AllocInitError};

/// Returns the smallest order whose block size is at least `size`.
///
/// Sizes above `2^(usize::BITS - 1)` map to `usize::BITS`, which no allocator
/// can serve.
///
/// # Errors
///
/// Returns [`AllocError::InvalidSize`] if `size` is zero.
///
/// ```
/// use binbuddy::order::order_for_size;
///
/// assert_eq!(order_for_size(1), Ok(0));
/// assert_eq!(order_for_size(10), Ok(4));
/// assert_eq!(order_for_size(16), Ok(4));
/// ```
#[inline]
pub fn order_for_size(size: usize) -> Result<usize, AllocError> {
    if size == 0 {
        return Err(AllocError::InvalidSize);
    }

    // (size - 1) has its highest set bit just below the rounded-up power of
    // two, or no bits at all when size == 1.
    Ok((usize::BITS - (size - 1).leading_zeros()) as usize)
}

/// Returns the size in bytes of a block of the given order.
#[inline]
pub const fn size_of_order(order: usize) -> usize {
    1 << order
}

/// Returns the address of the buddy of the order-`order` block at `addr`.
#[inline]
pub const fn buddy_of(addr: usize, order: usize) -> usize {
    addr ^ size_of_order(order)
}

/// Checks whether `addr` is a valid start address for a block of `order`.
#[inline]
pub const fn is_aligned(addr: usize, order: usize) -> bool {
    addr & (size_of_order(order) - 1) == 0
}

/// Returns the order of a block spanning the whole of `total_size` bytes.
///
/// # Errors
///
/// Returns [`AllocInitError::InvalidConfig`] unless `total_size` is a nonzero
/// power of two.
pub fn max_order_for(total_size: usize) -> Result<usize, AllocInitError> {
    if !total_size.is_power_of_two() {
        return Err(AllocInitError::InvalidConfig);
    }

    Ok(total_size.trailing_zeros() as usize)
}
