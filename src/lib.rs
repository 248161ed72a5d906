//! A binary-buddy allocator over an abstract address space.
//!
//! [`BuddyAllocator`] manages the integer range `[0, total_size)`, where
//! `total_size` is a power of two. Every block it hands out or keeps free has a
//! power-of-two size and is aligned to that size. Addresses are plain `usize`
//! offsets; binding them to real memory is up to the caller.
//!
//! ```
//! use binbuddy::{AllocError, BuddyAllocator};
//!
//! let mut buddy = BuddyAllocator::new(64).unwrap();
//!
//! let a = buddy.allocate(10).unwrap(); // 16-byte block
//! let b = buddy.allocate(20).unwrap(); // 32-byte block
//! let c = buddy.allocate(5).unwrap(); // 8-byte block
//! assert_eq!((a, b, c), (0, 32, 16));
//!
//! buddy.free(b).unwrap();
//! assert_eq!(buddy.free(b), Err(AllocError::InvalidAddress));
//! assert_eq!(buddy.allocate(18), Ok(32));
//! ```

#![doc(html_root_url = "https://docs.rs/binbuddy/0.1.0")]
#![warn(missing_debug_implementations)]
#![warn(missing_docs)]
#![cfg_attr(not(feature = "std"), no_std)]
#![cfg_attr(docs_rs, feature(doc_cfg))]

extern crate alloc;

// When the `log` feature is off these stand in for the `log` macros, so call
// sites don't need their own `cfg`s.
#[cfg(not(feature = "log"))]
macro_rules! warn {
    ($($arg:tt)*) => {};
}
#[cfg(not(feature = "log"))]
macro_rules! debug {
    ($($arg:tt)*) => {};
}
#[cfg(not(feature = "log"))]
macro_rules! trace {
    ($($arg:tt)*) => {};
}

mod alloc_table;
pub mod buddy;
mod free_list;
pub mod order;
pub mod snapshot;


use core::fmt;

pub use crate::{
    buddy::BuddyAllocator,
    snapshot::{AllocatedBlock, Snapshot},
};

#[cfg(feature = "std")]
pub use crate::buddy::{MutexBuddyAllocator, RwLockBuddyAllocator};

pub use crate::buddy::RefCellBuddyAllocator;

/// The error type for allocator constructors.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum AllocInitError {
    /// The configuration of the allocator is invalid.
    ///
    /// This variant is returned when `total_size` is zero or not a power of
    /// two.
    InvalidConfig,
}

impl fmt::Display for AllocInitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AllocInitError::InvalidConfig => {
                f.write_str("allocator size must be a nonzero power of two")
            }
        }
    }
}

#[cfg(feature = "std")]
#[cfg_attr(docs_rs, doc(cfg(feature = "std")))]
impl std::error::Error for AllocInitError {}

/// Indicates that an allocation or deallocation request could not be served.
///
/// No allocator state is modified when one of these is returned.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum AllocError {
    /// A zero-size block was requested.
    InvalidSize,
    /// No free block is large enough to satisfy the request.
    ///
    /// Requests larger than the whole address space also end up here.
    OutOfMemory,
    /// The address does not start a currently allocated block.
    ///
    /// This covers addresses that were never handed out as well as double
    /// frees.
    InvalidAddress,
}

impl fmt::Display for AllocError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            AllocError::InvalidSize => "allocation size must be nonzero",
            AllocError::OutOfMemory => "no free block large enough",
            AllocError::InvalidAddress => "address is not an allocated block",
        };

        f.write_str(msg)
    }
}

#[cfg(feature = "std")]
#[cfg_attr(docs_rs, doc(cfg(feature = "std")))]
impl std::error::Error for AllocError {}
