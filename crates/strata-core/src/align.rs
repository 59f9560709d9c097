//! Block Alignment Math
//!
//! Direct I/O against a block device (or an `O_DIRECT` file) only accepts
//! offsets, lengths and memory addresses that are multiples of the device
//! block size. Everything on the WAL write/read path goes through these
//! helpers to stay on block boundaries.
//!
//! ## Unaligned Ranges
//!
//! A caller range `[start, end)` that is not block aligned is expanded to the
//! smallest aligned superrange, the I/O is done on that, and the caller trims
//! the result back down:
//!
//! ```text
//!        start                     end
//!          │◄──── caller bytes ────►│
//! ┌────────┼────────┬────────┬──────┼─┐
//! │ block 0│        │ block 1│      │ │
//! └────────┴────────┴────────┴────────┘
//! ▲                                   ▲
//! align_down(start)          align_up(end)
//! ```
//!
//! ## Usage
//! ```ignore
//! use strata_core::align::{align_up, aligned_range, is_aligned};
//!
//! let len = align_up(10);            // 4096
//! let range = aligned_range(10, 20); // 0..4096
//! assert!(is_aligned(range.start));
//! ```

use std::ops::Range;

/// Block size of the WAL device in bytes. Must be a power of two.
pub const BLOCK_SIZE: u64 = 4096;

const BLOCK_MASK: u64 = BLOCK_SIZE - 1;

/// Round `value` down to the nearest multiple of [`BLOCK_SIZE`].
#[inline]
pub const fn align_down(value: u64) -> u64 {
    value & !BLOCK_MASK
}

/// Round `value` up to the nearest multiple of [`BLOCK_SIZE`].
#[inline]
pub const fn align_up(value: u64) -> u64 {
    (value + BLOCK_MASK) & !BLOCK_MASK
}

/// Whether `value` is a multiple of [`BLOCK_SIZE`].
#[inline]
pub const fn is_aligned(value: u64) -> bool {
    value & BLOCK_MASK == 0
}

/// Expand `[start, end)` to the smallest block-aligned range covering it.
#[inline]
pub fn aligned_range(start: u64, end: u64) -> Range<u64> {
    align_down(start)..align_up(end)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_size_is_power_of_two() {
        assert!(BLOCK_SIZE.is_power_of_two());
    }

    #[test]
    fn test_align_down() {
        assert_eq!(align_down(0), 0);
        assert_eq!(align_down(1), 0);
        assert_eq!(align_down(4095), 0);
        assert_eq!(align_down(4096), 4096);
        assert_eq!(align_down(8191), 4096);
    }

    #[test]
    fn test_align_up() {
        assert_eq!(align_up(0), 0);
        assert_eq!(align_up(1), 4096);
        assert_eq!(align_up(4096), 4096);
        assert_eq!(align_up(4097), 8192);
    }

    #[test]
    fn test_is_aligned() {
        assert!(is_aligned(0));
        assert!(is_aligned(4096));
        assert!(is_aligned(1 << 40));
        assert!(!is_aligned(1));
        assert!(!is_aligned(4095));
    }

    #[test]
    fn test_aligned_range_expands_both_ends() {
        assert_eq!(aligned_range(10, 20), 0..4096);
        assert_eq!(aligned_range(4000, 4200), 0..8192);
        assert_eq!(aligned_range(4096, 8192), 4096..8192);
    }

    #[test]
    fn test_align_large_offsets() {
        // 16 TiB device, well past 32-bit range
        let cap = 16u64 << 40;
        assert_eq!(align_up(cap - 1), cap);
        assert_eq!(align_down(cap + 5), cap);
    }
}
