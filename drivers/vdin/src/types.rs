//! # VDIN Core Types
//!
//! Physical addresses and page arithmetic shared by the planner stages.

use core::fmt;
use core::ops::{Add, Sub};

// =============================================================================
// PAGE CONSTANTS
// =============================================================================

/// Page size used by the capture DMA engine and the page-table format
pub const PAGE_SIZE: u64 = 4096;

/// log2 of [`PAGE_SIZE`]
pub const PAGE_SHIFT: u32 = 12;

/// Round `value` up to the next multiple of `align` (a power of two)
#[inline]
pub const fn align_up(value: u64, align: u64) -> u64 {
    let mask = align - 1;
    (value + mask) & !mask
}

/// Round `value` up to a whole number of pages
#[inline]
pub const fn page_align(value: u64) -> u64 {
    align_up(value, PAGE_SIZE)
}

/// Number of pages needed to cover `bytes`
#[inline]
pub const fn pages_for(bytes: u64) -> u64 {
    bytes.div_ceil(PAGE_SIZE)
}

// =============================================================================
// PHYSICAL ADDRESS
// =============================================================================

/// Physical (bus) address as seen by the capture DMA engine
///
/// This is NOT a CPU pointer. Table regions are written through a
/// [`PhysMapper`](crate::backend::PhysMapper).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(transparent)]
pub struct PhysAddr(u64);

impl PhysAddr {
    /// Create a new physical address
    #[inline]
    pub const fn new(addr: u64) -> Self {
        Self(addr)
    }

    /// Create a null address
    #[inline]
    pub const fn null() -> Self {
        Self(0)
    }

    /// Get the raw u64 value
    #[inline]
    pub const fn raw(self) -> u64 {
        self.0
    }

    /// Check if null
    #[inline]
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }

    /// Check alignment
    #[inline]
    pub const fn is_aligned(self, alignment: u64) -> bool {
        self.0 & (alignment - 1) == 0
    }

    /// Check page alignment
    #[inline]
    pub const fn is_page_aligned(self) -> bool {
        self.is_aligned(PAGE_SIZE)
    }

    /// Align down to a page boundary
    #[inline]
    pub const fn page_base(self) -> Self {
        Self(self.0 & !(PAGE_SIZE - 1))
    }

    /// Page frame number of this address
    #[inline]
    pub const fn page_number(self) -> u64 {
        self.0 >> PAGE_SHIFT
    }

    /// Checked offset by bytes
    #[inline]
    pub const fn checked_add(self, bytes: u64) -> Option<Self> {
        match self.0.checked_add(bytes) {
            Some(addr) => Some(Self(addr)),
            None => None,
        }
    }
}

impl Add<u64> for PhysAddr {
    type Output = Self;

    fn add(self, rhs: u64) -> Self::Output {
        Self(self.0.wrapping_add(rhs))
    }
}

impl Sub<PhysAddr> for PhysAddr {
    type Output = u64;

    fn sub(self, rhs: PhysAddr) -> Self::Output {
        self.0.wrapping_sub(rhs.0)
    }
}

impl fmt::Debug for PhysAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PhysAddr(0x{:010x})", self.0)
    }
}

impl fmt::Display for PhysAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:010x}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_align() {
        assert_eq!(page_align(0), 0);
        assert_eq!(page_align(1), PAGE_SIZE);
        assert_eq!(page_align(4096), 4096);
        assert_eq!(page_align(64_800), 65_536);
    }

    #[test]
    fn test_phys_addr_pages() {
        let addr = PhysAddr::new(0x1234_5678);
        assert_eq!(addr.page_number(), 0x12345);
        assert_eq!(addr.page_base(), PhysAddr::new(0x1234_5000));
        assert!(!addr.is_page_aligned());
        assert!(PhysAddr::new(0x8000).is_page_aligned());
        assert_eq!(PhysAddr::new(0x8000) + 0x10, PhysAddr::new(0x8010));
        assert_eq!(PhysAddr::new(u64::MAX).checked_add(1), None);
    }
}
