//! # Memory Backends
//!
//! Capability interfaces the planner consumes. The kernel side provides the
//! tagged page allocator, the contiguous (CMA) block allocator and the
//! physical-to-virtual mapping used to fill table regions.
//!
//! All calls are synchronous and bounded; none of them may block on I/O.

use crate::error::Result;
use crate::types::PhysAddr;

// =============================================================================
// PAGE ALLOCATOR
// =============================================================================

/// Shared, named, page-granular allocator
pub trait PageAllocator: Send {
    /// Allocate `page_count` physically contiguous pages under `tag`
    ///
    /// Returns a null address when the allocator is exhausted.
    fn alloc_pages(&mut self, tag: &str, page_count: u64) -> PhysAddr;

    /// Return pages previously allocated under `tag`
    fn free_pages(&mut self, tag: &str, addr: PhysAddr);
}

// =============================================================================
// CONTIGUOUS ALLOCATOR
// =============================================================================

/// Opaque handle of a contiguous block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockHandle(pub u64);

/// Allocator of one large physically contiguous block
pub trait ContiguousAllocator: Send {
    /// Allocate `byte_count` contiguous bytes
    fn alloc_contiguous(&mut self, byte_count: u64) -> Option<(PhysAddr, BlockHandle)>;

    /// Free a block by handle
    fn free_contiguous(&mut self, handle: BlockHandle);
}

// =============================================================================
// PHYSICAL MAPPER
// =============================================================================

/// CPU access to physical memory for table writes
///
/// Implementations translate `addr` (the kernel's `phys_to_virt`) and hand
/// the closure a slice of exactly `len` bytes. Nothing outside that slice
/// is reachable from the closure.
pub trait PhysMapper: Send {
    /// Run `f` over a writable view of `len` bytes at `addr`
    fn with_mapped(
        &mut self,
        addr: PhysAddr,
        len: usize,
        f: &mut dyn FnMut(&mut [u8]),
    ) -> Result<()>;
}
