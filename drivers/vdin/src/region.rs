//! # Region Allocation
//!
//! Reserves the head, table and body regions of a frame ring through one of
//! three backend strategies:
//!
//! ```text
//! ┌──────────────┬───────────────────────────┬───────────────────────────┐
//! │ Strategy     │ head / table              │ body slots                │
//! ├──────────────┼───────────────────────────┼───────────────────────────┤
//! │ Pooled       │ alloc_pages(tag, n)       │ alloc_pages(tag, n) x N   │
//! │ Contiguous   │ offsets in one CMA block  │ offsets in the same block │
//! │ Manual       │ Pooled or Contiguous      │ caller-supplied addresses │
//! └──────────────┴───────────────────────────┴───────────────────────────┘
//! ```
//!
//! Every successful request is recorded as a lease in a [`Reservation`].
//! A plan that fails at any stage hands its reservation back to
//! [`RegionAllocator::release`], which returns every lease in reverse order,
//! so a failed plan never leaves memory behind.

use alloc::boxed::Box;
use alloc::vec::Vec;
use core::fmt;

use arrayvec::ArrayVec;

use crate::backend::{BlockHandle, ContiguousAllocator, PageAllocator};
use crate::bounds::PlanFootprint;
use crate::config::RING_CAPACITY;
use crate::error::{Error, Result};
use crate::types::{page_align, pages_for, PhysAddr};

// =============================================================================
// REGION
// =============================================================================

/// What a region holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegionKind {
    /// AFBC headers for all slots
    Head,
    /// Page tables for all slots
    Table,
    /// Compressed payload of one slot
    Body,
    /// Contiguous block backing the other regions
    Block,
}

/// A reserved span of physical memory
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    /// First byte
    pub base: PhysAddr,
    /// Size in bytes
    pub size: u64,
    /// Contents
    pub kind: RegionKind,
}

impl Region {
    /// Create a region
    pub const fn new(base: PhysAddr, size: u64, kind: RegionKind) -> Self {
        Self { base, size, kind }
    }

    /// End address (exclusive)
    pub fn end(&self) -> PhysAddr {
        self.base + self.size
    }

    /// Check if address is within region
    pub fn contains(&self, addr: PhysAddr) -> bool {
        addr >= self.base && addr < self.end()
    }

    /// Check if regions overlap
    pub fn overlaps(&self, other: &Region) -> bool {
        self.base < other.end() && other.base < self.end()
    }
}

// =============================================================================
// STRATEGY
// =============================================================================

/// Strategy discriminant, for reporting and config
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StrategyKind {
    /// Independent tagged page allocations
    Pooled,
    /// One contiguous block carved into regions
    Contiguous,
    /// Caller-supplied body buffers
    Manual,
}

/// Backend for regions the caller does not supply in Manual mode
pub enum SharedBackend {
    /// Tagged page allocator
    Pooled(Box<dyn PageAllocator>),
    /// Contiguous block allocator
    Contiguous(Box<dyn ContiguousAllocator>),
}

/// Backend allocation strategy, fixed for the lifetime of a session
pub enum Strategy {
    /// Every region and body slot is a separate tagged page allocation
    Pooled(Box<dyn PageAllocator>),
    /// One block holds head, table and every body slot
    Contiguous(Box<dyn ContiguousAllocator>),
    /// Bodies are pre-pinned external buffers
    Manual {
        /// Backend for head and table regions
        shared: SharedBackend,
        /// Page-aligned body addresses, one per slot
        bodies: Vec<PhysAddr>,
    },
}

impl Strategy {
    /// Strategy discriminant
    pub fn kind(&self) -> StrategyKind {
        match self {
            Self::Pooled(_) => StrategyKind::Pooled,
            Self::Contiguous(_) => StrategyKind::Contiguous,
            Self::Manual { .. } => StrategyKind::Manual,
        }
    }
}

impl fmt::Debug for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pooled(_) => f.write_str("Pooled"),
            Self::Contiguous(_) => f.write_str("Contiguous"),
            Self::Manual { shared, bodies } => f
                .debug_struct("Manual")
                .field(
                    "shared",
                    &match shared {
                        SharedBackend::Pooled(_) => StrategyKind::Pooled,
                        SharedBackend::Contiguous(_) => StrategyKind::Contiguous,
                    },
                )
                .field("bodies", &bodies.len())
                .finish(),
        }
    }
}

/// Granted memory pool of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryPool {
    /// Backend strategy
    pub strategy: StrategyKind,
    /// Bytes granted to the session
    pub total_bytes: u64,
    /// Allocator tag
    pub tag: &'static str,
}

// =============================================================================
// RESERVATION
// =============================================================================

/// One backend allocation to undo on release
#[derive(Debug, Clone, Copy)]
enum Lease {
    Pages { addr: PhysAddr },
    Block { handle: BlockHandle },
}

/// Cursor over a contiguous block
#[derive(Debug, Clone, Copy)]
struct Carve {
    base: PhysAddr,
    size: u64,
    cursor: u64,
}

impl Carve {
    fn take(&mut self, bytes: u64) -> Option<PhysAddr> {
        let end = self.cursor.checked_add(bytes)?;
        if end > self.size {
            return None;
        }
        let addr = self.base + self.cursor;
        self.cursor = end;
        Some(addr)
    }
}

/// Everything reserved for one plan
#[must_use = "a reservation must be handed back to RegionAllocator::release"]
#[derive(Debug)]
pub struct Reservation {
    leases: Vec<Lease>,
    carve: Option<Carve>,
    regions: Vec<Region>,
}

impl Reservation {
    fn new() -> Self {
        Self {
            leases: Vec::new(),
            carve: None,
            regions: Vec::new(),
        }
    }

    /// Regions reserved so far, in request order
    pub fn regions(&self) -> &[Region] {
        &self.regions
    }

    /// Backend allocations still held
    pub fn lease_count(&self) -> usize {
        self.leases.len()
    }

    /// Page-aligned window of the contiguous block, if one backs the plan
    pub fn contiguous_span(&self) -> Option<(PhysAddr, u64)> {
        self.carve.map(|carve| {
            let start = carve.base.page_base();
            let len = page_align((carve.base - start) + carve.size);
            (start, len)
        })
    }

    fn record(&mut self, region: Region) {
        log::debug!(
            "vdin: {:?} region {} +{:#x}",
            region.kind,
            region.base,
            region.size
        );
        self.regions.push(region);
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        if !self.leases.is_empty() {
            log::error!(
                "vdin: reservation dropped with {} live allocations",
                self.leases.len()
            );
        }
    }
}

// =============================================================================
// REGION ALLOCATOR
// =============================================================================

/// Reserves and releases ring regions through the session strategy
#[derive(Debug)]
pub struct RegionAllocator {
    strategy: Strategy,
    tag: &'static str,
    total_bytes: u64,
}

impl RegionAllocator {
    /// Create an allocator over a strategy and a granted pool size
    pub fn new(strategy: Strategy, tag: &'static str, total_bytes: u64) -> Self {
        Self {
            strategy,
            tag,
            total_bytes,
        }
    }

    /// Strategy discriminant
    pub fn kind(&self) -> StrategyKind {
        self.strategy.kind()
    }

    /// Granted pool description
    pub fn pool(&self) -> MemoryPool {
        MemoryPool {
            strategy: self.kind(),
            total_bytes: self.total_bytes,
            tag: self.tag,
        }
    }

    /// Open a reservation for a plan
    ///
    /// Contiguous backends allocate their single block here, sized for
    /// every region the plan will carve from it.
    pub fn begin(&mut self, footprint: &PlanFootprint) -> Result<Reservation> {
        let mut reservation = Reservation::new();

        let block_bytes = match &self.strategy {
            Strategy::Contiguous(_) => Some(footprint.total()?),
            Strategy::Manual {
                shared: SharedBackend::Contiguous(_),
                ..
            } => Some(footprint.shared_bytes()?),
            Strategy::Pooled(_)
            | Strategy::Manual {
                shared: SharedBackend::Pooled(_),
                ..
            } => None,
        };

        if let Some(bytes) = block_bytes {
            let bytes = page_align(bytes);
            let Some(allocator) = self.block_allocator() else {
                return Err(Error::AllocFailure {
                    kind: RegionKind::Block,
                    requested: bytes,
                });
            };
            let Some((base, handle)) = allocator.alloc_contiguous(bytes) else {
                log::error!("vdin: contiguous block of {:#x} bytes unavailable", bytes);
                return Err(Error::AllocFailure {
                    kind: RegionKind::Block,
                    requested: bytes,
                });
            };
            reservation.leases.push(Lease::Block { handle });
            reservation.carve = Some(Carve {
                base,
                size: bytes,
                cursor: 0,
            });
            reservation.record(Region::new(base, bytes, RegionKind::Block));
        }

        Ok(reservation)
    }

    /// Reserve `count` regions of `size_bytes` each
    ///
    /// On failure the regions reserved by this and earlier calls stay in
    /// `reservation`; the caller must release it.
    pub fn reserve(
        &mut self,
        reservation: &mut Reservation,
        kind: RegionKind,
        size_bytes: u64,
        count: usize,
    ) -> Result<ArrayVec<PhysAddr, RING_CAPACITY>> {
        if count > RING_CAPACITY {
            return Err(Error::ConfigMismatch {
                requested: count as u32,
                max: RING_CAPACITY as u32,
            });
        }
        if size_bytes == 0 {
            return Err(Error::InvalidGeometry {
                reason: "empty region",
            });
        }

        let size = page_align(size_bytes);
        let tag = self.tag;
        let mut addrs = ArrayVec::new();

        match &mut self.strategy {
            Strategy::Manual { bodies, .. } if kind == RegionKind::Body => {
                if bodies.len() < count {
                    return Err(Error::ManualSlotShortfall {
                        supplied: bodies.len() as u32,
                        required: count as u32,
                    });
                }
                for (slot, &addr) in bodies[..count].iter().enumerate() {
                    if addr.is_null() {
                        return Err(Error::NullBuffer { slot: slot as u32 });
                    }
                    if !addr.is_page_aligned() {
                        return Err(Error::Misaligned { addr });
                    }
                    reservation.record(Region::new(addr, size, kind));
                    addrs.push(addr);
                }
            },
            Strategy::Pooled(allocator)
            | Strategy::Manual {
                shared: SharedBackend::Pooled(allocator),
                ..
            } => {
                for _ in 0..count {
                    let addr = allocator.alloc_pages(tag, pages_for(size));
                    if addr.is_null() {
                        log::error!("vdin: {:?} pages for {:#x} bytes unavailable", kind, size);
                        return Err(Error::AllocFailure {
                            kind,
                            requested: size,
                        });
                    }
                    reservation.leases.push(Lease::Pages { addr });
                    reservation.record(Region::new(addr, size, kind));
                    addrs.push(addr);
                }
            },
            Strategy::Contiguous(_)
            | Strategy::Manual {
                shared: SharedBackend::Contiguous(_),
                ..
            } => {
                for _ in 0..count {
                    let addr = reservation
                        .carve
                        .as_mut()
                        .and_then(|carve| carve.take(size))
                        .ok_or(Error::AllocFailure {
                            kind,
                            requested: size,
                        })?;
                    reservation.record(Region::new(addr, size, kind));
                    addrs.push(addr);
                }
            },
        }

        Ok(addrs)
    }

    /// Return every backend allocation held by a reservation
    pub fn release(&mut self, mut reservation: Reservation) {
        let tag = self.tag;
        let leases = core::mem::take(&mut reservation.leases);

        for lease in leases.into_iter().rev() {
            match lease {
                Lease::Pages { addr } => match self.page_allocator() {
                    Some(allocator) => allocator.free_pages(tag, addr),
                    None => log::error!("vdin: no page allocator to free {}", addr),
                },
                Lease::Block { handle } => match self.block_allocator() {
                    Some(allocator) => allocator.free_contiguous(handle),
                    None => log::error!("vdin: no block allocator to free {:?}", handle),
                },
            }
        }

        log::debug!(
            "vdin: released {} regions from {:?} pool",
            reservation.regions.len(),
            self.kind()
        );
    }

    fn page_allocator(&mut self) -> Option<&mut dyn PageAllocator> {
        match &mut self.strategy {
            Strategy::Pooled(allocator)
            | Strategy::Manual {
                shared: SharedBackend::Pooled(allocator),
                ..
            } => Some(allocator.as_mut()),
            _ => None,
        }
    }

    fn block_allocator(&mut self) -> Option<&mut dyn ContiguousAllocator> {
        match &mut self.strategy {
            Strategy::Contiguous(allocator)
            | Strategy::Manual {
                shared: SharedBackend::Contiguous(allocator),
                ..
            } => Some(allocator.as_mut()),
            _ => None,
        }
    }
}
