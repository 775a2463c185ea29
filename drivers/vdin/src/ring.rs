//! # Frame Ring
//!
//! N frame slots with fixed head, body and table addresses. A ring is built
//! once per format or resolution change and never resized; a re-plan
//! builds a new ring and releases the old one.

use arrayvec::ArrayVec;

use crate::config::{RingDepthConfig, RING_CAPACITY};
use crate::error::{Error, Result};
use crate::geometry::{FrameGeometry, SIDE_CHANNEL_BYTES};
use crate::region::{Region, RegionKind, Reservation};
use crate::types::PhysAddr;

// =============================================================================
// RING DEPTH
// =============================================================================

/// Ring depth for a session: `min(minimum + rdma + skip, hardware max)`
pub fn required_slot_count(config: &RingDepthConfig) -> u32 {
    config
        .configured_minimum
        .saturating_add(config.rdma_margin())
        .saturating_add(config.skip_frames)
        .min(config.hardware_max_slots)
}

// =============================================================================
// FRAME SLOT
// =============================================================================

/// Addresses of one frame slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameSlot {
    /// Position in the ring
    pub index: u32,
    /// AFBC header block
    pub head_addr: PhysAddr,
    /// Compressed payload
    pub body_addr: PhysAddr,
    /// Page table (null without table addressing)
    pub table_addr: PhysAddr,
}

/// Buffer description reported to the capture pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RingInfo {
    /// Ring depth
    pub buf_count: u32,
    /// Line stride in bytes
    pub buf_width: u64,
    /// Lines per frame
    pub buf_height: u32,
    /// Body bytes per frame
    pub buf_size: u64,
}

// =============================================================================
// RING REGIONS
// =============================================================================

/// Regions a ring is laid out over
#[derive(Debug, Clone)]
pub struct RingRegions {
    /// Per-frame sizes
    pub geometry: FrameGeometry,
    /// Shared head region
    pub head: Region,
    /// Shared table region, if table addressing is used
    pub table: Option<Region>,
    /// One address per body slot
    pub bodies: ArrayVec<PhysAddr, RING_CAPACITY>,
}

// =============================================================================
// FRAME RING
// =============================================================================

/// Immutable set of frame slots and the reservation backing them
#[derive(Debug)]
pub struct FrameRing {
    geometry: FrameGeometry,
    head: Region,
    table: Option<Region>,
    slots: ArrayVec<FrameSlot, RING_CAPACITY>,
    reservation: Reservation,
}

impl FrameRing {
    /// Lay out `count` slots over `regions`
    ///
    /// On error the reservation is returned untouched so the caller can
    /// release it.
    pub fn build(
        regions: RingRegions,
        count: u32,
        reservation: Reservation,
    ) -> core::result::Result<Self, (Error, Reservation)> {
        match Self::layout(&regions, count) {
            Ok(slots) => Ok(Self {
                geometry: regions.geometry,
                head: regions.head,
                table: regions.table,
                slots,
                reservation,
            }),
            Err(err) => Err((err, reservation)),
        }
    }

    fn layout(regions: &RingRegions, count: u32) -> Result<ArrayVec<FrameSlot, RING_CAPACITY>> {
        let n = count as usize;
        if n == 0 || n > RING_CAPACITY || regions.bodies.len() < n {
            return Err(Error::ConfigMismatch {
                requested: count,
                max: regions.bodies.len().min(RING_CAPACITY) as u32,
            });
        }

        let geometry = &regions.geometry;
        check_fits(&regions.head, geometry.head_bytes_per_frame, count)?;
        if let Some(table) = &regions.table {
            check_fits(table, geometry.table_bytes_per_frame, count)?;
        }

        let mut slots = ArrayVec::new();
        for (i, &body_addr) in regions.bodies[..n].iter().enumerate() {
            let offset = i as u64;
            slots.push(FrameSlot {
                index: i as u32,
                head_addr: regions.head.base + offset * geometry.head_bytes_per_frame,
                body_addr,
                table_addr: regions
                    .table
                    .map(|table| table.base + offset * geometry.table_bytes_per_frame)
                    .unwrap_or_default(),
            });
        }
        Ok(slots)
    }

    /// Ring depth
    pub fn capacity(&self) -> u32 {
        self.slots.len() as u32
    }

    /// Slot `index`
    pub fn slot(&self, index: u32) -> Option<&FrameSlot> {
        self.slots.get(index as usize)
    }

    /// All slots in ring order
    pub fn slots(&self) -> &[FrameSlot] {
        &self.slots
    }

    /// Slot armed after `index`
    ///
    /// Out-of-range indices wrap modulo the ring depth.
    pub fn next_index(&self, index: u32) -> u32 {
        index.wrapping_add(1) % self.capacity()
    }

    /// Per-frame sizes
    pub fn geometry(&self) -> &FrameGeometry {
        &self.geometry
    }

    /// Shared head region
    pub fn head_region(&self) -> &Region {
        &self.head
    }

    /// Shared table region
    pub fn table_region(&self) -> Option<&Region> {
        self.table.as_ref()
    }

    /// Side-channel page at the end of slot `index`'s body
    pub fn side_channel_addr(&self, index: u32) -> Option<PhysAddr> {
        self.slot(index).map(|slot| {
            slot.body_addr + (self.geometry.body_bytes_per_frame - SIDE_CHANNEL_BYTES)
        })
    }

    /// Buffer description for the capture pipeline
    pub fn info(&self) -> RingInfo {
        RingInfo {
            buf_count: self.capacity(),
            buf_width: self.geometry.stride_bytes,
            buf_height: self.geometry.v_active,
            buf_size: self.geometry.body_bytes_per_frame,
        }
    }

    /// Page-aligned window of the contiguous block, if one backs the ring
    pub fn contiguous_span(&self) -> Option<(PhysAddr, u64)> {
        self.reservation.contiguous_span()
    }

    /// Regions reserved for this ring
    pub fn regions(&self) -> &[Region] {
        self.reservation.regions()
    }

    /// Tear down the ring, yielding its reservation for release
    pub(crate) fn into_reservation(self) -> Reservation {
        self.reservation
    }
}

fn check_fits(region: &Region, per_frame: u64, count: u32) -> Result<()> {
    let needed = per_frame.saturating_mul(count as u64);
    if region.size < needed {
        let available = region.size;
        return Err(match region.kind {
            RegionKind::Table => Error::TableTooSmall {
                required: needed,
                available,
            },
            _ => Error::OverBudget {
                requested: needed,
                available,
            },
        });
    }
    Ok(())
}
