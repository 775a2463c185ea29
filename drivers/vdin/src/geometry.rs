//! # Frame Geometry Planning
//!
//! Pure computation of the per-frame byte sizes of the three AFBC regions:
//!
//! ```text
//!   head  = page_align(ceil(w * h / 128) * 4)       one word per 32x4 block
//!   body  = page_align(stride * h [+ chroma]) + SIDE_CHANNEL_BYTES
//!   table = page_align(ceil(body / 4096) * 4)       one word per body page
//! ```
//!
//! Nothing here allocates, logs region placement, or touches device state.

use crate::error::{Error, Result};
use crate::format::{BitDepth, FormatDescriptor, Packing, Sampling};
use crate::types::{align_up, page_align, pages_for};

// =============================================================================
// CONSTANTS
// =============================================================================

/// Pixels covered by one AFBC header (a 32x4 block)
pub const PIXELS_PER_HEADER: u64 = 32 * 4;

/// Bytes per AFBC header word
pub const HEADER_BYTES: u64 = 4;

/// Bytes per page-table entry
pub const TABLE_ENTRY_BYTES: u64 = 4;

/// Per-frame side-channel (HDR metadata) allotment at the end of each body
pub const SIDE_CHANNEL_BYTES: u64 = 4096;

/// Largest active width or height the write path accepts
pub const MAX_DIMENSION: u32 = 8192;

// =============================================================================
// RESOLUTION
// =============================================================================

/// Active picture size after decimation and cut-window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Resolution {
    /// Active pixels per line
    pub h_active: u32,
    /// Active lines per frame
    pub v_active: u32,
}

impl Resolution {
    /// Create a resolution
    pub const fn new(h_active: u32, v_active: u32) -> Self {
        Self { h_active, v_active }
    }

    /// Total active pixels
    pub const fn pixel_count(&self) -> u64 {
        self.h_active as u64 * self.v_active as u64
    }
}

// =============================================================================
// FRAME GEOMETRY
// =============================================================================

/// Byte sizes of one frame slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameGeometry {
    /// Active pixels per line
    pub h_active: u32,
    /// Active lines per frame
    pub v_active: u32,
    /// Bytes per line, aligned to the canvas alignment
    pub stride_bytes: u64,
    /// Body bytes per frame, page aligned, side channel included
    pub body_bytes_per_frame: u64,
    /// Header bytes per frame, page aligned
    pub head_bytes_per_frame: u64,
    /// Page-table bytes per frame, page aligned
    pub table_bytes_per_frame: u64,
}

impl FrameGeometry {
    /// Number of table entries one body slot needs
    pub const fn table_entries(&self) -> u64 {
        pages_for(self.body_bytes_per_frame)
    }

    /// Body bytes that carry pixel payload
    pub const fn payload_bytes(&self) -> u64 {
        self.body_bytes_per_frame - SIDE_CHANNEL_BYTES
    }
}

/// Bytes per line before alignment
fn raw_stride(desc: &FormatDescriptor, width: u64) -> u64 {
    match (desc.format.layout.sampling(), desc.bitdepth, desc.packing) {
        (Sampling::Full444, BitDepth::Eight, _) => width * 3,
        (Sampling::Full444, BitDepth::Ten, _) => width * 4,
        (Sampling::Sub422, BitDepth::Eight, _) => width * 2,
        (Sampling::Sub422, BitDepth::Ten, Packing::Padded) => width * 3,
        (Sampling::Sub422, BitDepth::Ten, Packing::Full) => (width * 5) / 2,
        // Semi-planar luma is one byte per pixel; chroma follows the luma plane
        (Sampling::Sub420, _, _) => width,
    }
}

/// Compute the per-frame geometry for a format and resolution
///
/// `alignment` is the canvas line alignment (32 or 64 bytes depending on
/// the chip) and must be a power of two.
pub fn plan_geometry(
    desc: &FormatDescriptor,
    resolution: Resolution,
    alignment: u64,
) -> Result<FrameGeometry> {
    let Resolution { h_active, v_active } = resolution;

    if h_active == 0 || v_active == 0 {
        return Err(Error::InvalidGeometry {
            reason: "zero active width or height",
        });
    }
    if h_active > MAX_DIMENSION || v_active > MAX_DIMENSION {
        return Err(Error::InvalidGeometry {
            reason: "resolution exceeds write path limit",
        });
    }
    if alignment == 0 || !alignment.is_power_of_two() {
        return Err(Error::InvalidGeometry {
            reason: "alignment must be a power of two",
        });
    }

    let width = h_active as u64;
    let height = v_active as u64;

    let stride_bytes = align_up(raw_stride(desc, width), alignment);

    let luma_bytes = stride_bytes * height;
    let chroma_bytes = if desc.format.layout.is_semi_planar() {
        stride_bytes * height.div_ceil(2)
    } else {
        0
    };
    let body_bytes_per_frame = page_align(luma_bytes + chroma_bytes) + SIDE_CHANNEL_BYTES;

    let head_bytes_per_frame =
        page_align(resolution.pixel_count().div_ceil(PIXELS_PER_HEADER) * HEADER_BYTES);
    let table_bytes_per_frame = page_align(pages_for(body_bytes_per_frame) * TABLE_ENTRY_BYTES);

    Ok(FrameGeometry {
        h_active,
        v_active,
        stride_bytes,
        body_bytes_per_frame,
        head_bytes_per_frame,
        table_bytes_per_frame,
    })
}
