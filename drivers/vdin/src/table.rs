//! # AFBC Page Tables
//!
//! Without an IOMMU the AFBC encoder locates body pages through a flat
//! table per slot: entry `k` holds the page frame number of body byte
//! `k * 4096`, truncated to the 20-bit field the DMA engine reads.
//!
//! ```text
//!   table[k] = ((body_addr + k * 4096) >> 12) & 0xF_FFFF      (u32, LE)
//! ```
//!
//! Tables are rebuilt in full on every (re)plan and never touched on the
//! per-frame capture path.

use crate::backend::PhysMapper;
use crate::error::{Error, Result};
use crate::geometry::TABLE_ENTRY_BYTES;
use crate::ring::{FrameRing, FrameSlot};
use crate::types::{pages_for, PhysAddr, PAGE_SIZE};

/// Width mask of the hardware page-number field
pub const PFN_MASK: u32 = 0x000F_FFFF;

/// One 32-bit table word
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct PageTableEntry(u32);

static_assertions::assert_eq_size!(PageTableEntry, u32);
static_assertions::const_assert_eq!(core::mem::size_of::<PageTableEntry>() as u64, TABLE_ENTRY_BYTES);

impl PageTableEntry {
    /// Entry for the page holding `addr`
    pub const fn for_page(addr: PhysAddr) -> Self {
        Self((addr.page_number() as u32) & PFN_MASK)
    }

    /// Raw table word
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Decode a little-endian table word
    pub fn from_le_bytes(bytes: [u8; 4]) -> Self {
        Self(u32::from_le_bytes(bytes))
    }
}

/// Fill one slot's table with the page numbers of its body
///
/// `table` is exactly the slot's table region. Bytes past the last entry
/// are cleared.
pub fn fill_slot_table(table: &mut [u8], body_addr: PhysAddr, body_bytes: u64) -> Result<usize> {
    let entries = pages_for(body_bytes) as usize;
    let required = entries as u64 * TABLE_ENTRY_BYTES;
    if (table.len() as u64) < required {
        return Err(Error::TableTooSmall {
            required,
            available: table.len() as u64,
        });
    }

    let (used, tail) = table.split_at_mut(required as usize);
    for (k, word) in used.chunks_exact_mut(TABLE_ENTRY_BYTES as usize).enumerate() {
        let entry = PageTableEntry::for_page(body_addr + k as u64 * PAGE_SIZE);
        word.copy_from_slice(&entry.raw().to_le_bytes());
    }
    tail.fill(0);

    Ok(entries)
}

/// Build the table of every slot in `ring`
///
/// Returns the number of entries written across all slots.
pub fn build_tables(
    ring: &FrameRing,
    body_bytes_per_frame: u64,
    mapper: &mut dyn PhysMapper,
) -> Result<usize> {
    let table_bytes = ring.geometry().table_bytes_per_frame;
    let required = pages_for(body_bytes_per_frame) * TABLE_ENTRY_BYTES;
    if table_bytes < required {
        return Err(Error::TableTooSmall {
            required,
            available: table_bytes,
        });
    }

    let mut written = 0;
    for slot in ring.slots() {
        written += build_slot(slot, table_bytes, body_bytes_per_frame, mapper)?;
    }

    log::debug!(
        "vdin: {} table entries over {} slots",
        written,
        ring.capacity()
    );
    Ok(written)
}

fn build_slot(
    slot: &FrameSlot,
    table_bytes: u64,
    body_bytes: u64,
    mapper: &mut dyn PhysMapper,
) -> Result<usize> {
    if slot.table_addr.is_null() {
        return Err(Error::MappingFailed {
            addr: slot.table_addr,
        });
    }

    let mut outcome = Ok(0);
    mapper.with_mapped(slot.table_addr, table_bytes as usize, &mut |table: &mut [u8]| {
        outcome = fill_slot_table(table, slot.body_addr, body_bytes);
    })?;
    outcome
}
