//! # VDIN Frame-Buffer Planner
//!
//! Physical memory layout for the AFBC-compressed capture ring of the VDIN
//! video input block.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        Capture Session                          │
//! │              (replan lock, current ring publication)            │
//! │                              │                                  │
//! │  ┌───────────────────────────┴───────────────────────────────┐  │
//! │  │                         Planner                           │  │
//! │  │   geometry → reserve → ring → page tables → pool bounds   │  │
//! │  └───────────────────────────────────────────────────────────┘  │
//! │           │                      │                    │         │
//! │  ┌────────┴────────┐  ┌──────────┴────────┐  ┌────────┴──────┐  │
//! │  │ Region Allocator│  │    Frame Ring     │  │  Table Builder│  │
//! │  │ Pooled / CMA /  │  │ N slots: head,    │  │  PFN per body │  │
//! │  │ Manual          │  │ body, table addr  │  │  page         │  │
//! │  └─────────────────┘  └───────────────────┘  └───────────────┘  │
//! │           │                                           │         │
//! │  ┌────────┴───────────────────────────────────────────┴──────┐  │
//! │  │      Page allocator · CMA block allocator · phys_to_virt  │  │
//! │  └───────────────────────────────────────────────────────────┘  │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Frame Slot Layout
//!
//! Each slot owns one AFBC header block, one body (compressed payload plus
//! a trailing side-channel page) and, without an IOMMU, one page table that
//! maps the body page by page. Headers and tables of all slots share one
//! region each; bodies are placed per slot.
//!
//! A plan either produces a complete ring or reserves nothing.

#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]
#![warn(clippy::all)]

extern crate alloc;

pub mod backend;
pub mod bounds;
pub mod config;
pub mod error;
pub mod format;
pub mod geometry;
pub mod planner;
pub mod region;
pub mod ring;
pub mod session;
pub mod table;
pub mod types;

#[cfg(any(test, feature = "sim"))]
pub mod sim;

// Re-exports
pub use backend::{BlockHandle, ContiguousAllocator, PageAllocator, PhysMapper};
pub use bounds::PlanFootprint;
pub use config::{
    AddressingMode, CapturePort, Chip, CmaFlags, MemoryProperties, PlannerConfig,
    RingDepthConfig, SkipPolicy, HW_MAX_SLOTS,
};
pub use error::{Error, Result};
pub use format::{BitDepth, ColorSpace, FormatDescriptor, Packing, PixelFormat, PixelLayout};
pub use geometry::{plan_geometry, FrameGeometry, Resolution};
pub use planner::{slot_addresses, Planner};
pub use region::{MemoryPool, Region, RegionKind, SharedBackend, Strategy, StrategyKind};
pub use ring::{required_slot_count, FrameRing, FrameSlot, RingInfo};
pub use session::CaptureSession;
pub use types::{PhysAddr, PAGE_SIZE};
