//! # Planner Configuration
//!
//! Everything that used to live in module-level globals (canvas alignment,
//! ring depth limits, pool size) is carried by [`PlannerConfig`] and passed
//! into each planning call.

use crate::error::{Error, Result};
use crate::region::StrategyKind;

// =============================================================================
// LIMITS
// =============================================================================

/// Hardware ring depth of the VDIN write path
pub const HW_MAX_SLOTS: u32 = 9;

/// Storage capacity of a frame ring; no chip exceeds this depth
pub const RING_CAPACITY: usize = 16;

/// Ring depth used when the platform does not configure one
pub const DEFAULT_MIN_SLOTS: u32 = 4;

/// Bytes in one MiB, the unit of the `cma_size` property
pub const MIB: u64 = 1024 * 1024;

static_assertions::const_assert!(HW_MAX_SLOTS as usize <= RING_CAPACITY);

// =============================================================================
// CHIP
// =============================================================================

/// SoC generation hosting the capture block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Chip {
    /// GXBB
    Gxbb,
    /// GXL
    Gxl,
    /// GXM
    Gxm,
    /// TXL
    Txl,
    /// TXLX
    Txlx,
    /// G12A
    G12a,
}

impl Chip {
    /// Line alignment required by the write path
    pub const fn canvas_alignment(self) -> u64 {
        match self {
            Self::G12a => 64,
            Self::Gxbb | Self::Gxl | Self::Gxm | Self::Txl | Self::Txlx => 32,
        }
    }
}

// =============================================================================
// ADDRESSING MODE
// =============================================================================

/// How the AFBC encoder locates body pages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressingMode {
    /// Bodies are reached through the IOMMU; no table regions
    Mmu,
    /// Bodies are reached through a software page table per slot
    PageTable,
}

impl AddressingMode {
    /// Check if table regions must be reserved and filled
    pub const fn needs_tables(self) -> bool {
        matches!(self, Self::PageTable)
    }
}

// =============================================================================
// RING DEPTH
// =============================================================================

/// Capture input port
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CapturePort {
    /// HDMI receiver port
    Hdmi(u8),
    /// Composite video input
    Cvbs(u8),
    /// Analog tuner
    Tuner,
    /// Internal video loopback
    Viu,
}

impl CapturePort {
    /// Check if the port drops its leading frames after signal lock
    pub const fn drops_leading_frames(self) -> bool {
        matches!(self, Self::Hdmi(_))
    }
}

/// Frame skipping applied after a (re)start
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SkipPolicy {
    /// Port being captured
    pub port: CapturePort,
    /// Low-latency mode forces a single skipped frame
    pub game_mode: bool,
    /// Frames the front end asks to skip
    pub skip_frames: u32,
}

impl SkipPolicy {
    /// Extra slots needed to absorb skipped frames
    pub const fn margin(&self, hardware_max_slots: u32) -> u32 {
        if !self.port.drops_leading_frames() {
            return 0;
        }
        let skip = if self.game_mode { 1 } else { self.skip_frames };
        if skip >= hardware_max_slots {
            0
        } else {
            skip
        }
    }
}

/// Inputs of the ring depth computation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RingDepthConfig {
    /// Slots the consumer needs in rotation
    pub configured_minimum: u32,
    /// Deferred register updates (RDMA) hold one extra slot
    pub rdma_enabled: bool,
    /// Frames skipped after start
    pub skip_frames: u32,
    /// Hardware ring depth limit
    pub hardware_max_slots: u32,
}

impl RingDepthConfig {
    /// Create a depth config with no margins
    pub const fn new(configured_minimum: u32, hardware_max_slots: u32) -> Self {
        Self {
            configured_minimum,
            rdma_enabled: false,
            skip_frames: 0,
            hardware_max_slots,
        }
    }

    /// Enable or disable the RDMA margin
    pub const fn with_rdma(mut self, enabled: bool) -> Self {
        self.rdma_enabled = enabled;
        self
    }

    /// Apply a port skip policy
    pub const fn with_skip_policy(mut self, policy: &SkipPolicy) -> Self {
        self.skip_frames = policy.margin(self.hardware_max_slots);
        self
    }

    /// One slot when RDMA is enabled
    pub const fn rdma_margin(&self) -> u32 {
        if self.rdma_enabled {
            1
        } else {
            0
        }
    }
}

impl Default for RingDepthConfig {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_SLOTS, HW_MAX_SLOTS).with_rdma(true)
    }
}

// =============================================================================
// PLANNER CONFIG
// =============================================================================

/// Session-wide planner parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlannerConfig {
    /// Canvas line alignment in bytes
    pub alignment: u64,
    /// Ring depth inputs
    pub ring: RingDepthConfig,
    /// Bytes granted to the session
    pub pool_budget: u64,
    /// Body addressing mode
    pub addressing: AddressingMode,
    /// Allocator tag for pooled requests
    pub tag: &'static str,
}

impl PlannerConfig {
    /// Config for a chip with the given pool budget
    pub const fn for_chip(chip: Chip, pool_budget: u64) -> Self {
        Self {
            alignment: chip.canvas_alignment(),
            ring: RingDepthConfig::new(DEFAULT_MIN_SLOTS, HW_MAX_SLOTS).with_rdma(true),
            pool_budget,
            addressing: AddressingMode::PageTable,
            tag: "vdin0",
        }
    }

    /// Replace the ring depth inputs
    pub const fn with_ring(mut self, ring: RingDepthConfig) -> Self {
        self.ring = ring;
        self
    }

    /// Replace the addressing mode
    pub const fn with_addressing(mut self, addressing: AddressingMode) -> Self {
        self.addressing = addressing;
        self
    }

    /// Replace the allocator tag
    pub const fn with_tag(mut self, tag: &'static str) -> Self {
        self.tag = tag;
        self
    }

    /// Check the config against the hardware limits
    pub fn validate(&self) -> Result<()> {
        if self.alignment == 0 || !self.alignment.is_power_of_two() {
            return Err(Error::InvalidGeometry {
                reason: "alignment must be a power of two",
            });
        }
        let max = self.ring.hardware_max_slots;
        if max == 0 || max as usize > RING_CAPACITY {
            return Err(Error::ConfigMismatch {
                requested: max,
                max: RING_CAPACITY as u32,
            });
        }
        Ok(())
    }
}

// =============================================================================
// MEMORY PROPERTIES
// =============================================================================

bitflags::bitflags! {
    /// `flag_cma` device property bits
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct CmaFlags: u32 {
        /// `cma_size` gives the pool size in MiB
        const EXPLICIT_SIZE = 1 << 0;
        /// Allocate every frame separately instead of one block
        const PER_FRAME = 1 << 8;
    }
}

/// Memory properties read from the platform description
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryProperties {
    /// Parsed `flag_cma`
    pub flags: CmaFlags,
    /// `cma_size` in MiB, if present
    pub cma_size_mib: Option<u32>,
    /// Size of the CMA area attached to the device
    pub platform_cma_bytes: u64,
}

impl MemoryProperties {
    /// Build from raw property values; unknown flag bits are ignored
    pub const fn from_raw(flag_cma: u32, cma_size_mib: Option<u32>, platform_cma_bytes: u64) -> Self {
        Self {
            flags: CmaFlags::from_bits_truncate(flag_cma),
            cma_size_mib,
            platform_cma_bytes,
        }
    }

    /// Strategy the session runs with
    pub fn strategy_kind(&self) -> StrategyKind {
        if self.flags.contains(CmaFlags::PER_FRAME) {
            StrategyKind::Pooled
        } else {
            StrategyKind::Contiguous
        }
    }

    /// Bytes granted to the session
    pub fn pool_budget(&self) -> u64 {
        if !self.flags.contains(CmaFlags::EXPLICIT_SIZE) {
            return self.platform_cma_bytes;
        }
        match self.cma_size_mib {
            Some(mib) => mib as u64 * MIB,
            None => {
                log::error!("vdin: flag_cma requests cma_size but none is set");
                self.platform_cma_bytes
            },
        }
    }
}
