//! # VDIN Error Handling
//!
//! Every planning stage reports failure through [`Error`]. Errors are
//! returned to the (re)plan caller; none are swallowed and none trigger an
//! automatic retry with a smaller ring.

use core::fmt;

use crate::region::RegionKind;
use crate::types::PhysAddr;

// =============================================================================
// RESULT TYPE
// =============================================================================

/// VDIN Result type alias
pub type Result<T> = core::result::Result<T, Error>;

// =============================================================================
// ERROR ENUM
// =============================================================================

/// Planner error type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Implausible resolution or format, rejected before any allocation
    InvalidGeometry {
        /// Why the geometry was rejected
        reason: &'static str,
    },
    /// A backend allocator ran out of memory
    AllocFailure {
        /// Region being reserved when the backend failed
        kind: RegionKind,
        /// Bytes requested from the backend
        requested: u64,
    },
    /// The plan fits the allocator but exceeds the granted pool
    OverBudget {
        /// Total bytes the plan needs
        requested: u64,
        /// Bytes granted to the session
        available: u64,
    },
    /// Requested ring depth does not fit the hardware
    ConfigMismatch {
        /// Requested ring depth
        requested: u32,
        /// Hardware maximum ring depth
        max: u32,
    },
    /// Fewer external body buffers than slots in the ring
    ManualSlotShortfall {
        /// Buffers supplied by the caller
        supplied: u32,
        /// Slots the ring needs
        required: u32,
    },
    /// External buffer address is null
    NullBuffer {
        /// Ring slot the buffer was supplied for
        slot: u32,
    },
    /// External buffer is not page aligned
    Misaligned {
        /// Offending address
        addr: PhysAddr,
    },
    /// A table region cannot hold the entries for one body slot
    TableTooSmall {
        /// Bytes needed for the entries
        required: u64,
        /// Bytes available in the table region
        available: u64,
    },
    /// The physical-to-virtual collaborator could not map a table region
    MappingFailed {
        /// Region base that failed to map
        addr: PhysAddr,
    },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidGeometry { reason } => write!(f, "invalid geometry: {reason}"),
            Self::AllocFailure { kind, requested } => {
                write!(f, "{kind:?} allocation of {requested} bytes failed")
            },
            Self::OverBudget {
                requested,
                available,
            } => write!(
                f,
                "plan needs {requested} bytes but only {available} bytes are granted"
            ),
            Self::ConfigMismatch { requested, max } => {
                write!(f, "ring depth {requested} not supported (hardware max {max})")
            },
            Self::ManualSlotShortfall { supplied, required } => write!(
                f,
                "{supplied} external buffers supplied, ring needs {required}"
            ),
            Self::NullBuffer { slot } => write!(f, "no buffer supplied for slot {slot}"),
            Self::Misaligned { addr } => write!(f, "buffer {addr} is not page aligned"),
            Self::TableTooSmall {
                required,
                available,
            } => write!(
                f,
                "table region holds {available} bytes, {required} bytes required"
            ),
            Self::MappingFailed { addr } => write!(f, "cannot map table region at {addr}"),
        }
    }
}

impl Error {
    /// Check if the error came from a backend running out of memory
    pub const fn is_alloc_failure(&self) -> bool {
        matches!(self, Self::AllocFailure { .. })
    }
}
