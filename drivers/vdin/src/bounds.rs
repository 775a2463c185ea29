//! # Pool Bounds
//!
//! Final gate of a plan: the head region, the table region and every body
//! slot together must fit the pool granted to the session.

use crate::error::{Error, Result};
use crate::geometry::FrameGeometry;

/// Bytes a plan occupies
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlanFootprint {
    /// Shared head region, all slots
    pub head_bytes: u64,
    /// Shared table region, all slots (zero without table addressing)
    pub table_bytes: u64,
    /// One body slot
    pub body_bytes: u64,
    /// Ring depth
    pub count: u32,
}

impl PlanFootprint {
    /// Footprint of `count` slots of `geometry`
    pub fn new(geometry: &FrameGeometry, count: u32, with_tables: bool) -> Self {
        let count64 = count as u64;
        Self {
            head_bytes: geometry.head_bytes_per_frame * count64,
            table_bytes: if with_tables {
                geometry.table_bytes_per_frame * count64
            } else {
                0
            },
            body_bytes: geometry.body_bytes_per_frame,
            count,
        }
    }

    /// Head plus table bytes
    pub fn shared_bytes(&self) -> Result<u64> {
        self.head_bytes
            .checked_add(self.table_bytes)
            .ok_or(Error::InvalidGeometry {
                reason: "plan size overflows",
            })
    }

    /// `head + table + count * body`
    pub fn total(&self) -> Result<u64> {
        (self.count as u64)
            .checked_mul(self.body_bytes)
            .and_then(|bodies| bodies.checked_add(self.shared_bytes().ok()?))
            .ok_or(Error::InvalidGeometry {
                reason: "plan size overflows",
            })
    }
}

/// Reject a plan whose footprint exceeds `pool_budget`
pub fn validate(footprint: &PlanFootprint, pool_budget: u64) -> Result<()> {
    let requested = footprint.total()?;
    if requested > pool_budget {
        log::error!(
            "vdin: plan needs {:#x} bytes, pool grants {:#x}",
            requested,
            pool_budget
        );
        return Err(Error::OverBudget {
            requested,
            available: pool_budget,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const FOOTPRINT: PlanFootprint = PlanFootprint {
        head_bytes: 0x10000 * 4,
        table_bytes: 0x1000 * 4,
        body_bytes: 0x3F6000,
        count: 4,
    };

    #[test]
    fn test_total_counts_each_body_once() {
        assert_eq!(FOOTPRINT.total().unwrap(), 0x44000 + 4 * 0x3F6000);
    }

    #[test]
    fn test_budget_boundary() {
        let total = FOOTPRINT.total().unwrap();
        assert!(validate(&FOOTPRINT, total).is_ok());
        assert_eq!(
            validate(&FOOTPRINT, total - 1),
            Err(Error::OverBudget {
                requested: total,
                available: total - 1
            })
        );
    }

    #[test]
    fn test_exceeding_by_one_byte_fails() {
        let budget = 0x100000;
        let fits = PlanFootprint {
            head_bytes: 0x1000,
            table_bytes: 0x1000,
            body_bytes: 0x1000,
            count: budget / 0x1000 - 2,
        };
        assert_eq!(fits.total().unwrap(), budget as u64);
        assert!(validate(&fits, budget as u64).is_ok());

        let over = PlanFootprint {
            head_bytes: fits.head_bytes + 1,
            ..fits
        };
        assert!(matches!(
            validate(&over, budget as u64),
            Err(Error::OverBudget { requested, .. }) if requested == budget as u64 + 1
        ));
    }

    #[test]
    fn test_overflow_is_rejected() {
        let huge = PlanFootprint {
            head_bytes: u64::MAX,
            table_bytes: 1,
            body_bytes: 1,
            count: 1,
        };
        assert!(matches!(huge.total(), Err(Error::InvalidGeometry { .. })));
    }
}
