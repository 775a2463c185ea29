//! # Frame-Buffer Planner
//!
//! Turns a capture format and resolution into a fully reserved frame ring:
//!
//! ```text
//!   plan_geometry ──► PlanFootprint ──► begin ──► reserve head
//!                                                  reserve table (PageTable)
//!                                                  reserve N bodies
//!                                          ──► FrameRing::build
//!                                          ──► build_tables (PageTable)
//!                                          ──► bounds::validate
//! ```
//!
//! Any stage that fails hands the reservation back to the region allocator
//! before the error is returned, so a failed plan holds no memory.

use alloc::boxed::Box;
use core::fmt;

use crate::backend::PhysMapper;
use crate::bounds::{self, PlanFootprint};
use crate::config::PlannerConfig;
use crate::error::{Error, Result};
use crate::format::FormatDescriptor;
use crate::geometry::{plan_geometry, FrameGeometry, Resolution};
use crate::region::{
    MemoryPool, Region, RegionAllocator, RegionKind, Reservation, Strategy, StrategyKind,
};
use crate::ring::{required_slot_count, FrameRing, FrameSlot, RingRegions};
use crate::table;

/// Addresses of slot `index`, if the ring has one
pub fn slot_addresses(ring: &FrameRing, index: u32) -> Option<FrameSlot> {
    ring.slot(index).copied()
}

/// Plans, builds and releases frame rings for one capture session
pub struct Planner {
    config: PlannerConfig,
    allocator: RegionAllocator,
    mapper: Box<dyn PhysMapper>,
}

impl Planner {
    /// Create a planner over a backend strategy
    pub fn new(
        config: PlannerConfig,
        strategy: Strategy,
        mapper: Box<dyn PhysMapper>,
    ) -> Result<Self> {
        config.validate()?;
        log::debug!(
            "vdin: planner {} ({:?}, {:?}, budget {:#x})",
            config.tag,
            strategy.kind(),
            config.addressing,
            config.pool_budget
        );
        Ok(Self {
            allocator: RegionAllocator::new(strategy, config.tag, config.pool_budget),
            config,
            mapper,
        })
    }

    /// Session parameters
    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    /// Backend strategy
    pub fn strategy(&self) -> StrategyKind {
        self.allocator.kind()
    }

    /// Granted pool description
    pub fn pool(&self) -> MemoryPool {
        self.allocator.pool()
    }

    /// Ring depth derived from the config
    pub fn slot_count(&self) -> u32 {
        required_slot_count(&self.config.ring)
    }

    /// Plan a ring of the configured depth
    pub fn plan(&mut self, format: &FormatDescriptor, resolution: Resolution) -> Result<FrameRing> {
        let depth = self.slot_count();
        self.plan_with_depth(format, resolution, depth)
    }

    /// Plan a ring of exactly `depth` slots
    pub fn plan_with_depth(
        &mut self,
        format: &FormatDescriptor,
        resolution: Resolution,
        depth: u32,
    ) -> Result<FrameRing> {
        let max = self.config.ring.hardware_max_slots;
        if depth == 0 || depth > max {
            return Err(Error::ConfigMismatch {
                requested: depth,
                max,
            });
        }

        let geometry = plan_geometry(format, resolution, self.config.alignment)?;
        let with_tables = self.config.addressing.needs_tables();
        let footprint = PlanFootprint::new(&geometry, depth, with_tables);

        let mut reservation = self.allocator.begin(&footprint)?;
        let regions = match self.reserve_regions(&mut reservation, &geometry, &footprint) {
            Ok(regions) => regions,
            Err(err) => return Err(self.rollback(reservation, err)),
        };

        let ring = match FrameRing::build(regions, depth, reservation) {
            Ok(ring) => ring,
            Err((err, reservation)) => return Err(self.rollback(reservation, err)),
        };

        if let Err(err) = self.finish(&ring, &footprint) {
            return Err(self.rollback(ring.into_reservation(), err));
        }

        log::info!(
            "vdin: planned {} x {}x{} {:?} ({:?}), body {:#x}, stride {}",
            depth,
            geometry.h_active,
            geometry.v_active,
            format.format.layout,
            self.allocator.kind(),
            geometry.body_bytes_per_frame,
            geometry.stride_bytes
        );
        Ok(ring)
    }

    /// Return a ring's memory to the backend
    pub fn release(&mut self, ring: FrameRing) {
        let depth = ring.capacity();
        self.allocator.release(ring.into_reservation());
        log::info!("vdin: released ring of {} slots", depth);
    }

    fn reserve_regions(
        &mut self,
        reservation: &mut Reservation,
        geometry: &FrameGeometry,
        footprint: &PlanFootprint,
    ) -> Result<RingRegions> {
        let head = self
            .allocator
            .reserve(reservation, RegionKind::Head, footprint.head_bytes, 1)?[0];

        let table = if footprint.table_bytes > 0 {
            let base = self
                .allocator
                .reserve(reservation, RegionKind::Table, footprint.table_bytes, 1)?[0];
            Some(Region::new(base, footprint.table_bytes, RegionKind::Table))
        } else {
            None
        };

        let bodies = self.allocator.reserve(
            reservation,
            RegionKind::Body,
            geometry.body_bytes_per_frame,
            footprint.count as usize,
        )?;

        Ok(RingRegions {
            geometry: *geometry,
            head: Region::new(head, footprint.head_bytes, RegionKind::Head),
            table,
            bodies,
        })
    }

    fn finish(&mut self, ring: &FrameRing, footprint: &PlanFootprint) -> Result<()> {
        if self.config.addressing.needs_tables() {
            table::build_tables(
                ring,
                ring.geometry().body_bytes_per_frame,
                self.mapper.as_mut(),
            )?;
        }

        match self.allocator.kind() {
            StrategyKind::Contiguous | StrategyKind::Manual => {
                bounds::validate(footprint, self.config.pool_budget)
            },
            StrategyKind::Pooled => Ok(()),
        }
    }

    fn rollback(&mut self, reservation: Reservation, err: Error) -> Error {
        log::error!(
            "vdin: plan failed: {}; rolling back {} regions",
            err,
            reservation.regions().len()
        );
        self.allocator.release(reservation);
        err
    }
}

impl fmt::Debug for Planner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Planner")
            .field("config", &self.config)
            .field("allocator", &self.allocator)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use alloc::vec::Vec;

    use super::*;
    use crate::config::{AddressingMode, Chip, RingDepthConfig, HW_MAX_SLOTS, MIB};
    use crate::format::PixelFormat;
    use crate::region::SharedBackend;
    use crate::sim::SimPlatform;
    use crate::table::PFN_MASK;
    use crate::types::{PhysAddr, PAGE_SIZE};

    const SD: Resolution = Resolution::new(720, 480);

    fn yuv422() -> FormatDescriptor {
        FormatDescriptor::eight_bit(PixelFormat::YUV422)
    }

    fn pooled(config: PlannerConfig) -> (Planner, SimPlatform) {
        let sim = SimPlatform::new(0x4000_0000, 256 * MIB);
        let planner =
            Planner::new(config, Strategy::Pooled(sim.page_allocator()), sim.mapper()).unwrap();
        (planner, sim)
    }

    fn contiguous(config: PlannerConfig) -> (Planner, SimPlatform) {
        let sim = SimPlatform::new(0x4000_0000, 256 * MIB);
        let planner = Planner::new(
            config,
            Strategy::Contiguous(sim.contiguous_allocator()),
            sim.mapper(),
        )
        .unwrap();
        (planner, sim)
    }

    fn config() -> PlannerConfig {
        PlannerConfig::for_chip(Chip::G12a, 128 * MIB)
    }

    #[test]
    fn test_plan_pooled_ring() {
        let (mut planner, sim) = pooled(config());
        assert_eq!(planner.slot_count(), 5);
        assert_eq!(planner.pool().strategy, StrategyKind::Pooled);
        assert_eq!(planner.pool().tag, "vdin0");

        let ring = planner.plan(&yuv422(), SD).unwrap();
        assert_eq!(ring.capacity(), 5);
        // head + table + one allocation per body
        assert_eq!(sim.outstanding(), 7);

        let slot = slot_addresses(&ring, 4).unwrap();
        assert!(slot.body_addr.is_page_aligned());
        assert!(!slot.table_addr.is_null());
        assert!(slot_addresses(&ring, 5).is_none());

        planner.release(ring);
        assert_eq!(sim.outstanding(), 0);
        assert_eq!(sim.bad_frees(), 0);
    }

    #[test]
    fn test_table_entries_match_body_pages() {
        let (mut planner, sim) = pooled(config());
        let ring = planner.plan(&yuv422(), SD).unwrap();
        let entries = ring.geometry().table_entries();

        for slot in ring.slots() {
            for k in 0..entries {
                let word = sim.read_u32(slot.table_addr + k * 4);
                let expected = (slot.body_addr + k * PAGE_SIZE).page_number() as u32 & PFN_MASK;
                assert_eq!(word, expected, "slot {} entry {}", slot.index, k);
            }
        }
        planner.release(ring);
    }

    #[test]
    fn test_failed_body_leaves_nothing_reserved() {
        let (mut planner, sim) = pooled(config());
        // head, table, body 0, body 1, body 2
        sim.fail_page_request(4);

        let err = planner.plan(&yuv422(), SD).unwrap_err();
        assert!(matches!(
            err,
            Error::AllocFailure {
                kind: RegionKind::Body,
                ..
            }
        ));
        assert_eq!(sim.outstanding(), 0);
        assert_eq!(sim.bad_frees(), 0);

        // The planner is still usable
        let ring = planner.plan(&yuv422(), SD).unwrap();
        planner.release(ring);
        assert_eq!(sim.outstanding(), 0);
    }

    #[test]
    fn test_identical_inputs_give_identical_spacing() {
        fn offsets(ring: &FrameRing) -> Vec<(u64, u64, u64)> {
            let base = ring.head_region().base;
            ring.slots()
                .iter()
                .map(|slot| {
                    (
                        slot.head_addr - base,
                        slot.body_addr - base,
                        slot.table_addr - base,
                    )
                })
                .collect()
        }

        let (mut planner, sim) = contiguous(config());
        let first = planner.plan(&yuv422(), SD).unwrap();
        let second = planner.plan(&yuv422(), SD).unwrap();
        assert_ne!(first.head_region().base, second.head_region().base);
        assert_eq!(offsets(&first), offsets(&second));

        planner.release(first);
        planner.release(second);
        assert_eq!(sim.outstanding(), 0);
    }

    #[test]
    fn test_contiguous_span_covers_ring() {
        let (mut planner, _sim) = contiguous(config());
        let ring = planner.plan(&yuv422(), SD).unwrap();

        let (start, len) = ring.contiguous_span().unwrap();
        assert_eq!(start, ring.head_region().base);
        let last = ring.slot(ring.capacity() - 1).unwrap();
        assert_eq!(last.body_addr + ring.geometry().body_bytes_per_frame, start + len);
        planner.release(ring);
    }

    #[test]
    fn test_over_budget_rolls_back() {
        let (mut planner, sim) = contiguous(PlannerConfig::for_chip(Chip::G12a, MIB));
        let geometry = plan_geometry(&yuv422(), SD, 64).unwrap();
        let requested = PlanFootprint::new(&geometry, 5, true).total().unwrap();

        assert_eq!(
            planner.plan(&yuv422(), SD).unwrap_err(),
            Error::OverBudget {
                requested,
                available: MIB
            }
        );
        assert_eq!(sim.outstanding(), 0);
    }

    #[test]
    fn test_budget_boundary() {
        let geometry = plan_geometry(&yuv422(), SD, 64).unwrap();
        let total = PlanFootprint::new(&geometry, 5, true).total().unwrap();

        let (mut exact, _sim) = contiguous(PlannerConfig::for_chip(Chip::G12a, total));
        let ring = exact.plan(&yuv422(), SD).unwrap();
        exact.release(ring);

        let (mut short, sim) = contiguous(PlannerConfig::for_chip(Chip::G12a, total - 1));
        assert!(matches!(
            short.plan(&yuv422(), SD),
            Err(Error::OverBudget { .. })
        ));
        assert_eq!(sim.outstanding(), 0);
    }

    fn external_bodies() -> Vec<PhysAddr> {
        (0..5u64)
            .map(|i| PhysAddr::new(0x9000_0000 + i * 0x100_0000))
            .collect()
    }

    fn manual_pooled(budget: u64) -> (Planner, SimPlatform) {
        let sim = SimPlatform::new(0x4000_0000, 16 * MIB);
        let strategy = Strategy::Manual {
            shared: SharedBackend::Pooled(sim.page_allocator()),
            bodies: external_bodies(),
        };
        let planner = Planner::new(
            PlannerConfig::for_chip(Chip::Txl, budget),
            strategy,
            sim.mapper(),
        )
        .unwrap();
        (planner, sim)
    }

    #[test]
    fn test_manual_bodies() {
        let bodies = external_bodies();
        let (mut planner, sim) = manual_pooled(8 * MIB);

        let ring = planner.plan(&yuv422(), SD).unwrap();
        let placed: Vec<PhysAddr> = ring.slots().iter().map(|slot| slot.body_addr).collect();
        assert_eq!(placed, bodies);
        assert_eq!(sim.outstanding(), 2);
        assert_eq!(
            sim.read_u32(ring.slot(1).unwrap().table_addr),
            (0x9100_0000u64 >> 12) as u32
        );

        planner.release(ring);
        assert_eq!(sim.outstanding(), 0);
    }

    #[test]
    fn test_manual_budget_counts_bodies() {
        let geometry = plan_geometry(&yuv422(), SD, Chip::Txl.canvas_alignment()).unwrap();
        let total = PlanFootprint::new(&geometry, 5, true).total().unwrap();

        let (mut exact, _sim) = manual_pooled(total);
        let ring = exact.plan(&yuv422(), SD).unwrap();
        exact.release(ring);

        let (mut short, sim) = manual_pooled(total - 1);
        assert_eq!(
            short.plan(&yuv422(), SD).unwrap_err(),
            Error::OverBudget {
                requested: total,
                available: total - 1
            }
        );
        assert_eq!(sim.outstanding(), 0);
    }

    #[test]
    fn test_manual_with_contiguous_shared_block() {
        let sim = SimPlatform::new(0x4000_0000, 16 * MIB);
        let bodies = external_bodies();
        let strategy = Strategy::Manual {
            shared: SharedBackend::Contiguous(sim.contiguous_allocator()),
            bodies: bodies.clone(),
        };
        let config = PlannerConfig::for_chip(Chip::Txl, 8 * MIB).with_tag("vdin1");
        let mut planner = Planner::new(config, strategy, sim.mapper()).unwrap();
        assert_eq!(planner.pool().tag, "vdin1");
        assert_eq!(planner.strategy(), StrategyKind::Manual);

        let ring = planner.plan(&yuv422(), SD).unwrap();
        let geometry = *ring.geometry();

        // One block holding every head and table
        assert_eq!(sim.outstanding(), 1);
        assert_eq!(
            sim.outstanding_bytes(),
            5 * (geometry.head_bytes_per_frame + geometry.table_bytes_per_frame)
        );

        let (block_base, block_len) = ring.contiguous_span().unwrap();
        let block = Region::new(block_base, block_len, RegionKind::Block);
        let head = *ring.head_region();
        let table = *ring.table_region().unwrap();
        assert!(block.contains(head.base) && block.contains(table.base));
        assert_eq!(table.base, head.end());
        assert!(!head.overlaps(&table));

        for (slot, &body) in ring.slots().iter().zip(&bodies) {
            assert_eq!(slot.body_addr, body);
            assert!(table.contains(slot.table_addr));
            assert!(!block.contains(slot.body_addr));
            assert_eq!(sim.read_u32(slot.table_addr), (body.raw() >> 12) as u32);
        }

        planner.release(ring);
        assert_eq!(sim.outstanding(), 0);
        assert_eq!(sim.outstanding_bytes(), 0);
    }

    #[test]
    fn test_contiguous_block_failure_rolls_back() {
        let (mut planner, sim) = contiguous(config());
        sim.fail_contiguous(true);

        let err = planner.plan(&yuv422(), SD).unwrap_err();
        assert!(err.is_alloc_failure());
        assert!(matches!(
            err,
            Error::AllocFailure {
                kind: RegionKind::Block,
                ..
            }
        ));
        assert_eq!(sim.outstanding(), 0);

        sim.fail_contiguous(false);
        let ring = planner.plan(&yuv422(), SD).unwrap();
        planner.release(ring);
        assert_eq!(sim.outstanding(), 0);
    }

    #[test]
    fn test_unmappable_table_rolls_back() {
        let sim = SimPlatform::new(0x4000_0000, 64 * MIB);
        // A mapper over another window cannot reach this one
        let elsewhere = SimPlatform::new(0x8000_0000, 64 * MIB);
        let mut planner = Planner::new(
            config(),
            Strategy::Pooled(sim.page_allocator()),
            elsewhere.mapper(),
        )
        .unwrap();

        let err = planner.plan(&yuv422(), SD).unwrap_err();
        assert!(matches!(err, Error::MappingFailed { addr } if !addr.is_null()));
        assert_eq!(sim.outstanding(), 0);
        assert_eq!(sim.bad_frees(), 0);
    }

    #[test]
    fn test_manual_shortfall() {
        let sim = SimPlatform::new(0x4000_0000, 16 * MIB);
        let strategy = Strategy::Manual {
            shared: SharedBackend::Contiguous(sim.contiguous_allocator()),
            bodies: alloc::vec![PhysAddr::new(0x9000_0000); 3],
        };
        let mut planner = Planner::new(config(), strategy, sim.mapper()).unwrap();

        assert_eq!(
            planner.plan(&yuv422(), SD).unwrap_err(),
            Error::ManualSlotShortfall {
                supplied: 3,
                required: 5
            }
        );
        assert_eq!(sim.outstanding(), 0);
    }

    #[test]
    fn test_mmu_mode_has_no_tables() {
        let (mut planner, sim) = pooled(config().with_addressing(AddressingMode::Mmu));
        let ring = planner.plan(&yuv422(), SD).unwrap();

        assert!(ring.table_region().is_none());
        assert!(ring.slots().iter().all(|slot| slot.table_addr.is_null()));
        assert_eq!(sim.outstanding(), 6);
        planner.release(ring);
    }

    #[test]
    fn test_explicit_depth() {
        let (mut planner, sim) = pooled(config());

        assert_eq!(
            planner.plan_with_depth(&yuv422(), SD, 0).unwrap_err(),
            Error::ConfigMismatch {
                requested: 0,
                max: HW_MAX_SLOTS
            }
        );
        assert!(matches!(
            planner.plan_with_depth(&yuv422(), SD, HW_MAX_SLOTS + 1),
            Err(Error::ConfigMismatch { .. })
        ));

        let ring = planner.plan_with_depth(&yuv422(), SD, 2).unwrap();
        assert_eq!(ring.capacity(), 2);
        planner.release(ring);
        assert_eq!(sim.outstanding(), 0);
    }

    #[test]
    fn test_depth_follows_ring_config() {
        let ring_config = RingDepthConfig {
            configured_minimum: 4,
            rdma_enabled: true,
            skip_frames: 2,
            hardware_max_slots: HW_MAX_SLOTS,
        };
        let (mut planner, _sim) = pooled(config().with_ring(ring_config));
        let ring = planner.plan(&yuv422(), SD).unwrap();
        assert_eq!(ring.capacity(), 7);
        planner.release(ring);
    }

    #[test]
    fn test_invalid_geometry_reserves_nothing() {
        let (mut planner, sim) = contiguous(config());
        assert!(matches!(
            planner.plan(&yuv422(), Resolution::new(0, 1080)),
            Err(Error::InvalidGeometry { .. })
        ));
        assert_eq!(sim.outstanding(), 0);
    }
}
