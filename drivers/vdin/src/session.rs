//! # Capture Session
//!
//! Owns the planner and the ring the capture path reads from. Replans are
//! serialised on the planner lock; the new ring is built while readers
//! still see the old one, then swapped in under the ring write lock.

use spin::{Mutex, RwLock};

use crate::error::Result;
use crate::format::FormatDescriptor;
use crate::geometry::Resolution;
use crate::planner::Planner;
use crate::ring::{FrameRing, FrameSlot, RingInfo};

/// One capture channel's frame-buffer state
#[derive(Debug)]
pub struct CaptureSession {
    planner: Mutex<Planner>,
    current: RwLock<Option<FrameRing>>,
}

impl CaptureSession {
    /// Create an idle session
    pub fn new(planner: Planner) -> Self {
        Self {
            planner: Mutex::new(planner),
            current: RwLock::new(None),
        }
    }

    /// Plan a ring for a new format or resolution and make it current
    ///
    /// On failure the previous ring stays current.
    pub fn replan(&self, format: &FormatDescriptor, resolution: Resolution) -> Result<RingInfo> {
        let mut planner = self.planner.lock();
        let ring = planner.plan(format, resolution)?;
        let info = ring.info();

        let old = self.current.write().replace(ring);
        if let Some(old) = old {
            planner.release(old);
        }
        Ok(info)
    }

    /// Addresses of slot `index` of the current ring
    pub fn slot(&self, index: u32) -> Option<FrameSlot> {
        self.current
            .read()
            .as_ref()
            .and_then(|ring| ring.slot(index).copied())
    }

    /// Buffer description of the current ring
    pub fn ring_info(&self) -> Option<RingInfo> {
        self.current.read().as_ref().map(FrameRing::info)
    }

    /// Check if a ring is current
    pub fn is_active(&self) -> bool {
        self.current.read().is_some()
    }

    /// Release the current ring
    pub fn stop(&self) {
        let mut planner = self.planner.lock();
        let ring = self.current.write().take();
        match ring {
            Some(ring) => planner.release(ring),
            None => log::debug!("vdin: stop with no ring"),
        }
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        if let Some(ring) = self.current.get_mut().take() {
            self.planner.get_mut().release(ring);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Chip, PlannerConfig, MIB};
    use crate::error::Error;
    use crate::format::PixelFormat;
    use crate::region::Strategy;
    use crate::sim::SimPlatform;

    fn session(budget: u64) -> (CaptureSession, SimPlatform) {
        let sim = SimPlatform::new(0x4000_0000, 256 * MIB);
        let planner = Planner::new(
            PlannerConfig::for_chip(Chip::Txlx, budget),
            Strategy::Contiguous(sim.contiguous_allocator()),
            sim.mapper(),
        )
        .unwrap();
        (CaptureSession::new(planner), sim)
    }

    #[test]
    fn test_replan_swaps_rings() {
        let (session, sim) = session(128 * MIB);
        let format = FormatDescriptor::eight_bit(PixelFormat::YUV422);
        assert!(session.slot(0).is_none());

        let sd = session.replan(&format, Resolution::new(720, 480)).unwrap();
        assert_eq!(sd.buf_count, 5);
        assert_eq!(sd.buf_width, 1440);
        assert_eq!(sim.outstanding(), 1);

        let hd = session
            .replan(&format, Resolution::new(1920, 1080))
            .unwrap();
        assert_eq!(hd.buf_width, 3840);
        assert_eq!(session.ring_info(), Some(hd));
        // Old block released after the swap
        assert_eq!(sim.outstanding(), 1);

        session.stop();
        assert!(!session.is_active());
        assert_eq!(sim.outstanding(), 0);
    }

    #[test]
    fn test_failed_replan_keeps_old_ring() {
        let (session, sim) = session(8 * MIB);
        let format = FormatDescriptor::eight_bit(PixelFormat::YUV422);

        let sd = session.replan(&format, Resolution::new(720, 480)).unwrap();
        let slot = session.slot(2).unwrap();

        let err = session
            .replan(&format, Resolution::new(1920, 1080))
            .unwrap_err();
        assert!(matches!(err, Error::OverBudget { .. }));

        assert_eq!(session.ring_info(), Some(sd));
        assert_eq!(session.slot(2), Some(slot));
        assert_eq!(sim.outstanding(), 1);
    }

    #[test]
    fn test_drop_releases_ring() {
        let (session, sim) = session(128 * MIB);
        session
            .replan(
                &FormatDescriptor::eight_bit(PixelFormat::NV12),
                Resolution::new(1280, 720),
            )
            .unwrap();
        session.stop();
        session.stop();

        session
            .replan(
                &FormatDescriptor::eight_bit(PixelFormat::NV21),
                Resolution::new(1280, 720),
            )
            .unwrap();
        drop(session);
        assert_eq!(sim.outstanding(), 0);
    }
}
