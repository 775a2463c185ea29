//! # Simulated Platform
//!
//! Host-side stand-ins for the kernel memory backends. One [`SimPlatform`]
//! owns a physical window; the page allocator, contiguous allocator and
//! mapper it hands out all share its state, so a test can inspect
//! outstanding allocations and read table words after a plan.

use alloc::boxed::Box;
use alloc::collections::BTreeMap;
use alloc::sync::Arc;
use alloc::vec;
use alloc::vec::Vec;

use spin::Mutex;

use crate::backend::{BlockHandle, ContiguousAllocator, PageAllocator, PhysMapper};
use crate::error::{Error, Result};
use crate::types::{PhysAddr, PAGE_SHIFT, PAGE_SIZE};

#[derive(Debug)]
struct SimState {
    base: u64,
    size: u64,
    /// addr -> bytes
    outstanding: BTreeMap<u64, u64>,
    /// handle -> addr
    blocks: BTreeMap<u64, u64>,
    next_handle: u64,
    page_requests: usize,
    fail_page_at: Option<usize>,
    fail_contiguous: bool,
    bad_frees: usize,
    /// page number -> contents
    memory: BTreeMap<u64, Vec<u8>>,
}

impl SimState {
    /// First-fit placement inside the window
    fn place(&mut self, bytes: u64) -> Option<u64> {
        let mut candidate = self.base;
        for (&addr, &len) in &self.outstanding {
            if addr >= candidate + bytes {
                break;
            }
            candidate = candidate.max(addr + len);
        }
        if candidate + bytes > self.base + self.size {
            return None;
        }
        self.outstanding.insert(candidate, bytes);
        Some(candidate)
    }

    fn is_allocated(&self, addr: u64, len: u64) -> bool {
        self.outstanding
            .range(..=addr)
            .next_back()
            .is_some_and(|(&start, &bytes)| addr + len <= start + bytes)
    }

    fn read_byte(&self, addr: u64) -> u8 {
        self.memory
            .get(&(addr >> PAGE_SHIFT))
            .map_or(0, |page| page[(addr & (PAGE_SIZE - 1)) as usize])
    }

    fn write_byte(&mut self, addr: u64, value: u8) {
        let page = self
            .memory
            .entry(addr >> PAGE_SHIFT)
            .or_insert_with(|| vec![0; PAGE_SIZE as usize]);
        page[(addr & (PAGE_SIZE - 1)) as usize] = value;
    }
}

/// Simulated physical memory window with failure injection
#[derive(Debug, Clone)]
pub struct SimPlatform {
    state: Arc<Mutex<SimState>>,
}

impl SimPlatform {
    /// Window of `size` bytes at `base` (both page aligned)
    pub fn new(base: u64, size: u64) -> Self {
        Self {
            state: Arc::new(Mutex::new(SimState {
                base,
                size,
                outstanding: BTreeMap::new(),
                blocks: BTreeMap::new(),
                next_handle: 1,
                page_requests: 0,
                fail_page_at: None,
                fail_contiguous: false,
                bad_frees: 0,
                memory: BTreeMap::new(),
            })),
        }
    }

    /// Tagged page allocator over the window
    pub fn page_allocator(&self) -> Box<SimPageAllocator> {
        Box::new(SimPageAllocator {
            state: Arc::clone(&self.state),
        })
    }

    /// Contiguous block allocator over the window
    pub fn contiguous_allocator(&self) -> Box<SimContiguousAllocator> {
        Box::new(SimContiguousAllocator {
            state: Arc::clone(&self.state),
        })
    }

    /// Mapper over the window
    pub fn mapper(&self) -> Box<SimMapper> {
        Box::new(SimMapper {
            state: Arc::clone(&self.state),
        })
    }

    /// Make page request number `index` from now (0-based) return null
    pub fn fail_page_request(&self, index: usize) {
        let mut state = self.state.lock();
        state.fail_page_at = Some(state.page_requests + index);
    }

    /// Make every contiguous request fail
    pub fn fail_contiguous(&self, fail: bool) {
        self.state.lock().fail_contiguous = fail;
    }

    /// Live allocations (pages and blocks)
    pub fn outstanding(&self) -> usize {
        self.state.lock().outstanding.len()
    }

    /// Live allocated bytes
    pub fn outstanding_bytes(&self) -> u64 {
        self.state.lock().outstanding.values().sum()
    }

    /// Frees of addresses or handles that were not live
    pub fn bad_frees(&self) -> usize {
        self.state.lock().bad_frees
    }

    /// Read a little-endian word
    pub fn read_u32(&self, addr: PhysAddr) -> u32 {
        let state = self.state.lock();
        let a = addr.raw();
        u32::from_le_bytes([
            state.read_byte(a),
            state.read_byte(a + 1),
            state.read_byte(a + 2),
            state.read_byte(a + 3),
        ])
    }
}

/// Simulated tagged page allocator
#[derive(Debug)]
pub struct SimPageAllocator {
    state: Arc<Mutex<SimState>>,
}

impl PageAllocator for SimPageAllocator {
    fn alloc_pages(&mut self, _tag: &str, page_count: u64) -> PhysAddr {
        let mut state = self.state.lock();
        let request = state.page_requests;
        state.page_requests += 1;
        if state.fail_page_at == Some(request) {
            return PhysAddr::null();
        }
        state
            .place(page_count * PAGE_SIZE)
            .map_or(PhysAddr::null(), PhysAddr::new)
    }

    fn free_pages(&mut self, _tag: &str, addr: PhysAddr) {
        let mut state = self.state.lock();
        if state.outstanding.remove(&addr.raw()).is_none() {
            state.bad_frees += 1;
        }
    }
}

/// Simulated contiguous block allocator
#[derive(Debug)]
pub struct SimContiguousAllocator {
    state: Arc<Mutex<SimState>>,
}

impl ContiguousAllocator for SimContiguousAllocator {
    fn alloc_contiguous(&mut self, byte_count: u64) -> Option<(PhysAddr, BlockHandle)> {
        let mut state = self.state.lock();
        if state.fail_contiguous {
            return None;
        }
        let addr = state.place(byte_count)?;
        let handle = state.next_handle;
        state.next_handle += 1;
        state.blocks.insert(handle, addr);
        Some((PhysAddr::new(addr), BlockHandle(handle)))
    }

    fn free_contiguous(&mut self, handle: BlockHandle) {
        let mut state = self.state.lock();
        match state.blocks.remove(&handle.0) {
            Some(addr) => {
                state.outstanding.remove(&addr);
            },
            None => state.bad_frees += 1,
        }
    }
}

/// Simulated physical-to-virtual mapper
///
/// Only allocated memory can be mapped.
#[derive(Debug)]
pub struct SimMapper {
    state: Arc<Mutex<SimState>>,
}

impl PhysMapper for SimMapper {
    fn with_mapped(
        &mut self,
        addr: PhysAddr,
        len: usize,
        f: &mut dyn FnMut(&mut [u8]),
    ) -> Result<()> {
        let mut state = self.state.lock();
        let base = addr.raw();
        if !state.is_allocated(base, len as u64) {
            return Err(Error::MappingFailed { addr });
        }

        let mut view: Vec<u8> = (0..len as u64).map(|i| state.read_byte(base + i)).collect();
        f(&mut view);
        for (i, byte) in view.into_iter().enumerate() {
            state.write_byte(base + i as u64, byte);
        }
        Ok(())
    }
}
