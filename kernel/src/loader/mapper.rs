//! Virtual-to-physical address mapping for a placed image.
//!
//! Pure translation: a virtual address inside the RO segment's range maps to
//! the code's physical placement, inside the RW segment's range to the RAM
//! block, anywhere else to nothing. The relocation pass funnels every
//! address through here; raw pointer arithmetic never leaves this module's
//! callers.

use super::segments::Segment;
use crate::memory::{PhysAddr, VirtAddr};

/// Translation for the two placed segments.
///
/// Ranges are end-inclusive: `vaddr + mem_size` still translates, because
/// link-time section-end symbols point one past the last byte.
#[derive(Debug, Clone, Copy)]
pub struct SegmentMap {
    ro_vaddr: u32,
    ro_size: u32,
    ro_phys: u32,
    rw_vaddr: u32,
    rw_size: u32,
    rw_phys: u32,
}

impl SegmentMap {
    /// Build the map from the segments and their physical placements.
    pub fn new(ro: &Segment, ro_phys: PhysAddr, rw: &Segment, rw_phys: PhysAddr) -> Self {
        SegmentMap {
            ro_vaddr: ro.vaddr,
            ro_size: ro.mem_size,
            ro_phys: ro_phys.0,
            rw_vaddr: rw.vaddr,
            rw_size: rw.mem_size,
            rw_phys: rw_phys.0,
        }
    }

    /// Translate a virtual address; `None` if it falls in neither segment.
    pub fn phys(&self, va: VirtAddr) -> Option<PhysAddr> {
        if let Some(offset) = range_offset(va.0, self.rw_vaddr, self.rw_size) {
            return Some(PhysAddr(self.rw_phys.wrapping_add(offset)));
        }
        if let Some(offset) = range_offset(va.0, self.ro_vaddr, self.ro_size) {
            return Some(PhysAddr(self.ro_phys.wrapping_add(offset)));
        }
        None
    }

    /// Reverse translation, used by diagnostics.
    pub fn virt(&self, pa: PhysAddr) -> Option<VirtAddr> {
        if let Some(offset) = range_offset(pa.0, self.rw_phys, self.rw_size) {
            return Some(VirtAddr(self.rw_vaddr.wrapping_add(offset)));
        }
        if let Some(offset) = range_offset(pa.0, self.ro_phys, self.ro_size) {
            return Some(VirtAddr(self.ro_vaddr.wrapping_add(offset)));
        }
        None
    }
}

/// Offset of `addr` inside the end-inclusive range `[base, base + size]`.
fn range_offset(addr: u32, base: u32, size: u32) -> Option<u32> {
    let offset = addr.checked_sub(base)?;
    if offset <= size {
        Some(offset)
    } else {
        None
    }
}
