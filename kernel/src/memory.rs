//! Address and window primitives shared by the MPU manager and the loader.
//!
//! All addresses in the core are 32-bit device addresses. Host pointers are
//! never used as device addresses; code that needs both carries them side by
//! side (see `loader::load`).

/// Smallest unit the protection hardware can describe, in bytes.
///
/// Every MPU window base and size is a multiple of this granule.
pub const PROTECTION_GRANULE: u32 = 32;

/// A virtual address as seen by applet code (link-time address space).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct VirtAddr(pub u32);

/// A physical device address (flash, SRAM, peripheral space).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct PhysAddr(pub u32);

impl PhysAddr {
    /// Offset the address, failing on wraparound.
    pub fn checked_add(self, offset: u32) -> Option<PhysAddr> {
        self.0.checked_add(offset).map(PhysAddr)
    }

    /// Whether the address sits on a protection-granule boundary.
    pub fn is_granule_aligned(self) -> bool {
        self.0 % PROTECTION_GRANULE == 0
    }
}

/// Round `size` up to the next protection-granule multiple.
///
/// Returns `None` on overflow.
pub fn align_up_to_granule(size: u32) -> Option<u32> {
    let mask = PROTECTION_GRANULE - 1;
    size.checked_add(mask).map(|s| s & !mask)
}

/// One contiguous range of device memory.
///
/// `start` and `size` are non-zero together or both zero; the all-zero value
/// means "absent" and is what disabled region slots and unset framebuffers
/// carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MemoryWindow {
    /// First byte of the window.
    pub start: u32,
    /// Length of the window in bytes.
    pub size: u32,
}

impl MemoryWindow {
    /// The absent window.
    pub const NONE: MemoryWindow = MemoryWindow { start: 0, size: 0 };

    /// Construct a window from its start address and size.
    pub const fn new(start: u32, size: u32) -> Self {
        MemoryWindow { start, size }
    }

    /// Whether the window is the absent value.
    pub fn is_absent(&self) -> bool {
        self.size == 0
    }

    /// Last byte of the window, or `None` when absent or wrapping.
    pub fn limit(&self) -> Option<u32> {
        if self.is_absent() {
            return None;
        }
        self.start.checked_add(self.size - 1)
    }

    /// Whether `[addr, addr + size)` lies entirely inside the window.
    ///
    /// Zero-sized queries and arithmetic overflow are rejected.
    pub fn contains(&self, addr: u32, size: u32) -> bool {
        if self.is_absent() || size == 0 {
            return false;
        }
        let query_last = match addr.checked_add(size - 1) {
            Some(v) => v,
            None => return false,
        };
        match self.limit() {
            Some(limit) => addr >= self.start && query_last <= limit,
            None => false,
        }
    }

    /// Whether both edges of the window sit on protection-granule boundaries.
    pub fn is_granule_aligned(&self) -> bool {
        self.start % PROTECTION_GRANULE == 0 && self.size % PROTECTION_GRANULE == 0
    }
}
