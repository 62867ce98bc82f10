//! Applet RAM arena interface.
//!
//! The arena is an external collaborator: a RAM allocator dedicated to
//! applet working memory, separate from the kernel heap. The loader only
//! needs `alloc`/`free` plus the free-space accounting its tests assert on.

use core::ptr::NonNull;

use crate::memory::MemoryWindow;

/// Allocation class, so the arena can place different uses in different
/// banks (e.g. framebuffers in write-combined RAM).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArenaClass {
    /// Applet data/BSS/stack block.
    AppletData,
    /// Display framebuffer.
    Framebuffer,
}

/// An allocated block: its device address plus a host-accessible view of
/// the backing bytes.
///
/// The block is exclusively owned by its holder from `alloc` to `free`;
/// the MPU window over `data1` is what enforces this at run time.
#[derive(Debug)]
pub struct RamBlock {
    base: u32,
    len: u32,
    ptr: NonNull<u8>,
}

impl RamBlock {
    /// Build a block handle. `ptr` must point at `len` bytes that stay
    /// valid and exclusively reachable through this handle until `free`.
    pub fn new(base: u32, len: u32, ptr: NonNull<u8>) -> Self {
        RamBlock { base, len, ptr }
    }

    /// Device address of the first byte.
    pub fn base(&self) -> u32 {
        self.base
    }

    /// The block as a memory window.
    pub fn window(&self) -> MemoryWindow {
        MemoryWindow::new(self.base, self.len)
    }

    /// Mutable view of the backing bytes.
    pub fn bytes_mut(&mut self) -> &mut [u8] {
        // SAFETY: `new`'s contract gives this handle exclusive access to
        // `len` valid bytes at `ptr` for its whole lifetime.
        unsafe { core::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len as usize) }
    }
}

// SAFETY: the handle is the sole owner of the bytes it points at.
unsafe impl Send for RamBlock {}

/// The arena allocator the loader draws applet RAM from.
pub trait AppArena {
    /// Allocate `size` bytes, granule-aligned. `None` on exhaustion.
    fn alloc(&mut self, size: u32, class: ArenaClass) -> Option<RamBlock>;

    /// Return a block. The loader zeroes blocks before freeing them.
    fn free(&mut self, block: RamBlock);

    /// Remaining capacity, for leak accounting.
    fn free_bytes(&self) -> u32;
}
