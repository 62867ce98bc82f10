//! The loader's output: a loaded, isolated applet.

use bitflags::bitflags;

use crate::arena::{AppArena, RamBlock};
use crate::memory::{MemoryWindow, PhysAddr};
use crate::mpu::{MpuPort, RegionManager};

bitflags! {
    /// Host-side rights an applet was granted at load time.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct AppletPrivileges: u32 {
        /// May read the asset storage area.
        const ASSETS = 1 << 0;
        /// May reach the secure element (runs in `Mode::AppSaes`).
        const SECURE_ELEMENT = 1 << 1;
    }
}

/// Memory layout of a loaded applet.
///
/// `code1`/`data1` are the applet's own windows, exclusively owned while
/// loaded. `code2`/`tls` are shared read-only windows onto always-resident
/// helper code/state, borrowed and never owned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppletLayout {
    /// The applet's code window.
    pub code1: MemoryWindow,
    /// The applet's data window (the RAM block).
    pub data1: MemoryWindow,
    /// Shared helper code window.
    pub code2: MemoryWindow,
    /// Shared helper state window.
    pub tls: MemoryWindow,
}

/// Backing storage of `data1`.
///
/// The fixed-layout loader variant writes into RAM the caller already owns;
/// the arena variant owns its block until `unload` returns it.
#[derive(Debug)]
pub enum DataBlock<'a> {
    /// Caller-supplied RAM window.
    Borrowed { base: PhysAddr, bytes: &'a mut [u8] },
    /// Arena-allocated block.
    Owned(RamBlock),
}

impl<'a> DataBlock<'a> {
    /// Device address of the first byte.
    pub fn base(&self) -> PhysAddr {
        match self {
            DataBlock::Borrowed { base, .. } => *base,
            DataBlock::Owned(block) => PhysAddr(block.base()),
        }
    }

    /// The block as a memory window.
    pub fn window(&self) -> MemoryWindow {
        match self {
            DataBlock::Borrowed { base, bytes } => MemoryWindow::new(base.0, bytes.len() as u32),
            DataBlock::Owned(block) => block.window(),
        }
    }

    /// Mutable view of the backing bytes.
    pub fn bytes_mut(&mut self) -> &mut [u8] {
        match self {
            DataBlock::Borrowed { bytes, .. } => bytes,
            DataBlock::Owned(block) => block.bytes_mut(),
        }
    }

    /// Zero every byte.
    pub fn zero(&mut self) {
        self.bytes_mut().fill(0);
    }
}

/// A loaded applet, ready to be scheduled.
///
/// The scheduler calls `RegionManager::set_active_applet(Some(&layout))`
/// before resuming the task and may pass `None` when switching away.
#[derive(Debug)]
pub struct Applet<'a> {
    /// Memory layout; what the MPU applet slots are programmed from.
    pub layout: AppletLayout,
    /// Granted host-side rights.
    pub privileges: AppletPrivileges,
    /// Physical entrypoint.
    pub entry: PhysAddr,
    /// Physical stack window handed to the task primitive.
    pub stack: MemoryWindow,
    /// Static-base pointer for position-independent data access.
    pub static_base: PhysAddr,
    pub(crate) data: Option<DataBlock<'a>>,
}

impl<'a> Applet<'a> {
    /// Tear the applet down.
    ///
    /// Zeroes `data1`, revokes granted privileges, repoints the manager's
    /// applet window at `replacement` (whatever the now-active task needs)
    /// when it still exposes this applet, and returns an arena block to the
    /// arena. Never leaves a stale unprivileged window open.
    pub fn unload<A: AppArena, P: MpuPort>(
        &mut self,
        arena: &mut A,
        mpu: &mut RegionManager<P>,
        replacement: Option<&AppletLayout>,
    ) {
        let mut data = match self.data.take() {
            Some(data) => data,
            None => return, // already unloaded
        };
        data.zero();
        self.privileges = AppletPrivileges::empty();

        if mpu.active_applet() == Some(&self.layout) {
            mpu.set_active_applet(replacement);
        }

        if let DataBlock::Owned(block) = data {
            arena.free(block);
        }
        log::debug!("applet: unloaded, data window {:?}", self.layout.data1);
    }

    /// Whether the applet still owns its data block.
    pub fn is_loaded(&self) -> bool {
        self.data.is_some()
    }
}
