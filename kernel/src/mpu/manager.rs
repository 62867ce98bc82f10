//! MPU region manager.
//!
//! Owns the eight protection-region slots: programs the fixed slots once at
//! init, then rebanks slot 5 (framebuffer), slot 6 (mode window) and slot 7
//! (peripherals) on every mode switch, and slots 2-4 on every active-applet
//! change. All mutation happens inside `sync::without_interrupts`; the
//! manager is also reached from the tick handler.
//!
//! Every entry point silently no-ops until `init` has run. Interrupt
//! handlers may legitimately fire before the manager is ready, and "called
//! too early" must not be confused with a real error.

use super::layout;
use super::region::{slot, MpuPort, RegionConfig, RegionTable, REGION_COUNT};
use crate::loader::applet::AppletLayout;
use crate::memory::MemoryWindow;
use crate::sync::without_interrupts;

/// Operating context the unit is configured for.
///
/// Exactly one mode is active at a time; switching is the only way the
/// banked slots 5-7 change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Unit off; also the state right after `init`.
    Disabled,
    /// Kernel default.
    Default,
    /// Applet executing.
    App,
    /// Applet executing with secure-element access.
    AppSaes,
    /// Reading the board-capabilities header.
    BoardCaps,
    /// Accepting a bootloader update image.
    BootUpdate,
    /// One-time-programmable area access.
    Otp,
    /// Reading the secret area.
    Secret,
    /// Reading/writing the config storage banks.
    Storage,
    /// Reading the asset area.
    Assets,
    /// Reading the boot-argument RAM.
    BootArgs,
}

impl Mode {
    /// Applet-execution modes expose the framebuffer unprivileged.
    fn is_applet_mode(self) -> bool {
        matches!(self, Mode::App | Mode::AppSaes)
    }

    /// Slot-6 window for this mode.
    ///
    /// The match is exhaustive on purpose: adding a mode without deciding
    /// its window is a compile error.
    fn mode_region(self) -> RegionConfig {
        match self {
            Mode::BoardCaps => RegionConfig::flash_data(
                layout::BOARDCAPS_WINDOW.start,
                layout::BOARDCAPS_WINDOW.size,
            ),
            Mode::BootUpdate => RegionConfig::flash_data(
                layout::BOOTUPDATE_WINDOW.start,
                layout::BOOTUPDATE_WINDOW.size,
            )
            .writable(),
            Mode::Otp => {
                RegionConfig::flash_data(layout::OTP_WINDOW.start, layout::OTP_WINDOW.size)
            }
            Mode::Secret => {
                RegionConfig::flash_data(layout::SECRET_WINDOW.start, layout::SECRET_WINDOW.size)
            }
            Mode::Storage => RegionConfig::flash_data(
                layout::STORAGE_WINDOW.start,
                layout::STORAGE_WINDOW.size,
            )
            .writable(),
            Mode::BootArgs => {
                RegionConfig::ram(layout::BOOTARGS_WINDOW.start, layout::BOOTARGS_WINDOW.size)
            }
            // Asset access is the default: assets are the least sensitive
            // class of privileged flash, and the display path reads them
            // from every context.
            Mode::Disabled | Mode::Default | Mode::App | Mode::AppSaes | Mode::Assets => {
                RegionConfig::flash_data(layout::ASSETS_WINDOW.start, layout::ASSETS_WINDOW.size)
            }
        }
    }

    /// Slot-7 window for this mode. Boot-update is the one mode that must
    /// reach the non-secure flash controller.
    fn peripheral_region(self) -> RegionConfig {
        let window = match self {
            Mode::BootUpdate => layout::PERIPHERALS_WIDE_WINDOW,
            _ => layout::PERIPHERALS_WINDOW,
        };
        RegionConfig::peripheral(window.start, window.size)
    }
}

/// The region manager.
///
/// One explicitly-owned instance per firmware image; firmware that shares it
/// between task and interrupt context wraps it in `sync::IrqMutex`.
pub struct RegionManager<P: MpuPort> {
    port: P,
    table: RegionTable,
    mode: Mode,
    initialized: bool,
    enabled: bool,
    framebuffer: MemoryWindow,
    active_applet: Option<AppletLayout>,
}

impl<P: MpuPort> RegionManager<P> {
    /// Create an uninitialized manager around a hardware port.
    pub const fn new(port: P) -> Self {
        RegionManager {
            port,
            table: RegionTable::empty(),
            mode: Mode::Disabled,
            initialized: false,
            enabled: false,
            framebuffer: MemoryWindow::NONE,
            active_applet: None,
        }
    }

    /// Program the fixed regions and leave the unit disabled.
    ///
    /// Idempotent: a second call changes nothing.
    pub fn init(&mut self) {
        if self.initialized {
            return;
        }
        without_interrupts(|| {
            self.port.set_enabled(false);
            self.port.write_memory_attributes();
            for (index, region) in layout::FIXED_REGIONS.iter().enumerate() {
                self.write_slot(index, *region);
            }
            for index in layout::FIXED_REGIONS.len()..REGION_COUNT {
                self.write_slot(index, None);
            }
            self.mode = Mode::Disabled;
            self.enabled = false;
            self.initialized = true;
        });
        log::debug!("mpu: initialized, unit disabled");
    }

    /// Current mode; `Disabled` before init.
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Shadow of the hardware slots, for diagnostics.
    pub fn regions(&self) -> &RegionTable {
        &self.table
    }

    /// Layout the applet slots currently expose, if any.
    pub fn active_applet(&self) -> Option<&AppletLayout> {
        self.active_applet.as_ref()
    }

    /// Switch to `mode`, returning the previous mode.
    ///
    /// Callers that sandwich a one-shot privileged operation inside a
    /// lower-privilege context keep the returned mode and `restore` it
    /// afterwards.
    pub fn reconfig(&mut self, mode: Mode) -> Mode {
        if !self.initialized {
            return Mode::Disabled;
        }
        let previous = without_interrupts(|| {
            self.port.set_enabled(false);
            self.write_slot(slot::FRAMEBUFFER, self.framebuffer_region(mode));
            self.write_slot(slot::MODE, Some(mode.mode_region()));
            self.write_slot(slot::PERIPHERALS, Some(mode.peripheral_region()));
            let enable = mode != Mode::Disabled;
            self.port.set_enabled(enable);
            self.enabled = enable;
            core::mem::replace(&mut self.mode, mode)
        });
        log::trace!("mpu: reconfig {previous:?} -> {mode:?}");
        previous
    }

    /// `reconfig` called for its side effect only.
    pub fn restore(&mut self, mode: Mode) {
        self.reconfig(mode);
    }

    /// Point slots 2-4 at `layout`'s windows with unprivileged access, or
    /// disable them. Slots 0/1/5/6/7 are untouched; the unit is re-enabled
    /// iff it was enabled before the call.
    pub fn set_active_applet(&mut self, layout: Option<&AppletLayout>) {
        if !self.initialized {
            return;
        }
        without_interrupts(|| {
            let was_enabled = self.enabled;
            self.port.set_enabled(false);
            match layout {
                Some(layout) => {
                    self.write_slot(
                        slot::APPLET_CODE,
                        window_region(layout.code1, applet_code_region),
                    );
                    self.write_slot(
                        slot::APPLET_DATA,
                        window_region(layout.data1, applet_data_region),
                    );
                    self.write_slot(
                        slot::APPLET_HELPER,
                        window_region(layout.code2, applet_code_region),
                    );
                    self.active_applet = Some(layout.clone());
                }
                None => {
                    self.write_slot(slot::APPLET_CODE, None);
                    self.write_slot(slot::APPLET_DATA, None);
                    self.write_slot(slot::APPLET_HELPER, None);
                    self.active_applet = None;
                }
            }
            if was_enabled {
                self.port.set_enabled(true);
            }
        });
    }

    /// Record the framebuffer window and rebank slot 5 for the current mode.
    pub fn set_active_framebuffer(&mut self, addr: u32, size: u32) {
        if !self.initialized {
            return;
        }
        without_interrupts(|| {
            let was_enabled = self.enabled;
            self.framebuffer = MemoryWindow::new(addr, size);
            self.port.set_enabled(false);
            self.write_slot(slot::FRAMEBUFFER, self.framebuffer_region(self.mode));
            if was_enabled {
                self.port.set_enabled(true);
            }
        });
    }

    /// Whether `[addr, addr + size)` lies inside the active framebuffer.
    pub fn inside_active_framebuffer(&self, addr: u32, size: u32) -> bool {
        self.initialized && self.framebuffer.contains(addr, size)
    }

    /// Whether `[addr, addr + size)` lies inside the active applet's own
    /// windows (`code1` or `data1`). Used by the syscall layer to vet
    /// applet-supplied buffers.
    pub fn inside_active_applet(&self, addr: u32, size: u32) -> bool {
        if !self.initialized {
            return false;
        }
        match &self.active_applet {
            Some(layout) => {
                layout.code1.contains(addr, size) || layout.data1.contains(addr, size)
            }
            None => false,
        }
    }

    fn framebuffer_region(&self, mode: Mode) -> Option<RegionConfig> {
        if self.framebuffer.is_absent() {
            return None;
        }
        let mut region = RegionConfig::ram(self.framebuffer.start, self.framebuffer.size);
        if mode.is_applet_mode() {
            region = region.unprivileged();
        }
        Some(region)
    }

    fn write_slot(&mut self, index: usize, config: Option<RegionConfig>) {
        self.port.write_region(index, config.as_ref());
        self.table.set(index, config);
    }
}

/// Unprivileged read+execute region over an applet code window.
fn applet_code_region(window: MemoryWindow) -> RegionConfig {
    RegionConfig::flash_code(window.start, window.size).unprivileged()
}

/// Unprivileged read+write region over an applet data window.
fn applet_data_region(window: MemoryWindow) -> RegionConfig {
    RegionConfig::ram(window.start, window.size).unprivileged()
}

fn window_region(
    window: MemoryWindow,
    build: fn(MemoryWindow) -> RegionConfig,
) -> Option<RegionConfig> {
    if window.is_absent() {
        None
    } else {
        Some(build(window))
    }
}
