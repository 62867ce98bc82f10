//! Region table: the 8 hardware protection-region slots and their
//! configuration values.
//!
//! This is pure configuration state. The slot assignment is fixed at build
//! time; after `RegionManager::init` only the banked slots (framebuffer,
//! mode window, peripherals) and the active-applet slots are rewritten.

use crate::memory::MemoryWindow;

/// Number of protection-region slots the hardware provides.
pub const REGION_COUNT: usize = 8;

/// Fixed slot assignment.
///
/// Slots 0 and 1 are programmed once at init and never touched again.
/// Slots 2-4 are banked on the active applet, slots 5-7 on the active
/// mode/framebuffer.
pub mod slot {
    /// Resident kernel/firmware code in flash.
    pub const KERNEL_CODE: usize = 0;
    /// Resident kernel/firmware RAM.
    pub const KERNEL_RAM: usize = 1;
    /// Active applet code (`code1`).
    pub const APPLET_CODE: usize = 2;
    /// Active applet data (`data1`).
    pub const APPLET_DATA: usize = 3;
    /// Always-resident helper code window shared by all applets (`code2`).
    pub const APPLET_HELPER: usize = 4;
    /// Active framebuffer.
    pub const FRAMEBUFFER: usize = 5;
    /// Mode-specific window (secret/storage/assets/...).
    pub const MODE: usize = 6;
    /// Peripheral space.
    pub const PERIPHERALS: usize = 7;
}

/// Memory-type class of a region.
///
/// Maps to one of the two global attribute encodings the manager programs at
/// init: everything except `Peripheral` is normal memory, `Peripheral` is
/// device memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryType {
    /// Executable code in flash.
    FlashCode,
    /// SRAM.
    Ram,
    /// Memory-mapped peripherals.
    Peripheral,
    /// Non-executable data kept in flash (assets, capabilities, secrets).
    FlashData,
}

/// Configuration of one region slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegionConfig {
    /// Base and size; granule-aligned when present.
    pub window: MemoryWindow,
    /// Memory-type class (selects the attribute encoding).
    pub memory_type: MemoryType,
    /// Instruction fetch allowed.
    pub executable: bool,
    /// Stores allowed.
    pub writable: bool,
    /// Accessible from unprivileged execution; privileged-only otherwise.
    pub unprivileged: bool,
    /// Shareable between bus masters.
    pub shareable: bool,
}

impl RegionConfig {
    /// Privileged read+execute flash code region.
    pub const fn flash_code(start: u32, size: u32) -> Self {
        RegionConfig {
            window: MemoryWindow::new(start, size),
            memory_type: MemoryType::FlashCode,
            executable: true,
            writable: false,
            unprivileged: false,
            shareable: false,
        }
    }

    /// Privileged read+write SRAM region, execute-never.
    pub const fn ram(start: u32, size: u32) -> Self {
        RegionConfig {
            window: MemoryWindow::new(start, size),
            memory_type: MemoryType::Ram,
            executable: false,
            writable: true,
            unprivileged: false,
            shareable: false,
        }
    }

    /// Privileged read-only flash data region.
    pub const fn flash_data(start: u32, size: u32) -> Self {
        RegionConfig {
            window: MemoryWindow::new(start, size),
            memory_type: MemoryType::FlashData,
            executable: false,
            writable: false,
            unprivileged: false,
            shareable: false,
        }
    }

    /// Privileged read+write device region, execute-never.
    pub const fn peripheral(start: u32, size: u32) -> Self {
        RegionConfig {
            window: MemoryWindow::new(start, size),
            memory_type: MemoryType::Peripheral,
            executable: false,
            writable: true,
            unprivileged: false,
            shareable: true,
        }
    }

    /// Open the region to unprivileged execution.
    pub const fn unprivileged(mut self) -> Self {
        self.unprivileged = true;
        self
    }

    /// Allow stores through the region.
    pub const fn writable(mut self) -> Self {
        self.writable = true;
        self
    }
}

/// Shadow of the hardware region slots.
///
/// `None` means the slot is disabled. The manager keeps this in lockstep
/// with the hardware so mode configurations can be compared bit-for-bit
/// without reading the unit back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegionTable {
    slots: [Option<RegionConfig>; REGION_COUNT],
}

impl RegionTable {
    /// All slots disabled.
    pub const fn empty() -> Self {
        RegionTable {
            slots: [None; REGION_COUNT],
        }
    }

    pub fn get(&self, index: usize) -> Option<&RegionConfig> {
        self.slots.get(index).and_then(|s| s.as_ref())
    }

    pub fn set(&mut self, index: usize, config: Option<RegionConfig>) {
        if index < REGION_COUNT {
            self.slots[index] = config;
        }
    }
}

/// Hardware seam of the region manager.
///
/// The real implementation (`mpu::armv8m::MpuHardware`) pokes the protection
/// unit's registers; tests substitute a recording port and assert on the
/// shadow table instead.
pub trait MpuPort {
    /// Program the two fixed memory-type attribute encodings.
    fn write_memory_attributes(&mut self);

    /// Program one region slot, or disable it when `config` is `None`.
    fn write_region(&mut self, index: usize, config: Option<&RegionConfig>);

    /// Enable or disable the whole unit.
    fn set_enabled(&mut self, enabled: bool);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builders_set_expected_permissions() {
        let code = RegionConfig::flash_code(0x0810_0000, 0x10_0000);
        assert!(code.executable && !code.writable && !code.unprivileged);

        let ram = RegionConfig::ram(0x2000_0000, 0x4_0000).unprivileged();
        assert!(!ram.executable && ram.writable && ram.unprivileged);
        assert_eq!(ram.memory_type, MemoryType::Ram);

        let dev = RegionConfig::peripheral(0x4000_0000, 0x1000_0000);
        assert!(dev.shareable && !dev.executable);
    }

    #[test]
    fn empty_table_has_all_slots_disabled() {
        let table = RegionTable::empty();
        for i in 0..REGION_COUNT {
            assert!(table.get(i).is_none());
        }
    }

    #[test]
    fn out_of_range_slot_access_is_ignored() {
        let mut table = RegionTable::empty();
        table.set(REGION_COUNT, Some(RegionConfig::ram(0, 32)));
        assert!(table.get(REGION_COUNT).is_none());
    }
}
