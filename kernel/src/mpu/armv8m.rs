//! ARMv8-M protection-unit register encoding and the hardware port.
//!
//! The encoders are pure functions so the exact register images are unit
//! tested on the host; only `MpuHardware` touches the device.

use super::region::{MemoryType, MpuPort, RegionConfig};

/// MPU register block (SCS).
const MPU_TYPE: u32 = 0xE000_ED90;
/// Control register.
const MPU_CTRL: u32 = 0xE000_ED94;
/// Region number register.
const MPU_RNR: u32 = 0xE000_ED98;
/// Region base address register.
const MPU_RBAR: u32 = 0xE000_ED9C;
/// Region limit address register.
const MPU_RLAR: u32 = 0xE000_EDA0;
/// Memory attribute indirection registers.
const MPU_MAIR0: u32 = 0xE000_EDC0;
const MPU_MAIR1: u32 = 0xE000_EDC4;

// MPU_CTRL bits
const MPU_CTRL_ENABLE: u32 = 1 << 0;
/// Keep the unit armed inside HardFault/NMI handlers.
const MPU_CTRL_HFNMIENA: u32 = 1 << 1;
/// Privileged code falls back to the default memory map.
const MPU_CTRL_PRIVDEFENA: u32 = 1 << 2;

// MPU_RBAR fields
const RBAR_XN: u32 = 1 << 0;
const RBAR_AP_SHIFT: u32 = 1;
const RBAR_SH_SHIFT: u32 = 3;
const RBAR_BASE_MASK: u32 = 0xFFFF_FFE0;

// MPU_RLAR fields
const RLAR_ENABLE: u32 = 1 << 0;
const RLAR_ATTR_SHIFT: u32 = 1;
const RLAR_LIMIT_MASK: u32 = 0xFFFF_FFE0;

/// Attribute index 0: normal memory, write-back, read/write allocate.
pub const ATTR_IDX_NORMAL: u32 = 0;
/// Attribute index 1: device memory, nGnRE.
pub const ATTR_IDX_DEVICE: u32 = 1;

/// MAIR0 image programming both fixed encodings: attr0 = 0xFF (normal
/// WB/WA), attr1 = 0x04 (device nGnRE). Attrs 2-7 stay reserved.
pub const MAIR0_VALUE: u32 = 0x0000_04FF;

/// Attribute index a region's memory-type class selects.
pub const fn attr_index(memory_type: MemoryType) -> u32 {
    match memory_type {
        MemoryType::FlashCode | MemoryType::Ram | MemoryType::FlashData => ATTR_IDX_NORMAL,
        MemoryType::Peripheral => ATTR_IDX_DEVICE,
    }
}

/// Access-permission field: AP[1] = read-only, AP[0] = unprivileged allowed.
const fn access_permission(config: &RegionConfig) -> u32 {
    let ro = if config.writable { 0 } else { 0b10 };
    let unpriv = if config.unprivileged { 0b01 } else { 0 };
    ro | unpriv
}

/// Build the RBAR image for a present region.
pub const fn encode_rbar(config: &RegionConfig) -> u32 {
    let sh = if config.shareable { 0b10 } else { 0b00 };
    let xn = if config.executable { 0 } else { RBAR_XN };
    (config.window.start & RBAR_BASE_MASK)
        | (sh << RBAR_SH_SHIFT)
        | (access_permission(config) << RBAR_AP_SHIFT)
        | xn
}

/// Build the RLAR image for a present region (enable bit set).
pub const fn encode_rlar(config: &RegionConfig) -> u32 {
    // size is non-zero for a present window; subtract first so a window
    // ending at 0xFFFF_FFFF does not wrap.
    let limit = config.window.start + (config.window.size - 1);
    (limit & RLAR_LIMIT_MASK) | (attr_index(config.memory_type) << RLAR_ATTR_SHIFT) | RLAR_ENABLE
}

/// The real protection unit.
pub struct MpuHardware;

impl MpuHardware {
    pub const fn new() -> Self {
        MpuHardware
    }

    fn write_reg(&mut self, addr: u32, value: u32) {
        // SAFETY: addr is one of the SCS MPU registers above; writes to the
        // system control space are 32-bit and have no aliasing requirements.
        unsafe { core::ptr::write_volatile(addr as *mut u32, value) };
    }

    fn barrier(&self) {
        #[cfg(target_arch = "arm")]
        // SAFETY: dsb/isb have no operands and no memory safety impact.
        unsafe {
            core::arch::asm!("dsb", "isb");
        }
    }
}

impl MpuPort for MpuHardware {
    fn write_memory_attributes(&mut self) {
        self.write_reg(MPU_MAIR0, MAIR0_VALUE);
        self.write_reg(MPU_MAIR1, 0);
    }

    fn write_region(&mut self, index: usize, config: Option<&RegionConfig>) {
        self.write_reg(MPU_RNR, index as u32);
        match config {
            Some(config) => {
                self.write_reg(MPU_RBAR, encode_rbar(config));
                self.write_reg(MPU_RLAR, encode_rlar(config));
            }
            None => {
                // Clearing the enable bit is enough; the base is zeroed so
                // a readback never leaks the previous window.
                self.write_reg(MPU_RLAR, 0);
                self.write_reg(MPU_RBAR, 0);
            }
        }
    }

    fn set_enabled(&mut self, enabled: bool) {
        if enabled {
            self.write_reg(MPU_CTRL, MPU_CTRL_ENABLE | MPU_CTRL_PRIVDEFENA | MPU_CTRL_HFNMIENA);
        } else {
            self.write_reg(MPU_CTRL, 0);
        }
        self.barrier();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rbar_encodes_base_permissions_and_xn() {
        let code = RegionConfig::flash_code(0x0810_0000, 0x10_0000);
        let rbar = encode_rbar(&code);
        assert_eq!(rbar & RBAR_BASE_MASK, 0x0810_0000);
        // privileged read-only, executable
        assert_eq!((rbar >> RBAR_AP_SHIFT) & 0b11, 0b10);
        assert_eq!(rbar & RBAR_XN, 0);

        let ram = RegionConfig::ram(0x2000_0000, 0x4_0000).unprivileged();
        let rbar = encode_rbar(&ram);
        // read-write for all, execute-never
        assert_eq!((rbar >> RBAR_AP_SHIFT) & 0b11, 0b01);
        assert_eq!(rbar & RBAR_XN, RBAR_XN);
    }

    #[test]
    fn rlar_encodes_inclusive_limit_and_attr() {
        let ram = RegionConfig::ram(0x2000_0000, 0x4_0000);
        let rlar = encode_rlar(&ram);
        assert_eq!(rlar & RLAR_LIMIT_MASK, 0x2003_FFE0);
        assert_eq!((rlar >> RLAR_ATTR_SHIFT) & 0b111, ATTR_IDX_NORMAL);
        assert_eq!(rlar & RLAR_ENABLE, RLAR_ENABLE);

        let dev = RegionConfig::peripheral(0x4000_0000, 0x1000_0000);
        assert_eq!((encode_rlar(&dev) >> RLAR_ATTR_SHIFT) & 0b111, ATTR_IDX_DEVICE);
    }

    #[test]
    fn rlar_handles_window_ending_at_address_space_top() {
        let ram = RegionConfig::ram(0xFFFF_FFE0, 0x20);
        let rlar = encode_rlar(&ram);
        assert_eq!(rlar & RLAR_LIMIT_MASK, 0xFFFF_FFE0);
        assert_eq!(rlar & RLAR_ENABLE, RLAR_ENABLE);
    }

    #[test]
    fn shareable_regions_set_sh_field() {
        let dev = RegionConfig::peripheral(0x4000_0000, 0x1000);
        assert_eq!((encode_rbar(&dev) >> RBAR_SH_SHIFT) & 0b11, 0b10);
    }
}
