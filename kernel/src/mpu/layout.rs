//! Build-time-fixed protection layout.
//!
//! The core is linked into four firmware images. Each image programs slots
//! 0-4 once at init from its own table; the named windows below are what the
//! banked slots 5-7 are rebuilt from on every mode switch.
//!
//! Flash map (2 MiB part):
//!
//! | Range                       | Contents            |
//! |-----------------------------|---------------------|
//! | 0x0800_0000 + 0x0002_0000   | boardloader         |
//! | 0x0802_0000 + 0x0004_0000   | bootloader          |
//! | 0x0806_0000 + 0x0010_0000   | kernel + firmware   |
//! | 0x0816_0000 + 0x0004_0000   | config storage      |
//! | 0x081A_0000 + 0x0004_0000   | asset storage       |
//! | 0x081E_0000 + 0x0001_0000   | secret area         |

use super::region::RegionConfig;
use crate::memory::MemoryWindow;

/// Board-capabilities header at the start of the boardloader image.
pub const BOARDCAPS_WINDOW: MemoryWindow = MemoryWindow::new(0x0800_0000, 0x200);

/// Bootloader area, exposed writable while staging an update image.
pub const BOOTUPDATE_WINDOW: MemoryWindow = MemoryWindow::new(0x0802_0000, 0x0004_0000);

/// Config/PIN storage banks.
pub const STORAGE_WINDOW: MemoryWindow = MemoryWindow::new(0x0816_0000, 0x0004_0000);

/// Asset storage (fonts, images, translations).
pub const ASSETS_WINDOW: MemoryWindow = MemoryWindow::new(0x081A_0000, 0x0004_0000);

/// Device-secret area at the top of flash.
pub const SECRET_WINDOW: MemoryWindow = MemoryWindow::new(0x081E_0000, 0x0001_0000);

/// One-time-programmable rows in system flash.
pub const OTP_WINDOW: MemoryWindow = MemoryWindow::new(0x0BFA_0000, 0x400);

/// Boot-argument scratch at the top of SRAM, preserved across soft reset.
pub const BOOTARGS_WINDOW: MemoryWindow = MemoryWindow::new(0x2009_FE00, 0x200);

/// Peripheral space.
pub const PERIPHERALS_WINDOW: MemoryWindow = MemoryWindow::new(0x4000_0000, 0x1000_0000);

/// Peripheral space widened to reach the non-secure flash controller;
/// only the boot-update mode gets this window.
pub const PERIPHERALS_WIDE_WINDOW: MemoryWindow = MemoryWindow::new(0x4000_0000, 0x1002_0000);

/// Fixed programming of slots 0-4, boardloader image.
///
/// No applets exist at this stage; slot 2 is the bootloader area the
/// boardloader may rewrite during recovery.
#[cfg(feature = "boardloader")]
pub const FIXED_REGIONS: [Option<RegionConfig>; 5] = [
    Some(RegionConfig::flash_code(0x0800_0000, 0x0002_0000)),
    Some(RegionConfig::ram(0x2000_0000, 0x000A_0000)),
    Some(RegionConfig::flash_data(0x0802_0000, 0x0004_0000).writable()),
    None,
    None,
];

/// Fixed programming of slots 0-4, bootloader image.
///
/// Slot 2 is the firmware area the bootloader installs into.
#[cfg(all(feature = "bootloader-stage", not(feature = "boardloader")))]
pub const FIXED_REGIONS: [Option<RegionConfig>; 5] = [
    Some(RegionConfig::flash_code(0x0802_0000, 0x0004_0000)),
    Some(RegionConfig::ram(0x2000_0000, 0x000A_0000)),
    Some(RegionConfig::flash_data(0x0806_0000, 0x0010_0000).writable()),
    None,
    None,
];

/// Fixed programming of slots 0-4, secure monitor image.
#[cfg(all(
    feature = "secmon",
    not(any(feature = "boardloader", feature = "bootloader-stage"))
))]
pub const FIXED_REGIONS: [Option<RegionConfig>; 5] = [
    Some(RegionConfig::flash_code(0x0806_0000, 0x0002_0000)),
    Some(RegionConfig::ram(0x2000_0000, 0x0001_0000)),
    Some(RegionConfig::flash_data(0x081E_0000, 0x0001_0000)),
    None,
    None,
];

/// Fixed programming of slots 0-4, kernel/firmware image (default).
///
/// Slots 2-4 stay disabled until an applet is made active.
#[cfg(not(any(
    feature = "boardloader",
    feature = "bootloader-stage",
    feature = "secmon"
)))]
pub const FIXED_REGIONS: [Option<RegionConfig>; 5] = [
    Some(RegionConfig::flash_code(0x0806_0000, 0x0010_0000)),
    Some(RegionConfig::ram(0x2000_0000, 0x0008_0000)),
    None,
    None,
    None,
];
