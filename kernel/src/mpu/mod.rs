//! Memory-protection-unit region management.
//!
//! The hardware provides eight region slots. This module splits them into
//! build-time-fixed regions (slots 0-1, plus per-image extras), slots banked
//! on the active applet (2-4) and slots banked on the active mode (5-7), and
//! exposes the small state machine that keeps hardware, shadow table and
//! mode in sync.
//!
//! # Security
//!
//! - Applet windows are the only unprivileged regions in applet modes.
//! - Privileged memory classes (secrets, OTP, storage, assets, boot update)
//!   are reachable only through their dedicated mode.
//! - Mode switches are atomic: disable, reprogram, re-enable under
//!   interrupt exclusion.

pub mod armv8m;
pub mod layout;
pub mod manager;
pub mod region;

#[cfg(test)]
pub(crate) mod testutil;

pub use armv8m::MpuHardware;
pub use manager::{Mode, RegionManager};
pub use region::{MemoryType, MpuPort, RegionConfig, RegionTable, REGION_COUNT};
