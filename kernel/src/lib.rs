//! Kestrel Kernel Library
//!
//! Memory isolation and applet loading for the Kestrel firmware.
//!
//! The crate has two halves: the MPU region manager, which programs the
//! ARMv8-M protection unit from a small set of named modes and per-applet
//! layouts, and the applet loader, which validates ELF32 images, places
//! them, patches relocations, and hands them to the task primitive.
//!
//! Hardware access sits behind the [`mpu::MpuPort`] trait; everything above
//! it runs unmodified on the host, which is how the test suite works.

#![cfg_attr(not(test), no_std)]
#![deny(unsafe_op_in_unsafe_fn)]

extern crate alloc;

pub mod arena;
pub mod loader;
pub mod memory;
pub mod mpu;
pub mod sync;
pub mod task;

#[cfg(test)]
mod testutil;

pub use loader::{Applet, AppletLayout, AppletPrivileges, LoadError};
pub use memory::{MemoryWindow, PhysAddr, VirtAddr};
pub use mpu::{Mode, RegionManager};
