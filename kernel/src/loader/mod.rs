//! Applet Loader
//!
//! This module loads signed-and-verified applet images (ELF32, ARM,
//! hard-float) into memory and hands them to the task primitive.
//!
//! # Pipeline
//!
//! - ELF32 header, segment and section validation
//! - Writable-segment placement (caller RAM or arena block)
//! - Word relocation through the segment map
//! - `.stack`/`.got` resolution and task context setup
//!
//! # Security
//!
//! - Enforces exactly one R+X and one R+W segment (W^X policy)
//! - Every relocation write is bounds-checked against the RAM block
//! - Failed loads zero and release everything they touched

pub mod applet;
pub mod elf;
pub mod load;
pub mod mapper;
pub mod reloc;
pub mod segments;

pub use applet::{Applet, AppletLayout, AppletPrivileges};
pub use elf::{ElfError, ElfImage, ExecModel};
pub use load::{load_fixed, load_with, load_with_arena, LoadError, SegmentPlacement};
pub use mapper::SegmentMap;
pub use segments::{scan_segments, LoadPlan, Segment};
