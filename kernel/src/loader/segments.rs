//! Loadable-segment scan.
//!
//! A valid applet image carries exactly one read+execute segment, exactly
//! one read+write segment and at most one dynamic segment. Anything else is
//! a validation failure, not a best-effort load.

use bitflags::bitflags;

use super::elf::{ElfError, ElfImage, PF_R, PF_W, PF_X, PT_DYNAMIC, PT_LOAD};
use crate::memory::VirtAddr;

bitflags! {
    /// ELF segment permission flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SegmentFlags: u32 {
        const X = PF_X;
        const W = PF_W;
        const R = PF_R;
    }
}

/// One loadable range from the program-header table.
#[derive(Debug, Clone, Copy)]
pub struct Segment {
    /// Virtual address the segment was linked at.
    pub vaddr: u32,
    /// Offset of the segment's bytes in the image.
    pub file_offset: u32,
    /// Number of bytes present in the image.
    pub file_size: u32,
    /// Size in memory; the tail past `file_size` is BSS.
    pub mem_size: u32,
    /// Permission flags.
    pub flags: SegmentFlags,
}

impl Segment {
    /// Virtual range of the segment, end-inclusive per the mapper contract.
    pub fn virt_range(&self) -> (VirtAddr, u32) {
        (VirtAddr(self.vaddr), self.mem_size)
    }
}

/// The validated segment set of an image.
#[derive(Debug, Clone, Copy)]
pub struct LoadPlan {
    /// The read+execute segment.
    pub ro: Segment,
    /// The read+write segment.
    pub rw: Segment,
    /// The dynamic segment, when present.
    pub dynamic: Option<Segment>,
}

/// Scan the program headers and enforce segment cardinality and bounds.
pub fn scan_segments(image: &ElfImage<'_>) -> Result<LoadPlan, ElfError> {
    let image_len = image.bytes().len() as u64;
    let mut ro: Option<Segment> = None;
    let mut rw: Option<Segment> = None;
    let mut dynamic: Option<Segment> = None;

    for ph in image.program_headers() {
        if ph.p_type != PT_LOAD && ph.p_type != PT_DYNAMIC {
            continue;
        }

        if ph.p_memsz < ph.p_filesz {
            return Err(ElfError::BadMemSize);
        }
        let file_end = ph.p_offset as u64 + ph.p_filesz as u64;
        if file_end > image_len {
            return Err(ElfError::SegmentOutOfBounds);
        }

        let segment = Segment {
            vaddr: ph.p_vaddr,
            file_offset: ph.p_offset,
            file_size: ph.p_filesz,
            mem_size: ph.p_memsz,
            flags: SegmentFlags::from_bits_truncate(ph.p_flags),
        };

        if ph.p_type == PT_DYNAMIC {
            if dynamic.replace(segment).is_some() {
                return Err(ElfError::DuplicateDynamicSegment);
            }
            continue;
        }

        let writable = segment.flags.contains(SegmentFlags::W);
        let executable = segment.flags.contains(SegmentFlags::X);
        match (executable, writable) {
            (true, false) => {
                if ro.replace(segment).is_some() {
                    return Err(ElfError::DuplicateRoSegment);
                }
            }
            (false, true) => {
                if rw.replace(segment).is_some() {
                    return Err(ElfError::DuplicateRwSegment);
                }
            }
            // W+X or neither: not a segment shape this loader accepts
            _ => return Err(ElfError::BadSegmentFlags),
        }
    }

    Ok(LoadPlan {
        ro: ro.ok_or(ElfError::MissingRoSegment)?,
        rw: rw.ok_or(ElfError::MissingRwSegment)?,
        dynamic,
    })
}
