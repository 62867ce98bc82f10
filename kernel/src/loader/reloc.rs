//! Relocation pass.
//!
//! Locates the image's relocation table (dynamic segment first, `.rel.data`
//! section as fallback) and patches 32-bit words in the destination RAM
//! block. The single most security-relevant check in the loader lives here:
//! every translated target must land inside the RAM block, so a malicious
//! image cannot turn the patch primitive into an arbitrary write.

use core::mem::size_of;

use super::elf::{
    Elf32Dyn, Elf32Rel, ElfError, ElfImage, DT_NULL, DT_REL, DT_RELENT, DT_RELSZ, R_ARM_ABS32,
    R_ARM_RELATIVE,
};
use super::mapper::SegmentMap;
use super::segments::LoadPlan;
use crate::memory::{PhysAddr, VirtAddr};

/// Size of one REL entry.
const REL_ENTRY_SIZE: usize = size_of::<Elf32Rel>();

/// The two relocation kinds this loader processes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelocKind {
    /// Store the absolute physical address of the referenced object.
    Abs32,
    /// Self-relative reference, patched through the same translation.
    Relative,
}

impl RelocKind {
    fn from_info(info: u32) -> Result<Self, ElfError> {
        match (info & 0xFF) as u8 {
            R_ARM_ABS32 => Ok(RelocKind::Abs32),
            R_ARM_RELATIVE => Ok(RelocKind::Relative),
            _ => Err(ElfError::BadRelocationKind),
        }
    }
}

/// Bounds-checked word access into the destination RAM block.
///
/// Raw addresses never escape this type; the relocation walk can only
/// read/write 32-bit words that lie fully inside the block.
pub struct RwBlock<'a> {
    base: u32,
    bytes: &'a mut [u8],
}

impl<'a> RwBlock<'a> {
    pub fn new(base: PhysAddr, bytes: &'a mut [u8]) -> Self {
        RwBlock { base: base.0, bytes }
    }

    fn word_range(&self, pa: PhysAddr) -> Option<core::ops::Range<usize>> {
        let offset = pa.0.checked_sub(self.base)? as usize;
        let end = offset.checked_add(4)?;
        if end > self.bytes.len() {
            return None;
        }
        Some(offset..end)
    }

    /// Read the word at `pa`, if it lies inside the block.
    pub fn read_word(&self, pa: PhysAddr) -> Option<u32> {
        let range = self.word_range(pa)?;
        let mut word = [0u8; 4];
        word.copy_from_slice(&self.bytes[range]);
        Some(u32::from_le_bytes(word))
    }

    /// Write the word at `pa`, if it lies inside the block.
    pub fn write_word(&mut self, pa: PhysAddr, value: u32) -> bool {
        match self.word_range(pa) {
            Some(range) => {
                self.bytes[range].copy_from_slice(&value.to_le_bytes());
                true
            }
            None => false,
        }
    }
}

/// Locate the relocation table.
///
/// A dynamic segment with non-empty `DT_REL`/`DT_RELSZ` takes priority;
/// otherwise a `.rel.data` section emitted by static-self-relocation
/// toolchains is used. An image with neither (or with empty tables) is
/// legal and yields an empty slice.
pub fn find_relocations<'a>(
    image: &ElfImage<'a>,
    plan: &LoadPlan,
) -> Result<&'a [u8], ElfError> {
    if let Some(dynamic) = &plan.dynamic {
        let table = dynamic_rel_table(image, plan, dynamic.file_offset, dynamic.file_size)?;
        if let Some(bytes) = table {
            if !bytes.is_empty() {
                return Ok(bytes);
            }
        }
    }

    if let Some(section) = image.find_section(".rel.data") {
        if section.sh_size as usize % REL_ENTRY_SIZE != 0 {
            return Err(ElfError::BadRelocationTable);
        }
        return image.slice(section.sh_offset, section.sh_size);
    }

    Ok(&[])
}

/// Read `DT_REL`/`DT_RELSZ`/`DT_RELENT` out of the dynamic segment.
///
/// `DT_REL` holds a virtual address; the table itself lives inside the RO
/// segment, so the file offset follows from the RO placement.
fn dynamic_rel_table<'a>(
    image: &ElfImage<'a>,
    plan: &LoadPlan,
    dyn_offset: u32,
    dyn_size: u32,
) -> Result<Option<&'a [u8]>, ElfError> {
    let bytes = image.slice(dyn_offset, dyn_size)?;
    let mut rel_vaddr: Option<u32> = None;
    let mut rel_size: Option<u32> = None;

    for chunk in bytes.chunks_exact(size_of::<Elf32Dyn>()) {
        // SAFETY: chunks_exact guarantees the full entry is present.
        let entry: Elf32Dyn =
            unsafe { core::ptr::read_unaligned(chunk.as_ptr() as *const Elf32Dyn) };
        match entry.d_tag {
            DT_NULL => break,
            DT_REL => rel_vaddr = Some(entry.d_val),
            DT_RELSZ => rel_size = Some(entry.d_val),
            DT_RELENT => {
                if entry.d_val as usize != REL_ENTRY_SIZE {
                    return Err(ElfError::BadRelocationEntrySize);
                }
            }
            _ => {}
        }
    }

    let (vaddr, size) = match (rel_vaddr, rel_size) {
        (Some(v), Some(s)) => (v, s),
        _ => return Ok(None),
    };
    if size as usize % REL_ENTRY_SIZE != 0 {
        return Err(ElfError::BadRelocationTable);
    }

    let table_offset = vaddr
        .checked_sub(plan.ro.vaddr)
        .and_then(|o| o.checked_add(plan.ro.file_offset))
        .ok_or(ElfError::BadRelocationTable)?;
    image.slice(table_offset, size).map(Some)
}

/// Walk the relocation table and patch the RAM block.
///
/// Returns the number of applied entries.
pub fn apply_relocations(
    table: &[u8],
    map: &SegmentMap,
    rw: &mut RwBlock<'_>,
) -> Result<usize, ElfError> {
    if table.len() % REL_ENTRY_SIZE != 0 {
        return Err(ElfError::BadRelocationTable);
    }

    let mut applied = 0;
    for chunk in table.chunks_exact(REL_ENTRY_SIZE) {
        // SAFETY: chunks_exact guarantees the full entry is present.
        let entry: Elf32Rel =
            unsafe { core::ptr::read_unaligned(chunk.as_ptr() as *const Elf32Rel) };
        RelocKind::from_info(entry.r_info)?;

        let target = map
            .phys(VirtAddr(entry.r_offset))
            .ok_or(ElfError::UnmappedAddress)?;
        let stored = rw
            .read_word(target)
            .ok_or(ElfError::RelocationOutOfBounds)?;

        // The stored word is a virtual address baked in at link time; both
        // supported kinds resolve by pushing it through the same mapping.
        let patched = map
            .phys(VirtAddr(stored))
            .ok_or(ElfError::UnmappedAddress)?;
        if !rw.write_word(target, patched.0) {
            return Err(ElfError::RelocationOutOfBounds);
        }
        applied += 1;
    }
    Ok(applied)
}
