//! Applet load orchestration.
//!
//! One pipeline, two placement strategies. The fixed-layout variant loads
//! into RAM the caller already owns; the temporary-mapping variant draws the
//! block from the applet arena and opens a short-lived MPU window over the
//! image plus the block so the patching pass is legal across privilege
//! levels. Everything else — validation, sizing, copy, relocation, section
//! lookup, task handoff, rollback — is shared.

use super::applet::{Applet, AppletLayout, AppletPrivileges, DataBlock};
use super::elf::{ElfError, ElfImage, ExecModel};
use super::mapper::SegmentMap;
use super::reloc::{apply_relocations, find_relocations, RwBlock};
use super::segments::{scan_segments, LoadPlan};
use crate::arena::{AppArena, ArenaClass};
use crate::memory::{align_up_to_granule, MemoryWindow, PhysAddr, VirtAddr};
use crate::mpu::{MpuPort, RegionManager};
use crate::task::{HelperWindows, TaskContext};

/// Why a load failed.
///
/// The boot/dispatch caller only branches on success, but the reasons stay
/// distinct: resource exhaustion must be tellable from malformed input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadError {
    /// Image validation or relocation failure.
    Elf(ElfError),
    /// Caller-supplied RAM window cannot hold the RW segment.
    RamWindowTooSmall,
    /// The arena cannot satisfy the RW segment's size.
    OutOfMemory,
    /// A physical placement is not granule-aligned.
    Misaligned,
    /// The task primitive rejected the stack/context setup.
    TaskInit,
}

impl From<ElfError> for LoadError {
    fn from(err: ElfError) -> Self {
        LoadError::Elf(err)
    }
}

impl core::fmt::Display for LoadError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Elf(err) => write!(f, "invalid image: {err}"),
            Self::RamWindowTooSmall => write!(f, "RAM window too small"),
            Self::OutOfMemory => write!(f, "arena exhausted"),
            Self::Misaligned => write!(f, "placement not granule-aligned"),
            Self::TaskInit => write!(f, "task initialization failed"),
        }
    }
}

/// Where the RW block comes from and how access to it is arranged.
pub trait SegmentPlacement<'m> {
    /// Whether the in-place RO range must already be granule-aligned.
    fn requires_aligned_ro(&self) -> bool {
        false
    }

    /// Acquire the destination RW block. `size` is granule-rounded.
    fn place_rw(&mut self, size: u32) -> Result<DataBlock<'m>, LoadError>;

    /// Make the image and the RW destination reachable for the patching
    /// pass.
    fn open_window(&mut self, _image: MemoryWindow, _rw: MemoryWindow) {}

    /// Narrow access down to the applet's final, unprivileged layout.
    fn seal(&mut self, _layout: &AppletLayout) {}

    /// Release the block after a failed load. The pipeline has already
    /// zeroed it.
    fn rollback(&mut self, _data: DataBlock<'m>) {}
}

/// Image RO bytes stay in place; destination RAM is caller-owned.
pub struct FixedPlacement<'m> {
    ram: Option<(PhysAddr, &'m mut [u8])>,
}

impl<'m> FixedPlacement<'m> {
    pub fn new(ram_base: PhysAddr, ram: &'m mut [u8]) -> Self {
        FixedPlacement {
            ram: Some((ram_base, ram)),
        }
    }
}

impl<'m> SegmentPlacement<'m> for FixedPlacement<'m> {
    fn requires_aligned_ro(&self) -> bool {
        true
    }

    fn place_rw(&mut self, size: u32) -> Result<DataBlock<'m>, LoadError> {
        let (base, bytes) = self.ram.take().ok_or(LoadError::RamWindowTooSmall)?;
        if !base.is_granule_aligned() {
            return Err(LoadError::Misaligned);
        }
        if (bytes.len() as u32) < size {
            return Err(LoadError::RamWindowTooSmall);
        }
        Ok(DataBlock::Borrowed {
            base,
            bytes: &mut bytes[..size as usize],
        })
    }
}

/// Destination RAM comes from the applet arena; a temporary MPU window
/// covers the image and the block while words are patched.
pub struct ArenaPlacement<'m, A: AppArena, P: MpuPort> {
    arena: &'m mut A,
    mpu: &'m mut RegionManager<P>,
    opened: bool,
}

impl<'m, A: AppArena, P: MpuPort> ArenaPlacement<'m, A, P> {
    pub fn new(arena: &'m mut A, mpu: &'m mut RegionManager<P>) -> Self {
        ArenaPlacement {
            arena,
            mpu,
            opened: false,
        }
    }
}

impl<'m, A: AppArena, P: MpuPort> SegmentPlacement<'static> for ArenaPlacement<'m, A, P> {
    fn place_rw(&mut self, size: u32) -> Result<DataBlock<'static>, LoadError> {
        let block = self
            .arena
            .alloc(size, ArenaClass::AppletData)
            .ok_or(LoadError::OutOfMemory)?;
        Ok(DataBlock::Owned(block))
    }

    fn open_window(&mut self, image: MemoryWindow, rw: MemoryWindow) {
        // Loader and applet run at different privilege levels; without this
        // window the patching pass would fault on its own loads/stores.
        self.mpu.set_active_applet(Some(&AppletLayout {
            code1: image,
            data1: rw,
            code2: MemoryWindow::NONE,
            tls: MemoryWindow::NONE,
        }));
        self.opened = true;
    }

    fn seal(&mut self, layout: &AppletLayout) {
        self.mpu.set_active_applet(Some(layout));
    }

    fn rollback(&mut self, data: DataBlock<'static>) {
        if self.opened {
            self.mpu.set_active_applet(None);
        }
        if let DataBlock::Owned(block) = data {
            self.arena.free(block);
        }
    }
}

/// Load a fixed-address (`ET_EXEC`) image into a caller-supplied RAM window.
pub fn load_fixed<'m>(
    image: &[u8],
    image_phys: PhysAddr,
    ram_base: PhysAddr,
    ram: &'m mut [u8],
    privileges: AppletPrivileges,
    helpers: &dyn HelperWindows,
    task: &mut dyn TaskContext,
) -> Result<Applet<'m>, LoadError> {
    let placement = FixedPlacement::new(ram_base, ram);
    load_with(
        image,
        image_phys,
        ExecModel::Fixed,
        placement,
        privileges,
        helpers,
        task,
    )
}

/// Load a position-independent (`ET_DYN`) image with arena-backed RAM and
/// temporary MPU mapping.
pub fn load_with_arena<A: AppArena, P: MpuPort>(
    image: &[u8],
    image_phys: PhysAddr,
    arena: &mut A,
    mpu: &mut RegionManager<P>,
    privileges: AppletPrivileges,
    helpers: &dyn HelperWindows,
    task: &mut dyn TaskContext,
) -> Result<Applet<'static>, LoadError> {
    let placement = ArenaPlacement::new(arena, mpu);
    load_with(
        image,
        image_phys,
        ExecModel::PositionIndependent,
        placement,
        privileges,
        helpers,
        task,
    )
}

/// The shared pipeline.
pub fn load_with<'m, S: SegmentPlacement<'m>>(
    image_bytes: &[u8],
    image_phys: PhysAddr,
    model: ExecModel,
    mut placement: S,
    privileges: AppletPrivileges,
    helpers: &dyn HelperWindows,
    task: &mut dyn TaskContext,
) -> Result<Applet<'m>, LoadError> {
    // Steps 1-2: validate before touching any resource.
    let image = ElfImage::parse(image_bytes, model)?;
    let plan = scan_segments(&image)?;

    let ro_phys = image_phys
        .checked_add(plan.ro.file_offset)
        .ok_or(LoadError::Elf(ElfError::SegmentOutOfBounds))?;
    if placement.requires_aligned_ro() && !ro_phys.is_granule_aligned() {
        return Err(LoadError::Misaligned);
    }

    // Step 3: size and acquire the destination block.
    let rw_size =
        align_up_to_granule(plan.rw.mem_size).ok_or(LoadError::Elf(ElfError::BadMemSize))?;
    let mut data = placement.place_rw(rw_size)?;

    let image_window = MemoryWindow::new(
        image_phys.0,
        align_up_to_granule(image_bytes.len() as u32).unwrap_or(u32::MAX),
    );
    placement.open_window(image_window, data.window());

    match populate(&image, &plan, model, ro_phys, &mut data, helpers, task) {
        Ok((layout, entry, stack, static_base)) => {
            placement.seal(&layout);
            log::debug!(
                "applet: loaded, code {:?} data {:?}",
                layout.code1,
                layout.data1
            );
            Ok(Applet {
                layout,
                privileges,
                entry,
                stack,
                static_base,
                data: Some(data),
            })
        }
        Err(err) => {
            // Steps 3-10 failed: no partial state may survive.
            data.zero();
            placement.rollback(data);
            log::warn!("applet: load failed: {err}");
            Err(err)
        }
    }
}

/// Steps 4-10: copy, relocate, resolve sections, hand off to the task.
fn populate(
    image: &ElfImage<'_>,
    plan: &LoadPlan,
    model: ExecModel,
    ro_phys: PhysAddr,
    data: &mut DataBlock<'_>,
    helpers: &dyn HelperWindows,
    task: &mut dyn TaskContext,
) -> Result<(AppletLayout, PhysAddr, MemoryWindow, PhysAddr), LoadError> {
    // Step 4: zero the block, copy the RW file bytes; the tail up to
    // mem_size stays zero (BSS).
    let src = image.slice(plan.rw.file_offset, plan.rw.file_size)?;
    let bytes = data.bytes_mut();
    bytes.fill(0);
    bytes[..src.len()].copy_from_slice(src);

    // Step 5: virtual -> physical translation for both segments.
    let map = SegmentMap::new(&plan.ro, ro_phys, &plan.rw, data.base());

    // Steps 6-7: locate and apply relocations.
    let table = find_relocations(image, plan)?;
    let rw_base = data.base();
    let mut rw = RwBlock::new(rw_base, data.bytes_mut());
    apply_relocations(table, &map, &mut rw)?;

    // Step 8: resolve the stack window and the static base.
    let stack_section = image
        .find_section(".stack")
        .ok_or(ElfError::MissingStackSection)?;
    let stack_base = map
        .phys(VirtAddr(stack_section.sh_addr))
        .ok_or(ElfError::UnmappedAddress)?;
    let stack = MemoryWindow::new(stack_base.0, stack_section.sh_size);

    let static_base = match model {
        ExecModel::Fixed => {
            let got = image
                .find_section(".got")
                .ok_or(ElfError::MissingGotSection)?;
            map.phys(VirtAddr(got.sh_addr))
                .ok_or(ElfError::UnmappedAddress)?
        }
        // PIC data access is relative to the start of the data block.
        ExecModel::PositionIndependent => rw_base,
    };

    let entry = map
        .phys(image.entry())
        .ok_or(ElfError::UnmappedAddress)?;

    // Step 9: final layout; code2/tls are borrowed resident windows.
    let layout = AppletLayout {
        code1: MemoryWindow::new(
            ro_phys.0,
            align_up_to_granule(plan.ro.mem_size).ok_or(ElfError::BadMemSize)?,
        ),
        data1: data.window(),
        code2: helpers.code_window(),
        tls: helpers.shared_state_window(),
    };

    // Step 10: one-shot task initialization.
    if !task.init(stack, static_base) {
        return Err(LoadError::TaskInit);
    }
    task.enable_shared_state(layout.tls);
    if !task.push_initial_call(entry, helpers.capability_getter(), 0, 0) {
        return Err(LoadError::TaskInit);
    }

    Ok((layout, entry, stack, static_base))
}
