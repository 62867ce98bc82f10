//! Shared test doubles: a programmable ELF32 image builder, a fixed-buffer
//! arena and stub task/helper collaborators.

use alloc::boxed::Box;
use alloc::vec;
use alloc::vec::Vec;
use core::ptr::NonNull;

use crate::arena::{AppArena, ArenaClass, RamBlock};
use crate::loader::elf::{
    EF_ARM_ABI_FLOAT_HARD, ELFCLASS32, ELFDATA2LSB, ELF_MAGIC, EM_ARM, ET_DYN, ET_EXEC,
    EV_CURRENT, PF_R, PF_W, PF_X, PT_DYNAMIC, PT_LOAD,
};
use crate::memory::{MemoryWindow, PhysAddr};
use crate::task::{HelperWindows, TaskContext};

// Fixed file layout the builder emits:
//   0x000 ELF header
//   0x034 program headers
//   0x100 RO segment bytes
//   0x180 relocation table
//   0x200 dynamic segment bytes
//   0x240 RW segment bytes
//   0x300 section headers
//   0x400 .shstrtab
const IMAGE_LEN: usize = 0x480;
const PH_OFFSET: u32 = 52;
const RO_FILE_OFFSET: u32 = 0x100;
const REL_FILE_OFFSET: u32 = 0x180;
const DYN_FILE_OFFSET: u32 = 0x200;
const RW_FILE_OFFSET: u32 = 0x240;
const SH_OFFSET: u32 = 0x300;
const STRTAB_OFFSET: u32 = 0x400;

const SHT_PROGBITS: u32 = 1;
const SHT_STRTAB: u32 = 3;
const SHT_NOBITS: u32 = 8;
const SHT_REL: u32 = 9;

// Name offsets into the builder's .shstrtab.
const NAME_STACK: u32 = 1;
const NAME_GOT: u32 = 8;
const NAME_REL_DATA: u32 = 13;
const NAME_SHSTRTAB: u32 = 23;
const NAME_COMMENT: u32 = 33;
const STRTAB: &[u8] = b"\0.stack\0.got\0.rel.data\0.shstrtab\0.comment\0";

/// Builds well-formed minimal applet images, with knobs to break each
/// validated property individually.
pub(crate) struct ElfBuilder {
    e_type: u16,
    e_flags: u32,
    entry: u32,
    phoff: u32,
    phnum_override: Option<u16>,
    ro_flags: u32,
    extra_ro: bool,
    omit_rw: bool,
    rw_file_offset: u32,
    rw_mem_size: u32,
    rw_words: [u32; 2],
    relocs: Vec<(u32, u8)>,
    dynamic: bool,
    empty_dynamic: bool,
    stack_addr: u32,
    stack_size: u32,
    omit_stack: bool,
    omit_got: bool,
}

impl ElfBuilder {
    pub const RO_VADDR: u32 = 0x0800_0000;
    pub const RO_SIZE: u32 = 0x40;
    pub const RW_VADDR: u32 = 0x2000_0000;
    pub const RW_FILE_SIZE: u32 = 8;
    pub const RW_MEM_SIZE: u32 = 0x10;
    pub const STACK_SIZE: u32 = 8;

    fn new(e_type: u16) -> Self {
        ElfBuilder {
            e_type,
            e_flags: EF_ARM_ABI_FLOAT_HARD,
            entry: Self::RO_VADDR,
            phoff: PH_OFFSET,
            phnum_override: None,
            ro_flags: PF_R | PF_X,
            extra_ro: false,
            omit_rw: false,
            rw_file_offset: RW_FILE_OFFSET,
            rw_mem_size: Self::RW_MEM_SIZE,
            // link-time virtual addresses baked into the data words
            rw_words: [Self::RO_VADDR + 0x20, Self::RO_VADDR + 0x10],
            relocs: Vec::new(),
            dynamic: false,
            empty_dynamic: false,
            stack_addr: Self::RW_VADDR + 8,
            stack_size: Self::STACK_SIZE,
            omit_stack: false,
            omit_got: false,
        }
    }

    /// Position-independent image (`ET_DYN`).
    pub fn pic() -> Self {
        Self::new(ET_DYN)
    }

    /// Fixed-address image (`ET_EXEC`).
    pub fn fixed() -> Self {
        Self::new(ET_EXEC)
    }

    pub fn soft_float(mut self) -> Self {
        self.e_flags &= !EF_ARM_ABI_FLOAT_HARD;
        self
    }

    pub fn phnum(mut self, value: u16) -> Self {
        self.phnum_override = Some(value);
        self
    }

    pub fn phoff(mut self, value: u32) -> Self {
        self.phoff = value;
        self
    }

    pub fn ro_flags(mut self, flags: u32) -> Self {
        self.ro_flags = flags;
        self
    }

    pub fn extra_ro_segment(mut self) -> Self {
        self.extra_ro = true;
        self
    }

    pub fn without_rw_segment(mut self) -> Self {
        self.omit_rw = true;
        self
    }

    pub fn rw_file_offset(mut self, offset: u32) -> Self {
        self.rw_file_offset = offset;
        self
    }

    pub fn rw_mem_size(mut self, size: u32) -> Self {
        self.rw_mem_size = size;
        self
    }

    pub fn rw_word(mut self, index: usize, value: u32) -> Self {
        self.rw_words[index] = value;
        self
    }

    /// Add a relocation entry patching the word at virtual `offset`.
    pub fn reloc(mut self, offset: u32, kind: u8) -> Self {
        self.relocs.push((offset, kind));
        self
    }

    /// Emit a dynamic segment describing the relocation table.
    pub fn with_dynamic_segment(mut self) -> Self {
        self.dynamic = true;
        self
    }

    /// Emit a dynamic segment whose relocation table is empty.
    pub fn with_empty_dynamic_segment(mut self) -> Self {
        self.dynamic = true;
        self.empty_dynamic = true;
        self
    }

    pub fn stack(mut self, addr: u32, size: u32) -> Self {
        self.stack_addr = addr;
        self.stack_size = size;
        self
    }

    pub fn without_stack_section(mut self) -> Self {
        self.omit_stack = true;
        self
    }

    pub fn without_got_section(mut self) -> Self {
        self.omit_got = true;
        self
    }

    pub fn build(self) -> Vec<u8> {
        let mut image = vec![0u8; IMAGE_LEN];

        // program headers: RO [, RO'] [, RW] [, DYNAMIC]
        let mut phdrs: Vec<[u32; 8]> = Vec::new();
        phdrs.push([
            PT_LOAD,
            RO_FILE_OFFSET,
            Self::RO_VADDR,
            Self::RO_VADDR,
            Self::RO_SIZE,
            Self::RO_SIZE,
            self.ro_flags,
            4,
        ]);
        if self.extra_ro {
            phdrs.push([
                PT_LOAD,
                RO_FILE_OFFSET,
                Self::RO_VADDR + 0x1000,
                Self::RO_VADDR + 0x1000,
                Self::RO_SIZE,
                Self::RO_SIZE,
                PF_R | PF_X,
                4,
            ]);
        }
        if !self.omit_rw {
            phdrs.push([
                PT_LOAD,
                self.rw_file_offset,
                Self::RW_VADDR,
                Self::RW_VADDR,
                Self::RW_FILE_SIZE,
                self.rw_mem_size,
                PF_R | PF_W,
                4,
            ]);
        }
        if self.dynamic {
            phdrs.push([
                PT_DYNAMIC,
                DYN_FILE_OFFSET,
                Self::RO_VADDR + (DYN_FILE_OFFSET - RO_FILE_OFFSET),
                0,
                0x20,
                0x20,
                PF_R,
                4,
            ]);
        }

        // ELF header
        image[0..4].copy_from_slice(&ELF_MAGIC);
        image[4] = ELFCLASS32;
        image[5] = ELFDATA2LSB;
        image[6] = EV_CURRENT;
        image[16..18].copy_from_slice(&self.e_type.to_le_bytes());
        image[18..20].copy_from_slice(&EM_ARM.to_le_bytes());
        image[20..24].copy_from_slice(&1u32.to_le_bytes());
        image[24..28].copy_from_slice(&self.entry.to_le_bytes());
        image[28..32].copy_from_slice(&self.phoff.to_le_bytes());
        image[32..36].copy_from_slice(&SH_OFFSET.to_le_bytes());
        image[36..40].copy_from_slice(&self.e_flags.to_le_bytes());
        image[40..42].copy_from_slice(&52u16.to_le_bytes());
        image[42..44].copy_from_slice(&32u16.to_le_bytes());
        let phnum = self.phnum_override.unwrap_or(phdrs.len() as u16);
        image[44..46].copy_from_slice(&phnum.to_le_bytes());
        image[46..48].copy_from_slice(&40u16.to_le_bytes());
        image[48..50].copy_from_slice(&5u16.to_le_bytes());
        image[50..52].copy_from_slice(&4u16.to_le_bytes());

        for (i, ph) in phdrs.iter().enumerate() {
            let base = PH_OFFSET as usize + i * 32;
            for (j, field) in ph.iter().enumerate() {
                image[base + j * 4..base + j * 4 + 4].copy_from_slice(&field.to_le_bytes());
            }
        }

        // RO bytes: recognizable filler
        for i in 0..Self::RO_SIZE as usize {
            image[RO_FILE_OFFSET as usize + i] = 0xE0 | (i as u8 & 0x0F);
        }

        // relocation table
        for (i, (offset, kind)) in self.relocs.iter().enumerate() {
            let base = REL_FILE_OFFSET as usize + i * 8;
            image[base..base + 4].copy_from_slice(&offset.to_le_bytes());
            image[base + 4..base + 8].copy_from_slice(&u32::from(*kind).to_le_bytes());
        }
        let rel_size = (self.relocs.len() * 8) as u32;

        // dynamic segment
        if self.dynamic {
            let rel_vaddr = Self::RO_VADDR + (REL_FILE_OFFSET - RO_FILE_OFFSET);
            let dyn_relsz = if self.empty_dynamic { 0 } else { rel_size };
            let entries: [(u32, u32); 4] = [(17, rel_vaddr), (18, dyn_relsz), (19, 8), (0, 0)];
            for (i, (tag, val)) in entries.iter().enumerate() {
                let base = DYN_FILE_OFFSET as usize + i * 8;
                image[base..base + 4].copy_from_slice(&tag.to_le_bytes());
                image[base + 4..base + 8].copy_from_slice(&val.to_le_bytes());
            }
        }

        // RW bytes
        if self.rw_file_offset == RW_FILE_OFFSET {
            for (i, word) in self.rw_words.iter().enumerate() {
                let base = RW_FILE_OFFSET as usize + i * 4;
                image[base..base + 4].copy_from_slice(&word.to_le_bytes());
            }
        }

        // section headers: null, .stack, .got, .rel.data/.comment, .shstrtab
        let stack_name = if self.omit_stack { NAME_COMMENT } else { NAME_STACK };
        let got_name = if self.omit_got { NAME_COMMENT } else { NAME_GOT };
        let (rel_name, rel_type, rel_off, rel_sz) = if self.relocs.is_empty() {
            (NAME_COMMENT, SHT_PROGBITS, 0, 0)
        } else {
            (NAME_REL_DATA, SHT_REL, REL_FILE_OFFSET, rel_size)
        };
        let sections: [[u32; 10]; 5] = [
            [0; 10],
            [
                stack_name,
                SHT_NOBITS,
                0,
                self.stack_addr,
                0,
                self.stack_size,
                0,
                0,
                4,
                0,
            ],
            [got_name, SHT_PROGBITS, 0, Self::RW_VADDR, RW_FILE_OFFSET, 4, 0, 0, 4, 0],
            [rel_name, rel_type, 0, 0, rel_off, rel_sz, 0, 0, 4, 8],
            [
                NAME_SHSTRTAB,
                SHT_STRTAB,
                0,
                0,
                STRTAB_OFFSET,
                STRTAB.len() as u32,
                0,
                0,
                1,
                0,
            ],
        ];
        for (i, sh) in sections.iter().enumerate() {
            let base = SH_OFFSET as usize + i * 40;
            for (j, field) in sh.iter().enumerate() {
                image[base + j * 4..base + j * 4 + 4].copy_from_slice(&field.to_le_bytes());
            }
        }

        image[STRTAB_OFFSET as usize..STRTAB_OFFSET as usize + STRTAB.len()]
            .copy_from_slice(STRTAB);

        image
    }
}

/// Bump arena over a fixed buffer, with free-space accounting.
pub(crate) struct FixedArena {
    buf: Box<[u8]>,
    base: u32,
    next: u32,
    outstanding: u32,
}

impl FixedArena {
    pub fn new(base: u32, capacity: usize) -> Self {
        FixedArena {
            buf: vec![0u8; capacity].into_boxed_slice(),
            base,
            next: 0,
            outstanding: 0,
        }
    }

    /// Privileged inspection of arena memory, device-addressed.
    pub fn slice(&self, addr: u32, len: u32) -> &[u8] {
        let offset = (addr - self.base) as usize;
        &self.buf[offset..offset + len as usize]
    }
}

impl AppArena for FixedArena {
    fn alloc(&mut self, size: u32, _class: ArenaClass) -> Option<RamBlock> {
        let end = self.next.checked_add(size)?;
        if end as usize > self.buf.len() {
            return None;
        }
        let offset = self.next;
        self.next = end;
        self.outstanding += size;
        let ptr = NonNull::new(self.buf[offset as usize..].as_mut_ptr())?;
        Some(RamBlock::new(self.base + offset, size, ptr))
    }

    fn free(&mut self, block: RamBlock) {
        self.outstanding -= block.window().size;
    }

    fn free_bytes(&self) -> u32 {
        self.buf.len() as u32 - self.outstanding
    }
}

/// Helper-window provider with fixed windows.
pub(crate) struct StubHelpers;

impl HelperWindows for StubHelpers {
    fn code_window(&self) -> MemoryWindow {
        MemoryWindow::new(0x0814_0000, 0x1000)
    }

    fn shared_state_window(&self) -> MemoryWindow {
        MemoryWindow::new(0x2007_0000, 0x100)
    }

    fn capability_getter(&self) -> u32 {
        0x0814_0001
    }
}

/// Recording task primitive.
#[derive(Default)]
pub(crate) struct StubTask {
    pub inited: Option<(MemoryWindow, PhysAddr)>,
    pub shared: Option<MemoryWindow>,
    pub pushed: Option<(PhysAddr, u32, u32, u32)>,
    pub fail_init: bool,
    pub fail_push: bool,
}

impl TaskContext for StubTask {
    fn init(&mut self, stack: MemoryWindow, static_base: PhysAddr) -> bool {
        if self.fail_init {
            return false;
        }
        self.inited = Some((stack, static_base));
        true
    }

    fn enable_shared_state(&mut self, window: MemoryWindow) {
        self.shared = Some(window);
    }

    fn push_initial_call(&mut self, entry: PhysAddr, arg0: u32, arg1: u32, arg2: u32) -> bool {
        if self.fail_push {
            return false;
        }
        self.pushed = Some((entry, arg0, arg1, arg2));
        true
    }
}
