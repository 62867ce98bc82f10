//! ELF32 parser and validator.
//!
//! Stateless views over an untrusted in-memory image. Nothing here mutates
//! the input; every offset is bounds-checked before it is dereferenced, and
//! any inconsistency surfaces as an `ElfError`.

use core::mem::size_of;

use crate::memory::VirtAddr;

/// ELF magic number: 0x7F 'E' 'L' 'F'
pub const ELF_MAGIC: [u8; 4] = [0x7F, b'E', b'L', b'F'];

/// ELF class: 32-bit
pub const ELFCLASS32: u8 = 1;

/// ELF data encoding: little endian
pub const ELFDATA2LSB: u8 = 1;

/// ELF version: current
pub const EV_CURRENT: u8 = 1;

/// ELF type: fixed-address executable
pub const ET_EXEC: u16 = 2;

/// ELF type: position-independent executable
pub const ET_DYN: u16 = 3;

/// Machine type: ARM
pub const EM_ARM: u16 = 40;

/// e_flags bit: hard-float calling convention
pub const EF_ARM_ABI_FLOAT_HARD: u32 = 0x0400;

/// Program header type: loadable segment
pub const PT_LOAD: u32 = 1;

/// Program header type: dynamic linking info
pub const PT_DYNAMIC: u32 = 2;

/// Segment permission: executable
pub const PF_X: u32 = 1;

/// Segment permission: writable
pub const PF_W: u32 = 2;

/// Segment permission: readable
pub const PF_R: u32 = 4;

/// Dynamic tag: end of table
pub const DT_NULL: u32 = 0;

/// Dynamic tag: address of the relocation table
pub const DT_REL: u32 = 17;

/// Dynamic tag: total size of the relocation table
pub const DT_RELSZ: u32 = 18;

/// Dynamic tag: size of one relocation entry
pub const DT_RELENT: u32 = 19;

/// Relocation kind: absolute 32-bit address
pub const R_ARM_ABS32: u8 = 2;

/// Relocation kind: self-relative
pub const R_ARM_RELATIVE: u8 = 23;

/// Hard cap on accepted program headers.
pub const MAX_PROGRAM_HEADERS: usize = 32;

/// Hard cap on accepted section headers.
pub const MAX_SECTION_HEADERS: usize = 32;

/// ELF32 file header
#[derive(Debug, Clone, Copy)]
#[repr(C, packed)]
pub struct Elf32Header {
    /// Magic number and other info
    pub e_ident: [u8; 16],
    /// Object file type
    pub e_type: u16,
    /// Machine type
    pub e_machine: u16,
    /// Object file version
    pub e_version: u32,
    /// Entry point virtual address
    pub e_entry: u32,
    /// Program header table file offset
    pub e_phoff: u32,
    /// Section header table file offset
    pub e_shoff: u32,
    /// Processor-specific flags
    pub e_flags: u32,
    /// ELF header size
    pub e_ehsize: u16,
    /// Program header table entry size
    pub e_phentsize: u16,
    /// Program header table entry count
    pub e_phnum: u16,
    /// Section header table entry size
    pub e_shentsize: u16,
    /// Section header table entry count
    pub e_shnum: u16,
    /// Section name string table index
    pub e_shstrndx: u16,
}

/// ELF32 program header
#[derive(Debug, Clone, Copy)]
#[repr(C, packed)]
pub struct Elf32ProgramHeader {
    /// Segment type
    pub p_type: u32,
    /// Segment file offset
    pub p_offset: u32,
    /// Segment virtual address
    pub p_vaddr: u32,
    /// Segment physical address (unused)
    pub p_paddr: u32,
    /// Segment size in file
    pub p_filesz: u32,
    /// Segment size in memory
    pub p_memsz: u32,
    /// Segment flags (PF_R, PF_W, PF_X)
    pub p_flags: u32,
    /// Segment alignment
    pub p_align: u32,
}

/// ELF32 section header
#[derive(Debug, Clone, Copy)]
#[repr(C, packed)]
pub struct Elf32SectionHeader {
    /// Section name (string table index)
    pub sh_name: u32,
    /// Section type
    pub sh_type: u32,
    /// Section flags
    pub sh_flags: u32,
    /// Section virtual address
    pub sh_addr: u32,
    /// Section file offset
    pub sh_offset: u32,
    /// Section size
    pub sh_size: u32,
    /// Link to another section
    pub sh_link: u32,
    /// Additional section information
    pub sh_info: u32,
    /// Section alignment
    pub sh_addralign: u32,
    /// Entry size if section holds table
    pub sh_entsize: u32,
}

/// ELF32 relocation entry (REL form, no addend)
#[derive(Debug, Clone, Copy)]
#[repr(C, packed)]
pub struct Elf32Rel {
    /// Virtual address of the patched word
    pub r_offset: u32,
    /// Symbol index and relocation kind
    pub r_info: u32,
}

/// ELF32 dynamic table entry
#[derive(Debug, Clone, Copy)]
#[repr(C, packed)]
pub struct Elf32Dyn {
    /// Entry tag
    pub d_tag: u32,
    /// Tag value
    pub d_val: u32,
}

/// Executable model the caller expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecModel {
    /// `ET_EXEC`: image linked at the address it sits at.
    Fixed,
    /// `ET_DYN`: position-independent image.
    PositionIndependent,
}

/// Validation failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElfError {
    /// Image too small to contain an ELF header
    TooSmall,
    /// Invalid ELF magic number
    BadMagic,
    /// Not a 32-bit image
    BadClass,
    /// Not little endian
    BadEncoding,
    /// Not EV_CURRENT
    BadVersion,
    /// Executable type does not match the loader variant
    BadType,
    /// Not an ARM image
    BadMachine,
    /// Soft-float image; the ABI requires hard-float
    BadFloatAbi,
    /// Program header entry size is not the standard 32 bytes
    BadPhentsize,
    /// More program headers than the hard cap
    TooManyProgramHeaders,
    /// More section headers than the hard cap
    TooManySectionHeaders,
    /// A header table extends beyond the image
    TableOutOfBounds,
    /// Section name string table index out of range
    BadStringTableIndex,
    /// Segment file range extends beyond the image
    SegmentOutOfBounds,
    /// Segment memory size smaller than its file size
    BadMemSize,
    /// A loadable segment is neither read+execute nor read+write
    BadSegmentFlags,
    /// More than one read+execute loadable segment
    DuplicateRoSegment,
    /// More than one read+write loadable segment
    DuplicateRwSegment,
    /// More than one dynamic segment
    DuplicateDynamicSegment,
    /// No read+execute loadable segment
    MissingRoSegment,
    /// No read+write loadable segment
    MissingRwSegment,
    /// Dynamic relocation entry size is not 8 bytes
    BadRelocationEntrySize,
    /// Relocation table range is malformed
    BadRelocationTable,
    /// Unsupported relocation kind
    BadRelocationKind,
    /// Relocation target outside the destination RAM block
    RelocationOutOfBounds,
    /// A virtual address has no physical mapping
    UnmappedAddress,
    /// Required `.stack` section missing
    MissingStackSection,
    /// Required `.got` section missing (fixed-address images)
    MissingGotSection,
}

impl core::fmt::Display for ElfError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let msg = match self {
            Self::TooSmall => "image too small",
            Self::BadMagic => "bad ELF magic",
            Self::BadClass => "not a 32-bit image",
            Self::BadEncoding => "not little endian",
            Self::BadVersion => "bad ELF version",
            Self::BadType => "wrong executable type",
            Self::BadMachine => "wrong machine type",
            Self::BadFloatAbi => "not a hard-float image",
            Self::BadPhentsize => "bad program header entry size",
            Self::TooManyProgramHeaders => "too many program headers",
            Self::TooManySectionHeaders => "too many section headers",
            Self::TableOutOfBounds => "header table out of bounds",
            Self::BadStringTableIndex => "bad string table index",
            Self::SegmentOutOfBounds => "segment data out of bounds",
            Self::BadMemSize => "segment memory size below file size",
            Self::BadSegmentFlags => "unexpected loadable segment flags",
            Self::DuplicateRoSegment => "more than one RO segment",
            Self::DuplicateRwSegment => "more than one RW segment",
            Self::DuplicateDynamicSegment => "more than one dynamic segment",
            Self::MissingRoSegment => "no RO segment",
            Self::MissingRwSegment => "no RW segment",
            Self::BadRelocationEntrySize => "bad relocation entry size",
            Self::BadRelocationTable => "malformed relocation table",
            Self::BadRelocationKind => "unsupported relocation kind",
            Self::RelocationOutOfBounds => "relocation target out of bounds",
            Self::UnmappedAddress => "virtual address has no mapping",
            Self::MissingStackSection => "missing .stack section",
            Self::MissingGotSection => "missing .got section",
        };
        f.write_str(msg)
    }
}

/// A validated view over an untrusted image.
///
/// Construction checks the header and both header tables; the accessor
/// methods can then iterate without re-validating bounds.
pub struct ElfImage<'a> {
    bytes: &'a [u8],
    header: Elf32Header,
}

impl<'a> ElfImage<'a> {
    /// Parse and validate the image header against `model`.
    pub fn parse(bytes: &'a [u8], model: ExecModel) -> Result<Self, ElfError> {
        if bytes.len() < size_of::<Elf32Header>() {
            return Err(ElfError::TooSmall);
        }

        // SAFETY: size checked above; Elf32Header is repr(C, packed).
        let header: Elf32Header =
            unsafe { core::ptr::read_unaligned(bytes.as_ptr() as *const Elf32Header) };

        Self::validate_header(&header, model)?;

        let image = ElfImage { bytes, header };
        image.validate_tables()?;
        Ok(image)
    }

    fn validate_header(header: &Elf32Header, model: ExecModel) -> Result<(), ElfError> {
        if header.e_ident[0..4] != ELF_MAGIC {
            return Err(ElfError::BadMagic);
        }
        if header.e_ident[4] != ELFCLASS32 {
            return Err(ElfError::BadClass);
        }
        if header.e_ident[5] != ELFDATA2LSB {
            return Err(ElfError::BadEncoding);
        }
        if header.e_ident[6] != EV_CURRENT {
            return Err(ElfError::BadVersion);
        }

        let expected_type = match model {
            ExecModel::Fixed => ET_EXEC,
            ExecModel::PositionIndependent => ET_DYN,
        };
        if header.e_type != expected_type {
            return Err(ElfError::BadType);
        }
        if header.e_machine != EM_ARM {
            return Err(ElfError::BadMachine);
        }
        if header.e_flags & EF_ARM_ABI_FLOAT_HARD == 0 {
            return Err(ElfError::BadFloatAbi);
        }
        if header.e_phentsize as usize != size_of::<Elf32ProgramHeader>() {
            return Err(ElfError::BadPhentsize);
        }
        Ok(())
    }

    fn validate_tables(&self) -> Result<(), ElfError> {
        let phnum = self.header.e_phnum as usize;
        if phnum > MAX_PROGRAM_HEADERS {
            return Err(ElfError::TooManyProgramHeaders);
        }
        table_end(
            self.header.e_phoff,
            phnum,
            size_of::<Elf32ProgramHeader>(),
            self.bytes.len(),
        )?;

        let shnum = self.header.e_shnum as usize;
        if shnum > MAX_SECTION_HEADERS {
            return Err(ElfError::TooManySectionHeaders);
        }
        if shnum > 0 {
            if self.header.e_shentsize as usize != size_of::<Elf32SectionHeader>() {
                return Err(ElfError::TableOutOfBounds);
            }
            table_end(
                self.header.e_shoff,
                shnum,
                size_of::<Elf32SectionHeader>(),
                self.bytes.len(),
            )?;
            if self.header.e_shstrndx as usize >= shnum {
                return Err(ElfError::BadStringTableIndex);
            }
        }
        Ok(())
    }

    /// Raw image bytes.
    pub fn bytes(&self) -> &'a [u8] {
        self.bytes
    }

    /// Entry point virtual address.
    pub fn entry(&self) -> VirtAddr {
        VirtAddr(self.header.e_entry)
    }

    /// Iterate the program headers. Table bounds were checked at parse.
    pub fn program_headers(&self) -> impl Iterator<Item = Elf32ProgramHeader> + 'a {
        let bytes = self.bytes;
        let phoff = self.header.e_phoff as usize;
        let phnum = self.header.e_phnum as usize;
        (0..phnum).map(move |i| {
            let offset = phoff + i * size_of::<Elf32ProgramHeader>();
            // SAFETY: validate_tables checked the whole table is in bounds.
            unsafe {
                core::ptr::read_unaligned(bytes.as_ptr().add(offset) as *const Elf32ProgramHeader)
            }
        })
    }

    /// Iterate the section headers.
    pub fn section_headers(&self) -> impl Iterator<Item = Elf32SectionHeader> + 'a {
        let bytes = self.bytes;
        let shoff = self.header.e_shoff as usize;
        let shnum = self.header.e_shnum as usize;
        (0..shnum).map(move |i| {
            let offset = shoff + i * size_of::<Elf32SectionHeader>();
            // SAFETY: validate_tables checked the whole table is in bounds.
            unsafe {
                core::ptr::read_unaligned(bytes.as_ptr().add(offset) as *const Elf32SectionHeader)
            }
        })
    }

    /// Name of a section, if its string-table entry is well formed.
    pub fn section_name(&self, section: &Elf32SectionHeader) -> Option<&'a str> {
        let strtab = self
            .section_headers()
            .nth(self.header.e_shstrndx as usize)?;
        let start = (strtab.sh_offset as usize).checked_add(section.sh_name as usize)?;
        let end = (strtab.sh_offset as usize).checked_add(strtab.sh_size as usize)?;
        if start >= end || end > self.bytes.len() {
            return None;
        }
        let names = &self.bytes[start..end];
        let len = names.iter().position(|&b| b == 0)?;
        core::str::from_utf8(&names[..len]).ok()
    }

    /// Find a section by name.
    pub fn find_section(&self, name: &str) -> Option<Elf32SectionHeader> {
        self.section_headers()
            .find(|sh| self.section_name(sh) == Some(name))
    }

    /// A bounds-checked byte range of the image.
    pub fn slice(&self, offset: u32, len: u32) -> Result<&'a [u8], ElfError> {
        let start = offset as usize;
        let end = start
            .checked_add(len as usize)
            .ok_or(ElfError::SegmentOutOfBounds)?;
        if end > self.bytes.len() {
            return Err(ElfError::SegmentOutOfBounds);
        }
        Ok(&self.bytes[start..end])
    }
}

fn table_end(offset: u32, count: usize, entry: usize, image_len: usize) -> Result<(), ElfError> {
    let end = (offset as usize)
        .checked_add(count.checked_mul(entry).ok_or(ElfError::TableOutOfBounds)?)
        .ok_or(ElfError::TableOutOfBounds)?;
    if end > image_len {
        return Err(ElfError::TableOutOfBounds);
    }
    Ok(())
}
