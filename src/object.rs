//! Reading and validating relocatable shader parts
use crate::{
    Result,
    elf::{E_CLASS, EM_AMDGPU, SymbolTable},
    error::malformed_error,
    image::SectionShape,
};
use alloc::{format, string::String, vec::Vec};
use bitflags::bitflags;
use elf::{
    ElfBytes,
    abi::{
        ET_REL, SHF_ALLOC, SHF_EXECINSTR, SHF_WRITE, SHT_NOBITS, SHT_NOTE, SHT_PROGBITS,
        SHT_SYMTAB,
    },
    endian::LittleEndian,
};

/// Name of the primary code section. Parts' `.text` sections are pasted
/// back to back at the start of the code image.
pub const TEXT_SECTION: &str = ".text";
/// Register configuration emitted by the compiler backend.
pub const CONFIG_SECTION: &str = ".AMDGPU.config";
/// Disassembly text emitted by the compiler backend.
pub const DISASM_SECTION: &str = ".AMDGPU.disasm";

/// A relocatable object stored in memory, not yet opened.
pub struct ElfPart<'data> {
    name: String,
    bytes: &'data [u8],
}

impl<'data> ElfPart<'data> {
    /// `name` is only used in diagnostics.
    pub fn new(name: &str, bytes: &'data [u8]) -> Self {
        Self {
            name: name.into(),
            bytes,
        }
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn bytes(&self) -> &'data [u8] {
        self.bytes
    }

    pub(crate) fn into_parts(self) -> (String, &'data [u8]) {
        (self.name, self.bytes)
    }
}

bitflags! {
    /// How a section takes part in the code image.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
    pub struct SectionFlags: u8 {
        /// Allocatable, read-only and not a note: placed in the code image.
        const CODE = 1;
        /// Holds instructions.
        const EXEC = 1 << 1;
        /// The part's `.text`, concatenated with the other parts' `.text`.
        const PASTED = 1 << 2;
    }
}

/// One section of an opened part.
#[derive(Clone, Debug)]
pub struct Section<'data> {
    name: &'data str,
    sh_type: u32,
    flags: SectionFlags,
    size: u64,
    align: u64,
    link: u32,
    info: u32,
    data: &'data [u8],
    offset: u64,
}

impl<'data> Section<'data> {
    #[inline]
    pub fn name(&self) -> &'data str {
        self.name
    }

    #[inline]
    pub fn sh_type(&self) -> u32 {
        self.sh_type
    }

    #[inline]
    pub fn flags(&self) -> SectionFlags {
        self.flags
    }

    #[inline]
    pub fn is_code(&self) -> bool {
        self.flags.contains(SectionFlags::CODE)
    }

    #[inline]
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Alignment requirement, at least 1.
    #[inline]
    pub fn align(&self) -> u64 {
        self.align
    }

    #[inline]
    pub fn link(&self) -> u32 {
        self.link
    }

    #[inline]
    pub fn info(&self) -> u32 {
        self.info
    }

    /// Raw content in the original object. Empty for `SHT_NOBITS`.
    #[inline]
    pub fn data(&self) -> &'data [u8] {
        self.data
    }

    /// Offset in the code image. Only meaningful for code sections.
    #[inline]
    pub fn offset(&self) -> u64 {
        self.offset
    }

    #[inline]
    pub(crate) fn set_offset(&mut self, offset: u64) {
        self.offset = offset;
    }

    pub(crate) fn shape(&self) -> SectionShape {
        SectionShape {
            flags: self.flags,
            size: self.size,
            align: self.align,
        }
    }
}

/// Parses the section table of a part and classifies every section.
///
/// The header must describe a little-endian 64-bit AMDGPU relocatable
/// object. Every section must have a zero address and a power-of-two
/// alignment, and its content must lie within `bytes`.
///
/// # Arguments
/// * `name` - The part name, used in error messages.
/// * `bytes` - The whole object.
///
/// # Returns
/// The section table, indexed by ELF section index, so entry 0 is the null
/// section. A part without a section table yields an empty table.
pub(crate) fn read_sections<'data>(name: &str, bytes: &'data [u8]) -> Result<Vec<Section<'data>>> {
    let file = ElfBytes::<LittleEndian>::minimal_parse(bytes)
        .map_err(|err| malformed_error(format!("{name}: {err}")))?;
    if file.ehdr.class != E_CLASS {
        return Err(malformed_error(format!(
            "{name}: not a 64-bit object ({:?})",
            file.ehdr.class
        )));
    }
    if file.ehdr.e_machine != EM_AMDGPU {
        return Err(malformed_error(format!(
            "{name}: bad e_machine {}",
            file.ehdr.e_machine
        )));
    }
    if file.ehdr.e_type != ET_REL {
        return Err(malformed_error(format!(
            "{name}: not a relocatable object (e_type {})",
            file.ehdr.e_type
        )));
    }

    let (shdrs, strtab) = file
        .section_headers_with_strtab()
        .map_err(|err| malformed_error(format!("{name}: {err}")))?;
    let Some(shdrs) = shdrs else {
        return Ok(Vec::new());
    };

    let mut sections = Vec::with_capacity(shdrs.len());
    for (idx, shdr) in shdrs.iter().enumerate() {
        let sec_name = match &strtab {
            Some(strtab) => strtab
                .get(shdr.sh_name as usize)
                .map_err(|err| malformed_error(format!("{name}: section {idx}: {err}")))?,
            None => "",
        };
        if shdr.sh_addr != 0 {
            return Err(malformed_error(format!(
                "{name}: {sec_name}: non-zero sh_addr {:#x}",
                shdr.sh_addr
            )));
        }
        if shdr.sh_addralign != 0 && !shdr.sh_addralign.is_power_of_two() {
            return Err(malformed_error(format!(
                "{name}: {sec_name}: sh_addralign {} is not a power of two",
                shdr.sh_addralign
            )));
        }

        let data = if shdr.sh_type == SHT_NOBITS {
            &[][..]
        } else {
            shdr.sh_offset
                .checked_add(shdr.sh_size)
                .and_then(|end| bytes.get(shdr.sh_offset as usize..end as usize))
                .ok_or_else(|| malformed_error(format!("{name}: {sec_name}: data out of bounds")))?
        };

        let mut flags = SectionFlags::empty();
        if shdr.sh_flags & SHF_ALLOC as u64 != 0 && shdr.sh_type != SHT_NOTE {
            if shdr.sh_flags & SHF_WRITE as u64 != 0 {
                return Err(malformed_error(format!(
                    "{name}: {sec_name}: writable sections are not supported"
                )));
            }
            if shdr.sh_type != SHT_PROGBITS {
                return Err(malformed_error(format!(
                    "{name}: {sec_name}: allocated section of type {} has no data",
                    shdr.sh_type
                )));
            }
            flags |= SectionFlags::CODE;
            if shdr.sh_flags & SHF_EXECINSTR as u64 != 0 {
                if shdr.sh_size % 4 != 0 {
                    return Err(malformed_error(format!(
                        "{name}: {sec_name}: executable size {} is not a multiple of 4",
                        shdr.sh_size
                    )));
                }
                flags |= SectionFlags::EXEC;
                if sec_name == TEXT_SECTION {
                    flags |= SectionFlags::PASTED;
                }
            }
        }

        sections.push(Section {
            name: sec_name,
            sh_type: shdr.sh_type,
            flags,
            size: shdr.sh_size,
            align: shdr.sh_addralign.max(1),
            link: shdr.sh_link,
            info: shdr.sh_info,
            data,
            offset: 0,
        });
    }
    Ok(sections)
}

/// Opens a symbol table of a part together with its string table.
///
/// # Arguments
/// * `part` - The part name, used in error messages.
/// * `sections` - The section table returned by [`read_sections`].
/// * `symtab` - The `SHT_SYMTAB` section to open.
///
/// # Returns
/// An error if `sh_link` does not name a section of the part.
pub(crate) fn symbol_table<'data>(
    part: &str,
    sections: &[Section<'data>],
    symtab: &Section<'data>,
) -> Result<SymbolTable<'data>> {
    debug_assert_eq!(symtab.sh_type, SHT_SYMTAB);
    let strtab = sections.get(symtab.link as usize).ok_or_else(|| {
        malformed_error(format!(
            "{part}: {}: string table {} does not exist",
            symtab.name, symtab.link
        ))
    })?;
    Ok(SymbolTable::new(symtab.data, strtab.data))
}

/// Iterates over the symbol tables of a part.
pub(crate) fn symbol_tables<'a, 'data>(
    sections: &'a [Section<'data>],
) -> impl Iterator<Item = &'a Section<'data>> {
    sections.iter().filter(|s| s.sh_type == SHT_SYMTAB)
}
