//! Generator for AMDGPU relocatable ELF objects ("shader parts").
//!
//! The linker tests need small, precisely shaped objects: a `.text` section
//! with known bytes, LDS symbol declarations, relocations of every AMDGPU
//! type, and deliberately broken headers. [`PartBuilder`] writes such objects
//! directly as ELF64 little-endian bytes.
//!
//! # Example
//!
//! ```
//! use gen_part::{PartBuilder, SectionDesc, SymbolDesc, R_AMDGPU_ABS32};
//!
//! let mut part = PartBuilder::new();
//! let text = part.add_section(SectionDesc::text(vec![4, 0, 0, 0]));
//! let sym = part.add_symbol(SymbolDesc::undefined("scratch_base"));
//! part.add_reloc(text, 0, sym, R_AMDGPU_ABS32);
//! let bytes = part.build().unwrap();
//! assert_eq!(&bytes[..4], b"\x7fELF");
//! ```

use anyhow::{Result, bail};
use byteorder::{LittleEndian, WriteBytesExt};
use elf::abi::{
    ELFCLASS64, ELFDATA2LSB, ET_REL, EV_CURRENT, SHF_ALLOC, SHF_EXECINSTR, SHN_UNDEF, SHT_NOBITS,
    SHT_PROGBITS, SHT_REL, SHT_RELA, SHT_STRTAB, SHT_SYMTAB, STB_GLOBAL, STT_FUNC, STT_NOTYPE,
    STT_OBJECT,
};
use std::collections::BTreeMap;

pub const EM_AMDGPU: u16 = 224;
pub const SHN_AMDGPU_LDS: u16 = 0xff00;
pub const STT_AMDGPU_LDS: u8 = 13;

pub const R_AMDGPU_NONE: u32 = 0;
pub const R_AMDGPU_ABS32_LO: u32 = 1;
pub const R_AMDGPU_ABS32_HI: u32 = 2;
pub const R_AMDGPU_ABS64: u32 = 3;
pub const R_AMDGPU_REL32: u32 = 4;
pub const R_AMDGPU_REL64: u32 = 5;
pub const R_AMDGPU_ABS32: u32 = 6;
pub const R_AMDGPU_GOTPCREL: u32 = 7;
pub const R_AMDGPU_REL32_LO: u32 = 10;
pub const R_AMDGPU_REL32_HI: u32 = 11;

/// `s_nop 0`
pub const S_NOP: u32 = 0xbf80_0000;
/// `s_endpgm`
pub const S_ENDPGM: u32 = 0xbf81_0000;

const EHDR_SIZE: u64 = 64;
const SHDR_SIZE: u64 = 64;
const SYM_SIZE: u64 = 24;
const REL_SIZE: u64 = 16;
const RELA_SIZE: u64 = 24;
const FILE_ALIGN: usize = 8;

/// Encodes a sequence of instruction dwords as little-endian bytes.
pub fn dwords(words: &[u32]) -> Vec<u8> {
    words.iter().flat_map(|w| w.to_le_bytes()).collect()
}

/// Describes one section of the generated object.
#[derive(Clone, Debug)]
pub struct SectionDesc {
    pub name: String,
    pub sh_type: u32,
    pub flags: u64,
    pub addr: u64,
    pub align: u64,
    pub data: Vec<u8>,
}

impl SectionDesc {
    pub fn new(name: &str, sh_type: u32, flags: u64, align: u64, data: Vec<u8>) -> Self {
        Self {
            name: name.to_string(),
            sh_type,
            flags,
            addr: 0,
            align,
            data,
        }
    }

    /// The primary code section, pasted by the linker.
    pub fn text(data: Vec<u8>) -> Self {
        Self::new(
            ".text",
            SHT_PROGBITS,
            (SHF_ALLOC | SHF_EXECINSTR) as u64,
            256,
            data,
        )
    }

    /// An executable section that is not pasted.
    pub fn code(name: &str, data: Vec<u8>, align: u64) -> Self {
        Self::new(
            name,
            SHT_PROGBITS,
            (SHF_ALLOC | SHF_EXECINSTR) as u64,
            align,
            data,
        )
    }

    /// Read-only data placed after the pasted code.
    pub fn rodata(name: &str, data: Vec<u8>, align: u64) -> Self {
        Self::new(name, SHT_PROGBITS, SHF_ALLOC as u64, align, data)
    }

    /// A `.AMDGPU.config` section built from `(register, value)` pairs.
    pub fn config(pairs: &[(u32, u32)]) -> Self {
        let data = pairs
            .iter()
            .flat_map(|(reg, value)| reg.to_le_bytes().into_iter().chain(value.to_le_bytes()))
            .collect();
        Self::new(".AMDGPU.config", SHT_PROGBITS, 0, 4, data)
    }

    /// A `.AMDGPU.disasm` section holding disassembly text.
    pub fn disasm(text: &str) -> Self {
        Self::new(".AMDGPU.disasm", SHT_PROGBITS, 0, 1, text.as_bytes().to_vec())
    }

    pub fn with_addr(mut self, addr: u64) -> Self {
        self.addr = addr;
        self
    }

    pub fn with_flags(mut self, flags: u64) -> Self {
        self.flags = flags;
        self
    }

    pub fn with_type(mut self, sh_type: u32) -> Self {
        self.sh_type = sh_type;
        self
    }
}

/// Describes one symbol table entry.
#[derive(Clone, Debug)]
pub struct SymbolDesc {
    pub name: String,
    pub info: u8,
    pub other: u8,
    pub shndx: u16,
    pub value: u64,
    pub size: u64,
}

impl SymbolDesc {
    pub fn undefined(name: &str) -> Self {
        Self {
            name: name.to_string(),
            info: (STB_GLOBAL << 4) | STT_NOTYPE,
            other: 0,
            shndx: SHN_UNDEF,
            value: 0,
            size: 0,
        }
    }

    /// An LDS declaration in the current encoding: section index
    /// `SHN_AMDGPU_LDS`, alignment stored in the value.
    pub fn lds(name: &str, size: u64, align: u64) -> Self {
        Self {
            name: name.to_string(),
            info: (STB_GLOBAL << 4) | STT_OBJECT,
            other: 0,
            shndx: SHN_AMDGPU_LDS,
            value: align,
            size,
        }
    }

    /// An LDS declaration in the legacy encoding: type `STT_AMDGPU_LDS`,
    /// log2 of the alignment stored in the upper bits of `st_other`.
    pub fn legacy_lds(name: &str, size: u64, align_log2: u8) -> Self {
        Self {
            name: name.to_string(),
            info: (STB_GLOBAL << 4) | STT_AMDGPU_LDS,
            other: align_log2 << 3,
            shndx: SHN_UNDEF,
            value: 0,
            size,
        }
    }

    pub fn defined(name: &str, section: u16, value: u64) -> Self {
        Self {
            name: name.to_string(),
            info: (STB_GLOBAL << 4) | STT_FUNC,
            other: 0,
            shndx: section,
            value,
            size: 0,
        }
    }
}

#[derive(Clone, Copy, Debug)]
struct RelocDesc {
    offset: u64,
    symbol: u32,
    r_type: u32,
}

/// Builds one AMDGPU relocatable object.
///
/// Section indices returned by [`PartBuilder::add_section`] are the final
/// ELF section indices. The symbol, string and relocation tables are appended
/// after the user sections, followed by `.shstrtab`.
#[derive(Clone, Debug)]
pub struct PartBuilder {
    machine: u16,
    e_type: u16,
    rela: bool,
    sections: Vec<SectionDesc>,
    symbols: Vec<SymbolDesc>,
    relocs: BTreeMap<u16, Vec<RelocDesc>>,
}

impl Default for PartBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl PartBuilder {
    pub fn new() -> Self {
        Self {
            machine: EM_AMDGPU,
            e_type: ET_REL as u16,
            rela: false,
            sections: Vec::new(),
            symbols: Vec::new(),
            relocs: BTreeMap::new(),
        }
    }

    pub fn machine(&mut self, machine: u16) -> &mut Self {
        self.machine = machine;
        self
    }

    pub fn object_type(&mut self, e_type: u16) -> &mut Self {
        self.e_type = e_type;
        self
    }

    /// Emit `SHT_RELA` tables instead of `SHT_REL`.
    pub fn use_rela(&mut self, rela: bool) -> &mut Self {
        self.rela = rela;
        self
    }

    pub fn add_section(&mut self, section: SectionDesc) -> u16 {
        self.sections.push(section);
        self.sections.len() as u16
    }

    pub fn add_symbol(&mut self, symbol: SymbolDesc) -> u32 {
        self.symbols.push(symbol);
        self.symbols.len() as u32
    }

    /// Adds a relocation patching `section` at `offset`. A `symbol` of 0
    /// means the relocation has no symbol.
    pub fn add_reloc(&mut self, section: u16, offset: u64, symbol: u32, r_type: u32) {
        self.relocs.entry(section).or_default().push(RelocDesc {
            offset,
            symbol,
            r_type,
        });
    }

    pub fn build(&self) -> Result<Vec<u8>> {
        for &target in self.relocs.keys() {
            if target == 0 || target as usize > self.sections.len() {
                bail!("relocation target section {target} does not exist");
            }
        }

        let mut shstrtab = vec![0u8];
        let mut name_offset = |name: &str| {
            let offset = shstrtab.len() as u32;
            shstrtab.extend_from_slice(name.as_bytes());
            shstrtab.push(0);
            offset
        };

        let mut headers = Vec::new();
        let mut bodies: Vec<Vec<u8>> = Vec::new();

        for section in &self.sections {
            headers.push(RawShdr {
                name: name_offset(&section.name),
                sh_type: section.sh_type,
                flags: section.flags,
                addr: section.addr,
                size: section.data.len() as u64,
                link: 0,
                info: 0,
                align: section.align,
                entsize: 0,
            });
            bodies.push(if section.sh_type == SHT_NOBITS {
                Vec::new()
            } else {
                section.data.clone()
            });
        }

        let strtab_idx = self.sections.len() as u32 + 1;
        let symtab_idx = strtab_idx + 1;

        let mut strtab = vec![0u8];
        let mut symtab = vec![0u8; SYM_SIZE as usize];
        for symbol in &self.symbols {
            let st_name = strtab.len() as u32;
            strtab.extend_from_slice(symbol.name.as_bytes());
            strtab.push(0);
            symtab.write_u32::<LittleEndian>(st_name)?;
            symtab.write_u8(symbol.info)?;
            symtab.write_u8(symbol.other)?;
            symtab.write_u16::<LittleEndian>(symbol.shndx)?;
            symtab.write_u64::<LittleEndian>(symbol.value)?;
            symtab.write_u64::<LittleEndian>(symbol.size)?;
        }

        headers.push(RawShdr {
            name: name_offset(".strtab"),
            sh_type: SHT_STRTAB,
            size: strtab.len() as u64,
            align: 1,
            ..RawShdr::default()
        });
        bodies.push(strtab);
        headers.push(RawShdr {
            name: name_offset(".symtab"),
            sh_type: SHT_SYMTAB,
            size: symtab.len() as u64,
            link: strtab_idx,
            info: 1,
            align: 8,
            entsize: SYM_SIZE,
            ..RawShdr::default()
        });
        bodies.push(symtab);

        for (&target, relocs) in &self.relocs {
            let target_name = &self.sections[target as usize - 1].name;
            let mut body = Vec::new();
            for reloc in relocs {
                body.write_u64::<LittleEndian>(reloc.offset)?;
                body.write_u64::<LittleEndian>(
                    ((reloc.symbol as u64) << 32) | reloc.r_type as u64,
                )?;
                if self.rela {
                    body.write_i64::<LittleEndian>(0)?;
                }
            }
            let (prefix, sh_type, entsize) = if self.rela {
                (".rela", SHT_RELA, RELA_SIZE)
            } else {
                (".rel", SHT_REL, REL_SIZE)
            };
            headers.push(RawShdr {
                name: name_offset(&format!("{prefix}{target_name}")),
                sh_type,
                size: body.len() as u64,
                link: symtab_idx,
                info: target as u32,
                align: 8,
                entsize,
                ..RawShdr::default()
            });
            bodies.push(body);
        }

        let shstrtab_name = name_offset(".shstrtab");
        headers.push(RawShdr {
            name: shstrtab_name,
            sh_type: SHT_STRTAB,
            size: shstrtab.len() as u64,
            align: 1,
            ..RawShdr::default()
        });
        bodies.push(shstrtab);

        let mut out = vec![0u8; EHDR_SIZE as usize];
        let mut offsets = Vec::with_capacity(bodies.len());
        for body in &bodies {
            pad(&mut out, FILE_ALIGN);
            offsets.push(out.len() as u64);
            out.extend_from_slice(body);
        }
        pad(&mut out, FILE_ALIGN);
        let shoff = out.len() as u64;

        // null section
        RawShdr::default().write(&mut out, 0)?;
        for (header, offset) in headers.iter().zip(offsets) {
            header.write(&mut out, offset)?;
        }

        let shnum = headers.len() as u16 + 1;
        let mut ehdr = Vec::with_capacity(EHDR_SIZE as usize);
        ehdr.extend_from_slice(&[0x7f, b'E', b'L', b'F']);
        ehdr.write_u8(ELFCLASS64)?;
        ehdr.write_u8(ELFDATA2LSB)?;
        ehdr.write_u8(EV_CURRENT)?;
        ehdr.extend_from_slice(&[0u8; 9]);
        ehdr.write_u16::<LittleEndian>(self.e_type)?;
        ehdr.write_u16::<LittleEndian>(self.machine)?;
        ehdr.write_u32::<LittleEndian>(EV_CURRENT as u32)?;
        ehdr.write_u64::<LittleEndian>(0)?; // e_entry
        ehdr.write_u64::<LittleEndian>(0)?; // e_phoff
        ehdr.write_u64::<LittleEndian>(shoff)?;
        ehdr.write_u32::<LittleEndian>(0)?; // e_flags
        ehdr.write_u16::<LittleEndian>(EHDR_SIZE as u16)?;
        ehdr.write_u16::<LittleEndian>(0)?; // e_phentsize
        ehdr.write_u16::<LittleEndian>(0)?; // e_phnum
        ehdr.write_u16::<LittleEndian>(SHDR_SIZE as u16)?;
        ehdr.write_u16::<LittleEndian>(shnum)?;
        ehdr.write_u16::<LittleEndian>(shnum - 1)?;
        out[..EHDR_SIZE as usize].copy_from_slice(&ehdr);
        Ok(out)
    }
}

#[derive(Clone, Copy, Debug, Default)]
struct RawShdr {
    name: u32,
    sh_type: u32,
    flags: u64,
    addr: u64,
    size: u64,
    link: u32,
    info: u32,
    align: u64,
    entsize: u64,
}

impl RawShdr {
    fn write(&self, out: &mut Vec<u8>, offset: u64) -> Result<()> {
        out.write_u32::<LittleEndian>(self.name)?;
        out.write_u32::<LittleEndian>(self.sh_type)?;
        out.write_u64::<LittleEndian>(self.flags)?;
        out.write_u64::<LittleEndian>(self.addr)?;
        out.write_u64::<LittleEndian>(offset)?;
        out.write_u64::<LittleEndian>(self.size)?;
        out.write_u32::<LittleEndian>(self.link)?;
        out.write_u32::<LittleEndian>(self.info)?;
        out.write_u64::<LittleEndian>(self.align)?;
        out.write_u64::<LittleEndian>(self.entsize)?;
        Ok(())
    }
}

fn pad(out: &mut Vec<u8>, align: usize) {
    let len = out.len().next_multiple_of(align);
    out.resize(len, 0);
}
