//! AMDGPU ELF definitions.
//!
//! The `elf` crate covers the generic ABI. This module adds the AMDGPU
//! machine-specific values and thin wrappers over the symbol and relocation
//! entries it parses.

use elf::{file::Class, relocation::Rel, symbol::Symbol};

/// `e_machine` of AMDGPU objects.
pub const EM_AMDGPU: u16 = 224;
/// Pseudo section index of symbols living in LDS.
pub const SHN_AMDGPU_LDS: u16 = 0xff00;
/// Legacy symbol type of LDS declarations.
pub const STT_AMDGPU_LDS: u8 = 13;

pub const R_AMDGPU_NONE: u32 = 0;
pub const R_AMDGPU_ABS32_LO: u32 = 1;
pub const R_AMDGPU_ABS32_HI: u32 = 2;
pub const R_AMDGPU_ABS64: u32 = 3;
pub const R_AMDGPU_REL32: u32 = 4;
pub const R_AMDGPU_REL64: u32 = 5;
pub const R_AMDGPU_ABS32: u32 = 6;
pub const R_AMDGPU_GOTPCREL: u32 = 7;
pub const R_AMDGPU_GOTPCREL32_LO: u32 = 8;
pub const R_AMDGPU_GOTPCREL32_HI: u32 = 9;
pub const R_AMDGPU_REL32_LO: u32 = 10;
pub const R_AMDGPU_REL32_HI: u32 = 11;
pub const R_AMDGPU_RELATIVE64: u32 = 13;

/// Every part is a 64-bit object.
pub(crate) const E_CLASS: Class = Class::ELF64;

/// ELF symbol table entry, as parsed by the `elf` crate.
#[repr(transparent)]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ElfSymbol {
    sym: Symbol,
}

impl From<Symbol> for ElfSymbol {
    #[inline]
    fn from(sym: Symbol) -> Self {
        Self { sym }
    }
}

impl ElfSymbol {
    /// Returns the offset of the symbol name in the string table.
    #[inline]
    pub fn st_name(&self) -> u32 {
        self.sym.st_name
    }

    /// Returns the symbol type.
    #[inline]
    pub fn st_type(&self) -> u8 {
        self.sym.st_symtype()
    }

    /// Returns the symbol binding.
    #[inline]
    pub fn st_bind(&self) -> u8 {
        self.sym.st_bind()
    }

    /// Returns the raw `st_other` byte. Legacy LDS declarations keep their
    /// alignment in its upper bits.
    #[inline]
    pub fn st_other(&self) -> u8 {
        self.sym.st_other
    }

    #[inline]
    pub fn st_shndx(&self) -> u16 {
        self.sym.st_shndx
    }

    #[inline]
    pub fn st_value(&self) -> u64 {
        self.sym.st_value
    }

    #[inline]
    pub fn st_size(&self) -> u64 {
        self.sym.st_size
    }

    #[inline]
    pub fn is_undef(&self) -> bool {
        self.sym.is_undefined()
    }

    /// Whether the symbol is resolved through the LDS layout rather than a
    /// section of the part.
    #[inline]
    pub fn is_lds_or_undef(&self) -> bool {
        self.is_undef() || self.sym.st_shndx == SHN_AMDGPU_LDS
    }
}

/// ELF REL relocation entry.
///
/// The addend is implicit: it is stored in the patched field of the original
/// object.
#[repr(transparent)]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ElfRel {
    rel: Rel,
}

impl From<Rel> for ElfRel {
    #[inline]
    fn from(rel: Rel) -> Self {
        Self { rel }
    }
}

impl ElfRel {
    /// Returns the relocation type.
    #[inline]
    pub fn r_type(&self) -> u32 {
        self.rel.r_type
    }

    /// Returns the symbol index.
    #[inline]
    pub fn r_symbol(&self) -> usize {
        self.rel.r_sym as usize
    }

    /// Returns the offset of the patched field within the target section.
    #[inline]
    pub fn r_offset(&self) -> u64 {
        self.rel.r_offset
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use elf::abi::{SHN_UNDEF, STB_GLOBAL, STT_OBJECT};

    #[test]
    fn legacy_lds_symbol() {
        let sym = ElfSymbol::from(Symbol {
            st_name: 7,
            st_shndx: SHN_UNDEF,
            st_info: (STB_GLOBAL << 4) | STT_AMDGPU_LDS,
            st_other: 4 << 3,
            st_value: 0,
            st_size: 64,
        });
        assert_eq!(sym.st_name(), 7);
        assert_eq!(sym.st_type(), STT_AMDGPU_LDS);
        assert_eq!(sym.st_bind(), STB_GLOBAL);
        assert_eq!(sym.st_other() >> 3, 4);
        assert_eq!(sym.st_size(), 64);
        assert!(sym.is_undef());
        assert!(sym.is_lds_or_undef());
    }

    #[test]
    fn lds_section_symbol() {
        let sym = ElfSymbol::from(Symbol {
            st_name: 1,
            st_shndx: SHN_AMDGPU_LDS,
            st_info: (STB_GLOBAL << 4) | STT_OBJECT,
            st_other: 0,
            st_value: 16,
            st_size: 8,
        });
        assert!(!sym.is_undef());
        assert!(sym.is_lds_or_undef());
        assert_eq!(sym.st_value(), 16);
    }

    #[test]
    fn rel_fields() {
        let rel = ElfRel::from(Rel {
            r_offset: 0x24,
            r_sym: 3,
            r_type: R_AMDGPU_REL32_HI,
        });
        assert_eq!(rel.r_offset(), 0x24);
        assert_eq!(rel.r_symbol(), 3);
        assert_eq!(rel.r_type(), R_AMDGPU_REL32_HI);
    }
}
