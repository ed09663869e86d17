//! ELF (Executable and Linkable Format) data structures for AMDGPU objects.

mod defs;
mod symbol;

pub(crate) use defs::E_CLASS;
pub(crate) use symbol::SymbolTable;

// Public API exports
// Named explicitly so they take precedence over the generic ABI glob below.
pub use defs::{
    EM_AMDGPU, ElfRel, ElfSymbol, R_AMDGPU_ABS32, R_AMDGPU_ABS32_HI, R_AMDGPU_ABS32_LO,
    R_AMDGPU_ABS64, R_AMDGPU_GOTPCREL, R_AMDGPU_GOTPCREL32_HI, R_AMDGPU_GOTPCREL32_LO,
    R_AMDGPU_NONE, R_AMDGPU_REL32, R_AMDGPU_REL32_HI, R_AMDGPU_REL32_LO, R_AMDGPU_REL64,
    R_AMDGPU_RELATIVE64, SHN_AMDGPU_LDS, STT_AMDGPU_LDS,
};
/// ELF ABI constants and definitions from the elf crate.
pub use elf::abi::*;
