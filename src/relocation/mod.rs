//! Relocation of the code image
//!
//! Parts only carry `SHT_REL` tables: the addend of every relocation is
//! stored in the field it patches. The addend is always read from the
//! original object, never from the destination, which may be write-combined
//! GPU memory.

mod apply;
mod resolve;

pub(crate) use apply::apply_relocations;
pub use apply::write_relocation;
pub(crate) use resolve::Resolver;
pub use resolve::SymbolLookup;

use crate::{
    Result,
    elf::{
        R_AMDGPU_ABS32, R_AMDGPU_ABS32_HI, R_AMDGPU_ABS32_LO, R_AMDGPU_ABS64, R_AMDGPU_REL32,
        R_AMDGPU_REL32_HI, R_AMDGPU_REL32_LO, R_AMDGPU_REL64,
    },
    error::reloc_kind_error,
};

/// Which 32 bits of a 64-bit value a 32-bit relocation writes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Half {
    /// The value must fit in 32 bits.
    Full,
    Lo,
    Hi,
}

/// A relocation type the loader can apply.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RelocKind {
    /// `S + A`, 32 bits.
    Abs32(Half),
    /// `S + A`, 64 bits.
    Abs64,
    /// `S + A - P`, 32 bits.
    Rel32(Half),
    /// `S + A - P`, 64 bits.
    Rel64,
}

impl RelocKind {
    /// Decodes a raw `R_AMDGPU_*` type.
    pub fn from_raw(r_type: u32) -> Result<Self> {
        let kind = match r_type {
            R_AMDGPU_ABS32 => RelocKind::Abs32(Half::Full),
            R_AMDGPU_ABS32_LO => RelocKind::Abs32(Half::Lo),
            R_AMDGPU_ABS32_HI => RelocKind::Abs32(Half::Hi),
            R_AMDGPU_ABS64 => RelocKind::Abs64,
            R_AMDGPU_REL32 => RelocKind::Rel32(Half::Full),
            R_AMDGPU_REL32_LO => RelocKind::Rel32(Half::Lo),
            R_AMDGPU_REL32_HI => RelocKind::Rel32(Half::Hi),
            R_AMDGPU_REL64 => RelocKind::Rel64,
            _ => return Err(reloc_kind_error(r_type)),
        };
        Ok(kind)
    }

    /// Bytes of the patched field.
    #[inline]
    pub fn width(self) -> usize {
        match self {
            RelocKind::Abs32(_) | RelocKind::Rel32(_) => 4,
            RelocKind::Abs64 | RelocKind::Rel64 => 8,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::elf::{R_AMDGPU_GOTPCREL, R_AMDGPU_NONE, R_AMDGPU_RELATIVE64};
    use rstest::rstest;

    #[rstest]
    #[case(R_AMDGPU_ABS32, RelocKind::Abs32(Half::Full), 4)]
    #[case(R_AMDGPU_ABS32_LO, RelocKind::Abs32(Half::Lo), 4)]
    #[case(R_AMDGPU_ABS32_HI, RelocKind::Abs32(Half::Hi), 4)]
    #[case(R_AMDGPU_ABS64, RelocKind::Abs64, 8)]
    #[case(R_AMDGPU_REL32, RelocKind::Rel32(Half::Full), 4)]
    #[case(R_AMDGPU_REL32_LO, RelocKind::Rel32(Half::Lo), 4)]
    #[case(R_AMDGPU_REL32_HI, RelocKind::Rel32(Half::Hi), 4)]
    #[case(R_AMDGPU_REL64, RelocKind::Rel64, 8)]
    fn decode(#[case] r_type: u32, #[case] kind: RelocKind, #[case] width: usize) {
        let decoded = RelocKind::from_raw(r_type).unwrap();
        assert_eq!(decoded, kind);
        assert_eq!(decoded.width(), width);
    }

    #[rstest]
    #[case(R_AMDGPU_NONE)]
    #[case(R_AMDGPU_GOTPCREL)]
    #[case(R_AMDGPU_RELATIVE64)]
    #[case(0xdead)]
    fn unsupported(#[case] r_type: u32) {
        assert!(matches!(
            RelocKind::from_raw(r_type),
            Err(crate::Error::UnsupportedRelocationKind { r_type: t }) if t == r_type
        ));
    }
}
