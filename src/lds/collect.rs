use super::{
    LDS_END, LdsSymbol, LdsSymbols, MAX_LDS_ALIGN, MAX_LDS_SYMBOL_SIZE, Owner, check_alignment,
};
use crate::{
    Result,
    elf::{ElfSymbol, SHN_AMDGPU_LDS, STT_AMDGPU_LDS},
    error::malformed_error,
    object::{Section, symbol_table, symbol_tables},
};
use alloc::format;

/// Alignment of an LDS declaration, or `None` if `sym` is not one.
fn lds_alignment(sym: &ElfSymbol) -> Option<u64> {
    if sym.st_shndx() == SHN_AMDGPU_LDS {
        Some(sym.st_value().min(MAX_LDS_ALIGN))
    } else if sym.st_type() == STT_AMDGPU_LDS {
        // legacy encoding: log2 of the alignment in the upper bits of st_other
        let shift = u32::from(sym.st_other() >> 3);
        Some(1u64.checked_shl(shift).map_or(MAX_LDS_ALIGN, |a| a.min(MAX_LDS_ALIGN)))
    } else {
        None
    }
}

/// Appends the LDS symbols a part declares beyond what it can already see.
///
/// Both encodings are accepted: a symbol in the `SHN_AMDGPU_LDS` pseudo
/// section carries its alignment in `st_value`, a legacy `STT_AMDGPU_LDS`
/// symbol carries its log2 in the upper bits of `st_other`. Alignments are
/// capped at [`MAX_LDS_ALIGN`]. A declaration of a symbol the part already
/// sees must not be larger or more aligned than the visible one.
///
/// # Arguments
/// * `part_name` - The part name, used in error messages.
/// * `part` - Index of the part, recorded as the owner of its symbols.
/// * `sections` - The section table of the part.
/// * `lds` - Shared symbols and those of the previous parts.
/// * `lds_end_align` - Raised to the alignment of any `__lds_end`
///   declaration, which is not appended.
pub(crate) fn collect_private_symbols(
    part_name: &str,
    part: usize,
    sections: &[Section<'_>],
    lds: &mut LdsSymbols,
    lds_end_align: &mut u64,
) -> Result<()> {
    for symtab in symbol_tables(sections) {
        let table = symbol_table(part_name, sections, symtab)?;
        for sym in table.iter() {
            let Some(align) = lds_alignment(&sym) else {
                continue;
            };
            let name = table.name(&sym).ok_or_else(|| {
                malformed_error(format!("{part_name}: bad symbol name offset {}", sym.st_name()))
            })?;
            check_alignment(name, align)?;
            let size = sym.st_size();
            if size > MAX_LDS_SYMBOL_SIZE {
                return Err(malformed_error(format!(
                    "{part_name}: LDS symbol {name} is too large ({size} bytes)"
                )));
            }

            if name == LDS_END {
                if size != 0 {
                    return Err(malformed_error(format!(
                        "{part_name}: {LDS_END} has non-zero size {size}"
                    )));
                }
                *lds_end_align = (*lds_end_align).max(align);
                continue;
            }

            if let Some(existing) = lds.find(name, part) {
                if size > existing.size() || align > existing.align() {
                    return Err(malformed_error(format!(
                        "{part_name}: conflicting declaration of LDS symbol {name}"
                    )));
                }
                continue;
            }

            #[cfg(feature = "log")]
            log::trace!(
                "[{}] private LDS symbol [{}] size {} align {}",
                part_name,
                name,
                size,
                align
            );
            lds.push(LdsSymbol::new(name, size, align, Owner::Part(part)));
        }
    }
    Ok(())
}
