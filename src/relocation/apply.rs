use super::{Half, RelocKind, Resolver, SymbolLookup};
use crate::{
    Result,
    binary::Part,
    elf::{E_CLASS, ElfRel, SHT_REL, SHT_RELA, SHT_SYMTAB},
    error::{malformed_error, reloc_section_error, section_kind_error, section_range_error},
    object::{Section, symbol_table},
};
use alloc::format;
use elf::{endian::LittleEndian, relocation::RelIterator};

#[inline]
fn select(value: u64, half: Half) -> u32 {
    match half {
        Half::Full | Half::Lo => value as u32,
        Half::Hi => (value >> 32) as u32,
    }
}

/// Writes one relocated field.
///
/// `absolute` is the symbol value plus the addend and `pc` the address of
/// the field. `field` must be [`RelocKind::width`] bytes long.
pub fn write_relocation(kind: RelocKind, absolute: u64, pc: u64, field: &mut [u8]) {
    let relative = absolute.wrapping_sub(pc);
    match kind {
        RelocKind::Abs32(half) => {
            debug_assert!(half != Half::Full || absolute <= u32::MAX as u64);
            field.copy_from_slice(&select(absolute, half).to_le_bytes());
        }
        RelocKind::Abs64 => field.copy_from_slice(&absolute.to_le_bytes()),
        RelocKind::Rel32(half) => {
            debug_assert!(half != Half::Full || i32::try_from(relative as i64).is_ok());
            field.copy_from_slice(&select(relative, half).to_le_bytes());
        }
        RelocKind::Rel64 => field.copy_from_slice(&relative.to_le_bytes()),
    }
}

#[inline]
fn read_addend(original: &[u8]) -> u64 {
    match *original {
        [a, b, c, d] => u32::from_le_bytes([a, b, c, d]) as u64,
        [a, b, c, d, e, f, g, h] => u64::from_le_bytes([a, b, c, d, e, f, g, h]),
        _ => unreachable!("relocated fields are 4 or 8 bytes"),
    }
}

/// Applies every relocation table of a part to the uploaded image.
///
/// # Arguments
/// * `resolver` - Computes the value of every referenced symbol.
/// * `part_idx` - Index of `part` in the binary, which selects its private
///   LDS symbols.
/// * `part` - The opened part whose `SHT_REL` sections are applied.
/// * `dest` - The whole code image, already holding the copied sections.
///
/// # Returns
/// An error on the first relocation that cannot be applied. Fields patched
/// before it stay patched.
pub(crate) fn apply_relocations<S: SymbolLookup + ?Sized>(
    resolver: &Resolver<'_, S>,
    part_idx: usize,
    part: &Part<'_>,
    dest: &mut [u8],
) -> Result<()> {
    for section in part.sections() {
        match section.sh_type() {
            SHT_REL => apply_rel_section(resolver, part_idx, part, section, dest)?,
            SHT_RELA => {
                return Err(reloc_section_error(format!(
                    "{}: {}: relocations with explicit addends",
                    part.name(),
                    section.name()
                )));
            }
            _ => {}
        }
    }
    Ok(())
}

/// Applies one `SHT_REL` section.
///
/// The addend of each entry is read from the target section in the original
/// object, so applying the same section twice gives the same result.
///
/// # Arguments
/// * `rel_section` - The relocation section. Its `sh_info` names the patched
///   section and its `sh_link` the symbol table.
///
/// The other arguments are those of [`apply_relocations`].
fn apply_rel_section<S: SymbolLookup + ?Sized>(
    resolver: &Resolver<'_, S>,
    part_idx: usize,
    part: &Part<'_>,
    rel_section: &Section<'_>,
    dest: &mut [u8],
) -> Result<()> {
    let sections = part.sections();
    let target = sections.get(rel_section.info() as usize).ok_or_else(|| {
        section_range_error(format!(
            "{}: {}: target section {} does not exist",
            part.name(),
            rel_section.name(),
            rel_section.info()
        ))
    })?;
    if !target.is_code() {
        return Err(section_kind_error(format!(
            "{}: {}: target {} is not code",
            part.name(),
            rel_section.name(),
            target.name()
        )));
    }
    let symtab = sections
        .get(rel_section.link() as usize)
        .filter(|s| s.sh_type() == SHT_SYMTAB)
        .ok_or_else(|| {
            malformed_error(format!(
                "{}: {}: bad symbol table link {}",
                part.name(),
                rel_section.name(),
                rel_section.link()
            ))
        })?;
    let symbols = symbol_table(part.name(), sections, symtab)?;

    let rels = RelIterator::new(LittleEndian, E_CLASS, rel_section.data()).map(ElfRel::from);
    for rel in rels {
        let kind = RelocKind::from_raw(rel.r_type())?;
        let width = kind.width();
        let out_of_bounds = || {
            malformed_error(format!(
                "{}: {}: offset {:#x} out of bounds",
                part.name(),
                rel_section.name(),
                rel.r_offset()
            ))
        };
        let start = usize::try_from(rel.r_offset()).map_err(|_| out_of_bounds())?;
        let end = start.checked_add(width).ok_or_else(out_of_bounds)?;
        let addend = read_addend(target.data().get(start..end).ok_or_else(out_of_bounds)?);

        let value = match rel.r_symbol() {
            0 => 0,
            idx => {
                let sym = symbols.get(idx).ok_or_else(|| {
                    malformed_error(format!(
                        "{}: {}: symbol {idx} out of bounds",
                        part.name(),
                        rel_section.name()
                    ))
                })?;
                let name = symbols.name(&sym).ok_or_else(|| {
                    malformed_error(format!("{}: bad name of symbol {idx}", part.name()))
                })?;
                let value = resolver.resolve(part_idx, part, &sym, name)?;
                #[cfg(feature = "log")]
                log::trace!(
                    "binding part [{}] to [{}]: symbol [{}] value [{:#x}]",
                    part.name(),
                    target.name(),
                    name,
                    value
                );
                value
            }
        };

        let dst_start = target.offset() as usize + start;
        let pc = resolver.base_address.wrapping_add(dst_start as u64);
        let field = dest
            .get_mut(dst_start..dst_start + width)
            .ok_or_else(out_of_bounds)?;
        write_relocation(kind, value.wrapping_add(addend), pc, field);
    }
    Ok(())
}
