use crate::{
    Result,
    binary::Part,
    elf::ElfSymbol,
    error::{section_kind_error, section_range_error, unknown_symbol_error},
    lds::LdsSymbols,
};
use alloc::format;

/// A trait for looking up symbols defined outside of the binary.
///
/// The upload consults it for every undefined symbol that is not an LDS
/// symbol, such as the address of a scratch buffer or of a constant table
/// the driver uploads separately.
///
/// # Examples
///
/// Using a closure:
/// ```rust
/// use amdgpu_rtld::SymbolLookup;
///
/// let lookup = |name: &str| -> Option<u64> {
///     match name {
///         "scratch_va" => Some(0x1_0000_0000),
///         _ => None,
///     }
/// };
/// assert_eq!(lookup.lookup("scratch_va"), Some(0x1_0000_0000));
/// ```
pub trait SymbolLookup {
    /// Returns the value of the symbol called `name`, if it is known.
    fn lookup(&self, name: &str) -> Option<u64>;
}

impl<F: ?Sized> SymbolLookup for F
where
    F: Fn(&str) -> Option<u64>,
{
    fn lookup(&self, name: &str) -> Option<u64> {
        self(name)
    }
}

impl SymbolLookup for () {
    fn lookup(&self, _name: &str) -> Option<u64> {
        None
    }
}

/// Computes symbol values for one upload.
pub(crate) struct Resolver<'a, S: ?Sized> {
    pub(crate) lds: &'a LdsSymbols,
    pub(crate) base_address: u64,
    pub(crate) lookup: &'a S,
}

impl<S: SymbolLookup + ?Sized> Resolver<'_, S> {
    /// Returns the value of `sym`, a symbol of the part at `part_idx`.
    ///
    /// LDS symbols resolve to their offset in LDS, symbols defined in a code
    /// section to their address in the uploaded image.
    pub(crate) fn resolve(
        &self,
        part_idx: usize,
        part: &Part<'_>,
        sym: &ElfSymbol,
        name: &str,
    ) -> Result<u64> {
        if sym.is_lds_or_undef() {
            if let Some(lds) = self.lds.find(name, part_idx) {
                return Ok(lds.offset());
            }
            return self
                .lookup
                .lookup(name)
                .ok_or_else(|| unknown_symbol_error(name));
        }

        let shndx = sym.st_shndx() as usize;
        let section = part.sections().get(shndx).ok_or_else(|| {
            section_range_error(format!(
                "{}: symbol {name} references section {shndx}",
                part.name()
            ))
        })?;
        if !section.is_code() {
            return Err(section_kind_error(format!(
                "{}: symbol {name} is defined in {}, which is not code",
                part.name(),
                section.name()
            )));
        }
        Ok(self
            .base_address
            .wrapping_add(section.offset())
            .wrapping_add(sym.st_value()))
    }
}
