//! ELF symbol table handling
//!
//! Symbol tables are parsed lazily by the `elf` crate straight out of the
//! part's bytes; nothing is copied or converted up front.

use super::{E_CLASS, ElfSymbol};
use elf::{endian::LittleEndian, string_table::StringTable, symbol};

/// Symbol table of one part, paired with its string table.
pub(crate) struct SymbolTable<'data> {
    symbols: symbol::SymbolTable<'data, LittleEndian>,
    strtab: StringTable<'data>,
}

impl<'data> SymbolTable<'data> {
    /// Creates a symbol table over the raw sections of a part.
    ///
    /// # Arguments
    /// * `entries` - The content of the `SHT_SYMTAB` section.
    /// * `strtab` - The content of the string table it links to.
    pub(crate) fn new(entries: &'data [u8], strtab: &'data [u8]) -> Self {
        Self {
            symbols: symbol::SymbolTable::new(LittleEndian, E_CLASS, entries),
            strtab: StringTable::new(strtab),
        }
    }

    /// Gets the symbol at `idx`, or `None` past the end of the table.
    #[inline]
    pub(crate) fn get(&self, idx: usize) -> Option<ElfSymbol> {
        self.symbols.get(idx).ok().map(ElfSymbol::from)
    }

    /// Gets the name of `sym`, or `None` if it points outside the string table.
    #[inline]
    pub(crate) fn name(&self, sym: &ElfSymbol) -> Option<&'data str> {
        self.strtab.get(sym.st_name() as usize).ok()
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = ElfSymbol> + 'data {
        self.symbols.iter().map(ElfSymbol::from)
    }
}
