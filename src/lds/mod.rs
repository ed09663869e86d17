//! Local data share (LDS) symbols
//!
//! LDS is the on-chip memory of a workgroup. It is a separate address space
//! from the code image: an LDS symbol resolves to its byte offset in LDS.
//! Symbols are either shared by every part of a binary, or private to the
//! part that declares them. Private symbols of all parts are laid out after
//! the shared ones, so the shared symbols form a common prefix.

mod collect;
mod layout;

pub(crate) use collect::collect_private_symbols;
pub use layout::{align_up, layout};

use crate::{Result, error::alignment_error};
use alloc::{format, string::String, vec::Vec};
use core::hash::{Hash, Hasher};
use foldhash::{SharedSeed, fast::FoldHasher};
use hashbrown::HashTable;

/// Name of the sentinel symbol marking the end of the LDS region.
pub const LDS_END: &str = "__lds_end";
/// Alignments above this value are clamped.
pub const MAX_LDS_ALIGN: u64 = 1 << 16;
/// Largest size a single LDS symbol may declare.
pub const MAX_LDS_SYMBOL_SIZE: u64 = 1 << 29;

/// Which parts can see an LDS symbol.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Owner {
    /// Visible to every part.
    Shared,
    /// Private to the part at this index.
    Part(usize),
}

/// A named region of LDS.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LdsSymbol {
    name: String,
    size: u64,
    align: u64,
    offset: u64,
    owner: Owner,
}

impl LdsSymbol {
    /// Declares a symbol shared by every part of a binary.
    ///
    /// `align` must be a power of two, which is checked when the binary is
    /// opened.
    pub fn shared(name: &str, size: u64, align: u64) -> Self {
        Self::new(name, size, align, Owner::Shared)
    }

    pub(crate) fn new(name: &str, size: u64, align: u64, owner: Owner) -> Self {
        Self {
            name: name.into(),
            size,
            align,
            offset: 0,
            owner,
        }
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn size(&self) -> u64 {
        self.size
    }

    #[inline]
    pub fn align(&self) -> u64 {
        self.align
    }

    /// Byte offset in LDS, assigned by [`layout`].
    #[inline]
    pub fn offset(&self) -> u64 {
        self.offset
    }

    #[inline]
    pub fn owner(&self) -> Owner {
        self.owner
    }

    #[inline]
    pub(crate) fn set_offset(&mut self, offset: u64) {
        self.offset = offset;
    }

    /// Whether `part` can see this symbol.
    #[inline]
    pub fn is_visible_to(&self, part: usize) -> bool {
        match self.owner {
            Owner::Shared => true,
            Owner::Part(idx) => idx == part,
        }
    }
}

pub(crate) fn check_alignment(name: &str, align: u64) -> Result<()> {
    if !align.is_power_of_two() {
        return Err(alignment_error(format!(
            "LDS symbol {name}: alignment {align} is not a power of two"
        )));
    }
    Ok(())
}

struct NameEntry {
    name: String,
    /// Indices into the symbol list, in declaration order.
    indices: Vec<usize>,
}

const HASHER: FoldHasher<'static> = FoldHasher::with_seed(0, SharedSeed::global_fixed());

#[inline]
fn hash_name(name: &str) -> u64 {
    let mut hasher = HASHER;
    name.hash(&mut hasher);
    hasher.finish()
}

/// The LDS symbols of a binary: shared symbols first, then the private
/// symbols of each part in part order.
///
/// A name may be declared once as shared and once per part. Lookups return
/// the first declaration visible to the asking part.
#[derive(Default)]
pub(crate) struct LdsSymbols {
    symbols: Vec<LdsSymbol>,
    index: HashTable<NameEntry>,
}

impl LdsSymbols {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, symbol: LdsSymbol) {
        let idx = self.symbols.len();
        let hash = hash_name(&symbol.name);
        match self
            .index
            .find_mut(hash, |entry| entry.name == symbol.name)
        {
            Some(entry) => entry.indices.push(idx),
            None => {
                self.index.insert_unique(
                    hash,
                    NameEntry {
                        name: symbol.name.clone(),
                        indices: alloc::vec![idx],
                    },
                    |entry| hash_name(&entry.name),
                );
            }
        }
        self.symbols.push(symbol);
    }

    /// Finds the first symbol called `name` visible to `part`.
    pub(crate) fn find(&self, name: &str, part: usize) -> Option<&LdsSymbol> {
        let entry = self.index.find(hash_name(name), |entry| entry.name == name)?;
        entry
            .indices
            .iter()
            .map(|&idx| &self.symbols[idx])
            .find(|symbol| symbol.is_visible_to(part))
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.symbols.len()
    }

    #[inline]
    pub(crate) fn as_slice(&self) -> &[LdsSymbol] {
        &self.symbols
    }

    /// Offsets can be changed, names cannot: the index stays valid.
    #[inline]
    pub(crate) fn range_mut(&mut self, start: usize) -> &mut [LdsSymbol] {
        &mut self.symbols[start..]
    }
}
