//! Opening multi-part binaries
use crate::{
    Result,
    error::{alignment_error, lds_overflow_error, malformed_error, overflow_error},
    image::{finalize_layout, provisional_layout},
    lds::{
        LDS_END, LdsSymbol, LdsSymbols, MAX_LDS_ALIGN, MAX_LDS_SYMBOL_SIZE, Owner, align_up,
        check_alignment, collect_private_symbols, layout,
    },
    object::{ElfPart, Section, read_sections},
    target::{GfxLevel, OpenOptions, WaveSize},
    upload::Uploader,
};
use alloc::{format, string::String, vec::Vec};
use delegate::delegate;

/// One opened part of a [`Binary`].
pub struct Part<'data> {
    name: String,
    bytes: &'data [u8],
    sections: Vec<Section<'data>>,
}

impl<'data> Part<'data> {
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The object the part was opened from.
    #[inline]
    pub fn bytes(&self) -> &'data [u8] {
        self.bytes
    }

    /// Section table, indexed by ELF section index.
    #[inline]
    pub fn sections(&self) -> &[Section<'data>] {
        &self.sections
    }

    /// Content of the first section called `name`.
    pub fn section_by_name(&self, name: &str) -> Option<&'data [u8]> {
        self.sections
            .iter()
            .find(|section| section.name() == name)
            .map(Section::data)
    }
}

/// Sizes of the code image.
#[derive(Clone, Copy, Debug)]
struct ImageInfo {
    total_code_bytes: u64,
    executable_byte_count: u64,
    end_marker_offset: u64,
}

impl ImageInfo {
    #[inline]
    fn total_code_bytes(&self) -> u64 {
        self.total_code_bytes
    }

    #[inline]
    fn executable_byte_count(&self) -> u64 {
        self.executable_byte_count
    }

    #[inline]
    fn end_marker_offset(&self) -> u64 {
        self.end_marker_offset
    }
}

/// A linked shader binary, ready to be uploaded.
///
/// A binary is immutable once opened. It borrows the objects of its parts,
/// which must outlive it.
pub struct Binary<'data> {
    parts: Vec<Part<'data>>,
    lds: LdsSymbols,
    lds_size: u64,
    image: ImageInfo,
    gfx_level: GfxLevel,
    wave_size: WaveSize,
    options: OpenOptions,
}

impl<'data> Binary<'data> {
    /// Starts describing a binary for the given target.
    pub fn builder(gfx_level: GfxLevel, wave_size: WaveSize) -> BinaryBuilder<'data> {
        BinaryBuilder::new(gfx_level, wave_size)
    }

    delegate! {
        to self.image {
            /// Bytes the code image spans. An upload destination must be at
            /// least this large.
            pub fn total_code_bytes(&self) -> u64;
            /// Bytes of instructions across all parts.
            pub fn executable_byte_count(&self) -> u64;
            /// Offset of the debugger end-of-code markers in the code image.
            pub fn end_marker_offset(&self) -> u64;
        }
    }

    delegate! {
        to self.options {
            /// Whether the image starts with `s_sethalt 1`.
            pub fn is_halt_at_entry(&self) -> bool;
        }
    }

    /// Bytes of LDS the binary needs.
    #[inline]
    pub fn total_local_memory_bytes(&self) -> u64 {
        self.lds_size
    }

    #[inline]
    pub fn parts(&self) -> &[Part<'data>] {
        &self.parts
    }

    #[inline]
    pub fn gfx_level(&self) -> GfxLevel {
        self.gfx_level
    }

    #[inline]
    pub fn wave_size(&self) -> WaveSize {
        self.wave_size
    }

    /// All LDS symbols: shared ones first, then each part's private ones,
    /// then `__lds_end` if any part declares it.
    #[inline]
    pub fn lds_symbols(&self) -> &[LdsSymbol] {
        self.lds.as_slice()
    }

    /// The LDS symbols private to the part at `part`.
    pub fn private_lds_symbols(&self, part: usize) -> impl Iterator<Item = &LdsSymbol> {
        self.lds
            .as_slice()
            .iter()
            .filter(move |symbol| symbol.owner() == Owner::Part(part))
    }

    /// Finds the LDS symbol called `name` as the part at `part` sees it.
    #[inline]
    pub fn find_lds_symbol(&self, name: &str, part: usize) -> Option<&LdsSymbol> {
        self.lds.find(name, part)
    }

    pub(crate) fn lds_table(&self) -> &LdsSymbols {
        &self.lds
    }

    /// Content of the section called `name`.
    ///
    /// Only single-part binaries can be queried: for any other binary this
    /// returns `None`. Use [`Part::section_by_name`] instead.
    pub fn section_by_name(&self, name: &str) -> Option<&'data [u8]> {
        match self.parts.as_slice() {
            [part] => part.section_by_name(name),
            _ => None,
        }
    }

    /// Prepares an upload of the code image into `dest`, which the GPU sees
    /// at `base_address`.
    pub fn uploader<'a>(&'a self, dest: &'a mut [u8], base_address: u64) -> Uploader<'a, 'data> {
        Uploader::new(self, dest, base_address)
    }

    /// Releases the binary. Dropping it has the same effect.
    pub fn close(self) {}
}

/// Describes a binary and opens it.
///
/// # Examples
/// ```no_run
/// use amdgpu_rtld::{Binary, ElfPart, GfxLevel, LdsSymbol, WaveSize};
///
/// let main: &[u8] = &[]; // compiled part
/// let epilog: &[u8] = &[]; // compiled part
/// let binary = Binary::builder(GfxLevel::Gfx10_3, WaveSize::Wave64)
///     .shared_lds_symbol(LdsSymbol::shared("esgs_ring", 4096, 65536))
///     .part(ElfPart::new("main", main))
///     .part(ElfPart::new("epilog", epilog))
///     .open()
///     .unwrap();
/// println!("code: {} bytes", binary.total_code_bytes());
/// ```
pub struct BinaryBuilder<'data> {
    gfx_level: GfxLevel,
    wave_size: WaveSize,
    options: OpenOptions,
    shared: Vec<LdsSymbol>,
    parts: Vec<ElfPart<'data>>,
}

impl<'data> BinaryBuilder<'data> {
    pub fn new(gfx_level: GfxLevel, wave_size: WaveSize) -> Self {
        Self {
            gfx_level,
            wave_size,
            options: OpenOptions::default(),
            shared: Vec::new(),
            parts: Vec::new(),
        }
    }

    pub fn options(mut self, options: OpenOptions) -> Self {
        self.options = options;
        self
    }

    /// Starts the image with `s_sethalt 1`.
    pub fn halt_at_entry(mut self, halt_at_entry: bool) -> Self {
        self.options = self.options.halt_at_entry(halt_at_entry);
        self
    }

    /// Adds an LDS symbol every part can use, at the same offset.
    pub fn shared_lds_symbol(mut self, symbol: LdsSymbol) -> Self {
        self.shared.push(symbol);
        self
    }

    pub fn shared_lds_symbols(mut self, symbols: impl IntoIterator<Item = LdsSymbol>) -> Self {
        self.shared.extend(symbols);
        self
    }

    /// Appends a part. Parts are pasted in the order they are added.
    pub fn part(mut self, part: ElfPart<'data>) -> Self {
        self.parts.push(part);
        self
    }

    pub fn parts(mut self, parts: impl IntoIterator<Item = ElfPart<'data>>) -> Self {
        self.parts.extend(parts);
        self
    }

    /// Links the parts.
    ///
    /// Nothing is returned on error: parts opened so far are dropped.
    pub fn open(self) -> Result<Binary<'data>> {
        let max_lds_size = self.gfx_level.max_lds_size();

        let mut lds = LdsSymbols::new();
        for symbol in self.shared {
            check_alignment(symbol.name(), symbol.align())?;
            if symbol.align() > MAX_LDS_ALIGN {
                return Err(alignment_error(format!(
                    "LDS symbol {}: alignment {} is above {MAX_LDS_ALIGN}",
                    symbol.name(),
                    symbol.align()
                )));
            }
            if symbol.size() > MAX_LDS_SYMBOL_SIZE {
                return Err(malformed_error(format!(
                    "shared LDS symbol {} is too large ({} bytes)",
                    symbol.name(),
                    symbol.size()
                )));
            }
            lds.push(LdsSymbol::new(
                symbol.name(),
                symbol.size(),
                symbol.align(),
                Owner::Shared,
            ));
        }
        let shared_size = layout(lds.range_mut(0), 0)?;
        if shared_size > max_lds_size {
            return Err(lds_overflow_error(shared_size, max_lds_size));
        }

        let mut parts = Vec::with_capacity(self.parts.len());
        let mut lds_size = shared_size;
        let mut lds_end_align = 0;
        for (idx, part) in self.parts.into_iter().enumerate() {
            let (name, bytes) = part.into_parts();
            let sections = read_sections(&name, bytes)?;
            let start = lds.len();
            collect_private_symbols(&name, idx, &sections, &mut lds, &mut lds_end_align)?;
            lds_size = lds_size.max(layout(lds.range_mut(start), shared_size)?);
            parts.push(Part {
                name,
                bytes,
                sections,
            });
        }

        if lds_end_align != 0 {
            lds_size = align_up(lds_size, lds_end_align)
                .ok_or_else(|| overflow_error(format!("{LDS_END} alignment")))?;
            let mut end = LdsSymbol::new(LDS_END, 0, lds_end_align, Owner::Shared);
            end.set_offset(lds_size);
            lds.push(end);
        }
        if lds_size > max_lds_size {
            return Err(lds_overflow_error(lds_size, max_lds_size));
        }

        let shapes: Vec<Vec<_>> = parts
            .iter()
            .map(|part| part.sections.iter().map(Section::shape).collect())
            .collect();
        let code = finalize_layout(&provisional_layout(
            &shapes,
            self.options.is_halt_at_entry(),
        )?)?;
        for (part, offsets) in parts.iter_mut().zip(code.offsets) {
            for (section, offset) in part.sections.iter_mut().zip(offsets) {
                if let Some(offset) = offset {
                    #[cfg(feature = "log")]
                    log::trace!(
                        "[{}] place section [{}] at [{:#x}] size [{:#x}]",
                        part.name,
                        section.name(),
                        offset,
                        section.size()
                    );
                    section.set_offset(offset);
                }
            }
        }

        #[cfg(feature = "log")]
        log::debug!(
            "opened binary: parts [{}] code [{:#x}] exec [{:#x}] lds [{:#x}]",
            parts.len(),
            code.total_size,
            code.exec_size,
            lds_size
        );

        Ok(Binary {
            parts,
            lds,
            lds_size,
            image: ImageInfo {
                total_code_bytes: code.total_size,
                executable_byte_count: code.exec_size,
                end_marker_offset: code.end_marker_offset,
            },
            gfx_level: self.gfx_level,
            wave_size: self.wave_size,
            options: self.options,
        })
    }
}
