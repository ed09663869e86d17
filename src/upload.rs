//! Uploading a binary into GPU-visible memory
use crate::{
    Result,
    binary::Binary,
    error::Error,
    image::{END_OF_CODE_MARKER, END_OF_CODE_MARKER_BYTES, END_OF_CODE_MARKERS, HALT_INSTRUCTION},
    relocation::{Resolver, SymbolLookup, apply_relocations},
};

/// A builder for uploading the code image of a [`Binary`].
///
/// # Examples
/// ```no_run
/// # use amdgpu_rtld::Binary;
/// # fn upload(binary: &Binary, dest: &mut [u8], va: u64, scratch_va: u64) {
/// let size = binary
///     .uploader(dest, va)
///     .symbols_fn(|name| (name == "scratch_va").then_some(scratch_va))
///     .upload()
///     .unwrap();
/// # }
/// ```
pub struct Uploader<'a, 'data, S = ()> {
    binary: &'a Binary<'data>,
    dest: &'a mut [u8],
    base_address: u64,
    lookup: S,
}

impl<'a, 'data> Uploader<'a, 'data, ()> {
    pub fn new(binary: &'a Binary<'data>, dest: &'a mut [u8], base_address: u64) -> Self {
        Self {
            binary,
            dest,
            base_address,
            lookup: (),
        }
    }
}

impl<'a, 'data, S: SymbolLookup> Uploader<'a, 'data, S> {
    /// Sets how symbols defined outside of the binary are found.
    pub fn symbols<S2>(self, lookup: S2) -> Uploader<'a, 'data, S2>
    where
        S2: SymbolLookup,
    {
        Uploader {
            binary: self.binary,
            dest: self.dest,
            base_address: self.base_address,
            lookup,
        }
    }

    /// Sets how symbols defined outside of the binary are found, using a
    /// closure.
    pub fn symbols_fn(
        self,
        lookup: impl Fn(&str) -> Option<u64>,
    ) -> Uploader<'a, 'data, impl Fn(&str) -> Option<u64>> {
        Uploader {
            binary: self.binary,
            dest: self.dest,
            base_address: self.base_address,
            lookup,
        }
    }

    /// Copies the code image into the destination and relocates it.
    ///
    /// Returns the number of bytes written from the start of the
    /// destination, which can be less than
    /// [`Binary::total_code_bytes`] when the image ends in padding.
    ///
    /// On error the destination holds a partially relocated image and must
    /// not be executed.
    pub fn upload(self) -> Result<u64> {
        let binary = self.binary;
        let dest = self.dest;
        let required = binary.total_code_bytes();
        if (dest.len() as u64) < required {
            return Err(Error::DestinationTooSmall {
                required,
                actual: dest.len() as u64,
            });
        }

        let mut size = 0;
        if binary.is_halt_at_entry() {
            dest[..4].copy_from_slice(&HALT_INSTRUCTION.to_le_bytes());
            size = 4;
        }

        for part in binary.parts() {
            for section in part.sections().iter().filter(|s| s.is_code()) {
                let start = section.offset() as usize;
                let data = section.data();
                dest[start..start + data.len()].copy_from_slice(data);
                size = size.max(section.offset() + data.len() as u64);
            }
        }

        let markers = binary.end_marker_offset() as usize;
        for slot in dest[markers..]
            .chunks_exact_mut(4)
            .take(END_OF_CODE_MARKERS)
        {
            slot.copy_from_slice(&END_OF_CODE_MARKER.to_le_bytes());
        }
        size = size.max(binary.end_marker_offset() + END_OF_CODE_MARKER_BYTES);

        let resolver = Resolver {
            lds: binary.lds_table(),
            base_address: self.base_address,
            lookup: &self.lookup,
        };
        for (idx, part) in binary.parts().iter().enumerate() {
            apply_relocations(&resolver, idx, part, dest)?;
        }

        #[cfg(feature = "log")]
        log::debug!(
            "uploaded [{}] parts to [{:#x}]: [{:#x}] bytes",
            binary.parts().len(),
            self.base_address,
            size
        );
        Ok(size)
    }
}
