use alloc::{borrow::Cow, string::String};
use core::fmt::Display;

/// Error types used throughout the `amdgpu_rtld` library.
///
/// Errors raised while opening a [`Binary`](crate::Binary) are atomic: no
/// binary is produced. Errors raised while uploading abort the remaining
/// relocation work but leave already written destination bytes in place, so
/// the destination must be discarded by the caller.
#[derive(Debug)]
pub enum Error {
    /// A part is not a well-formed AMDGPU relocatable object.
    ///
    /// This covers:
    /// * A wrong machine tag or object type
    /// * A section with a non-zero base address or a misaligned size
    /// * Truncated or out of bounds section, symbol or relocation data
    MalformedObject {
        /// A descriptive message naming the offending part.
        msg: Cow<'static, str>,
    },

    /// An LDS symbol declares an alignment that is not a power of two.
    BadAlignment {
        /// A descriptive message about the alignment error.
        msg: Cow<'static, str>,
    },

    /// Arithmetic overflow while accumulating code or LDS offsets.
    SizeOverflow {
        /// A descriptive message about the overflow.
        msg: Cow<'static, str>,
    },

    /// The LDS layout needs more memory than the hardware provides.
    LocalMemoryOverflow {
        /// Bytes required by the layout.
        used: u64,
        /// Bytes available on the target GFX level.
        max: u64,
    },

    /// A relocation references a symbol that is neither an LDS symbol nor
    /// resolvable through the external lookup.
    UnknownSymbol {
        /// The unresolved symbol name.
        name: String,
    },

    /// A symbol references a section index past the end of the section table.
    SectionOutOfRange {
        /// A descriptive message about the symbol.
        msg: Cow<'static, str>,
    },

    /// A symbol or relocation table references a section that is not part of
    /// the code image.
    BadSectionKind {
        /// A descriptive message about the section.
        msg: Cow<'static, str>,
    },

    /// A relocation type the loader does not know how to apply.
    UnsupportedRelocationKind {
        /// The raw AMDGPU relocation type.
        r_type: u32,
    },

    /// A relocation section carrying explicit addends (`SHT_RELA`).
    UnsupportedRelocationSection {
        /// A descriptive message naming the section.
        msg: Cow<'static, str>,
    },

    /// The upload destination cannot hold the code image.
    DestinationTooSmall {
        /// Bytes required by the binary.
        required: u64,
        /// Bytes provided by the caller.
        actual: u64,
    },

    /// Resource settings that must agree across parts differ.
    InconsistentParts {
        /// A descriptive message about the disagreeing field.
        msg: Cow<'static, str>,
    },
}

impl Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Error::MalformedObject { msg } => write!(f, "Malformed object: {msg}"),
            Error::BadAlignment { msg } => write!(f, "Bad alignment: {msg}"),
            Error::SizeOverflow { msg } => write!(f, "Size overflow: {msg}"),
            Error::LocalMemoryOverflow { used, max } => {
                write!(f, "Too much LDS: used = {used}, max = {max}")
            }
            Error::UnknownSymbol { name } => write!(f, "Unknown symbol: {name}"),
            Error::SectionOutOfRange { msg } => write!(f, "Section out of range: {msg}"),
            Error::BadSectionKind { msg } => write!(f, "Bad section kind: {msg}"),
            Error::UnsupportedRelocationKind { r_type } => {
                write!(f, "Unsupported relocation type: {r_type}")
            }
            Error::UnsupportedRelocationSection { msg } => {
                write!(f, "Unsupported relocation section: {msg}")
            }
            Error::DestinationTooSmall { required, actual } => write!(
                f,
                "Upload destination too small: required = {required}, actual = {actual}"
            ),
            Error::InconsistentParts { msg } => write!(f, "Inconsistent parts: {msg}"),
        }
    }
}

impl core::error::Error for Error {}

#[cold]
#[inline(never)]
pub(crate) fn malformed_error(msg: impl Into<Cow<'static, str>>) -> Error {
    Error::MalformedObject { msg: msg.into() }
}

#[cold]
#[inline(never)]
pub(crate) fn alignment_error(msg: impl Into<Cow<'static, str>>) -> Error {
    Error::BadAlignment { msg: msg.into() }
}

#[cold]
#[inline(never)]
pub(crate) fn overflow_error(msg: impl Into<Cow<'static, str>>) -> Error {
    Error::SizeOverflow { msg: msg.into() }
}

#[cold]
#[inline(never)]
pub(crate) fn lds_overflow_error(used: u64, max: u64) -> Error {
    Error::LocalMemoryOverflow { used, max }
}

#[cold]
#[inline(never)]
pub(crate) fn unknown_symbol_error(name: &str) -> Error {
    Error::UnknownSymbol { name: name.into() }
}

#[cold]
#[inline(never)]
pub(crate) fn section_range_error(msg: impl Into<Cow<'static, str>>) -> Error {
    Error::SectionOutOfRange { msg: msg.into() }
}

#[cold]
#[inline(never)]
pub(crate) fn section_kind_error(msg: impl Into<Cow<'static, str>>) -> Error {
    Error::BadSectionKind { msg: msg.into() }
}

#[cold]
#[inline(never)]
pub(crate) fn reloc_kind_error(r_type: u32) -> Error {
    Error::UnsupportedRelocationKind { r_type }
}

#[cold]
#[inline(never)]
pub(crate) fn reloc_section_error(msg: impl Into<Cow<'static, str>>) -> Error {
    Error::UnsupportedRelocationSection { msg: msg.into() }
}

/// Creates an inconsistent parts error with the specified message.
///
/// Used by the config reader when two parts disagree on a setting that only
/// one value can exist for in the final shader.
#[cold]
#[inline(never)]
pub(crate) fn inconsistent_error(msg: impl Into<Cow<'static, str>>) -> Error {
    Error::InconsistentParts { msg: msg.into() }
}
