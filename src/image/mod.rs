//! Code image layout
//!
//! All parts share one code image. The `.text` sections of the parts are
//! pasted back to back from the start of the image, so that control falls
//! through from one part into the next. The debugger end-of-code markers
//! follow them. Every other code section of every part is placed after the
//! markers, each at its own alignment.
//!
//! The layout is computed in two steps. [`provisional_layout`] places the
//! pasted and the other sections in their own regions, both starting at 0.
//! [`finalize_layout`] then knows the size of the pasted region and moves the
//! other region behind it.

use crate::{
    Result,
    error::overflow_error,
    lds::align_up,
    object::SectionFlags,
};
use alloc::vec::Vec;

/// `s_sethalt 1`
pub const HALT_INSTRUCTION: u32 = 0xbf8d_0001;
/// Instruction word filling the end-of-code marker slots.
pub const END_OF_CODE_MARKER: u32 = 0xbf9f_0000;
/// Number of end-of-code marker dwords after the pasted code.
pub const END_OF_CODE_MARKERS: usize = 5;
/// Bytes taken by the end-of-code markers.
pub const END_OF_CODE_MARKER_BYTES: u64 = 4 * END_OF_CODE_MARKERS as u64;

/// What the layout needs to know about a section.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SectionShape {
    pub flags: SectionFlags,
    pub size: u64,
    /// Power of two, at least 1.
    pub align: u64,
}

/// Where a section goes before the pasted region is complete.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Placement {
    /// Not part of the code image.
    None,
    /// Offset in the pasted region, which starts the image.
    Pasted(u64),
    /// Offset in the region of the other code sections.
    Other(u64),
}

/// Result of [`provisional_layout`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProvisionalLayout {
    /// One placement per section, per part.
    pub placements: Vec<Vec<Placement>>,
    /// Bytes of pasted code, including the halt instruction.
    pub pasted_size: u64,
    /// Bytes of the other region.
    pub other_size: u64,
    /// Largest alignment of any section in the other region.
    pub other_align: u64,
    /// Bytes of instructions across all parts.
    pub exec_size: u64,
}

/// Final placement of the code image.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CodeLayout {
    /// Offset in the image of each code section, per part.
    pub offsets: Vec<Vec<Option<u64>>>,
    /// Offset of the first end-of-code marker.
    pub end_marker_offset: u64,
    /// Bytes the image spans.
    pub total_size: u64,
    /// Bytes of instructions across all parts.
    pub exec_size: u64,
}

/// Places every code section relative to its region.
pub fn provisional_layout<P>(parts: &[P], halt_at_entry: bool) -> Result<ProvisionalLayout>
where
    P: AsRef<[SectionShape]>,
{
    let mut pasted_size: u64 = if halt_at_entry { 4 } else { 0 };
    let mut other_size: u64 = 0;
    let mut other_align: u64 = 1;
    let mut exec_size: u64 = 0;
    let mut placements = Vec::with_capacity(parts.len());

    for shapes in parts {
        let shapes = shapes.as_ref();
        let mut part = Vec::with_capacity(shapes.len());
        for shape in shapes {
            if !shape.flags.contains(SectionFlags::CODE) {
                part.push(Placement::None);
                continue;
            }
            if shape.flags.contains(SectionFlags::EXEC) {
                exec_size = exec_size
                    .checked_add(shape.size)
                    .ok_or_else(|| overflow_error("executable size"))?;
            }
            if shape.flags.contains(SectionFlags::PASTED) {
                part.push(Placement::Pasted(pasted_size));
                pasted_size = pasted_size
                    .checked_add(shape.size)
                    .ok_or_else(|| overflow_error("pasted code size"))?;
            } else {
                other_align = other_align.max(shape.align);
                let offset = align_up(other_size, shape.align)
                    .ok_or_else(|| overflow_error("code image size"))?;
                part.push(Placement::Other(offset));
                other_size = offset
                    .checked_add(shape.size)
                    .ok_or_else(|| overflow_error("code image size"))?;
            }
        }
        placements.push(part);
    }

    Ok(ProvisionalLayout {
        placements,
        pasted_size,
        other_size,
        other_align,
        exec_size,
    })
}

/// Puts the end-of-code markers after the pasted code and moves the other
/// region behind them.
pub fn finalize_layout(provisional: &ProvisionalLayout) -> Result<CodeLayout> {
    let end_marker_offset = provisional.pasted_size;
    let base = end_marker_offset
        .checked_add(END_OF_CODE_MARKER_BYTES)
        .and_then(|end| align_up(end, provisional.other_align))
        .ok_or_else(|| overflow_error("code image size"))?;
    let total_size = base
        .checked_add(provisional.other_size)
        .ok_or_else(|| overflow_error("code image size"))?;

    let offsets = provisional
        .placements
        .iter()
        .map(|part| {
            part.iter()
                .map(|placement| match *placement {
                    Placement::None => None,
                    Placement::Pasted(offset) => Some(offset),
                    // cannot overflow: offset < other_size
                    Placement::Other(offset) => Some(base + offset),
                })
                .collect()
        })
        .collect();

    Ok(CodeLayout {
        offsets,
        end_marker_offset,
        total_size,
        exec_size: provisional.exec_size,
    })
}
