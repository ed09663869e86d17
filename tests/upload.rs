mod common;

use amdgpu_rtld::{Error, LdsSymbol, image::END_OF_CODE_MARKER, image::HALT_INSTRUCTION};
use common::{builder, open, read_u32, read_u64, text_part, upload};
use gen_part::{
    PartBuilder, R_AMDGPU_ABS32, R_AMDGPU_ABS32_HI, R_AMDGPU_ABS32_LO, R_AMDGPU_ABS64,
    R_AMDGPU_GOTPCREL, R_AMDGPU_REL32, R_AMDGPU_REL32_HI, R_AMDGPU_REL32_LO, R_AMDGPU_REL64,
    S_ENDPGM, S_NOP, SectionDesc, SymbolDesc, dwords,
};
use rstest::rstest;

const BASE: u64 = 0x1_2345_0000;

fn no_symbols(_: &str) -> Option<u64> {
    None
}

/// A part whose `.text` is `code` with one relocation at `offset` against the
/// undefined symbol `name`.
fn reloc_part(code: &[u32], offset: u64, name: &str, r_type: u32) -> Vec<u8> {
    let mut part = PartBuilder::new();
    let text = part.add_section(SectionDesc::text(dwords(code)));
    let sym = part.add_symbol(SymbolDesc::undefined(name));
    part.add_reloc(text, offset, sym, r_type);
    part.build().unwrap()
}

#[rstest]
fn absolute_external_symbol() {
    let bytes = reloc_part(&[4, S_ENDPGM], 0, "ext", R_AMDGPU_ABS32);
    let binary = open(&[&bytes]);
    let (dest, _) = upload(&binary, BASE, |name| (name == "ext").then_some(0x1000));
    assert_eq!(&dest[..4], &0x1004u32.to_le_bytes());
    assert_eq!(read_u32(&dest, 4), S_ENDPGM);
}

#[rstest]
#[case::lo(R_AMDGPU_ABS32_LO, 0x9abc_def4)]
#[case::hi(R_AMDGPU_ABS32_HI, 0x1234_5678)]
fn absolute_halves(#[case] r_type: u32, #[case] expected: u32) {
    let bytes = reloc_part(&[S_NOP, 4, S_ENDPGM], 4, "ext", r_type);
    let binary = open(&[&bytes]);
    let (dest, _) = upload(&binary, BASE, |_| Some(0x1234_5678_9abc_def0));
    assert_eq!(read_u32(&dest, 4), expected);
}

#[rstest]
fn absolute_64() {
    let bytes = reloc_part(&[S_NOP, 0x10, 0, S_ENDPGM], 4, "ext", R_AMDGPU_ABS64);
    let binary = open(&[&bytes]);
    let (dest, _) = upload(&binary, BASE, |_| Some(0xffff_0000_0000_0000));
    assert_eq!(read_u64(&dest, 4), 0xffff_0000_0000_0010);
}

#[rstest]
fn relative_to_a_code_symbol() {
    let mut part = PartBuilder::new();
    let text = part.add_section(SectionDesc::text(dwords(&[S_NOP, 0, S_ENDPGM])));
    let table = part.add_section(SectionDesc::rodata(".rodata", vec![0xab; 16], 16));
    let sym = part.add_symbol(SymbolDesc::defined("table", table, 8));
    part.add_reloc(text, 4, sym, R_AMDGPU_REL32);
    let bytes = part.build().unwrap();
    let binary = open(&[&bytes]);

    let rodata = binary.parts()[0].sections()[table as usize].offset();
    // 12 bytes of text and 20 of markers, rounded up to 16
    assert_eq!(rodata, 32);
    let (dest, _) = upload(&binary, BASE, no_symbols);
    assert_eq!(read_u32(&dest, 4), (rodata + 8 - 4) as u32);
    assert_eq!(&dest[32..48], &[0xab; 16]);
}

#[rstest]
#[case::lo(R_AMDGPU_REL32_LO, 0x10)]
#[case::hi(R_AMDGPU_REL32_HI, 1)]
fn relative_halves(#[case] r_type: u32, #[case] expected: u32) {
    let bytes = reloc_part(&[S_NOP, 0, S_ENDPGM], 4, "far", r_type);
    let binary = open(&[&bytes]);
    // 4 GiB + 0x10 past the patched field at BASE + 4
    let (dest, _) = upload(&binary, BASE, |_| Some(BASE + (1 << 32) + 0x14));
    assert_eq!(read_u32(&dest, 4), expected);
}

#[rstest]
fn relative_64() {
    let bytes = reloc_part(&[S_NOP, S_NOP, 0, 0, S_ENDPGM], 8, "data", R_AMDGPU_REL64);
    let binary = open(&[&bytes]);
    let (dest, _) = upload(&binary, BASE, |_| Some(BASE - 0x100));
    assert_eq!(read_u64(&dest, 8), (-0x108i64) as u64);
}

#[rstest]
fn symbols_of_later_parts() {
    let first = text_part(&[S_NOP, S_NOP, S_ENDPGM]);
    let mut part = PartBuilder::new();
    let text = part.add_section(SectionDesc::text(dwords(&[S_NOP, S_ENDPGM])));
    let consts = part.add_section(SectionDesc::rodata(".rodata", vec![0; 8], 8));
    let sym = part.add_symbol(SymbolDesc::defined("entry", text, 4));
    part.add_reloc(consts, 0, sym, R_AMDGPU_ABS64);
    let second = part.build().unwrap();

    let binary = open(&[&first, &second]);
    let (dest, _) = upload(&binary, BASE, no_symbols);
    let rodata = binary.parts()[1].sections()[consts as usize].offset();
    assert_eq!(read_u64(&dest, rodata), BASE + 12 + 4);
}

#[rstest]
fn lds_symbols_resolve_to_their_offset() {
    let mut part = PartBuilder::new();
    let text = part.add_section(SectionDesc::text(dwords(&[0, 0, 0, S_ENDPGM])));
    let x = part.add_symbol(SymbolDesc::undefined("X"));
    let y = part.add_symbol(SymbolDesc::lds("Y", 4, 4));
    let old = part.add_symbol(SymbolDesc::legacy_lds("old", 4, 2));
    part.add_reloc(text, 0, x, R_AMDGPU_ABS32);
    part.add_reloc(text, 4, y, R_AMDGPU_ABS32);
    part.add_reloc(text, 8, old, R_AMDGPU_ABS32);
    let bytes = part.build().unwrap();

    let binary = builder(&[&bytes])
        .shared_lds_symbol(LdsSymbol::shared("X", 8, 8))
        .open()
        .unwrap();
    // the external lookup is never consulted for LDS symbols
    let (dest, _) = upload(&binary, BASE, |_| Some(0xdead));
    assert_eq!(read_u32(&dest, 0), 0);
    assert_eq!(read_u32(&dest, 4), 8);
    assert_eq!(read_u32(&dest, 8), 12);
}

#[rstest]
fn relocation_without_symbol() {
    let mut part = PartBuilder::new();
    let text = part.add_section(SectionDesc::text(dwords(&[0x40, S_ENDPGM])));
    part.add_reloc(text, 0, 0, R_AMDGPU_ABS32);
    let bytes = part.build().unwrap();
    let binary = open(&[&bytes]);
    let (dest, _) = upload(&binary, BASE, no_symbols);
    assert_eq!(read_u32(&dest, 0), 0x40);
}

#[rstest]
fn round_trip_without_relocations() {
    let code = [S_NOP, 0x1234_5678, S_NOP, S_ENDPGM];
    let mut part = PartBuilder::new();
    part.add_section(SectionDesc::text(dwords(&code)));
    part.add_section(SectionDesc::rodata(".rodata", (0..24).collect(), 8));
    let bytes = part.build().unwrap();
    let binary = open(&[&bytes]);
    let (dest, size) = upload(&binary, BASE, no_symbols);

    for section in binary.parts()[0].sections().iter().filter(|s| s.is_code()) {
        let start = section.offset() as usize;
        assert_eq!(&dest[start..start + section.data().len()], section.data());
    }
    assert_eq!(size, binary.total_code_bytes());
    assert_eq!(binary.total_code_bytes(), 40 + 24);
}

#[rstest]
fn markers_follow_the_pasted_code() {
    let first = text_part(&[S_NOP, S_ENDPGM]);
    let second = text_part(&[S_ENDPGM]);
    let binary = open(&[&first, &second]);
    let (dest, size) = upload(&binary, BASE, no_symbols);

    assert_eq!(read_u32(&dest, 8), S_ENDPGM);
    let markers = binary.end_marker_offset();
    assert_eq!(markers, 12);
    for slot in 0..5 {
        assert_eq!(read_u32(&dest, markers + 4 * slot), END_OF_CODE_MARKER);
    }
    assert_eq!(size, markers + 20);
}

#[rstest]
fn halt_instruction_is_written() {
    let bytes = text_part(&[S_ENDPGM]);
    let binary = builder(&[&bytes]).halt_at_entry(true).open().unwrap();
    let (dest, _) = upload(&binary, BASE, no_symbols);
    assert_eq!(read_u32(&dest, 0), HALT_INSTRUCTION);
    assert_eq!(read_u32(&dest, 4), S_ENDPGM);
    assert_eq!(read_u32(&dest, 8), END_OF_CODE_MARKER);
}

#[rstest]
fn upload_is_repeatable() {
    let bytes = reloc_part(&[S_NOP, 8, 0, S_ENDPGM], 4, "ext", R_AMDGPU_ABS64);
    let binary = open(&[&bytes]);
    let lookup = |_: &str| -> Option<u64> { Some(0x7700_0000_0000) };
    let first = upload(&binary, BASE, lookup);
    let second = upload(&binary, BASE, lookup);
    assert_eq!(first, second);
}

#[rstest]
fn addend_comes_from_the_object() {
    let bytes = reloc_part(&[4, S_ENDPGM], 0, "ext", R_AMDGPU_ABS32);
    let binary = open(&[&bytes]);
    let mut dest = vec![0xffu8; binary.total_code_bytes() as usize + 16];
    binary
        .uploader(&mut dest, BASE)
        .symbols_fn(|_| Some(0x100))
        .upload()
        .unwrap();
    assert_eq!(read_u32(&dest, 0), 0x104);
    // bytes past the image are left alone
    assert_eq!(*dest.last().unwrap(), 0xff);
}

#[rstest]
fn unsupported_relocation_kind() {
    let mut part = PartBuilder::new();
    let text = part.add_section(SectionDesc::text(dwords(&[0, 0, S_ENDPGM])));
    let sym = part.add_symbol(SymbolDesc::undefined("ext"));
    part.add_reloc(text, 0, sym, R_AMDGPU_GOTPCREL);
    part.add_reloc(text, 4, sym, R_AMDGPU_ABS32);
    let bytes = part.build().unwrap();
    let binary = open(&[&bytes]);

    let mut dest = vec![0u8; binary.total_code_bytes() as usize];
    let err = binary
        .uploader(&mut dest, BASE)
        .symbols_fn(|_| Some(1))
        .upload()
        .unwrap_err();
    assert!(
        matches!(err, Error::UnsupportedRelocationKind { r_type: R_AMDGPU_GOTPCREL }),
        "{err}"
    );
}

#[rstest]
fn rela_is_rejected() {
    let mut part = PartBuilder::new();
    part.use_rela(true);
    let text = part.add_section(SectionDesc::text(dwords(&[0, S_ENDPGM])));
    let sym = part.add_symbol(SymbolDesc::undefined("ext"));
    part.add_reloc(text, 0, sym, R_AMDGPU_ABS32);
    let bytes = part.build().unwrap();
    let binary = open(&[&bytes]);

    let mut dest = vec![0u8; binary.total_code_bytes() as usize];
    let err = binary.uploader(&mut dest, BASE).upload().unwrap_err();
    assert!(matches!(err, Error::UnsupportedRelocationSection { .. }), "{err}");
}

#[rstest]
fn unknown_symbol() {
    let bytes = reloc_part(&[0, S_ENDPGM], 0, "missing", R_AMDGPU_ABS32);
    let binary = open(&[&bytes]);
    let mut dest = vec![0u8; binary.total_code_bytes() as usize];
    let err = binary.uploader(&mut dest, BASE).upload().unwrap_err();
    assert!(matches!(&err, Error::UnknownSymbol { name } if name == "missing"), "{err}");
}

#[rstest]
fn symbol_in_unknown_section() {
    let mut part = PartBuilder::new();
    let text = part.add_section(SectionDesc::text(dwords(&[0, S_ENDPGM])));
    let sym = part.add_symbol(SymbolDesc::defined("lost", 99, 0));
    part.add_reloc(text, 0, sym, R_AMDGPU_ABS32);
    let bytes = part.build().unwrap();
    let binary = open(&[&bytes]);
    let mut dest = vec![0u8; binary.total_code_bytes() as usize];
    let err = binary.uploader(&mut dest, BASE).upload().unwrap_err();
    assert!(matches!(err, Error::SectionOutOfRange { .. }), "{err}");
}

#[rstest]
fn symbol_in_non_code_section() {
    let mut part = PartBuilder::new();
    let text = part.add_section(SectionDesc::text(dwords(&[0, S_ENDPGM])));
    let config = part.add_section(SectionDesc::config(&[(0xb848, 0)]));
    let sym = part.add_symbol(SymbolDesc::defined("cfg", config, 0));
    part.add_reloc(text, 0, sym, R_AMDGPU_ABS32);
    let bytes = part.build().unwrap();
    let binary = open(&[&bytes]);
    let mut dest = vec![0u8; binary.total_code_bytes() as usize];
    let err = binary.uploader(&mut dest, BASE).upload().unwrap_err();
    assert!(matches!(err, Error::BadSectionKind { .. }), "{err}");
}

#[rstest]
fn relocation_of_non_code_section() {
    let mut part = PartBuilder::new();
    part.add_section(SectionDesc::text(dwords(&[S_ENDPGM])));
    let config = part.add_section(SectionDesc::config(&[(0xb848, 0)]));
    let sym = part.add_symbol(SymbolDesc::undefined("ext"));
    part.add_reloc(config, 0, sym, R_AMDGPU_ABS32);
    let bytes = part.build().unwrap();
    let binary = open(&[&bytes]);
    let mut dest = vec![0u8; binary.total_code_bytes() as usize];
    let err = binary
        .uploader(&mut dest, BASE)
        .symbols_fn(|_| Some(0))
        .upload()
        .unwrap_err();
    assert!(matches!(err, Error::BadSectionKind { .. }), "{err}");
}

#[rstest]
fn relocation_out_of_bounds() {
    let bytes = reloc_part(&[0, S_ENDPGM], 6, "ext", R_AMDGPU_ABS32);
    let binary = open(&[&bytes]);
    let mut dest = vec![0u8; binary.total_code_bytes() as usize];
    let err = binary
        .uploader(&mut dest, BASE)
        .symbols_fn(|_| Some(0))
        .upload()
        .unwrap_err();
    assert!(matches!(err, Error::MalformedObject { .. }), "{err}");
}

#[rstest]
fn destination_too_small() {
    let bytes = text_part(&[S_NOP, S_ENDPGM]);
    let binary = open(&[&bytes]);
    let required = binary.total_code_bytes();
    let mut dest = vec![0u8; required as usize - 1];
    let err = binary.uploader(&mut dest, BASE).upload().unwrap_err();
    assert!(
        matches!(err, Error::DestinationTooSmall { required: r, actual } if r == required && actual == required - 1),
        "{err}"
    );
}
