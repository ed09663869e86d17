#![allow(dead_code)]

use amdgpu_rtld::{Binary, BinaryBuilder, ElfPart, GfxLevel, WaveSize};
use gen_part::{PartBuilder, S_ENDPGM, S_NOP, SectionDesc, SymbolDesc, dwords};

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// A part whose `.text` holds `code`.
pub fn text_part(code: &[u32]) -> Vec<u8> {
    let mut part = PartBuilder::new();
    part.add_section(SectionDesc::text(dwords(code)));
    part.build().unwrap()
}

/// A part with `nops` no-ops and the given LDS declarations.
pub fn lds_part(nops: usize, symbols: &[SymbolDesc]) -> Vec<u8> {
    let mut code = vec![S_NOP; nops];
    code.push(S_ENDPGM);
    let mut part = PartBuilder::new();
    part.add_section(SectionDesc::text(dwords(&code)));
    for symbol in symbols {
        part.add_symbol(symbol.clone());
    }
    part.build().unwrap()
}

pub fn builder<'data>(parts: &[&'data [u8]]) -> BinaryBuilder<'data> {
    init_logger();
    let names = ["prolog", "main", "epilog"];
    Binary::builder(GfxLevel::Gfx10_3, WaveSize::Wave64).parts(
        parts
            .iter()
            .enumerate()
            .map(|(idx, bytes)| ElfPart::new(names.get(idx).unwrap_or(&"part"), *bytes)),
    )
}

pub fn open<'data>(parts: &[&'data [u8]]) -> Binary<'data> {
    builder(parts).open().unwrap()
}

/// Uploads `binary` into a zeroed buffer of exactly the required size.
pub fn upload(binary: &Binary, base: u64, lookup: impl Fn(&str) -> Option<u64>) -> (Vec<u8>, u64) {
    let mut dest = vec![0u8; binary.total_code_bytes() as usize];
    let size = binary
        .uploader(&mut dest, base)
        .symbols_fn(lookup)
        .upload()
        .unwrap();
    (dest, size)
}

pub fn read_u32(bytes: &[u8], offset: u64) -> u32 {
    let offset = offset as usize;
    u32::from_le_bytes(bytes[offset..offset + 4].try_into().unwrap())
}

pub fn read_u64(bytes: &[u8], offset: u64) -> u64 {
    let offset = offset as usize;
    u64::from_le_bytes(bytes[offset..offset + 8].try_into().unwrap())
}
