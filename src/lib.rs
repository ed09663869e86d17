//! # amdgpu_rtld
//! A `no_std` runtime linker for AMDGPU shader binaries.
//! ## Usage
//! A shader may be compiled as several relocatable parts, such as a prolog,
//! a main body and an epilog. `amdgpu_rtld` links the parts into a single
//! code image: it pastes their `.text` sections back to back, places their
//! other code sections behind them, lays out the LDS symbols the parts share
//! or declare privately, and applies the relocations while copying the image
//! into GPU-visible memory.
//!
//! Opening a [`Binary`] does all the layout work and never touches the
//! destination. Uploading it can be repeated into as many destinations as
//! needed.
//! ## Example
//! ```no_run
//! use amdgpu_rtld::{Binary, ElfPart, GfxLevel, WaveSize};
//!
//! let bytes: &[u8] = &[]; // compiled part
//! let binary = Binary::builder(GfxLevel::Gfx10_3, WaveSize::Wave32)
//!     .part(ElfPart::new("main", bytes))
//!     .open()
//!     .unwrap();
//! let mut dest = vec![0u8; binary.total_code_bytes() as usize];
//! let size = binary
//!     .uploader(&mut dest, 0x1_0000_0000)
//!     .symbols_fn(|_| None)
//!     .upload()
//!     .unwrap();
//! assert!(size <= dest.len() as u64);
//! ```
#![no_std]
extern crate alloc;

mod binary;
pub mod config;
pub mod elf;
mod error;
pub mod image;
pub mod lds;
pub mod object;
pub mod relocation;
mod target;
mod upload;

pub use binary::{Binary, BinaryBuilder, Part};
pub use config::{ConfigDiagnostic, ConfigReport, ShaderConfig};
pub use error::Error;
pub use lds::{LdsSymbol, Owner};
pub use object::{CONFIG_SECTION, DISASM_SECTION, ElfPart, Section, SectionFlags};
pub use relocation::{Half, RelocKind, SymbolLookup};
pub use target::{GfxLevel, OpenOptions, WaveSize};
pub use upload::Uploader;

/// A type alias for `Result`s returned by `amdgpu_rtld` functions.
///
/// This is a convenience alias that eliminates the need to repeatedly specify
/// the `Error` type in function signatures.
pub type Result<T> = core::result::Result<T, Error>;

const _: () = {
    const fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<Binary<'static>>();
};
