//! Decoding the register configuration of a binary
//!
//! The compiler backend records the hardware registers a shader needs in the
//! `.AMDGPU.config` section of every part, as little-endian
//! `(register, value)` dword pairs.

use crate::{
    Result,
    binary::Binary,
    error::{inconsistent_error, malformed_error},
    object::CONFIG_SECTION,
    target::{GfxLevel, WaveSize},
};
use alloc::{format, vec::Vec};

pub const SPI_SHADER_PGM_RSRC1_PS: u32 = 0xb028;
pub const SPI_SHADER_PGM_RSRC2_PS: u32 = 0xb02c;
pub const SPI_SHADER_PGM_RSRC1_VS: u32 = 0xb128;
pub const SPI_SHADER_PGM_RSRC2_VS: u32 = 0xb12c;
pub const SPI_SHADER_PGM_RSRC1_GS: u32 = 0xb228;
pub const SPI_SHADER_PGM_RSRC2_GS: u32 = 0xb22c;
pub const SPI_SHADER_PGM_RSRC1_HS: u32 = 0xb428;
pub const SPI_SHADER_PGM_RSRC2_HS: u32 = 0xb42c;
pub const COMPUTE_PGM_RSRC1: u32 = 0xb848;
pub const COMPUTE_PGM_RSRC2: u32 = 0xb84c;
pub const COMPUTE_TMPRING_SIZE: u32 = 0xb860;
pub const COMPUTE_PGM_RSRC3: u32 = 0xb8a0;
pub const SPI_PS_INPUT_ENA: u32 = 0x286cc;
pub const SPI_PS_INPUT_ADDR: u32 = 0x286d0;
pub const SPI_TMPRING_SIZE: u32 = 0x286e8;
/// Pseudo register holding the number of spilled SGPRs.
pub const SPILLED_SGPRS: u32 = 0x4;
/// Pseudo register holding the number of spilled VGPRs.
pub const SPILLED_VGPRS: u32 = 0x8;

/// Resource usage of a shader.
///
/// Fields a part leaves unset are 0.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ShaderConfig {
    pub num_sgprs: u32,
    pub num_vgprs: u32,
    pub num_shared_vgprs: u32,
    pub spilled_sgprs: u32,
    pub spilled_vgprs: u32,
    /// `FLOAT_MODE` field of `PGM_RSRC1`.
    pub float_mode: u32,
    /// LDS allocation in hardware granules.
    pub lds_size: u32,
    pub scratch_bytes_per_wave: u32,
    pub spi_ps_input_ena: u32,
    pub spi_ps_input_addr: u32,
    pub rsrc1: u32,
    pub rsrc2: u32,
    pub rsrc3: u32,
}

/// Something worth reporting that did not prevent decoding.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConfigDiagnostic {
    /// The section sets a register the decoder does not know.
    UnknownRegister { part: usize, register: u32, value: u32 },
}

/// A decoded configuration with the diagnostics raised while decoding it.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ConfigReport {
    pub config: ShaderConfig,
    pub diagnostics: Vec<ConfigDiagnostic>,
}

/// Decodes the configuration section of a single part.
pub fn parse_config(
    data: &[u8],
    part: usize,
    gfx_level: GfxLevel,
    wave_size: WaveSize,
    diagnostics: &mut Vec<ConfigDiagnostic>,
) -> Result<ShaderConfig> {
    if data.len() % 8 != 0 {
        return Err(malformed_error(format!(
            "part {part}: {CONFIG_SECTION} size {} is not a multiple of 8",
            data.len()
        )));
    }

    let mut config = ShaderConfig::default();
    let vgpr_granule = match wave_size {
        WaveSize::Wave32 => 8,
        WaveSize::Wave64 => 4,
    };
    for pair in data.chunks_exact(8) {
        let reg = u32::from_le_bytes([pair[0], pair[1], pair[2], pair[3]]);
        let value = u32::from_le_bytes([pair[4], pair[5], pair[6], pair[7]]);
        match reg {
            SPI_SHADER_PGM_RSRC1_PS
            | SPI_SHADER_PGM_RSRC1_VS
            | SPI_SHADER_PGM_RSRC1_GS
            | SPI_SHADER_PGM_RSRC1_HS
            | COMPUTE_PGM_RSRC1 => {
                config.num_vgprs = config
                    .num_vgprs
                    .max(((value & 0x3f) + 1) * vgpr_granule);
                config.num_sgprs = config.num_sgprs.max((((value >> 6) & 0xf) + 1) * 8);
                config.float_mode = (value >> 12) & 0xff;
                config.rsrc1 = value;
            }
            SPI_SHADER_PGM_RSRC2_PS => {
                config.lds_size = config.lds_size.max((value >> 8) & 0xff);
                config.rsrc2 = value;
            }
            SPI_SHADER_PGM_RSRC2_VS | SPI_SHADER_PGM_RSRC2_GS | SPI_SHADER_PGM_RSRC2_HS => {
                config.rsrc2 = value;
            }
            COMPUTE_PGM_RSRC2 => {
                config.lds_size = config.lds_size.max((value >> 15) & 0x1ff);
                config.rsrc2 = value;
            }
            COMPUTE_PGM_RSRC3 => {
                config.num_shared_vgprs = value & 0xf;
                config.rsrc3 = value;
            }
            SPI_PS_INPUT_ENA => config.spi_ps_input_ena = value,
            SPI_PS_INPUT_ADDR => config.spi_ps_input_addr = value,
            SPI_TMPRING_SIZE | COMPUTE_TMPRING_SIZE => {
                let bytes = if gfx_level >= GfxLevel::Gfx11 {
                    ((value >> 12) & 0x7fff) * 256
                } else {
                    ((value >> 12) & 0x1fff) * 1024
                };
                config.scratch_bytes_per_wave = config.scratch_bytes_per_wave.max(bytes);
            }
            SPILLED_SGPRS => config.spilled_sgprs = value,
            SPILLED_VGPRS => config.spilled_vgprs = value,
            _ => {
                #[cfg(feature = "log")]
                log::warn!("part [{part}]: unknown config register [{reg:#x}]");
                diagnostics.push(ConfigDiagnostic::UnknownRegister {
                    part,
                    register: reg,
                    value,
                });
            }
        }
    }

    if config.spi_ps_input_addr == 0 {
        config.spi_ps_input_addr = config.spi_ps_input_ena;
    }
    Ok(config)
}

/// Merges a register that at most one part may set.
fn merge_exclusive(total: &mut u32, part: u32, what: &str) -> Result<()> {
    if *total != 0 && part != 0 && *total != part {
        return Err(inconsistent_error(format!(
            "{what} set by several parts: {:#x} and {part:#x}",
            *total
        )));
    }
    if part != 0 {
        *total = part;
    }
    Ok(())
}

impl Binary<'_> {
    /// Decodes and combines the configuration of every part.
    ///
    /// Register and scratch usage is the maximum over the parts.
    pub fn read_config(&self) -> Result<ConfigReport> {
        let mut report = ConfigReport::default();
        for (idx, part) in self.parts().iter().enumerate() {
            let data = part.section_by_name(CONFIG_SECTION).ok_or_else(|| {
                malformed_error(format!("{}: no {CONFIG_SECTION} section", part.name()))
            })?;
            let c = parse_config(
                data,
                idx,
                self.gfx_level(),
                self.wave_size(),
                &mut report.diagnostics,
            )?;

            let total = &mut report.config;
            if idx != 0 && total.float_mode != c.float_mode {
                return Err(inconsistent_error(format!(
                    "{}: float mode {:#x} differs from {:#x}",
                    part.name(),
                    c.float_mode,
                    total.float_mode
                )));
            }
            total.float_mode = c.float_mode;
            total.num_sgprs = total.num_sgprs.max(c.num_sgprs);
            total.num_vgprs = total.num_vgprs.max(c.num_vgprs);
            total.num_shared_vgprs = total.num_shared_vgprs.max(c.num_shared_vgprs);
            total.spilled_sgprs = total.spilled_sgprs.max(c.spilled_sgprs);
            total.spilled_vgprs = total.spilled_vgprs.max(c.spilled_vgprs);
            total.scratch_bytes_per_wave = total.scratch_bytes_per_wave.max(c.scratch_bytes_per_wave);
            total.lds_size = total.lds_size.max(c.lds_size);
            merge_exclusive(&mut total.spi_ps_input_ena, c.spi_ps_input_ena, "SPI_PS_INPUT_ENA")?;
            merge_exclusive(&mut total.spi_ps_input_addr, c.spi_ps_input_addr, "SPI_PS_INPUT_ADDR")?;
            merge_exclusive(&mut total.rsrc1, c.rsrc1, "PGM_RSRC1")?;
            merge_exclusive(&mut total.rsrc2, c.rsrc2, "PGM_RSRC2")?;
            merge_exclusive(&mut total.rsrc3, c.rsrc3, "PGM_RSRC3")?;
        }
        Ok(report)
    }
}
