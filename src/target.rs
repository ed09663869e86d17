//! Description of the GPU a binary is linked for

/// Hardware generation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum GfxLevel {
    Gfx6,
    Gfx7,
    Gfx8,
    Gfx9,
    Gfx10,
    Gfx10_3,
    Gfx11,
    Gfx11_5,
    Gfx12,
}

impl GfxLevel {
    /// Bytes of LDS a single workgroup may allocate.
    #[inline]
    pub fn max_lds_size(self) -> u64 {
        if self == GfxLevel::Gfx6 {
            32 * 1024
        } else {
            64 * 1024
        }
    }
}

/// Number of lanes a wave executes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum WaveSize {
    Wave32,
    #[default]
    Wave64,
}

impl WaveSize {
    /// Number of lanes, which is also the bit width of an execution mask.
    #[inline]
    pub fn lanes(self) -> u32 {
        match self {
            WaveSize::Wave32 => 32,
            WaveSize::Wave64 => 64,
        }
    }
}

/// Debug switches applied when opening a binary.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct OpenOptions {
    halt_at_entry: bool,
}

impl OpenOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve the first instruction of the image for `s_sethalt 1`, so a
    /// debugger can attach before the shader runs.
    pub fn halt_at_entry(mut self, halt_at_entry: bool) -> Self {
        self.halt_at_entry = halt_at_entry;
        self
    }

    #[inline]
    pub fn is_halt_at_entry(&self) -> bool {
        self.halt_at_entry
    }
}
