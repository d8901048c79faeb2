//! Material container boundary
//!
//! A parsed material exposes three things the synthesizer cares about: the
//! shader-pack name selecting the derivation rules, the color-set table the
//! derivations blend against, and the list of raw texture references keyed by
//! semantic usage.

use half::f16;
use serde::{Deserialize, Serialize};

use crate::FormatResult;

/// Parses material containers
pub trait MaterialParser: Send + Sync {
    fn parse(&self, bytes: &[u8]) -> FormatResult<MaterialContainer>;
}

/// Decodes raw texture containers into RGBA images
pub trait TextureDecoder: Send + Sync {
    fn decode(&self, bytes: &[u8]) -> FormatResult<image::RgbaImage>;
}

/// Sentinel path marking "no texture"; never loaded
pub const DUMMY_TEXTURE_PATH: &str = "dummy.tex";

/// Semantic usage of a texture slot within a material
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextureUsage {
    Diffuse,
    Normal,
    Specular,
    Mask,
    Reflection,
    /// Derived occlusion slot
    WaveMap,
    /// Legacy sampler aliases carried by some materials
    ColorMap,
    NormalMap,
    SpecularMap,
    Catchlight,
    Unknown(String),
}

impl TextureUsage {
    /// Lowercase identifier, used for raw fallback file naming
    pub fn name(&self) -> &str {
        match self {
            TextureUsage::Diffuse => "diffuse",
            TextureUsage::Normal => "normal",
            TextureUsage::Specular => "specular",
            TextureUsage::Mask => "mask",
            TextureUsage::Reflection => "reflection",
            TextureUsage::WaveMap => "wave_map",
            TextureUsage::ColorMap => "color_map",
            TextureUsage::NormalMap => "normal_map",
            TextureUsage::SpecularMap => "specular_map",
            TextureUsage::Catchlight => "catchlight",
            TextureUsage::Unknown(s) => s,
        }
    }
}

impl std::fmt::Display for TextureUsage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// One raw texture reference of a material
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextureRef {
    pub usage: TextureUsage,
    /// Canonical game path of the texture
    pub path: String,
}

impl TextureRef {
    /// Whether this slot holds the "no texture" sentinel
    pub fn is_placeholder(&self) -> bool {
        self.path == DUMMY_TEXTURE_PATH
    }
}

/// Channel selector within a color-table row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorChannel {
    Diffuse,
    Specular,
    Emissive,
}

impl ColorChannel {
    /// Offset of the channel's RGB triple within a row
    fn offset(&self) -> usize {
        match self {
            ColorChannel::Diffuse => 0,
            ColorChannel::Specular => 4,
            ColorChannel::Emissive => 8,
        }
    }
}

/// Width of one color-table row in half-float values
pub const COLOR_TABLE_ROW_WIDTH: usize = 16;
/// Number of rows in a color table
pub const COLOR_TABLE_ROWS: usize = 16;

/// The material's color-set table: 16 rows of 16 half-float values.
///
/// Lookups address the table by flat value index (`row * 16`); blending
/// interpolates linearly between two rows' RGB triples for a given channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColorTable {
    /// Raw half-float bit patterns, row-major, 256 values
    bits: Vec<u16>,
}

impl ColorTable {
    /// Build a table from raw half-float bits; must hold exactly 256 values
    pub fn from_bits(bits: Vec<u16>) -> FormatResult<Self> {
        if bits.len() != COLOR_TABLE_ROWS * COLOR_TABLE_ROW_WIDTH {
            return Err(crate::FormatError::malformed(format!(
                "Color table holds {} values, expected {}",
                bits.len(),
                COLOR_TABLE_ROWS * COLOR_TABLE_ROW_WIDTH
            )));
        }
        Ok(Self { bits })
    }

    /// A neutral table: every channel white
    pub fn neutral() -> Self {
        let one = f16::from_f32(1.0).to_bits();
        Self {
            bits: vec![one; COLOR_TABLE_ROWS * COLOR_TABLE_ROW_WIDTH],
        }
    }

    fn value(&self, index: usize) -> f32 {
        self.bits
            .get(index)
            .map(|&b| f16::from_bits(b).to_f32())
            .unwrap_or(0.0)
    }

    /// RGB triple of `channel` at flat row index `base` (`row * 16`)
    pub fn color(&self, base: usize, channel: ColorChannel) -> [f32; 3] {
        let offset = base + channel.offset();
        [
            self.value(offset),
            self.value(offset + 1),
            self.value(offset + 2),
        ]
    }

    /// Linear blend of `channel` between two flat row indices
    pub fn blend(&self, idx1: usize, idx2: usize, t: f64, channel: ColorChannel) -> [f32; 3] {
        let a = self.color(idx1, channel);
        let b = self.color(idx2, channel);
        let t = t as f32;
        [
            a[0] + (b[0] - a[0]) * t,
            a[1] + (b[1] - a[1]) * t,
            a[2] + (b[2] - a[2]) * t,
        ]
    }
}

/// A fully parsed material container
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaterialContainer {
    /// Shader pack name, e.g. `character.shpk`
    pub shader_pack: String,
    /// Color-set table; absent for materials without one
    #[serde(default)]
    pub color_table: Option<ColorTable>,
    /// Raw texture references keyed by usage
    #[serde(default)]
    pub textures: Vec<TextureRef>,
}

impl MaterialContainer {
    /// Texture reference for `usage`, if present
    pub fn texture(&self, usage: &TextureUsage) -> Option<&TextureRef> {
        self.textures.iter().find(|t| &t.usage == usage)
    }
}
