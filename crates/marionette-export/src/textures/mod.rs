//! Texture gathering, shader-pack synthesis and rasterization
//!
//! For each material the synthesizer loads the raw textures its container
//! references, derives the missing channels the material's shader pack
//! implies (per-pixel color-table blending), rasterizes every resulting
//! image to PNG, and binds the files into the output material definition.

pub mod synthesis;

pub use synthesis::derive;

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

use image::RgbaImage;
use marionette_core::ResourceNode;
use marionette_formats::{AssetLibrary, MaterialContainer, TextureUsage};
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::scene::{AlphaMode, MaterialChannel, MaterialDefinition};
use crate::CancelFlag;

/// Texture synthesis errors
#[derive(Debug, thiserror::Error)]
pub enum TextureError {
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Format error: {0}")]
    Format(#[from] marionette_formats::FormatError),

    #[error("Missing input: {0}")]
    MissingInput(String),

    #[error("Cancelled")]
    Cancelled,
}

pub type TextureResult<T> = Result<T, TextureError>;

/// Shader pack selecting the channel-derivation rules of a material
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShaderPack {
    Character,
    Skin,
    Hair,
    Iris,
    Unknown(String),
}

impl ShaderPack {
    /// Decode the container's shader pack name
    pub fn from_name(name: &str) -> Self {
        match name {
            "character.shpk" => ShaderPack::Character,
            "skin.shpk" => ShaderPack::Skin,
            "hair.shpk" => ShaderPack::Hair,
            "iris.shpk" => ShaderPack::Iris,
            other => ShaderPack::Unknown(other.to_string()),
        }
    }
}

/// Working set of images keyed by usage; ordered so writes are deterministic
pub type TextureSet = BTreeMap<TextureUsage, RgbaImage>;

/// Constant material flags decided by the shader pack
#[derive(Debug, Clone, Copy)]
pub struct MaterialConstants {
    pub alpha_mode: AlphaMode,
    pub backface_culling: bool,
}

impl Default for MaterialConstants {
    fn default() -> Self {
        Self {
            alpha_mode: AlphaMode::Mask,
            backface_culling: true,
        }
    }
}

/// Serializes texture rasterization system-wide.
///
/// Only one image is encoded and written at a time, bounding peak memory
/// from simultaneously held raw buffers. The writer tracks the concurrency
/// it actually observed so the discipline is checkable.
#[derive(Default)]
pub struct TextureWriter {
    gate: Mutex<()>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl TextureWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rasterize `image` to `path` as PNG, holding the global write gate
    pub fn write(&self, image: &RgbaImage, path: &Path) -> TextureResult<()> {
        let _guard = self.gate.lock();
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(current, Ordering::SeqCst);

        let result = image.save_with_format(path, image::ImageFormat::Png);

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result.map_err(TextureError::from)
    }

    /// Highest number of concurrent writers observed (1 when the gate holds)
    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

/// Output file suffix and material channel for a texture usage
fn classify(usage: &TextureUsage) -> (String, Option<MaterialChannel>) {
    match usage {
        TextureUsage::Diffuse | TextureUsage::ColorMap => {
            ("diffuse".to_string(), Some(MaterialChannel::BaseColor))
        }
        TextureUsage::Normal | TextureUsage::NormalMap => {
            ("normal".to_string(), Some(MaterialChannel::Normal))
        }
        TextureUsage::Specular | TextureUsage::SpecularMap => {
            ("specular".to_string(), Some(MaterialChannel::SpecularColor))
        }
        TextureUsage::WaveMap => ("occlusion".to_string(), Some(MaterialChannel::Occlusion)),
        TextureUsage::Reflection => ("emissive".to_string(), Some(MaterialChannel::Emissive)),
        TextureUsage::Mask => ("mask".to_string(), None),
        other => {
            warn!(usage = %other, "Unhandled texture usage");
            (other.name().to_string(), None)
        }
    }
}

/// Base name used for a material's output files
pub fn material_base_name(path: &str) -> String {
    let file = path.replace('\\', "/");
    let file = file.rsplit('/').next().unwrap_or(&file);
    file.split('.').next().unwrap_or(file).to_string()
}

/// Remap a raw texture's canonical path to an actually loaded file using the
/// material node's sibling texture nodes: exact game-path match first, then
/// substring match on the extensionless file name.
pub fn remap_texture_path(path: &str, siblings: Option<&[ResourceNode]>) -> String {
    let Some(nodes) = siblings else {
        return path.to_string();
    };

    if let Some(exact) = nodes.iter().find(|n| n.game_path == path) {
        return exact.full_path().to_string();
    }

    let stem = material_base_name(path);
    if let Some(partial) = nodes.iter().find(|n| n.game_path.contains(&stem)) {
        return partial.full_path().to_string();
    }

    path.to_string()
}

/// Builds one output material: gathers raw textures, derives shader-pack
/// channels, rasterizes and binds the results
pub struct TextureSynthesizer<'a> {
    library: &'a AssetLibrary,
    writer: &'a TextureWriter,
}

impl<'a> TextureSynthesizer<'a> {
    pub fn new(library: &'a AssetLibrary, writer: &'a TextureWriter) -> Self {
        Self { library, writer }
    }

    /// Load the material's raw textures, skipping placeholder slots and
    /// remapping paths through sibling nodes when provided
    pub fn gather(
        &self,
        material: &MaterialContainer,
        siblings: Option<&[ResourceNode]>,
        cancel: &CancelFlag,
    ) -> TextureResult<TextureSet> {
        let mut set = TextureSet::new();

        for texture in &material.textures {
            if cancel.is_cancelled() {
                return Err(TextureError::Cancelled);
            }
            if texture.is_placeholder() {
                continue;
            }

            let path = remap_texture_path(&texture.path, siblings);
            let image = self.library.load_texture(&path)?;
            debug!(usage = %texture.usage, %path, "Loaded raw texture");
            set.insert(texture.usage.clone(), image);
        }

        Ok(set)
    }

    /// Full synthesis for one material: gather, derive, rasterize, bind.
    ///
    /// `out_dir` is the export directory; the scene file lives one level
    /// below it, so channel URIs are bound relative to that subdirectory.
    pub fn compose(
        &self,
        material: &MaterialContainer,
        material_path: &str,
        siblings: Option<&[ResourceNode]>,
        out_dir: &Path,
        cancel: &CancelFlag,
    ) -> TextureResult<MaterialDefinition> {
        let mut set = self.gather(material, siblings, cancel)?;
        let pack = ShaderPack::from_name(&material.shader_pack);
        let constants = synthesis::derive(&pack, material, &mut set)?;

        let base = material_base_name(material_path);
        let mut definition = MaterialDefinition::new(base.clone());
        definition.alpha_mode = constants.alpha_mode;
        definition.double_sided = !constants.backface_culling;

        for (usage, image) in &set {
            if cancel.is_cancelled() {
                return Err(TextureError::Cancelled);
            }

            let (suffix, channel) = classify(usage);
            let file_name = format!("{base}_{suffix}.png");
            self.writer.write(image, &out_dir.join(&file_name))?;

            if let Some(channel) = channel {
                definition.set_channel(channel, format!("../{file_name}"));
            }
        }

        Ok(definition)
    }
}
