//! Asset library: the bundle of source + parsers handed to the exporter
//!
//! Groups one [`FileSource`] with the container parsers so pipeline code can
//! load-and-parse in one call. Cloning is cheap; all members are shared.

use std::sync::Arc;

use image::RgbaImage;

use crate::deform::{DeformParser, DeformRegistry};
use crate::material::{MaterialContainer, MaterialParser, TextureDecoder};
use crate::model::{ModelContainer, ModelParser};
use crate::skeleton::{SkeletonDocument, SkeletonParser};
use crate::source::FileSource;
use crate::FormatResult;

/// Shared bundle of a file source and the container parsers
#[derive(Clone)]
pub struct AssetLibrary {
    source: Arc<dyn FileSource>,
    skeletons: Arc<dyn SkeletonParser>,
    models: Arc<dyn ModelParser>,
    materials: Arc<dyn MaterialParser>,
    textures: Arc<dyn TextureDecoder>,
    deformers: Arc<dyn DeformParser>,
}

impl AssetLibrary {
    pub fn new(
        source: Arc<dyn FileSource>,
        skeletons: Arc<dyn SkeletonParser>,
        models: Arc<dyn ModelParser>,
        materials: Arc<dyn MaterialParser>,
        textures: Arc<dyn TextureDecoder>,
        deformers: Arc<dyn DeformParser>,
    ) -> Self {
        Self {
            source,
            skeletons,
            models,
            materials,
            textures,
            deformers,
        }
    }

    /// Library using the JSON snapshot parsers over the given source
    pub fn snapshot(source: Arc<dyn FileSource>) -> Self {
        Self::new(
            source,
            Arc::new(crate::snapshot::SnapshotSkeletonParser),
            Arc::new(crate::snapshot::SnapshotModelParser),
            Arc::new(crate::snapshot::SnapshotMaterialParser),
            Arc::new(crate::snapshot::PngTextureDecoder),
            Arc::new(crate::snapshot::SnapshotDeformParser),
        )
    }

    /// The underlying file source
    pub fn source(&self) -> &Arc<dyn FileSource> {
        &self.source
    }

    /// Read and parse a skeleton container
    pub fn load_skeleton(&self, path: &str) -> FormatResult<SkeletonDocument> {
        let bytes = self.source.read(path)?;
        tracing::trace!(%path, size = bytes.len(), "Parsing skeleton container");
        self.skeletons.parse(&bytes)
    }

    /// Read and parse a model container
    pub fn load_model(&self, path: &str) -> FormatResult<ModelContainer> {
        let bytes = self.source.read(path)?;
        tracing::trace!(%path, size = bytes.len(), "Parsing model container");
        self.models.parse(&bytes)
    }

    /// Read and parse a material container
    pub fn load_material(&self, path: &str) -> FormatResult<MaterialContainer> {
        let bytes = self.source.read(path)?;
        tracing::trace!(%path, size = bytes.len(), "Parsing material container");
        self.materials.parse(&bytes)
    }

    /// Read and decode a raw texture
    pub fn load_texture(&self, path: &str) -> FormatResult<RgbaImage> {
        let bytes = self.source.read(path)?;
        tracing::trace!(%path, size = bytes.len(), "Decoding texture");
        self.textures.decode(&bytes)
    }

    /// Read and parse a body-deformer container
    pub fn load_deformers(&self, path: &str) -> FormatResult<DeformRegistry> {
        let bytes = self.source.read(path)?;
        self.deformers.parse(&bytes)
    }
}
