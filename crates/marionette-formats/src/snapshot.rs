//! JSON-backed container implementations
//!
//! Every parsed container in this crate is a plain serde type, so a container
//! persisted as JSON round-trips losslessly. These implementations back the
//! CLI harness and the test suites; a live host wires real binary readers
//! into the same traits instead.

use crate::deform::{DeformParser, DeformRegistry};
use crate::material::{MaterialContainer, MaterialParser, TextureDecoder};
use crate::model::{ModelContainer, ModelParser};
use crate::skeleton::{SkeletonDocument, SkeletonParser};
use crate::{FormatError, FormatResult};

fn from_json<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> FormatResult<T> {
    serde_json::from_slice(bytes).map_err(|e| FormatError::malformed(e.to_string()))
}

/// Skeleton documents persisted as JSON
#[derive(Debug, Default)]
pub struct SnapshotSkeletonParser;

impl SkeletonParser for SnapshotSkeletonParser {
    fn parse(&self, bytes: &[u8]) -> FormatResult<SkeletonDocument> {
        let doc: SkeletonDocument = from_json(bytes)?;
        doc.validate().map_err(FormatError::malformed)?;
        Ok(doc)
    }
}

/// Model containers persisted as JSON
#[derive(Debug, Default)]
pub struct SnapshotModelParser;

impl ModelParser for SnapshotModelParser {
    fn parse(&self, bytes: &[u8]) -> FormatResult<ModelContainer> {
        let model: ModelContainer = from_json(bytes)?;
        for mesh in &model.meshes {
            mesh.validate().map_err(FormatError::malformed)?;
        }
        Ok(model)
    }
}

/// Material containers persisted as JSON
#[derive(Debug, Default)]
pub struct SnapshotMaterialParser;

impl MaterialParser for SnapshotMaterialParser {
    fn parse(&self, bytes: &[u8]) -> FormatResult<MaterialContainer> {
        from_json(bytes)
    }
}

/// Deformer containers persisted as JSON
#[derive(Debug, Default)]
pub struct SnapshotDeformParser;

impl DeformParser for SnapshotDeformParser {
    fn parse(&self, bytes: &[u8]) -> FormatResult<DeformRegistry> {
        from_json(bytes)
    }
}

/// Raw textures stored as PNG (or any format the `image` crate detects)
#[derive(Debug, Default)]
pub struct PngTextureDecoder;

impl TextureDecoder for PngTextureDecoder {
    fn decode(&self, bytes: &[u8]) -> FormatResult<image::RgbaImage> {
        let img = image::load_from_memory(bytes)?;
        Ok(img.to_rgba8())
    }
}
