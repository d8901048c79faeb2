//! marionette-formats
//!
//! The container boundary of the export pipeline: typed interfaces for the
//! binary asset containers a capture references, plus the data model they
//! yield once parsed. The actual binary readers live behind these traits;
//! the pipeline never touches raw container bytes itself.
//!
//! # Container kinds
//!
//! | Container | Extension | Parsed into |
//! |-----------|-----------|-------------|
//! | Skeleton  | `.sklb`   | [`SkeletonDocument`] (bone hierarchy) |
//! | Model     | `.mdl`    | [`ModelContainer`] (meshes, submeshes, shapes) |
//! | Material  | `.mtrl`   | [`MaterialContainer`] (shader pack, color table, textures) |
//! | Texture   | `.tex`    | `image::RgbaImage` |
//! | Deformer  | `.pbd`    | [`DeformRegistry`] (race lineage + bone matrices) |
//!
//! # Example
//!
//! ```rust,ignore
//! use marionette_formats::{AssetLibrary, DiskSource};
//!
//! let library = AssetLibrary::snapshot(Arc::new(DiskSource::new(game_root)));
//! let skeleton = library.load_skeleton("chara/human/c0101/skeleton/skl_c0101b0001.sklb")?;
//! ```

pub mod deform;
pub mod library;
pub mod material;
pub mod model;
pub mod skeleton;
pub mod snapshot;
pub mod source;

// Re-export main types
pub use deform::{DeformParser, DeformRegistry, RaceDeformEntry};
pub use library::AssetLibrary;
pub use material::{
    ColorChannel, ColorTable, MaterialContainer, MaterialParser, TextureDecoder, TextureRef,
    TextureUsage, COLOR_TABLE_ROWS, COLOR_TABLE_ROW_WIDTH, DUMMY_TEXTURE_PATH,
};
pub use model::{MeshContainer, ModelContainer, ModelParser, ShapeKey, ShapeValue, SubMesh, Vertex};
pub use skeleton::{SkeletonBone, SkeletonDocument, SkeletonParser};
pub use snapshot::{
    PngTextureDecoder, SnapshotDeformParser, SnapshotMaterialParser, SnapshotModelParser,
    SnapshotSkeletonParser,
};
pub use source::{DiskSource, FileSource, SourceError, SourceResult};

use thiserror::Error;

/// Errors produced while parsing a container
#[derive(Error, Debug)]
pub enum FormatError {
    #[error("Source error: {0}")]
    Source(#[from] source::SourceError),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Malformed container: {message}")]
    Malformed { message: String },

    #[error("Unsupported container version: {version}")]
    UnsupportedVersion { version: String },
}

impl FormatError {
    /// Create a malformed-container error
    pub fn malformed(message: impl Into<String>) -> Self {
        FormatError::Malformed {
            message: message.into(),
        }
    }
}

/// Result type for container parsing
pub type FormatResult<T> = Result<T, FormatError>;

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
