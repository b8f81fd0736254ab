//! Error types for tankobon operations.

use std::path::PathBuf;

use thiserror::Error;

use crate::model::{Identifier, ImageKey, PageKey};

/// Errors that can occur while building or transforming a package.
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("XML parsing error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("UTF-8 decoding error: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    #[error("document tree has no volumes")]
    EmptyTree,

    #[error("volume {volume} has no chapters")]
    EmptyVolume { volume: Identifier },

    #[error("chapter {chapter} of volume {volume} has no pages")]
    EmptyChapter {
        volume: Identifier,
        chapter: Identifier,
    },

    #[error("volumes {first} and {second} both map to the path segment `{slug}`")]
    VolumeCollision {
        first: Identifier,
        second: Identifier,
        slug: String,
    },

    #[error("chapters {first} and {second} of volume {volume} both map to the path segment `{slug}`")]
    ChapterCollision {
        volume: Identifier,
        first: Identifier,
        second: Identifier,
        slug: String,
    },

    #[error("page {page} has no image data")]
    MissingPage { page: PageKey },

    #[error("page {page} could not be decoded: {source}")]
    UndecodablePage {
        page: PageKey,
        #[source]
        source: image::ImageError,
    },

    #[error("cover of volume {volume} could not be decoded: {source}")]
    UndecodableCover {
        volume: Identifier,
        #[source]
        source: image::ImageError,
    },

    #[error("invalid image geometry: {width}x{height}")]
    InvalidGeometry { width: u32, height: u32 },

    #[error("page {page} has invalid geometry: {width}x{height}")]
    InvalidPageGeometry {
        page: PageKey,
        width: u32,
        height: u32,
    },

    #[error("failed to encode image {image}: {source}")]
    Encode {
        image: ImageKey,
        #[source]
        source: image::ImageError,
    },

    #[error("chapter {chapter} of volume {volume} has no renderable images")]
    NoRenderableImages {
        volume: Identifier,
        chapter: Identifier,
    },

    #[error("encode worker pool stopped: {0}")]
    WorkerPool(String),

    #[error("package is empty")]
    EmptyPackage,

    #[error("package has no content sections")]
    NoContentSections,

    #[error("malformed XML: {0}")]
    InvalidXml(String),

    #[error("missing required document: {0}")]
    MissingDocument(String),

    #[error("malformed markup in {}: {reason}", path.display())]
    MalformedMarkup { path: PathBuf, reason: String },
}

pub type Result<T> = std::result::Result<T, Error>;
