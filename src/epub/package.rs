//! The built package: manifest, spine and the scratch files backing them.

use std::fs::File;
use std::io::{Cursor, Seek, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tempfile::TempDir;

use crate::archive::write_atomic;
use crate::config::ReadingDirection;
use crate::error::Result;

use super::{opf, writer};

/// Manifest item properties used by the builder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemProperty {
    CoverImage,
    Nav,
}

impl ItemProperty {
    pub fn as_str(self) -> &'static str {
        match self {
            ItemProperty::CoverImage => "cover-image",
            ItemProperty::Nav => "nav",
        }
    }
}

/// Where an item's bytes live until the package is serialized.
#[derive(Debug, Clone)]
pub(crate) enum ItemSource {
    Memory(Vec<u8>),
    /// A file inside the package's scratch directory.
    Scratch(PathBuf),
}

/// One manifest entry.
#[derive(Debug, Clone)]
pub struct ManifestItem {
    pub id: String,
    /// Path relative to the package document.
    pub href: String,
    pub media_type: String,
    pub properties: Vec<ItemProperty>,
    pub(crate) source: ItemSource,
}

impl ManifestItem {
    pub(crate) fn new(
        id: impl Into<String>,
        href: impl Into<String>,
        media_type: impl Into<String>,
        source: ItemSource,
    ) -> Self {
        Self {
            id: id.into(),
            href: href.into(),
            media_type: media_type.into(),
            properties: Vec::new(),
            source,
        }
    }

    pub(crate) fn with_property(mut self, property: ItemProperty) -> Self {
        self.properties.push(property);
        self
    }

    pub fn has_property(&self, property: ItemProperty) -> bool {
        self.properties.contains(&property)
    }

    pub fn is_image(&self) -> bool {
        self.media_type.starts_with("image/")
    }
}

/// Resolved package-level metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct PackageMetadata {
    pub title: String,
    pub identifier: String,
    pub language: String,
    pub authors: Vec<String>,
    pub modified: DateTime<Utc>,
    pub direction: ReadingDirection,
    /// Manifest id of the cover image, if the package has one.
    pub cover_id: Option<String>,
}

/// Counters describing what a build produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "cli", derive(serde::Serialize))]
pub struct Diagnostics {
    pub volumes: usize,
    pub chapters: usize,
    /// Source pages read from the tree.
    pub pages: usize,
    /// Page and cover images written to the package.
    pub images: usize,
    /// Source pages that were split into halves.
    pub split_pages: usize,
    pub covers: usize,
    /// Images that exceeded the width limit and were downscaled.
    pub downscaled: usize,
}

/// A built EPUB package.
///
/// Image and stylesheet bytes live in a scratch directory owned by the
/// package. The directory is removed by [`Package::cleanup`] or on drop, so
/// serialize before letting the package go.
#[derive(Debug)]
pub struct Package {
    pub(crate) metadata: PackageMetadata,
    pub(crate) manifest: Vec<ManifestItem>,
    /// Manifest ids in reading order.
    pub(crate) spine: Vec<String>,
    pub(crate) scratch: Option<TempDir>,
}

impl Package {
    pub fn metadata(&self) -> &PackageMetadata {
        &self.metadata
    }

    pub fn manifest(&self) -> &[ManifestItem] {
        &self.manifest
    }

    pub fn spine(&self) -> &[String] {
        &self.spine
    }

    /// Whether the spine references at least one document.
    pub fn has_content_sections(&self) -> bool {
        !self.spine.is_empty()
    }

    /// Location of the scratch directory, while it exists.
    pub fn scratch_path(&self) -> Option<&Path> {
        self.scratch.as_ref().map(TempDir::path)
    }

    /// The OPF package document.
    pub fn package_document(&self) -> Result<String> {
        opf::package_document(&self.metadata, &self.manifest, &self.spine)
    }

    /// Serialize the package as an EPUB archive.
    pub fn write_to<W: Write + Seek>(&self, writer: W) -> Result<()> {
        writer::write_package(self, writer)
    }

    /// Serialize the package to an in-memory archive.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut out = Cursor::new(Vec::new());
        self.write_to(&mut out)?;
        Ok(out.into_inner())
    }

    /// Serialize the package to `path`. A failed write leaves no file behind.
    pub fn write_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        write_atomic(path.as_ref(), |file: &mut File| self.write_to(file))
    }

    /// Remove the scratch directory.
    ///
    /// The package can no longer be serialized afterwards, which the type
    /// system enforces by consuming it.
    pub fn cleanup(mut self) -> Result<()> {
        if let Some(scratch) = self.scratch.take() {
            scratch.close()?;
        }
        Ok(())
    }
}
