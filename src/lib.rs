//! # tankobon
//!
//! Package scanned manga chapters into EPUB 3 and Kobo kepub files.
//!
//! ## Features
//!
//! - Build an EPUB 3 package (with an EPUB 2 NCX) from volumes of chapter pages
//! - Crop page whitespace and split two-page spreads in reading order
//! - Encode pages on a bounded worker pool with deterministic output paths
//! - Convert any EPUB to a kepub: koboSpans, image tagging, rendition
//!   metadata, series records and cover promotion
//!
//! ## Quick Start
//!
//! ```no_run
//! use tankobon::{BuildConfig, KepubConfig, ReadingDirection, WidePolicy};
//!
//! let tree = tankobon::load_dir("manga/".as_ref())?;
//! let config = BuildConfig::default()
//!     .with_crop(true)
//!     .with_wide_policy(WidePolicy::Split)
//!     .with_direction(ReadingDirection::Rtl);
//!
//! let (package, _diagnostics) = tankobon::build(&tree, &config)?;
//! package.write_file("manga.epub")?;
//!
//! let kepub = tankobon::kepub::transform_package(&package, &KepubConfig::new())?;
//! std::fs::write("manga.kepub.epub", kepub)?;
//! # Ok::<(), tankobon::Error>(())
//! ```
//!
//! ## Building a tree by hand
//!
//! The [`DocumentTree`] can be filled from any source. Volumes and chapters
//! are ordered by [`Identifier`], so `"1.5"` lands between `"1"` and `"2"`
//! whatever the insertion order:
//!
//! ```
//! use tankobon::{DocumentTree, Identifier, Metadata};
//!
//! let mut tree = DocumentTree::new();
//! tree.metadata = Metadata::new("My Manga").with_author("Author Name");
//! tree.add_volume("2");
//! tree.add_volume("1.5");
//! tree.add_volume("1");
//!
//! let order: Vec<_> = tree.volumes.keys().map(Identifier::as_str).collect();
//! assert_eq!(order, ["1", "1.5", "2"]);
//! ```

pub mod archive;
pub mod config;
pub mod epub;
pub mod error;
pub mod geometry;
pub mod kepub;
pub mod model;
pub mod xml;

pub use config::{BuildConfig, GeometryConfig, KepubConfig, ReadingDirection, WidePolicy};
pub use epub::{Diagnostics, ManifestItem, Package, PackageMetadata, build};
pub use error::{Error, Result};
pub use model::{Chapter, DocumentTree, Identifier, ImageKey, Metadata, PageKey, Volume, load_dir};
