//! Configuration for page normalization, package building and kepub conversion.
//!
//! Each stage takes a plain config struct with sensible defaults and chained
//! `with_*` setters:
//!
//! ```
//! use tankobon::{BuildConfig, ReadingDirection, WidePolicy};
//!
//! let config = BuildConfig::default()
//!     .with_crop(true)
//!     .with_wide_policy(WidePolicy::Split)
//!     .with_direction(ReadingDirection::Rtl)
//!     .with_workers(2);
//! assert_eq!(config.workers, 2);
//! ```

use std::path::PathBuf;

use chrono::{DateTime, Utc};

/// What to do with pages wider than they are tall.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
pub enum WidePolicy {
    /// Keep wide pages as they are.
    #[default]
    Preserve,
    /// Replace wide pages with their two halves.
    Split,
    /// Emit the original page, then its halves.
    PreserveAndSplit,
    /// Emit the halves, then the original page.
    SplitAndPreserve,
}

/// Page progression of the book.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
pub enum ReadingDirection {
    #[default]
    Ltr,
    Rtl,
}

impl ReadingDirection {
    pub fn is_rtl(self) -> bool {
        self == ReadingDirection::Rtl
    }
}

/// Settings for the per-page geometry pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeometryConfig {
    /// Trim uniform whitespace around the page content.
    pub crop: bool,
    pub policy: WidePolicy,
    pub direction: ReadingDirection,
    /// Width / height ratio above which a page counts as wide.
    pub wide_ratio: f32,
    /// Pixels with luma at or above this value count as whitespace.
    pub whitespace_luma: u8,
}

impl Default for GeometryConfig {
    fn default() -> Self {
        Self {
            crop: false,
            policy: WidePolicy::Preserve,
            direction: ReadingDirection::Ltr,
            wide_ratio: 1.0,
            whitespace_luma: 240,
        }
    }
}

/// Configuration for [`build`](crate::build).
#[derive(Debug, Clone)]
pub struct BuildConfig {
    pub geometry: GeometryConfig,
    /// Number of image encode workers.
    pub workers: usize,
    /// JPEG quality (1-100).
    pub jpeg_quality: u8,
    /// Images wider than this are downscaled before encoding.
    pub max_width: u32,
    /// Overrides for the tree's own metadata.
    pub title: Option<String>,
    pub author: Option<String>,
    pub language: Option<String>,
    pub identifier: Option<String>,
    /// Fixed `dcterms:modified` value; defaults to the current time.
    pub modified: Option<DateTime<Utc>>,
    /// Directory under which the scratch area is created; defaults to the
    /// system temp directory.
    pub scratch_root: Option<PathBuf>,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            geometry: GeometryConfig::default(),
            workers: 4,
            jpeg_quality: 85,
            max_width: 1600,
            title: None,
            author: None,
            language: None,
            identifier: None,
            modified: None,
            scratch_root: None,
        }
    }
}

impl BuildConfig {
    pub fn with_crop(mut self, crop: bool) -> Self {
        self.geometry.crop = crop;
        self
    }

    pub fn with_wide_policy(mut self, policy: WidePolicy) -> Self {
        self.geometry.policy = policy;
        self
    }

    pub fn with_direction(mut self, direction: ReadingDirection) -> Self {
        self.geometry.direction = direction;
        self
    }

    pub fn with_wide_ratio(mut self, ratio: f32) -> Self {
        self.geometry.wide_ratio = ratio;
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_jpeg_quality(mut self, quality: u8) -> Self {
        self.jpeg_quality = quality;
        self
    }

    pub fn with_max_width(mut self, max_width: u32) -> Self {
        self.max_width = max_width;
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }

    pub fn with_modified(mut self, modified: DateTime<Utc>) -> Self {
        self.modified = Some(modified);
        self
    }

    pub fn with_scratch_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.scratch_root = Some(root.into());
        self
    }
}

/// Configuration for the kepub transform.
#[derive(Debug, Clone, Default)]
pub struct KepubConfig {
    pub series: Option<String>,
    /// Position in the series; defaults to 1 when a series is given.
    pub series_index: Option<f32>,
    /// Fixed `dcterms:modified` value used when the package lacks one.
    pub modified: Option<DateTime<Utc>>,
}

impl KepubConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_series(mut self, series: impl Into<String>, index: Option<f32>) -> Self {
        self.series = Some(series.into());
        self.series_index = index;
        self
    }

    pub fn with_modified(mut self, modified: DateTime<Utc>) -> Self {
        self.modified = Some(modified);
        self
    }
}

/// Format a timestamp the way OPF `dcterms:modified` expects.
pub(crate) fn format_modified(modified: Option<DateTime<Utc>>) -> String {
    modified
        .unwrap_or_else(Utc::now)
        .format("%Y-%m-%dT%H:%M:%SZ")
        .to_string()
}
