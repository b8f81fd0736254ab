//! The document tree handed to the package builder.
//!
//! A [`DocumentTree`] holds volumes, each holding chapters, each holding
//! pages keyed by their index. Everything is stored in sorted maps keyed by
//! [`Identifier`], so iteration always follows reading order regardless of
//! the order in which a loader inserted entries.

use std::collections::BTreeMap;
use std::fmt;

mod disk;
mod identifier;

pub use disk::load_dir;
pub use identifier::Identifier;

/// A manga title: metadata plus its volumes.
#[derive(Debug, Clone, Default)]
pub struct DocumentTree {
    pub metadata: Metadata,
    pub volumes: BTreeMap<Identifier, Volume>,
}

/// Package-level metadata copied into the OPF when present.
#[derive(Debug, Clone, Default)]
pub struct Metadata {
    pub title: Option<String>,
    pub authors: Vec<String>,
    pub language: Option<String>,
    pub identifier: Option<String>,
}

/// A volume: an optional cover and its chapters.
#[derive(Debug, Clone, Default)]
pub struct Volume {
    /// Encoded cover image bytes.
    pub cover: Option<Vec<u8>>,
    pub chapters: BTreeMap<Identifier, Chapter>,
}

/// A chapter: descriptive fields plus encoded page images by index.
#[derive(Debug, Clone, Default)]
pub struct Chapter {
    pub title: Option<String>,
    /// Scanlation group or other source label.
    pub group: Option<String>,
    pub language: Option<String>,
    pub pages: BTreeMap<u32, Vec<u8>>,
}

impl DocumentTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get or insert the volume with the given identifier.
    pub fn add_volume(&mut self, id: impl Into<Identifier>) -> &mut Volume {
        self.volumes.entry(id.into()).or_default()
    }

    pub fn volume(&self, id: impl Into<Identifier>) -> Option<&Volume> {
        self.volumes.get(&id.into())
    }

    /// Total number of pages across all chapters.
    pub fn page_count(&self) -> usize {
        self.volumes
            .values()
            .flat_map(|v| v.chapters.values())
            .map(|c| c.pages.len())
            .sum()
    }
}

impl Metadata {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..Default::default()
        }
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.authors.push(author.into());
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    pub fn with_identifier(mut self, identifier: impl Into<String>) -> Self {
        self.identifier = Some(identifier.into());
        self
    }
}

impl Volume {
    pub fn with_cover(&mut self, data: Vec<u8>) -> &mut Self {
        self.cover = Some(data);
        self
    }

    /// Get or insert the chapter with the given identifier.
    pub fn add_chapter(&mut self, id: impl Into<Identifier>) -> &mut Chapter {
        self.chapters.entry(id.into()).or_default()
    }
}

impl Chapter {
    pub fn with_title(&mut self, title: impl Into<String>) -> &mut Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_group(&mut self, group: impl Into<String>) -> &mut Self {
        self.group = Some(group.into());
        self
    }

    pub fn add_page(&mut self, index: u32, data: Vec<u8>) -> &mut Self {
        self.pages.insert(index, data);
        self
    }
}

/// Coordinates of one source page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageKey {
    pub volume: Identifier,
    pub chapter: Identifier,
    pub page: u32,
}

impl fmt::Display for PageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "volume {} / chapter {} / page {}",
            self.volume, self.chapter, self.page
        )
    }
}

/// Coordinates of one emitted image: a volume cover or a (possibly split) page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageKey {
    Cover { volume: Identifier },
    Page { page: PageKey, split: Option<usize> },
}

impl ImageKey {
    /// Stable file stem, e.g. `1-2-0003` or `1-2-0003-1` for a split half.
    pub fn stem(&self) -> String {
        match self {
            ImageKey::Cover { volume } => format!("cover-{}", volume.slug()),
            ImageKey::Page { page, split } => {
                let base = format!(
                    "{}-{}-{:04}",
                    page.volume.slug(),
                    page.chapter.slug(),
                    page.page
                );
                match split {
                    Some(i) => format!("{base}-{i}"),
                    None => base,
                }
            }
        }
    }
}

impl fmt::Display for ImageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImageKey::Cover { volume } => write!(f, "cover of volume {volume}"),
            ImageKey::Page {
                page,
                split: Some(i),
            } => write!(f, "{page} (part {i})"),
            ImageKey::Page { page, split: None } => write!(f, "{page}"),
        }
    }
}
