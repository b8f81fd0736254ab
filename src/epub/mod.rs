//! Package builder: turns a [`DocumentTree`] into an EPUB 3 [`Package`].
//!
//! Volumes and chapters are emitted in identifier order. Every path and
//! manifest id is derived from volume/chapter/page coordinates, so building
//! the same tree twice with a fixed `modified` time yields identical bytes.
//!
//! ```no_run
//! use tankobon::{BuildConfig, DocumentTree, build};
//!
//! let tree: DocumentTree = tankobon::load_dir("manga/".as_ref())?;
//! let (package, diagnostics) = build(&tree, &BuildConfig::default())?;
//! package.write_file("manga.epub")?;
//! println!("{} images", diagnostics.images);
//! # Ok::<(), tankobon::Error>(())
//! ```

mod encode;
mod markup;
mod nav;
mod opf;
mod package;
mod writer;

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use chrono::Utc;
use tracing::{debug, info};

use crate::config::{BuildConfig, GeometryConfig};
use crate::error::{Error, Result};
use crate::geometry;
use crate::model::{Chapter, DocumentTree, Identifier, ImageKey, PageKey, Volume};

use encode::{EncodeJob, EncodePool, EncodeSettings, EncodedImage};
use markup::{PageRef, STYLESHEET, chapter_document};
use nav::{NavChapter, NavVolume, nav_document, ncx_document};

pub use package::{Diagnostics, ItemProperty, ManifestItem, Package, PackageMetadata};

pub(crate) use package::ItemSource;

/// Title used when neither the tree nor the config supplies one.
pub const DEFAULT_TITLE: &str = "Untitled";

/// Language used when neither the tree nor the config supplies one.
pub const DEFAULT_LANGUAGE: &str = "en";

/// Manifest id given to the package cover image.
pub const COVER_ID: &str = "cover";

const XHTML_TYPE: &str = "application/xhtml+xml";
const JPEG_TYPE: &str = "image/jpeg";

/// Build a package from `tree`.
///
/// The tree is validated before anything touches the disk. Images are
/// written to a scratch directory owned by the returned [`Package`], which
/// must be serialized before it is dropped or cleaned up.
pub fn build(tree: &DocumentTree, config: &BuildConfig) -> Result<(Package, Diagnostics)> {
    validate(tree)?;

    let metadata = package_metadata(tree, config);
    info!(
        title = %metadata.title,
        volumes = tree.volumes.len(),
        pages = tree.page_count(),
        "building package"
    );

    let mut scratch_builder = tempfile::Builder::new();
    scratch_builder.prefix("tankobon-");
    let scratch = match config.scratch_root {
        Some(ref root) => scratch_builder.tempdir_in(root)?,
        None => scratch_builder.tempdir()?,
    };
    let images_dir = scratch.path().join("images");
    fs::create_dir_all(&images_dir)?;

    let style_path = scratch.path().join("style.css");
    fs::write(&style_path, STYLESHEET)?;

    let mut assembler = Assembler {
        geometry: config.geometry,
        language: metadata.language.clone(),
        images_dir,
        manifest: vec![ManifestItem::new(
            "style",
            "style.css",
            "text/css",
            ItemSource::Scratch(style_path),
        )],
        spine: Vec::new(),
        nav: Vec::new(),
        cover_id: None,
        diagnostics: Diagnostics::default(),
    };

    let settings = EncodeSettings {
        quality: config.jpeg_quality.clamp(1, 100),
        max_width: config.max_width,
    };
    encode::with_pool(config.workers, settings, |pool| {
        for (id, volume) in &tree.volumes {
            assembler.add_volume(pool, id, volume)?;
        }
        Ok(())
    })?;

    let Assembler {
        mut manifest,
        spine,
        nav,
        cover_id,
        diagnostics,
        ..
    } = assembler;

    let metadata = PackageMetadata {
        cover_id,
        ..metadata
    };

    manifest.push(
        ManifestItem::new(
            "nav",
            "nav.xhtml",
            XHTML_TYPE,
            ItemSource::Memory(nav_document(&metadata.title, &metadata.language, &nav).into_bytes()),
        )
        .with_property(ItemProperty::Nav),
    );
    manifest.push(ManifestItem::new(
        opf::NCX_ID,
        "toc.ncx",
        "application/x-dtbncx+xml",
        ItemSource::Memory(ncx_document(&metadata.identifier, &metadata.title, &nav).into_bytes()),
    ));

    info!(
        chapters = diagnostics.chapters,
        images = diagnostics.images,
        split_pages = diagnostics.split_pages,
        "package built"
    );

    let package = Package {
        metadata,
        manifest,
        spine,
        scratch: Some(scratch),
    };
    Ok((package, diagnostics))
}

/// Reject trees the builder cannot turn into a readable package.
///
/// Paths and manifest ids are built from identifier slugs, so two
/// identifiers sharing a slug at the same level are rejected here.
fn validate(tree: &DocumentTree) -> Result<()> {
    if tree.volumes.is_empty() {
        return Err(Error::EmptyTree);
    }
    let mut volume_slugs: HashMap<String, &Identifier> = HashMap::new();
    for (volume_id, volume) in &tree.volumes {
        let slug = volume_id.slug();
        if let Some(first) = volume_slugs.insert(slug.clone(), volume_id) {
            return Err(Error::VolumeCollision {
                first: first.clone(),
                second: volume_id.clone(),
                slug,
            });
        }
        if volume.chapters.is_empty() {
            return Err(Error::EmptyVolume {
                volume: volume_id.clone(),
            });
        }
        let mut chapter_slugs: HashMap<String, &Identifier> = HashMap::new();
        for (chapter_id, chapter) in &volume.chapters {
            let slug = chapter_id.slug();
            if let Some(first) = chapter_slugs.insert(slug.clone(), chapter_id) {
                return Err(Error::ChapterCollision {
                    volume: volume_id.clone(),
                    first: first.clone(),
                    second: chapter_id.clone(),
                    slug,
                });
            }
            if chapter.pages.is_empty() {
                return Err(Error::EmptyChapter {
                    volume: volume_id.clone(),
                    chapter: chapter_id.clone(),
                });
            }
            if let Some((&page, _)) = chapter.pages.iter().find(|(_, data)| data.is_empty()) {
                return Err(Error::MissingPage {
                    page: PageKey {
                        volume: volume_id.clone(),
                        chapter: chapter_id.clone(),
                        page,
                    },
                });
            }
        }
    }
    Ok(())
}

fn package_metadata(tree: &DocumentTree, config: &BuildConfig) -> PackageMetadata {
    let meta = &tree.metadata;
    let title = non_empty(config.title.as_deref())
        .or_else(|| non_empty(meta.title.as_deref()))
        .unwrap_or(DEFAULT_TITLE)
        .to_string();
    let language = non_empty(config.language.as_deref())
        .or_else(|| non_empty(meta.language.as_deref()))
        .unwrap_or(DEFAULT_LANGUAGE)
        .to_string();
    let identifier = non_empty(config.identifier.as_deref())
        .or_else(|| non_empty(meta.identifier.as_deref()))
        .map(str::to_string)
        .unwrap_or_else(|| derived_identifier(&title, tree.volumes.keys()));
    let authors = match config.author {
        Some(ref author) => vec![author.clone()],
        None => meta.authors.clone(),
    };

    PackageMetadata {
        title,
        identifier,
        language,
        authors,
        modified: config.modified.unwrap_or_else(Utc::now),
        direction: config.geometry.direction,
        cover_id: None,
    }
}

fn non_empty(s: Option<&str>) -> Option<&str> {
    s.map(str::trim).filter(|s| !s.is_empty())
}

/// Name-based identifier: the SHA-1 of the title and volume ids laid out as a
/// version 5 UUID.
fn derived_identifier<'a>(title: &str, volumes: impl Iterator<Item = &'a Identifier>) -> String {
    let mut hasher = sha1_smol::Sha1::new();
    hasher.update(title.as_bytes());
    for volume in volumes {
        hasher.update(b"\n");
        hasher.update(volume.as_str().as_bytes());
    }
    let digest = hasher.digest().bytes();

    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&digest[..16]);
    bytes[6] = (bytes[6] & 0x0f) | 0x50;
    bytes[8] = (bytes[8] & 0x3f) | 0x80;

    let hex: String = bytes.iter().map(|b| format!("{b:02x}")).collect();
    format!(
        "urn:uuid:{}-{}-{}-{}-{}",
        &hex[0..8],
        &hex[8..12],
        &hex[12..16],
        &hex[16..20],
        &hex[20..32]
    )
}

/// Accumulates manifest, spine and navigation while volumes are added.
struct Assembler {
    geometry: GeometryConfig,
    language: String,
    images_dir: PathBuf,
    manifest: Vec<ManifestItem>,
    spine: Vec<String>,
    nav: Vec<NavVolume>,
    cover_id: Option<String>,
    diagnostics: Diagnostics,
}

impl Assembler {
    fn add_volume(&mut self, pool: &EncodePool, id: &Identifier, volume: &Volume) -> Result<()> {
        let mut lead = match volume.cover {
            Some(ref data) => self.encode_cover(pool, id, data)?,
            None => None,
        };

        let mut chapters = Vec::with_capacity(volume.chapters.len());
        for (chapter_id, chapter) in &volume.chapters {
            chapters.push(self.add_chapter(pool, id, chapter_id, chapter, lead.take())?);
        }

        self.nav.push(NavVolume {
            label: format!("Volume {id}"),
            chapters,
        });
        self.diagnostics.volumes += 1;
        Ok(())
    }

    /// Encode a volume cover. The first cover becomes the package cover;
    /// later ones are returned so they can lead their volume's first chapter.
    fn encode_cover(
        &mut self,
        pool: &EncodePool,
        volume: &Identifier,
        data: &[u8],
    ) -> Result<Option<PageRef>> {
        let image = geometry::decode_page(data).map_err(|source| Error::UndecodableCover {
            volume: volume.clone(),
            source,
        })?;
        let key = ImageKey::Cover {
            volume: volume.clone(),
        };
        let encoded = pool.encode_all(vec![self.job(key, image)])?;
        let Some(encoded) = encoded.into_iter().next() else {
            return Err(Error::WorkerPool("missing cover result".to_string()));
        };
        self.note_encoded(&encoded);
        self.diagnostics.covers += 1;

        let href = image_href(&encoded.key);
        if self.cover_id.is_none() {
            self.manifest.push(
                ManifestItem::new(COVER_ID, href, JPEG_TYPE, ItemSource::Scratch(encoded.path))
                    .with_property(ItemProperty::CoverImage),
            );
            self.cover_id = Some(COVER_ID.to_string());
            return Ok(None);
        }

        self.manifest.push(ManifestItem::new(
            image_id(&encoded.key),
            href.clone(),
            JPEG_TYPE,
            ItemSource::Scratch(encoded.path),
        ));
        Ok(Some(PageRef {
            href: format!("../{href}"),
            alt: format!("Cover of volume {volume}"),
            width: encoded.width,
            height: encoded.height,
        }))
    }

    fn add_chapter(
        &mut self,
        pool: &EncodePool,
        volume: &Identifier,
        id: &Identifier,
        chapter: &Chapter,
        lead: Option<PageRef>,
    ) -> Result<NavChapter> {
        let mut jobs = Vec::new();
        for (&index, data) in &chapter.pages {
            let page = PageKey {
                volume: volume.clone(),
                chapter: id.clone(),
                page: index,
            };
            let decoded = geometry::decode_page(data).map_err(|source| Error::UndecodablePage {
                page: page.clone(),
                source,
            })?;
            let images = geometry::normalize(decoded, &self.geometry).map_err(|e| match e {
                Error::InvalidGeometry { width, height } => Error::InvalidPageGeometry {
                    page: page.clone(),
                    width,
                    height,
                },
                other => other,
            })?;

            self.diagnostics.pages += 1;
            let split = images.len() > 1;
            if split {
                self.diagnostics.split_pages += 1;
            }
            for (i, image) in images.into_iter().enumerate() {
                let key = ImageKey::Page {
                    page: page.clone(),
                    split: split.then_some(i),
                };
                jobs.push(self.job(key, image));
            }
        }

        let encoded = pool.encode_all(jobs)?;
        if encoded.is_empty() && lead.is_none() {
            return Err(Error::NoRenderableImages {
                volume: volume.clone(),
                chapter: id.clone(),
            });
        }

        let mut pages: Vec<PageRef> = lead.into_iter().collect();
        for (n, image) in encoded.into_iter().enumerate() {
            self.note_encoded(&image);
            let href = image_href(&image.key);
            pages.push(PageRef {
                href: format!("../{href}"),
                alt: format!("Page {}", n + 1),
                width: image.width,
                height: image.height,
            });
            self.manifest.push(ManifestItem::new(
                image_id(&image.key),
                href,
                JPEG_TYPE,
                ItemSource::Scratch(image.path),
            ));
        }

        let slug = format!("{}-{}", volume.slug(), id.slug());
        let title = chapter
            .title
            .clone()
            .unwrap_or_else(|| format!("Chapter {id}"));
        let language = chapter.language.as_deref().unwrap_or(&self.language);
        let xhtml = chapter_document(&title, language, &pages);

        let chapter_id = format!("chapter-{slug}");
        let href = format!("text/chapter-{slug}.xhtml");
        self.manifest.push(ManifestItem::new(
            chapter_id.clone(),
            href.clone(),
            XHTML_TYPE,
            ItemSource::Memory(xhtml.into_bytes()),
        ));
        self.spine.push(chapter_id);
        self.diagnostics.chapters += 1;
        debug!(volume = %volume, chapter = %id, pages = pages.len(), "added chapter");

        let label = match chapter.group {
            Some(ref group) => format!("{title} [{group}]"),
            None => title,
        };
        Ok(NavChapter { label, href })
    }

    fn job(&self, key: ImageKey, image: image::DynamicImage) -> EncodeJob {
        let path = self.images_dir.join(format!("{}.jpg", key.stem()));
        EncodeJob { key, image, path }
    }

    fn note_encoded(&mut self, image: &EncodedImage) {
        self.diagnostics.images += 1;
        if image.downscaled {
            self.diagnostics.downscaled += 1;
        }
    }
}

fn image_href(key: &ImageKey) -> String {
    format!("images/{}.jpg", key.stem())
}

fn image_id(key: &ImageKey) -> String {
    format!("img-{}", key.stem())
}
