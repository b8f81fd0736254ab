//! Kobo kepub conversion.
//!
//! The transform runs in a fixed order: validate the input, extract it to a
//! scratch directory, rewrite every content document, rewrite the package
//! document, and zip the directory back up with `mimetype` stored first.
//!
//! Content documents are rewritten best-effort: one that fails to parse is
//! logged and left as it was. The package document and the final archive are
//! required, so failures there abort the transform.
//!
//! ```no_run
//! use tankobon::KepubConfig;
//!
//! let epub = std::fs::read("book.epub")?;
//! let config = KepubConfig::new().with_series("Series", Some(3.0));
//! let kepub = tankobon::kepub::transform(&epub, &config)?;
//! std::fs::write("book.kepub.epub", kepub)?;
//! # Ok::<(), tankobon::Error>(())
//! ```

mod cover;
mod markup;
mod metadata;

use std::fs::{self, File};
use std::io::{Cursor, Write};
use std::path::Path;

use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::archive;
use crate::config::KepubConfig;
use crate::epub::Package;
use crate::error::{Error, Result};
use crate::xml::{self, Document};

pub use cover::{COVER_ID, promote_cover};
pub use markup::{IMAGE_CLASS, SPAN_CLASS, rewrite_markup};
pub use metadata::rewrite_metadata;

/// Kobo vendor namespace.
pub const KOBO_NS: &str = "http://www.kobo.com/ns/kepub";

/// EPUB structural-semantics namespace.
pub const EPUB_NS: &str = "http://www.idpf.org/2007/ops";

const CONTAINER_PATH: &str = "META-INF/container.xml";

/// Counts of content documents seen by one transform.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct MarkupReport {
    rewritten: usize,
    skipped: usize,
}

/// Convert EPUB archive bytes to a kepub archive.
pub fn transform(input: &[u8], config: &KepubConfig) -> Result<Vec<u8>> {
    if input.is_empty() {
        return Err(Error::EmptyPackage);
    }

    let scratch = tempfile::Builder::new()
        .prefix("tankobon-kepub-")
        .tempdir()?;
    let root = scratch.path();

    if archive::extract(input, root)? == 0 {
        return Err(Error::EmptyPackage);
    }

    let opf_rel = package_document_path(root)?;
    let opf_path = root.join(&opf_rel);
    let opf_bytes = fs::read(&opf_path).map_err(|_| Error::MissingDocument(opf_rel.clone()))?;
    let mut opf = Document::parse(&opf_bytes)?;
    let sections = opf
        .root
        .child("spine")
        .map_or(0, |s| s.elements().filter(|e| e.local_name() == "itemref").count());
    if sections == 0 {
        return Err(Error::NoContentSections);
    }

    let report = rewrite_content_documents(root)?;

    rewrite_metadata(&mut opf, config)?;
    fs::write(&opf_path, opf.to_xml()?)?;

    let mut out = Cursor::new(Vec::new());
    archive::repackage(root, &mut out)?;
    let out = out.into_inner();

    info!(
        sections,
        rewritten = report.rewritten,
        skipped = report.skipped,
        bytes = out.len(),
        "kepub transform complete"
    );
    Ok(out)
}

/// Convert a freshly built package without a round trip through the disk.
pub fn transform_package(package: &Package, config: &KepubConfig) -> Result<Vec<u8>> {
    if !package.has_content_sections() {
        return Err(Error::NoContentSections);
    }
    transform(&package.to_bytes()?, config)
}

/// Convert the EPUB at `input` and write the kepub to `output`.
///
/// The output is written to a temporary sibling and renamed into place, so
/// a failed transform leaves nothing at `output`.
pub fn transform_file<P: AsRef<Path>, Q: AsRef<Path>>(
    input: P,
    output: Q,
    config: &KepubConfig,
) -> Result<()> {
    let bytes = fs::read(input.as_ref())?;
    let kepub = transform(&bytes, config)?;
    write_kepub(output.as_ref(), &kepub)
}

/// Convert a freshly built package and write the kepub to `output`.
///
/// Like [`transform_file`], a failure leaves nothing at `output` and an
/// existing file there is only replaced once the new archive is complete.
pub fn transform_package_file<P: AsRef<Path>>(
    package: &Package,
    output: P,
    config: &KepubConfig,
) -> Result<()> {
    let kepub = transform_package(package, config)?;
    write_kepub(output.as_ref(), &kepub)
}

fn write_kepub(output: &Path, kepub: &[u8]) -> Result<()> {
    archive::write_atomic(output, |file: &mut File| {
        file.write_all(kepub)?;
        Ok(())
    })
}

/// Path of the package document, relative to the extraction root.
fn package_document_path(root: &Path) -> Result<String> {
    let container = fs::read(root.join(CONTAINER_PATH))
        .map_err(|_| Error::MissingDocument(CONTAINER_PATH.to_string()))?;
    xml::rootfile_path(&container)
}

fn is_markup(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| matches!(e.to_ascii_lowercase().as_str(), "xhtml" | "html" | "htm"))
}

/// Rewrite every content document below `root`, at any depth.
fn rewrite_content_documents(root: &Path) -> Result<MarkupReport> {
    let mut report = MarkupReport::default();

    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry.map_err(std::io::Error::from)?;
        if !entry.file_type().is_file() || !is_markup(entry.path()) {
            continue;
        }
        let path = entry.path();
        let rel = path.strip_prefix(root).unwrap_or(path);

        let original = fs::read(path)?;
        match rewrite_markup(&original) {
            Ok(rewritten) => {
                fs::write(path, rewritten)?;
                report.rewritten += 1;
                debug!(document = %rel.display(), "rewrote content document");
            }
            Err(e) => {
                let e = Error::MalformedMarkup {
                    path: rel.to_path_buf(),
                    reason: e.to_string(),
                };
                warn!(error = %e, "leaving content document unchanged");
                report.skipped += 1;
            }
        }
    }

    Ok(report)
}
