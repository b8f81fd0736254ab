//! ZIP container helpers shared by the EPUB builder and the kepub transform.
//!
//! Both output formats require the `mimetype` entry to come first and to be
//! stored without compression; readers that sniff the container rely on it.

use std::fs::{self, File};
use std::io::{self, Cursor, Seek, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::{debug, warn};
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, DateTime, ZipArchive, ZipWriter};

use crate::error::{Error, Result};

/// Name of the type-declaration entry.
pub const MIMETYPE_PATH: &str = "mimetype";

/// Contents of the type-declaration entry.
pub const EPUB_MIMETYPE: &[u8] = b"application/epub+zip";

/// Entry options for uncompressed entries. Timestamps are pinned to the zip
/// epoch so identical input produces identical archives.
pub(crate) fn stored() -> SimpleFileOptions {
    SimpleFileOptions::default()
        .compression_method(CompressionMethod::Stored)
        .last_modified_time(DateTime::default())
}

pub(crate) fn deflated() -> SimpleFileOptions {
    SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .compression_level(Some(6))
        .last_modified_time(DateTime::default())
}

/// Start an archive by writing the `mimetype` entry, stored, as entry zero.
pub(crate) fn start_archive<W: Write + Seek>(writer: W, mimetype: &[u8]) -> Result<ZipWriter<W>> {
    let mut zip = ZipWriter::new(writer);
    zip.start_file(MIMETYPE_PATH, stored())?;
    zip.write_all(mimetype)?;
    Ok(zip)
}

/// Extract every entry of `bytes` below `dest`, keeping relative paths.
///
/// Entries whose names would escape `dest` are skipped. Returns the number of
/// files written.
pub fn extract(bytes: &[u8], dest: &Path) -> Result<usize> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))?;
    let mut written = 0;

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        let Some(rel) = entry.enclosed_name() else {
            warn!(name = entry.name(), "skipping archive entry outside extraction root");
            continue;
        };
        let out = dest.join(rel);

        if entry.is_dir() {
            fs::create_dir_all(&out)?;
            continue;
        }
        if let Some(parent) = out.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = File::create(&out)?;
        io::copy(&mut entry, &mut file)?;
        written += 1;
    }

    debug!(files = written, dest = %dest.display(), "extracted archive");
    Ok(written)
}

/// Files below `root` as sorted, `/`-separated relative paths.
pub fn list_files(root: &Path) -> Result<Vec<String>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry.map_err(io::Error::from)?;
        if !entry.file_type().is_file() {
            continue;
        }
        let rel = entry.path().strip_prefix(root).unwrap_or(entry.path());
        let rel: Vec<_> = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect();
        files.push(rel.join("/"));
    }
    files.sort();
    Ok(files)
}

/// Zip the directory tree at `root`: `mimetype` first and stored, everything
/// else deflated in sorted path order.
///
/// A missing `mimetype` file is replaced with the standard EPUB value.
pub fn repackage<W: Write + Seek>(root: &Path, writer: W) -> Result<()> {
    let mimetype_path = root.join(MIMETYPE_PATH);
    let mimetype = if mimetype_path.is_file() {
        let data = fs::read(&mimetype_path)?;
        let trimmed = data.trim_ascii();
        if trimmed.is_empty() {
            EPUB_MIMETYPE.to_vec()
        } else {
            trimmed.to_vec()
        }
    } else {
        EPUB_MIMETYPE.to_vec()
    };

    let mut zip = start_archive(writer, &mimetype)?;
    for rel in list_files(root)? {
        if rel == MIMETYPE_PATH {
            continue;
        }
        zip.start_file(rel.as_str(), deflated())?;
        let mut file = File::open(root.join(&rel))?;
        io::copy(&mut file, &mut zip)?;
    }
    zip.finish()?;
    Ok(())
}

/// Names of all entries in archive order.
pub fn entry_names(bytes: &[u8]) -> Result<Vec<String>> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))?;
    let mut names = Vec::with_capacity(archive.len());
    for i in 0..archive.len() {
        names.push(archive.by_index_raw(i)?.name().to_string());
    }
    Ok(names)
}

/// Whether the first entry is an uncompressed `mimetype`.
pub fn has_stored_mimetype_first(bytes: &[u8]) -> Result<bool> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))?;
    if archive.is_empty() {
        return Ok(false);
    }
    let first = archive.by_index(0)?;
    Ok(first.name() == MIMETYPE_PATH && first.compression() == CompressionMethod::Stored)
}

/// Write `path` through a temporary sibling, renaming only once `fill` succeeds.
///
/// A failure leaves no file at `path`.
pub(crate) fn write_atomic<F>(path: &Path, fill: F) -> Result<()>
where
    F: FnOnce(&mut File) -> Result<()>,
{
    let dir: PathBuf = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let mut tmp = NamedTempFile::new_in(&dir)?;
    fill(tmp.as_file_mut())?;
    tmp.as_file_mut().flush()?;
    tmp.persist(path).map_err(|e| Error::Io(e.error))?;
    Ok(())
}
