//! EPUB archive serialization.

use std::fs::File;
use std::io::{self, Seek, Write};

use tracing::debug;

use crate::archive::{EPUB_MIMETYPE, deflated, start_archive};
use crate::error::{Error, Result};

use super::markup::CONTAINER_XML;
use super::package::{ItemSource, Package};

/// Directory holding the package document and everything it references.
pub(crate) const CONTENT_DIR: &str = "OEBPS";

pub(crate) fn write_package<W: Write + Seek>(package: &Package, writer: W) -> Result<()> {
    if !package.has_content_sections() {
        return Err(Error::NoContentSections);
    }

    let mut zip = start_archive(writer, EPUB_MIMETYPE)?;

    zip.start_file("META-INF/container.xml", deflated())?;
    zip.write_all(CONTAINER_XML)?;

    let opf = package.package_document()?;
    zip.start_file(format!("{CONTENT_DIR}/content.opf"), deflated())?;
    zip.write_all(opf.as_bytes())?;

    for item in &package.manifest {
        zip.start_file(format!("{CONTENT_DIR}/{}", item.href), deflated())?;
        match item.source {
            ItemSource::Memory(ref data) => zip.write_all(data)?,
            ItemSource::Scratch(ref path) => {
                let mut file = File::open(path)?;
                io::copy(&mut file, &mut zip)?;
            }
        }
    }

    zip.finish()?;
    debug!(entries = package.manifest.len() + 3, "wrote package archive");
    Ok(())
}
