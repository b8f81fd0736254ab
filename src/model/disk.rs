//! Load a document tree from a directory of images.
//!
//! Expected layout:
//!
//! ```text
//! root/
//! ├── 1/                  # volume identifier
//! │   ├── cover.jpg       # optional volume cover
//! │   ├── 1/              # chapter identifier
//! │   │   ├── 001.png
//! │   │   └── 002.png
//! │   └── 1.5/
//! │       └── 001.jpg
//! └── 2/
//!     └── ...
//! ```

use std::fs;
use std::path::Path;

use tracing::{debug, warn};
use walkdir::WalkDir;

use super::{DocumentTree, Metadata};
use crate::error::Result;

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp"];

/// Read `root` into a [`DocumentTree`], using the directory name as title.
pub fn load_dir(root: &Path) -> Result<DocumentTree> {
    let mut tree = DocumentTree::new();
    if let Some(name) = root.file_name().and_then(|n| n.to_str()) {
        tree.metadata = Metadata::new(name);
    }

    for entry in WalkDir::new(root)
        .min_depth(1)
        .max_depth(3)
        .sort_by_file_name()
    {
        let entry = entry.map_err(std::io::Error::from)?;
        if !entry.file_type().is_file() || !is_image(entry.path()) {
            continue;
        }
        let rel = entry.path().strip_prefix(root).unwrap_or(entry.path());
        let parts: Vec<&str> = rel
            .components()
            .filter_map(|c| c.as_os_str().to_str())
            .collect();

        match parts.as_slice() {
            [volume, file] if file_stem(file).eq_ignore_ascii_case("cover") => {
                debug!(volume, "found volume cover");
                tree.add_volume(*volume).with_cover(fs::read(entry.path())?);
            }
            [volume, chapter, file] => {
                let chapter = tree.add_volume(*volume).add_chapter(*chapter);
                let index = page_index(file).unwrap_or(chapter.pages.len() as u32);
                chapter.add_page(index, fs::read(entry.path())?);
            }
            _ => warn!(path = %rel.display(), "ignoring image outside volume/chapter layout"),
        }
    }

    Ok(tree)
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| IMAGE_EXTENSIONS.iter().any(|x| e.eq_ignore_ascii_case(x)))
}

fn file_stem(name: &str) -> &str {
    name.rsplit_once('.').map(|(stem, _)| stem).unwrap_or(name)
}

/// Leading digits of the file stem (`"012-a.png"` -> 12).
fn page_index(name: &str) -> Option<u32> {
    let digits: String = file_stem(name)
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok()
}
