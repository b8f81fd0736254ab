//! Package document rewriting: vendor namespaces, rendition records,
//! series records and cover promotion.

use crate::config::{KepubConfig, format_modified};
use crate::error::{Error, Result};
use crate::xml::{Document, Element};

use super::cover::promote_cover;
use super::{EPUB_NS, KOBO_NS};

const SERIES: &str = "calibre:series";
const SERIES_INDEX: &str = "calibre:series_index";

/// How a `<meta>` record is keyed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Key {
    /// EPUB 2 style: `<meta name=".." content=".."/>`.
    Name(&'static str),
    /// EPUB 3 style: `<meta property="..">value</meta>`.
    Property(&'static str),
}

impl Key {
    fn matches(self, meta: &Element) -> bool {
        if meta.local_name() != "meta" {
            return false;
        }
        match self {
            Key::Name(name) => meta.attr("name") == Some(name),
            Key::Property(property) => meta.attr("property") == Some(property),
        }
    }

    fn record(self, value: &str) -> Element {
        match self {
            Key::Name(name) => Element::new("meta")
                .with_attr("name", name)
                .with_attr("content", value),
            Key::Property(property) => Element::new("meta")
                .with_attr("property", property)
                .with_text(value),
        }
    }
}

/// Rewrite the parsed package document in place.
///
/// Running this twice with the same config leaves the document unchanged
/// after the first pass.
pub fn rewrite_metadata(opf: &mut Document, config: &KepubConfig) -> Result<()> {
    let root = &mut opf.root;
    if root.attr("xmlns:kobo").is_none() {
        root.set_attr("xmlns:kobo", KOBO_NS);
    }
    if root.attr("xmlns:epub").is_none() {
        root.set_attr("xmlns:epub", EPUB_NS);
    }

    let rtl = root
        .child("spine")
        .and_then(|s| s.attr("page-progression-direction"))
        == Some("rtl");
    let writing_mode = if rtl { "horizontal-rl" } else { "horizontal-lr" };
    let modified = format_modified(config.modified);

    let metadata = root
        .child_mut("metadata")
        .ok_or_else(|| Error::MissingDocument("metadata element".to_string()))?;

    let records = [
        (Key::Name("book-type"), "comic"),
        (Key::Name("kobo:format-version"), "1.0"),
        (Key::Name("fixed-layout"), "true"),
        (Key::Property("rendition:layout"), "pre-paginated"),
        (Key::Property("rendition:orientation"), "portrait"),
        (Key::Property("rendition:spread"), "none"),
        (Key::Property("rendition:flow"), "paginated"),
        (Key::Property("dcterms:modified"), modified.as_str()),
        (Key::Name("primary-writing-mode"), writing_mode),
    ];
    for (key, value) in records {
        if !metadata.elements().any(|e| key.matches(e)) {
            metadata.push(key.record(value));
        }
    }

    match config.series {
        Some(ref series) => {
            let index = format!("{:.1}", config.series_index.unwrap_or(1.0));
            upsert(metadata, Key::Name(SERIES), series);
            upsert(metadata, Key::Name(SERIES_INDEX), &index);
        }
        None => {
            metadata.remove_elements(|e| {
                Key::Name(SERIES).matches(e) || Key::Name(SERIES_INDEX).matches(e)
            });
        }
    }

    promote_cover(root)?;
    Ok(())
}

/// Set the content of the first matching record, dropping any duplicates,
/// or append a new one.
fn upsert(metadata: &mut Element, key: Key, value: &str) {
    let mut seen = false;
    metadata.remove_elements(|e| {
        if !key.matches(e) {
            return false;
        }
        let duplicate = seen;
        seen = true;
        duplicate
    });
    if let Some(existing) = metadata.elements_mut().find(|e| key.matches(e)) {
        existing.set_attr("content", value);
    } else {
        metadata.push(key.record(value));
    }
}
