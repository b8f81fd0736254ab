//! OPF package document generation.

use crate::config::format_modified;
use crate::error::Result;
use crate::xml::{Document, Element};

use super::package::{ManifestItem, PackageMetadata};

const OPF_NS: &str = "http://www.idpf.org/2007/opf";
const DC_NS: &str = "http://purl.org/dc/elements/1.1/";

/// Manifest id of the NCX, referenced from the spine's `toc` attribute.
pub(crate) const NCX_ID: &str = "ncx";

pub(crate) fn package_document(
    meta: &PackageMetadata,
    manifest: &[ManifestItem],
    spine: &[String],
) -> Result<String> {
    let mut metadata = Element::new("metadata")
        .with_attr("xmlns:dc", DC_NS)
        .with_child(
            Element::new("dc:identifier")
                .with_attr("id", "BookId")
                .with_text(&meta.identifier),
        )
        .with_child(Element::new("dc:title").with_text(&meta.title))
        .with_child(Element::new("dc:language").with_text(&meta.language));

    for author in &meta.authors {
        metadata.push(Element::new("dc:creator").with_text(author));
    }
    metadata.push(
        Element::new("meta")
            .with_attr("property", "dcterms:modified")
            .with_text(format_modified(Some(meta.modified))),
    );
    if let Some(ref cover) = meta.cover_id {
        metadata.push(
            Element::new("meta")
                .with_attr("name", "cover")
                .with_attr("content", cover),
        );
    }

    let mut manifest_el = Element::new("manifest");
    for item in manifest {
        let mut el = Element::new("item")
            .with_attr("id", &item.id)
            .with_attr("href", &item.href)
            .with_attr("media-type", &item.media_type);
        if !item.properties.is_empty() {
            let props: Vec<_> = item.properties.iter().map(|p| p.as_str()).collect();
            el.set_attr("properties", props.join(" "));
        }
        manifest_el.push(el);
    }

    let mut spine_el = Element::new("spine").with_attr("toc", NCX_ID);
    if meta.direction.is_rtl() {
        spine_el.set_attr("page-progression-direction", "rtl");
    }
    for idref in spine {
        spine_el.push(Element::new("itemref").with_attr("idref", idref));
    }

    let package = Element::new("package")
        .with_attr("xmlns", OPF_NS)
        .with_attr("version", "3.0")
        .with_attr("unique-identifier", "BookId")
        .with_child(metadata)
        .with_child(manifest_el)
        .with_child(spine_el);

    Document::new(package).to_xml_pretty()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ReadingDirection;
    use crate::epub::package::{ItemProperty, ItemSource};
    use chrono::{TimeZone, Utc};

    fn metadata(direction: ReadingDirection) -> PackageMetadata {
        PackageMetadata {
            title: "Tom & Jerry <Vol. 1>".to_string(),
            identifier: "urn:uuid:1234".to_string(),
            language: "ja".to_string(),
            authors: vec!["A \"Quoted\" Author".to_string()],
            modified: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
            direction,
            cover_id: Some("cover".to_string()),
        }
    }

    fn manifest() -> Vec<ManifestItem> {
        vec![
            ManifestItem::new(
                "cover",
                "images/cover-1.jpg",
                "image/jpeg",
                ItemSource::Memory(Vec::new()),
            )
            .with_property(ItemProperty::CoverImage),
            ManifestItem::new(
                "chapter-1-1",
                "text/chapter-1-1.xhtml",
                "application/xhtml+xml",
                ItemSource::Memory(Vec::new()),
            ),
        ]
    }

    #[test]
    fn test_package_document_roundtrips_metadata() {
        let opf = package_document(
            &metadata(ReadingDirection::Ltr),
            &manifest(),
            &["chapter-1-1".to_string()],
        )
        .unwrap();
        let doc = Document::parse(opf.as_bytes()).unwrap();

        let meta = doc.root.child("metadata").unwrap();
        assert_eq!(meta.child("title").unwrap().text(), "Tom & Jerry <Vol. 1>");
        assert_eq!(meta.child("creator").unwrap().text(), "A \"Quoted\" Author");
        assert_eq!(meta.child("language").unwrap().text(), "ja");
        assert!(opf.contains("2024-05-01T12:00:00Z"));

        let cover = doc.root.child("manifest").unwrap().child("item").unwrap();
        assert_eq!(cover.attr("properties"), Some("cover-image"));

        let spine = doc.root.child("spine").unwrap();
        assert_eq!(spine.attr("toc"), Some("ncx"));
        assert_eq!(spine.attr("page-progression-direction"), None);
        assert_eq!(
            spine.child("itemref").unwrap().attr("idref"),
            Some("chapter-1-1")
        );
    }

    #[test]
    fn test_rtl_is_recorded_on_spine() {
        let opf = package_document(&metadata(ReadingDirection::Rtl), &manifest(), &[]).unwrap();
        let doc = Document::parse(opf.as_bytes()).unwrap();
        assert_eq!(
            doc.root
                .child("spine")
                .unwrap()
                .attr("page-progression-direction"),
            Some("rtl")
        );
    }
}
