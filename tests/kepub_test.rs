//! Tests for the kepub transform on built and hand-made packages.

use std::fs;
use std::io::{Cursor, Read, Write};

use chrono::{DateTime, Utc};
use image::{DynamicImage, GrayImage, ImageFormat};
use tempfile::TempDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use tankobon::archive::{entry_names, has_stored_mimetype_first};
use tankobon::kepub::{self, KOBO_NS};
use tankobon::xml::{Document, Element};
use tankobon::{BuildConfig, DocumentTree, Error, KepubConfig, ReadingDirection, build};

const CONTAINER: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
  <rootfiles>
    <rootfile full-path="OPS/package.opf" media-type="application/oebps-package+xml"/>
  </rootfiles>
</container>
"#;

/// A hand-made EPUB with the given manifest items, spine and files.
///
/// The mimetype is deliberately written last and compressed.
fn epub(items: &str, spine: &str, files: &[(&str, &str)]) -> Vec<u8> {
    let opf = format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<package xmlns="http://www.idpf.org/2007/opf" version="3.0" unique-identifier="id">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/">
    <dc:identifier id="id">urn:test</dc:identifier>
    <dc:title>Test</dc:title>
  </metadata>
  <manifest>
    {items}
  </manifest>
  <spine>
    {spine}
  </spine>
</package>
"#
    );

    let deflated = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut out = Cursor::new(Vec::new());
    let mut zip = ZipWriter::new(&mut out);
    zip.start_file("META-INF/container.xml", deflated).unwrap();
    zip.write_all(CONTAINER.as_bytes()).unwrap();
    zip.start_file("OPS/package.opf", deflated).unwrap();
    zip.write_all(opf.as_bytes()).unwrap();
    for (name, content) in files {
        zip.start_file(format!("OPS/{name}"), deflated).unwrap();
        zip.write_all(content.as_bytes()).unwrap();
    }
    zip.start_file("mimetype", deflated).unwrap();
    zip.write_all(b"application/epub+zip").unwrap();
    zip.finish().unwrap();
    out.into_inner()
}

fn xhtml(body: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<html xmlns="http://www.w3.org/1999/xhtml"><head><title>T</title></head><body>{body}</body></html>
"#
    )
}

fn read_entry(bytes: &[u8], name: &str) -> String {
    let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
    let mut entry = archive.by_name(name).unwrap();
    let mut out = String::new();
    entry.read_to_string(&mut out).unwrap();
    out
}

fn config() -> KepubConfig {
    KepubConfig::new().with_modified(DateTime::<Utc>::UNIX_EPOCH)
}

fn meta_content<'a>(opf: &'a Document, name: &str) -> Vec<&'a str> {
    opf.root
        .child("metadata")
        .unwrap()
        .elements()
        .filter(|e| e.attr("name") == Some(name))
        .filter_map(|e| e.attr("content"))
        .collect()
}

fn manifest_ids(opf: &Document) -> Vec<&str> {
    opf.root
        .child("manifest")
        .unwrap()
        .elements()
        .filter_map(|e| e.attr("id"))
        .collect()
}

fn count_spans(el: &Element) -> usize {
    el.elements()
        .map(|e| usize::from(e.attr("class") == Some("koboSpan")) + count_spans(e))
        .sum()
}

// ============================================================================
// Archive Layout
// ============================================================================

#[test]
fn test_mimetype_first_with_no_markup_documents() {
    let input = epub(
        r#"<item id="art" href="art.svg" media-type="image/svg+xml"/>"#,
        r#"<itemref idref="art"/>"#,
        &[("art.svg", "<svg xmlns=\"http://www.w3.org/2000/svg\"/>")],
    );
    let out = kepub::transform(&input, &config()).unwrap();

    assert!(has_stored_mimetype_first(&out).unwrap());
    assert_eq!(
        entry_names(&out).unwrap(),
        vec!["mimetype", "META-INF/container.xml", "OPS/art.svg", "OPS/package.opf"]
    );
    assert_eq!(read_entry(&out, "mimetype"), "application/epub+zip");
}

#[test]
fn test_mimetype_first_with_one_markup_document() {
    let input = epub(
        r#"<item id="c1" href="c1.xhtml" media-type="application/xhtml+xml"/>"#,
        r#"<itemref idref="c1"/>"#,
        &[("c1.xhtml", &xhtml("<p>One</p>"))],
    );
    let out = kepub::transform(&input, &config()).unwrap();
    assert!(has_stored_mimetype_first(&out).unwrap());

    let doc = Document::parse(read_entry(&out, "OPS/c1.xhtml").as_bytes()).unwrap();
    assert_eq!(count_spans(&doc.root), 1);
    assert_eq!(doc.root.attr("xmlns:kobo"), Some(KOBO_NS));
}

#[test]
fn test_nested_markup_documents_are_all_rewritten() {
    let files: Vec<(String, String)> = (1..=5)
        .map(|i| {
            (
                format!("text/part{}/c{i}.xhtml", i % 2),
                xhtml(&format!("<h2>Heading {i}</h2><p>Body {i}</p>")),
            )
        })
        .collect();
    let borrowed: Vec<(&str, &str)> = files
        .iter()
        .map(|(n, c)| (n.as_str(), c.as_str()))
        .collect();
    let items: String = files
        .iter()
        .enumerate()
        .map(|(i, (n, _))| {
            format!(r#"<item id="c{i}" href="{n}" media-type="application/xhtml+xml"/>"#)
        })
        .collect();
    let spine: String = (0..files.len())
        .map(|i| format!(r#"<itemref idref="c{i}"/>"#))
        .collect();

    let out = kepub::transform(&epub(&items, &spine, &borrowed), &config()).unwrap();

    assert!(has_stored_mimetype_first(&out).unwrap());
    let names = entry_names(&out).unwrap();
    let mut sorted = names[1..].to_vec();
    sorted.sort();
    assert_eq!(names[1..], sorted[..]);

    for (name, _) in &files {
        let doc = Document::parse(read_entry(&out, &format!("OPS/{name}")).as_bytes()).unwrap();
        assert_eq!(count_spans(&doc.root), 2, "{name}");
    }
}

// ============================================================================
// Metadata
// ============================================================================

#[test]
fn test_series_title_is_escaped() {
    let input = epub(
        r#"<item id="c1" href="c1.xhtml" media-type="application/xhtml+xml"/>"#,
        r#"<itemref idref="c1"/>"#,
        &[("c1.xhtml", &xhtml("<p>x</p>"))],
    );
    let title = r#"Tom & Jerry's <"Best">"#;
    let out = kepub::transform(&input, &config().with_series(title, Some(4.5))).unwrap();

    let opf = Document::parse(read_entry(&out, "OPS/package.opf").as_bytes()).unwrap();
    assert_eq!(meta_content(&opf, "calibre:series"), vec![title]);
    assert_eq!(meta_content(&opf, "calibre:series_index"), vec!["4.5"]);
}

#[test]
fn test_transform_is_idempotent() {
    let input = epub(
        r#"<item id="c1" href="c1.xhtml" media-type="application/xhtml+xml"/><item id="pic" href="images/cover.jpg" media-type="image/jpeg"/>"#,
        r#"<itemref idref="c1"/>"#,
        &[
            ("c1.xhtml", &xhtml(r#"<p>Text &amp; more</p><img src="images/cover.jpg"/>"#)),
            ("images/cover.jpg", "jpeg"),
        ],
    );
    let config = config().with_series("Series", None);

    let once = kepub::transform(&input, &config).unwrap();
    let twice = kepub::transform(&once, &config).unwrap();
    assert_eq!(once, twice);

    let opf = Document::parse(read_entry(&once, "OPS/package.opf").as_bytes()).unwrap();
    assert_eq!(meta_content(&opf, "book-type"), vec!["comic"]);
    assert_eq!(meta_content(&opf, "calibre:series_index"), vec!["1.0"]);
}

#[test]
fn test_series_removed_when_not_requested() {
    let input = epub(
        r#"<item id="c1" href="c1.xhtml" media-type="application/xhtml+xml"/>"#,
        r#"<itemref idref="c1"/>"#,
        &[("c1.xhtml", &xhtml("<p>x</p>"))],
    );
    let with_series = kepub::transform(&input, &config().with_series("S", Some(2.0))).unwrap();
    let without = kepub::transform(&with_series, &config()).unwrap();

    let opf = Document::parse(read_entry(&without, "OPS/package.opf").as_bytes()).unwrap();
    assert!(meta_content(&opf, "calibre:series").is_empty());
    assert!(meta_content(&opf, "calibre:series_index").is_empty());
}

#[test]
fn test_cover_is_promoted_by_path() {
    let input = epub(
        r#"<item id="c1" href="c1.xhtml" media-type="application/xhtml+xml"/><item id="p1" href="img/p1.jpg" media-type="image/jpeg"/><item id="front" href="img/front-cover.jpg" media-type="image/jpeg"/>"#,
        r#"<itemref idref="c1"/>"#,
        &[
            ("c1.xhtml", &xhtml("<p>x</p>")),
            ("img/p1.jpg", "a"),
            ("img/front-cover.jpg", "b"),
        ],
    );
    let out = kepub::transform(&input, &config()).unwrap();

    let opf = Document::parse(read_entry(&out, "OPS/package.opf").as_bytes()).unwrap();
    assert_eq!(manifest_ids(&opf), vec!["cover", "c1", "p1"]);
    let cover = opf.root.child("manifest").unwrap().child("item").unwrap();
    assert_eq!(cover.attr("href"), Some("img/front-cover.jpg"));
    assert_eq!(cover.attr("properties"), Some("cover-image"));
    assert_eq!(meta_content(&opf, "cover"), vec!["cover"]);
}

// ============================================================================
// Failure Handling
// ============================================================================

#[test]
fn test_malformed_document_is_left_alone() {
    let broken = "<html><body><p>never closed</body></html>";
    let input = epub(
        r#"<item id="a" href="a.xhtml" media-type="application/xhtml+xml"/><item id="b" href="b.xhtml" media-type="application/xhtml+xml"/>"#,
        r#"<itemref idref="a"/><itemref idref="b"/>"#,
        &[("a.xhtml", broken), ("b.xhtml", &xhtml("<p>fine</p>"))],
    );
    let out = kepub::transform(&input, &config()).unwrap();

    assert_eq!(read_entry(&out, "OPS/a.xhtml"), broken);
    assert!(read_entry(&out, "OPS/b.xhtml").contains("koboSpan"));
}

#[test]
fn test_empty_input_is_rejected() {
    assert!(matches!(
        kepub::transform(&[], &config()),
        Err(Error::EmptyPackage)
    ));
}

#[test]
fn test_empty_spine_is_rejected() {
    let input = epub(
        r#"<item id="c1" href="c1.xhtml" media-type="application/xhtml+xml"/>"#,
        "",
        &[("c1.xhtml", &xhtml("<p>x</p>"))],
    );
    assert!(matches!(
        kepub::transform(&input, &config()),
        Err(Error::NoContentSections)
    ));
}

#[test]
fn test_broken_package_document_is_fatal() {
    let mut out = Cursor::new(Vec::new());
    let mut zip = ZipWriter::new(&mut out);
    let options = SimpleFileOptions::default();
    zip.start_file("META-INF/container.xml", options).unwrap();
    zip.write_all(CONTAINER.as_bytes()).unwrap();
    zip.start_file("OPS/package.opf", options).unwrap();
    zip.write_all(b"<package><metadata></package>").unwrap();
    zip.finish().unwrap();

    assert!(kepub::transform(&out.into_inner(), &config()).is_err());
}

#[test]
fn test_missing_container_is_fatal() {
    let mut out = Cursor::new(Vec::new());
    let mut zip = ZipWriter::new(&mut out);
    zip.start_file("mimetype", SimpleFileOptions::default())
        .unwrap();
    zip.write_all(b"application/epub+zip").unwrap();
    zip.finish().unwrap();

    assert!(matches!(
        kepub::transform(&out.into_inner(), &config()),
        Err(Error::MissingDocument(_))
    ));
}

#[test]
fn test_transform_file_leaves_no_output_on_failure() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("in.epub");
    let output = dir.path().join("out.kepub.epub");
    fs::write(&input, b"not a zip").unwrap();

    assert!(kepub::transform_file(&input, &output, &config()).is_err());
    assert!(!output.exists());
    assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
}

// ============================================================================
// Built Packages
// ============================================================================

fn gray_png() -> Vec<u8> {
    let mut out = Cursor::new(Vec::new());
    DynamicImage::ImageLuma8(GrayImage::new(20, 30))
        .write_to(&mut out, ImageFormat::Png)
        .unwrap();
    out.into_inner()
}

#[test]
fn test_built_package_converts() {
    let scratch = TempDir::new().unwrap();
    let mut tree = DocumentTree::new();
    let volume = tree.add_volume("1");
    volume.with_cover(gray_png());
    volume.add_chapter("1").add_page(1, gray_png());

    let config = BuildConfig::default()
        .with_scratch_root(scratch.path())
        .with_direction(ReadingDirection::Rtl);
    let (package, _) = build(&tree, &config).unwrap();
    let out = kepub::transform_package(&package, &self::config()).unwrap();

    assert!(has_stored_mimetype_first(&out).unwrap());
    let chapter = read_entry(&out, "OEBPS/text/chapter-1-1.xhtml");
    assert!(chapter.contains(r#"kobo:type="image""#));
    assert!(chapter.contains("kobo-image"));

    let opf = Document::parse(read_entry(&out, "OEBPS/content.opf").as_bytes()).unwrap();
    assert_eq!(manifest_ids(&opf)[0], "cover");
    assert_eq!(meta_content(&opf, "primary-writing-mode"), vec!["horizontal-rl"]);
    assert_eq!(opf.root.attr("xmlns:kobo"), Some(KOBO_NS));
}

#[test]
fn test_transform_file_writes_output() {
    let scratch = TempDir::new().unwrap();
    let mut tree = DocumentTree::new();
    tree.add_volume("1").add_chapter("1").add_page(1, gray_png());
    let (package, _) = build(
        &tree,
        &BuildConfig::default().with_scratch_root(scratch.path()),
    )
    .unwrap();

    let dir = TempDir::new().unwrap();
    let input = dir.path().join("book.epub");
    let output = dir.path().join("book.kepub.epub");
    package.write_file(&input).unwrap();

    kepub::transform_file(&input, &output, &config()).unwrap();
    let bytes = fs::read(&output).unwrap();
    assert!(has_stored_mimetype_first(&bytes).unwrap());
}

#[test]
fn test_built_package_file_replaces_output_whole() {
    let scratch = TempDir::new().unwrap();
    let mut tree = DocumentTree::new();
    tree.add_volume("1").add_chapter("1").add_page(1, gray_png());
    let (package, _) = build(
        &tree,
        &BuildConfig::default().with_scratch_root(scratch.path()),
    )
    .unwrap();

    let dir = TempDir::new().unwrap();
    let output = dir.path().join("book.kepub.epub");
    fs::write(&output, b"stale").unwrap();
    kepub::transform_package_file(&package, &output, &config()).unwrap();
    let bytes = fs::read(&output).unwrap();
    assert!(has_stored_mimetype_first(&bytes).unwrap());
    assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);

    let missing = dir.path().join("missing").join("book.kepub.epub");
    assert!(kepub::transform_package_file(&package, &missing, &config()).is_err());
    assert!(!missing.exists());
    assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
}
