//! Navigation documents: the EPUB 3 `nav.xhtml` and the EPUB 2 `toc.ncx`.
//!
//! Both are generated from the same two-level volume/chapter outline, which
//! only ever contains chapters that made it into the package.

use crate::xml::escape_xml;

/// A volume entry in the table of contents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavVolume {
    pub label: String,
    pub chapters: Vec<NavChapter>,
}

/// A chapter entry; `href` is relative to the package document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavChapter {
    pub label: String,
    pub href: String,
}

impl NavVolume {
    /// Volumes link to their first chapter.
    fn href(&self) -> Option<&str> {
        self.chapters.first().map(|c| c.href.as_str())
    }
}

/// Generate nav.xhtml.
pub(crate) fn nav_document(title: &str, language: &str, volumes: &[NavVolume]) -> String {
    let mut doc = String::new();

    doc.push_str(&format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE html>
<html xmlns="http://www.w3.org/1999/xhtml" xmlns:epub="http://www.idpf.org/2007/ops" xml:lang="{lang}" lang="{lang}">
<head>
  <title>{title}</title>
</head>
<body>
  <nav epub:type="toc" id="toc">
    <h1>{title}</h1>
    <ol>
"#,
        lang = escape_xml(language),
        title = escape_xml(title),
    ));

    for volume in volumes {
        let Some(href) = volume.href() else {
            continue;
        };
        doc.push_str(&format!(
            "      <li>\n        <a href=\"{}\">{}</a>\n        <ol>\n",
            escape_xml(href),
            escape_xml(&volume.label)
        ));
        for chapter in &volume.chapters {
            doc.push_str(&format!(
                "          <li><a href=\"{}\">{}</a></li>\n",
                escape_xml(&chapter.href),
                escape_xml(&chapter.label)
            ));
        }
        doc.push_str("        </ol>\n      </li>\n");
    }

    doc.push_str("    </ol>\n  </nav>\n</body>\n</html>\n");
    doc
}

/// Generate toc.ncx.
pub(crate) fn ncx_document(identifier: &str, title: &str, volumes: &[NavVolume]) -> String {
    let mut ncx = String::new();

    ncx.push_str(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE ncx PUBLIC "-//NISO//DTD ncx 2005-1//EN" "http://www.daisy.org/z3986/2005/ncx-2005-1.dtd">
<ncx xmlns="http://www.daisy.org/z3986/2005/ncx/" version="2005-1">
  <head>
    <meta name="dtb:uid" content=""#,
    );
    ncx.push_str(&escape_xml(identifier));
    ncx.push_str(
        r#""/>
    <meta name="dtb:depth" content="2"/>
    <meta name="dtb:totalPageCount" content="0"/>
    <meta name="dtb:maxPageNumber" content="0"/>
  </head>
  <docTitle>
    <text>"#,
    );
    ncx.push_str(&escape_xml(title));
    ncx.push_str(
        r#"</text>
  </docTitle>
  <navMap>
"#,
    );

    let mut play_order = 1;
    for volume in volumes {
        let Some(href) = volume.href() else {
            continue;
        };
        open_nav_point(&mut ncx, &volume.label, href, &mut play_order, 2);
        for chapter in &volume.chapters {
            open_nav_point(&mut ncx, &chapter.label, &chapter.href, &mut play_order, 3);
            ncx.push_str("      </navPoint>\n");
        }
        ncx.push_str("    </navPoint>\n");
    }

    ncx.push_str("  </navMap>\n</ncx>\n");
    ncx
}

/// Write the opening of a navPoint; the caller closes it.
fn open_nav_point(ncx: &mut String, label: &str, href: &str, play_order: &mut usize, indent: usize) {
    let indent_str = "  ".repeat(indent);

    ncx.push_str(&format!(
        "{}<navPoint id=\"navPoint-{}\" playOrder=\"{}\">\n",
        indent_str, play_order, play_order
    ));
    ncx.push_str(&format!(
        "{}  <navLabel><text>{}</text></navLabel>\n",
        indent_str,
        escape_xml(label)
    ));
    ncx.push_str(&format!(
        "{}  <content src=\"{}\"/>\n",
        indent_str,
        escape_xml(href)
    ));

    *play_order += 1;
}
