//! Static files and chapter XHTML templates.

use crate::xml::escape_xml;

/// Container.xml template.
pub(crate) const CONTAINER_XML: &[u8] = br#"<?xml version="1.0" encoding="UTF-8"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
  <rootfiles>
    <rootfile full-path="OEBPS/content.opf" media-type="application/oebps-package+xml"/>
  </rootfiles>
</container>
"#;

/// Stylesheet shared by every chapter: one page image per screen.
pub(crate) const STYLESHEET: &str = r#"@page {
  margin: 0;
}
html, body {
  margin: 0;
  padding: 0;
}
div.page {
  text-align: center;
  page-break-after: always;
  break-after: page;
}
div.page img {
  max-width: 100%;
  max-height: 100%;
  height: auto;
}
"#;

/// One image reference inside a chapter document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct PageRef {
    /// Path relative to the chapter document.
    pub href: String,
    pub alt: String,
    pub width: u32,
    pub height: u32,
}

/// Generate the XHTML document for one chapter.
pub(crate) fn chapter_document(title: &str, language: &str, pages: &[PageRef]) -> String {
    let mut doc = String::new();

    doc.push_str(&format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE html>
<html xmlns="http://www.w3.org/1999/xhtml" xmlns:epub="http://www.idpf.org/2007/ops" xml:lang="{lang}" lang="{lang}">
<head>
  <title>{title}</title>
  <link rel="stylesheet" type="text/css" href="../style.css"/>
</head>
<body>
"#,
        lang = escape_xml(language),
        title = escape_xml(title),
    ));

    for page in pages {
        doc.push_str(&format!(
            "  <div class=\"page\"><img src=\"{}\" alt=\"{}\" width=\"{}\" height=\"{}\"/></div>\n",
            escape_xml(&page.href),
            escape_xml(&page.alt),
            page.width,
            page.height
        ));
    }

    doc.push_str("</body>\n</html>\n");
    doc
}
