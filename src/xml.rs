//! A small owned XML element tree for package documents.
//!
//! Package metadata is edited structurally: parse once into [`Document`],
//! mutate elements, then serialize once. Text and attribute values are
//! stored unescaped and escaped again on output, so user-supplied strings
//! can never break the markup.

use std::io::Write;

use quick_xml::Reader;
use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};

use crate::error::{Error, Result};

/// A parsed XML document.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    /// Raw DOCTYPE content, if any.
    pub doctype: Option<String>,
    pub root: Element,
}

/// An element with its attributes and children in document order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Element {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<Node>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Element(Element),
    Text(String),
    /// An entity reference that is not one of the predefined XML entities.
    Reference(String),
    Comment(String),
}

impl Document {
    /// Parse a document, keeping whitespace text as-is.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let mut reader = Reader::from_reader(strip_bom(bytes));
        reader.config_mut().expand_empty_elements = false;

        let mut doctype = None;
        let mut stack: Vec<Element> = Vec::new();
        let mut root = None;

        loop {
            match reader.read_event()? {
                Event::Start(e) => stack.push(element_from_start(&e)?),
                Event::Empty(e) => {
                    let element = element_from_start(&e)?;
                    match stack.last_mut() {
                        Some(parent) => parent.children.push(Node::Element(element)),
                        None => root = Some(element),
                    }
                }
                Event::End(_) => {
                    let element = stack.pop().ok_or_else(|| {
                        Error::InvalidXml("unbalanced end tag".to_string())
                    })?;
                    match stack.last_mut() {
                        Some(parent) => parent.children.push(Node::Element(element)),
                        None => root = Some(element),
                    }
                }
                Event::Text(e) => {
                    if let Some(parent) = stack.last_mut() {
                        push_text(parent, &String::from_utf8_lossy(e.as_ref()));
                    }
                }
                Event::CData(e) => {
                    if let Some(parent) = stack.last_mut() {
                        push_text(parent, &String::from_utf8_lossy(e.as_ref()));
                    }
                }
                Event::GeneralRef(e) => {
                    if let Some(parent) = stack.last_mut() {
                        let entity = String::from_utf8_lossy(e.as_ref());
                        match resolve_entity(&entity) {
                            Some(resolved) => push_text(parent, &resolved),
                            None => parent.children.push(Node::Reference(entity.into_owned())),
                        }
                    }
                }
                Event::Comment(e) => {
                    if let Some(parent) = stack.last_mut() {
                        parent
                            .children
                            .push(Node::Comment(String::from_utf8_lossy(e.as_ref()).into_owned()));
                    }
                }
                Event::DocType(e) => {
                    doctype = Some(String::from_utf8_lossy(e.as_ref()).trim().to_string());
                }
                Event::Eof => break,
                _ => {}
            }
        }

        if !stack.is_empty() {
            return Err(Error::InvalidXml("unclosed root element".to_string()));
        }
        let root = root.ok_or_else(|| Error::InvalidXml("no root element".to_string()))?;
        Ok(Self { doctype, root })
    }

    /// Wrap a root element into a document.
    pub fn new(root: Element) -> Self {
        Self {
            doctype: None,
            root,
        }
    }

    /// Serialize without adding any formatting whitespace.
    pub fn to_xml(&self) -> Result<String> {
        self.serialize(Writer::new(Vec::new()))
    }

    /// Serialize with two-space indentation. Intended for freshly built trees
    /// that carry no whitespace text of their own.
    pub fn to_xml_pretty(&self) -> Result<String> {
        self.serialize(Writer::new_with_indent(Vec::new(), b' ', 2))
    }

    fn serialize(&self, mut writer: Writer<Vec<u8>>) -> Result<String> {
        writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
        if let Some(ref doctype) = self.doctype {
            writer.write_event(Event::DocType(BytesText::from_escaped(format!(
                " {doctype}"
            ))))?;
        }
        write_element(&mut writer, &self.root)?;
        let mut bytes = writer.into_inner();
        bytes.push(b'\n');
        Ok(String::from_utf8(bytes)?)
    }
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Builder-style attribute setter.
    pub fn with_attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_attr(name, value);
        self
    }

    /// Builder-style text child.
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.children.push(Node::Text(text.into()));
        self
    }

    /// Builder-style element child.
    pub fn with_child(mut self, child: Element) -> Self {
        self.children.push(Node::Element(child));
        self
    }

    /// Name without namespace prefix (`dc:title` -> `title`).
    pub fn local_name(&self) -> &str {
        local_name(&self.name)
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Set an attribute, replacing an existing value in place.
    pub fn set_attr(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.attributes.iter_mut().find(|(k, _)| *k == name) {
            Some(slot) => slot.1 = value,
            None => self.attributes.push((name, value)),
        }
    }

    pub fn remove_attr(&mut self, name: &str) -> Option<String> {
        let idx = self.attributes.iter().position(|(k, _)| k == name)?;
        Some(self.attributes.remove(idx).1)
    }

    pub fn push(&mut self, child: Element) {
        self.children.push(Node::Element(child));
    }

    /// Concatenated text of direct text children.
    pub fn text(&self) -> String {
        self.children
            .iter()
            .filter_map(|n| match n {
                Node::Text(t) => Some(t.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|n| match n {
            Node::Element(e) => Some(e),
            _ => None,
        })
    }

    pub fn elements_mut(&mut self) -> impl Iterator<Item = &mut Element> {
        self.children.iter_mut().filter_map(|n| match n {
            Node::Element(e) => Some(e),
            _ => None,
        })
    }

    /// First direct child element with the given local name.
    pub fn child(&self, local: &str) -> Option<&Element> {
        self.elements().find(|e| e.local_name() == local)
    }

    pub fn child_mut(&mut self, local: &str) -> Option<&mut Element> {
        self.elements_mut().find(|e| e.local_name() == local)
    }

    /// Depth-first search for the first descendant with the given local name.
    pub fn find(&self, local: &str) -> Option<&Element> {
        self.elements().find_map(|e| {
            if e.local_name() == local {
                Some(e)
            } else {
                e.find(local)
            }
        })
    }

    /// Remove every direct child element matching `pred`, returning how many went.
    pub fn remove_elements(&mut self, mut pred: impl FnMut(&Element) -> bool) -> usize {
        let before = self.children.len();
        self.children
            .retain(|n| !matches!(n, Node::Element(e) if pred(e)));
        before - self.children.len()
    }
}

fn push_text(parent: &mut Element, text: &str) {
    if let Some(Node::Text(last)) = parent.children.last_mut() {
        last.push_str(text);
    } else {
        parent.children.push(Node::Text(text.to_string()));
    }
}

fn element_from_start(e: &BytesStart<'_>) -> Result<Element> {
    let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
    let mut attributes = Vec::new();
    for attr in e.attributes() {
        let attr = attr.map_err(quick_xml::Error::from)?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let raw = String::from_utf8_lossy(&attr.value);
        let value = quick_xml::escape::unescape(&raw)
            .map(|v| v.into_owned())
            .unwrap_or_else(|_| raw.into_owned());
        attributes.push((key, value));
    }
    Ok(Element {
        name,
        attributes,
        children: Vec::new(),
    })
}

fn write_element<W: Write>(writer: &mut Writer<W>, element: &Element) -> Result<()> {
    let mut start = BytesStart::new(element.name.as_str());
    for (key, value) in &element.attributes {
        start.push_attribute((key.as_str(), value.as_str()));
    }

    if element.children.is_empty() {
        writer.write_event(Event::Empty(start))?;
        return Ok(());
    }

    writer.write_event(Event::Start(start))?;
    for child in &element.children {
        match child {
            Node::Element(e) => write_element(writer, e)?,
            Node::Text(t) => writer.write_event(Event::Text(BytesText::new(t)))?,
            Node::Reference(name) => {
                writer.write_event(Event::Text(BytesText::from_escaped(format!("&{name};"))))?
            }
            Node::Comment(c) => writer.write_event(Event::Comment(BytesText::from_escaped(
                c.as_str(),
            )))?,
        }
    }
    writer.write_event(Event::End(BytesEnd::new(element.name.as_str())))?;
    Ok(())
}

/// Find the package document path in `META-INF/container.xml`.
pub fn rootfile_path(container_xml: &[u8]) -> Result<String> {
    let doc = Document::parse(container_xml)?;
    doc.root
        .find("rootfile")
        .and_then(|e| e.attr("full-path"))
        .map(str::to_string)
        .ok_or_else(|| Error::MissingDocument("rootfile in container.xml".to_string()))
}

/// Escape XML special characters for templated markup.
pub fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

pub(crate) fn strip_bom(data: &[u8]) -> &[u8] {
    data.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(data)
}

/// Extract local name from namespaced XML name (e.g., "dc:title" -> "title").
pub(crate) fn local_name(name: &str) -> &str {
    name.rsplit_once(':').map(|(_, l)| l).unwrap_or(name)
}

/// Resolve predefined and numeric entity references.
fn resolve_entity(entity: &str) -> Option<String> {
    match entity {
        "apos" => return Some("'".to_string()),
        "quot" => return Some("\"".to_string()),
        "lt" => return Some("<".to_string()),
        "gt" => return Some(">".to_string()),
        "amp" => return Some("&".to_string()),
        _ => {}
    }

    let code = if let Some(hex) = entity.strip_prefix("#x") {
        u32::from_str_radix(hex, 16).ok()
    } else if let Some(dec) = entity.strip_prefix('#') {
        dec.parse::<u32>().ok()
    } else {
        None
    };
    code.and_then(char::from_u32).map(String::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    const OPF: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<package xmlns="http://www.idpf.org/2007/opf" version="3.0">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/">
    <dc:title>Tom &amp; Jerry &#x2605; &custom;</dc:title>
    <!-- keep me -->
  </metadata>
  <manifest>
    <item id="a" href="a&amp;b.xhtml" media-type="application/xhtml+xml"/>
  </manifest>
</package>
"#;

    #[test]
    fn test_parse_unescapes_text_and_attributes() {
        let doc = Document::parse(OPF.as_bytes()).unwrap();
        let title = doc.root.find("title").unwrap();
        assert_eq!(title.text(), "Tom & Jerry \u{2605} ");
        let item = doc.root.find("item").unwrap();
        assert_eq!(item.attr("href"), Some("a&b.xhtml"));
    }

    #[test]
    fn test_reserialize_is_stable() {
        let doc = Document::parse(OPF.as_bytes()).unwrap();
        let once = doc.to_xml().unwrap();
        let twice = Document::parse(once.as_bytes()).unwrap().to_xml().unwrap();
        assert_eq!(once, twice);
        assert!(once.contains("&custom;"));
        assert!(once.contains("<!-- keep me -->"));
        assert!(once.contains("Tom &amp; Jerry"));
    }

    #[test]
    fn test_escaping_round_trip() {
        let nasty = r#"<b>"Fish" & 'Chips'</b>"#;
        let root = Element::new("meta")
            .with_attr("content", nasty)
            .with_text(nasty);
        let xml = Document::new(root).to_xml().unwrap();
        assert!(!xml.contains("<b>"));

        let parsed = Document::parse(xml.as_bytes()).unwrap();
        assert_eq!(parsed.root.attr("content"), Some(nasty));
        assert_eq!(parsed.root.text(), nasty);
    }

    #[test]
    fn test_set_attr_replaces() {
        let mut el = Element::new("item").with_attr("id", "x");
        el.set_attr("id", "y");
        assert_eq!(el.attributes, vec![("id".to_string(), "y".to_string())]);
        assert_eq!(el.remove_attr("id").as_deref(), Some("y"));
        assert!(el.attributes.is_empty());
    }

    #[test]
    fn test_rootfile_path() {
        let container = br#"<?xml version="1.0"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
  <rootfiles>
    <rootfile full-path="OEBPS/content.opf" media-type="application/oebps-package+xml"/>
  </rootfiles>
</container>"#;
        assert_eq!(rootfile_path(container).unwrap(), "OEBPS/content.opf");
        assert!(rootfile_path(b"<container/>").is_err());
    }

    #[test]
    fn test_unbalanced_document_fails() {
        assert!(matches!(
            Document::parse(b"<package><metadata></package>"),
            Err(Error::InvalidXml(_) | Error::Xml(_))
        ));
        assert!(matches!(
            Document::parse(b"<package><metadata>"),
            Err(Error::InvalidXml(_) | Error::Xml(_))
        ));
        assert!(matches!(Document::parse(b""), Err(Error::InvalidXml(_))));
        assert!(matches!(
            Document::parse(b"<!-- only a comment -->"),
            Err(Error::InvalidXml(_))
        ));
    }

    #[test]
    fn test_escape_xml() {
        assert_eq!(escape_xml("Hello & World"), "Hello &amp; World");
        assert_eq!(escape_xml("<tag>"), "&lt;tag&gt;");
        assert_eq!(escape_xml("\"quoted\""), "&quot;quoted&quot;");
    }
}
