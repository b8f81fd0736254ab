//! Streaming rewrite of content documents for Kobo readers.
//!
//! Direct text inside block containers is wrapped in `koboSpan` spans and
//! images are tagged. Everything else is copied through event by event, so
//! the original escaping and layout of the document survive.

use std::borrow::Cow;
use std::collections::HashSet;

use quick_xml::escape::escape;
use quick_xml::events::attributes::Attribute;
use quick_xml::events::{BytesEnd, BytesStart, Event};
use quick_xml::name::QName;
use quick_xml::{Reader, Writer};

use crate::error::{Error, Result};
use crate::xml::strip_bom;

use super::{EPUB_NS, KOBO_NS};

/// Class given to every image.
pub const IMAGE_CLASS: &str = "kobo-image";

/// Class of the position-tracking spans.
pub const SPAN_CLASS: &str = "koboSpan";

/// Whether text directly inside this element gets wrapped.
fn is_container(local: &[u8]) -> bool {
    matches!(
        local,
        b"p" | b"div"
            | b"li"
            | b"h1"
            | b"h2"
            | b"h3"
            | b"h4"
            | b"h5"
            | b"h6"
            | b"blockquote"
            | b"figcaption"
            | b"td"
            | b"th"
            | b"dd"
            | b"dt"
    )
}

fn is_blank(text: &[u8]) -> bool {
    text.iter().all(u8::is_ascii_whitespace)
}

fn local_name(name: &[u8]) -> &[u8] {
    match name.iter().rposition(|&b| b == b':') {
        Some(i) => &name[i + 1..],
        None => name,
    }
}

/// Hands out ids that do not collide with any id already in the document.
struct IdAllocator {
    taken: HashSet<String>,
    paragraphs: usize,
    images: usize,
}

impl IdAllocator {
    fn new(taken: HashSet<String>) -> Self {
        Self {
            taken,
            paragraphs: 0,
            images: 0,
        }
    }

    fn paragraph(&mut self) -> usize {
        self.paragraphs += 1;
        self.paragraphs
    }

    fn span(&mut self, paragraph: usize, segment: &mut usize) -> String {
        loop {
            *segment += 1;
            let id = format!("kobo.{paragraph}.{segment}");
            if self.taken.insert(id.clone()) {
                return id;
            }
        }
    }

    fn image(&mut self) -> String {
        loop {
            self.images += 1;
            let id = format!("kobo-img-{}", self.images);
            if self.taken.insert(id.clone()) {
                return id;
            }
        }
    }
}

/// An open element on the rewrite stack.
struct Frame {
    container: bool,
    /// Paragraph number, assigned when the first span is emitted.
    paragraph: Option<usize>,
    segments: usize,
}

/// Raw attribute list: names and still-escaped values.
type RawAttributes = Vec<(Vec<u8>, Vec<u8>)>;

/// Rewrite one XHTML content document.
///
/// Fails on malformed markup; the caller decides whether that is fatal.
pub fn rewrite_markup(input: &[u8]) -> Result<Vec<u8>> {
    let input = strip_bom(input);
    let mut ids = IdAllocator::new(existing_ids(input)?);

    let mut reader = Reader::from_reader(input);
    reader.config_mut().expand_empty_elements = false;
    let mut writer = Writer::new(Vec::with_capacity(input.len() + input.len() / 4));

    let mut stack: Vec<Frame> = Vec::new();
    let mut seen_root = false;
    // Text events collected while directly inside a container.
    let mut run: Vec<Event<'_>> = Vec::new();
    let mut run_has_content = false;

    loop {
        let event = reader.read_event()?;

        let text = match event {
            Event::Text(ref e) => Some(!is_blank(e.as_ref())),
            Event::CData(ref e) => Some(!is_blank(e.as_ref())),
            Event::GeneralRef(_) => Some(true),
            _ => None,
        };
        if text.is_some() && stack.last().is_some_and(|f| f.container) {
            run_has_content |= text == Some(true);
            run.push(event);
            continue;
        }

        if !run.is_empty() {
            flush_run(&mut writer, &mut run, run_has_content, stack.last_mut(), &mut ids)?;
            run_has_content = false;
        }

        match event {
            Event::Start(e) => {
                let local = local_name(e.name().as_ref()).to_ascii_lowercase();
                let root = !seen_root;
                seen_root = true;
                let start = rewrite_start(&e, root, &local, &mut ids)?;
                stack.push(Frame {
                    container: is_container(&local),
                    paragraph: None,
                    segments: 0,
                });
                writer.write_event(Event::Start(start))?;
            }
            Event::Empty(e) => {
                let local = local_name(e.name().as_ref()).to_ascii_lowercase();
                let root = !seen_root;
                seen_root = true;
                let start = rewrite_start(&e, root, &local, &mut ids)?;
                writer.write_event(Event::Empty(start))?;
            }
            Event::End(e) => {
                stack.pop();
                writer.write_event(Event::End(e))?;
            }
            Event::Eof => break,
            other => writer.write_event(other)?,
        }
    }

    if !stack.is_empty() {
        return Err(Error::InvalidXml(format!(
            "{} unclosed element(s) at end of document",
            stack.len()
        )));
    }
    if !seen_root {
        return Err(Error::InvalidXml("no root element".to_string()));
    }
    Ok(writer.into_inner())
}

/// Every `id` attribute value already present in the document.
fn existing_ids(input: &[u8]) -> Result<HashSet<String>> {
    let mut reader = Reader::from_reader(input);
    let mut ids = HashSet::new();
    loop {
        match reader.read_event()? {
            Event::Start(e) | Event::Empty(e) => {
                for attr in e.attributes() {
                    let attr = attr.map_err(quick_xml::Error::from)?;
                    if attr.key.as_ref() == b"id" {
                        ids.insert(String::from_utf8_lossy(&attr.value).into_owned());
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(ids)
}

/// Write a collected text run, wrapped in a span when it has content.
fn flush_run<'a>(
    writer: &mut Writer<Vec<u8>>,
    run: &mut Vec<Event<'a>>,
    has_content: bool,
    frame: Option<&mut Frame>,
    ids: &mut IdAllocator,
) -> Result<()> {
    let span = match frame {
        Some(frame) if has_content => {
            let paragraph = *frame.paragraph.get_or_insert_with(|| ids.paragraph());
            let id = ids.span(paragraph, &mut frame.segments);
            let mut start = BytesStart::new("span");
            start.push_attribute(("class", SPAN_CLASS));
            start.push_attribute(("id", id.as_str()));
            Some(start)
        }
        _ => None,
    };

    let wrapped = span.is_some();
    if let Some(start) = span {
        writer.write_event(Event::Start(start))?;
    }
    for event in run.drain(..) {
        writer.write_event(event)?;
    }
    if wrapped {
        writer.write_event(Event::End(BytesEnd::new("span")))?;
    }
    Ok(())
}

/// Apply root namespace and image tagging to a start tag.
fn rewrite_start(
    e: &BytesStart<'_>,
    root: bool,
    local: &[u8],
    ids: &mut IdAllocator,
) -> Result<BytesStart<'static>> {
    let mut attrs: RawAttributes = Vec::new();
    for attr in e.attributes() {
        let attr = attr.map_err(quick_xml::Error::from)?;
        attrs.push((attr.key.as_ref().to_vec(), requote(&attr.value)));
    }

    if root {
        set_attr(&mut attrs, b"xmlns:kobo", KOBO_NS);
        set_attr(&mut attrs, b"xmlns:epub", EPUB_NS);
    }

    if local == b"img" {
        match attrs.iter_mut().find(|(k, _)| k == b"class") {
            Some((_, value)) => {
                let has_class = value
                    .split(u8::is_ascii_whitespace)
                    .any(|token| token == IMAGE_CLASS.as_bytes());
                if !has_class {
                    if !value.is_empty() {
                        value.push(b' ');
                    }
                    value.extend_from_slice(IMAGE_CLASS.as_bytes());
                }
            }
            None => attrs.push((b"class".to_vec(), IMAGE_CLASS.as_bytes().to_vec())),
        }
        if !attrs.iter().any(|(k, _)| k == b"kobo:type") {
            attrs.push((b"kobo:type".to_vec(), b"image".to_vec()));
        }
        if !attrs.iter().any(|(k, _)| k == b"id") {
            let id = ids.image();
            attrs.push((b"id".to_vec(), id.into_bytes()));
        }
    }

    let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
    let mut start = BytesStart::new(name);
    for (key, value) in &attrs {
        start.push_attribute(Attribute {
            key: QName(key),
            value: Cow::Borrowed(value.as_slice()),
        });
    }
    Ok(start)
}

/// Raw values are written back double-quoted, so a literal `"` from a
/// single-quoted attribute has to become a reference.
fn requote(raw: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(raw.len());
    for &b in raw {
        if b == b'"' {
            out.extend_from_slice(b"&quot;");
        } else {
            out.push(b);
        }
    }
    out
}

/// Replace an attribute's value in place, or append it.
fn set_attr(attrs: &mut RawAttributes, key: &[u8], value: &str) {
    let escaped = escape(value).into_owned().into_bytes();
    match attrs.iter_mut().find(|(k, _)| k == key) {
        Some((_, v)) => *v = escaped,
        None => attrs.push((key.to_vec(), escaped)),
    }
}
