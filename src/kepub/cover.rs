//! Cover promotion: make the cover image the first manifest item, with the
//! canonical id, the `cover-image` property and a matching `meta` pointer.

use tracing::debug;

use crate::error::{Error, Result};
use crate::xml::{Element, Node};

/// Canonical manifest id of the cover image.
pub const COVER_ID: &str = "cover";

const COVER_PROPERTY: &str = "cover-image";

/// Locate the cover image and promote it. Returns the id the cover had
/// before promotion, or `None` when the manifest holds no image at all.
pub fn promote_cover(package: &mut Element) -> Result<Option<String>> {
    let pointer = package
        .child("metadata")
        .and_then(|m| {
            m.elements()
                .find(|e| e.local_name() == "meta" && e.attr("name") == Some("cover"))
        })
        .and_then(|e| e.attr("content"))
        .map(str::to_string);

    let manifest = package
        .child_mut("manifest")
        .ok_or_else(|| Error::MissingDocument("manifest element".to_string()))?;

    let Some(index) = find_cover(manifest, pointer.as_deref()) else {
        return Ok(None);
    };
    let Node::Element(mut cover) = manifest.children.remove(index) else {
        return Ok(None);
    };
    let original = cover.attr("id").unwrap_or_default().to_string();

    let mut renames = Vec::new();
    if original != COVER_ID {
        // Another item already owns the canonical id; give it a fresh one.
        let fresh = free_id(&original, manifest);
        if let Some(taken) = items_mut(manifest).find(|e| e.attr("id") == Some(COVER_ID)) {
            taken.set_attr("id", fresh.as_str());
            renames.push((COVER_ID.to_string(), fresh));
        }
        renames.push((original.clone(), COVER_ID.to_string()));
        cover.set_attr("id", COVER_ID);
    }

    for item in items_mut(manifest) {
        remove_property(item, COVER_PROPERTY);
    }
    add_property(&mut cover, COVER_PROPERTY);
    manifest.children.insert(0, Node::Element(cover));

    if let Some(spine) = package.child_mut("spine") {
        for itemref in spine.elements_mut().filter(|e| e.local_name() == "itemref") {
            let Some(idref) = itemref.attr("idref") else {
                continue;
            };
            if let Some((_, to)) = renames.iter().find(|(from, _)| from == idref) {
                let to = to.clone();
                itemref.set_attr("idref", to);
            }
        }
    }

    if let Some(metadata) = package.child_mut("metadata") {
        let mut kept = false;
        metadata.remove_elements(|e| {
            if e.local_name() != "meta" || e.attr("name") != Some("cover") {
                return false;
            }
            let duplicate = kept;
            kept = true;
            duplicate
        });
        if let Some(meta) = metadata
            .elements_mut()
            .find(|e| e.local_name() == "meta" && e.attr("name") == Some("cover"))
        {
            meta.set_attr("content", COVER_ID);
        } else {
            metadata.push(
                Element::new("meta")
                    .with_attr("name", "cover")
                    .with_attr("content", COVER_ID),
            );
        }
    }

    debug!(from = %original, "promoted cover image");
    Ok(Some(original))
}

/// Index into `manifest.children` of the cover item, by priority:
/// flagged item, canonical id, cover-looking path, metadata pointer, first
/// image. Only image items are candidates.
fn find_cover(manifest: &Element, pointer: Option<&str>) -> Option<usize> {
    let images: Vec<(usize, &Element)> = manifest
        .children
        .iter()
        .enumerate()
        .filter_map(|(i, n)| match n {
            Node::Element(e) if e.local_name() == "item" && is_image(e) => Some((i, e)),
            _ => None,
        })
        .collect();

    let checks: [&dyn Fn(&Element) -> bool; 5] = [
        &|e: &Element| has_property(e, COVER_PROPERTY),
        &|e: &Element| e.attr("id") == Some(COVER_ID),
        &|e: &Element| {
            e.attr("href")
                .is_some_and(|h| h.to_ascii_lowercase().contains("cover"))
        },
        &|e: &Element| pointer.is_some() && e.attr("id") == pointer,
        &|_: &Element| true,
    ];

    checks
        .iter()
        .find_map(|check| images.iter().find(|(_, e)| check(e)).map(|(i, _)| *i))
}

fn items_mut(manifest: &mut Element) -> impl Iterator<Item = &mut Element> {
    manifest
        .elements_mut()
        .filter(|e| e.local_name() == "item")
}

/// First `cover-{n}` not used by any item nor by `reserved`.
fn free_id(reserved: &str, manifest: &Element) -> String {
    let taken = |id: &str| {
        id == reserved
            || manifest
                .elements()
                .any(|e| e.local_name() == "item" && e.attr("id") == Some(id))
    };
    let mut n = 1;
    loop {
        let candidate = format!("{COVER_ID}-{n}");
        if !taken(&candidate) {
            return candidate;
        }
        n += 1;
    }
}

fn is_image(item: &Element) -> bool {
    item.attr("media-type")
        .is_some_and(|t| t.starts_with("image/"))
}

fn has_property(item: &Element, property: &str) -> bool {
    item.attr("properties")
        .is_some_and(|p| p.split_whitespace().any(|t| t == property))
}

fn add_property(item: &mut Element, property: &str) {
    if has_property(item, property) {
        return;
    }
    let value = match item.attr("properties") {
        Some(existing) if !existing.trim().is_empty() => format!("{} {property}", existing.trim()),
        _ => property.to_string(),
    };
    item.set_attr("properties", value);
}

fn remove_property(item: &mut Element, property: &str) {
    if !has_property(item, property) {
        return;
    }
    let rest: Vec<String> = item
        .attr("properties")
        .unwrap_or_default()
        .split_whitespace()
        .filter(|t| *t != property)
        .map(str::to_string)
        .collect();
    if rest.is_empty() {
        item.remove_attr("properties");
    } else {
        item.set_attr("properties", rest.join(" "));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xml::Document;

    fn package(manifest: &str, metadata: &str) -> Element {
        let xml = format!(
            r#"<package><metadata>{metadata}</metadata><manifest>{manifest}</manifest><spine><itemref idref="p1"/><itemref idref="cover"/></spine></package>"#
        );
        Document::parse(xml.as_bytes()).unwrap().root
    }

    fn ids(package: &Element) -> Vec<&str> {
        package
            .child("manifest")
            .unwrap()
            .elements()
            .filter_map(|e| e.attr("id"))
            .collect()
    }

    fn cover_pointer(package: &Element) -> Vec<&str> {
        package
            .child("metadata")
            .unwrap()
            .elements()
            .filter(|e| e.attr("name") == Some("cover"))
            .filter_map(|e| e.attr("content"))
            .collect()
    }

    const TEXT: &str = r#"<item id="p1" href="text/p1.xhtml" media-type="application/xhtml+xml"/>"#;

    #[test]
    fn test_flagged_item_wins() {
        let mut pkg = package(
            &format!(
                r#"{TEXT}<item id="a" href="images/cover.jpg" media-type="image/jpeg"/><item id="b" href="images/b.jpg" media-type="image/jpeg" properties="cover-image"/>"#
            ),
            "",
        );
        assert_eq!(promote_cover(&mut pkg).unwrap().as_deref(), Some("b"));
        assert_eq!(ids(&pkg), vec!["cover", "p1", "a"]);
        let first = pkg.child("manifest").unwrap().child("item").unwrap();
        assert_eq!(first.attr("href"), Some("images/b.jpg"));
        assert_eq!(first.attr("properties"), Some("cover-image"));
        assert_eq!(cover_pointer(&pkg), vec!["cover"]);
    }

    #[test]
    fn test_priority_order() {
        // Path beats metadata pointer and first image.
        let mut pkg = package(
            &format!(
                r#"{TEXT}<item id="x" href="images/1.jpg" media-type="image/jpeg"/><item id="y" href="images/Cover.png" media-type="image/png"/><item id="z" href="images/2.jpg" media-type="image/jpeg"/>"#
            ),
            r#"<meta name="cover" content="z"/>"#,
        );
        assert_eq!(promote_cover(&mut pkg).unwrap().as_deref(), Some("y"));

        // Pointer beats first image.
        let mut pkg = package(
            &format!(
                r#"{TEXT}<item id="x" href="images/1.jpg" media-type="image/jpeg"/><item id="z" href="images/2.jpg" media-type="image/jpeg"/>"#
            ),
            r#"<meta name="cover" content="z"/>"#,
        );
        assert_eq!(promote_cover(&mut pkg).unwrap().as_deref(), Some("z"));
        assert_eq!(cover_pointer(&pkg), vec!["cover"]);

        // First image as a last resort.
        let mut pkg = package(
            &format!(r#"{TEXT}<item id="x" href="images/1.jpg" media-type="image/jpeg"/>"#),
            "",
        );
        assert_eq!(promote_cover(&mut pkg).unwrap().as_deref(), Some("x"));
    }

    #[test]
    fn test_conflicting_cover_id_is_renamed() {
        let mut pkg = package(
            &format!(
                r#"{TEXT}<item id="cover" href="text/cover.xhtml" media-type="application/xhtml+xml"/><item id="img" href="images/front.jpg" media-type="image/jpeg" properties="cover-image"/>"#
            ),
            "",
        );
        promote_cover(&mut pkg).unwrap();
        assert_eq!(ids(&pkg), vec!["cover", "p1", "cover-1"]);

        let spine: Vec<_> = pkg
            .child("spine")
            .unwrap()
            .elements()
            .filter_map(|e| e.attr("idref"))
            .collect();
        assert_eq!(spine, vec!["p1", "cover-1"]);
    }

    #[test]
    fn test_cover_page_markup_is_never_promoted() {
        let mut pkg = package(
            &format!(
                r#"{TEXT}<item id="cover" href="text/cover.xhtml" media-type="application/xhtml+xml" properties="cover-image"/><item id="front" href="images/front.jpg" media-type="image/jpeg"/>"#
            ),
            r#"<meta name="cover" content="front"/>"#,
        );
        assert_eq!(promote_cover(&mut pkg).unwrap().as_deref(), Some("front"));
        assert_eq!(ids(&pkg), vec!["cover", "p1", "cover-1"]);

        let manifest = pkg.child("manifest").unwrap();
        let items: Vec<_> = manifest.elements().collect();
        assert_eq!(items[0].attr("href"), Some("images/front.jpg"));
        assert_eq!(items[0].attr("properties"), Some("cover-image"));
        assert_eq!(items[2].attr("href"), Some("text/cover.xhtml"));
        assert_eq!(items[2].attr("properties"), None);
        assert_eq!(cover_pointer(&pkg), vec!["cover"]);
    }

    #[test]
    fn test_no_images_is_not_an_error() {
        let mut pkg = package(TEXT, "");
        assert_eq!(promote_cover(&mut pkg).unwrap(), None);
        assert_eq!(ids(&pkg), vec!["p1"]);
    }

    #[test]
    fn test_promotion_is_stable() {
        let mut pkg = package(
            &format!(r#"{TEXT}<item id="x" href="images/1.jpg" media-type="image/jpeg"/>"#),
            "",
        );
        promote_cover(&mut pkg).unwrap();
        let once = pkg.clone();
        promote_cover(&mut pkg).unwrap();
        assert_eq!(pkg, once);
    }
}
