//! Sortable volume and chapter identifiers.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

/// A volume or chapter key such as `"1"`, `"1.5"` or `"extra"`.
///
/// Numeric identifiers compare component-wise on their dotted parts, so
/// `"1" < "1.5" < "2" < "10"`. Identifiers that are not purely numeric sort
/// after every numeric one, in plain string order.
#[derive(Debug, Clone)]
pub struct Identifier {
    raw: String,
    parts: Option<Vec<u32>>,
}

impl Identifier {
    pub fn new(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        let parts = parse_parts(raw.trim());
        Self { raw, parts }
    }

    /// The identifier exactly as supplied.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Whether every dotted component parsed as a number.
    pub fn is_numeric(&self) -> bool {
        self.parts.is_some()
    }

    /// A form safe for archive paths and XML ids (`1.5` -> `1_5`).
    pub fn slug(&self) -> String {
        self.raw
            .trim()
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .collect()
    }
}

fn parse_parts(raw: &str) -> Option<Vec<u32>> {
    if raw.is_empty() {
        return None;
    }
    raw.split('.').map(|part| part.parse::<u32>().ok()).collect()
}

impl Ord for Identifier {
    fn cmp(&self, other: &Self) -> Ordering {
        match (&self.parts, &other.parts) {
            (Some(a), Some(b)) => a.cmp(b).then_with(|| self.raw.cmp(&other.raw)),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => self.raw.cmp(&other.raw),
        }
    }
}

impl PartialOrd for Identifier {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Identifier {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl Eq for Identifier {}

impl Hash for Identifier {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.raw.hash(state);
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl From<&str> for Identifier {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

impl From<String> for Identifier {
    fn from(raw: String) -> Self {
        Self::new(raw)
    }
}

impl From<u32> for Identifier {
    fn from(n: u32) -> Self {
        Self::new(n.to_string())
    }
}
