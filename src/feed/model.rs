use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

use crate::geo::Geometry;

/// A parsed GeoRSS / Atom / RSS document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Feed {
    pub title: Option<String>,
    pub subtitle: Option<String>,
    pub link: Option<String>,
    pub rights: Option<String>,
    pub author: Option<String>,
    pub language: Option<String>,
    pub generator: Option<String>,
    pub published: Option<DateTime<Utc>>,
    pub updated: Option<DateTime<Utc>>,
    /// Suggested polling interval in minutes (RSS `ttl`)
    pub ttl: Option<u32>,
    /// Items in document order
    pub entries: Vec<FeedEntry>,
}

/// One raw `<item>` / `<entry>` record, before any feed-specific mapping.
///
/// Every field is optional; a factory turning this into a domain entry
/// must cope with any of them being absent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeedEntry {
    pub title: Option<String>,
    pub id: Option<String>,
    pub link: Option<String>,
    pub summary: Option<String>,
    pub content: Option<String>,
    pub author: Option<String>,
    pub categories: Vec<String>,
    pub published: Option<DateTime<Utc>>,
    pub updated: Option<DateTime<Utc>>,
    /// All geometries in document order
    pub geometries: Vec<Geometry>,
    /// Text of child elements not mapped above, keyed by normalised
    /// element name (e.g. `"geo:magnitude"`). First occurrence wins.
    pub extensions: BTreeMap<String, String>,
}

impl FeedEntry {
    /// Text of an unmapped child element.
    pub fn extension(&self, name: &str) -> Option<&str> {
        self.extensions.get(name).map(String::as_str)
    }
}

/// Feed-level data handed to every factory invocation of one update.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedMetadata {
    /// Source / author attribution, taken from the feed author.
    pub attribution: Option<String>,
}

impl FeedMetadata {
    pub fn from_feed(feed: &Feed) -> Self {
        Self {
            attribution: feed.author.clone().filter(|a| !a.is_empty()),
        }
    }
}
