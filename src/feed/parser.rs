use chrono::{DateTime, Utc};
use quick_xml::encoding::Decoder;
use quick_xml::events::{BytesStart, Event};
use quick_xml::name::ResolveResult;
use quick_xml::reader::NsReader;
use std::collections::HashMap;
use thiserror::Error;

use crate::feed::model::{Feed, FeedEntry};
use crate::geo::{Coordinates, Geometry, Polygon};

/// SEC-003: Maximum element nesting depth.
/// Prevents resource exhaustion from maliciously deep documents.
const MAX_DEPTH: usize = 64;

/// Namespace URIs understood out of the box, with the prefix their
/// elements are normalised to. An empty prefix means "no prefix".
const DEFAULT_NAMESPACES: &[(&str, &str)] = &[
    ("http://www.w3.org/2005/Atom", ""),
    ("http://purl.org/rss/1.0/", ""),
    ("http://www.georss.org/georss", "georss"),
    ("http://www.opengis.net/gml", "gml"),
    ("http://www.w3.org/2003/01/geo/wgs84_pos#", "geo"),
    ("http://purl.org/dc/elements/1.1/", "dc"),
    ("http://purl.org/rss/1.0/modules/content/", "content"),
    ("http://www.w3.org/1999/02/22-rdf-syntax-ns#", "rdf"),
];

/// Document elements that mark a feed: RSS 2.0, Atom and RSS 1.0.
const FEED_ROOTS: &[&str] = &["rss", "feed", "rdf:RDF"];

/// Errors that can occur while parsing a feed document.
#[derive(Debug, Error)]
pub enum ParseError {
    /// The document is not well-formed XML.
    #[error("XML parse error: {0}")]
    Xml(String),

    /// SEC-003: Element nesting exceeds the safety limit.
    #[error("XML nesting depth exceeds maximum of {0} levels")]
    MaxDepthExceeded(usize),

    /// The document ended with elements still open.
    #[error("Unexpected end of document")]
    UnexpectedEof,
}

/// Namespace-aware GeoRSS / Atom / RSS parser.
///
/// Element names are normalised through a namespace table so that, for
/// example, `<where xmlns="http://www.georss.org/georss">` and
/// `<georss:where>` are both seen as `georss:where`. Feed types that carry
/// their own vocabulary register extra `(uri, prefix)` pairs.
#[derive(Debug, Clone)]
pub struct XmlParser {
    namespaces: HashMap<String, String>,
}

impl Default for XmlParser {
    fn default() -> Self {
        Self::new(&[])
    }
}

impl XmlParser {
    pub fn new(additional_namespaces: &[(&str, &str)]) -> Self {
        let namespaces = DEFAULT_NAMESPACES
            .iter()
            .chain(additional_namespaces)
            .map(|(uri, prefix)| (uri.to_string(), prefix.to_string()))
            .collect();
        Self { namespaces }
    }

    /// Parses a decoded feed document.
    ///
    /// Returns `Ok(None)` for a well-formed document that is not a feed
    /// (no elements, or an unrecognised document element).
    ///
    /// # Security
    ///
    /// SEC-002: quick-xml (0.37) never expands `<!ENTITY>` declarations; only
    /// the five XML builtins are resolved and any other entity reference is
    /// a parse error.
    pub fn parse(&self, text: &str) -> Result<Option<Feed>, ParseError> {
        // Text is kept untrimmed: a value split by CDATA or comments keeps
        // the whitespace between its pieces. Frames trim once on close.
        let mut reader = NsReader::from_str(text);
        let decoder = reader.decoder();

        let mut state = ParseState::default();
        let mut stack: Vec<Frame> = Vec::new();

        loop {
            // The resolved namespace borrows the reader, so names are
            // normalised before the next read.
            let (event, frame) = {
                let (resolved, event) = reader
                    .read_resolved_event()
                    .map_err(|e| ParseError::Xml(e.to_string()))?;
                let frame = match &event {
                    Event::Start(e) | Event::Empty(e) => {
                        Some(self.open_frame(&resolved, e, decoder)?)
                    }
                    _ => None,
                };
                (event, frame)
            };
            let in_markup = stack.iter().any(|f| f.is_xhtml);

            match (event, frame) {
                (Event::Start(_), Some(frame)) => {
                    if !in_markup && !state.enter(&frame, stack.len()) {
                        return Ok(None);
                    }
                    stack.push(frame);
                    if stack.len() > MAX_DEPTH {
                        return Err(ParseError::MaxDepthExceeded(MAX_DEPTH));
                    }
                }
                (Event::Empty(_), Some(frame)) => {
                    if in_markup {
                        continue;
                    }
                    if !state.enter(&frame, stack.len()) {
                        return Ok(None);
                    }
                    state.leave(frame, &stack);
                }
                (Event::End(_), _) => {
                    let Some(frame) = stack.pop() else { continue };
                    if stack.iter().any(|f| f.is_xhtml) {
                        // Markup inside an xhtml text construct: fold its
                        // text into the enclosing element
                        if let Some(parent) = stack.last_mut() {
                            parent.text.push_str(&frame.text);
                        }
                    } else {
                        state.leave(frame, &stack);
                    }
                }
                (Event::Text(t), _) => {
                    if let Some(frame) = stack.last_mut() {
                        let text = t.unescape().map_err(|e| ParseError::Xml(e.to_string()))?;
                        frame.text.push_str(&text);
                    }
                }
                (Event::CData(c), _) => {
                    if let Some(frame) = stack.last_mut() {
                        frame.text.push_str(&String::from_utf8_lossy(&c.into_inner()));
                    }
                }
                (Event::Eof, _) => break,
                _ => {}
            }
        }

        if !stack.is_empty() {
            return Err(ParseError::UnexpectedEof);
        }

        Ok(state.finish())
    }

    fn open_frame(
        &self,
        resolved: &ResolveResult<'_>,
        e: &BytesStart<'_>,
        decoder: Decoder,
    ) -> Result<Frame, ParseError> {
        let name = self.normalised_name(resolved, e.name().as_ref(), e.local_name().as_ref());

        let mut attributes = Vec::new();
        for attr_result in e.attributes() {
            let attr = match attr_result {
                Ok(attr) => attr,
                Err(err) => {
                    tracing::warn!(element = %name, error = %err, "Skipping malformed attribute");
                    continue;
                }
            };
            let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
            let value = attr
                .decode_and_unescape_value(decoder)
                .map_err(|err| ParseError::Xml(err.to_string()))?
                .into_owned();
            attributes.push((key, value));
        }

        let is_xhtml = matches!(
            name.as_str(),
            "title" | "subtitle" | "summary" | "content" | "rights"
        ) && attributes.iter().any(|(k, v)| k == "type" && v == "xhtml");

        Ok(Frame {
            name,
            attributes,
            text: String::new(),
            is_xhtml,
        })
    }

    fn normalised_name(&self, resolved: &ResolveResult<'_>, qname: &[u8], local: &[u8]) -> String {
        let local = String::from_utf8_lossy(local);
        match resolved {
            ResolveResult::Bound(ns) => {
                let uri = String::from_utf8_lossy(ns.as_ref());
                match self.namespaces.get(uri.as_ref()) {
                    Some(prefix) if prefix.is_empty() => local.into_owned(),
                    Some(prefix) => format!("{prefix}:{local}"),
                    None => String::from_utf8_lossy(qname).into_owned(),
                }
            }
            ResolveResult::Unbound => local.into_owned(),
            // Undeclared prefix: keep it as written
            ResolveResult::Unknown(_) => String::from_utf8_lossy(qname).into_owned(),
        }
    }
}

/// An open element: normalised name, attributes (by local name) and the
/// text accumulated so far.
#[derive(Debug)]
struct Frame {
    name: String,
    attributes: Vec<(String, String)>,
    text: String,
    /// Atom text construct with `type="xhtml"`; its child markup is
    /// flattened into this frame's text.
    is_xhtml: bool,
}

impl Frame {
    fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    fn text(&self) -> Option<String> {
        let trimmed = self.text.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    }

    /// Target of an RSS text link or an Atom alternate link.
    fn link(&self) -> Option<String> {
        match self.attribute("href") {
            Some(href) => {
                let rel = self.attribute("rel").unwrap_or("alternate");
                (rel == "alternate" && !href.trim().is_empty()).then(|| href.trim().to_string())
            }
            None => self.text(),
        }
    }
}

#[derive(Default)]
struct ParseState {
    feed: Option<Feed>,
    entry: Option<EntryBuilder>,
}

impl ParseState {
    /// Called before `frame` is pushed at `depth` (0 = document element).
    /// Returns false when the document element is not a feed.
    fn enter(&mut self, frame: &Frame, depth: usize) -> bool {
        if depth == 0 {
            if !FEED_ROOTS.contains(&frame.name.as_str()) {
                tracing::debug!(root = %frame.name, "Document element is not a feed");
                return false;
            }
            self.feed = Some(Feed::default());
            return true;
        }

        if self.entry.is_none() && matches!(frame.name.as_str(), "item" | "entry") {
            self.entry = Some(EntryBuilder::new(depth + 1));
        }
        true
    }

    /// Called when `frame` closes; `ancestors` are the still-open elements.
    fn leave(&mut self, frame: Frame, ancestors: &[Frame]) {
        let depth = ancestors.len() + 1;
        match self.entry.as_ref().map(|entry| entry.depth) {
            Some(entry_depth) if depth == entry_depth => {
                if let (Some(builder), Some(feed)) = (self.entry.take(), self.feed.as_mut()) {
                    feed.entries.push(builder.finish());
                }
            }
            Some(_) => {
                if let Some(builder) = self.entry.as_mut() {
                    builder.apply(frame, ancestors);
                }
            }
            None => {
                if let Some(feed) = self.feed.as_mut() {
                    apply_feed_field(feed, frame, ancestors);
                }
            }
        }
    }

    fn finish(self) -> Option<Feed> {
        self.feed
    }
}

fn apply_feed_field(feed: &mut Feed, frame: Frame, ancestors: &[Frame]) {
    let parent = ancestors.last().map(|f| f.name.as_str());
    let is_container = |name: Option<&str>, depth: usize| match name {
        Some("channel") => true,
        Some("feed") => depth == 1,
        _ => false,
    };

    // Atom <author><name>
    if frame.name == "name" && parent == Some("author") {
        let grandparent = ancestors.len().checked_sub(2).map(|i| ancestors[i].name.as_str());
        if is_container(grandparent, ancestors.len() - 1) {
            set_once(&mut feed.author, frame.text());
        }
        return;
    }

    if !is_container(parent, ancestors.len()) {
        return;
    }

    match frame.name.as_str() {
        "title" => set_once(&mut feed.title, frame.text()),
        "subtitle" | "description" => set_once(&mut feed.subtitle, frame.text()),
        "link" => set_once(&mut feed.link, frame.link()),
        "rights" | "copyright" | "dc:rights" => set_once(&mut feed.rights, frame.text()),
        "author" | "managingEditor" | "dc:creator" => set_once(&mut feed.author, frame.text()),
        "language" | "dc:language" => set_once(&mut feed.language, frame.text()),
        "generator" => set_once(&mut feed.generator, frame.text()),
        "pubDate" | "published" | "dc:date" => {
            if feed.published.is_none() {
                feed.published = frame.text().as_deref().and_then(parse_timestamp);
            }
        }
        "lastBuildDate" | "updated" => {
            if feed.updated.is_none() {
                feed.updated = frame.text().as_deref().and_then(parse_timestamp);
            }
        }
        "ttl" => {
            if feed.ttl.is_none() {
                feed.ttl = frame.text().and_then(|t| t.parse().ok());
            }
        }
        _ => {}
    }
}

struct EntryBuilder {
    /// Depth of the `<item>` / `<entry>` element itself
    depth: usize,
    entry: FeedEntry,
    latitude: Option<f64>,
    longitude: Option<f64>,
}

impl EntryBuilder {
    fn new(depth: usize) -> Self {
        Self {
            depth,
            entry: FeedEntry::default(),
            latitude: None,
            longitude: None,
        }
    }

    fn apply(&mut self, frame: Frame, ancestors: &[Frame]) {
        let parent = ancestors.last().map(|f| f.name.as_str());
        let depth = self.depth;
        let has_ancestor = |name: &str| ancestors[depth..].iter().any(|f| f.name == name);

        match frame.name.as_str() {
            "geo:lat" => self.latitude = frame.text().and_then(|t| t.parse().ok()),
            "geo:long" | "geo:lon" => self.longitude = frame.text().and_then(|t| t.parse().ok()),
            "geo:Point" => self.flush_geo_point(),
            "georss:point" => self.push_point(frame.text()),
            "georss:polygon" => self.push_polygon(frame.text()),
            "gml:pos" if has_ancestor("gml:Point") => self.push_point(frame.text()),
            "gml:posList" if has_ancestor("gml:Polygon") => self.push_polygon(frame.text()),
            "name" if parent == Some("author") && ancestors.len() == self.depth + 1 => {
                set_once(&mut self.entry.author, frame.text());
            }
            _ if ancestors.len() == self.depth => self.apply_field(frame),
            _ => {}
        }
    }

    /// Direct children of the entry element.
    fn apply_field(&mut self, frame: Frame) {
        let entry = &mut self.entry;
        match frame.name.as_str() {
            "title" => set_once(&mut entry.title, frame.text()),
            "guid" | "id" => set_once(&mut entry.id, frame.text()),
            "link" => set_once(&mut entry.link, frame.link()),
            "description" | "summary" => set_once(&mut entry.summary, frame.text()),
            "content" | "content:encoded" => set_once(&mut entry.content, frame.text()),
            "author" | "dc:creator" => set_once(&mut entry.author, frame.text()),
            "category" => {
                let category = frame
                    .attribute("term")
                    .map(|term| term.trim().to_string())
                    .filter(|term| !term.is_empty())
                    .or_else(|| frame.text());
                if let Some(category) = category {
                    entry.categories.push(category);
                }
            }
            "pubDate" | "published" | "dc:date" => {
                if entry.published.is_none() {
                    entry.published = frame.text().as_deref().and_then(parse_timestamp);
                }
            }
            "updated" | "lastBuildDate" => {
                if entry.updated.is_none() {
                    entry.updated = frame.text().as_deref().and_then(parse_timestamp);
                }
            }
            _ => {
                if let Some(text) = frame.text() {
                    entry.extensions.entry(frame.name).or_insert(text);
                }
            }
        }
    }

    fn push_point(&mut self, text: Option<String>) {
        match text.as_deref().and_then(parse_coordinates) {
            Some(points) if points.len() == 1 => {
                self.entry.geometries.push(Geometry::Point(points[0]));
            }
            _ => tracing::debug!(value = ?text, "Ignoring unparseable point"),
        }
    }

    fn push_polygon(&mut self, text: Option<String>) {
        match text.as_deref().and_then(parse_coordinates) {
            Some(points) if points.len() >= 3 => {
                self.entry.geometries.push(Geometry::Polygon(Polygon::new(points)));
            }
            _ => tracing::debug!(value = ?text, "Ignoring unparseable polygon"),
        }
    }

    fn flush_geo_point(&mut self) {
        if let (Some(latitude), Some(longitude)) = (self.latitude.take(), self.longitude.take()) {
            let point = Coordinates::new(latitude, longitude);
            if point.is_valid() {
                self.entry.geometries.push(Geometry::Point(point));
            }
        }
    }

    fn finish(mut self) -> FeedEntry {
        self.flush_geo_point();
        self.entry
    }
}

fn set_once(slot: &mut Option<String>, value: Option<String>) {
    if slot.is_none() {
        *slot = value;
    }
}

/// Parses RFC 3339 (Atom) or RFC 2822 (RSS) timestamps.
pub(crate) fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    DateTime::parse_from_rfc3339(value)
        .or_else(|_| DateTime::parse_from_rfc2822(value))
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
}

/// Parses a whitespace (or comma) separated `lat lon lat lon ...` list.
/// Returns `None` on an odd count, a non-number, or an out-of-range pair.
fn parse_coordinates(text: &str) -> Option<Vec<Coordinates>> {
    let values = text
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|s| !s.is_empty())
        .map(str::parse::<f64>)
        .collect::<Result<Vec<_>, _>>()
        .ok()?;

    if values.is_empty() || values.len() % 2 != 0 {
        return None;
    }

    let points: Vec<Coordinates> = values
        .chunks_exact(2)
        .map(|pair| Coordinates::new(pair[0], pair[1]))
        .collect();
    points.iter().all(Coordinates::is_valid).then_some(points)
}
