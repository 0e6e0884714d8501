//! Async client for GeoRSS feeds.
//!
//! Fetches a geotagged feed, converts each item with a pluggable
//! [`EntryFactory`] and keeps only the entries near a home location,
//! optionally restricted to a set of categories.

pub mod config;
pub mod feed;
pub mod geo;
pub mod util;

pub use feed::entry;
pub use feed::{
    ConfigError, Entry, EntryFactory, EntryFilter, Feed, FeedClient, FeedClientConfig, FeedEntry,
    FeedMetadata, FetchError, FetchOptions, GenericEntryFactory, GenericFeedEntry, ParseError,
    Update, UpdateStatus, XmlParser,
};
pub use geo::{Coordinates, Geometry, Polygon};
