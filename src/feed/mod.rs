//! GeoRSS feed retrieval, parsing and filtering.
//!
//! One [`FeedClient`] polls one feed URL:
//!
//! - **Fetching**: HTTP retrieval with a timeout, size cap and charset/BOM handling
//! - **Parsing**: RSS 2.0, RSS 1.0 and Atom into a generic [`Feed`] with GeoRSS geometries
//! - **Entries**: an [`EntryFactory`] turns each raw record into a domain entry
//! - **Filtering**: geometry presence, radius and category, in that order
//!
//! # Example
//!
//! ```no_run
//! use georss_feed::{Coordinates, FeedClient, FeedClientConfig, GenericEntryFactory, Update};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = FeedClientConfig::builder(
//!     Coordinates::new(-33.86, 151.21),
//!     "https://example.com/georss.xml",
//! )
//! .filter_radius(50.0)
//! .build()?;
//!
//! let client = FeedClient::new(reqwest::Client::new(), config, GenericEntryFactory);
//! if let Update::Ok(Some(entries)) = client.update().await {
//!     println!("{} entries nearby", entries.len());
//! }
//! # Ok(())
//! # }
//! ```

mod client;
pub mod entry;
mod fetcher;
mod filter;
mod generic;
mod model;
mod parser;

pub use client::{
    ConfigError, FeedClient, FeedClientConfig, FeedClientConfigBuilder, Update, UpdateStatus,
};
pub use entry::{Entry, EntryFactory, DEFAULT_REQUEST_TIMEOUT};
pub use fetcher::{FetchError, FetchOptions};
pub use filter::{newest_timestamp, EntryFilter};
pub use generic::{GenericEntryFactory, GenericFeedEntry};
pub use model::{Feed, FeedEntry, FeedMetadata};
pub use parser::{ParseError, XmlParser};
