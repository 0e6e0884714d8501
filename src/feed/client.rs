use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::fmt;
use std::sync::Mutex;
use std::time::Duration;
use thiserror::Error;
use url::Url;

use crate::feed::entry::EntryFactory;
use crate::feed::fetcher::{fetch_text, Body, FetchError, FetchOptions};
use crate::feed::filter::{newest_timestamp, EntryFilter};
use crate::feed::model::{Feed, FeedMetadata};
use crate::feed::parser::XmlParser;
use crate::geo::Coordinates;
use crate::util::{validate_url, UrlValidationError};

// ============================================================================
// Configuration
// ============================================================================

/// Errors raised when a [`FeedClientConfig`] fails validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid feed URL: {0}")]
    InvalidUrl(#[from] UrlValidationError),

    #[error("Home coordinates out of range: {0}")]
    InvalidCoordinates(Coordinates),

    #[error("Filter radius must be a positive number of kilometres, got {0}")]
    InvalidRadius(f64),

    #[error("Request timeout must be greater than zero")]
    InvalidTimeout,
}

/// Immutable per-client settings.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedClientConfig {
    home: Coordinates,
    url: Url,
    filter: EntryFilter,
    timeout: Option<Duration>,
}

impl FeedClientConfig {
    /// Starts a builder for a feed at `url`, filtered around `home`.
    pub fn builder(home: Coordinates, url: impl Into<String>) -> FeedClientConfigBuilder {
        FeedClientConfigBuilder {
            home,
            url: url.into(),
            radius: None,
            categories: None,
            timeout: None,
        }
    }

    /// Home location distances are measured from.
    pub fn home(&self) -> &Coordinates {
        &self.home
    }

    /// Validated feed URL.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Radius filter in kilometres.
    pub fn filter_radius(&self) -> Option<f64> {
        self.filter.radius
    }

    /// Accepted categories, `None` when every category is accepted.
    pub fn filter_categories(&self) -> Option<&HashSet<String>> {
        self.filter.categories.as_ref()
    }

    /// Explicit timeout override, if one was configured.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }
}

/// Builder for [`FeedClientConfig`]; validation happens in [`build`](Self::build).
#[derive(Debug, Clone)]
pub struct FeedClientConfigBuilder {
    home: Coordinates,
    url: String,
    radius: Option<f64>,
    categories: Option<HashSet<String>>,
    timeout: Option<Duration>,
}

impl FeedClientConfigBuilder {
    /// Keep only entries within `radius` kilometres of home (inclusive).
    pub fn filter_radius(mut self, radius: f64) -> Self {
        self.radius = Some(radius);
        self
    }

    /// Keep only entries whose category is one of `categories`.
    /// An empty set means no category filtering.
    pub fn filter_categories<I, S>(mut self, categories: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let set: HashSet<String> = categories.into_iter().map(Into::into).collect();
        self.categories = (!set.is_empty()).then_some(set);
        self
    }

    /// Overrides the entry factory's request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Validates the settings.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] for a non-http(s) URL, out-of-range home
    /// coordinates, a non-positive radius or a zero timeout.
    pub fn build(self) -> Result<FeedClientConfig, ConfigError> {
        let url = validate_url(&self.url)?;

        if !self.home.is_valid() {
            return Err(ConfigError::InvalidCoordinates(self.home));
        }

        if let Some(radius) = self.radius {
            if !radius.is_finite() || radius <= 0.0 {
                return Err(ConfigError::InvalidRadius(radius));
            }
        }

        if self.timeout.is_some_and(|t| t.is_zero()) {
            return Err(ConfigError::InvalidTimeout);
        }

        Ok(FeedClientConfig {
            home: self.home,
            url,
            filter: EntryFilter {
                radius: self.radius,
                categories: self.categories,
            },
            timeout: self.timeout,
        })
    }
}

// ============================================================================
// Update outcome
// ============================================================================

/// The three statuses an update can end with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UpdateStatus {
    Ok,
    /// The source reported no change (e.g. HTTP 304)
    OkNoData,
    Error,
}

impl fmt::Display for UpdateStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            UpdateStatus::Ok => "OK",
            UpdateStatus::OkNoData => "OK_NO_DATA",
            UpdateStatus::Error => "ERROR",
        };
        f.write_str(s)
    }
}

/// Result of one [`FeedClient::update`] call.
#[derive(Debug, Clone, PartialEq)]
pub enum Update<E> {
    /// Fetched and parsed. `None` when the document was not a feed.
    Ok(Option<Vec<E>>),
    OkNoData,
    Error,
}

impl<E> Update<E> {
    /// Status this outcome reports.
    pub fn status(&self) -> UpdateStatus {
        match self {
            Update::Ok(_) => UpdateStatus::Ok,
            Update::OkNoData => UpdateStatus::OkNoData,
            Update::Error => UpdateStatus::Error,
        }
    }

    /// Entries of an `Ok` outcome that carried a feed.
    pub fn entries(&self) -> Option<&[E]> {
        match self {
            Update::Ok(Some(entries)) => Some(entries.as_slice()),
            _ => None,
        }
    }

    /// Splits into the `(status, entries)` pair.
    pub fn into_parts(self) -> (UpdateStatus, Option<Vec<E>>) {
        let status = self.status();
        match self {
            Update::Ok(entries) => (status, entries),
            _ => (status, None),
        }
    }
}

// ============================================================================
// Client
// ============================================================================

/// Polls one GeoRSS feed and returns the entries relevant to a home location.
///
/// The HTTP client is owned by the caller and may be shared by many feed
/// clients. `update` takes `&self`: overlapping calls on one instance are
/// not serialised, each fetch runs independently and the last timestamp
/// is updated under a short lock with the newer value winning.
pub struct FeedClient<F: EntryFactory> {
    http: reqwest::Client,
    config: FeedClientConfig,
    factory: F,
    last_timestamp: Mutex<Option<DateTime<Utc>>>,
}

impl<F: EntryFactory> FeedClient<F> {
    /// Creates a client on a caller-owned HTTP client, which may be shared
    /// with other feeds.
    pub fn new(http: reqwest::Client, config: FeedClientConfig, factory: F) -> Self {
        Self {
            http,
            config,
            factory,
            last_timestamp: Mutex::new(None),
        }
    }

    /// Settings this client was built with.
    pub fn config(&self) -> &FeedClientConfig {
        &self.config
    }

    /// Shorthand for `config().home()`.
    pub fn home_coordinates(&self) -> &Coordinates {
        &self.config.home
    }

    /// Shorthand for `config().url()`.
    pub fn url(&self) -> &Url {
        &self.config.url
    }

    /// Factory used to build entries.
    pub fn factory(&self) -> &F {
        &self.factory
    }

    /// Newest published timestamp seen in a successful, non-empty update.
    pub fn last_timestamp(&self) -> Option<DateTime<Utc>> {
        *self
            .last_timestamp
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Effective request timeout: the configured override, else the factory's.
    pub fn timeout(&self) -> Duration {
        self.config
            .timeout
            .unwrap_or_else(|| self.factory.client_session_timeout())
    }

    /// Fetches the feed and returns the filtered entries.
    ///
    /// Never fails: network, HTTP status, decoding and parse errors are
    /// logged and reported as [`Update::Error`]. The last timestamp only
    /// moves on the `Ok` path with at least one timestamped entry.
    pub async fn update(&self) -> Update<F::Entry> {
        match self.fetch(&FetchOptions::default()).await {
            (UpdateStatus::Ok, Some(feed)) => {
                let metadata = FeedMetadata::from_feed(&feed);
                let entries: Vec<F::Entry> = feed
                    .entries
                    .iter()
                    .map(|record| self.factory.new_entry(&self.config.home, record, &metadata))
                    .collect();

                let filtered = self.config.filter.apply(entries);
                if let Some(newest) = newest_timestamp(&filtered) {
                    self.advance_last_timestamp(newest);
                }
                Update::Ok(Some(filtered))
            }
            (UpdateStatus::Ok, None) => Update::Ok(None),
            (UpdateStatus::OkNoData, _) => Update::OkNoData,
            (UpdateStatus::Error, _) => Update::Error,
        }
    }

    /// Fetches and parses the feed with the given request overrides.
    ///
    /// Returns `(Ok, Some(feed))` on success, `(Ok, None)` for a document
    /// that is not a feed, `(OkNoData, None)` on 304 Not Modified and
    /// `(Error, None)` on any failure.
    pub async fn fetch(&self, options: &FetchOptions) -> (UpdateStatus, Option<Feed>) {
        match self.try_fetch(options).await {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!(url = %self.config.url, error = %e, "Fetching feed failed");
                (UpdateStatus::Error, None)
            }
        }
    }

    async fn try_fetch(
        &self,
        options: &FetchOptions,
    ) -> Result<(UpdateStatus, Option<Feed>), FetchError> {
        match fetch_text(&self.http, &self.config.url, options, self.timeout()).await? {
            Body::NotModified => {
                tracing::debug!(url = %self.config.url, "Feed not modified");
                Ok((UpdateStatus::OkNoData, None))
            }
            Body::Text(text) => {
                let parser = XmlParser::new(self.factory.additional_namespaces());
                let feed = parser.parse(&text)?;
                Ok((UpdateStatus::Ok, feed))
            }
        }
    }

    fn advance_last_timestamp(&self, newest: DateTime<Utc>) {
        let mut last = self
            .last_timestamp
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if last.map_or(true, |current| newest > current) {
            *last = Some(newest);
        }
    }
}

impl<F: EntryFactory> fmt::Debug for FeedClient<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FeedClient")
            .field("home", &self.config.home)
            .field("url", &self.config.url.as_str())
            .field("radius", &self.config.filter.radius)
            .field("categories", &self.config.filter.categories)
            .finish()
    }
}
