//! The contract between the feed client and feed-specific entry types.
//!
//! The client only knows how to fetch, parse and filter. Turning a raw
//! [`FeedEntry`] into something meaningful (an incident, an earthquake, a
//! warning) is delegated to an [`EntryFactory`] supplied at construction.

use chrono::{DateTime, Utc};
use std::time::Duration;

use crate::feed::model::{FeedEntry, FeedMetadata};
use crate::geo::{Coordinates, Geometry};

/// Request timeout used unless the configuration or the factory says otherwise.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// A domain entry produced by an [`EntryFactory`].
///
/// Implementations are plain values: the client filters them through these
/// accessors and hands them to the caller untouched.
pub trait Entry {
    /// Location of the entry, `None` if the record carried none.
    fn geometry(&self) -> Option<&Geometry>;

    /// Distance from the home coordinates in kilometres. Only meaningful
    /// when [`geometry`](Entry::geometry) is present.
    fn distance_to_home(&self) -> Option<f64>;

    fn category(&self) -> Option<&str>;

    fn published(&self) -> Option<DateTime<Utc>>;
}

/// Builds domain entries from raw feed records for one feed type.
///
/// `new_entry` must be pure and must not fail: a record with missing or
/// malformed fields produces an entry with those fields set to `None`.
pub trait EntryFactory: Send + Sync {
    type Entry: Entry;

    fn new_entry(
        &self,
        home: &Coordinates,
        record: &FeedEntry,
        metadata: &FeedMetadata,
    ) -> Self::Entry;

    /// Extra `(namespace uri, prefix)` pairs this feed type uses.
    fn additional_namespaces(&self) -> &[(&'static str, &'static str)] {
        &[]
    }

    /// Request timeout for this feed type.
    fn client_session_timeout(&self) -> Duration {
        DEFAULT_REQUEST_TIMEOUT
    }
}

/// An [`EntryFactory`] backed by a closure. See [`from_fn`].
#[derive(Clone)]
pub struct FnEntryFactory<F> {
    f: F,
}

/// Wraps a closure as an [`EntryFactory`] with default namespaces and timeout.
///
/// ```
/// use georss_feed::{entry, GenericFeedEntry};
///
/// let factory = entry::from_fn(|home, record, metadata| {
///     GenericFeedEntry::new(home, record, metadata)
/// });
/// # let _ = factory;
/// ```
pub fn from_fn<F, E>(f: F) -> FnEntryFactory<F>
where
    F: Fn(&Coordinates, &FeedEntry, &FeedMetadata) -> E + Send + Sync,
    E: Entry,
{
    FnEntryFactory { f }
}

impl<F, E> EntryFactory for FnEntryFactory<F>
where
    F: Fn(&Coordinates, &FeedEntry, &FeedMetadata) -> E + Send + Sync,
    E: Entry,
{
    type Entry = E;

    fn new_entry(&self, home: &Coordinates, record: &FeedEntry, metadata: &FeedMetadata) -> E {
        (self.f)(home, record, metadata)
    }
}

impl<T: EntryFactory + ?Sized> EntryFactory for std::sync::Arc<T> {
    type Entry = T::Entry;

    fn new_entry(
        &self,
        home: &Coordinates,
        record: &FeedEntry,
        metadata: &FeedMetadata,
    ) -> Self::Entry {
        (**self).new_entry(home, record, metadata)
    }

    fn additional_namespaces(&self) -> &[(&'static str, &'static str)] {
        (**self).additional_namespaces()
    }

    fn client_session_timeout(&self) -> Duration {
        (**self).client_session_timeout()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    struct Marker(Option<String>);

    impl Entry for Marker {
        fn geometry(&self) -> Option<&Geometry> {
            None
        }
        fn distance_to_home(&self) -> Option<f64> {
            None
        }
        fn category(&self) -> Option<&str> {
            self.0.as_deref()
        }
        fn published(&self) -> Option<DateTime<Utc>> {
            None
        }
    }

    #[test]
    fn test_from_fn_delegates_to_closure() {
        let factory = from_fn(|_: &Coordinates, record: &FeedEntry, _: &FeedMetadata| {
            Marker(record.title.clone())
        });
        let record = FeedEntry {
            title: Some("Hello".to_string()),
            ..Default::default()
        };

        let entry = factory.new_entry(
            &Coordinates::new(0.0, 0.0),
            &record,
            &FeedMetadata::default(),
        );
        assert_eq!(entry.category(), Some("Hello"));
        assert!(factory.additional_namespaces().is_empty());
        assert_eq!(factory.client_session_timeout(), DEFAULT_REQUEST_TIMEOUT);
    }

    struct SlowFeed;

    impl EntryFactory for SlowFeed {
        type Entry = Marker;

        fn new_entry(&self, _: &Coordinates, _: &FeedEntry, _: &FeedMetadata) -> Marker {
            Marker(None)
        }

        fn additional_namespaces(&self) -> &[(&'static str, &'static str)] {
            &[("http://example.com/ns", "ex")]
        }

        fn client_session_timeout(&self) -> Duration {
            Duration::from_secs(30)
        }
    }

    #[test]
    fn test_arc_forwards_overrides() {
        let factory = Arc::new(SlowFeed);
        assert_eq!(factory.client_session_timeout(), Duration::from_secs(30));
        assert_eq!(
            factory.additional_namespaces(),
            &[("http://example.com/ns", "ex")]
        );
    }
}
