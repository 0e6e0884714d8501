use chrono::{DateTime, Utc};

use crate::feed::entry::{Entry, EntryFactory};
use crate::feed::model::{FeedEntry, FeedMetadata};
use crate::geo::{Coordinates, Geometry};

/// A general-purpose entry for any GeoRSS feed.
#[derive(Debug, Clone, PartialEq)]
pub struct GenericFeedEntry {
    home: Coordinates,
    title: Option<String>,
    external_id: Option<String>,
    link: Option<String>,
    description: Option<String>,
    category: Option<String>,
    attribution: Option<String>,
    published: Option<DateTime<Utc>>,
    updated: Option<DateTime<Utc>>,
    geometries: Vec<Geometry>,
    distance_to_home: Option<f64>,
}

impl GenericFeedEntry {
    pub fn new(home: &Coordinates, record: &FeedEntry, metadata: &FeedMetadata) -> Self {
        let distance_to_home = record
            .geometries
            .iter()
            .filter_map(|g| g.distance_from(home))
            .min_by(f64::total_cmp);

        Self {
            home: *home,
            title: record.title.clone(),
            external_id: record
                .id
                .clone()
                .or_else(|| record.link.clone())
                .or_else(|| record.title.clone()),
            link: record.link.clone(),
            description: record.summary.clone().or_else(|| record.content.clone()),
            category: record.categories.first().cloned(),
            attribution: metadata.attribution.clone(),
            published: record.published,
            updated: record.updated,
            geometries: record.geometries.clone(),
            distance_to_home,
        }
    }

    pub fn home(&self) -> &Coordinates {
        &self.home
    }

    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    /// Id, falling back to link, then title.
    pub fn external_id(&self) -> Option<&str> {
        self.external_id.as_deref()
    }

    pub fn link(&self) -> Option<&str> {
        self.link.as_deref()
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn attribution(&self) -> Option<&str> {
        self.attribution.as_deref()
    }

    pub fn updated(&self) -> Option<DateTime<Utc>> {
        self.updated
    }

    pub fn geometries(&self) -> &[Geometry] {
        &self.geometries
    }

    /// Reference position of the primary geometry.
    pub fn coordinates(&self) -> Option<Coordinates> {
        self.geometries.first().and_then(Geometry::reference_point)
    }

    /// Initial bearing from home to [`coordinates`](Self::coordinates), in degrees.
    pub fn bearing_from_home(&self) -> Option<f64> {
        self.coordinates().map(|c| self.home.bearing_to(&c))
    }
}

impl Entry for GenericFeedEntry {
    fn geometry(&self) -> Option<&Geometry> {
        self.geometries.first()
    }

    /// Distance to the nearest of the entry's geometries.
    fn distance_to_home(&self) -> Option<f64> {
        self.distance_to_home
    }

    fn category(&self) -> Option<&str> {
        self.category.as_deref()
    }

    fn published(&self) -> Option<DateTime<Utc>> {
        self.published
    }
}

/// Factory producing [`GenericFeedEntry`] values.
#[derive(Debug, Clone, Copy, Default)]
pub struct GenericEntryFactory;

impl EntryFactory for GenericEntryFactory {
    type Entry = GenericFeedEntry;

    fn new_entry(
        &self,
        home: &Coordinates,
        record: &FeedEntry,
        metadata: &FeedMetadata,
    ) -> GenericFeedEntry {
        GenericFeedEntry::new(home, record, metadata)
    }
}
