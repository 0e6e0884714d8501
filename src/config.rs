//! Configuration file for the `georss-feed` binary.
//!
//! The file is optional. A missing or empty file yields `Config::default()`;
//! command-line flags are applied on top by the caller. Unknown keys are
//! accepted but logged, since they are usually typos.
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::feed::{ConfigError, FeedClientConfig};
use crate::geo::Coordinates;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigFileError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Config file too large: {0}")]
    TooLarge(String),

    #[error("No feed URL configured (set `url` or pass --url)")]
    MissingUrl,

    #[error("No home location configured (set `latitude` and `longitude` or pass --lat/--lon)")]
    MissingHome,

    #[error(transparent)]
    Invalid(#[from] ConfigError),
}

// ============================================================================
// Configuration
// ============================================================================

/// Settings for one polled feed.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub url: Option<String>,

    pub latitude: Option<f64>,

    pub longitude: Option<f64>,

    /// Only report entries within this many kilometres of home.
    pub radius_km: Option<f64>,

    /// Only report entries in one of these categories. Empty = all.
    pub categories: Vec<String>,

    /// Request timeout override in seconds.
    pub timeout_secs: Option<u64>,

    /// Seconds between polls. 0 = poll once and exit.
    pub poll_interval_secs: u64,
}

impl Config {
    /// Maximum config file size (1 MiB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    const KNOWN_KEYS: [&'static str; 7] = [
        "url",
        "latitude",
        "longitude",
        "radius_km",
        "categories",
        "timeout_secs",
        "poll_interval_secs",
    ];

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigFileError::Parse)`
    /// - Unknown keys → accepted, logged as warning
    pub fn load(path: &Path) -> Result<Self, ConfigFileError> {
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigFileError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigFileError::Io(e)),
            Ok(_) => {}
        }

        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse configuration from TOML text.
    pub fn parse(content: &str) -> Result<Self, ConfigFileError> {
        if content.trim().is_empty() {
            tracing::debug!("Config file is empty, using defaults");
            return Ok(Self::default());
        }

        if let Ok(raw) = content.parse::<toml::Table>() {
            for key in raw.keys() {
                if !Self::KNOWN_KEYS.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        let config: Config = toml::from_str(content)?;
        tracing::info!(url = ?config.url, "Loaded configuration");
        Ok(config)
    }

    /// Polling interval, `None` when the feed should be polled once.
    pub fn poll_interval(&self) -> Option<Duration> {
        (self.poll_interval_secs > 0).then(|| Duration::from_secs(self.poll_interval_secs))
    }

    /// Builds and validates the feed client configuration.
    pub fn client_config(&self) -> Result<FeedClientConfig, ConfigFileError> {
        let url = self.url.as_deref().ok_or(ConfigFileError::MissingUrl)?;
        let (Some(latitude), Some(longitude)) = (self.latitude, self.longitude) else {
            return Err(ConfigFileError::MissingHome);
        };

        let mut builder = FeedClientConfig::builder(Coordinates::new(latitude, longitude), url)
            .filter_categories(self.categories.iter().cloned());
        if let Some(radius) = self.radius_km {
            builder = builder.filter_radius(radius);
        }
        if let Some(secs) = self.timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        Ok(builder.build()?)
    }
}

// ============================================================================
// Tests
// ============================================================================
