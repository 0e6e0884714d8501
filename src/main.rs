use anyhow::{Context, Result};
use clap::Parser;
use reqwest::redirect::Policy;
use std::path::PathBuf;
use std::time::Duration;

use georss_feed::config::Config;
use georss_feed::util::single_line;
use georss_feed::{Entry, FeedClient, GenericEntryFactory, GenericFeedEntry, Update};

#[derive(Parser, Debug)]
#[command(name = "georss-feed", about = "Poll a GeoRSS feed for entries near a location")]
struct Args {
    /// TOML config file; flags override its values
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Feed URL
    #[arg(long)]
    url: Option<String>,

    /// Home latitude in degrees
    #[arg(long, allow_hyphen_values = true)]
    lat: Option<f64>,

    /// Home longitude in degrees
    #[arg(long, allow_hyphen_values = true)]
    lon: Option<f64>,

    /// Only show entries within this many kilometres
    #[arg(long, value_name = "KM")]
    radius: Option<f64>,

    /// Only show entries in this category (repeatable)
    #[arg(long = "category", value_name = "NAME")]
    categories: Vec<String>,

    /// Request timeout in seconds
    #[arg(long, value_name = "SECS")]
    timeout: Option<u64>,

    /// Poll every SECS seconds until Ctrl-C; 0 polls once
    #[arg(long, value_name = "SECS")]
    interval: Option<u64>,
}

impl Args {
    fn apply(self, config: &mut Config) {
        if self.url.is_some() {
            config.url = self.url;
        }
        if self.lat.is_some() {
            config.latitude = self.lat;
        }
        if self.lon.is_some() {
            config.longitude = self.lon;
        }
        if self.radius.is_some() {
            config.radius_km = self.radius;
        }
        if !self.categories.is_empty() {
            config.categories = self.categories;
        }
        if self.timeout.is_some() {
            config.timeout_secs = self.timeout;
        }
        if let Some(interval) = self.interval {
            config.poll_interval_secs = interval;
        }
    }
}

/// Follow at most 3 redirects and stop on loops.
fn redirect_policy() -> Policy {
    Policy::custom(|attempt| {
        if attempt.previous().len() >= 3 {
            return attempt.error("Too many redirects (max 3)");
        }

        let url = attempt.url();
        if attempt.previous().iter().any(|prev| prev == url) {
            return attempt.error("Redirect loop detected");
        }

        tracing::debug!(to = %url, hop = attempt.previous().len() + 1, "Following redirect");
        attempt.follow()
    })
}

fn print_update(update: Update<GenericFeedEntry>) {
    let (status, entries) = update.into_parts();
    let Some(entries) = entries else {
        println!("{status}");
        return;
    };

    println!("{status}: {} entries", entries.len());
    for entry in &entries {
        let distance = entry
            .distance_to_home()
            .map_or_else(|| "?".to_string(), |d| format!("{d:.1} km"));
        let published = entry
            .published()
            .map_or_else(|| "-".to_string(), |ts| ts.format("%Y-%m-%d %H:%M").to_string());
        println!(
            "  {:>9}  {:<16}  {}  {}",
            distance,
            single_line(entry.category().unwrap_or("-")),
            published,
            single_line(entry.title().unwrap_or("(untitled)")),
        );
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("Failed to load config file '{}'", path.display()))?,
        None => Config::default(),
    };
    args.apply(&mut config);

    let client_config = config.client_config().context("Invalid configuration")?;
    let http = reqwest::Client::builder()
        .redirect(redirect_policy())
        .pool_idle_timeout(Duration::from_secs(30))
        .tcp_keepalive(Duration::from_secs(60))
        .build()
        .context("Failed to build HTTP client")?;
    let client = FeedClient::new(http, client_config, GenericEntryFactory);
    tracing::debug!(?client, "Feed client ready");

    let Some(period) = config.poll_interval() else {
        print_update(client.update().await);
        return Ok(());
    };

    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                print_update(client.update().await);
                if let Some(ts) = client.last_timestamp() {
                    tracing::info!(last_timestamp = %ts, "Poll complete");
                }
            }
            _ = tokio::signal::ctrl_c() => {
                println!("Stopped.");
                break;
            }
        }
    }

    Ok(())
}
