//! End-to-end tests for `FeedClient::update` against a mock HTTP server.
//!
//! Home is (0, 0). A point at latitude 0.09 is about 10 km away, one at
//! latitude 0.72 about 80 km away.

use chrono::{TimeZone, Utc};
use georss_feed::{
    Coordinates, Entry, FeedClient, FeedClientConfig, GenericEntryFactory, GenericFeedEntry,
    Update, UpdateStatus,
};
use pretty_assertions::assert_eq;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const HOME: Coordinates = Coordinates::new(0.0, 0.0);

fn item(title: &str, point: Option<&str>, category: &str, published: &str) -> String {
    let point = point
        .map(|p| format!("<georss:point>{p}</georss:point>"))
        .unwrap_or_default();
    format!(
        "<item><title>{title}</title><guid>{title}</guid><category>{category}</category>\
         <pubDate>{published}</pubDate>{point}</item>"
    )
}

fn rss(items: &[String]) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0" xmlns:georss="http://www.georss.org/georss">
  <channel>
    <title>Incidents</title>
    <managingEditor>Emergency Service</managingEditor>
    {}
  </channel>
</rss>"#,
        items.concat()
    )
}

fn standard_feed() -> String {
    rss(&[
        item("No location", None, "Bushfire", "Sat, 21 Jan 2023 09:00:00 +0000"),
        item("Near", Some("0.09 0.0"), "Bushfire", "Sat, 21 Jan 2023 10:00:00 +0000"),
        item("Far", Some("0.72 0.0"), "Flood", "Sat, 21 Jan 2023 11:00:00 +0000"),
    ])
}

async fn serve(server: &MockServer, template: ResponseTemplate) {
    Mock::given(method("GET"))
        .and(path("/feed.xml"))
        .respond_with(template)
        .mount(server)
        .await;
}

fn client_for(server: &MockServer, radius: Option<f64>) -> FeedClient<GenericEntryFactory> {
    let mut builder = FeedClientConfig::builder(HOME, format!("{}/feed.xml", server.uri()));
    if let Some(radius) = radius {
        builder = builder.filter_radius(radius);
    }
    FeedClient::new(reqwest::Client::new(), builder.build().unwrap(), GenericEntryFactory)
}

fn titles(entries: &[GenericFeedEntry]) -> Vec<&str> {
    entries.iter().filter_map(|e| e.title()).collect()
}

// ============================================================================
// Filtering
// ============================================================================

#[tokio::test]
async fn test_geometry_and_radius_filtering() {
    let server = MockServer::start().await;
    serve(&server, ResponseTemplate::new(200).set_body_string(standard_feed())).await;

    let client = client_for(&server, Some(50.0));
    let update = client.update().await;

    assert_eq!(update.status(), UpdateStatus::Ok);
    let entries = update.entries().unwrap();
    assert_eq!(titles(entries), vec!["Near"]);
    assert!((entries[0].distance_to_home().unwrap() - 10.0).abs() < 0.1);
    assert_eq!(entries[0].attribution(), Some("Emergency Service"));
}

#[tokio::test]
async fn test_category_filtering() {
    let server = MockServer::start().await;
    serve(&server, ResponseTemplate::new(200).set_body_string(standard_feed())).await;

    let config = FeedClientConfig::builder(HOME, format!("{}/feed.xml", server.uri()))
        .filter_categories(["Flood"])
        .build()
        .unwrap();
    let client = FeedClient::new(reqwest::Client::new(), config, GenericEntryFactory);

    let update = client.update().await;
    assert_eq!(titles(update.entries().unwrap()), vec!["Far"]);
}

#[tokio::test]
async fn test_no_filters_only_drops_missing_geometry() {
    let server = MockServer::start().await;
    serve(&server, ResponseTemplate::new(200).set_body_string(standard_feed())).await;

    let client = client_for(&server, None);
    let update = client.update().await;
    assert_eq!(titles(update.entries().unwrap()), vec!["Near", "Far"]);
}

// ============================================================================
// Status mapping
// ============================================================================

#[tokio::test]
async fn test_not_modified_leaves_timestamp_untouched() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string(standard_feed()))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(304))
        .mount(&server)
        .await;

    let client = client_for(&server, None);
    assert_eq!(client.update().await.status(), UpdateStatus::Ok);
    let before = client.last_timestamp();
    assert!(before.is_some());

    let update = client.update().await;
    assert_eq!(update, Update::OkNoData);
    assert_eq!(client.last_timestamp(), before);
}

#[tokio::test]
async fn test_server_error_is_reported() {
    let server = MockServer::start().await;
    serve(&server, ResponseTemplate::new(500)).await;

    let client = client_for(&server, None);
    assert_eq!(client.update().await, Update::Error);
    assert_eq!(client.last_timestamp(), None);
}

#[tokio::test]
async fn test_malformed_payload_is_reported() {
    let server = MockServer::start().await;
    serve(
        &server,
        ResponseTemplate::new(200).set_body_string("<rss><channel><item></channel></rss>"),
    )
    .await;

    let client = client_for(&server, None);
    assert_eq!(client.update().await, Update::Error);
}

#[tokio::test]
async fn test_non_feed_document_is_ok_without_entries() {
    let server = MockServer::start().await;
    serve(
        &server,
        ResponseTemplate::new(200).set_body_string("<html><body>Maintenance</body></html>"),
    )
    .await;

    let client = client_for(&server, None);
    let update = client.update().await;
    assert_eq!(update, Update::Ok(None));
    assert_eq!(client.last_timestamp(), None);
}

#[tokio::test]
async fn test_connection_refused_is_reported() {
    // Bind then drop to get a port with nothing listening
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let config = FeedClientConfig::builder(HOME, format!("http://127.0.0.1:{port}/feed.xml"))
        .build()
        .unwrap();
    let client = FeedClient::new(reqwest::Client::new(), config, GenericEntryFactory);

    assert_eq!(client.update().await, Update::Error);
    assert_eq!(client.last_timestamp(), None);
}

#[tokio::test]
async fn test_timeout_is_reported() {
    let server = MockServer::start().await;
    serve(
        &server,
        ResponseTemplate::new(200)
            .set_body_string(standard_feed())
            .set_delay(Duration::from_secs(5)),
    )
    .await;

    let config = FeedClientConfig::builder(HOME, format!("{}/feed.xml", server.uri()))
        .timeout(Duration::from_millis(200))
        .build()
        .unwrap();
    let client = FeedClient::new(reqwest::Client::new(), config, GenericEntryFactory);

    assert_eq!(client.update().await, Update::Error);
    assert_eq!(client.last_timestamp(), None);
}

// ============================================================================
// Encoding
// ============================================================================

#[tokio::test]
async fn test_bom_overrides_declared_charset() {
    let feed = rss(&[item(
        "Séisme à Nîmes",
        Some("0.09 0.0"),
        "Earthquake",
        "Sat, 21 Jan 2023 10:00:00 +0000",
    )]);
    let mut body = b"\xEF\xBB\xBF".to_vec();
    body.extend_from_slice(feed.as_bytes());

    let server = MockServer::start().await;
    serve(
        &server,
        ResponseTemplate::new(200).set_body_raw(body, "application/rss+xml; charset=ISO-8859-1"),
    )
    .await;

    let client = client_for(&server, None);
    let update = client.update().await;
    assert_eq!(titles(update.entries().unwrap()), vec!["Séisme à Nîmes"]);
}

#[tokio::test]
async fn test_declared_charset_is_used_without_bom() {
    let feed = rss(&[item(
        "Caf\u{e9}",
        Some("0.09 0.0"),
        "Fire",
        "Sat, 21 Jan 2023 10:00:00 +0000",
    )])
    .replace("encoding=\"UTF-8\"", "encoding=\"ISO-8859-1\"");
    let (latin1, _, _) = encoding_rs::WINDOWS_1252.encode(&feed);

    let server = MockServer::start().await;
    serve(
        &server,
        ResponseTemplate::new(200)
            .set_body_raw(latin1.into_owned(), "application/rss+xml; charset=ISO-8859-1"),
    )
    .await;

    let client = client_for(&server, None);
    let update = client.update().await;
    assert_eq!(titles(update.entries().unwrap()), vec!["Café"]);
}

// ============================================================================
// Last timestamp
// ============================================================================

#[tokio::test]
async fn test_last_timestamp_is_newest_surviving_entry() {
    let server = MockServer::start().await;
    serve(&server, ResponseTemplate::new(200).set_body_string(standard_feed())).await;

    // "No location" has the oldest stamp and "Far" the newest; radius keeps only "Near"
    let client = client_for(&server, Some(50.0));
    client.update().await;
    assert_eq!(
        client.last_timestamp(),
        Some(Utc.with_ymd_and_hms(2023, 1, 21, 10, 0, 0).unwrap())
    );

    let unfiltered = client_for(&server, None);
    unfiltered.update().await;
    assert_eq!(
        unfiltered.last_timestamp(),
        Some(Utc.with_ymd_and_hms(2023, 1, 21, 11, 0, 0).unwrap())
    );
}

#[tokio::test]
async fn test_last_timestamp_never_moves_backwards() {
    let newer = rss(&[item("New", Some("0.09 0.0"), "Fire", "Sun, 22 Jan 2023 10:00:00 +0000")]);
    let older = rss(&[item("Old", Some("0.09 0.0"), "Fire", "Fri, 20 Jan 2023 10:00:00 +0000")]);

    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string(newer))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string(older))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let client = client_for(&server, None);
    let expected = Some(Utc.with_ymd_and_hms(2023, 1, 22, 10, 0, 0).unwrap());

    assert_eq!(client.update().await.status(), UpdateStatus::Ok);
    assert_eq!(client.last_timestamp(), expected);

    assert_eq!(titles(client.update().await.entries().unwrap()), vec!["Old"]);
    assert_eq!(client.last_timestamp(), expected);

    assert_eq!(client.update().await, Update::Error);
    assert_eq!(client.last_timestamp(), expected);
}

#[tokio::test]
async fn test_untimestamped_or_filtered_out_update_keeps_previous_timestamp() {
    let stamped = rss(&[item("Near", Some("0.09 0.0"), "Fire", "Sat, 21 Jan 2023 10:00:00 +0000")]);
    let unstamped = rss(&[
        "<item><title>No date</title><georss:point>0.09 0.0</georss:point></item>".to_string(),
    ]);
    // Newer, but 80 km away and outside the radius
    let far = rss(&[item("Far", Some("0.72 0.0"), "Fire", "Mon, 23 Jan 2023 10:00:00 +0000")]);

    let server = MockServer::start().await;
    for body in [stamped, unstamped, far] {
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .up_to_n_times(1)
            .mount(&server)
            .await;
    }

    let client = client_for(&server, Some(50.0));
    let expected = Some(Utc.with_ymd_and_hms(2023, 1, 21, 10, 0, 0).unwrap());

    client.update().await;
    assert_eq!(client.last_timestamp(), expected);

    let update = client.update().await;
    assert_eq!(titles(update.entries().unwrap()), vec!["No date"]);
    assert_eq!(client.last_timestamp(), expected);

    let update = client.update().await;
    assert_eq!(update.entries().map(<[_]>::len), Some(0));
    assert_eq!(client.last_timestamp(), expected);
}

#[tokio::test]
async fn test_overlapping_updates_keep_newest_timestamp() {
    let newer = rss(&[item("New", Some("0.09 0.0"), "Fire", "Sun, 22 Jan 2023 10:00:00 +0000")]);
    let older = rss(&[item("Old", Some("0.09 0.0"), "Fire", "Fri, 20 Jan 2023 10:00:00 +0000")]);

    // Whichever request arrives first gets the slow, newer response
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(newer)
                .set_delay(Duration::from_millis(300)),
        )
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string(older))
        .up_to_n_times(1)
        .mount(&server)
        .await;

    let client = client_for(&server, None);
    let (first, second) = tokio::join!(client.update(), client.update());

    assert_eq!(first.status(), UpdateStatus::Ok);
    assert_eq!(second.status(), UpdateStatus::Ok);
    let mut seen = titles(first.entries().unwrap());
    seen.extend(titles(second.entries().unwrap()));
    seen.sort_unstable();
    assert_eq!(seen, vec!["New", "Old"]);
    assert_eq!(
        client.last_timestamp(),
        Some(Utc.with_ymd_and_hms(2023, 1, 22, 10, 0, 0).unwrap())
    );
}

#[tokio::test]
async fn test_empty_feed_on_fresh_client_has_no_timestamp() {
    let server = MockServer::start().await;
    serve(&server, ResponseTemplate::new(200).set_body_string(rss(&[]))).await;

    let client = client_for(&server, None);
    let update = client.update().await;
    assert_eq!(update.entries().map(<[_]>::len), Some(0));
    assert_eq!(client.last_timestamp(), None);
}
