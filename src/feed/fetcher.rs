use encoding_rs::{Encoding, UTF_8};
use futures::StreamExt;
use reqwest::header::{HeaderMap, CONTENT_TYPE};
use reqwest::{Method, StatusCode};
use std::time::Duration;
use thiserror::Error;
use url::Url;

use crate::feed::parser::ParseError;

const MAX_FEED_SIZE: usize = 10 * 1024 * 1024; // 10MB
const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Errors that can occur while retrieving a feed.
///
/// None of these escape [`FeedClient::update`](crate::FeedClient::update);
/// they are logged and folded into [`UpdateStatus::Error`](crate::UpdateStatus::Error).
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// HTTP response with a non-2xx status code
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    /// Request exceeded the configured timeout
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),
    /// Response body exceeded the 10MB size limit
    #[error("Response too large")]
    ResponseTooLarge,
    /// Body could not be decoded with the detected encoding
    #[error("Decode error: {0}")]
    Decode(String),
    /// Body is not a well-formed feed document
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),
}

/// Per-request overrides for [`FeedClient::fetch`](crate::FeedClient::fetch).
#[derive(Debug, Clone)]
pub struct FetchOptions {
    pub method: Method,
    pub headers: HeaderMap,
    pub query: Vec<(String, String)>,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            method: Method::GET,
            headers: HeaderMap::new(),
            query: Vec::new(),
        }
    }
}

/// Raw outcome of one HTTP exchange.
#[derive(Debug)]
pub(crate) enum Body {
    /// 2xx response, decoded to text
    Text(String),
    /// 304 Not Modified
    NotModified,
}

/// Performs one request with `timeout` covering send and body read.
pub(crate) async fn fetch_text(
    client: &reqwest::Client,
    url: &Url,
    options: &FetchOptions,
    timeout: Duration,
) -> Result<Body, FetchError> {
    tokio::time::timeout(timeout, fetch_text_inner(client, url, options))
        .await
        .map_err(|_| FetchError::Timeout(timeout))?
}

async fn fetch_text_inner(
    client: &reqwest::Client,
    url: &Url,
    options: &FetchOptions,
) -> Result<Body, FetchError> {
    let mut target = url.clone();
    if !options.query.is_empty() {
        target.query_pairs_mut().extend_pairs(&options.query);
    }

    let response = client
        .request(options.method.clone(), target)
        .headers(options.headers.clone())
        .send()
        .await
        .map_err(FetchError::Network)?;

    let status = response.status();
    if status == StatusCode::NOT_MODIFIED {
        return Ok(Body::NotModified);
    }
    if !status.is_success() {
        return Err(FetchError::HttpStatus(status.as_u16()));
    }

    let declared = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(charset_from_content_type);
    tracing::debug!(url = %url, encoding = ?declared, "Response encoding");

    let bytes = read_limited_bytes(response, MAX_FEED_SIZE).await?;
    decode_body(&bytes, declared.as_deref()).map(Body::Text)
}

async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, FetchError> {
    // Fast path: check Content-Length header
    if let Some(len) = response.content_length() {
        if len as usize > limit {
            return Err(FetchError::ResponseTooLarge);
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(FetchError::Network)?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(FetchError::ResponseTooLarge);
        }
        bytes.extend_from_slice(&chunk);
    }

    Ok(bytes)
}

/// Extracts the `charset` parameter from a Content-Type value.
fn charset_from_content_type(content_type: &str) -> Option<String> {
    content_type
        .split(';')
        .skip(1)
        .filter_map(|param| param.split_once('='))
        .find(|(key, _)| key.trim().eq_ignore_ascii_case("charset"))
        .map(|(_, value)| value.trim().trim_matches('"').to_string())
        .filter(|value| !value.is_empty())
}

/// Decodes a response body.
///
/// A leading UTF-8 byte order mark wins over whatever the server declared:
/// the BOM is stripped and the rest decoded as UTF-8. Otherwise the
/// declared charset is trusted, with UTF-8 when none is declared or the
/// label is unknown. Malformed input is an error, never replaced.
pub(crate) fn decode_body(bytes: &[u8], declared: Option<&str>) -> Result<String, FetchError> {
    if let Some(rest) = bytes.strip_prefix(UTF8_BOM) {
        tracing::debug!(
            declared = ?declared,
            "UTF-8 byte order mark detected, decoding as UTF-8 without BOM"
        );
        return String::from_utf8(rest.to_vec()).map_err(|e| FetchError::Decode(e.to_string()));
    }

    let encoding = match declared {
        Some(label) => Encoding::for_label(label.as_bytes()).unwrap_or_else(|| {
            tracing::debug!(charset = %label, "Unknown charset, falling back to UTF-8");
            UTF_8
        }),
        None => UTF_8,
    };

    encoding
        .decode_without_bom_handling_and_without_replacement(bytes)
        .map(|text| text.into_owned())
        .ok_or_else(|| FetchError::Decode(format!("malformed {} content", encoding.name())))
}
