use thiserror::Error;
use url::Url;

/// Errors that can occur during feed URL validation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum UrlValidationError {
    /// The URL string could not be parsed.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    /// The URL uses a scheme other than http or https.
    #[error("Unsupported scheme: {0} (only http/https allowed)")]
    UnsupportedScheme(String),
    #[error("URL has no host")]
    MissingHost,
}

/// Validates a URL string for use as a feed source.
///
/// Only absolute `http`/`https` URLs with a host are accepted. Local and
/// private addresses are allowed: feeds are often served from inside the
/// network that consumes them.
///
/// # Examples
///
/// ```
/// use georss_feed::util::validate_url;
///
/// let url = validate_url("https://example.com/feed.xml").unwrap();
/// assert_eq!(url.host_str(), Some("example.com"));
///
/// assert!(validate_url("file:///etc/passwd").is_err());
/// assert!(validate_url("not a url").is_err());
/// ```
pub fn validate_url(url_str: &str) -> Result<Url, UrlValidationError> {
    let url = Url::parse(url_str.trim())?;

    match url.scheme() {
        "http" | "https" => {}
        scheme => return Err(UrlValidationError::UnsupportedScheme(scheme.to_owned())),
    }

    if url.host_str().map_or(true, str::is_empty) {
        return Err(UrlValidationError::MissingHost);
    }

    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_and_https_accepted() {
        assert!(validate_url("http://example.com/feed").is_ok());
        assert!(validate_url("https://example.com:8443/feed.xml?x=1").is_ok());
    }

    #[test]
    fn test_local_addresses_accepted() {
        assert!(validate_url("http://127.0.0.1:8080/feed").is_ok());
        assert!(validate_url("http://localhost/feed").is_ok());
        assert!(validate_url("http://[::1]/feed").is_ok());
    }

    #[test]
    fn test_surrounding_whitespace_ignored() {
        let url = validate_url("  https://example.com/feed  ").unwrap();
        assert_eq!(url.as_str(), "https://example.com/feed");
    }

    #[test]
    fn test_other_schemes_rejected() {
        for input in ["ftp://example.com/feed", "file:///etc/passwd", "data:text/plain,hi"] {
            assert!(
                matches!(validate_url(input), Err(UrlValidationError::UnsupportedScheme(_))),
                "{input} should be rejected"
            );
        }
    }

    #[test]
    fn test_unparsable_rejected() {
        assert!(matches!(
            validate_url("example.com/feed"),
            Err(UrlValidationError::InvalidUrl(_))
        ));
        assert!(validate_url("").is_err());
    }
}
