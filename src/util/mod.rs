//! Small helpers shared by the library and the command-line front end.
//!
//! - **URL validation**: accept only absolute http/https feed URLs
//! - **Text**: flatten feed-supplied strings for terminal output

mod text;
mod url_validator;

pub use text::single_line;
pub use url_validator::{validate_url, UrlValidationError};
