//! Shared utility functions.
//!
//! - `url`: URL validation and prefix decomposition
//! - `format`: human-readable byte counts

mod format;
pub mod url;

pub use format::format_bytes;
pub use url::{last_path_segment, tidy_url, url_prefixes, InvalidUrl, ALLOWED_SCHEMES};
