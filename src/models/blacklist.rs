//! Blacklisted URL prefixes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Failure counter for a `scheme://host[/path...]` prefix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlacklistEntry {
    pub prefix: String,
    pub failure_count: u32,
    /// Error code of the most recent qualifying failure.
    pub last_error: String,
    pub updated_at: DateTime<Utc>,
}
