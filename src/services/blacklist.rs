//! Advisory blacklist of URL prefixes that keep failing at the transport level.
//!
//! The tracker never fails a download on its own account: storage errors are
//! logged and the URL is treated as not blocked.

use thiserror::Error;
use tracing::{debug, info, warn};
use url::Url;

use crate::models::BlacklistEntry;
use crate::repository::{DieselBlacklistRepository, DieselError};
use crate::utils::url_prefixes;

/// Failures at one prefix before URLs under it are skipped.
pub const BLACKLIST_THRESHOLD: u32 = 5;

/// Transport error codes that count towards the blacklist.
const BLOCK_WORTHY_CODES: [&str; 3] = ["connect", "timeout", "dns"];

pub fn is_block_worthy(code: &str) -> bool {
    BLOCK_WORTHY_CODES.contains(&code)
}

#[derive(Debug, Error)]
pub enum BlacklistError {
    #[error("Blacklist storage error: {0}")]
    Storage(#[from] DieselError),
}

#[derive(Clone)]
pub struct BlacklistTracker {
    repo: DieselBlacklistRepository,
    threshold: u32,
}

impl BlacklistTracker {
    pub fn new(repo: DieselBlacklistRepository) -> Self {
        Self {
            repo,
            threshold: BLACKLIST_THRESHOLD,
        }
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    pub async fn should_skip(&self, url: &Url) -> bool {
        self.blocked_prefix(url).await.is_some()
    }

    /// The prefix that blocks `url`, if any.
    pub async fn blocked_prefix(&self, url: &Url) -> Option<String> {
        match self.try_blocked(url).await {
            Ok(entry) => entry.map(|e| e.prefix),
            Err(e) => {
                warn!("Blacklist lookup failed for {}: {}", url, e);
                None
            }
        }
    }

    /// Count a transport failure. Codes that are not block-worthy are ignored.
    pub async fn record_failure(&self, url: &Url, error_code: &str) {
        if !is_block_worthy(error_code) {
            return;
        }
        match self
            .repo
            .record_failure(&url_prefixes(url), error_code)
            .await
        {
            Ok(Some(prefix)) => debug!("Recorded {} failure against {}", error_code, prefix),
            Ok(None) => {}
            Err(e) => warn!("Failed to record blacklist failure for {}: {}", url, e),
        }
    }

    /// Forget every prefix of a URL that just downloaded successfully.
    pub async fn clear_success(&self, url: &Url) {
        match self.repo.clear(&url_prefixes(url)).await {
            Ok(0) => {}
            Ok(n) => info!("Cleared {} blacklist entries for {}", n, url),
            Err(e) => warn!("Failed to clear blacklist entries for {}: {}", url, e),
        }
    }

    /// Every tracked prefix, most failures first.
    pub async fn entries(&self) -> Result<Vec<BlacklistEntry>, BlacklistError> {
        Ok(self.repo.get_all().await?)
    }

    async fn try_blocked(&self, url: &Url) -> Result<Option<BlacklistEntry>, BlacklistError> {
        Ok(self
            .repo
            .find_blocked(&url_prefixes(url), self.threshold)
            .await?)
    }
}
