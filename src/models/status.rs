//! Archival outcome statuses.
//!
//! Each status carries a fixed numeric id. Ids below 10 are "ok", ids in the
//! 10s are broken links, and ids of 20 and above are ambiguous (the archiver
//! could not tell whether the link works). Higher ids are more severe when
//! summarising several resources.

use serde::{Deserialize, Serialize};

/// Outcome of a single archival attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArchivalStatus {
    Archived,
    ContentUnchanged,
    UrlInvalid,
    RequestFailed,
    DownloadError,
    ChoseNotToDownload,
    DownloadFailure,
    SystemError,
}

impl ArchivalStatus {
    /// Every status, in id order.
    pub const ALL: [ArchivalStatus; 8] = [
        Self::Archived,
        Self::ContentUnchanged,
        Self::UrlInvalid,
        Self::RequestFailed,
        Self::DownloadError,
        Self::ChoseNotToDownload,
        Self::DownloadFailure,
        Self::SystemError,
    ];

    pub fn id(&self) -> i32 {
        match self {
            Self::Archived => 0,
            Self::ContentUnchanged => 1,
            Self::UrlInvalid => 10,
            Self::RequestFailed => 11,
            Self::DownloadError => 12,
            Self::ChoseNotToDownload => 21,
            Self::DownloadFailure => 22,
            Self::SystemError => 23,
        }
    }

    pub fn from_id(id: i32) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.id() == id)
    }

    /// Human-readable status text, as shown in reports.
    pub fn text(&self) -> &'static str {
        match self {
            Self::Archived => "Archived successfully",
            Self::ContentUnchanged => "Content has not changed",
            Self::UrlInvalid => "URL invalid",
            Self::RequestFailed => "URL request failed",
            Self::DownloadError => "Download error",
            Self::ChoseNotToDownload => "Chose not to download",
            Self::DownloadFailure => "Download failure",
            Self::SystemError => "System error during archival",
        }
    }

    pub fn from_text(text: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.text() == text)
    }

    /// Tri-state broken flag derived from the id.
    ///
    /// `Some(false)` means the link works, `Some(true)` means it is broken and
    /// `None` means the outcome says nothing either way.
    pub fn is_broken(&self) -> Option<bool> {
        match self.id() {
            id if id < 10 => Some(false),
            id if id < 20 => Some(true),
            _ => None,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.is_broken() == Some(false)
    }
}

impl std::fmt::Display for ArchivalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_round_trip() {
        for status in ArchivalStatus::ALL {
            assert_eq!(ArchivalStatus::from_id(status.id()), Some(status));
            assert_eq!(ArchivalStatus::from_text(status.text()), Some(status));
        }
        assert_eq!(ArchivalStatus::from_id(2), None);
        assert_eq!(ArchivalStatus::from_text("Unknown"), None);
    }

    #[test]
    fn test_broken_classification() {
        assert_eq!(ArchivalStatus::Archived.is_broken(), Some(false));
        assert_eq!(ArchivalStatus::ContentUnchanged.is_broken(), Some(false));
        assert_eq!(ArchivalStatus::UrlInvalid.is_broken(), Some(true));
        assert_eq!(ArchivalStatus::RequestFailed.is_broken(), Some(true));
        assert_eq!(ArchivalStatus::DownloadError.is_broken(), Some(true));
        assert_eq!(ArchivalStatus::ChoseNotToDownload.is_broken(), None);
        assert_eq!(ArchivalStatus::DownloadFailure.is_broken(), None);
        assert_eq!(ArchivalStatus::SystemError.is_broken(), None);
    }

    #[test]
    fn test_is_ok() {
        assert!(ArchivalStatus::Archived.is_ok());
        assert!(ArchivalStatus::ContentUnchanged.is_ok());
        assert!(!ArchivalStatus::UrlInvalid.is_ok());
        assert!(!ArchivalStatus::SystemError.is_ok());
    }
}
