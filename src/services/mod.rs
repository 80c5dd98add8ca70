//! Service layer for archiver business logic.
//!
//! This module contains domain logic separated from UI concerns.
//! Services are driven by the CLI and the job dispatcher.

pub mod archive;
pub mod blacklist;
pub mod download;
pub mod fallback;
pub mod link_check;

pub use archive::{
    status_for_error, ArchiveError, ArchiveEvent, ArchiveListener, ArchiveOutcome,
    ArchiveService, ChannelListener, DatasetOutcome,
};
pub use blacklist::{BlacklistError, BlacklistTracker, BLACKLIST_THRESHOLD};
pub use download::{
    DownloadError, DownloadResult, Downloader, RequestStyle, TransportKind,
    DEFAULT_MAX_CONTENT_LENGTH,
};
pub use fallback::{ApiFallbackProber, ApiRequest};
pub use link_check::{check_link, LinkCheckError};
