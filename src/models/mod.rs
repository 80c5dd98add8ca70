//! Domain models for the archiver.

mod archival;
mod blacklist;
mod resource;
mod status;

pub use archival::{aggregate, Archival, ArchivalAttempt, ArchivedContent, DatasetArchivalSummary};
pub use blacklist::BlacklistEntry;
pub use resource::{Dataset, Resource};
pub use status::ArchivalStatus;
