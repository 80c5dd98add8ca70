//! Notifications emitted after ledger writes.

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::mpsc;

use crate::models::ArchivalStatus;

/// Events delivered to every registered listener.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum ArchiveEvent {
    /// A resource's archival record was written.
    Archived {
        resource_id: String,
        queue: String,
        content_path: Option<String>,
        status: ArchivalStatus,
    },
    /// At least one resource of a dataset archived successfully.
    DatasetArchived { dataset_id: String, queue: String },
}

/// Receiver of archive events. Delivery order between listeners is not
/// defined.
#[async_trait]
pub trait ArchiveListener: Send + Sync {
    async fn notify(&self, event: &ArchiveEvent);

    /// Listeners that refresh the catalog's search index themselves return
    /// true, and the archiver then skips its own reindex.
    fn reindexes_datasets(&self) -> bool {
        false
    }
}

/// Forwards events into a channel, e.g. for progress display.
pub struct ChannelListener {
    tx: mpsc::Sender<ArchiveEvent>,
}

impl ChannelListener {
    pub fn new(tx: mpsc::Sender<ArchiveEvent>) -> Self {
        Self { tx }
    }
}

#[async_trait]
impl ArchiveListener for ChannelListener {
    async fn notify(&self, event: &ArchiveEvent) {
        let _ = self.tx.send(event.clone()).await;
    }
}
