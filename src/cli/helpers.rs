//! Shared helper functions for CLI commands.

use std::io::Write;
use std::sync::Arc;

use console::{style, StyledObject};

use crate::catalog::{Catalog, JsonCatalog};
use crate::config::Settings;
use crate::http_client::HttpClient;
use crate::models::ArchivalStatus;
use crate::repository::DbContext;
use crate::services::{ArchiveService, BlacklistTracker, Downloader};
use crate::storage::ContentStore;

/// Open the ledger database named by the settings.
pub fn db_context(settings: &Settings) -> anyhow::Result<DbContext> {
    Ok(DbContext::from_url(&settings.database_url()?))
}

/// Load the configured JSON catalog.
pub fn load_catalog(settings: &Settings) -> anyhow::Result<Arc<JsonCatalog>> {
    Ok(Arc::new(JsonCatalog::load(settings.catalog_path()?)?))
}

/// Wire up the archive pipeline from settings.
pub fn archive_service(
    settings: &Settings,
    ctx: &DbContext,
    catalog: Arc<dyn Catalog>,
) -> anyhow::Result<ArchiveService> {
    settings.validate()?;
    let archive_dir = settings.archive_dir()?.to_path_buf();

    let http = HttpClient::new(&settings.http_settings())?;
    let downloader = Downloader::new(http, settings.max_content_length)
        .with_blacklist(BlacklistTracker::new(ctx.blacklist()))
        .with_temp_dir(archive_dir.clone());
    let store = ContentStore::new(archive_dir, settings.cache_url_root.clone());

    Ok(
        ArchiveService::new(catalog, ctx.archivals(), downloader, store)
            .with_debug(settings.debug),
    )
}

/// Colour a status by how healthy it is.
pub fn styled_status(status: ArchivalStatus) -> StyledObject<&'static str> {
    match status.is_broken() {
        Some(false) => style(status.text()).green(),
        Some(true) => style(status.text()).red(),
        None => style(status.text()).yellow(),
    }
}

/// Ask for a yes/no confirmation on stdin.
pub fn confirm(prompt: &str) -> anyhow::Result<bool> {
    print!("{} [y/N] ", prompt);
    std::io::stdout().flush()?;
    let mut answer = String::new();
    std::io::stdin().read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
}
