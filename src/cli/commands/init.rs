//! Initialize command.

use console::style;

use super::super::helpers::db_context;
use crate::config::Settings;

/// Create the archive directory and database tables.
pub async fn cmd_init(settings: &Settings) -> anyhow::Result<()> {
    settings.ensure_directories()?;

    let ctx = db_context(settings)?;
    ctx.init_schema().await?;

    if settings.cache_url_root.is_none() {
        println!(
            "{} No cache_url_root configured; archiving will fail until it is set",
            style("!").yellow()
        );
    }
    if settings.catalog_path.is_none() {
        println!(
            "{} No catalog configured; set `catalog` in archiver.toml",
            style("!").yellow()
        );
    }

    println!(
        "{} Initialized archive in {}",
        style("✓").green(),
        settings.archive_dir()?.display()
    );
    Ok(())
}
