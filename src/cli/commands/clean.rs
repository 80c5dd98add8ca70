//! Ledger administration: clean-status, clean-cached, size-report.

use console::style;

use super::super::helpers::{confirm, db_context};
use crate::config::Settings;
use crate::utils::format_bytes;

pub async fn cmd_clean_status(settings: &Settings, yes: bool) -> anyhow::Result<()> {
    let ctx = db_context(settings)?;
    ctx.init_schema().await?;

    if !yes && !confirm("Delete every archival record?")? {
        println!("{} Aborted", style("!").yellow());
        return Ok(());
    }

    let deleted = ctx.archivals().delete_all().await?;
    println!("{} Deleted {} archival records", style("✓").green(), deleted);
    Ok(())
}

pub async fn cmd_clean_cached(settings: &Settings, yes: bool) -> anyhow::Result<()> {
    let ctx = db_context(settings)?;
    ctx.init_schema().await?;

    if !yes && !confirm("Forget the cached content of every archival?")? {
        println!("{} Aborted", style("!").yellow());
        return Ok(());
    }

    let cleared = ctx.archivals().clear_cached().await?;
    println!(
        "{} Cleared cached content from {} records",
        style("✓").green(),
        cleared
    );
    Ok(())
}

pub async fn cmd_size_report(settings: &Settings) -> anyhow::Result<()> {
    let ctx = db_context(settings)?;
    ctx.init_schema().await?;

    let bins = ctx.archivals().size_report().await?;
    let total_count: u64 = bins.iter().map(|b| b.count).sum();
    let total_bytes: u64 = bins.iter().map(|b| b.total_bytes).sum();

    println!("{}", style("Archived file sizes").bold());
    for bin in &bins {
        println!(
            "  {:<14} {:>8}  {:>10}",
            bin.label,
            bin.count,
            format_bytes(bin.total_bytes)
        );
    }
    println!(
        "  {:<14} {:>8}  {:>10}",
        style("Total").bold(),
        total_count,
        format_bytes(total_bytes)
    );
    Ok(())
}
