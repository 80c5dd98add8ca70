//! View command: archival status per dataset, or ledger totals.

use console::style;

use super::super::helpers::{db_context, load_catalog, styled_status};
use crate::catalog::Catalog;
use crate::config::Settings;
use crate::models::aggregate;
use crate::services::BlacklistTracker;

pub async fn cmd_view(settings: &Settings, dataset: Option<&str>) -> anyhow::Result<()> {
    let ctx = db_context(settings)?;
    ctx.init_schema().await?;
    let archivals = ctx.archivals();

    let Some(dataset_ref) = dataset else {
        let stats = archivals.stats().await?;
        println!("{}", style("Archival ledger").bold());
        println!("  Records:           {}", stats.total);
        println!("  With cached copy:  {}", stats.with_content_address);
        match stats.latest_update {
            Some(at) => println!("  Last update:       {}", at.format("%Y-%m-%d %H:%M:%S UTC")),
            None => println!("  Last update:       never"),
        }

        let tracker = BlacklistTracker::new(ctx.blacklist());
        let entries = tracker.entries().await?;
        let blocked = entries
            .iter()
            .filter(|e| e.failure_count >= tracker.threshold())
            .count();
        println!("  Blacklisted URLs:  {} ({} tracked)", blocked, entries.len());
        return Ok(());
    };

    let catalog = load_catalog(settings)?;
    let dataset = catalog.get_dataset(dataset_ref).await?;
    let records = archivals.get_for_dataset(&dataset.id).await?;

    println!("{} ({})", style(dataset.display_name()).bold(), dataset.id);
    match aggregate(&records) {
        Some(summary) => println!(
            "  Overall: {}{}",
            styled_status(summary.status),
            summary
                .reason
                .map(|r| format!(" - {}", r))
                .unwrap_or_default()
        ),
        None => println!("  {}", style("Not archived yet").dim()),
    }

    for resource in &dataset.resources {
        println!();
        println!("  {} {}", style(&resource.id).cyan(), resource.url);
        let Some(record) = records.iter().find(|r| r.resource_id == resource.id) else {
            println!("    {}", style("no archival").dim());
            continue;
        };
        println!("    Status:   {}", styled_status(record.status));
        if let Some(ref reason) = record.reason {
            println!("    Reason:   {}", reason);
        }
        if let Some(ref redirect) = record.url_redirected_to {
            println!("    Redirect: {}", redirect);
        }
        if let Some(ref address) = record.content_address {
            println!("    Cached:   {}", address);
        }
        if record.consecutive_failures > 0 {
            println!(
                "    Failing:  {} attempts since {}",
                record.consecutive_failures,
                record
                    .first_failure_at
                    .map(|t| t.format("%Y-%m-%d").to_string())
                    .unwrap_or_default()
            );
        }
        println!(
            "    Updated:  {}",
            record.updated_at.format("%Y-%m-%d %H:%M:%S UTC")
        );
    }
    Ok(())
}
