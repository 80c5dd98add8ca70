//! Update command: archive datasets and resources.

use std::collections::BTreeMap;
use std::sync::Arc;

use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::mpsc;

use super::super::helpers::{archive_service, db_context, load_catalog, styled_status};
use crate::catalog::Catalog;
use crate::config::Settings;
use crate::models::ArchivalStatus;
use crate::services::{ArchiveEvent, ChannelListener};
use crate::work_queue::{ArchiveJob, JobDispatcher, JobOutput, LocalDispatcher};

/// Archive the given ids (or the whole catalog) and print a summary.
pub async fn cmd_update(
    settings: &Settings,
    ids: &[String],
    queue: &str,
    workers: usize,
) -> anyhow::Result<()> {
    let ctx = db_context(settings)?;
    ctx.init_schema().await?;

    let catalog = load_catalog(settings)?;
    let (event_tx, mut event_rx) = mpsc::channel::<ArchiveEvent>(64);
    let service = archive_service(settings, &ctx, catalog.clone())?
        .with_listener(Arc::new(ChannelListener::new(event_tx)));

    // Resolve ids into jobs and count resources for the progress bar.
    let mut jobs = Vec::new();
    let mut total = 0u64;
    if ids.is_empty() {
        for dataset in catalog.datasets() {
            total += dataset.resources.len() as u64;
            jobs.push(ArchiveJob::UpdateDataset {
                dataset_id: dataset.id.clone(),
            });
        }
    } else {
        for id in ids {
            if let Ok(dataset) = catalog.get_dataset(id).await {
                total += dataset.resources.len() as u64;
                jobs.push(ArchiveJob::UpdateDataset {
                    dataset_id: dataset.id,
                });
            } else if catalog.get_resource(id).await.is_ok() {
                total += 1;
                jobs.push(ArchiveJob::UpdateResource {
                    resource_id: id.clone(),
                });
            } else {
                println!("{} Not found in catalog: {}", style("!").yellow(), id);
            }
        }
    }

    if jobs.is_empty() {
        println!("{} Nothing to archive", style("!").yellow());
        return Ok(());
    }

    let progress = ProgressBar::new(total);
    progress.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {wide_msg}")?
            .progress_chars("#>-"),
    );

    let pb = progress.clone();
    let progress_task = tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            if let ArchiveEvent::Archived {
                resource_id,
                status,
                ..
            } = event
            {
                pb.inc(1);
                pb.set_message(format!("{}: {}", resource_id, status.text()));
            }
        }
    });

    let dispatcher = LocalDispatcher::new(Arc::new(service), workers);
    let mut handles = Vec::with_capacity(jobs.len());
    for job in jobs {
        handles.push(dispatcher.dispatch(job, queue).await?);
    }
    // Close the last sender so the progress task ends once jobs finish.
    drop(dispatcher);

    let mut by_status: BTreeMap<i32, (ArchivalStatus, usize)> = BTreeMap::new();
    let mut errors = 0usize;
    for handle in handles {
        let id = handle.id.clone();
        match handle.wait().await {
            Ok(JobOutput::Resource(outcome)) => {
                let entry = by_status.entry(outcome.status().id()).or_insert((outcome.status(), 0));
                entry.1 += 1;
            }
            Ok(JobOutput::Dataset(outcome)) => {
                for result in &outcome.outcomes {
                    let entry = by_status
                        .entry(result.status().id())
                        .or_insert((result.status(), 0));
                    entry.1 += 1;
                }
                for (resource_id, error) in &outcome.errors {
                    progress.println(format!("{} {}: {}", style("✗").red(), resource_id, error));
                    errors += 1;
                }
            }
            Err(e) => {
                progress.println(format!("{} {}: {}", style("✗").red(), id, e));
                errors += 1;
            }
        }
    }

    let _ = progress_task.await;
    progress.finish_and_clear();

    println!("{} Archival complete", style("✓").green());
    for (status, count) in by_status.values() {
        println!("  {:>6}  {}", count, styled_status(*status));
    }
    if errors > 0 {
        println!("  {:>6}  {}", errors, style("errors").red());
    }
    Ok(())
}
