//! Diesel-based archival ledger for SQLite.
//!
//! One row per resource. Every pipeline run ends in a single
//! [`DieselArchivalRepository::save_attempt`] call, which reads the previous
//! row, folds the attempt into it and writes it back inside one transaction.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_async::{AsyncConnection, RunQueryDsl};

use super::diesel_models::{ArchivalRecord, NewArchival};
use super::diesel_pool::{AsyncSqliteConnection, AsyncSqlitePool, DieselError};
use super::util::{parse_datetime, parse_datetime_opt};
use crate::models::{Archival, ArchivalAttempt, ArchivalStatus};
use crate::schema::archival;

/// Convert a database record to a domain model.
impl From<ArchivalRecord> for Archival {
    fn from(record: ArchivalRecord) -> Self {
        Archival {
            resource_id: record.resource_id,
            dataset_id: record.dataset_id,
            status: ArchivalStatus::from_id(record.status_id)
                .unwrap_or(ArchivalStatus::DownloadFailure),
            reason: record.reason,
            url_redirected_to: record.url_redirected_to,
            content_path: record.content_path,
            content_address: record.content_address,
            size: record.size.map(|s| s.max(0) as u64),
            mime_type: record.mime_type,
            content_hash: record.content_hash,
            etag: record.etag,
            last_modified: record.last_modified,
            request_type: record.request_type,
            first_failure_at: parse_datetime_opt(record.first_failure_at),
            last_success_at: parse_datetime_opt(record.last_success_at),
            consecutive_failures: record.consecutive_failures.max(0) as u32,
            created_at: parse_datetime(&record.created_at),
            updated_at: parse_datetime(&record.updated_at),
        }
    }
}

/// Aggregate ledger counts for reporting.
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerStats {
    pub total: u64,
    pub with_content_address: u64,
    pub latest_update: Option<DateTime<Utc>>,
}

/// One row of the stored-size histogram.
#[derive(Debug, Clone, PartialEq)]
pub struct SizeBin {
    pub label: &'static str,
    pub count: u64,
    pub total_bytes: u64,
}

const KB: u64 = 1024;
const MB: u64 = 1024 * KB;
const GB: u64 = 1024 * MB;

/// Upper bounds (inclusive) and labels of the size histogram.
const SIZE_BINS: [(u64, &str); 10] = [
    (KB, "<1 KB"),
    (10 * KB, "1-10 KB"),
    (100 * KB, "10-100 KB"),
    (MB, "100 KB - 1 MB"),
    (10 * MB, "1-10 MB"),
    (100 * MB, "10-100 MB"),
    (GB, "100 MB - 1 GB"),
    (10 * GB, "1-10 GB"),
    (100 * GB, "10-100 GB"),
    (u64::MAX, ">100 GB"),
];

/// Bucket sizes into the fixed histogram. Zero-byte entries are ignored.
pub fn bin_sizes(sizes: impl IntoIterator<Item = u64>) -> Vec<SizeBin> {
    let mut bins: Vec<SizeBin> = SIZE_BINS
        .iter()
        .map(|(_, label)| SizeBin {
            label: *label,
            count: 0,
            total_bytes: 0,
        })
        .collect();

    for size in sizes.into_iter().filter(|s| *s > 0) {
        if let Some(idx) = SIZE_BINS.iter().position(|(upper, _)| size <= *upper) {
            bins[idx].count += 1;
            bins[idx].total_bytes = bins[idx].total_bytes.saturating_add(size);
        }
    }
    bins
}

/// Diesel-based archival repository.
#[derive(Clone)]
pub struct DieselArchivalRepository {
    pool: AsyncSqlitePool,
}

impl DieselArchivalRepository {
    /// Create a new repository with an existing pool.
    pub fn new(pool: AsyncSqlitePool) -> Self {
        Self { pool }
    }

    /// Get the archival for a resource, if it has ever been attempted.
    pub async fn get_for_resource(&self, resource_id: &str) -> Result<Option<Archival>, DieselError> {
        let mut conn = self.pool.get().await?;

        archival::table
            .find(resource_id)
            .first::<ArchivalRecord>(&mut conn)
            .await
            .optional()
            .map(|opt| opt.map(Archival::from))
    }

    /// Get all archivals belonging to a dataset.
    pub async fn get_for_dataset(&self, dataset_id: &str) -> Result<Vec<Archival>, DieselError> {
        let mut conn = self.pool.get().await?;

        archival::table
            .filter(archival::dataset_id.eq(dataset_id))
            .order(archival::resource_id.asc())
            .load::<ArchivalRecord>(&mut conn)
            .await
            .map(|records| records.into_iter().map(Archival::from).collect())
    }

    /// Record the outcome of one pipeline run.
    ///
    /// Read, fold and write happen in one transaction so the streak counters
    /// are never computed from a stale row.
    pub async fn save_attempt(&self, attempt: ArchivalAttempt) -> Result<Archival, DieselError> {
        let mut conn = self.pool.get().await?;
        let now = Utc::now();

        conn.transaction(move |conn| {
            Box::pin(async move {
                // Write first so SQLite takes the write lock before the read;
                // a read-then-upgrade can fail with a stale WAL snapshot.
                diesel::update(archival::table.find(attempt.resource_id.as_str()))
                    .set(archival::resource_id.eq(archival::resource_id))
                    .execute(conn)
                    .await?;

                let previous = archival::table
                    .find(attempt.resource_id.as_str())
                    .first::<ArchivalRecord>(conn)
                    .await
                    .optional()?
                    .map(Archival::from);

                let record = Archival::apply_attempt(previous, attempt, now);
                Self::write(conn, &record).await?;
                Ok(record)
            })
        })
        .await
    }

    async fn write(conn: &mut AsyncSqliteConnection, record: &Archival) -> Result<(), DieselError> {
        let size = record.size.map(|s| i64::try_from(s).unwrap_or(i64::MAX));
        let consecutive_failures = i32::try_from(record.consecutive_failures).unwrap_or(i32::MAX);

        diesel::replace_into(archival::table)
            .values(NewArchival {
                resource_id: &record.resource_id,
                dataset_id: &record.dataset_id,
                status_id: record.status.id(),
                reason: record.reason.as_deref(),
                url_redirected_to: record.url_redirected_to.as_deref(),
                content_path: record.content_path.as_deref(),
                content_address: record.content_address.as_deref(),
                size,
                mime_type: record.mime_type.as_deref(),
                content_hash: record.content_hash.as_deref(),
                etag: record.etag.as_deref(),
                last_modified: record.last_modified.as_deref(),
                request_type: record.request_type.as_deref(),
                first_failure_at: record.first_failure_at.map(|dt| dt.to_rfc3339()),
                last_success_at: record.last_success_at.map(|dt| dt.to_rfc3339()),
                consecutive_failures,
                created_at: record.created_at.to_rfc3339(),
                updated_at: record.updated_at.to_rfc3339(),
            })
            .execute(conn)
            .await?;

        Ok(())
    }

    /// Delete every archival record.
    pub async fn delete_all(&self) -> Result<usize, DieselError> {
        let mut conn = self.pool.get().await?;
        diesel::delete(archival::table).execute(&mut conn).await
    }

    /// Forget stored content for every record that has some.
    ///
    /// Status and failure history are left alone.
    pub async fn clear_cached(&self) -> Result<usize, DieselError> {
        let mut conn = self.pool.get().await?;

        diesel::update(archival::table.filter(archival::content_address.is_not_null()))
            .set((
                archival::content_path.eq(None::<String>),
                archival::content_address.eq(None::<String>),
                archival::size.eq(None::<i64>),
                archival::mime_type.eq(None::<String>),
                archival::content_hash.eq(None::<String>),
            ))
            .execute(&mut conn)
            .await
    }

    /// Summary counts for the `view` report.
    pub async fn stats(&self) -> Result<LedgerStats, DieselError> {
        let mut conn = self.pool.get().await?;

        use diesel::dsl::{count_star, max};
        let total: i64 = archival::table
            .select(count_star())
            .first(&mut conn)
            .await?;
        let with_content_address: i64 = archival::table
            .filter(archival::content_address.is_not_null())
            .select(count_star())
            .first(&mut conn)
            .await?;
        let latest: Option<String> = archival::table
            .select(max(archival::updated_at))
            .first(&mut conn)
            .await?;

        Ok(LedgerStats {
            total: total.max(0) as u64,
            with_content_address: with_content_address.max(0) as u64,
            latest_update: parse_datetime_opt(latest),
        })
    }

    /// Histogram of stored content sizes.
    pub async fn size_report(&self) -> Result<Vec<SizeBin>, DieselError> {
        let mut conn = self.pool.get().await?;

        let sizes: Vec<Option<i64>> = archival::table
            .filter(archival::content_path.is_not_null())
            .select(archival::size)
            .load(&mut conn)
            .await?;

        Ok(bin_sizes(sizes.into_iter().flatten().map(|s| s.max(0) as u64)))
    }
}
