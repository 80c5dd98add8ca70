//! Diesel-backed storage for blacklisted URL prefixes.
//!
//! Counters are only ever changed with `failure_count = failure_count + 1`
//! in SQL, so concurrent workers failing against the same prefix never lose
//! an increment.

use chrono::Utc;
use diesel::prelude::*;
use diesel_async::{AsyncConnection, RunQueryDsl};

use super::diesel_models::{BlacklistRecord, NewBlacklistEntry};
use super::diesel_pool::{AsyncSqlitePool, DieselError};
use super::util::parse_datetime;
use crate::models::BlacklistEntry;
use crate::schema::url_blacklist;

impl From<BlacklistRecord> for BlacklistEntry {
    fn from(record: BlacklistRecord) -> Self {
        BlacklistEntry {
            prefix: record.prefix,
            failure_count: record.failure_count.max(0) as u32,
            last_error: record.last_error,
            updated_at: parse_datetime(&record.updated_at),
        }
    }
}

/// Diesel-based blacklist repository.
#[derive(Clone)]
pub struct DieselBlacklistRepository {
    pool: AsyncSqlitePool,
}

impl DieselBlacklistRepository {
    pub fn new(pool: AsyncSqlitePool) -> Self {
        Self { pool }
    }

    /// Get a single entry.
    pub async fn get(&self, prefix: &str) -> Result<Option<BlacklistEntry>, DieselError> {
        let mut conn = self.pool.get().await?;

        url_blacklist::table
            .find(prefix)
            .first::<BlacklistRecord>(&mut conn)
            .await
            .optional()
            .map(|opt| opt.map(BlacklistEntry::from))
    }

    /// All entries, most failures first.
    pub async fn get_all(&self) -> Result<Vec<BlacklistEntry>, DieselError> {
        let mut conn = self.pool.get().await?;

        url_blacklist::table
            .order(url_blacklist::failure_count.desc())
            .load::<BlacklistRecord>(&mut conn)
            .await
            .map(|records| records.into_iter().map(BlacklistEntry::from).collect())
    }

    /// First of `prefixes` whose count has reached `threshold`.
    pub async fn find_blocked(
        &self,
        prefixes: &[String],
        threshold: u32,
    ) -> Result<Option<BlacklistEntry>, DieselError> {
        if prefixes.is_empty() {
            return Ok(None);
        }
        let mut conn = self.pool.get().await?;
        let threshold = i32::try_from(threshold).unwrap_or(i32::MAX);

        url_blacklist::table
            .filter(url_blacklist::prefix.eq_any(prefixes))
            .filter(url_blacklist::failure_count.ge(threshold))
            .first::<BlacklistRecord>(&mut conn)
            .await
            .optional()
            .map(|opt| opt.map(BlacklistEntry::from))
    }

    /// Count a failure against the closest existing prefix.
    ///
    /// `prefixes` runs coarsest to finest. The finest prefix that already has
    /// an entry is incremented; when none exists, the finest prefix is
    /// inserted with a count of one. Returns the prefix that was charged.
    pub async fn record_failure(
        &self,
        prefixes: &[String],
        error_code: &str,
    ) -> Result<Option<String>, DieselError> {
        let Some(finest) = prefixes.last().cloned() else {
            return Ok(None);
        };
        let prefixes = prefixes.to_vec();
        let error_code = error_code.to_string();
        let now = Utc::now().to_rfc3339();
        let mut conn = self.pool.get().await?;

        conn.transaction(move |conn| {
            Box::pin(async move {
                for prefix in prefixes.iter().rev() {
                    let rows = diesel::update(url_blacklist::table.find(prefix))
                        .set((
                            url_blacklist::failure_count.eq(url_blacklist::failure_count + 1),
                            url_blacklist::last_error.eq(&error_code),
                            url_blacklist::updated_at.eq(&now),
                        ))
                        .execute(conn)
                        .await?;
                    if rows > 0 {
                        return Ok(Some(prefix.clone()));
                    }
                }

                // A concurrent worker may have inserted the same prefix since
                // the walk above, so the insert also increments on conflict.
                diesel::insert_into(url_blacklist::table)
                    .values(NewBlacklistEntry {
                        prefix: &finest,
                        failure_count: 1,
                        last_error: &error_code,
                        updated_at: &now,
                    })
                    .on_conflict(url_blacklist::prefix)
                    .do_update()
                    .set((
                        url_blacklist::failure_count.eq(url_blacklist::failure_count + 1),
                        url_blacklist::last_error.eq(&error_code),
                        url_blacklist::updated_at.eq(&now),
                    ))
                    .execute(conn)
                    .await?;

                Ok(Some(finest))
            })
        })
        .await
    }

    /// Remove every entry for the given prefixes.
    pub async fn clear(&self, prefixes: &[String]) -> Result<usize, DieselError> {
        if prefixes.is_empty() {
            return Ok(0);
        }
        let mut conn = self.pool.get().await?;

        diesel::delete(url_blacklist::table.filter(url_blacklist::prefix.eq_any(prefixes)))
            .execute(&mut conn)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::DbContext;
    use tempfile::tempdir;

    async fn setup_test_db() -> (DieselBlacklistRepository, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let ctx = DbContext::new(&dir.path().join("test.db"));
        ctx.init_schema().await.unwrap();
        (ctx.blacklist(), dir)
    }

    fn prefixes(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_first_failure_inserts_finest_prefix() {
        let (repo, _dir) = setup_test_db().await;
        let p = prefixes(&["http://a.com", "http://a.com/x", "http://a.com/x/f.csv"]);

        let charged = repo.record_failure(&p, "timeout").await.unwrap();
        assert_eq!(charged.as_deref(), Some("http://a.com/x/f.csv"));

        let entry = repo.get("http://a.com/x/f.csv").await.unwrap().unwrap();
        assert_eq!(entry.failure_count, 1);
        assert_eq!(entry.last_error, "timeout");
        assert!(repo.get("http://a.com").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_existing_ancestor_is_incremented() {
        let (repo, _dir) = setup_test_db().await;

        repo.record_failure(&prefixes(&["http://a.com"]), "connect")
            .await
            .unwrap();
        let charged = repo
            .record_failure(&prefixes(&["http://a.com", "http://a.com/other"]), "dns")
            .await
            .unwrap();

        assert_eq!(charged.as_deref(), Some("http://a.com"));
        let entry = repo.get("http://a.com").await.unwrap().unwrap();
        assert_eq!(entry.failure_count, 2);
        assert_eq!(entry.last_error, "dns");
        assert!(repo.get("http://a.com/other").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_find_blocked_and_clear() {
        let (repo, _dir) = setup_test_db().await;
        let p = prefixes(&["http://a.com", "http://a.com/f"]);

        for _ in 0..4 {
            repo.record_failure(&p, "timeout").await.unwrap();
        }
        assert!(repo.find_blocked(&p, 5).await.unwrap().is_none());

        repo.record_failure(&p, "timeout").await.unwrap();
        let blocked = repo.find_blocked(&p, 5).await.unwrap().unwrap();
        assert_eq!(blocked.prefix, "http://a.com/f");
        assert_eq!(repo.get_all().await.unwrap().len(), 1);

        assert_eq!(repo.clear(&p).await.unwrap(), 1);
        assert!(repo.find_blocked(&p, 5).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_concurrent_failures_are_not_lost() {
        let (repo, _dir) = setup_test_db().await;
        let p = prefixes(&["http://a.com"]);

        let mut handles = Vec::new();
        for _ in 0..8 {
            let repo = repo.clone();
            let p = p.clone();
            handles.push(tokio::spawn(async move {
                repo.record_failure(&p, "timeout").await.unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let entry = repo.get("http://a.com").await.unwrap().unwrap();
        assert_eq!(entry.failure_count, 8);
    }
}
