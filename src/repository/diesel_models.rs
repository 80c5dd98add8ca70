//! Diesel ORM models for database tables.

use diesel::prelude::*;

use crate::schema;

/// Archival ledger row.
#[derive(Queryable, Selectable, Identifiable, Debug, Clone)]
#[diesel(table_name = schema::archival)]
#[diesel(primary_key(resource_id))]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct ArchivalRecord {
    pub resource_id: String,
    pub dataset_id: String,
    pub status_id: i32,
    pub reason: Option<String>,
    pub url_redirected_to: Option<String>,
    pub content_path: Option<String>,
    pub content_address: Option<String>,
    pub size: Option<i64>,
    pub mime_type: Option<String>,
    pub content_hash: Option<String>,
    pub etag: Option<String>,
    pub last_modified: Option<String>,
    pub request_type: Option<String>,
    pub first_failure_at: Option<String>,
    pub last_success_at: Option<String>,
    pub consecutive_failures: i32,
    pub created_at: String,
    pub updated_at: String,
}

/// Archival row for insertion or replacement.
#[derive(Insertable, Debug)]
#[diesel(table_name = schema::archival)]
pub struct NewArchival<'a> {
    pub resource_id: &'a str,
    pub dataset_id: &'a str,
    pub status_id: i32,
    pub reason: Option<&'a str>,
    pub url_redirected_to: Option<&'a str>,
    pub content_path: Option<&'a str>,
    pub content_address: Option<&'a str>,
    pub size: Option<i64>,
    pub mime_type: Option<&'a str>,
    pub content_hash: Option<&'a str>,
    pub etag: Option<&'a str>,
    pub last_modified: Option<&'a str>,
    pub request_type: Option<&'a str>,
    pub first_failure_at: Option<String>,
    pub last_success_at: Option<String>,
    pub consecutive_failures: i32,
    pub created_at: String,
    pub updated_at: String,
}

/// Blacklist row.
#[derive(Queryable, Selectable, Identifiable, Debug, Clone)]
#[diesel(table_name = schema::url_blacklist)]
#[diesel(primary_key(prefix))]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct BlacklistRecord {
    pub prefix: String,
    pub failure_count: i32,
    pub last_error: String,
    pub updated_at: String,
}

/// New blacklist entry.
#[derive(Insertable, Debug)]
#[diesel(table_name = schema::url_blacklist)]
pub struct NewBlacklistEntry<'a> {
    pub prefix: &'a str,
    pub failure_count: i32,
    pub last_error: &'a str,
    pub updated_at: &'a str,
}
