//! Repository layer for database persistence.
//!
//! All database access uses Diesel ORM over SQLite with compile-time query
//! checking.

pub mod diesel_archival;
pub mod diesel_blacklist;
pub mod diesel_context;
pub mod diesel_models;
pub mod diesel_pool;
pub mod util;

pub use diesel_archival::{bin_sizes, DieselArchivalRepository, LedgerStats, SizeBin};
pub use diesel_blacklist::DieselBlacklistRepository;
pub use diesel_context::DbContext;
pub use diesel_pool::{AsyncSqlitePool, DieselError};
pub use util::{parse_datetime, parse_datetime_opt, to_diesel_error};
