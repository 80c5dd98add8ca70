//! Archiver - resource archival for open-data catalogs.
//!
//! Downloads every resource a catalog links to, stores a content-addressed
//! copy, and keeps a ledger of each attempt so broken links can be reported.

pub mod catalog;
pub mod cli;
pub mod config;
pub mod http_client;
pub mod models;
pub mod repository;
pub mod schema;
pub mod services;
pub mod storage;
pub mod utils;
pub mod work_queue;
