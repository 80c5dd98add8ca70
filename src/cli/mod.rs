//! Command-line interface for the archiver.

mod commands;
pub mod helpers;

pub use commands::{is_verbose, run};
