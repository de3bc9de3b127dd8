//! CLI command handlers.

pub mod ask;
pub mod backfill;
pub mod import;
pub mod status;
