//! Persistent job database (SQLite via sqlx).
//!
//! Two tables: `groups` (one row per discovered channel) and `jobs` (one
//! row per remote file, unique on `remote_file_id`). Every state transition
//! is flushed before it is considered committed; byte checkpoints are
//! monotone at the SQL level.

pub mod db;
pub mod jobs;
pub mod types;


pub use db::JobStore;
pub use types::*;
