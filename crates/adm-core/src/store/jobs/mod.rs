//! Job and group queries, split into read and write halves.

pub mod read;
pub mod write;
