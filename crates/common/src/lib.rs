// catsync-common: shared types and pure helpers for the catsync workspace

pub mod classify;
pub mod error;
pub mod redact;
pub mod remote;
pub mod types;
