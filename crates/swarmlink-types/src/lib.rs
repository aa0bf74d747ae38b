//! Shared wire and domain types for Swarmlink.
//!
//! Everything that crosses the pub/sub channel lives here: the command
//! envelope, the diagnostic probe/response pair, shard health records, and
//! the long-running task model. This crate is pure data -- no IO, no
//! runtime dependencies.

pub mod config;
pub mod diag;
pub mod envelope;
pub mod task;
