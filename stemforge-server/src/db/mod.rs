//! Database operations
//!
//! Row-level persistence for jobs, assets, and provider configs. All writes
//! are single-row statements keyed by ID; each job is written only by its own
//! orchestrator task so no intra-job write conflicts arise.

pub mod assets;
pub mod jobs;
pub mod provider_configs;

pub use stemforge_common::db::{init_database, init_memory_database};
