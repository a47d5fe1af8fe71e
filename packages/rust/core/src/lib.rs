//! Discovery orchestration for ImmoRadar.
//!
//! This crate ties the seed providers, the frontier and the validator into
//! end-to-end discovery runs ([`Orchestrator::run`]) and keeps the trusted
//! seed websites registered ([`register_seed_websites`]).

pub mod orchestrator;
pub mod progress;
pub mod registry;
pub mod report;
pub mod seeding;

#[cfg(test)]
mod testing;

pub use orchestrator::Orchestrator;
pub use progress::{DiscoveryProgress, SilentProgress};
pub use registry::{SEED_SITES, SeedReport, register_seed_websites};
pub use report::DiscoveryReport;
pub use seeding::{GENERIC_QUERIES, region_query};
