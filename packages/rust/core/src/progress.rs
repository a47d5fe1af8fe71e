//! Progress reporting hooks for a discovery run.

use immoradar_crawler::ValidationOutcome;

use crate::report::DiscoveryReport;

/// Progress callback for discovery runs.
pub trait DiscoveryProgress: Send + Sync {
    /// Called when entering a new phase (`seeding`, `validating`).
    fn phase(&self, name: &str);
    /// Called when a task is handed to the validator.
    fn task_started(&self, domain: &str, pending: usize);
    /// Called when a task's outcome has been absorbed.
    fn task_finished(&self, outcome: &ValidationOutcome, completed: usize);
    /// Called when the run completes.
    fn done(&self, report: &DiscoveryReport);
}

/// A no-op progress reporter for headless/test use.
pub struct SilentProgress;

impl DiscoveryProgress for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn task_started(&self, _domain: &str, _pending: usize) {}
    fn task_finished(&self, _outcome: &ValidationOutcome, _completed: usize) {}
    fn done(&self, _report: &DiscoveryReport) {}
}
