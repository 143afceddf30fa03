//! Progress reporting trait.
//!
//! The engine never prints. Front ends implement `ProgressCallback` to show
//! per-file outcomes as the run advances.

use crate::model::{FileItem, SyncJob};

/// Trait for receiving progress updates from a sync job.
///
/// All methods are called synchronously during job execution.
pub trait ProgressCallback: Send {
    /// Called when job execution starts.
    fn on_job_started(&self, job: &SyncJob);

    /// Called before the existence check of a file.
    fn on_file_started(&self, job: &SyncJob, file_index: usize, file: &FileItem);

    /// Called when a file is done (transferred, skipped, or failed).
    fn on_file_completed(&self, job: &SyncJob, file_index: usize, file: &FileItem);

    /// Called when every file has been processed.
    fn on_job_completed(&self, job: &SyncJob);
}
