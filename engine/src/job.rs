//! Job orchestration module.
//!
//! This module provides the sync job lifecycle:
//! - Creating a job (pre-flight check of the source root)
//! - Planning a job (enumerating the source tree)
//! - Running a job (existence check and upload of every file)
//!
//! [`sync`] chains all three and returns the run summary.

use std::path::Path;

use chrono::Utc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{EngineError, TransferError};
use crate::fs_ops;
use crate::model::{FileItem, FileState, JobState, RunSummary, SyncJob};
use crate::progress::ProgressCallback;
use crate::store::DestinationStore;

/// Result of processing one file.
enum Transfer {
    AlreadyPresent,
    Stored(u64),
}

fn transfer_file(file: &FileItem, store: &dyn DestinationStore) -> Result<Transfer, TransferError> {
    if store.exists(&file.key)? {
        return Ok(Transfer::AlreadyPresent);
    }
    let mut source = fs_ops::open_source(&file.source_path)?;
    let bytes = store.write(&file.key, &mut source)?;
    Ok(Transfer::Stored(bytes))
}

/// Create a new sync job.
///
/// Validates that the source root exists and is a directory. Nothing is sent
/// to the destination.
///
/// # Errors
/// Returns EngineError if the source root is missing or not a directory
pub fn create_job<P: AsRef<Path>>(source_root: P, backend_name: &str) -> Result<SyncJob, EngineError> {
    let source_root = source_root.as_ref();

    match std::fs::metadata(source_root) {
        Ok(metadata) => {
            if !metadata.is_dir() {
                return Err(EngineError::InvalidPath {
                    path: source_root.to_path_buf(),
                    reason: "Source must be a directory".to_string(),
                });
            }
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(EngineError::SourceNotFound {
                path: source_root.to_path_buf(),
            });
        }
        Err(e) => {
            return Err(EngineError::SourceAccessDenied {
                path: source_root.to_path_buf(),
                source: e,
            });
        }
    }

    Ok(SyncJob {
        id: Uuid::new_v4(),
        source_root: source_root.to_path_buf(),
        backend_name: backend_name.to_string(),
        files: Vec::new(),
        state: JobState::Pending,
        total_bytes_planned: 0,
        total_bytes_transferred: 0,
        current_file_index: None,
        created_at: Utc::now(),
        started_at: None,
        finished_at: None,
    })
}

/// Plan a job by enumerating the source tree.
///
/// Populates job.files in depth-first order and calculates
/// job.total_bytes_planned.
///
/// # Errors
/// Returns EngineError if the job is not Pending or the root cannot be listed
pub fn plan_job(job: &mut SyncJob) -> Result<(), EngineError> {
    if job.state != JobState::Pending {
        return Err(EngineError::JobNotPending {
            operation: "plan",
            state: job.state,
        });
    }

    job.files = fs_ops::enumerate_tree(&job.source_root)?;
    job.total_bytes_planned = job.files.iter().map(|f| f.file_size).sum();

    debug!(
        job_id = %job.id,
        files = job.files.len(),
        bytes = job.total_bytes_planned,
        "planned sync"
    );
    Ok(())
}

/// Run a job against a destination store.
///
/// Each file is attempted exactly once: present at the destination means
/// Skipped, otherwise it is uploaded. A failure is recorded on the file and
/// the run moves on to the next one.
///
/// # Errors
/// Returns EngineError only if the job is not Pending.
pub fn run_job(
    job: &mut SyncJob,
    store: &dyn DestinationStore,
    progress_callback: Option<&dyn ProgressCallback>,
) -> Result<(), EngineError> {
    if job.state != JobState::Pending {
        return Err(EngineError::JobNotPending {
            operation: "run",
            state: job.state,
        });
    }

    job.state = JobState::Running;
    job.started_at = Some(Utc::now());
    info!(
        job_id = %job.id,
        source = %job.source_root.display(),
        backend = store.name(),
        files = job.files.len(),
        "sync started"
    );

    if let Some(callback) = progress_callback {
        callback.on_job_started(job);
    }

    for file_index in 0..job.files.len() {
        job.current_file_index = Some(file_index);

        // Entries settled during planning are reported, never attempted.
        if job.files[file_index].state.is_terminal() {
            if let Some(callback) = progress_callback {
                callback.on_file_completed(job, file_index, &job.files[file_index]);
            }
            continue;
        }

        if let Some(callback) = progress_callback {
            callback.on_file_started(job, file_index, &job.files[file_index]);
        }

        job.files[file_index].state = FileState::Uploading;
        let outcome = transfer_file(&job.files[file_index], store);

        let file = &mut job.files[file_index];
        match outcome {
            Ok(Transfer::AlreadyPresent) => {
                file.state = FileState::Skipped;
                debug!(key = %file.key, "skipped, already present");
            }
            Ok(Transfer::Stored(bytes)) => {
                file.state = FileState::Transferred;
                file.bytes_transferred = bytes;
                job.total_bytes_transferred += bytes;
                info!(key = %file.key, bytes, "uploaded");
            }
            Err(e) => {
                file.state = FileState::Failed;
                file.error_message = Some(e.to_string());
                warn!(key = %file.key, error = %e, "upload failed");
            }
        }

        if let Some(callback) = progress_callback {
            callback.on_file_completed(job, file_index, &job.files[file_index]);
        }
    }

    job.state = JobState::Completed;
    job.finished_at = Some(Utc::now());
    job.current_file_index = None;

    let summary = RunSummary::from_job(job);
    info!(
        job_id = %job.id,
        transferred = summary.transferred,
        skipped = summary.skipped,
        failed = summary.failed,
        "sync finished"
    );

    if let Some(callback) = progress_callback {
        callback.on_job_completed(job);
    }

    Ok(())
}

/// Replicate every file under `source_root` into `destination`.
///
/// # Errors
/// Returns EngineError, with no destination call made, when the source root
/// is missing or cannot be listed. Per-file failures are in the summary.
pub fn sync<P: AsRef<Path>>(
    source_root: P,
    destination: &dyn DestinationStore,
    progress_callback: Option<&dyn ProgressCallback>,
) -> Result<RunSummary, EngineError> {
    let mut job = create_job(source_root, destination.name())?;
    plan_job(&mut job)?;
    run_job(&mut job, destination, progress_callback)?;
    Ok(RunSummary::from_job(&job))
}
