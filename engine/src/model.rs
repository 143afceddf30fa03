//! Core data model for sync runs.
//!
//! - SyncJob: one pass over a source tree against one destination
//! - FileItem: a single source file (or an unreadable directory) within a job
//! - RunSummary: the counters and failure list reported at the end of a run

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::key::RelativeKey;

/// A single sync run over a source tree.
#[derive(Debug)]
pub struct SyncJob {
    /// Unique identifier for this run
    pub id: Uuid,

    /// Root of the source tree
    pub source_root: PathBuf,

    /// Human-readable name of the destination backend
    pub backend_name: String,

    /// Files to process, in depth-first order
    pub files: Vec<FileItem>,

    /// Current job state (Pending, Running, Completed)
    pub state: JobState,

    /// Sum of the sizes of all planned files
    pub total_bytes_planned: u64,

    /// Bytes written to the destination so far
    pub total_bytes_transferred: u64,

    /// Index of the file being processed (if Running)
    pub current_file_index: Option<usize>,

    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// A single entry of the source tree.
#[derive(Debug, Clone)]
pub struct FileItem {
    /// Full source path
    pub source_path: PathBuf,

    /// Destination key derived from the source path
    pub key: RelativeKey,

    /// File size in bytes (0 for directories)
    pub file_size: u64,

    /// Current state of this file
    pub state: FileState,

    /// Bytes written to the destination for this file
    pub bytes_transferred: u64,

    /// Human-readable error message when state is Failed
    pub error_message: Option<String>,

    /// True for a directory that could not be listed during planning
    pub is_dir: bool,
}

impl FileItem {
    pub fn new(source_path: PathBuf, key: RelativeKey, file_size: u64) -> Self {
        FileItem {
            source_path,
            key,
            file_size,
            state: FileState::Pending,
            bytes_transferred: 0,
            error_message: None,
            is_dir: false,
        }
    }

    /// An entry that failed before any destination call was made.
    pub fn failed(source_path: PathBuf, key: RelativeKey, is_dir: bool, message: String) -> Self {
        FileItem {
            source_path,
            key,
            file_size: 0,
            state: FileState::Failed,
            bytes_transferred: 0,
            error_message: Some(message),
            is_dir,
        }
    }
}

/// The state of an individual file within a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileState {
    /// Not yet processed
    Pending,
    /// Existence check or write in progress
    Uploading,
    /// Written to the destination during this run
    Transferred,
    /// Already present at the destination
    Skipped,
    /// Error occurred; nothing written
    Failed,
}

impl FileState {
    /// Returns true if this state is terminal (no further changes expected).
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            FileState::Transferred | FileState::Skipped | FileState::Failed
        )
    }
}

/// The state of an entire sync job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    /// Created, not yet started
    Pending,
    /// Currently executing
    Running,
    /// All files processed (some may have failed)
    Completed,
}

/// A file that could not be synced, with the reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedTransfer {
    pub key: RelativeKey,
    pub message: String,
}

/// How a completed run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunOutcome {
    /// Every file was transferred or skipped
    Clean,
    /// At least one file failed; re-running will retry only those
    Partial,
}

/// Final report of a sync run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub transferred: usize,
    pub skipped: usize,
    pub failed: usize,
    pub bytes_transferred: u64,
    /// Failures in the order they were encountered
    pub failures: Vec<FailedTransfer>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl RunSummary {
    /// Tally the terminal states of a job's files.
    pub fn from_job(job: &SyncJob) -> Self {
        let mut summary = RunSummary {
            transferred: 0,
            skipped: 0,
            failed: 0,
            bytes_transferred: 0,
            failures: Vec::new(),
            started_at: job.started_at,
            finished_at: job.finished_at,
        };

        for file in &job.files {
            match file.state {
                FileState::Transferred => {
                    summary.transferred += 1;
                    summary.bytes_transferred += file.bytes_transferred;
                }
                FileState::Skipped => summary.skipped += 1,
                FileState::Failed => {
                    summary.failed += 1;
                    summary.failures.push(FailedTransfer {
                        key: file.key.clone(),
                        message: file
                            .error_message
                            .clone()
                            .unwrap_or_else(|| "unknown error".to_string()),
                    });
                }
                FileState::Pending | FileState::Uploading => {}
            }
        }

        summary
    }

    /// Number of entries that reached a terminal state.
    pub fn total(&self) -> usize {
        self.transferred + self.skipped + self.failed
    }

    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }

    pub fn outcome(&self) -> RunOutcome {
        if self.has_failures() {
            RunOutcome::Partial
        } else {
            RunOutcome::Clean
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job_with(files: Vec<FileItem>) -> SyncJob {
        SyncJob {
            id: Uuid::new_v4(),
            source_root: PathBuf::from("/media"),
            backend_name: "memory".to_string(),
            files,
            state: JobState::Completed,
            total_bytes_planned: 0,
            total_bytes_transferred: 0,
            current_file_index: None,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
        }
    }

    fn item(key: &str, state: FileState) -> FileItem {
        let mut file = FileItem::new(
            PathBuf::from("/media").join(key),
            RelativeKey::parse(key).expect("key"),
            3,
        );
        file.state = state;
        if state == FileState::Transferred {
            file.bytes_transferred = 3;
        }
        if state == FileState::Failed {
            file.error_message = Some(format!("boom {}", key));
        }
        file
    }

    #[test]
    fn test_summary_counts_each_state() {
        let job = job_with(vec![
            item("a.jpg", FileState::Transferred),
            item("b.jpg", FileState::Skipped),
            item("c.jpg", FileState::Failed),
            item("d.jpg", FileState::Transferred),
        ]);

        let summary = RunSummary::from_job(&job);
        assert_eq!(summary.transferred, 2);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.bytes_transferred, 6);
        assert_eq!(summary.total(), 4);
        assert_eq!(summary.outcome(), RunOutcome::Partial);
    }

    #[test]
    fn test_failures_keep_encounter_order() {
        let job = job_with(vec![
            item("z.jpg", FileState::Failed),
            item("a.jpg", FileState::Failed),
        ]);

        let summary = RunSummary::from_job(&job);
        let keys: Vec<&str> = summary.failures.iter().map(|f| f.key.as_str()).collect();
        assert_eq!(keys, vec!["z.jpg", "a.jpg"]);
        assert_eq!(summary.failures[0].message, "boom z.jpg");
    }

    #[test]
    fn test_empty_job_is_clean() {
        let summary = RunSummary::from_job(&job_with(Vec::new()));
        assert_eq!(summary.total(), 0);
        assert_eq!(summary.outcome(), RunOutcome::Clean);
    }

    #[test]
    fn test_terminal_states() {
        assert!(!FileState::Pending.is_terminal());
        assert!(!FileState::Uploading.is_terminal());
        assert!(FileState::Transferred.is_terminal());
        assert!(FileState::Skipped.is_terminal());
        assert!(FileState::Failed.is_terminal());
    }
}
