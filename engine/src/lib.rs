//! # Media sync engine
//!
//! Headless library that copies a local media tree into an object store,
//! one file at a time, without re-uploading objects that already exist.
//!
//! ## Overview
//!
//! - Depth-first enumeration of regular files under a source root
//! - Platform-independent object keys (`a/b/c.jpg`)
//! - Existence check before every upload, so re-runs only send the delta
//! - Per-file error isolation: one failed upload never stops the run
//! - Destination backends: Cloudinary, S3-compatible buckets, local disk
//! - Progress reporting via callbacks (decoupled from UI technology)
//!
//! ## Basic Usage
//!
//! ```no_run
//! use engine::{sync, Settings};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut settings = Settings::default();
//! settings.apply_process_env()?;
//!
//! let backend = settings.resolve_backend()?;
//! let store = backend.open()?;
//!
//! let summary = sync(&settings.media_root, store.as_ref(), None)?;
//! println!(
//!     "{} uploaded, {} skipped, {} failed",
//!     summary.transferred, summary.skipped, summary.failed
//! );
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - **model**: Core data structures (SyncJob, FileItem, RunSummary)
//! - **error**: Job-level and per-file error types
//! - **key**: Relative object keys
//! - **fs_ops**: Source tree enumeration and local file writes
//! - **store**: Destination backends
//! - **config**: Settings and backend resolution
//! - **job**: Job orchestration (create, plan, run, sync)
//! - **progress**: Progress callback trait

pub mod config;
pub mod error;
pub mod fs_ops;
pub mod job;
pub mod key;
pub mod model;
pub mod progress;
pub mod store;

// Re-export main types and functions
pub use config::{BackendKind, Settings};
pub use error::{EngineError, TransferError};
pub use job::{create_job, plan_job, run_job, sync};
pub use key::RelativeKey;
pub use model::{FailedTransfer, FileItem, FileState, JobState, RunOutcome, RunSummary, SyncJob};
pub use progress::ProgressCallback;
pub use store::{Backend, DestinationStore, LocalStore, MemoryStore};
