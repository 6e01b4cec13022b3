#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Mirrors a flat local site directory into an R2 bucket.
//!
//! [`SyncEngine::sync`] lists the bucket once, decides per local file
//! whether to skip or upload it (size first, then the stored content hash),
//! and finally deletes remote objects that no longer exist locally.
//! [`SyncEngine::push`] uploads named files unconditionally.
//!
//! Decisions are streamed to a [`DecisionSink`] as they are made, and every
//! remote call is charged to the [`site_sync_r2::OperationAccountant`]
//! behind the engine's [`site_sync_r2::Remote`].

pub mod engine;
pub mod hash;
pub mod local;
pub mod scope;
pub mod sink;

use std::path::PathBuf;

use site_sync_r2::R2Error;

pub use engine::{DEFAULT_CONCURRENCY, SyncEngine, SyncReport, SyncStats};
pub use scope::Scope;
pub use sink::{DecisionSink, LogSink, NullSink, RunStart};

/// Conditions that make reconciliation unsafe. Raised before any upload or
/// delete is attempted.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// The bucket could not be listed completely.
    #[error("Cannot reconcile without a complete catalog: {0}")]
    Catalog(#[from] R2Error),

    /// The sync root could not be read.
    #[error("Failed to read sync root {}: {source}", path.display())]
    Enumerate {
        /// Sync root directory.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
}
