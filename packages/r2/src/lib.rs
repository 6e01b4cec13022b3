#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Cloudflare R2 access for site sync.
//!
//! The [`ObjectStore`] trait is the backend seam: [`R2Client`] talks to R2
//! through the AWS S3 SDK, [`MemoryStore`] keeps objects in process. All
//! reconciliation code goes through [`Remote`], which wraps a store with
//! per-call timeouts and charges every backend call to an
//! [`OperationAccountant`].
//!
//! # Credentials
//!
//! | Variable | Secrets file | Description |
//! |---|---|---|
//! | `CLOUDFLARE_ACCOUNT_ID` | `account_id` | Cloudflare account ID (builds the R2 endpoint) |
//! | `R2_ACCESS_KEY_ID` | `access_key_id` | S3-compatible access key for R2 |
//! | `R2_SECRET_ACCESS_KEY` | `access_key` | S3-compatible secret key for R2 |
//!
//! Environment variables win; missing ones are read from the secrets
//! directory (see [`R2Config::resolve`]).

mod client;
mod config;
mod memory;
pub mod ops;
mod remote;
mod store;

use std::time::Duration;

use site_sync_models::Operation;

pub use client::R2Client;
pub use config::R2Config;
pub use memory::{MemoryStore, StoreCall, StoredObject};
pub use ops::{OperationAccountant, OperationSummary};
pub use remote::{DEFAULT_TIMEOUT, HeadResult, MAX_DELETE_BATCH, Remote};
pub use store::{ListPage, ObjectStore};

/// Errors that can occur during R2 operations.
#[derive(Debug, thiserror::Error)]
pub enum R2Error {
    /// A credential was found neither in the environment nor in the
    /// secrets directory.
    #[error("Missing credential: set {env} or provide {file}")]
    MissingCredential {
        /// Environment variable that was checked.
        env: String,
        /// Secrets file that was checked.
        file: String,
    },

    /// S3 `ListObjectsV2` failed.
    #[error("Failed to list s3://{bucket}: {source}")]
    List {
        /// Bucket name.
        bucket: String,
        /// Underlying SDK error.
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The listing reported more results without a way to fetch them.
    #[error("Listing of s3://{bucket} was truncated without a continuation token")]
    TruncatedListing {
        /// Bucket name.
        bucket: String,
    },

    /// S3 `HeadObject` failed.
    #[error("Failed to head s3://{bucket}/{key}: {source}")]
    Head {
        /// Bucket name.
        bucket: String,
        /// Object key.
        key: String,
        /// Underlying SDK error.
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// S3 `PutObject` failed.
    #[error("Failed to upload s3://{bucket}/{key}: {source}")]
    Upload {
        /// Bucket name.
        bucket: String,
        /// Object key.
        key: String,
        /// Underlying SDK error.
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// S3 `DeleteObjects` request failed as a whole.
    #[error("Failed to delete {count} object(s) from s3://{bucket}: {source}")]
    Delete {
        /// Bucket name.
        bucket: String,
        /// Number of keys in the batch.
        count: usize,
        /// Underlying SDK error.
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// S3 `DeleteObjects` reported errors for some keys.
    #[error("Delete from s3://{bucket} reported errors for: {}", keys.join(", "))]
    DeletePartial {
        /// Bucket name.
        bucket: String,
        /// Keys the backend reported as not deleted.
        keys: Vec<String>,
    },

    /// A backend call did not complete in time.
    #[error("{op} {target} timed out after {after:.1?}")]
    Timeout {
        /// Operation that timed out.
        op: Operation,
        /// Key or bucket the call was about.
        target: String,
        /// Configured timeout.
        after: Duration,
    },
}
