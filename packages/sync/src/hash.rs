//! Content hashing for change detection.
//!
//! Digests are SHA3-256 encoded as unpadded URL-safe base64, which keeps
//! them to a fixed 43 characters that are safe in object metadata.

use std::path::Path;

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use sha3::{Digest as _, Sha3_256};

/// Length of every digest produced by [`content_hash`].
pub const HASH_LEN: usize = 43;

/// Hashes `bytes`.
#[must_use]
pub fn content_hash(bytes: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(Sha3_256::digest(bytes))
}

/// A file body read into memory together with its hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashedBody {
    pub bytes: Vec<u8>,
    pub hash: String,
}

/// Reads a whole file and hashes it on a blocking thread.
///
/// # Errors
///
/// Returns any I/O error from reading the file.
pub async fn read_and_hash(path: &Path) -> Result<HashedBody, std::io::Error> {
    let bytes = tokio::fs::read(path).await?;
    tokio::task::spawn_blocking(move || {
        let hash = content_hash(&bytes);
        HashedBody { bytes, hash }
    })
    .await
    .map_err(std::io::Error::other)
}
