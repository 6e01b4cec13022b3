//! Backend seam for S3-compatible object stores.

use async_trait::async_trait;
use site_sync_models::{ObjectMetadata, RemoteObject};

use crate::R2Error;

/// One page of a bucket listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListPage {
    pub objects: Vec<RemoteObject>,
    /// Whether the backend holds more objects than this page returned.
    pub truncated: bool,
    /// Token for the next page. Only meaningful when `truncated` is set.
    pub continuation_token: Option<String>,
}

/// Raw bucket operations.
///
/// Implementations perform exactly one backend request per call and do no
/// retrying, timing, or accounting of their own; [`crate::Remote`] layers
/// those on top.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Bucket this store operates on.
    fn bucket(&self) -> &str;

    /// Fetches one listing page, starting after `continuation_token`.
    ///
    /// # Errors
    ///
    /// Returns [`R2Error::List`] if the request fails.
    async fn list_page(&self, continuation_token: Option<String>) -> Result<ListPage, R2Error>;

    /// Fetches object metadata. `Ok(None)` means the object does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`R2Error::Head`] for any failure other than "not found".
    async fn head_object(&self, key: &str) -> Result<Option<ObjectMetadata>, R2Error>;

    /// Uploads `body` as a single object with `metadata` attached.
    ///
    /// # Errors
    ///
    /// Returns [`R2Error::Upload`] if the request fails.
    async fn put_object(
        &self,
        key: &str,
        body: Vec<u8>,
        metadata: &ObjectMetadata,
    ) -> Result<(), R2Error>;

    /// Deletes all `keys` in one request.
    ///
    /// # Errors
    ///
    /// Returns [`R2Error::Delete`] if the request fails, or
    /// [`R2Error::DeletePartial`] if the backend reports per-key errors.
    async fn delete_objects(&self, keys: &[String]) -> Result<(), R2Error>;
}
