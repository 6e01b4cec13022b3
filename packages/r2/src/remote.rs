//! Accounted, time-bounded access to an [`ObjectStore`].

use std::collections::BTreeSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use site_sync_models::{Catalog, ObjectMetadata, Operation};

use crate::{ObjectStore, OperationAccountant, R2Error};

/// Default per-call timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Most keys S3 accepts in a single `DeleteObjects` request.
pub const MAX_DELETE_BATCH: usize = 1000;

/// Result of a `HEAD` request for one object.
///
/// Keeps "the object does not exist" apart from "could not tell", so a
/// transport or auth failure is never mistaken for absence.
#[derive(Debug)]
pub enum HeadResult {
    Found(ObjectMetadata),
    Absent,
    Failed(R2Error),
}

/// Object store client used by the reconciliation engine.
///
/// Every call that reaches the backend is charged to the accountant before
/// it is awaited, so failed and timed-out calls are counted too.
#[derive(Clone)]
pub struct Remote {
    store: Arc<dyn ObjectStore>,
    accountant: Arc<OperationAccountant>,
    timeout: Duration,
}

impl Remote {
    #[must_use]
    pub fn new(store: Arc<dyn ObjectStore>, accountant: Arc<OperationAccountant>) -> Self {
        Self {
            store,
            accountant,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Sets the timeout applied to every backend call.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn bucket(&self) -> &str {
        self.store.bucket()
    }

    #[must_use]
    pub const fn accountant(&self) -> &Arc<OperationAccountant> {
        &self.accountant
    }

    async fn call<T>(
        &self,
        op: Operation,
        target: &str,
        request: impl Future<Output = Result<T, R2Error>> + Send,
    ) -> Result<T, R2Error> {
        self.accountant.charge(op);
        tokio::time::timeout(self.timeout, request)
            .await
            .map_err(|_| R2Error::Timeout {
                op,
                target: target.to_string(),
                after: self.timeout,
            })?
    }

    /// Lists every object in the bucket.
    ///
    /// Follows continuation tokens until the listing is exhausted, charging
    /// one `ListObjectsV2` per page.
    ///
    /// # Errors
    ///
    /// Returns [`R2Error::List`] or [`R2Error::Timeout`] if any page fails,
    /// and [`R2Error::TruncatedListing`] if a page claims more results but
    /// carries no continuation token, or one already followed. A partial
    /// catalog is never returned.
    pub async fn list_catalog(&self) -> Result<Catalog, R2Error> {
        let bucket = self.bucket().to_string();
        log::info!("Listing s3://{bucket}");

        let mut catalog = Catalog::new();
        let mut continuation_token: Option<String> = None;
        let mut followed = BTreeSet::new();
        let mut pages = 0u32;

        loop {
            let page = self
                .call(
                    Operation::ListObjectsV2,
                    &bucket,
                    self.store.list_page(continuation_token.take()),
                )
                .await?;
            pages += 1;

            for object in page.objects {
                catalog.insert(object);
            }

            if !page.truncated {
                break;
            }

            match page.continuation_token {
                Some(token) if followed.insert(token.clone()) => continuation_token = Some(token),
                Some(token) => {
                    log::error!("Listing returned continuation token {token:?} twice");
                    return Err(R2Error::TruncatedListing { bucket });
                }
                None => return Err(R2Error::TruncatedListing { bucket }),
            }
        }

        log::info!("  found {} objects in {pages} page(s)", catalog.len());
        Ok(catalog)
    }

    /// Fetches object metadata with a `HEAD` request.
    pub async fn head(&self, key: &str) -> HeadResult {
        match self
            .call(Operation::HeadObject, key, self.store.head_object(key))
            .await
        {
            Ok(Some(metadata)) => HeadResult::Found(metadata),
            Ok(None) => HeadResult::Absent,
            Err(e) => HeadResult::Failed(e),
        }
    }

    /// Uploads one object.
    ///
    /// # Errors
    ///
    /// Returns [`R2Error::Upload`] or [`R2Error::Timeout`].
    pub async fn put(
        &self,
        key: &str,
        body: Vec<u8>,
        metadata: &ObjectMetadata,
    ) -> Result<(), R2Error> {
        self.call(
            Operation::PutObject,
            key,
            self.store.put_object(key, body, metadata),
        )
        .await
    }

    /// Deletes `keys` in as few requests as the backend allows.
    ///
    /// An empty slice makes no call. Up to [`MAX_DELETE_BATCH`] keys go out
    /// as a single `DeleteObjects`. Every batch is attempted even if an
    /// earlier one failed.
    ///
    /// # Errors
    ///
    /// Returns the first batch error. A batch with any per-key error counts
    /// as failed in full.
    pub async fn delete_many(&self, keys: &[String]) -> Result<(), R2Error> {
        if keys.is_empty() {
            return Ok(());
        }

        let mut first_err = None;
        for batch in keys.chunks(MAX_DELETE_BATCH) {
            log::info!("Deleting {} object(s) from s3://{}", batch.len(), self.bucket());
            let result = self
                .call(
                    Operation::DeleteObjects,
                    self.bucket(),
                    self.store.delete_objects(batch),
                )
                .await;

            if let Err(e) = result {
                log::warn!("  delete batch failed: {e}");
                first_err.get_or_insert(e);
            }
        }

        first_err.map_or(Ok(()), Err)
    }
}

#[cfg(test)]
mod tests {
    use site_sync_models::{CostClass, RemoteObject};

    use super::*;
    use crate::{MemoryStore, StoreCall};

    fn remote(store: &Arc<MemoryStore>) -> Remote {
        Remote::new(store.clone(), Arc::new(OperationAccountant::new()))
    }

    #[tokio::test]
    async fn list_follows_pages_and_charges_each() {
        let store = Arc::new(MemoryStore::new("www").with_page_size(2));
        for key in ["a", "b", "c", "d", "e"] {
            store.insert(key, b"x".to_vec(), None);
        }
        let remote = remote(&store);

        let catalog = remote.list_catalog().await.unwrap();

        assert_eq!(catalog.keys().collect::<Vec<_>>(), ["a", "b", "c", "d", "e"]);
        assert_eq!(
            catalog.get("c"),
            Some(&RemoteObject {
                key: "c".to_string(),
                size: 1
            })
        );
        assert_eq!(
            remote
                .accountant()
                .count(Operation::ListObjectsV2, CostClass::A),
            3
        );
    }

    #[tokio::test]
    async fn truncated_listing_without_token_is_fatal() {
        let store = Arc::new(MemoryStore::new("www").with_page_size(1));
        store.insert("a", vec![1], None);
        store.insert("b", vec![2], None);
        store.drop_continuation_tokens();
        let remote = remote(&store);

        let err = remote.list_catalog().await.unwrap_err();

        assert!(matches!(err, R2Error::TruncatedListing { .. }), "{err}");
        assert_eq!(remote.accountant().calls(Operation::ListObjectsV2), 1);
    }

    #[tokio::test]
    async fn repeated_continuation_token_is_fatal() {
        let store = Arc::new(MemoryStore::new("www").with_page_size(1));
        for key in ["a", "b", "c"] {
            store.insert(key, vec![0], None);
        }
        store.echo_continuation_tokens();
        let remote = remote(&store);

        let err = remote.list_catalog().await.unwrap_err();

        assert!(matches!(err, R2Error::TruncatedListing { .. }), "{err}");
        assert_eq!(remote.accountant().calls(Operation::ListObjectsV2), 2);
        assert_eq!(
            store.calls(),
            [StoreCall::List(None), StoreCall::List(Some("a".to_string()))]
        );
    }

    #[tokio::test]
    async fn head_reports_hidden_object_absent() {
        let store = Arc::new(MemoryStore::new("www"));
        store.insert("a", vec![0], Some("h"));
        store.hide_on_head("a");
        let remote = remote(&store);

        assert!(remote.list_catalog().await.unwrap().get("a").is_some());
        assert!(matches!(remote.head("a").await, HeadResult::Absent));
    }

    #[tokio::test]
    async fn failed_listing_is_still_charged() {
        let store = Arc::new(MemoryStore::new("www"));
        store.fail_list();
        let remote = remote(&store);

        assert!(matches!(
            remote.list_catalog().await,
            Err(R2Error::List { .. })
        ));
        assert_eq!(remote.accountant().calls(Operation::ListObjectsV2), 1);
    }

    #[tokio::test]
    async fn head_distinguishes_absent_from_failed() {
        let store = Arc::new(MemoryStore::new("www"));
        store.insert("present", b"abc".to_vec(), Some("h"));
        store.insert("broken", b"abc".to_vec(), Some("h"));
        store.fail_head("broken");
        let remote = remote(&store);

        match remote.head("present").await {
            HeadResult::Found(meta) => {
                assert_eq!(meta.size, 3);
                assert_eq!(meta.content_hash.as_deref(), Some("h"));
            }
            other => panic!("expected Found, got {other:?}"),
        }
        assert!(matches!(remote.head("missing").await, HeadResult::Absent));
        assert!(matches!(
            remote.head("broken").await,
            HeadResult::Failed(R2Error::Head { .. })
        ));
        assert_eq!(remote.accountant().count(Operation::HeadObject, CostClass::B), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_calls_time_out_and_are_charged() {
        let store = Arc::new(MemoryStore::new("www"));
        store.insert("a", vec![0], Some("h"));
        store.set_latency(Duration::from_secs(60));
        let remote = remote(&store).with_timeout(Duration::from_secs(1));

        let result = remote.head("a").await;

        assert!(
            matches!(
                result,
                HeadResult::Failed(R2Error::Timeout {
                    op: Operation::HeadObject,
                    ..
                })
            ),
            "{result:?}"
        );
        assert_eq!(remote.accountant().calls(Operation::HeadObject), 1);
    }

    #[tokio::test]
    async fn put_attaches_metadata() {
        let store = Arc::new(MemoryStore::new("www"));
        let remote = remote(&store);

        remote
            .put("a.txt", b"hi".to_vec(), &ObjectMetadata::for_upload(2, "h".into()))
            .await
            .unwrap();

        let stored = store.object("a.txt").unwrap();
        assert_eq!(stored.body, b"hi");
        assert_eq!(stored.content_hash.as_deref(), Some("h"));
        assert_eq!(remote.accountant().count(Operation::PutObject, CostClass::A), 1);
    }

    #[tokio::test]
    async fn empty_delete_makes_no_call() {
        let store = Arc::new(MemoryStore::new("www"));
        let remote = remote(&store);

        remote.delete_many(&[]).await.unwrap();

        assert!(store.calls().is_empty());
        assert_eq!(remote.accountant().calls(Operation::DeleteObjects), 0);
    }

    #[tokio::test]
    async fn delete_is_one_call_per_batch() {
        let store = Arc::new(MemoryStore::new("www"));
        let keys: Vec<String> = (0..MAX_DELETE_BATCH + 5).map(|i| format!("k{i}")).collect();
        for key in &keys {
            store.insert(key, vec![], None);
        }
        let remote = remote(&store);

        remote.delete_many(&keys[..3]).await.unwrap();
        assert_eq!(remote.accountant().calls(Operation::DeleteObjects), 1);

        remote.delete_many(&keys[3..]).await.unwrap();
        assert_eq!(remote.accountant().calls(Operation::DeleteObjects), 3);
        assert!(store.keys().is_empty());

        let batches: Vec<usize> = store
            .calls()
            .into_iter()
            .filter_map(|call| match call {
                StoreCall::Delete(keys) => Some(keys.len()),
                _ => None,
            })
            .collect();
        assert_eq!(batches, [3, MAX_DELETE_BATCH, 2]);
    }

    #[tokio::test]
    async fn partial_delete_counts_as_failure() {
        let store = Arc::new(MemoryStore::new("www"));
        store.insert("a", vec![], None);
        store.insert("b", vec![], None);
        store.reject_delete("b");
        let remote = remote(&store);

        let err = remote
            .delete_many(&["a".to_string(), "b".to_string()])
            .await
            .unwrap_err();

        match err {
            R2Error::DeletePartial { keys, .. } => assert_eq!(keys, ["b"]),
            other => panic!("expected DeletePartial, got {other}"),
        }
        assert_eq!(remote.accountant().calls(Operation::DeleteObjects), 1);
    }
}
