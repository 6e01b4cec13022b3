//! In-process [`ObjectStore`] with failure injection and a call log.
//!
//! Backs the reconciliation tests. Listing order and pagination follow S3
//! semantics: keys sorted, pages continue after the last key returned.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use site_sync_models::{ObjectMetadata, RemoteObject};

use crate::{ListPage, ObjectStore, R2Error};

/// Default number of keys per listing page (the S3 maximum).
const DEFAULT_PAGE_SIZE: usize = 1000;

/// An object held by [`MemoryStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub body: Vec<u8>,
    pub content_hash: Option<String>,
}

/// A backend request received by [`MemoryStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreCall {
    List(Option<String>),
    Head(String),
    Put(String),
    Delete(Vec<String>),
}

#[derive(Default)]
struct State {
    objects: BTreeMap<String, StoredObject>,
    calls: Vec<StoreCall>,
    failing_heads: BTreeSet<String>,
    hidden_heads: BTreeSet<String>,
    failing_puts: BTreeSet<String>,
    rejected_deletes: BTreeSet<String>,
    fail_list: bool,
    fail_deletes: bool,
    drop_continuation_tokens: bool,
    echo_continuation_tokens: bool,
}

/// Object store kept entirely in memory.
pub struct MemoryStore {
    bucket: String,
    page_size: usize,
    latency: Mutex<Option<Duration>>,
    state: Mutex<State>,
}

impl MemoryStore {
    #[must_use]
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            page_size: DEFAULT_PAGE_SIZE,
            latency: Mutex::new(None),
            state: Mutex::new(State::default()),
        }
    }

    /// Limits listing pages to `page_size` keys.
    #[must_use]
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Seeds an object without recording a call.
    pub fn insert(&self, key: &str, body: Vec<u8>, content_hash: Option<&str>) {
        self.state().objects.insert(
            key.to_string(),
            StoredObject {
                body,
                content_hash: content_hash.map(str::to_string),
            },
        );
    }

    #[must_use]
    pub fn object(&self, key: &str) -> Option<StoredObject> {
        self.state().objects.get(key).cloned()
    }

    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        self.state().objects.keys().cloned().collect()
    }

    /// Every request received so far, in arrival order.
    #[must_use]
    pub fn calls(&self) -> Vec<StoreCall> {
        self.state().calls.clone()
    }

    /// Makes every subsequent request wait `latency` before answering.
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock().unwrap_or_else(PoisonError::into_inner) = Some(latency);
    }

    pub fn fail_list(&self) {
        self.state().fail_list = true;
    }

    /// Truncated pages come back without a continuation token.
    pub fn drop_continuation_tokens(&self) {
        self.state().drop_continuation_tokens = true;
    }

    /// Pages after the first hand back the token they were called with.
    pub fn echo_continuation_tokens(&self) {
        self.state().echo_continuation_tokens = true;
    }

    /// Makes metadata requests for `key` report it missing while it is
    /// still listed.
    pub fn hide_on_head(&self, key: &str) {
        self.state().hidden_heads.insert(key.to_string());
    }

    pub fn fail_head(&self, key: &str) {
        self.state().failing_heads.insert(key.to_string());
    }

    pub fn fail_put(&self, key: &str) {
        self.state().failing_puts.insert(key.to_string());
    }

    /// Makes every delete request fail outright.
    pub fn fail_deletes(&self) {
        self.state().fail_deletes = true;
    }

    /// Makes delete requests report a per-key error for `key` while still
    /// removing the others.
    pub fn reject_delete(&self, key: &str) {
        self.state().rejected_deletes.insert(key.to_string());
    }

    async fn wait(&self) {
        let latency = *self.latency.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn list_page(&self, continuation_token: Option<String>) -> Result<ListPage, R2Error> {
        self.wait().await;
        let mut state = self.state();
        state.calls.push(StoreCall::List(continuation_token.clone()));

        if state.fail_list {
            return Err(R2Error::List {
                bucket: self.bucket.clone(),
                source: "injected list failure".into(),
            });
        }

        let mut remaining = state
            .objects
            .iter()
            .filter(|(key, _)| {
                continuation_token
                    .as_deref()
                    .is_none_or(|token| key.as_str() > token)
            })
            .map(|(key, object)| RemoteObject {
                key: key.clone(),
                size: object.body.len() as u64,
            });

        let objects: Vec<RemoteObject> = remaining.by_ref().take(self.page_size).collect();
        let truncated = remaining.next().is_some();
        let continuation_token = if !truncated || state.drop_continuation_tokens {
            None
        } else if state.echo_continuation_tokens && continuation_token.is_some() {
            continuation_token
        } else {
            objects.last().map(|o| o.key.clone())
        };

        Ok(ListPage {
            objects,
            truncated,
            continuation_token,
        })
    }

    async fn head_object(&self, key: &str) -> Result<Option<ObjectMetadata>, R2Error> {
        self.wait().await;
        let mut state = self.state();
        state.calls.push(StoreCall::Head(key.to_string()));

        if state.failing_heads.contains(key) {
            return Err(R2Error::Head {
                bucket: self.bucket.clone(),
                key: key.to_string(),
                source: "injected head failure".into(),
            });
        }

        if state.hidden_heads.contains(key) {
            return Ok(None);
        }

        Ok(state.objects.get(key).map(|object| ObjectMetadata {
            size: object.body.len() as u64,
            content_hash: object.content_hash.clone(),
        }))
    }

    async fn put_object(
        &self,
        key: &str,
        body: Vec<u8>,
        metadata: &ObjectMetadata,
    ) -> Result<(), R2Error> {
        self.wait().await;
        let mut state = self.state();
        state.calls.push(StoreCall::Put(key.to_string()));

        if state.failing_puts.contains(key) {
            return Err(R2Error::Upload {
                bucket: self.bucket.clone(),
                key: key.to_string(),
                source: "injected put failure".into(),
            });
        }

        state.objects.insert(
            key.to_string(),
            StoredObject {
                body,
                content_hash: metadata.content_hash.clone(),
            },
        );
        Ok(())
    }

    async fn delete_objects(&self, keys: &[String]) -> Result<(), R2Error> {
        self.wait().await;
        let mut state = self.state();
        state.calls.push(StoreCall::Delete(keys.to_vec()));

        if state.fail_deletes {
            return Err(R2Error::Delete {
                bucket: self.bucket.clone(),
                count: keys.len(),
                source: "injected delete failure".into(),
            });
        }

        let mut rejected = Vec::new();
        for key in keys {
            if state.rejected_deletes.contains(key) {
                rejected.push(key.clone());
            } else {
                state.objects.remove(key);
            }
        }

        if rejected.is_empty() {
            Ok(())
        } else {
            Err(R2Error::DeletePartial {
                bucket: self.bucket.clone(),
                keys: rejected,
            })
        }
    }
}
