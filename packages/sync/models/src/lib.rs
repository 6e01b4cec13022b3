#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Shared data types for reconciling a local site directory with a bucket.
//!
//! The remote side is described by a [`Catalog`] of [`RemoteObject`]s (from
//! the listing) and per-object [`ObjectMetadata`] (from a `HEAD` request).
//! The outcome of reconciling one local file is a [`SyncDecision`], wrapped
//! in a [`FileOutcome`] once it has been acted on.
//!
//! Remote calls are classified by [`Operation`] and [`CostClass`] for the
//! per-run cost audit.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter};

/// Object metadata key holding the content hash of the object's bytes.
///
/// This is the only sync-relevant state persisted on the remote.
pub const METADATA_HASH_KEY: &str = "sha3-256";

/// An entry in the bucket listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteObject {
    /// Object key (case-sensitive, unique within the bucket).
    pub key: String,
    /// Object size in bytes as reported by the listing.
    pub size: u64,
}

/// Metadata returned by a `HEAD` request for a single object.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectMetadata {
    /// Object size in bytes.
    pub size: u64,
    /// Content hash stored at upload time. `None` for objects uploaded
    /// before hashing was introduced.
    pub content_hash: Option<String>,
}

impl ObjectMetadata {
    /// Metadata for a freshly hashed body about to be uploaded.
    #[must_use]
    pub const fn for_upload(size: u64, content_hash: String) -> Self {
        Self {
            size,
            content_hash: Some(content_hash),
        }
    }

    /// Builds metadata from the backend's generic string map.
    ///
    /// Key lookup is case-insensitive since S3-compatible backends are free
    /// to normalize user metadata keys.
    #[must_use]
    pub fn from_map(size: u64, map: &HashMap<String, String>) -> Self {
        let content_hash = map
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(METADATA_HASH_KEY))
            .map(|(_, v)| v.clone());

        Self { size, content_hash }
    }

    /// Serializes into the backend's generic string map.
    #[must_use]
    pub fn to_map(&self) -> HashMap<String, String> {
        self.content_hash
            .iter()
            .map(|hash| (METADATA_HASH_KEY.to_string(), hash.clone()))
            .collect()
    }
}

/// Snapshot of every object in the bucket, keyed by object key.
///
/// Taken once at the start of a run and never re-queried.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Catalog {
    objects: BTreeMap<String, RemoteObject>,
}

impl Catalog {
    /// Creates an empty catalog.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            objects: BTreeMap::new(),
        }
    }

    /// Adds an object, replacing any previous entry with the same key.
    pub fn insert(&mut self, object: RemoteObject) {
        self.objects.insert(object.key.clone(), object);
    }

    /// Looks up an object by key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&RemoteObject> {
        self.objects.get(key)
    }

    /// Iterates keys in sorted order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.objects.keys().map(String::as_str)
    }

    /// Keeps only the objects whose key satisfies `keep`.
    pub fn retain(&mut self, mut keep: impl FnMut(&str) -> bool) {
        self.objects.retain(|key, _| keep(key));
    }

    /// Number of objects.
    #[must_use]
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// Returns `true` if the bucket is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

impl FromIterator<RemoteObject> for Catalog {
    fn from_iter<T: IntoIterator<Item = RemoteObject>>(iter: T) -> Self {
        let mut catalog = Self::new();
        for object in iter {
            catalog.insert(object);
        }
        catalog
    }
}

/// Remote operation, named after the S3 API call it corresponds to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display, EnumIter)]
pub enum Operation {
    #[strum(serialize = "listObjectsV2")]
    ListObjectsV2,
    #[strum(serialize = "headObject")]
    HeadObject,
    #[strum(serialize = "putObject")]
    PutObject,
    #[strum(serialize = "deleteObjects")]
    DeleteObjects,
}

impl Operation {
    /// Number of variants, used to size counter tables.
    pub const COUNT: usize = 4;

    /// Dense index for counter tables.
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Billing class the backend charges this operation under.
    #[must_use]
    pub const fn cost_class(self) -> CostClass {
        match self {
            Self::ListObjectsV2 | Self::PutObject => CostClass::A,
            Self::HeadObject => CostClass::B,
            Self::DeleteObjects => CostClass::Free,
        }
    }
}

/// Relative billing weight of a remote call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display, EnumIter)]
pub enum CostClass {
    /// Expensive (mutations and listings).
    #[strum(serialize = "A")]
    A,
    /// Cheaper reads.
    #[strum(serialize = "B")]
    B,
    /// Not billed.
    #[strum(serialize = "0")]
    Free,
}

impl CostClass {
    /// Number of variants, used to size counter tables.
    pub const COUNT: usize = 3;

    /// Dense index for counter tables.
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }
}

/// Coarse category of a [`SyncDecision`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "snake_case")]
pub enum DecisionKind {
    Skip,
    Upload,
    Warn,
    Fail,
}

/// Why an unchanged file is left alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    #[strum(serialize = "hash matches")]
    HashMatches,
}

/// Why a file is uploaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
pub enum UploadReason {
    #[strum(serialize = "not on remote")]
    NotOnRemote,
    #[strum(serialize = "different size on remote")]
    SizeDiffers,
    #[strum(serialize = "missing content hash")]
    MissingHash,
    #[strum(serialize = "hash mismatch")]
    HashMismatch,
    /// Explicitly requested, classification bypassed.
    #[strum(serialize = "forced")]
    Forced,
}

/// Why a local entry is skipped with a warning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
pub enum WarnReason {
    #[strum(serialize = "not a file")]
    NotAFile,
}

/// Why the state of a file could not be determined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
pub enum FailReason {
    /// The metadata request itself failed (transport, auth, timeout).
    #[strum(serialize = "could not query remote")]
    HeadFailed,
    /// The object was listed but `HEAD` reported it absent.
    #[strum(serialize = "listed but not found on remote")]
    NotFoundAfterListing,
    /// The local file could not be read or is not a valid object key.
    #[strum(serialize = "could not read local file")]
    Unreadable,
}

/// Per-file reconciliation decision. Exactly one per local file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "reason", rename_all = "snake_case")]
pub enum SyncDecision {
    Skip(SkipReason),
    Upload(UploadReason),
    Warn(WarnReason),
    Fail(FailReason),
}

impl SyncDecision {
    #[must_use]
    pub const fn kind(&self) -> DecisionKind {
        match self {
            Self::Skip(_) => DecisionKind::Skip,
            Self::Upload(_) => DecisionKind::Upload,
            Self::Warn(_) => DecisionKind::Warn,
            Self::Fail(_) => DecisionKind::Fail,
        }
    }

    /// Human-readable reason, e.g. `"hash mismatch"`.
    #[must_use]
    pub fn reason(&self) -> String {
        match self {
            Self::Skip(r) => r.to_string(),
            Self::Upload(r) => r.to_string(),
            Self::Warn(r) => r.to_string(),
            Self::Fail(r) => r.to_string(),
        }
    }

    #[must_use]
    pub const fn is_upload(&self) -> bool {
        matches!(self, Self::Upload(_))
    }
}

impl std::fmt::Display for SyncDecision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind(), self.reason())
    }
}

/// Whether the action implied by a decision went through.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "error", rename_all = "snake_case")]
pub enum OutcomeStatus {
    Done,
    Failed(String),
}

/// A decision for one local file together with the result of acting on it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileOutcome {
    /// Local file name (also the object key).
    pub name: String,
    pub decision: SyncDecision,
    pub status: OutcomeStatus,
}

impl FileOutcome {
    /// Returns `true` if the file was not handled as decided, either
    /// because its remote state was indeterminate or because the upload
    /// failed.
    #[must_use]
    pub const fn is_failure(&self) -> bool {
        matches!(self.status, OutcomeStatus::Failed(_))
    }

    /// Returns `true` if a put for this file succeeded.
    #[must_use]
    pub const fn uploaded(&self) -> bool {
        self.decision.is_upload() && matches!(self.status, OutcomeStatus::Done)
    }
}

/// Result of the orphan-deletion step of a sync run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "orphans", rename_all = "snake_case")]
pub enum OrphanOutcome {
    /// No remote object lacked a local counterpart.
    Clean,
    /// All orphans were deleted.
    Deleted { keys: Vec<String> },
    /// The delete request failed; the orphans remain for the next run.
    Failed { keys: Vec<String>, error: String },
}

impl OrphanOutcome {
    /// Orphan keys found in this run, whether or not deletion succeeded.
    #[must_use]
    pub fn keys(&self) -> &[String] {
        match self {
            Self::Clean => &[],
            Self::Deleted { keys } | Self::Failed { keys, .. } => keys,
        }
    }

    #[must_use]
    pub const fn is_failure(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

#[cfg(test)]
mod tests {
    use strum::IntoEnumIterator as _;

    use super::*;

    #[test]
    fn operation_names_match_s3_api() {
        assert_eq!(Operation::ListObjectsV2.to_string(), "listObjectsV2");
        assert_eq!(Operation::HeadObject.to_string(), "headObject");
        assert_eq!(Operation::PutObject.to_string(), "putObject");
        assert_eq!(Operation::DeleteObjects.to_string(), "deleteObjects");
    }

    #[test]
    fn indexes_are_dense() {
        for (i, op) in Operation::iter().enumerate() {
            assert_eq!(op.index(), i);
        }
        assert_eq!(Operation::iter().count(), Operation::COUNT);
        for (i, class) in CostClass::iter().enumerate() {
            assert_eq!(class.index(), i);
        }
        assert_eq!(CostClass::iter().count(), CostClass::COUNT);
    }

    #[test]
    fn default_cost_classes() {
        assert_eq!(Operation::ListObjectsV2.cost_class(), CostClass::A);
        assert_eq!(Operation::HeadObject.cost_class(), CostClass::B);
        assert_eq!(Operation::PutObject.cost_class(), CostClass::A);
        assert_eq!(Operation::DeleteObjects.cost_class(), CostClass::Free);
        assert_eq!(CostClass::Free.to_string(), "0");
    }

    #[test]
    fn metadata_round_trips_through_backend_map() {
        let meta = ObjectMetadata::for_upload(10, "abc".to_string());
        let map = meta.to_map();
        assert_eq!(map.get(METADATA_HASH_KEY).map(String::as_str), Some("abc"));
        assert_eq!(ObjectMetadata::from_map(10, &map), meta);
    }

    #[test]
    fn metadata_lookup_ignores_key_case() {
        let map = HashMap::from([("SHA3-256".to_string(), "xyz".to_string())]);
        let meta = ObjectMetadata::from_map(3, &map);
        assert_eq!(meta.content_hash.as_deref(), Some("xyz"));
    }

    #[test]
    fn metadata_without_hash_serializes_to_empty_map() {
        let meta = ObjectMetadata {
            size: 5,
            content_hash: None,
        };
        assert!(meta.to_map().is_empty());
        let other = HashMap::from([("owner".to_string(), "me".to_string())]);
        assert_eq!(ObjectMetadata::from_map(5, &other).content_hash, None);
    }

    #[test]
    fn catalog_keys_are_sorted_and_unique() {
        let catalog: Catalog = [
            RemoteObject {
                key: "b.txt".to_string(),
                size: 1,
            },
            RemoteObject {
                key: "a.txt".to_string(),
                size: 2,
            },
            RemoteObject {
                key: "b.txt".to_string(),
                size: 3,
            },
        ]
        .into_iter()
        .collect();

        assert_eq!(catalog.keys().collect::<Vec<_>>(), ["a.txt", "b.txt"]);
        assert_eq!(catalog.get("b.txt").map(|o| o.size), Some(3));
    }

    #[test]
    fn decision_reasons_are_human_readable() {
        let decision = SyncDecision::Upload(UploadReason::SizeDiffers);
        assert_eq!(decision.kind(), DecisionKind::Upload);
        assert_eq!(decision.to_string(), "upload: different size on remote");
        assert_eq!(
            SyncDecision::Fail(FailReason::HeadFailed).reason(),
            "could not query remote"
        );
    }

    #[test]
    fn outcome_serializes_as_flat_record() {
        let outcome = FileOutcome {
            name: "a.txt".to_string(),
            decision: SyncDecision::Skip(SkipReason::HashMatches),
            status: OutcomeStatus::Done,
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["name"], "a.txt");
        assert_eq!(json["decision"]["kind"], "skip");
        assert_eq!(json["decision"]["reason"], "hash_matches");
        assert_eq!(json["status"]["status"], "done");
    }
}
