//! The reconciliation engine.
//!
//! Each local file gets exactly one [`SyncDecision`], taken from the first
//! rule that resolves it:
//!
//! 1. not a regular file → warn and skip, no remote call
//! 2. key absent from the catalog → upload, no metadata request
//! 3. size differs from the catalog → upload
//! 4. fetch metadata: failed or absent → fail this file; no stored hash →
//!    upload; hash differs → upload; hash matches → skip
//!
//! Checks against the listing run before the `HEAD` request, which runs before
//! reading and hashing the file. After every file has been handled, remote
//! keys with no local counterpart are deleted in one batch.

use std::collections::BTreeSet;
use std::path::PathBuf;

use futures::stream::{self, StreamExt as _};
use site_sync_models::{
    Catalog, FailReason, FileOutcome, ObjectMetadata, OrphanOutcome, OutcomeStatus, SkipReason,
    SyncDecision, UploadReason, WarnReason,
};
use site_sync_r2::{HeadResult, Remote};

use crate::hash::{self, HashedBody};
use crate::local::{self, LocalFile};
use crate::sink::{DecisionSink, RunStart};
use crate::{Scope, SyncError};

/// Default number of files reconciled concurrently.
pub const DEFAULT_CONCURRENCY: usize = 8;

/// Counts of what a run did.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SyncStats {
    /// Files successfully uploaded.
    pub uploaded: u64,
    /// Files left alone because the remote already matches.
    pub skipped: u64,
    /// Entries skipped with a warning (not regular files).
    pub warned: u64,
    /// Files whose state could not be determined or whose upload failed.
    pub failed: u64,
    /// Orphans deleted from the remote.
    pub deleted: u64,
}

impl SyncStats {
    /// Counts file outcomes. Orphan deletions are not included.
    #[must_use]
    pub fn from_outcomes(outcomes: &[FileOutcome]) -> Self {
        let mut stats = Self::default();
        for outcome in outcomes {
            match (&outcome.decision, &outcome.status) {
                (_, OutcomeStatus::Failed(_)) => stats.failed += 1,
                (SyncDecision::Upload(_), OutcomeStatus::Done) => stats.uploaded += 1,
                (SyncDecision::Skip(_), OutcomeStatus::Done) => stats.skipped += 1,
                (SyncDecision::Warn(_) | SyncDecision::Fail(_), OutcomeStatus::Done) => {
                    stats.warned += 1;
                }
            }
        }
        stats
    }
}

impl std::fmt::Display for SyncStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} uploaded, {} skipped (unchanged), {} warned, {} failed, {} orphan(s) deleted",
            self.uploaded, self.skipped, self.warned, self.failed, self.deleted
        )
    }
}

/// Everything a sync run decided and did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    /// One outcome per local entry in scope, sorted by name.
    pub outcomes: Vec<FileOutcome>,
    pub orphans: OrphanOutcome,
}

impl SyncReport {
    #[must_use]
    pub fn stats(&self) -> SyncStats {
        let mut stats = SyncStats::from_outcomes(&self.outcomes);
        if let OrphanOutcome::Deleted { keys } = &self.orphans {
            stats.deleted = keys.len() as u64;
        }
        stats
    }

    /// Returns `true` if any file or the orphan deletion failed.
    #[must_use]
    pub fn has_failures(&self) -> bool {
        self.orphans.is_failure() || self.outcomes.iter().any(FileOutcome::is_failure)
    }
}

/// Reconciles the files directly under `root` with a bucket.
pub struct SyncEngine {
    remote: Remote,
    root: PathBuf,
    concurrency: usize,
}

impl SyncEngine {
    #[must_use]
    pub fn new(remote: Remote, root: impl Into<PathBuf>) -> Self {
        Self {
            remote,
            root: root.into(),
            concurrency: DEFAULT_CONCURRENCY,
        }
    }

    /// Sets how many files are reconciled at once (at least one).
    #[must_use]
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Makes the bucket match the local files in `scope`.
    ///
    /// The catalog is listed once up front. Per-file problems become failed
    /// outcomes and never stop the run; a failed orphan deletion is
    /// reported in [`SyncReport::orphans`].
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Catalog`] if the bucket cannot be listed
    /// completely, or [`SyncError::Enumerate`] if the sync root cannot be
    /// read. Nothing is uploaded or deleted in either case.
    pub async fn sync(
        &self,
        scope: Scope,
        sink: &dyn DecisionSink,
    ) -> Result<SyncReport, SyncError> {
        let mut catalog = self.remote.list_catalog().await?;
        catalog.retain(|key| scope.includes(key));

        let mut files = local::enumerate(&self.root)
            .await
            .map_err(|source| SyncError::Enumerate {
                path: self.root.clone(),
                source,
            })?;
        files.retain(|file| scope.includes(&file.name));

        log::info!(
            "Reconciling {} local entries against {} remote objects (scope {scope:?})",
            files.len(),
            catalog.len()
        );
        sink.on_start(RunStart {
            total: files.len(),
            name_width: name_width(
                files.iter().map(|f| f.name.as_str()).chain(catalog.keys()),
            ),
        });

        let catalog = &catalog;
        let mut outcomes: Vec<FileOutcome> = stream::iter(&files)
            .map(|file| self.reconcile(file, catalog))
            .buffer_unordered(self.concurrency)
            .inspect(|outcome| sink.on_outcome(outcome))
            .collect()
            .await;
        outcomes.sort_by(|a, b| a.name.cmp(&b.name));

        let local_names: BTreeSet<&str> = files.iter().map(|f| f.name.as_str()).collect();
        let orphans: Vec<String> = catalog
            .keys()
            .filter(|key| !local_names.contains(key))
            .map(str::to_string)
            .collect();

        let orphans = self.delete_orphans(orphans).await;
        sink.on_orphans(&orphans);

        Ok(SyncReport { outcomes, orphans })
    }

    /// Uploads the named files unconditionally, without listing or probing
    /// the bucket. Duplicate names are uploaded once.
    ///
    /// Returns one outcome per distinct name, sorted by name.
    pub async fn push(&self, names: &[String], sink: &dyn DecisionSink) -> Vec<FileOutcome> {
        let names: BTreeSet<&str> = names.iter().map(String::as_str).collect();
        log::info!("Pushing {} file(s) unconditionally", names.len());
        sink.on_start(RunStart {
            total: names.len(),
            name_width: name_width(names.iter().copied()),
        });

        let mut outcomes: Vec<FileOutcome> = stream::iter(names)
            .map(|name| self.push_one(name))
            .buffer_unordered(self.concurrency)
            .inspect(|outcome| sink.on_outcome(outcome))
            .collect()
            .await;
        outcomes.sort_by(|a, b| a.name.cmp(&b.name));
        outcomes
    }

    async fn push_one(&self, name: &str) -> FileOutcome {
        match local::lookup(&self.root, name).await {
            Ok(file) if file.is_file() => self.upload(&file, UploadReason::Forced, None).await,
            Ok(file) => outcome(&file.name, SyncDecision::Warn(WarnReason::NotAFile), Ok(())),
            Err(e) => outcome(
                name,
                SyncDecision::Fail(FailReason::Unreadable),
                Err(e.to_string()),
            ),
        }
    }

    async fn reconcile(&self, file: &LocalFile, catalog: &Catalog) -> FileOutcome {
        if !file.is_file() {
            return outcome(&file.name, SyncDecision::Warn(WarnReason::NotAFile), Ok(()));
        }

        let Some(listed) = catalog.get(&file.name) else {
            return self.upload(file, UploadReason::NotOnRemote, None).await;
        };

        if listed.size != file.size {
            return self.upload(file, UploadReason::SizeDiffers, None).await;
        }

        let metadata = match self.remote.head(&file.name).await {
            HeadResult::Found(metadata) => metadata,
            HeadResult::Absent => {
                return outcome(
                    &file.name,
                    SyncDecision::Fail(FailReason::NotFoundAfterListing),
                    Err("object was listed but HEAD found nothing".to_string()),
                );
            }
            HeadResult::Failed(e) => {
                return outcome(
                    &file.name,
                    SyncDecision::Fail(FailReason::HeadFailed),
                    Err(e.to_string()),
                );
            }
        };

        let Some(remote_hash) = metadata.content_hash else {
            return self.upload(file, UploadReason::MissingHash, None).await;
        };

        let body = match hash::read_and_hash(file.path()).await {
            Ok(body) => body,
            Err(e) => {
                return outcome(
                    &file.name,
                    SyncDecision::Fail(FailReason::Unreadable),
                    Err(e.to_string()),
                );
            }
        };

        if body.hash == remote_hash {
            outcome(&file.name, SyncDecision::Skip(SkipReason::HashMatches), Ok(()))
        } else {
            self.upload(file, UploadReason::HashMismatch, Some(body)).await
        }
    }

    /// Uploads `file` with its content hash attached, reusing `body` when
    /// the file was already read.
    async fn upload(
        &self,
        file: &LocalFile,
        reason: UploadReason,
        body: Option<HashedBody>,
    ) -> FileOutcome {
        let decision = SyncDecision::Upload(reason);
        log::debug!("{}: {decision}", file.name);

        let body = match body {
            Some(body) => body,
            None => match hash::read_and_hash(file.path()).await {
                Ok(body) => body,
                Err(e) => return outcome(&file.name, decision, Err(e.to_string())),
            },
        };

        let metadata = ObjectMetadata::for_upload(body.bytes.len() as u64, body.hash);
        let result = self
            .remote
            .put(&file.name, body.bytes, &metadata)
            .await
            .map_err(|e| e.to_string());

        outcome(&file.name, decision, result)
    }

    async fn delete_orphans(&self, orphans: Vec<String>) -> OrphanOutcome {
        if orphans.is_empty() {
            log::info!("Remote is clean");
            return OrphanOutcome::Clean;
        }

        match self.remote.delete_many(&orphans).await {
            Ok(()) => OrphanOutcome::Deleted { keys: orphans },
            Err(e) => {
                log::error!("Failed to delete {} orphan(s): {e}", orphans.len());
                OrphanOutcome::Failed {
                    keys: orphans,
                    error: e.to_string(),
                }
            }
        }
    }
}

/// Widest of `names`, in characters.
fn name_width<'a>(names: impl Iterator<Item = &'a str>) -> usize {
    names.map(|name| name.chars().count()).max().unwrap_or(0)
}

fn outcome(name: &str, decision: SyncDecision, result: Result<(), String>) -> FileOutcome {
    let status = match result {
        Ok(()) => OutcomeStatus::Done,
        Err(e) => {
            log::warn!("{name}: {decision} failed: {e}");
            OutcomeStatus::Failed(e)
        }
    };

    FileOutcome {
        name: name.to_string(),
        decision,
        status,
    }
}
