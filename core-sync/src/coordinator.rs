//! # Sync Coordinator
//!
//! Walks the source tree and reconciles both mirrors against the recorded
//! correspondence, one folder at a time.
//!
//! ## Workflow
//!
//! 1. Refresh the whole-tree index of live nodes once
//! 2. For each folder, depth-first starting at the root:
//!    - **Load** its snapshot (skipped in full-rebuild mode and for folders
//!      created during this run)
//!    - **Diff** its files and sub-folders against the snapshot
//!    - **Apply** deletions, modifications and creations item by item
//!    - **Persist** the snapshot if any record changed
//!    - **Recurse** into its recorded sub-folders that still live here, sorted
//!      by name
//! 3. Optionally prune snapshots of folders that are no longer live
//!
//! ## Failure handling
//!
//! - A failed item (conversion or any remote call) is logged, counted and
//!   left unrecorded or at its old version, so the next run retries it.
//! - A folder whose listing fails is skipped with its subtree; siblings
//!   continue. A failed snapshot write is counted and traversal continues.
//! - An unreadable snapshot is treated as a fresh subtree.
//! - Failing to refresh the index, or to list the root, fails the run.
//!   Snapshots already written stay on disk.
//!
//! Blob-mirror steps always run before index-mirror steps for the same item.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use core_sync::{MirrorIds, RunMode, SyncConfig, SyncCoordinator};
//!
//! let coordinator = SyncCoordinator::new(
//!     SyncConfig::default(),
//!     source, blob_mirror, index_mirror, store, clock,
//! );
//! let job = coordinator
//!     .run(RunMode::Incremental, MirrorIds::new("", drive_root, index_root))
//!     .await?;
//! println!("{} mirror changes", job.stats.total_mutations());
//! ```

use bridge_traits::{BlobMirror, Clock, IndexMirror, Node, NodeIndex, ParentState, SourceTree};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

use crate::diff::{diff, Diff};
use crate::job::{RunMode, SyncJob, SyncJobStats};
use crate::state::{CorrespondenceRecord, CorrespondenceStore, FolderState, MirrorIds};
use crate::{Result, SyncError};

/// Tunables for a coordinator
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncConfig {
    /// Write every visited folder's snapshot, even when nothing changed
    pub always_persist: bool,
    /// After a completed incremental run, delete snapshots of folders that
    /// are no longer live
    pub prune_orphans: bool,
}

/// One pending folder visit
#[derive(Debug, Clone)]
struct FolderVisit {
    ids: MirrorIds,
    /// Created in the mirrors during this run; any snapshot on disk is stale
    fresh: bool,
}

/// What applying one folder's diff did
#[derive(Debug, Default)]
struct ApplyOutcome {
    changed: bool,
    created_folders: HashSet<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ItemKind {
    File,
    Folder,
}

impl ItemKind {
    fn as_str(&self) -> &'static str {
        match self {
            ItemKind::File => "file",
            ItemKind::Folder => "folder",
        }
    }
}

/// Reconciles a source tree into a blob mirror and an index mirror
pub struct SyncCoordinator {
    config: SyncConfig,
    source: Arc<dyn SourceTree>,
    blob: Arc<dyn BlobMirror>,
    index: Arc<dyn IndexMirror>,
    store: Arc<dyn CorrespondenceStore>,
    clock: Arc<dyn Clock>,
}

impl SyncCoordinator {
    pub fn new(
        config: SyncConfig,
        source: Arc<dyn SourceTree>,
        blob: Arc<dyn BlobMirror>,
        index: Arc<dyn IndexMirror>,
        store: Arc<dyn CorrespondenceStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            config,
            source,
            blob,
            index,
            store,
            clock,
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Run one reconciliation pass starting at `root`.
    ///
    /// Returns the job report; a run that could not proceed is reported with
    /// status `Failed` rather than as an `Err`.
    ///
    /// # Errors
    ///
    /// Only invalid job state transitions are returned as errors.
    #[instrument(skip(self, root), fields(mode = %mode, root = %root.source_id))]
    pub async fn run(&self, mode: RunMode, root: MirrorIds) -> Result<SyncJob> {
        let clock = self.clock.as_ref();
        let job = SyncJob::new(mode, root.source_id.clone(), clock).start(clock)?;
        let mut stats = SyncJobStats::new();

        info!(job_id = %job.id, "Starting mirror run");

        let by_id = match self.source.refresh_index().await {
            Ok(index) => index,
            Err(e) => {
                error!(error = %e, "Failed to refresh source index");
                return job.fail(format!("Failed to refresh source index: {}", e), stats, clock);
            }
        };
        debug!(live_nodes = by_id.len(), "Source index refreshed");

        let root_id = root.source_id.clone();
        let mut pending = vec![FolderVisit {
            ids: root,
            fresh: false,
        }];
        let mut at_root = true;

        while let Some(visit) = pending.pop() {
            match self.visit_folder(&visit, mode, &by_id, &mut stats).await {
                Ok(children) => pending.extend(children.into_iter().rev()),
                Err(e) => {
                    stats.folders_failed += 1;
                    error!(
                        folder_id = %visit.ids.source_id,
                        error = %e,
                        "Folder visit failed, skipping subtree"
                    );
                    if at_root {
                        return job.fail(format!("Failed to visit root folder: {}", e), stats, clock);
                    }
                }
            }
            at_root = false;
        }

        if mode == RunMode::Incremental && self.config.prune_orphans {
            let mut live: HashSet<String> = by_id.live_folder_ids().map(str::to_string).collect();
            live.insert(root_id);
            match self.store.prune(&live).await {
                Ok(removed) => stats.states_pruned = removed.len() as u64,
                Err(e) => warn!(error = %e, "Failed to prune orphaned folder state"),
            }
        }

        info!(
            job_id = %job.id,
            mutations = stats.total_mutations(),
            items_failed = stats.items_failed,
            folders_failed = stats.folders_failed,
            folders_persisted = stats.folders_persisted,
            "Mirror run completed"
        );

        job.complete(stats, clock)
    }

    #[instrument(skip(self, visit, by_id, stats), fields(folder_id = %visit.ids.source_id))]
    async fn visit_folder(
        &self,
        visit: &FolderVisit,
        mode: RunMode,
        by_id: &NodeIndex,
        stats: &mut SyncJobStats,
    ) -> Result<Vec<FolderVisit>> {
        let (mut state, must_persist) = self.load_state(visit, mode).await;

        let listing = self.source.list_children(&visit.ids.source_id).await?;
        let file_diff = diff(&listing.files, state.files(), by_id);
        let folder_diff = diff(&listing.folders, state.folders(), by_id);

        if file_diff.is_empty() && folder_diff.is_empty() {
            debug!("Folder unchanged");
        } else {
            info!(
                files_created = file_diff.created.len(),
                files_modified = file_diff.modified.len(),
                files_deleted = file_diff.deleted.len(),
                folders_created = folder_diff.created.len(),
                folders_modified = folder_diff.modified.len(),
                folders_deleted = folder_diff.deleted.len(),
                "Folder diffed"
            );
        }

        let mut outcome = ApplyOutcome::default();
        self.apply(&mut state, ItemKind::File, &file_diff, stats, &mut outcome)
            .await;
        self.apply(&mut state, ItemKind::Folder, &folder_diff, stats, &mut outcome)
            .await;

        if must_persist || outcome.changed || self.config.always_persist {
            match self.store.save(&state).await {
                Ok(()) => stats.folders_persisted += 1,
                Err(e) => {
                    stats.folders_failed += 1;
                    error!(error = %e, "Failed to persist folder state");
                }
            }
        }

        let mut children: Vec<&CorrespondenceRecord> = state
            .folders()
            .values()
            .filter(|record| !folder_diff.is_deleted(&record.source_id))
            .filter(|record| {
                let moved = moved_away(by_id, &record.source_id, &visit.ids.source_id);
                if moved {
                    debug!(
                        source_id = %record.source_id,
                        name = %record.name,
                        "Folder moved to another parent, not descending"
                    );
                }
                !moved
            })
            .collect();
        children.sort_by(|a, b| a.name.cmp(&b.name));

        Ok(children
            .into_iter()
            .map(|record| FolderVisit {
                ids: record.mirror_ids(),
                fresh: outcome.created_folders.contains(&record.source_id),
            })
            .collect())
    }

    /// Snapshot to diff against, and whether it must be written back even
    /// if no record changes.
    async fn load_state(&self, visit: &FolderVisit, mode: RunMode) -> (FolderState, bool) {
        let fresh = || FolderState::new(visit.ids.clone());

        if mode == RunMode::FullRebuild || visit.fresh {
            return (fresh(), true);
        }

        match self.store.load(&visit.ids.source_id).await {
            Ok(Some(state)) if state.ids() == &visit.ids => (state, false),
            Ok(Some(state)) => {
                warn!(
                    recorded = ?state.ids(),
                    expected = ?visit.ids,
                    "Recorded mirror ids differ, treating as fresh subtree"
                );
                (fresh(), true)
            }
            Ok(None) => {
                debug!("No recorded state, treating as fresh subtree");
                (fresh(), false)
            }
            Err(e) => {
                warn!(error = %e, "Folder state unreadable, treating as fresh subtree");
                (fresh(), true)
            }
        }
    }

    async fn apply(
        &self,
        state: &mut FolderState,
        kind: ItemKind,
        diff: &Diff,
        stats: &mut SyncJobStats,
        outcome: &mut ApplyOutcome,
    ) {
        let parent = state.ids().clone();

        for deletion in &diff.deleted {
            let record = match kind {
                ItemKind::File => state.file(&deletion.source_id),
                ItemKind::Folder => state.folder(&deletion.source_id),
            };
            let Some(record) = record.cloned() else {
                continue;
            };

            match self.remove_item(&record).await {
                Ok(()) => {
                    match kind {
                        ItemKind::File => {
                            state.remove_file(&record.source_id);
                            stats.files_deleted += 1;
                        }
                        ItemKind::Folder => {
                            state.remove_folder(&record.source_id);
                            stats.folders_deleted += 1;
                        }
                    }
                    outcome.changed = true;
                    info!(
                        kind = kind.as_str(),
                        source_id = %record.source_id,
                        name = %record.name,
                        reason = ?deletion.reason,
                        "Removed from mirrors"
                    );
                }
                Err(e) => item_failed(stats, kind, "delete", &record.source_id, &record.name, &e),
            }
        }

        for node in &diff.modified {
            let record = match kind {
                ItemKind::File => state.file(&node.id),
                ItemKind::Folder => state.folder(&node.id),
            };
            let Some(record) = record.cloned() else {
                continue;
            };

            let result = match kind {
                ItemKind::File => self.update_file(&record, node).await,
                ItemKind::Folder => self.update_folder(&record, node).await,
            };
            match result.and_then(|updated| record_item(state, kind, updated)) {
                Ok(()) => {
                    match kind {
                        ItemKind::File => stats.files_updated += 1,
                        ItemKind::Folder => stats.folders_updated += 1,
                    }
                    outcome.changed = true;
                    info!(kind = kind.as_str(), source_id = %node.id, name = %node.name, "Updated in mirrors");
                }
                Err(e) => item_failed(stats, kind, "update", &node.id, &node.name, &e),
            }
        }

        for node in &diff.created {
            let recorded_as_other = match kind {
                ItemKind::File => state.folder(&node.id).is_some(),
                ItemKind::Folder => state.file(&node.id).is_some(),
            };
            if recorded_as_other {
                let e = SyncError::KindConflict {
                    id: node.id.clone(),
                };
                item_failed(stats, kind, "create", &node.id, &node.name, &e);
                continue;
            }

            let result = match kind {
                ItemKind::File => self.create_file(&parent, node).await,
                ItemKind::Folder => self.create_folder(&parent, node).await,
            };
            match result.and_then(|created| record_item(state, kind, created)) {
                Ok(()) => {
                    match kind {
                        ItemKind::File => stats.files_created += 1,
                        ItemKind::Folder => {
                            stats.folders_created += 1;
                            outcome.created_folders.insert(node.id.clone());
                        }
                    }
                    outcome.changed = true;
                    info!(kind = kind.as_str(), source_id = %node.id, name = %node.name, "Created in mirrors");
                }
                Err(e) => item_failed(stats, kind, "create", &node.id, &node.name, &e),
            }
        }
    }

    async fn create_file(&self, parent: &MirrorIds, node: &Node) -> Result<CorrespondenceRecord> {
        let content = self.source.fetch_converted_content(&node.id).await?;
        let blob = self.blob.upload(&parent.blob_id, &node.name, content).await?;
        let block_id = self
            .index
            .add_file_link(&parent.index_id, &node.name, &blob.url)
            .await?;
        Ok(CorrespondenceRecord::file(node, blob, block_id))
    }

    async fn update_file(
        &self,
        record: &CorrespondenceRecord,
        node: &Node,
    ) -> Result<CorrespondenceRecord> {
        let renamed = record.name != node.name;
        let content = self.source.fetch_converted_content(&node.id).await?;

        if renamed {
            self.blob.rename(&record.blob_id, &node.name).await?;
        }
        self.blob.replace_content(&record.blob_id, content).await?;
        if renamed {
            self.index
                .rename_file_link(&record.index_id, &node.name)
                .await?;
        }

        Ok(CorrespondenceRecord {
            source_version: node.version.clone(),
            name: node.name.clone(),
            ..record.clone()
        })
    }

    async fn create_folder(
        &self,
        parent: &MirrorIds,
        node: &Node,
    ) -> Result<CorrespondenceRecord> {
        let folder = self.blob.create_folder(&parent.blob_id, &node.name).await?;
        let page_id = self.index.add_sub_page(&parent.index_id, &node.name).await?;
        Ok(CorrespondenceRecord::folder(node, folder.id, page_id))
    }

    async fn update_folder(
        &self,
        record: &CorrespondenceRecord,
        node: &Node,
    ) -> Result<CorrespondenceRecord> {
        if record.name != node.name {
            self.blob.rename(&record.blob_id, &node.name).await?;
            self.index
                .rename_sub_page(&record.index_id, &node.name)
                .await?;
        }

        Ok(CorrespondenceRecord {
            source_version: node.version.clone(),
            name: node.name.clone(),
            ..record.clone()
        })
    }

    async fn remove_item(&self, record: &CorrespondenceRecord) -> Result<()> {
        self.blob.trash(&record.blob_id).await?;
        self.index.remove(&record.index_id).await?;
        Ok(())
    }
}

/// A recorded folder that now lives under a different parent. Its subtree
/// is visited from the new parent only.
fn moved_away(by_id: &NodeIndex, folder_id: &str, parent_id: &str) -> bool {
    matches!(
        by_id.get(folder_id).map(|node| &node.parent),
        Some(ParentState::Active(current)) if current != parent_id
    )
}

fn record_item(state: &mut FolderState, kind: ItemKind, record: CorrespondenceRecord) -> Result<()> {
    match kind {
        ItemKind::File => state.record_file(record)?,
        ItemKind::Folder => state.record_folder(record)?,
    };
    Ok(())
}

fn item_failed(
    stats: &mut SyncJobStats,
    kind: ItemKind,
    operation: &str,
    source_id: &str,
    name: &str,
    error: &SyncError,
) {
    stats.items_failed += 1;
    error!(
        kind = kind.as_str(),
        operation,
        source_id,
        name,
        error = %error,
        "Item skipped, will retry next run"
    );
}
