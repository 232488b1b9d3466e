//! # Correspondence State
//!
//! The persisted mapping between source folders and their two mirror
//! counterparts.
//!
//! ## Overview
//!
//! One [`FolderState`] exists per visited source folder. It records the
//! folder's own id in all three trees plus one [`CorrespondenceRecord`] per
//! direct child that has been mirrored completely. Records are keyed by
//! source id and split into a files map and a folders map; an id may appear
//! in at most one of them.
//!
//! [`CorrespondenceStore`] is the persistence contract. [`JsonFileStore`]
//! keeps one `<folder id>.json` document per folder in a state directory,
//! written through a temporary file and renamed into place.
//!
//! ## On-disk format
//!
//! ```json
//! {
//!   "schema": 1,
//!   "ids": { "source_id": "", "blob_id": "1AbC", "index_id": "9f2e" },
//!   "files": {
//!     "doc-1": {
//!       "source_id": "doc-1",
//!       "source_version": "7",
//!       "name": "Meeting notes",
//!       "blob_id": "1XyZ",
//!       "blob_url": "https://drive.google.com/file/d/1XyZ/view",
//!       "index_id": "b41c"
//!     }
//!   },
//!   "folders": {}
//! }
//! ```
//!
//! Documents with another `schema` value, unknown fields or a broken
//! files/folders invariant are rejected with [`SyncError::StateRead`].

use async_trait::async_trait;
use bridge_traits::{storage::FileSystemAccess, MirrorItem, Node};
use bytes::Bytes;
use core_runtime::config::MirrorRoots;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, instrument};

use crate::{Result, SyncError};

/// Current on-disk schema tag.
pub const STATE_SCHEMA_VERSION: u32 = 1;

/// File stem used for a folder whose source id is the empty string.
const ROOT_FILE_STEM: &str = "_root";

const STATE_EXTENSION: &str = "json";

/// A folder's identity in the source tree and in both mirrors.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MirrorIds {
    pub source_id: String,
    pub blob_id: String,
    pub index_id: String,
}

impl MirrorIds {
    pub fn new(
        source_id: impl Into<String>,
        blob_id: impl Into<String>,
        index_id: impl Into<String>,
    ) -> Self {
        Self {
            source_id: source_id.into(),
            blob_id: blob_id.into(),
            index_id: index_id.into(),
        }
    }
}

impl From<MirrorRoots> for MirrorIds {
    fn from(roots: MirrorRoots) -> Self {
        Self {
            source_id: roots.source_id,
            blob_id: roots.blob_id,
            index_id: roots.index_id,
        }
    }
}

/// Recorded mapping of one mirrored source node.
///
/// `source_version` is the last version whose mirror operations all
/// succeeded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CorrespondenceRecord {
    pub source_id: String,
    pub source_version: String,
    /// Name the item carries in both mirrors
    pub name: String,
    pub blob_id: String,
    /// Shareable blob link, files only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blob_url: Option<String>,
    /// Link block id for files, sub-page id for folders
    pub index_id: String,
}

impl CorrespondenceRecord {
    /// Record for a file uploaded as `blob` and linked from `index_block_id`.
    pub fn file(node: &Node, blob: MirrorItem, index_block_id: impl Into<String>) -> Self {
        Self {
            source_id: node.id.clone(),
            source_version: node.version.clone(),
            name: node.name.clone(),
            blob_id: blob.id,
            blob_url: Some(blob.url),
            index_id: index_block_id.into(),
        }
    }

    /// Record for a folder created as `blob_folder_id` with sub-page `index_page_id`.
    pub fn folder(
        node: &Node,
        blob_folder_id: impl Into<String>,
        index_page_id: impl Into<String>,
    ) -> Self {
        Self {
            source_id: node.id.clone(),
            source_version: node.version.clone(),
            name: node.name.clone(),
            blob_id: blob_folder_id.into(),
            blob_url: None,
            index_id: index_page_id.into(),
        }
    }

    /// Ids to visit this record as a folder.
    pub fn mirror_ids(&self) -> MirrorIds {
        MirrorIds::new(&self.source_id, &self.blob_id, &self.index_id)
    }
}

/// Correspondence snapshot for one source folder's direct children.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FolderState {
    schema: u32,
    ids: MirrorIds,
    #[serde(default)]
    files: BTreeMap<String, CorrespondenceRecord>,
    #[serde(default)]
    folders: BTreeMap<String, CorrespondenceRecord>,
}

impl FolderState {
    /// Empty state for a folder visited for the first time.
    pub fn new(ids: MirrorIds) -> Self {
        Self {
            schema: STATE_SCHEMA_VERSION,
            ids,
            files: BTreeMap::new(),
            folders: BTreeMap::new(),
        }
    }

    pub fn schema(&self) -> u32 {
        self.schema
    }

    pub fn ids(&self) -> &MirrorIds {
        &self.ids
    }

    pub fn folder_id(&self) -> &str {
        &self.ids.source_id
    }

    pub fn set_ids(&mut self, ids: MirrorIds) {
        self.ids = ids;
    }

    pub fn files(&self) -> &BTreeMap<String, CorrespondenceRecord> {
        &self.files
    }

    pub fn folders(&self) -> &BTreeMap<String, CorrespondenceRecord> {
        &self.folders
    }

    pub fn file(&self, source_id: &str) -> Option<&CorrespondenceRecord> {
        self.files.get(source_id)
    }

    pub fn folder(&self, source_id: &str) -> Option<&CorrespondenceRecord> {
        self.folders.get(source_id)
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty() && self.folders.is_empty()
    }

    /// Insert or replace a file record, returning the previous one.
    ///
    /// # Errors
    ///
    /// [`SyncError::KindConflict`] if the id is already recorded as a folder.
    pub fn record_file(
        &mut self,
        record: CorrespondenceRecord,
    ) -> Result<Option<CorrespondenceRecord>> {
        if self.folders.contains_key(&record.source_id) {
            return Err(SyncError::KindConflict {
                id: record.source_id,
            });
        }
        Ok(self.files.insert(record.source_id.clone(), record))
    }

    /// Insert or replace a folder record, returning the previous one.
    ///
    /// # Errors
    ///
    /// [`SyncError::KindConflict`] if the id is already recorded as a file.
    pub fn record_folder(
        &mut self,
        record: CorrespondenceRecord,
    ) -> Result<Option<CorrespondenceRecord>> {
        if self.files.contains_key(&record.source_id) {
            return Err(SyncError::KindConflict {
                id: record.source_id,
            });
        }
        Ok(self.folders.insert(record.source_id.clone(), record))
    }

    pub fn remove_file(&mut self, source_id: &str) -> Option<CorrespondenceRecord> {
        self.files.remove(source_id)
    }

    pub fn remove_folder(&mut self, source_id: &str) -> Option<CorrespondenceRecord> {
        self.folders.remove(source_id)
    }

    /// Check the schema tag and structural invariants of a loaded snapshot.
    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: String| SyncError::StateRead {
            folder_id: self.ids.source_id.clone(),
            reason,
        };

        if self.schema != STATE_SCHEMA_VERSION {
            return Err(invalid(format!(
                "unsupported schema {} (expected {})",
                self.schema, STATE_SCHEMA_VERSION
            )));
        }

        for (key, record) in self.files.iter().chain(self.folders.iter()) {
            if key != &record.source_id {
                return Err(invalid(format!(
                    "record key {} does not match source id {}",
                    key, record.source_id
                )));
            }
        }

        if let Some(id) = self.files.keys().find(|id| self.folders.contains_key(*id)) {
            return Err(invalid(format!(
                "{} is recorded as both a file and a folder",
                id
            )));
        }

        Ok(())
    }
}

/// Persistence contract for folder snapshots.
///
/// Absence of a snapshot is a normal state and is reported as `Ok(None)`.
#[async_trait]
pub trait CorrespondenceStore: Send + Sync {
    /// Load the snapshot for `folder_id`.
    ///
    /// # Errors
    ///
    /// [`SyncError::StateRead`] when a snapshot exists but cannot be decoded
    /// or fails validation.
    async fn load(&self, folder_id: &str) -> Result<Option<FolderState>>;

    /// Overwrite the snapshot for `state.folder_id()`.
    async fn save(&self, state: &FolderState) -> Result<()>;

    /// Delete snapshots whose folder id is not in `live_folder_ids`.
    ///
    /// Returns the ids that were removed.
    async fn prune(&self, live_folder_ids: &HashSet<String>) -> Result<Vec<String>>;
}

/// JSON snapshot store over a [`FileSystemAccess`] bridge.
pub struct JsonFileStore {
    fs: Arc<dyn FileSystemAccess>,
    dir: PathBuf,
}

impl JsonFileStore {
    pub fn new(fs: Arc<dyn FileSystemAccess>, dir: impl Into<PathBuf>) -> Self {
        Self {
            fs,
            dir: dir.into(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the snapshot for `folder_id`.
    pub fn state_path(&self, folder_id: &str) -> Result<PathBuf> {
        Ok(self
            .dir
            .join(format!("{}.{}", file_stem(folder_id)?, STATE_EXTENSION)))
    }
}

fn file_stem(folder_id: &str) -> Result<&str> {
    if folder_id.is_empty() {
        return Ok(ROOT_FILE_STEM);
    }

    let unsafe_id = folder_id == ROOT_FILE_STEM
        || folder_id.contains(&['/', '\\', '\0'][..])
        || folder_id == "."
        || folder_id == "..";

    if unsafe_id {
        return Err(SyncError::InvalidFolderId(folder_id.to_string()));
    }

    Ok(folder_id)
}

fn folder_id_from_path(path: &Path) -> Option<String> {
    if path.extension()?.to_str()? != STATE_EXTENSION {
        return None;
    }
    let stem = path.file_stem()?.to_str()?;
    if stem == ROOT_FILE_STEM {
        Some(String::new())
    } else {
        Some(stem.to_string())
    }
}

#[async_trait]
impl CorrespondenceStore for JsonFileStore {
    #[instrument(skip(self))]
    async fn load(&self, folder_id: &str) -> Result<Option<FolderState>> {
        let path = self.state_path(folder_id)?;
        let read_error = |reason: String| SyncError::StateRead {
            folder_id: folder_id.to_string(),
            reason,
        };

        let exists = self
            .fs
            .exists(&path)
            .await
            .map_err(|e| read_error(e.to_string()))?;
        if !exists {
            debug!(path = ?path, "No recorded state");
            return Ok(None);
        }

        let data = self
            .fs
            .read_file(&path)
            .await
            .map_err(|e| read_error(e.to_string()))?;

        let state: FolderState =
            serde_json::from_slice(&data).map_err(|e| read_error(e.to_string()))?;
        state.validate()?;

        if state.folder_id() != folder_id {
            return Err(read_error(format!(
                "snapshot belongs to folder '{}'",
                state.folder_id()
            )));
        }

        debug!(
            files = state.files.len(),
            folders = state.folders.len(),
            "Loaded folder state"
        );
        Ok(Some(state))
    }

    #[instrument(skip(self, state), fields(folder_id = %state.folder_id()))]
    async fn save(&self, state: &FolderState) -> Result<()> {
        let folder_id = state.folder_id();
        let path = self.state_path(folder_id)?;
        let tmp_path = path.with_extension("json.tmp");
        let write_error = |reason: String| SyncError::StateWrite {
            folder_id: folder_id.to_string(),
            reason,
        };

        let data = serde_json::to_vec_pretty(state).map_err(|e| write_error(e.to_string()))?;

        self.fs
            .create_dir_all(&self.dir)
            .await
            .map_err(|e| write_error(e.to_string()))?;
        self.fs
            .write_file(&tmp_path, Bytes::from(data))
            .await
            .map_err(|e| write_error(e.to_string()))?;
        self.fs
            .rename(&tmp_path, &path)
            .await
            .map_err(|e| write_error(e.to_string()))?;

        debug!(path = ?path, "Saved folder state");
        Ok(())
    }

    #[instrument(skip(self, live_folder_ids), fields(live = live_folder_ids.len()))]
    async fn prune(&self, live_folder_ids: &HashSet<String>) -> Result<Vec<String>> {
        let dir_error = |reason: String| SyncError::StateWrite {
            folder_id: self.dir.display().to_string(),
            reason,
        };

        let exists = self
            .fs
            .exists(&self.dir)
            .await
            .map_err(|e| dir_error(e.to_string()))?;
        if !exists {
            return Ok(Vec::new());
        }

        let entries = self
            .fs
            .list_directory(&self.dir)
            .await
            .map_err(|e| dir_error(e.to_string()))?;

        let mut removed = Vec::new();
        for path in entries {
            let Some(folder_id) = folder_id_from_path(&path) else {
                continue;
            };
            if live_folder_ids.contains(&folder_id) {
                continue;
            }

            self.fs
                .delete_file(&path)
                .await
                .map_err(|e| SyncError::StateWrite {
                    folder_id: folder_id.clone(),
                    reason: e.to_string(),
                })?;
            removed.push(folder_id);
        }

        removed.sort();
        if !removed.is_empty() {
            info!(removed = removed.len(), "Pruned orphaned folder state");
        }
        Ok(removed)
    }
}
