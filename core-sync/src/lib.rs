//! # Tree Reconciliation Engine
//!
//! Mirrors a source document tree into a blob mirror and an index mirror,
//! incrementally.
//!
//! ## Overview
//!
//! Each run compares every source folder against the correspondence recorded
//! the last time it was mirrored, applies only the differences to both
//! mirrors and records the new correspondence. Items whose mirror calls fail
//! are left unrecorded (or at their previous version), so the next run picks
//! them up again without an explicit retry queue.
//!
//! ## Components
//!
//! - **Correspondence State** (`state`): `FolderState` snapshots and the
//!   `CorrespondenceStore` that persists them (`JsonFileStore`)
//! - **Diff Engine** (`diff`): created / modified / deleted classification
//! - **Ordered Insertion** (`ordering`): section-aware child ordering for
//!   index pages
//! - **Ordered Index** (`index`): `IndexMirror` over a block-level `PageStore`
//! - **Sync Job State Machine** (`job`): per-run report and counters
//! - **Sync Coordinator** (`coordinator`): the Load → Diff → Apply → Persist
//!   traversal

pub mod coordinator;
pub mod diff;
pub mod error;
pub mod index;
pub mod job;
pub mod ordering;
pub mod state;

pub use coordinator::{SyncConfig, SyncCoordinator};
pub use diff::{diff, Deletion, DeletionReason, Diff};
pub use error::{Result, SyncError};
pub use index::OrderedIndex;
pub use job::{RunMode, SyncJob, SyncJobId, SyncJobStats, SyncStatus};
pub use ordering::{derive_order, Section, SectionHeaders};
pub use state::{
    CorrespondenceRecord, CorrespondenceStore, FolderState, JsonFileStore, MirrorIds,
    STATE_SCHEMA_VERSION,
};
