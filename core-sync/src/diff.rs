//! # Diff Engine
//!
//! Classifies one folder level of the source tree against its recorded
//! correspondence.
//!
//! ## Rules
//!
//! For a current listing `C`, the whole-tree index of live nodes `L` and the
//! recorded ids `P`:
//!
//! - `created  = C \ P`
//! - `deleted  = (P \ L) ∪ { p ∈ P ∩ L : L[p] is trashed }`
//! - `modified = { p ∈ P ∩ L : L[p] is not trashed and L[p].version ≠ P[p].version }`
//!
//! The three lists are computed independently and are disjoint. With nothing
//! recorded every listed node is created.
//!
//! A node moved to another folder stays live in `L`, so its old parent keeps
//! the record and its new parent reports it as created.

use bridge_traits::{Node, NodeIndex};
use std::collections::BTreeMap;

use crate::state::CorrespondenceRecord;

/// Why a recorded item is being removed from the mirrors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeletionReason {
    /// The node still exists but sits in the trash
    Trashed,
    /// The node no longer resolves in the live index
    Vanished,
}

/// A recorded item that must be removed from both mirrors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deletion {
    pub source_id: String,
    /// Name as last recorded
    pub name: String,
    pub reason: DeletionReason,
}

/// Classification of one folder level.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Diff {
    /// In listing order
    pub created: Vec<Node>,
    /// Sorted by current name
    pub modified: Vec<Node>,
    /// Sorted by recorded name
    pub deleted: Vec<Deletion>,
}

impl Diff {
    pub fn is_empty(&self) -> bool {
        self.created.is_empty() && self.modified.is_empty() && self.deleted.is_empty()
    }

    pub fn len(&self) -> usize {
        self.created.len() + self.modified.len() + self.deleted.len()
    }

    pub fn is_deleted(&self, source_id: &str) -> bool {
        self.deleted.iter().any(|d| d.source_id == source_id)
    }
}

/// Diff `current` (one folder's files or sub-folders) against `previous`.
pub fn diff(
    current: &[Node],
    previous: &BTreeMap<String, CorrespondenceRecord>,
    by_id: &NodeIndex,
) -> Diff {
    let created = current
        .iter()
        .filter(|node| !previous.contains_key(&node.id))
        .cloned()
        .collect();

    let mut modified = Vec::new();
    let mut deleted = Vec::new();

    for (id, record) in previous {
        match by_id.get(id) {
            None => deleted.push(Deletion {
                source_id: id.clone(),
                name: record.name.clone(),
                reason: DeletionReason::Vanished,
            }),
            Some(node) if node.parent.is_trashed() => deleted.push(Deletion {
                source_id: id.clone(),
                name: record.name.clone(),
                reason: DeletionReason::Trashed,
            }),
            Some(node) if node.version != record.source_version => {
                modified.push(node.clone());
            }
            Some(_) => {}
        }
    }

    modified.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
    deleted.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.source_id.cmp(&b.source_id)));

    Diff {
        created,
        modified,
        deleted,
    }
}
