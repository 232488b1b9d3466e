//! Source Tree Abstractions
//!
//! The source tree is the user's document hierarchy on the note-taking
//! service. The core only ever reads from it: it lists folders, refreshes a
//! whole-tree index once per run, and fetches rendered document content.

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::Result;

/// Whether a node is a document or a folder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    File,
    Folder,
}

/// Where a node currently lives in the source tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "parent_id", rename_all = "lowercase")]
pub enum ParentState {
    /// Node is live under the given parent folder
    Active(String),
    /// Node was moved to the trash
    Trashed,
}

impl ParentState {
    pub fn is_trashed(&self) -> bool {
        matches!(self, ParentState::Trashed)
    }
}

/// A single item of the source tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    /// Opaque identifier, stable across runs
    pub id: String,
    /// Display name
    pub name: String,
    /// Opaque version token; changes iff the content changed
    pub version: String,
    pub kind: NodeKind,
    pub parent: ParentState,
}

impl Node {
    pub fn file(
        id: impl Into<String>,
        name: impl Into<String>,
        version: impl Into<String>,
        parent: ParentState,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            version: version.into(),
            kind: NodeKind::File,
            parent,
        }
    }

    pub fn folder(
        id: impl Into<String>,
        name: impl Into<String>,
        version: impl Into<String>,
        parent: ParentState,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            version: version.into(),
            kind: NodeKind::Folder,
            parent,
        }
    }

    pub fn is_folder(&self) -> bool {
        self.kind == NodeKind::Folder
    }
}

/// Direct children of one folder, each list sorted by name
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FolderListing {
    pub files: Vec<Node>,
    pub folders: Vec<Node>,
}

impl FolderListing {
    pub fn new(mut files: Vec<Node>, mut folders: Vec<Node>) -> Self {
        files.sort_by(|a, b| a.name.cmp(&b.name));
        folders.sort_by(|a, b| a.name.cmp(&b.name));
        Self { files, folders }
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty() && self.folders.is_empty()
    }
}

/// Authoritative whole-tree lookup of every live node by id
///
/// Built once per run by [`SourceTree::refresh_index`]. Trashed nodes stay in
/// the index with [`ParentState::Trashed`]; permanently removed nodes are
/// simply absent.
#[derive(Debug, Clone, Default)]
pub struct NodeIndex {
    nodes: HashMap<String, Node>,
}

impl NodeIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, node: Node) {
        self.nodes.insert(node.id.clone(), node);
    }

    pub fn get(&self, id: &str) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    /// Whether the id resolves to a node that is not in the trash
    pub fn is_live(&self, id: &str) -> bool {
        self.get(id).is_some_and(|node| !node.parent.is_trashed())
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.nodes.keys().map(String::as_str)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    /// Ids of every folder that is not in the trash
    pub fn live_folder_ids(&self) -> impl Iterator<Item = &str> {
        self.nodes()
            .filter(|node| node.is_folder() && !node.parent.is_trashed())
            .map(|node| node.id.as_str())
    }
}

impl FromIterator<Node> for NodeIndex {
    fn from_iter<I: IntoIterator<Item = Node>>(iter: I) -> Self {
        let mut index = NodeIndex::new();
        for node in iter {
            index.insert(node);
        }
        index
    }
}

/// Read-only access to the source document tree
///
/// # Example
///
/// ```ignore
/// use bridge_traits::source::SourceTree;
///
/// async fn count_root(source: &dyn SourceTree, root: &str) -> Result<usize> {
///     let listing = source.list_children(root).await?;
///     Ok(listing.files.len() + listing.folders.len())
/// }
/// ```
#[async_trait]
pub trait SourceTree: Send + Sync {
    /// List the direct children of a folder
    ///
    /// Both lists are sorted by name (case-sensitive). The trash folder is
    /// never returned as a child.
    async fn list_children(&self, folder_id: &str) -> Result<FolderListing>;

    /// Refresh and return the whole-tree index
    ///
    /// Called once per run before the root folder is visited.
    async fn refresh_index(&self) -> Result<NodeIndex>;

    /// Render a document to its portable (PDF) form
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::ConversionFailed`](crate::error::BridgeError::ConversionFailed)
    /// when the document lacks data the renderer requires.
    async fn fetch_converted_content(&self, file_id: &str) -> Result<Bytes>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_listing_sorts_by_name() {
        let parent = ParentState::Active("root".to_string());
        let listing = FolderListing::new(
            vec![
                Node::file("2", "b", "1", parent.clone()),
                Node::file("1", "B", "1", parent.clone()),
                Node::file("3", "a", "1", parent.clone()),
            ],
            vec![],
        );

        let names: Vec<_> = listing.files.iter().map(|n| n.name.as_str()).collect();
        assert_eq!(names, vec!["B", "a", "b"]);
    }

    #[test]
    fn test_node_index_liveness() {
        let index: NodeIndex = vec![
            Node::file("live", "a", "1", ParentState::Active("root".to_string())),
            Node::file("gone", "b", "1", ParentState::Trashed),
        ]
        .into_iter()
        .collect();

        assert!(index.is_live("live"));
        assert!(!index.is_live("gone"));
        assert!(index.contains("gone"));
        assert!(!index.is_live("missing"));
        assert_eq!(index.len(), 2);
    }

    #[test]
    fn test_live_folder_ids() {
        let index: NodeIndex = vec![
            Node::folder("f1", "Work", "1", ParentState::Active("root".to_string())),
            Node::folder("f2", "Old", "1", ParentState::Trashed),
            Node::file("d1", "Doc", "1", ParentState::Active("f1".to_string())),
        ]
        .into_iter()
        .collect();

        let live: Vec<&str> = index.live_folder_ids().collect();
        assert_eq!(live, vec!["f1"]);
    }

    #[test]
    fn test_parent_state_serialization() {
        let json = serde_json::to_string(&ParentState::Active("p1".to_string())).unwrap();
        assert_eq!(json, r#"{"state":"active","parent_id":"p1"}"#);

        let trashed: ParentState = serde_json::from_str(r#"{"state":"trashed"}"#).unwrap();
        assert!(trashed.is_trashed());
    }
}
