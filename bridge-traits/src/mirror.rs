//! Mirror Abstractions
//!
//! Contracts for the two downstream representations of the source tree:
//!
//! - [`BlobMirror`]: folders and uploaded file blobs (e.g. a cloud drive)
//! - [`IndexMirror`]: pages holding ordered link lists (e.g. a notes wiki)
//!
//! [`PageStore`] is the lower-level block contract an index backend exposes.
//! The core builds an ordered [`IndexMirror`] on top of it, so backends only
//! have to implement plain block CRUD plus a single "replace ordered children"
//! primitive.

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Identity of an item created in the blob mirror
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MirrorItem {
    pub id: String,
    /// Shareable link to the item
    pub url: String,
}

impl MirrorItem {
    pub fn new(id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            url: url.into(),
        }
    }
}

/// Blob storage mirror (folders + uploaded documents)
#[async_trait]
pub trait BlobMirror: Send + Sync {
    /// Upload a new document under `parent_id`
    async fn upload(&self, parent_id: &str, name: &str, content: Bytes) -> Result<MirrorItem>;

    /// Create a folder under `parent_id`
    async fn create_folder(&self, parent_id: &str, name: &str) -> Result<MirrorItem>;

    /// Rename a document or folder without touching its content
    async fn rename(&self, id: &str, name: &str) -> Result<()>;

    /// Replace the content of an existing document, keeping its id and link
    async fn replace_content(&self, id: &str, content: Bytes) -> Result<()>;

    /// Move a document or folder to the trash
    async fn trash(&self, id: &str) -> Result<()>;
}

/// Hierarchical document index mirror
///
/// Each folder is a page with a "Files" section of links followed by a
/// "Folders" section of sub-pages. Insertions keep both sections sorted
/// case-insensitively by name.
#[async_trait]
pub trait IndexMirror: Send + Sync {
    /// Append a section header block to a page
    async fn append_section_header(&self, page_id: &str, label: &str) -> Result<()>;

    /// Add a link to a file in alphabetical position, returning the block id
    async fn add_file_link(&self, page_id: &str, name: &str, url: &str) -> Result<String>;

    /// Add a sub-page in alphabetical position, returning the new page id
    async fn add_sub_page(&self, parent_page_id: &str, name: &str) -> Result<String>;

    /// Change the text of a file link, keeping its target and position
    async fn rename_file_link(&self, block_id: &str, name: &str) -> Result<()>;

    /// Change the target of a file link, keeping its text and position
    async fn relink_file_link(&self, block_id: &str, url: &str) -> Result<()>;

    /// Change the title of a sub-page, keeping its position
    async fn rename_sub_page(&self, page_id: &str, name: &str) -> Result<()>;

    /// Remove a file link or sub-page
    async fn remove(&self, block_id: &str) -> Result<()>;

    /// Ids of all file links on a page, in page order
    async fn list_file_link_ids(&self, page_id: &str) -> Result<Vec<String>>;
}

/// Content type of a block on an index page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BlockKind {
    /// Section header ("Files", "Folders")
    Header,
    /// Bulleted link to a blob-mirror document
    FileLink { url: String },
    /// Child page representing a sub-folder
    SubPage,
    /// Anything else (paragraphs, dividers, blocks the backend inserted)
    Other,
}

/// One block on an index page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub id: String,
    pub kind: BlockKind,
    /// Header label, link text or page title
    pub title: String,
}

impl Block {
    pub fn header(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: BlockKind::Header,
            title: label.into(),
        }
    }

    pub fn file_link(id: impl Into<String>, name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: BlockKind::FileLink { url: url.into() },
            title: name.into(),
        }
    }

    pub fn sub_page(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: BlockKind::SubPage,
            title: title.into(),
        }
    }

    pub fn other(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: BlockKind::Other,
            title: text.into(),
        }
    }

    pub fn is_header(&self) -> bool {
        matches!(self.kind, BlockKind::Header)
    }

    pub fn is_file_link(&self) -> bool {
        matches!(self.kind, BlockKind::FileLink { .. })
    }

    /// Empty placeholder block some backends append on their own
    pub fn is_blank(&self) -> bool {
        matches!(self.kind, BlockKind::Other) && self.title.trim().is_empty()
    }

    pub fn url(&self) -> Option<&str> {
        match &self.kind {
            BlockKind::FileLink { url } => Some(url),
            _ => None,
        }
    }
}

/// Block-level access to an index backend
///
/// The backend has no "insert at index" primitive; ordering is done by
/// appending and then replacing the full ordered child list with
/// [`set_children_order`](PageStore::set_children_order).
#[async_trait]
pub trait PageStore: Send + Sync {
    /// All child blocks of a page, in page order
    async fn list_blocks(&self, page_id: &str) -> Result<Vec<Block>>;

    /// Fetch a single block
    async fn get_block(&self, block_id: &str) -> Result<Block>;

    /// Append a header block, returning its id
    async fn append_header(&self, page_id: &str, label: &str) -> Result<String>;

    /// Append a file link block, returning its id
    async fn append_file_link(&self, page_id: &str, name: &str, url: &str) -> Result<String>;

    /// Create a child page at the end of `parent_page_id`, returning its id
    async fn create_sub_page(&self, parent_page_id: &str, title: &str) -> Result<String>;

    /// Rewrite the text and target of a file link block
    async fn update_file_link(&self, block_id: &str, name: &str, url: &str) -> Result<()>;

    /// Rewrite the title of a child page
    async fn set_page_title(&self, page_id: &str, title: &str) -> Result<()>;

    /// Delete a block (or child page)
    async fn delete_block(&self, block_id: &str) -> Result<()>;

    /// Replace the page's full ordered list of child block ids
    async fn set_children_order(&self, page_id: &str, block_ids: &[String]) -> Result<()>;
}
