//! # Ordered Index Mirror
//!
//! [`IndexMirror`] implementation over a block-level [`PageStore`].
//!
//! Insertions append the new block, read the page back and replace its
//! child order with the one computed by [`ordering::derive_order`]. Section
//! headers are created lazily the first time a section receives an item.
//! Calls against one page must not run concurrently: each insertion is a
//! read-modify-write of the full child list.

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    IndexMirror, PageStore,
};
use core_runtime::config::SectionLabels;
use std::sync::Arc;
use tracing::{debug, instrument};

use crate::ordering::{self, Section, SectionHeaders};

pub struct OrderedIndex {
    store: Arc<dyn PageStore>,
    labels: SectionLabels,
}

impl OrderedIndex {
    pub fn new(store: Arc<dyn PageStore>) -> Self {
        Self::with_labels(store, SectionLabels::default())
    }

    pub fn with_labels(store: Arc<dyn PageStore>, labels: SectionLabels) -> Self {
        Self { store, labels }
    }

    pub fn labels(&self) -> &SectionLabels {
        &self.labels
    }

    fn headers(&self) -> SectionHeaders<'_> {
        SectionHeaders {
            files: &self.labels.files,
            folders: &self.labels.folders,
        }
    }

    async fn ensure_header(&self, page_id: &str, section: Section) -> Result<()> {
        let blocks = self.store.list_blocks(page_id).await?;
        if !ordering::has_header(&blocks, self.headers(), section) {
            self.append_section_header(page_id, self.headers().label(section))
                .await?;
        }
        Ok(())
    }

    async fn place(&self, page_id: &str, new_block_id: &str, section: Section) -> Result<()> {
        let blocks = self.store.list_blocks(page_id).await?;
        let order = ordering::derive_order(page_id, &blocks, new_block_id, section, self.headers())
            .map_err(|e| BridgeError::OperationFailed(e.to_string()))?;

        debug!(
            page_id,
            block_id = new_block_id,
            section = section.as_str(),
            children = order.len(),
            "Reordering page"
        );
        self.store.set_children_order(page_id, &order).await
    }
}

#[async_trait]
impl IndexMirror for OrderedIndex {
    async fn append_section_header(&self, page_id: &str, label: &str) -> Result<()> {
        self.store.append_header(page_id, label).await?;
        Ok(())
    }

    #[instrument(skip(self, url))]
    async fn add_file_link(&self, page_id: &str, name: &str, url: &str) -> Result<String> {
        self.ensure_header(page_id, Section::Files).await?;
        let block_id = self.store.append_file_link(page_id, name, url).await?;
        self.place(page_id, &block_id, Section::Files).await?;
        Ok(block_id)
    }

    #[instrument(skip(self))]
    async fn add_sub_page(&self, parent_page_id: &str, name: &str) -> Result<String> {
        self.ensure_header(parent_page_id, Section::Folders).await?;
        let page_id = self.store.create_sub_page(parent_page_id, name).await?;
        self.place(parent_page_id, &page_id, Section::Folders)
            .await?;
        Ok(page_id)
    }

    async fn rename_file_link(&self, block_id: &str, name: &str) -> Result<()> {
        let block = self.store.get_block(block_id).await?;
        let url = block
            .url()
            .ok_or_else(|| BridgeError::NotFound(format!("file link {}", block_id)))?;
        self.store.update_file_link(block_id, name, url).await
    }

    async fn relink_file_link(&self, block_id: &str, url: &str) -> Result<()> {
        let block = self.store.get_block(block_id).await?;
        if !block.is_file_link() {
            return Err(BridgeError::NotFound(format!("file link {}", block_id)));
        }
        self.store.update_file_link(block_id, &block.title, url).await
    }

    async fn rename_sub_page(&self, page_id: &str, name: &str) -> Result<()> {
        self.store.set_page_title(page_id, name).await
    }

    async fn remove(&self, block_id: &str) -> Result<()> {
        self.store.delete_block(block_id).await
    }

    async fn list_file_link_ids(&self, page_id: &str) -> Result<Vec<String>> {
        let blocks = self.store.list_blocks(page_id).await?;
        Ok(blocks
            .into_iter()
            .filter(|b| b.is_file_link())
            .map(|b| b.id)
            .collect())
    }
}
