//! # Ordered Insertion
//!
//! Derives the full child order of an index page after one block was
//! appended to it.
//!
//! A page is a flat list of blocks: an optional preamble, a files section
//! introduced by its header, then a folders section introduced by its
//! header. Backends can only append, so inserting means appending the block
//! and then replacing the page's whole child list with the order computed
//! here.
//!
//! Only the section that received the new block is sorted (stable,
//! case-insensitive by title). The other section keeps its current order, so
//! a rename never moves an item until something new lands in its section.

use bridge_traits::Block;

use crate::{Result, SyncError};

/// The two labelled sections of an index page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
    Files,
    Folders,
}

impl Section {
    pub fn as_str(&self) -> &'static str {
        match self {
            Section::Files => "files",
            Section::Folders => "folders",
        }
    }
}

/// Header labels used to find section boundaries.
#[derive(Debug, Clone, Copy)]
pub struct SectionHeaders<'a> {
    pub files: &'a str,
    pub folders: &'a str,
}

impl<'a> SectionHeaders<'a> {
    pub fn label(&self, section: Section) -> &'a str {
        match section {
            Section::Files => self.files,
            Section::Folders => self.folders,
        }
    }

    fn section_of(&self, block: &Block) -> Option<Section> {
        if !block.is_header() {
            return None;
        }
        if block.title == self.files {
            Some(Section::Files)
        } else if block.title == self.folders {
            Some(Section::Folders)
        } else {
            None
        }
    }
}

#[derive(Default)]
struct SectionBlocks<'b> {
    header: Option<&'b Block>,
    items: Vec<&'b Block>,
}

impl<'b> SectionBlocks<'b> {
    fn ids(&self) -> impl Iterator<Item = &'b str> + '_ {
        self.header
            .into_iter()
            .chain(self.items.iter().copied())
            .map(|b| b.id.as_str())
    }
}

/// Whether `blocks` already contains the header for `section`.
pub fn has_header(blocks: &[Block], headers: SectionHeaders<'_>, section: Section) -> bool {
    blocks
        .iter()
        .any(|b| headers.section_of(b) == Some(section))
}

/// Compute the ordered child ids of a page after `new_block_id` was appended.
///
/// `blocks` is the page's current child list, in order, including the new
/// block. Trailing blank blocks are dropped.
///
/// # Errors
///
/// [`SyncError::Index`] if the new block or the header of `section` is not
/// on the page.
pub fn derive_order(
    page_id: &str,
    blocks: &[Block],
    new_block_id: &str,
    section: Section,
    headers: SectionHeaders<'_>,
) -> Result<Vec<String>> {
    let index_error = |reason: String| SyncError::Index {
        page_id: page_id.to_string(),
        reason,
    };

    let mut end = blocks.len();
    while end > 0 && blocks[end - 1].is_blank() {
        end -= 1;
    }
    let blocks = &blocks[..end];

    let new_block = blocks
        .iter()
        .find(|b| b.id == new_block_id)
        .ok_or_else(|| index_error(format!("block {} not found", new_block_id)))?;

    let mut preamble: Vec<&Block> = Vec::new();
    let mut files = SectionBlocks::default();
    let mut folders = SectionBlocks::default();
    let mut current: Option<Section> = None;

    for block in blocks {
        if block.id == new_block_id {
            continue;
        }

        if let Some(found) = headers.section_of(block) {
            let target = match found {
                Section::Files => &mut files,
                Section::Folders => &mut folders,
            };
            if target.header.is_none() {
                target.header = Some(block);
                current = Some(found);
                continue;
            }
        }

        match current {
            None => preamble.push(block),
            Some(Section::Files) => files.items.push(block),
            Some(Section::Folders) => folders.items.push(block),
        }
    }

    let target = match section {
        Section::Files => &mut files,
        Section::Folders => &mut folders,
    };
    if target.header.is_none() {
        return Err(index_error(format!(
            "no '{}' header on page",
            headers.label(section)
        )));
    }
    target.items.push(new_block);
    target.items.sort_by_cached_key(|b| b.title.to_lowercase());

    let order = preamble
        .iter()
        .map(|b| b.id.as_str())
        .chain(files.ids())
        .chain(folders.ids())
        .map(str::to_string)
        .collect();

    Ok(order)
}
