//! Notion API payload types
//!
//! Response types are trimmed to the fields the page store reads. Request
//! bodies are built with the constructors at the bottom of this module.

use bridge_traits::mirror::Block;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// A rich text span
///
/// See: https://developers.notion.com/reference/rich-text
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RichText {
    #[serde(default)]
    pub plain_text: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub href: Option<String>,
}

/// Block payload for text-bearing block types
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TextBlock {
    #[serde(default)]
    pub rich_text: Vec<RichText>,
}

impl TextBlock {
    pub fn plain_text(&self) -> String {
        self.rich_text.iter().map(|t| t.plain_text.as_str()).collect()
    }

    /// First link target among the spans
    pub fn link(&self) -> Option<&str> {
        self.rich_text.iter().find_map(|t| t.href.as_deref())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChildPage {
    #[serde(default)]
    pub title: String,
}

/// Notion block object
///
/// See: https://developers.notion.com/reference/block
#[derive(Debug, Clone, Deserialize)]
pub struct NotionBlock {
    pub id: String,

    #[serde(rename = "type")]
    pub block_type: String,

    #[serde(default)]
    pub archived: bool,

    #[serde(default)]
    pub heading_2: Option<TextBlock>,

    #[serde(default)]
    pub bulleted_list_item: Option<TextBlock>,

    #[serde(default)]
    pub paragraph: Option<TextBlock>,

    #[serde(default)]
    pub child_page: Option<ChildPage>,
}

impl NotionBlock {
    /// Map onto the backend-neutral block model
    ///
    /// Bulleted items without a link are plain text, not file links.
    pub fn into_block(self) -> Block {
        match self.block_type.as_str() {
            "heading_2" => {
                let text = self.heading_2.unwrap_or_default().plain_text();
                Block::header(self.id, text)
            }
            "bulleted_list_item" => {
                let item = self.bulleted_list_item.unwrap_or_default();
                match item.link() {
                    Some(url) => Block::file_link(self.id, item.plain_text(), url),
                    None => Block::other(self.id, item.plain_text()),
                }
            }
            "child_page" => {
                let title = self.child_page.unwrap_or_default().title;
                Block::sub_page(self.id, title)
            }
            "paragraph" => {
                let text = self.paragraph.unwrap_or_default().plain_text();
                Block::other(self.id, text)
            }
            other => Block::other(self.id, format!("[{}]", other)),
        }
    }
}

/// Paginated list of block children
///
/// See: https://developers.notion.com/reference/get-block-children
#[derive(Debug, Deserialize)]
pub struct BlockChildren {
    pub results: Vec<NotionBlock>,

    #[serde(default)]
    pub next_cursor: Option<String>,

    #[serde(default)]
    pub has_more: bool,
}

/// Page object (only the id is needed)
#[derive(Debug, Deserialize)]
pub struct PageObject {
    pub id: String,
}

/// Notion API error body
#[derive(Debug, Deserialize)]
pub struct ApiErrorBody {
    #[serde(default)]
    pub code: String,

    #[serde(default)]
    pub message: String,
}

fn text(content: &str) -> Value {
    json!({ "type": "text", "text": { "content": content } })
}

fn link(content: &str, url: &str) -> Value {
    json!({ "type": "text", "text": { "content": content, "link": { "url": url } } })
}

/// `heading_2` block body for an append call
pub fn header_block(label: &str) -> Value {
    json!({
        "object": "block",
        "type": "heading_2",
        "heading_2": { "rich_text": [text(label)] }
    })
}

/// Bulleted link block body for an append call
pub fn file_link_block(name: &str, url: &str) -> Value {
    json!({
        "object": "block",
        "type": "bulleted_list_item",
        "bulleted_list_item": { "rich_text": [link(name, url)] }
    })
}

/// Update body that rewrites a bulleted link in place
pub fn file_link_update(name: &str, url: &str) -> Value {
    json!({ "bulleted_list_item": { "rich_text": [link(name, url)] } })
}

/// Create body for a child page
pub fn sub_page(parent_page_id: &str, title: &str) -> Value {
    json!({
        "parent": { "page_id": parent_page_id },
        "properties": { "title": { "title": [text(title)] } }
    })
}

/// Update body that retitles a page
pub fn page_title_update(title: &str) -> Value {
    json!({ "properties": { "title": { "title": [text(title)] } } })
}

/// Private-API transaction replacing a block's ordered child list
pub fn set_content_transaction(page_id: &str, block_ids: &[String]) -> Value {
    json!({
        "operations": [{
            "id": page_id,
            "table": "block",
            "path": ["content"],
            "command": "set",
            "args": block_ids
        }]
    })
}
