//! Notion API connector implementation
//!
//! Implements the `PageStore` trait on top of the official Notion API, with
//! the private transaction endpoint for child reordering.

use async_trait::async_trait;
use bridge_traits::error::Result;
use bridge_traits::http::{HttpClient, HttpMethod, HttpRequest, HttpResponse, RetryPolicy};
use bridge_traits::mirror::{Block, PageStore};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument};

use crate::error::NotionError;
use crate::types::{self, ApiErrorBody, BlockChildren, NotionBlock, PageObject};

/// Official API base URL
const NOTION_API_BASE: &str = "https://api.notion.com/v1";

/// Private API transaction endpoint
const NOTION_TRANSACTION_URL: &str = "https://www.notion.so/api/v3/submitTransaction";

/// Pinned API version header
const NOTION_VERSION: &str = "2022-06-28";

/// Maximum children per page of results (Notion API limit)
const MAX_PAGE_SIZE: u32 = 100;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Tokens for the two Notion APIs
#[derive(Clone)]
pub struct NotionCredentials {
    /// Integration token for the official API
    pub integration_token: String,
    /// Browser session cookie for the private API
    pub session_token: Option<String>,
}

impl NotionCredentials {
    pub fn new(integration_token: impl Into<String>) -> Self {
        Self {
            integration_token: integration_token.into(),
            session_token: None,
        }
    }

    pub fn with_session_token(mut self, token: impl Into<String>) -> Self {
        self.session_token = Some(token.into());
        self
    }
}

impl fmt::Debug for NotionCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotionCredentials")
            .field("integration_token", &"<redacted>")
            .field("session_token", &self.session_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Notion-backed page store
///
/// # Example
///
/// ```ignore
/// use provider_notion::{NotionCredentials, NotionPageStore};
/// use core_sync::OrderedIndex;
///
/// let credentials = NotionCredentials::new(secret).with_session_token(token_v2);
/// let index = OrderedIndex::new(Arc::new(NotionPageStore::new(http_client, credentials)));
/// ```
pub struct NotionPageStore {
    http_client: Arc<dyn HttpClient>,
    credentials: NotionCredentials,
    retry_policy: RetryPolicy,
}

impl NotionPageStore {
    pub fn new(http_client: Arc<dyn HttpClient>, credentials: NotionCredentials) -> Self {
        Self {
            http_client,
            credentials,
            retry_policy: RetryPolicy::default(),
        }
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    /// Send an official-API request; `resource` names the target block or
    /// page for not-found reporting
    async fn send(&self, request: HttpRequest, resource: &str) -> Result<HttpResponse> {
        let request = request
            .bearer_token(&self.credentials.integration_token)
            .header("Notion-Version", NOTION_VERSION)
            .timeout(REQUEST_TIMEOUT);

        let response = self
            .http_client
            .execute_with_retry(request, self.retry_policy.clone())
            .await?;

        if response.is_success() {
            Ok(response)
        } else {
            Err(status_error(&response, resource).into())
        }
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        method: HttpMethod,
        url: String,
        body: Option<&Value>,
        resource: &str,
    ) -> Result<T> {
        let mut request = HttpRequest::new(method, url);
        if let Some(body) = body {
            request = request.json(body)?;
        }
        let response = self.send(request, resource).await?;
        parse(&response)
    }

    /// Append one block to a page, returning the new block's id
    async fn append_child(&self, page_id: &str, block: Value) -> Result<String> {
        let url = format!("{}/blocks/{}/children", NOTION_API_BASE, page_id);
        let body = serde_json::json!({ "children": [block] });
        let appended: BlockChildren = self
            .send_json(HttpMethod::Patch, url, Some(&body), page_id)
            .await?;

        appended
            .results
            .last()
            .map(|b| b.id.clone())
            .ok_or_else(|| {
                NotionError::ParseError(format!("append to {} returned no blocks", page_id)).into()
            })
    }
}

#[async_trait]
impl PageStore for NotionPageStore {
    #[instrument(skip(self))]
    async fn list_blocks(&self, page_id: &str) -> Result<Vec<Block>> {
        let mut blocks = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let mut url = format!(
                "{}/blocks/{}/children?page_size={}",
                NOTION_API_BASE, page_id, MAX_PAGE_SIZE
            );
            if let Some(cursor) = &cursor {
                url.push_str(&format!("&start_cursor={}", urlencoding::encode(cursor)));
            }

            let page: BlockChildren = self.send_json(HttpMethod::Get, url, None, page_id).await?;
            blocks.extend(
                page.results
                    .into_iter()
                    .filter(|b| !b.archived)
                    .map(NotionBlock::into_block),
            );

            match page.next_cursor {
                Some(next) if page.has_more => cursor = Some(next),
                _ => break,
            }
        }

        debug!(page_id, blocks = blocks.len(), "Listed page blocks");
        Ok(blocks)
    }

    async fn get_block(&self, block_id: &str) -> Result<Block> {
        let url = format!("{}/blocks/{}", NOTION_API_BASE, block_id);
        let block: NotionBlock = self.send_json(HttpMethod::Get, url, None, block_id).await?;
        if block.archived {
            return Err(NotionError::BlockNotFound {
                block_id: block_id.to_string(),
            }
            .into());
        }
        Ok(block.into_block())
    }

    #[instrument(skip(self))]
    async fn append_header(&self, page_id: &str, label: &str) -> Result<String> {
        self.append_child(page_id, types::header_block(label)).await
    }

    #[instrument(skip(self, url))]
    async fn append_file_link(&self, page_id: &str, name: &str, url: &str) -> Result<String> {
        self.append_child(page_id, types::file_link_block(name, url))
            .await
    }

    #[instrument(skip(self))]
    async fn create_sub_page(&self, parent_page_id: &str, title: &str) -> Result<String> {
        let url = format!("{}/pages", NOTION_API_BASE);
        let body = types::sub_page(parent_page_id, title);
        let page: PageObject = self
            .send_json(HttpMethod::Post, url, Some(&body), parent_page_id)
            .await?;

        info!(page_id = %page.id, title, "Created sub-page");
        Ok(page.id)
    }

    #[instrument(skip(self, url))]
    async fn update_file_link(&self, block_id: &str, name: &str, url: &str) -> Result<()> {
        let endpoint = format!("{}/blocks/{}", NOTION_API_BASE, block_id);
        let body = types::file_link_update(name, url);
        let _: NotionBlock = self
            .send_json(HttpMethod::Patch, endpoint, Some(&body), block_id)
            .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn set_page_title(&self, page_id: &str, title: &str) -> Result<()> {
        let url = format!("{}/pages/{}", NOTION_API_BASE, page_id);
        let body = types::page_title_update(title);
        let _: PageObject = self
            .send_json(HttpMethod::Patch, url, Some(&body), page_id)
            .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete_block(&self, block_id: &str) -> Result<()> {
        let url = format!("{}/blocks/{}", NOTION_API_BASE, block_id);
        self.send(HttpRequest::new(HttpMethod::Delete, url), block_id)
            .await?;
        Ok(())
    }

    #[instrument(skip(self, block_ids), fields(children = block_ids.len()))]
    async fn set_children_order(&self, page_id: &str, block_ids: &[String]) -> Result<()> {
        let token = self
            .credentials
            .session_token
            .as_deref()
            .ok_or_else(|| NotionError::SessionTokenMissing {
                page_id: page_id.to_string(),
            })?;

        let request = HttpRequest::new(HttpMethod::Post, NOTION_TRANSACTION_URL)
            .header("Cookie", format!("token_v2={}", token))
            .json(&types::set_content_transaction(page_id, block_ids))?
            .timeout(REQUEST_TIMEOUT);

        let response = self
            .http_client
            .execute_with_retry(request, self.retry_policy.clone())
            .await?;

        match response.status {
            401 | 403 => Err(NotionError::AuthenticationFailed(
                "session token rejected by the transaction endpoint".to_string(),
            )
            .into()),
            _ if !response.is_success() => Err(status_error(&response, page_id).into()),
            _ => Ok(()),
        }
    }
}

fn parse<T: DeserializeOwned>(response: &HttpResponse) -> Result<T> {
    serde_json::from_slice(&response.body).map_err(|e| {
        NotionError::ParseError(format!("Failed to parse Notion response: {}", e)).into()
    })
}

fn status_error(response: &HttpResponse, resource: &str) -> NotionError {
    let body = serde_json::from_slice::<ApiErrorBody>(&response.body).unwrap_or(ApiErrorBody {
        code: String::new(),
        message: String::from_utf8_lossy(&response.body).to_string(),
    });

    match (response.status, body.code.as_str()) {
        (404, _) | (_, "object_not_found") => NotionError::BlockNotFound {
            block_id: resource.to_string(),
        },
        (401, _) => NotionError::AuthenticationFailed(body.message),
        (status_code, _) => NotionError::ApiError {
            status_code,
            code: body.code,
            message: body.message,
        },
    }
}
