//! Google Drive API connector implementation
//!
//! Implements the `BlobMirror` trait for Google Drive API v3.

use async_trait::async_trait;
use bridge_traits::error::Result;
use bridge_traits::http::{HttpClient, HttpMethod, HttpRequest, HttpResponse, RetryPolicy};
use bridge_traits::mirror::{BlobMirror, MirrorItem};
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use crate::error::GoogleDriveError;
use crate::types::{
    DriveFile, ErrorEnvelope, FileMetadata, FilesListResponse, FOLDER_MIME_TYPE, PDF_MIME_TYPE,
};

/// Google Drive API base URL
const DRIVE_API_BASE: &str = "https://www.googleapis.com/drive/v3";

/// Google Drive upload endpoint base URL
const DRIVE_UPLOAD_BASE: &str = "https://www.googleapis.com/upload/drive/v3";

/// Fields to request for created file resources
const FILE_FIELDS: &str = "id,name,mimeType,webViewLink,parents,trashed";

/// Part separator for multipart uploads
const MULTIPART_BOUNDARY: &str = "note_mirror_part";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const UPLOAD_TIMEOUT: Duration = Duration::from_secs(120);

/// Google Drive API connector
///
/// Implements `BlobMirror` for Google Drive API v3.
///
/// # Features
///
/// - Multipart PDF upload (metadata + media in one request)
/// - Metadata-only rename and trash via `PATCH`
/// - Media replacement that keeps the file id and its share link
/// - Exponential backoff for rate limiting (429) and server errors (5xx)
///
/// # Example
///
/// ```ignore
/// use provider_google_drive::GoogleDriveBlobMirror;
/// use bridge_traits::BlobMirror;
///
/// let drive = GoogleDriveBlobMirror::new(http_client, access_token);
/// let root = drive.find_folder("root", "Notes mirror").await?.ok_or(MissingRoot)?;
/// let item = drive.upload(&root, "Journal", pdf_bytes).await?;
/// ```
pub struct GoogleDriveBlobMirror {
    /// HTTP client for API requests
    http_client: Arc<dyn HttpClient>,

    /// OAuth 2.0 access token with `drive.file` scope
    access_token: String,

    retry_policy: RetryPolicy,
}

impl GoogleDriveBlobMirror {
    pub fn new(http_client: Arc<dyn HttpClient>, access_token: impl Into<String>) -> Self {
        Self {
            http_client,
            access_token: access_token.into(),
            retry_policy: RetryPolicy::default(),
        }
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    /// Find a live folder named `name` directly under `parent_id`
    ///
    /// Used by hosts to resolve the mirror root by title. `parent_id` may be
    /// the `root` alias.
    #[instrument(skip(self))]
    pub async fn find_folder(&self, parent_id: &str, name: &str) -> Result<Option<String>> {
        let query = format!(
            "'{}' in parents and name = '{}' and mimeType = '{}' and trashed = false",
            escape_query(parent_id),
            escape_query(name),
            FOLDER_MIME_TYPE
        );
        let url = format!(
            "{}/files?q={}&fields=nextPageToken,files({})&pageSize=10",
            DRIVE_API_BASE,
            urlencoding::encode(&query),
            FILE_FIELDS
        );

        let response = self
            .execute_with_retry(HttpRequest::new(HttpMethod::Get, url), "folder lookup")
            .await?;
        let listing: FilesListResponse = parse(&response)?;

        if listing.files.len() > 1 {
            warn!(
                parent_id,
                name,
                matches = listing.files.len(),
                "Several folders share this name, using the first"
            );
        }
        Ok(listing.files.into_iter().next().map(|f| f.id))
    }

    fn authorize(&self, request: HttpRequest) -> HttpRequest {
        request
            .bearer_token(&self.access_token)
            .header("Accept", "application/json")
    }

    /// Execute API request with retry logic
    ///
    /// Implements exponential backoff for rate limiting and transient errors.
    /// `resource` names the target for not-found reporting.
    #[instrument(skip(self, request), fields(method = ?request.method, url = %request.url))]
    async fn execute_with_retry(&self, request: HttpRequest, resource: &str) -> Result<HttpResponse> {
        let max_attempts = self.retry_policy.max_attempts.max(1);
        let request = self.authorize(request);
        let mut attempt = 0;

        loop {
            attempt += 1;

            match self.http_client.execute(request.clone()).await {
                Ok(response) if response.is_success() => {
                    debug!(status = response.status, "API request succeeded");
                    return Ok(response);
                }
                Ok(response) if response.is_retryable() => {
                    if attempt >= max_attempts {
                        warn!(
                            status = response.status,
                            attempts = attempt,
                            "API request failed, giving up"
                        );
                        return Err(GoogleDriveError::RetriesExhausted {
                            url: request.url.clone(),
                            attempts: attempt,
                            status_code: response.status,
                        }
                        .into());
                    }

                    let backoff = self.retry_policy.delay_for(attempt);
                    warn!(
                        status = response.status,
                        attempt,
                        max_attempts,
                        backoff_ms = backoff.as_millis() as u64,
                        "API request failed, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                }
                Ok(response) => return Err(status_error(&response, resource).into()),
                Err(e) => {
                    if attempt >= max_attempts {
                        warn!(attempts = attempt, error = %e, "API request failed, giving up");
                        return Err(e);
                    }

                    let backoff = self.retry_policy.delay_for(attempt);
                    warn!(
                        attempt,
                        max_attempts,
                        error = %e,
                        backoff_ms = backoff.as_millis() as u64,
                        "API request failed, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    }

    async fn patch_metadata(&self, id: &str, metadata: &FileMetadata) -> Result<DriveFile> {
        let url = format!("{}/files/{}?fields={}", DRIVE_API_BASE, id, FILE_FIELDS);
        let request = HttpRequest::new(HttpMethod::Patch, url)
            .json(metadata)?
            .timeout(REQUEST_TIMEOUT);
        let response = self.execute_with_retry(request, id).await?;
        parse(&response)
    }
}

#[async_trait]
impl BlobMirror for GoogleDriveBlobMirror {
    #[instrument(skip(self, content), fields(bytes = content.len()))]
    async fn upload(&self, parent_id: &str, name: &str, content: Bytes) -> Result<MirrorItem> {
        let url = format!(
            "{}/files?uploadType=multipart&fields={}",
            DRIVE_UPLOAD_BASE, FILE_FIELDS
        );
        let body = multipart_body(&FileMetadata::document(parent_id, name), &content)?;
        let request = HttpRequest::new(HttpMethod::Post, url)
            .body(
                format!("multipart/related; boundary={}", MULTIPART_BOUNDARY),
                body,
            )
            .timeout(UPLOAD_TIMEOUT);

        let response = self.execute_with_retry(request, parent_id).await?;
        let file: DriveFile = parse(&response)?;

        info!(file_id = %file.id, name, "Uploaded document");
        Ok(MirrorItem::new(file.id.clone(), file.share_url()))
    }

    #[instrument(skip(self))]
    async fn create_folder(&self, parent_id: &str, name: &str) -> Result<MirrorItem> {
        let url = format!("{}/files?fields={}", DRIVE_API_BASE, FILE_FIELDS);
        let request = HttpRequest::new(HttpMethod::Post, url)
            .json(&FileMetadata::folder(parent_id, name))?
            .timeout(REQUEST_TIMEOUT);

        let response = self.execute_with_retry(request, parent_id).await?;
        let folder: DriveFile = parse(&response)?;

        info!(folder_id = %folder.id, name, "Created folder");
        Ok(MirrorItem::new(folder.id.clone(), folder.share_url()))
    }

    #[instrument(skip(self))]
    async fn rename(&self, id: &str, name: &str) -> Result<()> {
        self.patch_metadata(id, &FileMetadata::rename(name)).await?;
        Ok(())
    }

    #[instrument(skip(self, content), fields(bytes = content.len()))]
    async fn replace_content(&self, id: &str, content: Bytes) -> Result<()> {
        let url = format!(
            "{}/files/{}?uploadType=media&fields=id",
            DRIVE_UPLOAD_BASE, id
        );
        let request = HttpRequest::new(HttpMethod::Patch, url)
            .body(PDF_MIME_TYPE, content)
            .timeout(UPLOAD_TIMEOUT);

        self.execute_with_retry(request, id).await?;
        debug!(file_id = id, "Replaced document content");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn trash(&self, id: &str) -> Result<()> {
        let file = self.patch_metadata(id, &FileMetadata::trash()).await?;
        if !file.trashed {
            warn!(file_id = id, "Drive did not report the item as trashed");
        }
        Ok(())
    }
}

fn parse<T: serde::de::DeserializeOwned>(response: &HttpResponse) -> Result<T> {
    serde_json::from_slice(&response.body).map_err(|e| {
        GoogleDriveError::ParseError(format!("Failed to parse Drive response: {}", e)).into()
    })
}

fn status_error(response: &HttpResponse, resource: &str) -> GoogleDriveError {
    let message = serde_json::from_slice::<ErrorEnvelope>(&response.body)
        .map(|envelope| envelope.error.message)
        .unwrap_or_else(|_| String::from_utf8_lossy(&response.body).to_string());

    match response.status {
        401 => GoogleDriveError::AuthenticationFailed(message),
        404 => GoogleDriveError::FileNotFound {
            file_id: resource.to_string(),
        },
        status_code => GoogleDriveError::ApiError {
            status_code,
            message,
        },
    }
}

/// Drive query literals are single-quoted; quotes and backslashes need escaping
fn escape_query(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

/// Build a `multipart/related` body: JSON metadata part, then the PDF part
fn multipart_body(metadata: &FileMetadata, content: &[u8]) -> Result<Bytes> {
    let metadata = serde_json::to_vec(metadata).map_err(|e| {
        GoogleDriveError::ParseError(format!("Failed to encode file metadata: {}", e))
    })?;

    let mut body = Vec::with_capacity(metadata.len() + content.len() + 256);
    body.extend_from_slice(format!("--{}\r\n", MULTIPART_BOUNDARY).as_bytes());
    body.extend_from_slice(b"Content-Type: application/json; charset=UTF-8\r\n\r\n");
    body.extend_from_slice(&metadata);
    body.extend_from_slice(format!("\r\n--{}\r\n", MULTIPART_BOUNDARY).as_bytes());
    body.extend_from_slice(format!("Content-Type: {}\r\n\r\n", PDF_MIME_TYPE).as_bytes());
    body.extend_from_slice(content);
    body.extend_from_slice(format!("\r\n--{}--\r\n", MULTIPART_BOUNDARY).as_bytes());

    Ok(Bytes::from(body))
}
