//! Google Drive API request and response types
//!
//! Data structures for (de)serializing Google Drive API v3 payloads.

use serde::{Deserialize, Serialize};

/// MIME type Drive uses for folders
pub const FOLDER_MIME_TYPE: &str = "application/vnd.google-apps.folder";

/// MIME type of uploaded documents
pub const PDF_MIME_TYPE: &str = "application/pdf";

/// Google Drive API file resource (subset requested via `fields`)
///
/// See: https://developers.google.com/drive/api/v3/reference/files#resource
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriveFile {
    pub id: String,

    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub mime_type: String,

    /// Link for opening the item in a browser
    #[serde(skip_serializing_if = "Option::is_none")]
    pub web_view_link: Option<String>,

    #[serde(default)]
    pub parents: Vec<String>,

    #[serde(default)]
    pub trashed: bool,
}

impl DriveFile {
    pub fn is_folder(&self) -> bool {
        self.mime_type == FOLDER_MIME_TYPE
    }

    /// Browser link, falling back to the canonical URL shape when the API
    /// did not return `webViewLink`
    pub fn share_url(&self) -> String {
        match &self.web_view_link {
            Some(link) => link.clone(),
            None if self.is_folder() => {
                format!("https://drive.google.com/drive/folders/{}", self.id)
            }
            None => format!("https://drive.google.com/file/d/{}/view", self.id),
        }
    }
}

/// Google Drive API files.list response
///
/// See: https://developers.google.com/drive/api/v3/reference/files/list
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilesListResponse {
    pub files: Vec<DriveFile>,

    #[serde(default)]
    pub next_page_token: Option<String>,
}

/// Metadata body for create and update calls
#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub parents: Vec<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub trashed: Option<bool>,
}

impl FileMetadata {
    pub fn document(parent_id: &str, name: &str) -> Self {
        Self {
            name: Some(name.to_string()),
            mime_type: Some(PDF_MIME_TYPE.to_string()),
            parents: vec![parent_id.to_string()],
            ..Default::default()
        }
    }

    pub fn folder(parent_id: &str, name: &str) -> Self {
        Self {
            name: Some(name.to_string()),
            mime_type: Some(FOLDER_MIME_TYPE.to_string()),
            parents: vec![parent_id.to_string()],
            ..Default::default()
        }
    }

    pub fn rename(name: &str) -> Self {
        Self {
            name: Some(name.to_string()),
            ..Default::default()
        }
    }

    pub fn trash() -> Self {
        Self {
            trashed: Some(true),
            ..Default::default()
        }
    }
}

/// Google API error envelope
#[derive(Debug, Deserialize)]
pub struct ErrorEnvelope {
    pub error: ErrorBody,
}

#[derive(Debug, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub message: String,
}
