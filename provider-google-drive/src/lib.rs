//! # Google Drive Provider
//!
//! Implements `BlobMirror` for Google Drive API v3.
//!
//! ## Overview
//!
//! This module provides:
//! - Multipart upload of rendered PDFs into a parent folder
//! - Folder creation, rename and trash via metadata updates
//! - In-place media replacement that keeps the file id and share link
//! - Mirror-root lookup by folder name
//! - Rate limiting and exponential backoff

pub mod connector;
pub mod error;
pub mod types;

pub use connector::GoogleDriveBlobMirror;
pub use error::{GoogleDriveError, Result};
