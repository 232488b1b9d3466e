//! # Notion Provider
//!
//! Implements `PageStore` over the Notion APIs.
//!
//! ## Overview
//!
//! Block CRUD goes through the official REST API (`/v1`, integration
//! token). The official API cannot reorder a page's children, so
//! `set_children_order` uses the private transaction endpoint authenticated
//! with a browser session cookie (`token_v2`). Without that cookie the store
//! still works for everything except reordering, which then reports
//! `BridgeError::NotAvailable`.

pub mod connector;
pub mod error;
pub mod types;

pub use connector::{NotionCredentials, NotionPageStore};
pub use error::{NotionError, Result};
