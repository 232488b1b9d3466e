//! # Host Bridge Traits
//!
//! Contracts between the mirroring core and everything it talks to.
//!
//! ## Overview
//!
//! The core never owns a network client. Every remote system is reached
//! through one of the traits below, constructed once by the host and injected
//! into the sync coordinator. Tests substitute in-memory fakes.
//!
//! ## Traits
//!
//! ### Source & Mirrors
//! - [`SourceTree`](source::SourceTree) - Read-only document tree (list, index, render)
//! - [`BlobMirror`](mirror::BlobMirror) - Folder + blob storage mirror
//! - [`IndexMirror`](mirror::IndexMirror) - Ordered page/link index mirror
//! - [`PageStore`](mirror::PageStore) - Block-level backend the index mirror is built on
//!
//! ### Infrastructure
//! - [`HttpClient`](http::HttpClient) - Async HTTP transport used by providers
//! - [`FileSystemAccess`](storage::FileSystemAccess) - File I/O for correspondence snapshots
//! - [`Clock`](time::Clock) - Time source for deterministic testing
//! - [`LoggerSink`](time::LoggerSink) - Forward structured logs to host alerting
//!
//! ## Error Handling
//!
//! All bridge traits use [`BridgeError`](error::BridgeError). Implementations
//! should:
//!
//! - Report unrenderable documents as `ConversionFailed`
//! - Report every other remote failure as `OperationFailed` (or `NotFound`)
//! - Include the remote id in the message
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync` so one instance can be shared by
//! the coordinator and the service façade.

pub mod error;
pub mod http;
pub mod mirror;
pub mod source;
pub mod storage;
pub mod time;

pub use error::BridgeError;

// Re-export commonly used types
pub use http::{HttpClient, HttpMethod, HttpRequest, HttpResponse, RetryPolicy};
pub use mirror::{BlobMirror, Block, BlockKind, IndexMirror, MirrorItem, PageStore};
pub use source::{FolderListing, Node, NodeIndex, NodeKind, ParentState, SourceTree};
pub use storage::FileSystemAccess;
pub use time::{Clock, ConsoleLogger, LogEntry, LogLevel, LoggerSink, SystemClock};
