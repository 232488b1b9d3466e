//! # Core Runtime Module
//!
//! Foundational runtime infrastructure shared by the mirroring crates:
//! - Configuration management (`MirrorConfig`)
//! - Logging and tracing setup
//!
//! ## Overview
//!
//! Everything here is independent of the reconciliation engine itself. The
//! sync and service crates read their roots, section labels and state
//! location from [`config::MirrorConfig`] and install logging through
//! [`logging::init_logging`].

pub mod config;
pub mod error;
pub mod logging;

pub use config::{MirrorConfig, MirrorRoots, SectionLabels};
pub use error::{Error, Result};
