//! # Mirror Configuration
//!
//! Builder-based configuration for a mirroring run.
//!
//! ## Overview
//!
//! A [`MirrorConfig`] names the three root identities (source tree, blob
//! mirror, index mirror), where correspondence snapshots live on disk, how
//! the index mirror labels its two sections and how logging is set up. The
//! builder validates eagerly so a misconfigured host fails before any remote
//! call is made.
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::MirrorConfig;
//!
//! let config = MirrorConfig::builder()
//!     .state_dir("/var/lib/note-mirror/folder_state")
//!     .source_root("")
//!     .blob_root("1AbCdEf")
//!     .index_root("0f3c9b2e")
//!     .prune_orphans(true)
//!     .build()?;
//! ```
//!
//! Or from the environment:
//!
//! ```ignore
//! let config = MirrorConfig::from_env()?;
//! ```

use crate::error::{Error, Result};
use crate::logging::{LogFormat, LoggingConfig};
use bridge_traits::time::LogLevel;
use std::path::PathBuf;

pub const ENV_STATE_DIR: &str = "MIRROR_STATE_DIR";
pub const ENV_SOURCE_ROOT: &str = "MIRROR_SOURCE_ROOT";
pub const ENV_BLOB_ROOT: &str = "MIRROR_BLOB_ROOT";
pub const ENV_INDEX_ROOT: &str = "MIRROR_INDEX_ROOT";
pub const ENV_PRUNE_ORPHANS: &str = "MIRROR_PRUNE_ORPHANS";
pub const ENV_LOG_FORMAT: &str = "MIRROR_LOG_FORMAT";
pub const ENV_LOG_FILTER: &str = "MIRROR_LOG";

/// Relative directory used when no state directory is configured.
pub const DEFAULT_STATE_DIR: &str = "folder_state";

/// The identity of the top-level folder in each of the three trees.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorRoots {
    /// Root folder id in the source tree. The empty string is a valid id.
    pub source_id: String,
    /// Root folder id in the blob mirror.
    pub blob_id: String,
    /// Root page id in the index mirror.
    pub index_id: String,
}

impl MirrorRoots {
    pub fn new(
        source_id: impl Into<String>,
        blob_id: impl Into<String>,
        index_id: impl Into<String>,
    ) -> Self {
        Self {
            source_id: source_id.into(),
            blob_id: blob_id.into(),
            index_id: index_id.into(),
        }
    }
}

/// Header labels separating the two sections of an index page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionLabels {
    pub files: String,
    pub folders: String,
}

impl Default for SectionLabels {
    fn default() -> Self {
        Self {
            files: "Files".to_string(),
            folders: "Folders".to_string(),
        }
    }
}

/// Configuration for a mirroring process.
#[derive(Debug, Clone)]
pub struct MirrorConfig {
    /// Directory holding one JSON snapshot per source folder
    pub state_dir: PathBuf,

    /// Root ids of the source tree and both mirrors
    pub roots: MirrorRoots,

    /// Index page section headers
    pub sections: SectionLabels,

    /// Delete snapshots of folders that are no longer live after an
    /// incremental update
    pub prune_orphans: bool,

    /// Logging setup
    pub logging: LoggingConfig,
}

impl MirrorConfig {
    pub fn builder() -> MirrorConfigBuilder {
        MirrorConfigBuilder::default()
    }

    /// Load configuration from process environment variables.
    ///
    /// `MIRROR_BLOB_ROOT` and `MIRROR_INDEX_ROOT` are required.
    /// `MIRROR_SOURCE_ROOT` defaults to the empty id (the top of the source
    /// tree) and `MIRROR_STATE_DIR` to `folder_state`.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) but reading from an arbitrary
    /// key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| {
            lookup(key).ok_or_else(|| {
                Error::Config(format!("Environment variable {} is not set", key))
            })
        };

        let mut logging = LoggingConfig::default();
        if let Some(format) = lookup(ENV_LOG_FORMAT) {
            logging = logging.with_format(format.parse::<LogFormat>()?);
        }
        if let Some(filter) = lookup(ENV_LOG_FILTER) {
            logging = logging.with_filter(filter);
        }

        let prune_orphans = match lookup(ENV_PRUNE_ORPHANS) {
            Some(value) => parse_flag(ENV_PRUNE_ORPHANS, &value)?,
            None => false,
        };

        Self::builder()
            .state_dir(lookup(ENV_STATE_DIR).unwrap_or_else(|| DEFAULT_STATE_DIR.to_string()))
            .source_root(lookup(ENV_SOURCE_ROOT).unwrap_or_default())
            .blob_root(required(ENV_BLOB_ROOT)?)
            .index_root(required(ENV_INDEX_ROOT)?)
            .prune_orphans(prune_orphans)
            .logging(logging)
            .build()
    }

    /// Validates the configuration.
    ///
    /// Checks that the state directory and both mirror roots are non-empty
    /// and that the section labels are distinct, non-blank strings.
    pub fn validate(&self) -> Result<()> {
        if self.state_dir.as_os_str().is_empty() {
            return Err(Error::Config("State directory cannot be empty".to_string()));
        }

        if self.roots.blob_id.trim().is_empty() {
            return Err(Error::Config("Blob mirror root id cannot be empty".to_string()));
        }

        if self.roots.index_id.trim().is_empty() {
            return Err(Error::Config(
                "Index mirror root id cannot be empty".to_string(),
            ));
        }

        if self.sections.files.trim().is_empty() || self.sections.folders.trim().is_empty() {
            return Err(Error::Config("Section labels cannot be blank".to_string()));
        }

        if self.sections.files == self.sections.folders {
            return Err(Error::Config(format!(
                "Section labels must differ (both are '{}')",
                self.sections.files
            )));
        }

        Ok(())
    }
}

fn parse_flag(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => Err(Error::Config(format!(
            "{} must be a boolean, got '{}'",
            key, other
        ))),
    }
}

/// Builder for [`MirrorConfig`].
#[derive(Default)]
pub struct MirrorConfigBuilder {
    state_dir: Option<PathBuf>,
    source_root: Option<String>,
    blob_root: Option<String>,
    index_root: Option<String>,
    sections: Option<SectionLabels>,
    prune_orphans: bool,
    logging: Option<LoggingConfig>,
}

impl MirrorConfigBuilder {
    pub fn state_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.state_dir = Some(path.into());
        self
    }

    pub fn source_root(mut self, id: impl Into<String>) -> Self {
        self.source_root = Some(id.into());
        self
    }

    pub fn blob_root(mut self, id: impl Into<String>) -> Self {
        self.blob_root = Some(id.into());
        self
    }

    pub fn index_root(mut self, id: impl Into<String>) -> Self {
        self.index_root = Some(id.into());
        self
    }

    pub fn section_labels(mut self, files: impl Into<String>, folders: impl Into<String>) -> Self {
        self.sections = Some(SectionLabels {
            files: files.into(),
            folders: folders.into(),
        });
        self
    }

    pub fn prune_orphans(mut self, enabled: bool) -> Self {
        self.prune_orphans = enabled;
        self
    }

    pub fn logging(mut self, logging: LoggingConfig) -> Self {
        self.logging = Some(logging);
        self
    }

    pub fn log_level(mut self, level: LogLevel) -> Self {
        self.logging = Some(self.logging.unwrap_or_default().with_level(level));
        self
    }

    /// Builds and validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when the state directory or a mirror root is
    /// missing, or when validation fails.
    pub fn build(self) -> Result<MirrorConfig> {
        let state_dir = self
            .state_dir
            .ok_or_else(|| Error::Config("State directory is required".to_string()))?;

        let blob_id = self
            .blob_root
            .ok_or_else(|| Error::Config("Blob mirror root id is required".to_string()))?;

        let index_id = self
            .index_root
            .ok_or_else(|| Error::Config("Index mirror root id is required".to_string()))?;

        let config = MirrorConfig {
            state_dir,
            roots: MirrorRoots {
                source_id: self.source_root.unwrap_or_default(),
                blob_id,
                index_id,
            },
            sections: self.sections.unwrap_or_default(),
            prune_orphans: self.prune_orphans,
            logging: self.logging.unwrap_or_default(),
        };

        config.validate()?;
        Ok(config)
    }
}
