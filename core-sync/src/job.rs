//! # Sync Job State Machine
//!
//! Report of one mirroring run with validated state transitions.
//!
//! ## State Machine
//!
//! ```text
//! Pending → Running → Completed
//!     ↓         ↓
//!     └──────→ Failed
//! ```
//!
//! Timestamps come from an injected [`Clock`] so reports are reproducible
//! under test.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use core_sync::{RunMode, SyncJob, SyncJobStats};
//! use bridge_traits::SystemClock;
//!
//! let clock = SystemClock;
//! let job = SyncJob::new(RunMode::Incremental, "", &clock).start(&clock)?;
//! let mut stats = SyncJobStats::new();
//! stats.files_created += 1;
//! let job = job.complete(stats, &clock)?;
//! ```

use crate::{Result, SyncError};
use bridge_traits::Clock;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

// ============================================================================
// ID Types
// ============================================================================

/// Unique identifier for a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SyncJobId(Uuid);

impl SyncJobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for SyncJobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SyncJobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Status Types
// ============================================================================

/// The current status of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl SyncStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SyncStatus::Completed | SyncStatus::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Pending => "pending",
            SyncStatus::Running => "running",
            SyncStatus::Completed => "completed",
            SyncStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How recorded state is used during a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    /// Ignore all recorded state and mirror the whole tree as new
    FullRebuild,
    /// Load recorded state at every folder and apply the differences
    Incremental,
}

impl RunMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunMode::FullRebuild => "full_rebuild",
            RunMode::Incremental => "incremental",
        }
    }
}

impl FromStr for RunMode {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "full_rebuild" | "full" | "mirror" => Ok(RunMode::FullRebuild),
            "incremental" | "update" => Ok(RunMode::Incremental),
            _ => Err(SyncError::InvalidRunMode(s.to_string())),
        }
    }
}

impl std::fmt::Display for RunMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// Statistics
// ============================================================================

/// Counters collected during a run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncJobStats {
    pub files_created: u64,
    pub files_updated: u64,
    pub files_deleted: u64,
    pub folders_created: u64,
    pub folders_updated: u64,
    pub folders_deleted: u64,
    /// Items skipped because a conversion or remote call failed
    pub items_failed: u64,
    /// Folder snapshots written
    pub folders_persisted: u64,
    /// Folders whose listing or snapshot write failed
    pub folders_failed: u64,
    /// Orphaned snapshots removed after the run
    pub states_pruned: u64,
}

impl SyncJobStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Items whose mirror counterparts were created, updated or removed
    pub fn total_mutations(&self) -> u64 {
        self.files_created
            + self.files_updated
            + self.files_deleted
            + self.folders_created
            + self.folders_updated
            + self.folders_deleted
    }

    pub fn has_failures(&self) -> bool {
        self.items_failed > 0 || self.folders_failed > 0
    }
}

// ============================================================================
// Sync Job Entity
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncJob {
    pub id: SyncJobId,
    pub mode: RunMode,
    /// Source id of the folder the run started from
    pub root_id: String,
    pub status: SyncStatus,
    pub stats: SyncJobStats,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl SyncJob {
    /// Create a new job in pending state
    pub fn new(mode: RunMode, root_id: impl Into<String>, clock: &dyn Clock) -> Self {
        Self {
            id: SyncJobId::new(),
            mode,
            root_id: root_id.into(),
            status: SyncStatus::Pending,
            stats: SyncJobStats::new(),
            error_message: None,
            created_at: clock.now(),
            started_at: None,
            completed_at: None,
        }
    }

    /// Start the job
    ///
    /// # Errors
    ///
    /// Returns an error if the job is not in `Pending` state
    pub fn start(mut self, clock: &dyn Clock) -> Result<Self> {
        self.validate_transition(SyncStatus::Running)?;
        self.status = SyncStatus::Running;
        self.started_at = Some(clock.now());
        Ok(self)
    }

    /// Mark the job as completed with statistics
    ///
    /// # Errors
    ///
    /// Returns an error if the job is not in `Running` state
    pub fn complete(mut self, stats: SyncJobStats, clock: &dyn Clock) -> Result<Self> {
        self.validate_transition(SyncStatus::Completed)?;
        self.status = SyncStatus::Completed;
        self.completed_at = Some(clock.now());
        self.stats = stats;
        Ok(self)
    }

    /// Mark the job as failed, keeping the statistics gathered so far
    ///
    /// # Errors
    ///
    /// Returns an error if the job is already in a terminal state
    pub fn fail(
        mut self,
        error_message: impl Into<String>,
        stats: SyncJobStats,
        clock: &dyn Clock,
    ) -> Result<Self> {
        self.validate_transition(SyncStatus::Failed)?;
        self.status = SyncStatus::Failed;
        self.completed_at = Some(clock.now());
        self.error_message = Some(error_message.into());
        self.stats = stats;
        Ok(self)
    }

    /// Wall-clock duration, once the job has finished
    pub fn duration(&self) -> Option<chrono::Duration> {
        match (self.started_at, self.completed_at) {
            (Some(start), Some(end)) => Some(end - start),
            _ => None,
        }
    }

    fn validate_transition(&self, to: SyncStatus) -> Result<()> {
        let valid = matches!(
            (self.status, to),
            (SyncStatus::Pending, SyncStatus::Running)
                | (SyncStatus::Pending, SyncStatus::Failed)
                | (SyncStatus::Running, SyncStatus::Completed)
                | (SyncStatus::Running, SyncStatus::Failed)
        );

        if !valid {
            return Err(SyncError::InvalidStateTransition {
                from: self.status.as_str().to_string(),
                to: to.as_str().to_string(),
                reason: format!(
                    "Cannot transition from {} to {}",
                    self.status.as_str(),
                    to.as_str()
                ),
            });
        }

        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
