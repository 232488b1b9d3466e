//! Core service façade and bootstrap helpers.
//!
//! This crate wires host-provided bridge implementations (source tree, blob
//! mirror, index mirror, filesystem) into the mirroring core and exposes the
//! two run modes. Desktop apps typically enable the `desktop-shims` feature,
//! which builds the Google Drive and Notion adapters over `bridge-desktop`'s
//! reqwest client.

pub mod error;

pub use error::{CoreError, Result};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bridge_traits::{
    BlobMirror, Clock, FileSystemAccess, IndexMirror, SourceTree, SystemClock,
};
use core_runtime::config::MirrorConfig;
use core_sync::{JsonFileStore, MirrorIds, RunMode, SyncConfig, SyncCoordinator, SyncJob};
use tracing::{info, instrument, warn};

/// Aggregated handle to all bridge dependencies the core requires.
pub struct MirrorDependencies {
    pub source: Arc<dyn SourceTree>,
    pub blob: Arc<dyn BlobMirror>,
    pub index: Arc<dyn IndexMirror>,
    pub filesystem: Arc<dyn FileSystemAccess>,
    pub clock: Arc<dyn Clock>,
}

impl MirrorDependencies {
    /// Construct a dependency bundle from explicit bridge handles.
    pub fn new(
        source: Arc<dyn SourceTree>,
        blob: Arc<dyn BlobMirror>,
        index: Arc<dyn IndexMirror>,
        filesystem: Arc<dyn FileSystemAccess>,
    ) -> Self {
        Self {
            source,
            blob,
            index,
            filesystem,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}

/// Primary façade exposed to host applications.
///
/// Cloning is cheap; clones share the run guard, so at most one run is in
/// flight per service regardless of how many handles exist.
#[derive(Clone)]
pub struct MirrorService {
    config: Arc<MirrorConfig>,
    coordinator: Arc<SyncCoordinator>,
    running: Arc<AtomicBool>,
}

impl MirrorService {
    /// Create a new service from a validated configuration and the
    /// provided dependencies.
    pub fn new(config: MirrorConfig, deps: MirrorDependencies) -> Result<Self> {
        config.validate()?;

        let store = Arc::new(JsonFileStore::new(deps.filesystem, config.state_dir.clone()));
        let sync_config = SyncConfig {
            prune_orphans: config.prune_orphans,
            ..SyncConfig::default()
        };
        let coordinator = SyncCoordinator::new(
            sync_config,
            deps.source,
            deps.blob,
            deps.index,
            store,
            deps.clock,
        );

        Ok(Self {
            config: Arc::new(config),
            coordinator: Arc::new(coordinator),
            running: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn config(&self) -> &MirrorConfig {
        &self.config
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Mirror the whole tree from scratch, ignoring recorded state.
    pub async fn full_rebuild(&self) -> Result<SyncJob> {
        self.run(RunMode::FullRebuild).await
    }

    /// Apply changes since the last recorded state.
    pub async fn incremental_update(&self) -> Result<SyncJob> {
        self.run(RunMode::Incremental).await
    }

    /// Run one pass in the given mode.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::AlreadyRunning`] if another run holds the guard.
    /// A run that started but could not complete is returned as a job with
    /// status `Failed`.
    #[instrument(skip(self, mode), fields(mode = mode.as_str()))]
    pub async fn run(&self, mode: RunMode) -> Result<SyncJob> {
        let _guard = RunGuard::acquire(&self.running)?;
        let root = MirrorIds::from(self.config.roots.clone());

        let job = self.coordinator.run(mode, root).await?;

        if job.stats.has_failures() {
            warn!(
                job_id = %job.id,
                status = job.status.as_str(),
                items_failed = job.stats.items_failed,
                folders_failed = job.stats.folders_failed,
                "Mirror run finished with failures"
            );
        } else {
            info!(
                job_id = %job.id,
                status = job.status.as_str(),
                mutations = job.stats.total_mutations(),
                duration_ms = job.duration().map(|d| d.num_milliseconds()),
                "Mirror run finished"
            );
        }

        Ok(job)
    }
}

/// Holds the service's running flag for the lifetime of one run.
struct RunGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> RunGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Result<Self> {
        flag.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .map_err(|_| CoreError::AlreadyRunning)?;
        Ok(Self { flag })
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

/// Credentials for the desktop mirror adapters.
#[cfg(feature = "desktop-shims")]
#[derive(Debug, Clone)]
pub struct DesktopCredentials {
    /// OAuth 2.0 access token for Google Drive
    pub drive_access_token: String,
    pub notion: provider_notion::NotionCredentials,
}

/// Convenience bootstrapper for desktop hosts.
///
/// The source tree is always host-provided. Snapshots go through
/// `tokio::fs` under `config.state_dir`. Logging is left to the host
/// (`core_runtime::logging::init_logging(config.logging.clone())`).
///
/// ```ignore
/// use core_service::{bootstrap_desktop, DesktopCredentials};
///
/// let config = MirrorConfig::from_env()?;
/// core_runtime::logging::init_logging(config.logging.clone())?;
/// let service = bootstrap_desktop(config, source, credentials)?;
/// let job = service.incremental_update().await?;
/// ```
#[cfg(all(feature = "desktop-shims", not(target_arch = "wasm32")))]
pub fn bootstrap_desktop(
    config: MirrorConfig,
    source: Arc<dyn SourceTree>,
    credentials: DesktopCredentials,
) -> Result<MirrorService> {
    use bridge_desktop::{ReqwestHttpClient, TokioFileSystem};
    use bridge_traits::HttpClient;
    use core_sync::OrderedIndex;
    use provider_google_drive::GoogleDriveBlobMirror;
    use provider_notion::NotionPageStore;

    let http_client: Arc<dyn HttpClient> = Arc::new(
        ReqwestHttpClient::new().map_err(|e| CoreError::InitializationFailed(e.to_string()))?,
    );

    let blob = Arc::new(GoogleDriveBlobMirror::new(
        http_client.clone(),
        credentials.drive_access_token,
    ));
    let pages = Arc::new(NotionPageStore::new(http_client, credentials.notion));
    let index = Arc::new(OrderedIndex::with_labels(pages, config.sections.clone()));

    let deps = MirrorDependencies::new(source, blob, index, Arc::new(TokioFileSystem::new()));
    MirrorService::new(config, deps)
}
