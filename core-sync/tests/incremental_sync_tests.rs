//! Integration tests for incremental mirroring
//!
//! These tests drive the coordinator end to end against in-memory fakes of
//! the source tree, the blob mirror and a block-level page store (wrapped in
//! `OrderedIndex`), with snapshots persisted by `JsonFileStore` in a temp
//! directory. They cover:
//! - First mirror and idempotent re-runs
//! - Modification and creation in one pass
//! - Folder renames and folders moved between parents
//! - Retry of items whose mirror calls failed
//! - Trash and permanent deletion, and skipping deleted subtrees
//! - Unreadable snapshots, full rebuilds and orphan pruning
//! - Alphabetical ordering of index pages

use async_trait::async_trait;
use bridge_desktop::TokioFileSystem;
use bridge_traits::{
    error::{BridgeError, Result as BridgeResult},
    BlobMirror, Block, BlockKind, FolderListing, IndexMirror, MirrorItem, Node, NodeIndex,
    PageStore, ParentState, SourceTree, SystemClock,
};
use bytes::Bytes;
use core_sync::{
    CorrespondenceStore, FolderState, JsonFileStore, MirrorIds, OrderedIndex, RunMode, SyncConfig,
    SyncCoordinator, SyncJob, SyncStatus,
};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tempfile::TempDir;
use tokio::sync::Mutex as AsyncMutex;

const ROOT: &str = "";
const DRIVE_ROOT: &str = "drive-root";
const PAGE_ROOT: &str = "page-root";

// ============================================================================
// Fake source tree
// ============================================================================

#[derive(Default)]
struct FakeSource {
    nodes: AsyncMutex<BTreeMap<String, Node>>,
    unconvertible: AsyncMutex<HashSet<String>>,
}

impl FakeSource {
    async fn add_file(&self, id: &str, name: &str, version: &str, parent: &str) {
        let node = Node::file(id, name, version, ParentState::Active(parent.to_string()));
        self.nodes.lock().await.insert(id.to_string(), node);
    }

    async fn add_folder(&self, id: &str, name: &str, parent: &str) {
        let node = Node::folder(id, name, "1", ParentState::Active(parent.to_string()));
        self.nodes.lock().await.insert(id.to_string(), node);
    }

    async fn edit(&self, id: &str, name: &str, version: &str) {
        let mut nodes = self.nodes.lock().await;
        let node = nodes.get_mut(id).expect("node exists");
        node.name = name.to_string();
        node.version = version.to_string();
    }

    async fn trash(&self, id: &str) {
        let mut nodes = self.nodes.lock().await;
        nodes.get_mut(id).expect("node exists").parent = ParentState::Trashed;
    }

    async fn move_to(&self, id: &str, parent: &str) {
        let mut nodes = self.nodes.lock().await;
        nodes.get_mut(id).expect("node exists").parent = ParentState::Active(parent.to_string());
    }

    async fn purge(&self, id: &str) {
        self.nodes.lock().await.remove(id);
    }

    async fn set_unconvertible(&self, id: &str, unconvertible: bool) {
        let mut set = self.unconvertible.lock().await;
        if unconvertible {
            set.insert(id.to_string());
        } else {
            set.remove(id);
        }
    }
}

#[async_trait]
impl SourceTree for FakeSource {
    async fn list_children(&self, folder_id: &str) -> BridgeResult<FolderListing> {
        let nodes = self.nodes.lock().await;
        let (folders, files): (Vec<Node>, Vec<Node>) = nodes
            .values()
            .filter(|n| n.parent == ParentState::Active(folder_id.to_string()))
            .cloned()
            .partition(|n| n.is_folder());
        Ok(FolderListing::new(files, folders))
    }

    async fn refresh_index(&self) -> BridgeResult<NodeIndex> {
        Ok(self.nodes.lock().await.values().cloned().collect())
    }

    async fn fetch_converted_content(&self, file_id: &str) -> BridgeResult<Bytes> {
        if self.unconvertible.lock().await.contains(file_id) {
            return Err(BridgeError::ConversionFailed(format!(
                "{} has no renderable pages",
                file_id
            )));
        }
        let nodes = self.nodes.lock().await;
        let node = nodes
            .get(file_id)
            .ok_or_else(|| BridgeError::NotFound(file_id.to_string()))?;
        Ok(Bytes::from(format!("%PDF {} v{}", node.name, node.version)))
    }
}

// ============================================================================
// Fake blob mirror
// ============================================================================

#[derive(Debug, Clone)]
struct BlobEntry {
    parent: String,
    name: String,
    content: Bytes,
    trashed: bool,
}

#[derive(Default)]
struct BlobState {
    items: HashMap<String, BlobEntry>,
    next_id: u32,
    calls: Vec<String>,
    fail_uploads: HashSet<String>,
    fail_replaces: bool,
}

#[derive(Default)]
struct FakeBlob {
    state: AsyncMutex<BlobState>,
}

impl FakeBlob {
    async fn fail_uploads_of(&self, name: &str, fail: bool) {
        let mut state = self.state.lock().await;
        if fail {
            state.fail_uploads.insert(name.to_string());
        } else {
            state.fail_uploads.remove(name);
        }
    }

    async fn fail_replaces(&self, fail: bool) {
        self.state.lock().await.fail_replaces = fail;
    }

    async fn entry(&self, id: &str) -> BlobEntry {
        self.state.lock().await.items[id].clone()
    }

    async fn calls(&self) -> Vec<String> {
        self.state.lock().await.calls.clone()
    }

    async fn live_names_under(&self, parent: &str) -> Vec<String> {
        let state = self.state.lock().await;
        let mut names: Vec<String> = state
            .items
            .values()
            .filter(|e| e.parent == parent && !e.trashed)
            .map(|e| e.name.clone())
            .collect();
        names.sort();
        names
    }

    fn create(state: &mut BlobState, parent: &str, name: &str, content: Bytes) -> MirrorItem {
        state.next_id += 1;
        let id = format!("blob-{}", state.next_id);
        state.items.insert(
            id.clone(),
            BlobEntry {
                parent: parent.to_string(),
                name: name.to_string(),
                content,
                trashed: false,
            },
        );
        MirrorItem::new(id.clone(), format!("https://drive.test/{}", id))
    }
}

#[async_trait]
impl BlobMirror for FakeBlob {
    async fn upload(&self, parent_id: &str, name: &str, content: Bytes) -> BridgeResult<MirrorItem> {
        let mut state = self.state.lock().await;
        state.calls.push(format!("upload:{}", name));
        if state.fail_uploads.contains(name) {
            return Err(BridgeError::OperationFailed("HTTP 503 error".to_string()));
        }
        Ok(Self::create(&mut state, parent_id, name, content))
    }

    async fn create_folder(&self, parent_id: &str, name: &str) -> BridgeResult<MirrorItem> {
        let mut state = self.state.lock().await;
        state.calls.push(format!("create_folder:{}", name));
        Ok(Self::create(&mut state, parent_id, name, Bytes::new()))
    }

    async fn rename(&self, id: &str, name: &str) -> BridgeResult<()> {
        let mut state = self.state.lock().await;
        state.calls.push(format!("rename:{}", name));
        let entry = state
            .items
            .get_mut(id)
            .ok_or_else(|| BridgeError::NotFound(id.to_string()))?;
        entry.name = name.to_string();
        Ok(())
    }

    async fn replace_content(&self, id: &str, content: Bytes) -> BridgeResult<()> {
        let mut state = self.state.lock().await;
        state.calls.push(format!("replace:{}", id));
        if state.fail_replaces {
            return Err(BridgeError::OperationFailed("HTTP 500 error".to_string()));
        }
        let entry = state
            .items
            .get_mut(id)
            .ok_or_else(|| BridgeError::NotFound(id.to_string()))?;
        entry.content = content;
        Ok(())
    }

    async fn trash(&self, id: &str) -> BridgeResult<()> {
        let mut state = self.state.lock().await;
        state.calls.push(format!("trash:{}", id));
        let entry = state
            .items
            .get_mut(id)
            .ok_or_else(|| BridgeError::NotFound(id.to_string()))?;
        entry.trashed = true;
        Ok(())
    }
}

// ============================================================================
// Fake page store
// ============================================================================

#[derive(Default)]
struct PagesState {
    pages: HashMap<String, Vec<Block>>,
    next_id: u32,
    mutations: usize,
    /// Mimic backends that leave an empty block after creating a sub-page
    trailing_blank: bool,
}

impl PagesState {
    fn next(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{}-{}", prefix, self.next_id)
    }

    fn locate(&self, block_id: &str) -> Option<(String, usize)> {
        self.pages.iter().find_map(|(page, blocks)| {
            blocks
                .iter()
                .position(|b| b.id == block_id)
                .map(|pos| (page.clone(), pos))
        })
    }

    fn append(&mut self, page_id: &str, block: Block) -> String {
        let id = block.id.clone();
        self.pages.entry(page_id.to_string()).or_default().push(block);
        self.mutations += 1;
        id
    }
}

#[derive(Default)]
struct FakePages {
    state: AsyncMutex<PagesState>,
}

impl FakePages {
    async fn mutations(&self) -> usize {
        self.state.lock().await.mutations
    }

    async fn titles(&self, page_id: &str) -> Vec<String> {
        let state = self.state.lock().await;
        state
            .pages
            .get(page_id)
            .map(|blocks| blocks.iter().map(|b| b.title.clone()).collect())
            .unwrap_or_default()
    }

    fn with_trailing_blank(mut self) -> Self {
        self.state.get_mut().trailing_blank = true;
        self
    }
}

#[async_trait]
impl PageStore for FakePages {
    async fn list_blocks(&self, page_id: &str) -> BridgeResult<Vec<Block>> {
        let state = self.state.lock().await;
        Ok(state.pages.get(page_id).cloned().unwrap_or_default())
    }

    async fn get_block(&self, block_id: &str) -> BridgeResult<Block> {
        let state = self.state.lock().await;
        let (page, pos) = state
            .locate(block_id)
            .ok_or_else(|| BridgeError::NotFound(block_id.to_string()))?;
        Ok(state.pages[&page][pos].clone())
    }

    async fn append_header(&self, page_id: &str, label: &str) -> BridgeResult<String> {
        let mut state = self.state.lock().await;
        let id = state.next("hdr");
        Ok(state.append(page_id, Block::header(id, label)))
    }

    async fn append_file_link(&self, page_id: &str, name: &str, url: &str) -> BridgeResult<String> {
        let mut state = self.state.lock().await;
        let id = state.next("link");
        Ok(state.append(page_id, Block::file_link(id, name, url)))
    }

    async fn create_sub_page(&self, parent_page_id: &str, title: &str) -> BridgeResult<String> {
        let mut state = self.state.lock().await;
        let id = state.next("page");
        state.append(parent_page_id, Block::sub_page(id.clone(), title));
        state.pages.insert(id.clone(), Vec::new());
        if state.trailing_blank {
            let blank = state.next("blank");
            state.append(parent_page_id, Block::other(blank, ""));
        }
        Ok(id)
    }

    async fn update_file_link(&self, block_id: &str, name: &str, url: &str) -> BridgeResult<()> {
        let mut state = self.state.lock().await;
        let (page, pos) = state
            .locate(block_id)
            .ok_or_else(|| BridgeError::NotFound(block_id.to_string()))?;
        state.pages.get_mut(&page).expect("page exists")[pos] = Block::file_link(block_id, name, url);
        state.mutations += 1;
        Ok(())
    }

    async fn set_page_title(&self, page_id: &str, title: &str) -> BridgeResult<()> {
        let mut state = self.state.lock().await;
        let (page, pos) = state
            .locate(page_id)
            .ok_or_else(|| BridgeError::NotFound(page_id.to_string()))?;
        state.pages.get_mut(&page).expect("page exists")[pos].title = title.to_string();
        state.mutations += 1;
        Ok(())
    }

    async fn delete_block(&self, block_id: &str) -> BridgeResult<()> {
        let mut state = self.state.lock().await;
        let (page, pos) = state
            .locate(block_id)
            .ok_or_else(|| BridgeError::NotFound(block_id.to_string()))?;
        let removed = state.pages.get_mut(&page).expect("page exists").remove(pos);
        if removed.kind == BlockKind::SubPage {
            state.pages.remove(&removed.id);
        }
        state.mutations += 1;
        Ok(())
    }

    async fn set_children_order(&self, page_id: &str, block_ids: &[String]) -> BridgeResult<()> {
        let mut state = self.state.lock().await;
        let blocks = state.pages.get(page_id).cloned().unwrap_or_default();
        let by_id: HashMap<&str, &Block> = blocks.iter().map(|b| (b.id.as_str(), b)).collect();
        let reordered = block_ids
            .iter()
            .map(|id| {
                by_id
                    .get(id.as_str())
                    .map(|b| (*b).clone())
                    .ok_or_else(|| BridgeError::NotFound(id.clone()))
            })
            .collect::<BridgeResult<Vec<Block>>>()?;
        state.pages.insert(page_id.to_string(), reordered);
        state.mutations += 1;
        Ok(())
    }
}

// ============================================================================
// Harness
// ============================================================================

struct Harness {
    source: Arc<FakeSource>,
    blob: Arc<FakeBlob>,
    pages: Arc<FakePages>,
    store: Arc<JsonFileStore>,
    dir: TempDir,
    coordinator: SyncCoordinator,
}

impl Harness {
    fn new() -> Self {
        Self::build(SyncConfig::default(), FakePages::default())
    }

    fn build(config: SyncConfig, pages: FakePages) -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let fs = Arc::new(TokioFileSystem::with_data_dir(dir.path().to_path_buf()));
        let store = Arc::new(JsonFileStore::new(fs, dir.path().join("folder_state")));

        let source = Arc::new(FakeSource::default());
        let blob = Arc::new(FakeBlob::default());
        let pages = Arc::new(pages);
        let index = Arc::new(OrderedIndex::new(pages.clone()));

        let coordinator = SyncCoordinator::new(
            config,
            source.clone(),
            blob.clone(),
            index,
            store.clone(),
            Arc::new(SystemClock),
        );

        Self {
            source,
            blob,
            pages,
            store,
            dir,
            coordinator,
        }
    }

    fn root() -> MirrorIds {
        MirrorIds::new(ROOT, DRIVE_ROOT, PAGE_ROOT)
    }

    async fn run(&self, mode: RunMode) -> SyncJob {
        let job = self
            .coordinator
            .run(mode, Self::root())
            .await
            .expect("valid job transitions");
        assert_eq!(job.status, SyncStatus::Completed, "{:?}", job.error_message);
        job
    }

    /// Every call that changed either mirror since construction
    async fn mutating_calls(&self) -> usize {
        self.blob.calls().await.len() + self.pages.mutations().await
    }

    async fn state(&self, folder_id: &str) -> FolderState {
        self.store
            .load(folder_id)
            .await
            .expect("readable state")
            .expect("state recorded")
    }

    async fn file_link_titles(&self, page_id: &str) -> Vec<String> {
        let state = self.pages.state.lock().await;
        state
            .pages
            .get(page_id)
            .map(|blocks| {
                blocks
                    .iter()
                    .filter(|b| b.is_file_link())
                    .map(|b| b.title.clone())
                    .collect()
            })
            .unwrap_or_default()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn test_first_run_mirrors_tree_and_second_run_is_idempotent() {
    let h = Harness::new();
    h.source.add_file("d-b", "beta", "1", ROOT).await;
    h.source.add_file("d-a", "Alpha", "1", ROOT).await;
    h.source.add_file("d-c", "charlie", "1", ROOT).await;
    h.source.add_folder("f-work", "Work", ROOT).await;
    h.source.add_file("d-plan", "Plan", "1", "f-work").await;

    let first = h.run(RunMode::Incremental).await;

    assert_eq!(first.stats.files_created, 4);
    assert_eq!(first.stats.folders_created, 1);
    assert_eq!(first.stats.items_failed, 0);
    assert_eq!(first.stats.folders_persisted, 2);
    assert_eq!(
        h.pages.titles(PAGE_ROOT).await,
        vec!["Files", "Alpha", "beta", "charlie", "Folders", "Work"]
    );

    let root_state = h.state(ROOT).await;
    let work = root_state.folder("f-work").expect("folder recorded");
    assert_eq!(h.file_link_titles(&work.index_id).await, vec!["Plan"]);
    assert_eq!(h.blob.live_names_under(&work.blob_id).await, vec!["Plan"]);

    let before = h.mutating_calls().await;
    let second = h.run(RunMode::Incremental).await;

    assert_eq!(second.stats.total_mutations(), 0);
    assert_eq!(second.stats.folders_persisted, 0);
    assert_eq!(h.mutating_calls().await, before);
}

#[tokio::test]
async fn test_modified_and_created_in_one_pass() {
    let h = Harness::new();
    h.source.add_file("f1", "Journal", "v1", ROOT).await;
    h.run(RunMode::Incremental).await;
    let uploaded = h.state(ROOT).await.file("f1").cloned().unwrap();

    h.source.edit("f1", "Journal", "v2").await;
    h.source.add_file("f2", "Ideas", "v1", ROOT).await;
    let job = h.run(RunMode::Incremental).await;

    assert_eq!(job.stats.files_updated, 1);
    assert_eq!(job.stats.files_created, 1);

    let state = h.state(ROOT).await;
    let f1 = state.file("f1").unwrap();
    assert_eq!(f1.source_version, "v2");
    assert_eq!(f1.blob_id, uploaded.blob_id);
    assert_eq!(f1.index_id, uploaded.index_id);
    assert_eq!(state.file("f2").unwrap().source_version, "v1");

    let content = h.blob.entry(&f1.blob_id).await.content;
    assert_eq!(content, Bytes::from("%PDF Journal vv2"));
    // Content-only change: no rename calls
    assert!(!h.blob.calls().await.iter().any(|c| c.starts_with("rename:")));
}

#[tokio::test]
async fn test_rename_updates_both_mirrors_without_moving_link() {
    let h = Harness::new();
    h.source.add_file("a", "apple", "1", ROOT).await;
    h.source.add_file("b", "banana", "1", ROOT).await;
    h.run(RunMode::Incremental).await;

    h.source.edit("a", "zucchini", "2").await;
    let job = h.run(RunMode::Incremental).await;

    assert_eq!(job.stats.files_updated, 1);
    let record = h.state(ROOT).await.file("a").cloned().unwrap();
    assert_eq!(record.name, "zucchini");
    assert_eq!(h.blob.entry(&record.blob_id).await.name, "zucchini");
    assert_eq!(h.file_link_titles(PAGE_ROOT).await, vec!["zucchini", "banana"]);

    // The next insertion re-sorts the files section
    h.source.add_file("c", "cherry", "1", ROOT).await;
    h.run(RunMode::Incremental).await;
    assert_eq!(
        h.file_link_titles(PAGE_ROOT).await,
        vec!["banana", "cherry", "zucchini"]
    );
}

#[tokio::test]
async fn test_folder_rename_updates_both_mirrors_in_place() {
    let h = Harness::new();
    h.source.add_folder("fa", "Archive", ROOT).await;
    h.source.add_folder("fb", "Books", ROOT).await;
    h.source.add_file("d", "Ledger", "1", "fa").await;
    h.run(RunMode::Incremental).await;
    let before = h.state(ROOT).await.folder("fa").cloned().unwrap();

    h.source.edit("fa", "Zettel", "2").await;
    let job = h.run(RunMode::Incremental).await;

    assert_eq!(job.stats.folders_updated, 1);
    assert_eq!(job.stats.total_mutations(), 1);

    let record = h.state(ROOT).await.folder("fa").cloned().unwrap();
    assert_eq!(record.name, "Zettel");
    assert_eq!(record.source_version, "2");
    assert_eq!(record.blob_id, before.blob_id);
    assert_eq!(record.index_id, before.index_id);

    assert_eq!(h.blob.entry(&record.blob_id).await.name, "Zettel");
    // Renamed sub-page keeps its position until the next insertion
    assert_eq!(
        h.pages.titles(PAGE_ROOT).await,
        vec!["Folders", "Zettel", "Books"]
    );
    assert_eq!(h.file_link_titles(&record.index_id).await, vec!["Ledger"]);

    let job = h.run(RunMode::Incremental).await;
    assert_eq!(job.stats.total_mutations(), 0);
}

#[tokio::test]
async fn test_partially_applied_update_keeps_old_version_until_it_succeeds() {
    let h = Harness::new();
    h.source.add_file("j", "Journal", "v1", ROOT).await;
    h.run(RunMode::Incremental).await;
    let blob_id = h.state(ROOT).await.file("j").unwrap().blob_id.clone();

    h.source.edit("j", "Diary", "v2").await;
    h.blob.fail_replaces(true).await;
    let job = h.run(RunMode::Incremental).await;

    assert_eq!(job.stats.items_failed, 1);
    assert_eq!(job.stats.files_updated, 0);
    let record = h.state(ROOT).await.file("j").cloned().unwrap();
    assert_eq!(record.source_version, "v1");
    assert_eq!(record.name, "Journal");
    // The rename went through before the content replace failed
    assert_eq!(h.blob.entry(&blob_id).await.name, "Diary");
    assert_eq!(h.file_link_titles(PAGE_ROOT).await, vec!["Journal"]);

    h.blob.fail_replaces(false).await;
    let job = h.run(RunMode::Incremental).await;

    assert_eq!(job.stats.files_updated, 1);
    assert_eq!(job.stats.items_failed, 0);
    let record = h.state(ROOT).await.file("j").cloned().unwrap();
    assert_eq!(record.source_version, "v2");
    assert_eq!(record.name, "Diary");
    assert_eq!(h.blob.entry(&blob_id).await.content, Bytes::from("%PDF Diary vv2"));
    assert_eq!(h.file_link_titles(PAGE_ROOT).await, vec!["Diary"]);

    let job = h.run(RunMode::Incremental).await;
    assert_eq!(job.stats.total_mutations(), 0);
}

#[tokio::test]
async fn test_moved_folder_is_mirrored_once_and_then_stable() {
    let h = Harness::new();
    h.source.add_folder("fa", "A", ROOT).await;
    h.source.add_folder("fb", "B", ROOT).await;
    h.source.add_folder("fx", "X", "fa").await;
    h.source.add_file("d", "Draft", "1", "fx").await;
    h.run(RunMode::Incremental).await;
    let origin = h.state("fa").await.folder("fx").cloned().unwrap();

    h.source.move_to("fx", "fb").await;
    let job = h.run(RunMode::Incremental).await;

    assert_eq!(job.stats.folders_created, 1);
    assert_eq!(job.stats.files_created, 1);
    assert_eq!(job.stats.folders_deleted, 0);

    // The origin keeps its record; the destination owns the subtree now
    assert_eq!(h.state("fa").await.folder("fx"), Some(&origin));
    let moved = h.state("fb").await.folder("fx").cloned().unwrap();
    assert_ne!(moved.blob_id, origin.blob_id);
    assert_eq!(h.state("fx").await.ids(), &moved.mirror_ids());
    assert_eq!(h.file_link_titles(&moved.index_id).await, vec!["Draft"]);

    for _ in 0..3 {
        let before = h.mutating_calls().await;
        let job = h.run(RunMode::Incremental).await;
        assert_eq!(job.stats.total_mutations(), 0);
        assert_eq!(job.stats.folders_persisted, 0);
        assert_eq!(h.mutating_calls().await, before);
    }
}

#[tokio::test]
async fn test_folder_with_dotted_id_is_recorded() {
    let h = Harness::new();
    h.source.add_folder("v1..2", "Releases", ROOT).await;
    h.source.add_file("notes", "Notes", "1", "v1..2").await;

    let job = h.run(RunMode::Incremental).await;
    assert_eq!(job.stats.folders_failed, 0);
    assert_eq!(job.stats.files_created, 1);
    assert!(h.state("v1..2").await.file("notes").is_some());

    let job = h.run(RunMode::Incremental).await;
    assert_eq!(job.stats.total_mutations(), 0);
    assert_eq!(job.stats.folders_failed, 0);
}

#[tokio::test]
async fn test_failed_upload_is_retried_next_run() {
    let h = Harness::new();
    h.source.add_file("ok", "Good", "1", ROOT).await;
    h.source.add_file("bad", "Draft", "1", ROOT).await;
    h.blob.fail_uploads_of("Draft", true).await;

    let job = h.run(RunMode::Incremental).await;

    assert_eq!(job.stats.files_created, 1);
    assert_eq!(job.stats.items_failed, 1);
    let state = h.state(ROOT).await;
    assert!(state.file("ok").is_some());
    assert!(state.file("bad").is_none());

    h.blob.fail_uploads_of("Draft", false).await;
    let job = h.run(RunMode::Incremental).await;

    assert_eq!(job.stats.files_created, 1);
    assert_eq!(job.stats.items_failed, 0);
    assert!(h.state(ROOT).await.file("bad").is_some());
    assert_eq!(h.file_link_titles(PAGE_ROOT).await, vec!["Draft", "Good"]);
}

#[tokio::test]
async fn test_conversion_failure_is_retried_next_run() {
    let h = Harness::new();
    h.source.add_file("sketch", "Sketch", "1", ROOT).await;
    h.source.set_unconvertible("sketch", true).await;

    let job = h.run(RunMode::Incremental).await;
    assert_eq!(job.stats.items_failed, 1);
    assert!(h.blob.calls().await.is_empty());

    h.source.set_unconvertible("sketch", false).await;
    let job = h.run(RunMode::Incremental).await;
    assert_eq!(job.stats.files_created, 1);
}

#[tokio::test]
async fn test_trashed_and_vanished_items_are_removed() {
    let h = Harness::new();
    h.source.add_file("keep", "Keep", "1", ROOT).await;
    h.source.add_file("binned", "Binned", "1", ROOT).await;
    h.source.add_file("gone", "Gone", "1", ROOT).await;
    h.source.add_folder("old", "Old", ROOT).await;
    h.source.add_file("inner", "Inner", "1", "old").await;
    h.run(RunMode::Incremental).await;

    let before = h.state(ROOT).await;
    let old_page = before.folder("old").unwrap().index_id.clone();
    let inner_blob = h.state("old").await.file("inner").unwrap().blob_id.clone();

    h.source.trash("binned").await;
    h.source.purge("gone").await;
    h.source.trash("old").await;
    let job = h.run(RunMode::Incremental).await;

    assert_eq!(job.stats.files_deleted, 2);
    assert_eq!(job.stats.folders_deleted, 1);

    let after = h.state(ROOT).await;
    assert!(after.file("binned").is_none());
    assert!(after.file("gone").is_none());
    assert!(after.folder("old").is_none());
    assert!(after.file("keep").is_some());

    for id in ["binned", "gone"] {
        let record = before.file(id).unwrap();
        assert!(h.blob.entry(&record.blob_id).await.trashed);
    }
    assert_eq!(h.file_link_titles(PAGE_ROOT).await, vec!["Keep"]);
    assert!(!h.pages.titles(PAGE_ROOT).await.contains(&"Old".to_string()));
    assert!(h.pages.titles(&old_page).await.is_empty());

    // The deleted folder's subtree is not visited
    assert!(!h.blob.entry(&inner_blob).await.trashed);
}

#[tokio::test]
async fn test_failed_delete_keeps_record_for_retry() {
    let h = Harness::new();
    h.source.add_file("x", "Temp", "1", ROOT).await;
    h.run(RunMode::Incremental).await;
    let record = h.state(ROOT).await.file("x").cloned().unwrap();

    // Blob item disappears out of band, so trashing it fails
    h.blob.state.lock().await.items.remove(&record.blob_id);
    h.source.purge("x").await;

    let job = h.run(RunMode::Incremental).await;
    assert_eq!(job.stats.items_failed, 1);
    assert_eq!(job.stats.files_deleted, 0);
    assert!(h.state(ROOT).await.file("x").is_some());
}

#[tokio::test]
async fn test_unreadable_state_is_treated_as_fresh_subtree() {
    let h = Harness::new();
    h.source.add_file("a", "A", "1", ROOT).await;
    h.source.add_file("b", "B", "1", ROOT).await;
    h.run(RunMode::Incremental).await;

    let path = h.dir.path().join("folder_state").join("_root.json");
    std::fs::write(&path, b"{\"schema\": 99}").unwrap();
    assert!(h.store.load(ROOT).await.is_err());

    let job = h.run(RunMode::Incremental).await;

    // At-least-once: both files are mirrored again
    assert_eq!(job.stats.files_created, 2);
    assert_eq!(h.blob.live_names_under(DRIVE_ROOT).await, vec!["A", "A", "B", "B"]);
    assert_eq!(h.state(ROOT).await.files().len(), 2);
}

#[tokio::test]
async fn test_full_rebuild_ignores_recorded_state() {
    let h = Harness::new();
    h.source.add_file("a", "A", "1", ROOT).await;
    h.source.add_folder("f", "F", ROOT).await;
    h.source.add_file("b", "B", "1", "f").await;
    h.run(RunMode::Incremental).await;
    let first_blob = h.state(ROOT).await.file("a").unwrap().blob_id.clone();

    let job = h.run(RunMode::FullRebuild).await;

    assert_eq!(job.stats.files_created, 2);
    assert_eq!(job.stats.folders_created, 1);
    assert_eq!(job.stats.folders_persisted, 2);
    assert_ne!(h.state(ROOT).await.file("a").unwrap().blob_id, first_blob);

    // The rebuilt state is the new baseline
    let job = h.run(RunMode::Incremental).await;
    assert_eq!(job.stats.total_mutations(), 0);
}

#[tokio::test]
async fn test_new_folder_ignores_stale_snapshot() {
    let h = Harness::new();
    h.source.add_folder("f", "Projects", ROOT).await;
    h.source.add_file("d", "Roadmap", "1", "f").await;
    h.run(RunMode::Incremental).await;

    // Folder is trashed, then restored: its snapshot on disk is stale
    h.source.trash("f").await;
    h.run(RunMode::Incremental).await;
    h.source.nodes.lock().await.get_mut("f").unwrap().parent =
        ParentState::Active(ROOT.to_string());

    let job = h.run(RunMode::Incremental).await;

    assert_eq!(job.stats.folders_created, 1);
    assert_eq!(job.stats.files_created, 1);
    let folder = h.state(ROOT).await.folder("f").cloned().unwrap();
    assert_eq!(h.file_link_titles(&folder.index_id).await, vec!["Roadmap"]);
    assert_eq!(h.state("f").await.ids(), &folder.mirror_ids());
}

#[tokio::test]
async fn test_prune_removes_snapshots_of_dead_folders() {
    let h = Harness::build(
        SyncConfig {
            prune_orphans: true,
            ..Default::default()
        },
        FakePages::default(),
    );
    h.source.add_folder("keep", "Keep", ROOT).await;
    h.source.add_folder("drop", "Drop", ROOT).await;
    h.run(RunMode::Incremental).await;
    assert!(h.store.load("drop").await.unwrap().is_some());

    h.source.purge("drop").await;
    let job = h.run(RunMode::Incremental).await;

    assert_eq!(job.stats.states_pruned, 1);
    assert!(h.store.load("drop").await.unwrap().is_none());
    assert!(h.store.load("keep").await.unwrap().is_some());
    assert!(h.store.load(ROOT).await.unwrap().is_some());
}

#[tokio::test]
async fn test_always_persist_rewrites_unchanged_folders() {
    let h = Harness::build(
        SyncConfig {
            always_persist: true,
            ..Default::default()
        },
        FakePages::default(),
    );
    h.source.add_file("a", "A", "1", ROOT).await;
    h.run(RunMode::Incremental).await;

    let job = h.run(RunMode::Incremental).await;
    assert_eq!(job.stats.total_mutations(), 0);
    assert_eq!(job.stats.folders_persisted, 1);
}

#[tokio::test]
async fn test_sub_pages_sorted_despite_trailing_blank_blocks() {
    let pages = FakePages::default().with_trailing_blank();
    let h = Harness::build(SyncConfig::default(), pages);
    h.source.add_folder("3", "delta", ROOT).await;
    h.source.add_folder("1", "Bravo", ROOT).await;
    h.source.add_folder("2", "alpha", ROOT).await;

    h.run(RunMode::Incremental).await;

    assert_eq!(
        h.pages.titles(PAGE_ROOT).await,
        vec!["Folders", "alpha", "Bravo", "delta"]
    );
}

#[tokio::test]
async fn test_file_links_listed_alphabetically_after_unordered_inserts() {
    let pages = Arc::new(FakePages::default());
    let index = OrderedIndex::new(pages.clone());

    let b = index.add_file_link("p", "b", "u-b").await.unwrap();
    let a = index.add_file_link("p", "a", "u-a").await.unwrap();
    let c = index.add_file_link("p", "c", "u-c").await.unwrap();

    assert_eq!(index.list_file_link_ids("p").await.unwrap(), vec![a, b, c]);
}
