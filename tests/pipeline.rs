//! End-to-end tests of the import pipeline and duplicate workflow against
//! a real SQLite database and blob store.

use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use hoard::app::App;
use hoard::background::{repository_queue, thumbnail_queue};
use hoard::blob_store::BlobStore;
use hoard::commands::serve;
use hoard::config::ThumbnailConfig;
use hoard::db;
use hoard::duplicates::{DuplicateEngine, Resolution};
use hoard::import::{Importer, REIMPORTED};
use hoard::migrate;
use hoard::perceptual::BlockhashProvider;
use hoard::progress::{ProgressEvent, ProgressReporter};
use hoard::sources::Sources;
use hoard::sqlite_store::SqliteStore;
use hoard::thumbnail::ThumbnailCreator;
use hoard_core::models::{DuplicateResolution, ImportItem, ImportKind, ImportRequest, ItemPair};
use hoard_core::store::MediaStore;
use hoard_core::BlobKind;
use image::{ImageFormat, RgbImage};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

// ─── Fixtures ───────────────────────────────────────────────────────

/// Blocky grayscale picture; `variant` flips a single pixel so the bytes
/// differ while the picture stays perceptually identical.
fn picture(variant: u8, inverted: bool) -> Vec<u8> {
    let mut img = RgbImage::from_fn(64, 64, |x, y| {
        let dark = (x / 8 + y / 16) % 2 == 0;
        let v = if dark != inverted { 20 } else { 235 };
        image::Rgb([v, v, v])
    });
    img.put_pixel(0, 0, image::Rgb([variant, variant, variant]));
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, ImageFormat::Png).unwrap();
    out.into_inner()
}

struct Env {
    tmp: TempDir,
    store: Arc<SqliteStore>,
    blobs: BlobStore,
    progress: ProgressReporter,
}

async fn env() -> Env {
    let tmp = TempDir::new().unwrap();
    let pool = db::connect_path(&tmp.path().join("data/hoard.sqlite"))
        .await
        .unwrap();
    migrate::apply(&pool).await.unwrap();
    let blobs = BlobStore::new(tmp.path().join("files"));
    blobs.bootstrap().await.unwrap();
    Env {
        tmp,
        store: Arc::new(SqliteStore::new(pool)),
        blobs,
        progress: ProgressReporter::new(),
    }
}

impl Env {
    fn write_source(&self, name: &str, bytes: &[u8]) -> String {
        let dir = self.tmp.path().join("incoming");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        std::fs::write(&path, bytes).unwrap();
        path.to_string_lossy().to_string()
    }

    /// Run one request through a full pipeline and wait for the queues.
    async fn import(&self, request: &ImportRequest) -> hoard_core::models::ImportResult {
        let cancel = CancellationToken::new();
        let (thumbs, thumb_worker) = thumbnail_queue(4);
        let (repo, repo_worker) = repository_queue(50);
        let creator = Arc::new(ThumbnailCreator::new(
            self.blobs.clone(),
            &ThumbnailConfig::default(),
        ));
        let thumb_handle = tokio::spawn(thumb_worker.run(creator, cancel.clone()));
        let repo_handle = tokio::spawn(repo_worker.run(self.store.clone(), cancel.clone()));

        let config = hoard::config::parse_config(
            "[db]\npath = \"unused\"\n[storage]\nroot = \"unused\"\n",
        )
        .unwrap();
        let importer = Importer::new(
            self.store.clone(),
            self.blobs.clone(),
            Sources::from_config(&config).unwrap(),
            thumbs,
            repo,
            self.progress.clone(),
        );
        let result = importer.process_import(request).await;
        drop(importer);
        thumb_handle.await.unwrap();
        repo_handle.await.unwrap();
        result
    }

    fn engine(&self) -> DuplicateEngine {
        DuplicateEngine::new(
            self.store.clone(),
            self.blobs.clone(),
            Arc::new(BlockhashProvider),
            self.progress.clone(),
        )
    }

    async fn item_rows(&self) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM items")
            .fetch_one(self.store.pool())
            .await
            .unwrap()
    }
}

fn file_request<S: AsRef<str>>(sources: &[S]) -> ImportRequest {
    ImportRequest::new(
        ImportKind::File,
        sources.iter().map(|s| ImportItem::new(s.as_ref())).collect(),
    )
}

// ─── Import ─────────────────────────────────────────────────────────

#[tokio::test]
async fn failed_item_does_not_abort_siblings() {
    let env = env().await;
    let first = env.write_source("one.png", &picture(1, false));
    let missing = env
        .tmp
        .path()
        .join("incoming/missing.png")
        .to_string_lossy()
        .to_string();
    let third = env.write_source("three.png", &picture(3, true));

    let request = file_request(&[first, missing, third]);
    let result = env.import(&request).await;

    assert_eq!(result.import_id, request.import_id);
    assert_eq!(result.outcomes.len(), 3);
    assert!(result.outcomes[0].ok);
    assert!(!result.outcomes[1].ok);
    assert!(result.outcomes[2].ok);
    assert_eq!(env.item_rows().await, 2);

    for bytes in [picture(1, false), picture(3, true)] {
        let hash = hoard_core::hash(&bytes);
        assert_eq!(env.blobs.read(&hash, BlobKind::File).await.unwrap(), bytes);
        assert!(env
            .blobs
            .lookup(&hash, BlobKind::Thumbnail)
            .await
            .unwrap()
            .is_some());
    }
}

#[tokio::test]
async fn url_import_reports_transport_failure() {
    let env = env().await;
    let request = ImportRequest::new(
        ImportKind::RawUrl,
        vec![ImportItem::new("http://127.0.0.1:9/unreachable.png")],
    );
    let result = env.import(&request).await;
    assert_eq!(result.outcomes.len(), 1);
    assert!(!result.outcomes[0].ok);
    assert!(result.outcomes[0]
        .message
        .as_deref()
        .unwrap()
        .starts_with("Transport error"));
}

#[tokio::test]
async fn reimport_of_deleted_item_reactivates_same_row() {
    let env = env().await;
    let bytes = picture(7, false);
    let source = env.write_source("seven.png", &bytes);
    let hash = hoard_core::hash(&bytes);

    assert!(env.import(&file_request(&[&source])).await.outcomes[0].ok);
    let item = env.store.find_by_hash(&hash).await.unwrap().unwrap();

    let deleted = hoard::deletion::ItemDeleter::new(env.store.clone(), env.blobs.clone())
        .delete_items(&[item.id])
        .await;
    assert!(deleted[0].ok);
    assert!(env.blobs.lookup(&hash, BlobKind::File).await.unwrap().is_none());

    let refused = env.import(&file_request(&[&source])).await;
    assert!(!refused.outcomes[0].ok);

    let mut request = file_request(&[&source]);
    request.allow_reimport_deleted = true;
    let result = env.import(&request).await;
    assert!(result.outcomes[0].ok);
    assert_eq!(result.outcomes[0].message.as_deref(), Some(REIMPORTED));

    let again = env.store.find_by_hash(&hash).await.unwrap().unwrap();
    assert_eq!(again.id, item.id);
    assert!(!again.is_deleted());
    assert_eq!(env.item_rows().await, 1);
    assert_eq!(env.blobs.read(&hash, BlobKind::File).await.unwrap(), bytes);
}

#[tokio::test]
async fn import_emits_progress_lifecycle() {
    let env = env().await;
    let mut events = env.progress.subscribe();
    let source = env.write_source("p.png", &picture(9, false));
    env.import(&file_request(&[&source])).await;

    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }
    assert!(matches!(seen.first(), Some(ProgressEvent::Started { total: 1, .. })));
    assert!(matches!(seen.last(), Some(ProgressEvent::Completed { .. })));
    assert!(env.progress.live_operations().is_empty());
}

// ─── Duplicates ─────────────────────────────────────────────────────

/// Imports two perceptually identical pictures and one different one,
/// then hashes and scans. Returns (a, b) item ids and the candidate id.
async fn duplicate_fixture(env: &Env) -> (i64, i64, i64) {
    let a_bytes = picture(1, false);
    let b_bytes = picture(2, false);
    let sources = [
        env.write_source("a.png", &a_bytes),
        env.write_source("b.png", &b_bytes),
        env.write_source("c.png", &picture(3, true)),
    ];
    let result = env.import(&file_request(&sources)).await;
    assert_eq!(result.succeeded(), 3);

    let engine = env.engine();
    let cancel = CancellationToken::new();
    assert_eq!(engine.calculate_missing_hashes(100, &cancel).await.unwrap(), 3);
    assert_eq!(engine.calculate_missing_hashes(100, &cancel).await.unwrap(), 0);
    assert_eq!(engine.find_duplicates(&cancel).await.unwrap(), 1);

    let a = env
        .store
        .find_by_hash(&hoard_core::hash(&a_bytes))
        .await
        .unwrap()
        .unwrap()
        .id;
    let b = env
        .store
        .find_by_hash(&hoard_core::hash(&b_bytes))
        .await
        .unwrap()
        .unwrap()
        .id;

    let candidates = env.store.list_candidates().await.unwrap();
    assert_eq!(candidates.len(), 1);
    assert_eq!(candidates[0].pair, ItemPair::new(a, b));
    assert_eq!(candidates[0].pair.low(), a.min(b));
    assert_eq!(candidates[0].distance, 100.0);
    (a, b, candidates[0].id)
}

#[tokio::test]
async fn rescan_never_duplicates_a_pair() {
    let env = env().await;
    duplicate_fixture(&env).await;
    let cancel = CancellationToken::new();
    assert_eq!(env.engine().find_duplicates(&cancel).await.unwrap(), 0);
    assert_eq!(env.store.list_candidates().await.unwrap().len(), 1);
}

#[tokio::test]
async fn resolve_with_keep_deletes_the_other_side() {
    let env = env().await;
    let (a, b, candidate) = duplicate_fixture(&env).await;

    let resolution = env
        .engine()
        .resolve(candidate, DuplicateResolution::Distinct, Some(a))
        .await
        .unwrap();
    match resolution {
        Resolution::Deleted { kept, deleted } => {
            assert_eq!(kept, a);
            assert_eq!(deleted.id, b);
            assert!(deleted.ok);
        }
        other => panic!("unexpected resolution: {:?}", other),
    }

    assert!(env.store.list_candidates().await.unwrap().is_empty());
    assert!(env.store.list_decisions().await.unwrap().is_empty());

    let b_item = env.store.get_item(b).await.unwrap().unwrap();
    assert!(b_item.is_deleted());
    assert!(env
        .blobs
        .lookup(&b_item.hash, BlobKind::File)
        .await
        .unwrap()
        .is_none());
    assert!(!env.store.get_item(a).await.unwrap().unwrap().is_deleted());
}

#[tokio::test]
async fn reimported_deleted_side_is_proposed_again() {
    let env = env().await;
    let (a, b, candidate) = duplicate_fixture(&env).await;
    env.engine()
        .resolve(candidate, DuplicateResolution::Distinct, Some(a))
        .await
        .unwrap();

    let source = env.tmp.path().join("incoming/b.png");
    let mut request = file_request(&[source.to_string_lossy()]);
    request.allow_reimport_deleted = true;
    let result = env.import(&request).await;
    assert_eq!(result.outcomes[0].message.as_deref(), Some(REIMPORTED));
    assert!(!env.store.get_item(b).await.unwrap().unwrap().is_deleted());

    let engine = env.engine();
    let cancel = CancellationToken::new();
    engine.calculate_missing_hashes(100, &cancel).await.unwrap();
    assert_eq!(engine.find_duplicates(&cancel).await.unwrap(), 1);
    let candidates = env.store.list_candidates().await.unwrap();
    assert_eq!(candidates.len(), 1);
    assert_eq!(candidates[0].pair, ItemPair::new(a, b));
}

#[tokio::test]
async fn resolve_without_keep_records_one_decision() {
    let env = env().await;
    let (a, b, candidate) = duplicate_fixture(&env).await;

    let resolution = env
        .engine()
        .resolve(candidate, DuplicateResolution::KeepBoth, None)
        .await
        .unwrap();
    assert!(matches!(resolution, Resolution::Decided(_)));

    assert!(env.store.list_candidates().await.unwrap().is_empty());
    let decisions = env.store.list_decisions().await.unwrap();
    assert_eq!(decisions.len(), 1);
    assert_eq!(decisions[0].pair, ItemPair::new(a, b));
    assert_eq!(decisions[0].resolution, DuplicateResolution::KeepBoth);

    // A decided pair is never flagged again.
    let cancel = CancellationToken::new();
    assert_eq!(env.engine().find_duplicates(&cancel).await.unwrap(), 0);
}

#[tokio::test]
async fn cancelled_scan_completes_its_progress_handle() {
    let env = env().await;
    duplicate_fixture(&env).await;

    let cancel = CancellationToken::new();
    cancel.cancel();
    let mut events = env.progress.subscribe();
    assert_eq!(env.engine().find_duplicates(&cancel).await.unwrap(), 0);

    let mut completed = false;
    while let Ok(event) = events.try_recv() {
        completed |= matches!(event, ProgressEvent::Completed { .. });
    }
    assert!(completed);
    assert!(env.progress.live_operations().is_empty());
}

// ─── Service ────────────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn service_shutdown_keeps_work_queued_by_the_last_folder_pass() {
    let tmp = TempDir::new().unwrap();
    let drop_dir = tmp.path().join("drop");
    std::fs::create_dir_all(&drop_dir).unwrap();
    let pictures: Vec<Vec<u8>> = (1..=5).map(|v| picture(v, false)).collect();
    for (i, bytes) in pictures.iter().enumerate() {
        std::fs::write(drop_dir.join(format!("{}.png", i)), bytes).unwrap();
    }

    let config = hoard::config::parse_config(&format!(
        "[db]\npath = {:?}\n[storage]\nroot = {:?}\n\
         [import_folder]\nenabled = true\ndirectories = [{:?}]\nperiod_secs = 3600\n",
        tmp.path().join("data/hoard.sqlite").display().to_string(),
        tmp.path().join("data/blobs").display().to_string(),
        drop_dir.display().to_string(),
    ))
    .unwrap();
    let app = App::open(config).await.unwrap();

    // Stop as soon as the folder pass has stored its first item.
    let first = hoard_core::hash(&pictures[0]);
    let shutdown = async {
        for _ in 0..10_000 {
            if app.store.find_by_hash(&first).await.unwrap().is_some() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        panic!("folder pass never imported anything");
    };
    let (thumbnails, _) = serve(&app, shutdown).await.unwrap();

    assert_eq!(thumbnails, pictures.len());
    for bytes in &pictures {
        let hash = hoard_core::hash(bytes);
        assert!(app.store.find_by_hash(&hash).await.unwrap().is_some());
        assert!(app
            .blobs
            .lookup(&hash, BlobKind::Thumbnail)
            .await
            .unwrap()
            .is_some());
    }
}
