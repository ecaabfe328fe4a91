//! 端到端同步测试：本地目录 <-> 内存存储

use bucketsync::core::{
    ActionDispatcher, ActionRunner, LocalFolder, RemoteFolder, VersionAction, ONE_DAY_IN_MS,
};
use bucketsync::storage::local::modified_millis;
use bucketsync::storage::MemoryStore;
use bucketsync::{SyncConfig, SyncEngine, SyncError, SyncPolicy, SyncReport, SyncSummary};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

fn engine(policy: SyncPolicy) -> SyncEngine {
    SyncEngine::with_reporter(
        SyncConfig {
            policy,
            ..Default::default()
        },
        Arc::new(SyncReport::with_writer(Box::new(std::io::sink()))),
    )
}

fn write_file(root: &Path, name: &str, content: &[u8], mod_time: i64) {
    let path = root.join(name);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, content).unwrap();
    let file = std::fs::OpenOptions::new().write(true).open(&path).unwrap();
    file.set_modified(UNIX_EPOCH + Duration::from_millis(mod_time as u64))
        .unwrap();
}

async fn upload(
    root: &Path,
    store: &Arc<MemoryStore>,
    policy: SyncPolicy,
    now_millis: i64,
) -> bucketsync::Result<SyncSummary> {
    let remote = Arc::new(RemoteFolder::new("bucket", "backup", store.clone()));
    let runner: Arc<dyn ActionDispatcher> = Arc::new(ActionRunner::for_folder(&remote));
    engine(policy)
        .run_sync(
            Arc::new(LocalFolder::new(root).unwrap()),
            remote,
            Some(runner),
            now_millis,
        )
        .await
}

async fn download(
    store: &Arc<MemoryStore>,
    root: &Path,
    policy: SyncPolicy,
) -> bucketsync::Result<SyncSummary> {
    let remote = Arc::new(RemoteFolder::new("bucket", "backup", store.clone()));
    let runner: Arc<dyn ActionDispatcher> = Arc::new(ActionRunner::for_folder(&remote));
    engine(policy)
        .run_sync(
            remote,
            Arc::new(LocalFolder::new(root).unwrap()),
            Some(runner),
            0,
        )
        .await
}

#[tokio::test]
async fn test_upload_then_second_run_is_idle() {
    let dir = tempfile::tempdir().unwrap();
    write_file(dir.path(), "a.txt", b"alpha", 1_000_000);
    write_file(dir.path(), "nested/b.txt", b"beta", 2_000_000);
    let store = Arc::new(MemoryStore::new("bucket"));

    let first = upload(dir.path(), &store, SyncPolicy::default(), 0)
        .await
        .unwrap();
    assert_eq!(first.transfer_files, 2);
    assert_eq!(first.transfer_bytes, 9);
    assert_eq!(
        store.visible_names().await,
        vec!["backup/a.txt", "backup/nested/b.txt"]
    );
    assert_eq!(
        store.versions("backup/nested/b.txt").await[0].mod_time_millis(),
        2_000_000
    );

    let second = upload(dir.path(), &store, SyncPolicy::default(), 0)
        .await
        .unwrap();
    assert_eq!(second.files_compared, 2);
    assert_eq!(second.transfer_files, 0);
    assert_eq!(second.actions_planned, 0);
}

#[tokio::test]
async fn test_modified_file_is_uploaded_again_and_old_version_deleted() {
    let dir = tempfile::tempdir().unwrap();
    write_file(dir.path(), "a.txt", b"v1", 1_000_000);
    let store = Arc::new(MemoryStore::new("bucket"));
    upload(dir.path(), &store, SyncPolicy::default(), 0)
        .await
        .unwrap();

    write_file(dir.path(), "a.txt", b"v2!", 3_000_000);
    let policy = SyncPolicy {
        delete: true,
        ..Default::default()
    };
    let summary = upload(dir.path(), &store, policy, 0).await.unwrap();

    assert_eq!(summary.transfer_files, 1);
    assert_eq!(summary.actions_planned, 2);
    let versions = store.versions("backup/a.txt").await;
    assert_eq!(versions.len(), 1);
    assert_eq!(versions[0].size, 3);
    assert_eq!(versions[0].mod_time_millis(), 3_000_000);
}

#[tokio::test]
async fn test_removed_local_file_is_hidden_with_keep_days() {
    let dir = tempfile::tempdir().unwrap();
    write_file(dir.path(), "keep.txt", b"k", 1_000_000);
    let store = Arc::new(MemoryStore::new("bucket"));
    let now = 400 * ONE_DAY_IN_MS;
    store
        .insert_version(
            "backup/gone.txt",
            VersionAction::Upload,
            now - 100 * ONE_DAY_IN_MS,
            b"old".to_vec(),
        )
        .await;
    store
        .insert_version(
            "backup/gone.txt",
            VersionAction::Upload,
            now - 2 * ONE_DAY_IN_MS,
            b"recent".to_vec(),
        )
        .await;

    let policy = SyncPolicy {
        keep_days: Some(30),
        ..Default::default()
    };
    upload(dir.path(), &store, policy, now).await.unwrap();

    assert_eq!(store.visible_names().await, vec!["backup/keep.txt"]);
    let versions = store.versions("backup/gone.txt").await;
    let actions: Vec<VersionAction> = versions.iter().map(|v| v.action).collect();
    // 隐藏标记 + 仍在保留期内的版本
    assert_eq!(actions, vec![VersionAction::Hide, VersionAction::Upload]);
}

#[tokio::test]
async fn test_newer_destination_aborts_run() {
    let dir = tempfile::tempdir().unwrap();
    write_file(dir.path(), "a.txt", b"old", 1_000);
    let store = Arc::new(MemoryStore::new("bucket"));
    store
        .insert_version("backup/a.txt", VersionAction::Upload, 5_000, b"newer".to_vec())
        .await;

    let err = upload(dir.path(), &store, SyncPolicy::default(), 0)
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::DestinationNewer { ref name } if name == "a.txt"));

    let skip = SyncPolicy {
        skip_newer: true,
        ..Default::default()
    };
    let summary = upload(dir.path(), &store, skip, 0).await.unwrap();
    assert_eq!(summary.actions_planned, 0);
    assert_eq!(store.versions("backup/a.txt").await.len(), 1);
}

#[tokio::test]
async fn test_download_and_local_delete() {
    let dir = tempfile::tempdir().unwrap();
    write_file(dir.path(), "stale.txt", b"stale", 1_000);
    let store = Arc::new(MemoryStore::new("bucket"));
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_millis() as i64;
    store
        .insert_version("backup/docs/readme.md", VersionAction::Upload, now - 5_000, b"# hi".to_vec())
        .await;

    let policy = SyncPolicy {
        delete: true,
        ..Default::default()
    };
    let summary = download(&store, dir.path(), policy.clone()).await.unwrap();

    assert_eq!(summary.transfer_files, 1);
    let readme = dir.path().join("docs").join("readme.md");
    assert_eq!(std::fs::read(&readme).unwrap(), b"# hi");
    assert_eq!(
        modified_millis(&std::fs::metadata(&readme).unwrap()).unwrap(),
        now - 5_000
    );
    assert!(!dir.path().join("stale.txt").exists());

    let again = download(&store, dir.path(), policy).await.unwrap();
    assert_eq!(again.actions_planned, 0);
}
