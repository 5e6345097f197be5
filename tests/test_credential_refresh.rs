// tests/test_credential_refresh.rs
//
// Credential cache behavior under the engine: refresh-before-upload for
// expired credentials, single-flight refresh across concurrent uploads,
// durable cache file reuse, refresh failure propagation.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{MockAuth, MockRemote, test_credential};
use uplio::credentials::{Channel, CredentialStore};
use uplio::{FileHandle, UploadEngine, UploadError, UploadOptions};

fn store(auth: &std::sync::Arc<MockAuth>) -> Arc<CredentialStore> {
    common::init_logging();
    Arc::new(CredentialStore::new(auth.clone()))
}

fn patterned(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

#[tokio::test]
async fn expired_credential_refreshes_before_any_upload_call() {
    let remote = MockRemote::new();
    let auth = MockAuth::new(Channel::Oss, 3600);
    let store = store(&auth);
    let engine = UploadEngine::new(remote.clone(), store, UploadOptions::new());

    // The store starts empty: the engine must obtain a credential before
    // initiating anything.
    let file = FileHandle::from_bytes("a.bin", patterned(1024));
    engine.upload(&file).await.unwrap();
    assert_eq!(auth.call_count(), 1);

    // A second upload inside the expiry window reuses the cached bundle.
    let file = FileHandle::from_bytes("b.bin", patterned(1024));
    engine.upload(&file).await.unwrap();
    assert_eq!(auth.call_count(), 1);
}

#[tokio::test]
async fn concurrent_uploads_share_one_refresh() {
    let remote = MockRemote::new();
    remote.set_part_delay(Duration::from_millis(10));
    let auth = MockAuth::new(Channel::Oss, 3600);
    let store = store(&auth);
    let engine = Arc::new(UploadEngine::new(remote.clone(), store, UploadOptions::new()));

    let mut tasks = Vec::new();
    for i in 0..6 {
        let engine = engine.clone();
        tasks.push(tokio::spawn(async move {
            let file = FileHandle::from_bytes(format!("f{i}.bin"), vec![i as u8; 4096]);
            engine.upload(&file).await
        }));
    }
    for t in tasks {
        t.await.unwrap().unwrap();
    }
    assert_eq!(auth.call_count(), 1);
}

#[tokio::test]
async fn stale_credential_triggers_refresh_on_next_use() {
    let remote = MockRemote::new();
    // 30s TTL is inside the 60s expiry buffer: every bundle is born stale.
    let auth = MockAuth::new(Channel::Oss, 30);
    let store = store(&auth);
    let engine = UploadEngine::new(remote.clone(), store, UploadOptions::new());

    let file = FileHandle::from_bytes("a.bin", patterned(1024));
    engine.upload(&file).await.unwrap();
    let first = auth.call_count();
    assert!(first >= 1);

    let file = FileHandle::from_bytes("b.bin", patterned(1024));
    engine.upload(&file).await.unwrap();
    assert!(auth.call_count() > first, "stale bundle must be refreshed");
}

#[tokio::test]
async fn refresh_failure_surfaces_as_auth_error() {
    let remote = MockRemote::new();
    let auth = MockAuth::new(Channel::Oss, 3600);
    auth.set_failing(true);
    let store = store(&auth);
    let engine = UploadEngine::new(remote.clone(), store, UploadOptions::new());

    let file = FileHandle::from_bytes("a.bin", patterned(1024));
    let err = engine.upload(&file).await.unwrap_err();
    assert!(matches!(err, UploadError::Auth(_)));
    assert_eq!(remote.initiate_calls.load(std::sync::atomic::Ordering::SeqCst), 0);
}

#[tokio::test]
async fn cache_file_round_trips_between_processes() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("upload_credential.json");

    // First "process": refresh writes the cache file.
    {
        let auth = MockAuth::new(Channel::Oss, 3600);
        let store = CredentialStore::new(auth.clone()).with_cache_file(&path);
        store.get_valid().await.unwrap();
        assert_eq!(auth.call_count(), 1);
    }
    assert!(path.exists());

    // Second "process": the unexpired cached bundle is reused, no call.
    {
        let auth = MockAuth::new(Channel::Oss, 3600);
        let store = CredentialStore::new(auth.clone()).with_cache_file(&path);
        store.get_valid().await.unwrap();
        assert_eq!(auth.call_count(), 0);
    }
}

#[tokio::test]
async fn expired_cache_file_is_discarded() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("upload_credential.json");
    let expired = test_credential(Channel::Oss, -10);
    std::fs::write(&path, serde_json::to_vec(&expired).unwrap()).unwrap();

    let auth = MockAuth::new(Channel::Oss, 3600);
    let store = CredentialStore::new(auth.clone()).with_cache_file(&path);
    store.get_valid().await.unwrap();
    assert_eq!(auth.call_count(), 1, "expired cache must force a refresh");
}
