//! Shared fixtures for the end-to-end suite.

pub mod stub_client;

use std::path::Path;
use std::sync::Arc;

use adm_core::config::AdmConfig;
use adm_core::engine::DownloaderCtx;
use adm_core::store::{JobDefaults, JobRecord, JobStore};

use stub_client::StubClient;

/// Deterministic pseudo-random body for a file id.
pub fn body_for(file_id: i64, size: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(size);
    let mut x = file_id as u64 ^ 0x9E37_79B9_7F4A_7C15;
    while out.len() < size {
        x = x.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        out.extend_from_slice(&x.to_le_bytes());
    }
    out.truncate(size);
    out
}

pub fn md5_hex(data: &[u8]) -> String {
    use md5::{Digest, Md5};
    let mut h = Md5::new();
    h.update(data);
    hex::encode(h.finalize())
}

/// File-backed store plus a context wired to the stub client.
pub async fn ctx_with(
    client: Arc<StubClient>,
    library_root: &Path,
    state_dir: &Path,
) -> (Arc<DownloaderCtx>, JobStore) {
    let store = JobStore::open(&state_dir.join("jobs.db")).await.unwrap();
    let cfg = AdmConfig::default();
    let ctx = Arc::new(DownloaderCtx::new(
        &cfg,
        store.clone(),
        client,
        library_root.to_path_buf(),
    ));
    (ctx, store)
}

pub async fn insert_job(
    store: &JobStore,
    file_id: i64,
    declared_size: u64,
    target_name: &str,
) -> JobRecord {
    let group = store.upsert_group(-100500, "Jazz Archive", Some("jazz")).await.unwrap();
    let (job, _) = store
        .get_or_create_job(&JobDefaults {
            remote_file_id: file_id,
            file_reference: format!("files/{file_id}"),
            declared_size: declared_size as i64,
            mime_type: Some("audio/mpeg".to_string()),
            duration_secs: Some(200),
            title: Some(format!("Track {file_id}")),
            performer: Some("Band".to_string()),
            target_name: target_name.to_string(),
            group_ref: group.id,
        })
        .await
        .unwrap();
    job
}
