//! Scripted remote client: in-memory bodies, per-file failure scripts, and
//! byte-accurate resumable writes.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;

use adm_core::client::{
    AudioAttachment, ClientError, GroupDescriptor, ProgressFn, RemoteClient, RemoteFileRef,
    RemoteGroup, RemoteMessage,
};
use adm_core::control::CancelToken;

/// Progress callbacks fire once per this many bytes.
const CHUNK: usize = 256 * 1024;

/// One scripted fault for a file's next download call.
pub enum Fault {
    /// Return this error before writing anything.
    Fail(ClientError),
    /// Write `bytes` of the remaining body, then fail with a transport
    /// error (connection dropped mid-stream).
    DropAfter(u64),
}

#[derive(Default)]
pub struct StubClient {
    group: Option<RemoteGroup>,
    messages: Vec<RemoteMessage>,
    bodies: HashMap<i64, Vec<u8>>,
    faults: Mutex<HashMap<i64, VecDeque<Fault>>>,
    download_calls: AtomicUsize,
    last_start_at: AtomicU64,
}

impl StubClient {
    pub fn new() -> Self {
        Self {
            group: Some(RemoteGroup {
                id: -100500,
                title: "Jazz Archive".to_string(),
                handle: Some("jazz".to_string()),
            }),
            ..Self::default()
        }
    }

    /// Register a file and its bytes, and append a message advertising it.
    pub fn add_audio(&mut self, file_id: i64, title: &str, body: Vec<u8>) {
        let msg_id = self.messages.len() as i64 + 1;
        self.messages.push(RemoteMessage {
            id: msg_id,
            date_unix: 1_700_000_000 + msg_id,
            audio: Some(AudioAttachment {
                file: RemoteFileRef {
                    file_id,
                    reference: format!("files/{file_id}"),
                },
                declared_size: body.len() as u64,
                file_name: Some(format!("{title}.mp3")),
                mime_type: Some("audio/mpeg".to_string()),
                duration_secs: Some(200),
                title: Some(title.to_string()),
                performer: Some("Band".to_string()),
            }),
        });
        self.bodies.insert(file_id, body);
    }

    /// Register bytes without a message (for jobs inserted directly).
    pub fn add_body(&mut self, file_id: i64, body: Vec<u8>) {
        self.bodies.insert(file_id, body);
    }

    /// Queue a fault for the file's next download call.
    pub fn script_fault(&self, file_id: i64, fault: Fault) {
        self.faults
            .lock()
            .unwrap()
            .entry(file_id)
            .or_default()
            .push_back(fault);
    }

    pub fn download_calls(&self) -> usize {
        self.download_calls.load(Ordering::SeqCst)
    }

    pub fn last_start_at(&self) -> u64 {
        self.last_start_at.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RemoteClient for StubClient {
    async fn resolve_group(
        &self,
        _descriptor: &GroupDescriptor,
    ) -> Result<RemoteGroup, ClientError> {
        self.group
            .clone()
            .ok_or_else(|| ClientError::NotFound("no group scripted".to_string()))
    }

    async fn iter_messages(
        &self,
        _group: &RemoteGroup,
        limit: usize,
    ) -> Result<Vec<RemoteMessage>, ClientError> {
        // Newest first, like the real history endpoint.
        let mut msgs = self.messages.clone();
        msgs.reverse();
        msgs.truncate(limit);
        Ok(msgs)
    }

    async fn download_file(
        &self,
        file: &RemoteFileRef,
        dest: &Path,
        start_at: u64,
        progress: ProgressFn,
        cancel: &CancelToken,
    ) -> Result<u64, ClientError> {
        self.download_calls.fetch_add(1, Ordering::SeqCst);
        self.last_start_at.store(start_at, Ordering::SeqCst);

        let fault = self
            .faults
            .lock()
            .unwrap()
            .get_mut(&file.file_id)
            .and_then(VecDeque::pop_front);

        let body = self
            .bodies
            .get(&file.file_id)
            .ok_or_else(|| ClientError::NotFound(format!("file {}", file.file_id)))?;

        let mut stop_after: Option<u64> = None;
        match fault {
            Some(Fault::Fail(e)) => return Err(e),
            Some(Fault::DropAfter(n)) => stop_after = Some(n),
            None => {}
        }

        let mut existing = if start_at > 0 {
            tokio::fs::read(dest).await.unwrap_or_default()
        } else {
            Vec::new()
        };
        existing.truncate(start_at as usize);

        let remaining = &body[start_at as usize..];
        let mut written_this_call = 0u64;
        for chunk in remaining.chunks(CHUNK) {
            if cancel.is_cancelled() {
                tokio::fs::write(dest, &existing).await?;
                return Err(ClientError::Cancelled);
            }
            if let Some(limit) = stop_after {
                if written_this_call >= limit {
                    tokio::fs::write(dest, &existing).await?;
                    return Err(ClientError::Transport("connection dropped".to_string()));
                }
            }
            existing.extend_from_slice(chunk);
            written_this_call += chunk.len() as u64;
            progress(existing.len() as u64);
            tokio::task::yield_now().await;
        }

        tokio::fs::write(dest, &existing).await?;
        Ok(existing.len() as u64)
    }
}
