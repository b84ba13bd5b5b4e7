//! Remote chat-platform client capability.
//!
//! The engine is independent of the wire protocol: it sees groups, messages,
//! and audio attachments as plain records, and drives downloads through the
//! [`RemoteClient`] trait. Production uses the HTTPS transport in
//! [`http`]; tests supply scripted stubs.

pub mod http;

use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;

use crate::control::CancelToken;

/// How the user names a group on the command line: a numeric id, an
/// `@handle`, or an `https://t.me/<handle>` link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupDescriptor {
    Id(i64),
    Handle(String),
}

impl GroupDescriptor {
    /// Parse a descriptor. Numeric strings become ids; `@name` and t.me
    /// links become handles; anything else is taken as a bare handle.
    pub fn parse(raw: &str) -> Result<Self, ClientError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(ClientError::InvalidDescriptor(raw.to_string()));
        }
        if let Ok(id) = raw.parse::<i64>() {
            return Ok(GroupDescriptor::Id(id));
        }
        if let Some(handle) = raw.strip_prefix('@') {
            if handle.is_empty() {
                return Err(ClientError::InvalidDescriptor(raw.to_string()));
            }
            return Ok(GroupDescriptor::Handle(handle.to_string()));
        }
        if raw.starts_with("http://") || raw.starts_with("https://") {
            let parsed = url::Url::parse(raw)
                .map_err(|_| ClientError::InvalidDescriptor(raw.to_string()))?;
            let handle = parsed
                .path_segments()
                .and_then(|mut segs| segs.next())
                .filter(|s| !s.is_empty())
                .ok_or_else(|| ClientError::InvalidDescriptor(raw.to_string()))?;
            return Ok(GroupDescriptor::Handle(handle.to_string()));
        }
        Ok(GroupDescriptor::Handle(raw.to_string()))
    }
}

/// A resolved group/channel.
#[derive(Debug, Clone)]
pub struct RemoteGroup {
    pub id: i64,
    pub title: String,
    pub handle: Option<String>,
}

/// Opaque handle needed to request a file's bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFileRef {
    /// Stable identifier, unique across all files we ever see.
    pub file_id: i64,
    /// Server-issued reference string passed back on download.
    pub reference: String,
}

/// Audio attachment metadata lifted off a message.
#[derive(Debug, Clone)]
pub struct AudioAttachment {
    pub file: RemoteFileRef,
    pub declared_size: u64,
    pub file_name: Option<String>,
    pub mime_type: Option<String>,
    pub duration_secs: Option<i64>,
    pub title: Option<String>,
    pub performer: Option<String>,
}

/// One message from a group's history. Non-audio messages carry `None`.
#[derive(Debug, Clone)]
pub struct RemoteMessage {
    pub id: i64,
    pub date_unix: i64,
    pub audio: Option<AudioAttachment>,
}

/// Progress callback: cumulative bytes written so far, delivered in
/// monotonically increasing order within one download call.
pub type ProgressFn = Arc<dyn Fn(u64) + Send + Sync>;

/// Errors the remote client may raise. The engine branches on these, so
/// they are typed rather than stringly anyhow errors.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Server-side flow control: retry after the suggested wait.
    #[error("flood wait: retry after {seconds}s")]
    FloodWait { seconds: u64 },

    /// Network or RPC failure; retryable with backoff.
    #[error("transport: {0}")]
    Transport(String),

    /// Group or file does not exist (or we lack access). Not retryable.
    #[error("not found: {0}")]
    NotFound(String),

    /// The caller's cancel token fired mid-transfer.
    #[error("download cancelled")]
    Cancelled,

    /// Local file I/O failed while writing the destination.
    #[error("filesystem: {0}")]
    Filesystem(#[from] std::io::Error),

    /// The group descriptor could not be understood.
    #[error("invalid group descriptor: {0}")]
    InvalidDescriptor(String),
}

/// Operations the core invokes on the remote service.
#[async_trait]
pub trait RemoteClient: Send + Sync {
    /// Resolve a user-supplied descriptor to a concrete group.
    async fn resolve_group(&self, descriptor: &GroupDescriptor)
        -> Result<RemoteGroup, ClientError>;

    /// Fetch up to `limit` messages, newest first.
    async fn iter_messages(
        &self,
        group: &RemoteGroup,
        limit: usize,
    ) -> Result<Vec<RemoteMessage>, ClientError>;

    /// Stream a file's bytes into `dest`, starting at byte `start_at`
    /// (appending to an existing partial file). Returns the total size of
    /// `dest` on success. `progress` receives cumulative byte counts; the
    /// cancel token is checked between chunks.
    async fn download_file(
        &self,
        file: &RemoteFileRef,
        dest: &Path,
        start_at: u64,
        progress: ProgressFn,
        cancel: &CancelToken,
    ) -> Result<u64, ClientError>;
}
