//! HTTPS transport for the remote client capability.
//!
//! Speaks a bot-gateway style REST surface: `getChat` to resolve a group,
//! `getHistory` for a page of messages, and a file endpoint that honours
//! `Range` for resumable streaming. Flow-control comes back as HTTP 429
//! with `Retry-After`, which maps to [`ClientError::FloodWait`].

use async_trait::async_trait;
use futures_util::StreamExt;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tokio::io::AsyncWriteExt;

use crate::config::AdmConfig;
use crate::control::CancelToken;

use super::{
    AudioAttachment, ClientError, GroupDescriptor, ProgressFn, RemoteClient, RemoteFileRef,
    RemoteGroup, RemoteMessage,
};

const API_BASE: &str = "https://api.telegram.org";
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
/// History endpoint page size; larger limits are fetched in pages.
const PAGE_SIZE: usize = 100;

pub struct HttpRemoteClient {
    http: reqwest::Client,
    base: String,
    token: String,
}

impl HttpRemoteClient {
    /// Build from validated credentials. Fails fast when they are absent.
    pub fn from_config(cfg: &AdmConfig) -> anyhow::Result<Self> {
        cfg.validate_for_download()?;
        let api_id = cfg.api_id.expect("validated");
        let api_hash = cfg.api_hash.as_deref().expect("validated");
        Ok(Self::new(API_BASE, &format!("{api_id}:{api_hash}")))
    }

    pub fn new(base: &str, token: &str) -> Self {
        let http = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .expect("reqwest client with static config");
        Self {
            http,
            base: base.trim_end_matches('/').to_string(),
            token: token.to_string(),
        }
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.base, self.token, method)
    }

    fn file_url(&self, reference: &str) -> String {
        format!("{}/file/bot{}/{}", self.base, self.token, reference)
    }
}

/// Inspect a response's status and turn throttling/server errors into
/// typed client errors.
fn check_status(resp: &reqwest::Response) -> Result<(), ClientError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(());
    }
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        let seconds = resp
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(30);
        return Err(ClientError::FloodWait { seconds });
    }
    if status == reqwest::StatusCode::NOT_FOUND {
        return Err(ClientError::NotFound(format!("HTTP 404: {}", resp.url())));
    }
    Err(ClientError::Transport(format!("HTTP {status}")))
}

fn transport(e: reqwest::Error) -> ClientError {
    ClientError::Transport(e.to_string())
}

// Wire shapes. The gateway wraps every payload in `{ ok, result }`.

#[derive(Deserialize)]
struct Envelope<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

#[derive(Deserialize)]
struct WireChat {
    id: i64,
    title: Option<String>,
    username: Option<String>,
}

#[derive(Deserialize)]
struct WireAudio {
    file_id: i64,
    file_reference: String,
    file_size: u64,
    file_name: Option<String>,
    mime_type: Option<String>,
    duration: Option<i64>,
    title: Option<String>,
    performer: Option<String>,
}

#[derive(Deserialize)]
struct WireMessage {
    message_id: i64,
    date: i64,
    audio: Option<WireAudio>,
}

fn unwrap_envelope<T>(env: Envelope<T>) -> Result<T, ClientError> {
    if !env.ok {
        return Err(ClientError::Transport(
            env.description.unwrap_or_else(|| "gateway error".to_string()),
        ));
    }
    env.result
        .ok_or_else(|| ClientError::Transport("gateway returned empty result".to_string()))
}

impl From<WireMessage> for RemoteMessage {
    fn from(m: WireMessage) -> Self {
        RemoteMessage {
            id: m.message_id,
            date_unix: m.date,
            audio: m.audio.map(|a| AudioAttachment {
                file: RemoteFileRef {
                    file_id: a.file_id,
                    reference: a.file_reference,
                },
                declared_size: a.file_size,
                file_name: a.file_name,
                mime_type: a.mime_type,
                duration_secs: a.duration,
                title: a.title,
                performer: a.performer,
            }),
        }
    }
}

#[async_trait]
impl RemoteClient for HttpRemoteClient {
    async fn resolve_group(
        &self,
        descriptor: &GroupDescriptor,
    ) -> Result<RemoteGroup, ClientError> {
        let chat_id = match descriptor {
            GroupDescriptor::Id(id) => id.to_string(),
            GroupDescriptor::Handle(h) => format!("@{h}"),
        };
        let resp = self
            .http
            .get(self.method_url("getChat"))
            .query(&[("chat_id", chat_id.as_str())])
            .send()
            .await
            .map_err(transport)?;
        check_status(&resp)?;
        let env: Envelope<WireChat> = resp.json().await.map_err(transport)?;
        let chat = unwrap_envelope(env)?;
        Ok(RemoteGroup {
            id: chat.id,
            title: chat.title.unwrap_or_else(|| chat_id.clone()),
            handle: chat.username,
        })
    }

    async fn iter_messages(
        &self,
        group: &RemoteGroup,
        limit: usize,
    ) -> Result<Vec<RemoteMessage>, ClientError> {
        let mut out: Vec<RemoteMessage> = Vec::new();
        let mut offset_id = 0i64;
        while out.len() < limit {
            let page = (limit - out.len()).min(PAGE_SIZE);
            let resp = self
                .http
                .get(self.method_url("getHistory"))
                .query(&[
                    ("chat_id", group.id.to_string()),
                    ("limit", page.to_string()),
                    ("offset_id", offset_id.to_string()),
                ])
                .send()
                .await
                .map_err(transport)?;
            check_status(&resp)?;
            let env: Envelope<Vec<WireMessage>> = resp.json().await.map_err(transport)?;
            let batch = unwrap_envelope(env)?;
            if batch.is_empty() {
                break;
            }
            offset_id = batch.last().map(|m| m.message_id).unwrap_or(offset_id);
            out.extend(batch.into_iter().map(RemoteMessage::from));
        }
        out.truncate(limit);
        Ok(out)
    }

    async fn download_file(
        &self,
        file: &RemoteFileRef,
        dest: &Path,
        start_at: u64,
        progress: ProgressFn,
        cancel: &CancelToken,
    ) -> Result<u64, ClientError> {
        let mut req = self.http.get(self.file_url(&file.reference));
        if start_at > 0 {
            req = req.header(reqwest::header::RANGE, format!("bytes={start_at}-"));
        }
        let resp = req.send().await.map_err(transport)?;
        check_status(&resp)?;

        // A server that ignores the Range header restarts the body; in
        // that case truncate and write from zero.
        let ranged = start_at > 0 && resp.status() == reqwest::StatusCode::PARTIAL_CONTENT;
        let mut out = if ranged {
            tokio::fs::OpenOptions::new()
                .append(true)
                .open(dest)
                .await?
        } else {
            tokio::fs::File::create(dest).await?
        };
        let mut written = if ranged { start_at } else { 0 };

        let mut stream = resp.bytes_stream();
        while let Some(chunk) = stream.next().await {
            if cancel.is_cancelled() {
                out.flush().await?;
                return Err(ClientError::Cancelled);
            }
            let chunk = chunk.map_err(transport)?;
            out.write_all(&chunk).await?;
            written += chunk.len() as u64;
            progress(written);
        }
        out.flush().await?;
        out.sync_all().await?;
        Ok(written)
    }
}
