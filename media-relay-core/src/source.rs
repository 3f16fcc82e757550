//! Source adapters: where candidate posts come from.
//!
//! A run is configured with exactly one [`SourceAction`]. Instagram profiles
//! and YouTube channels are both listed through `yt-dlp` ([`YtDlpSource`]);
//! Telegram channels go through the Bot API ([`TelegramSource`]), whose
//! file handles are fetched by [`TelegramFileDownloader`].

use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::contract::{CandidateItem, MediaDownloader, SourceAdapter};
use crate::download::{HttpDownloader, YtDlpOptions};
use crate::error::{FetchError, SourceError};

/// Selects the platform to relay from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SourceAction {
    Instagram(InstagramSource),
    Youtube(YoutubeSource),
    Telegram(TelegramChannel),
}

impl SourceAction {
    pub fn trace_loaded(&self) {
        match self {
            SourceAction::Instagram(s) => {
                info!(profile_url = %s.profile_url, "Loaded Instagram source")
            }
            SourceAction::Youtube(s) => {
                info!(channel_url = %s.channel_url, "Loaded YouTube source")
            }
            SourceAction::Telegram(t) => info!(chat = %t.chat, "Loaded Telegram source"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstagramSource {
    pub profile_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct YoutubeSource {
    pub channel_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TelegramChannel {
    /// Numeric chat id (`-100...`) or public `@username`.
    pub chat: String,
    #[serde(default)]
    pub api_base: Option<String>,
}

/// Lists a profile, channel or playlist URL with `yt-dlp -j --flat-playlist`.
#[derive(Debug, Clone)]
pub struct YtDlpSource {
    url: String,
    options: YtDlpOptions,
}

impl YtDlpSource {
    pub fn new(url: impl Into<String>, options: YtDlpOptions) -> Self {
        Self {
            url: url.into(),
            options,
        }
    }
}

#[async_trait]
impl SourceAdapter for YtDlpSource {
    async fn list_candidates(&self, limit: usize) -> Result<Vec<CandidateItem>, SourceError> {
        info!(url = %self.url, limit, "[SOURCE] Listing with yt-dlp");
        let output = Command::new(&self.options.program)
            .arg("-j")
            .arg("--flat-playlist")
            .arg("--playlist-end")
            .arg(limit.to_string())
            .arg(&self.url)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| SourceError::Spawn {
                program: self.options.program.clone(),
                source: e,
            })?;

        if !output.status.success() {
            return Err(SourceError::Tool {
                program: self.options.program.clone(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let mut items = parse_listing(&String::from_utf8_lossy(&output.stdout));
        items.truncate(limit);
        info!(count = items.len(), "[SOURCE] yt-dlp listing complete");
        Ok(items)
    }
}

#[derive(Debug, Deserialize)]
struct YtDlpEntry {
    id: Option<String>,
    url: Option<String>,
    webpage_url: Option<String>,
    title: Option<String>,
    description: Option<String>,
    timestamp: Option<i64>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}

/// Parse `yt-dlp -j` output: one JSON object per line, feed order preserved.
///
/// Lines that are not JSON, or lack an id or locator, are skipped with a
/// warning.
pub fn parse_listing(stdout: &str) -> Vec<CandidateItem> {
    let mut items = Vec::new();
    for (index, line) in stdout.lines().enumerate() {
        let line_no = index + 1;
        if line.trim().is_empty() {
            continue;
        }
        let entry: YtDlpEntry = match serde_json::from_str(line) {
            Ok(entry) => entry,
            Err(e) => {
                warn!(line = line_no, error = %e, "[SOURCE] Skipping unparseable yt-dlp line");
                continue;
            }
        };
        let Some(id) = non_empty(entry.id) else {
            warn!(line = line_no, "[SOURCE] Skipping yt-dlp entry without id");
            continue;
        };
        let Some(locator) = non_empty(entry.url).or(non_empty(entry.webpage_url)) else {
            warn!(line = line_no, item_id = %id, "[SOURCE] Skipping yt-dlp entry without url");
            continue;
        };
        let caption = non_empty(entry.description)
            .or(non_empty(entry.title))
            .unwrap_or_default();

        items.push(CandidateItem {
            id,
            media_locator: locator,
            caption,
            published_at: entry
                .timestamp
                .and_then(|ts| DateTime::<Utc>::from_timestamp(ts, 0)),
        });
    }
    items
}

pub const TELEGRAM_API_BASE: &str = "https://api.telegram.org";

/// Prefix of the opaque locators emitted by [`TelegramSource`]. Resolved to a
/// download URL by [`TelegramFileDownloader`] only when the item is fetched.
pub const TELEGRAM_FILE_SCHEME: &str = "tg-file:";

/// Authenticated handle to the Telegram Bot API, shared by the listing
/// source and the file downloader.
#[derive(Clone)]
pub struct BotApi {
    client: reqwest::Client,
    api_base: String,
    token: String,
}

impl std::fmt::Debug for BotApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BotApi")
            .field("api_base", &self.api_base)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Deserialize)]
struct BotReply<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Update {
    channel_post: Option<ChannelPost>,
}

#[derive(Debug, Deserialize)]
struct ChannelPost {
    message_id: i64,
    chat: Chat,
    date: i64,
    caption: Option<String>,
    video: Option<Video>,
}

#[derive(Debug, Deserialize)]
struct Chat {
    id: i64,
    username: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Video {
    file_id: String,
}

#[derive(Debug, Deserialize)]
struct TelegramFile {
    file_path: Option<String>,
}

impl BotApi {
    pub fn new(client: reqwest::Client, api_base: Option<&str>, token: impl Into<String>) -> Self {
        Self {
            client,
            api_base: api_base
                .unwrap_or(TELEGRAM_API_BASE)
                .trim_end_matches('/')
                .to_string(),
            token: token.into(),
        }
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        query: &[(&str, &str)],
    ) -> Result<T, SourceError> {
        let url = format!("{}/bot{}/{}", self.api_base, self.token, method);
        let response = self
            .client
            .get(&url)
            .query(query)
            .send()
            .await
            .map_err(|e| SourceError::Transport(e.without_url().to_string()))?;

        let status = response.status();
        let reply: BotReply<T> = match response.json().await {
            Ok(reply) => reply,
            Err(_) if !status.is_success() => {
                return Err(SourceError::Status {
                    status: status.as_u16(),
                })
            }
            Err(e) => return Err(SourceError::Decode(e.without_url().to_string())),
        };

        if !reply.ok {
            return Err(SourceError::Api(
                reply
                    .description
                    .unwrap_or_else(|| format!("{method} failed with HTTP {status}")),
            ));
        }
        reply
            .result
            .ok_or_else(|| SourceError::Decode(format!("{method} reply without result")))
    }

    /// Direct download URL for a file id. Embeds the bot token; never log it.
    async fn file_url(&self, file_id: &str) -> Result<String, SourceError> {
        let file: TelegramFile = self.call("getFile", &[("file_id", file_id)]).await?;
        let path = file
            .file_path
            .ok_or_else(|| SourceError::Decode("getFile reply without file_path".into()))?;
        Ok(format!("{}/file/bot{}/{}", self.api_base, self.token, path))
    }
}

/// Reads channel posts through the Telegram Bot API.
///
/// The bot must be an administrator of the channel. Listing only calls
/// `getUpdates`; each video's locator is a `tg-file:` handle, so a file the
/// Bot API refuses to serve fails that item alone at fetch time.
#[derive(Debug, Clone)]
pub struct TelegramSource {
    api: BotApi,
    chat: String,
}

impl TelegramSource {
    pub fn new(client: reqwest::Client, channel: &TelegramChannel, token: impl Into<String>) -> Self {
        Self {
            api: BotApi::new(client, channel.api_base.as_deref(), token),
            chat: channel.chat.clone(),
        }
    }

    /// Downloader for the locators this source emits, sharing its client.
    pub fn downloader(&self) -> TelegramFileDownloader {
        TelegramFileDownloader::new(self.api.clone())
    }

    fn matches_chat(&self, chat: &Chat) -> bool {
        if self.chat == chat.id.to_string() {
            return true;
        }
        match (self.chat.strip_prefix('@'), chat.username.as_deref()) {
            (Some(wanted), Some(actual)) => wanted.eq_ignore_ascii_case(actual),
            _ => false,
        }
    }
}

#[async_trait]
impl SourceAdapter for TelegramSource {
    async fn list_candidates(&self, limit: usize) -> Result<Vec<CandidateItem>, SourceError> {
        info!(chat = %self.chat, limit, "[SOURCE] Listing Telegram channel posts");
        let updates: Vec<Update> = self
            .api
            .call("getUpdates", &[("allowed_updates", r#"["channel_post"]"#)])
            .await?;

        // getUpdates is oldest first
        let items: Vec<CandidateItem> = updates
            .into_iter()
            .rev()
            .filter_map(|u| u.channel_post)
            .filter(|p| self.matches_chat(&p.chat))
            .filter_map(|p| {
                let video = p.video?;
                let id = format!("{}_{}", p.chat.id, p.message_id);
                debug!(item_id = %id, "[SOURCE] Found Telegram video");
                Some(CandidateItem {
                    id,
                    media_locator: format!("{TELEGRAM_FILE_SCHEME}{}", video.file_id),
                    caption: p.caption.unwrap_or_default(),
                    published_at: DateTime::<Utc>::from_timestamp(p.date, 0),
                })
            })
            .take(limit)
            .collect();

        info!(count = items.len(), "[SOURCE] Telegram listing complete");
        Ok(items)
    }
}

/// Resolves `tg-file:` locators with `getFile`, then streams the file over HTTP.
#[derive(Debug, Clone)]
pub struct TelegramFileDownloader {
    api: BotApi,
    http: HttpDownloader,
}

impl TelegramFileDownloader {
    pub fn new(api: BotApi) -> Self {
        let http = HttpDownloader::new(api.client.clone());
        Self { api, http }
    }
}

fn resolve_error(e: SourceError) -> FetchError {
    match e {
        SourceError::Transport(msg) => FetchError::Transport(msg),
        SourceError::Status { status } => FetchError::Status { status },
        other => FetchError::Resolve(other.to_string()),
    }
}

#[async_trait]
impl MediaDownloader for TelegramFileDownloader {
    async fn download(&self, locator: &str, destination: &Path) -> Result<u64, FetchError> {
        let file_id = locator
            .strip_prefix(TELEGRAM_FILE_SCHEME)
            .ok_or_else(|| FetchError::Resolve(format!("not a Telegram file handle: {locator}")))?;
        let url = self.api.file_url(file_id).await.map_err(resolve_error)?;
        self.http.download(&url, destination).await
    }
}
