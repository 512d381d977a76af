//! Streaming API client
//!
//! Thin JSON-over-HTTP wrapper around the remote torrent streaming server.
//! The server does all torrent parsing, subtitle extraction and streaming;
//! this client only lists files, starts extraction tasks, polls them and
//! builds playback URLs.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use super::error::ApiError;
use crate::models::{
    parse_file_list, ExtractionKind, ExtractionRequest, FileEntry, KeyStatus, ProbeResult,
    StreamStatus, TaskStatus, TorrentMetadata,
};
use crate::stream::poller::StatusSource;

/// Default streaming server
pub const DEFAULT_API_BASE: &str = "https://rsd.ovh";

/// Header carrying the API key
const API_KEY_HEADER: &str = "X-API-Key";

/// `GET /files` body
#[derive(Debug, Deserialize)]
struct FilesResponse {
    #[serde(rename = "Files", default)]
    files: Option<Vec<Value>>,
}

/// `GET /subtitles/extract` body
#[derive(Debug, Deserialize)]
struct ExtractResponse {
    id: String,
}

/// `GET /user/api-key-status` body
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct KeyStatusResponse {
    #[serde(default)]
    is_master_key: bool,
    #[serde(default)]
    expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    error: Option<String>,
}

/// Reachability of the streaming server
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ApiHealth {
    Online,
    /// Reachable but answered with an error status
    Offline { status: u16 },
    /// No answer at all
    Unreachable { reason: String },
}

impl ApiHealth {
    pub fn is_online(&self) -> bool {
        matches!(self, ApiHealth::Online)
    }
}

/// Client for the streaming API
#[derive(Debug, Clone)]
pub struct StreamApiClient {
    base_url: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl StreamApiClient {
    /// Create a client against the default server
    pub fn new(api_key: Option<String>) -> Self {
        Self::with_base_url(DEFAULT_API_BASE, api_key)
    }

    /// Create a client with a custom base URL (for testing or self-hosting)
    pub fn with_base_url(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            base_url,
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            client: reqwest::Client::new(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref()
    }

    fn require_key(&self) -> Result<&str, ApiError> {
        self.api_key.as_deref().ok_or(ApiError::MissingApiKey)
    }

    /// Authenticated GET returning the raw response after a status check
    async fn get(&self, endpoint: &'static str, path: &str) -> Result<reqwest::Response, ApiError> {
        let key = self.require_key()?;
        let url = format!("{}{}", self.base_url, path);
        debug!(%url, "GET");

        let response = self
            .client
            .get(&url)
            .header(API_KEY_HEADER, key)
            .send()
            .await
            .map_err(|e| ApiError::transport(endpoint, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(endpoint, status = status.as_u16(), "request failed");
            return Err(ApiError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response)
    }

    /// Authenticated GET decoding a JSON body
    async fn get_json<T: DeserializeOwned>(
        &self,
        endpoint: &'static str,
        path: &str,
    ) -> Result<T, ApiError> {
        let text = self
            .get(endpoint, path)
            .await?
            .text()
            .await
            .map_err(|e| ApiError::transport(endpoint, e))?;

        serde_json::from_str(&text).map_err(|e| ApiError::malformed(endpoint, e))
    }

    /// List the files of a torrent
    pub async fn files(&self, magnet: &str) -> Result<Vec<FileEntry>, ApiError> {
        let path = format!("/files?url={}", urlencoding::encode(magnet));
        let body: FilesResponse = self.get_json("files", &path).await?;

        let raw = body.files.unwrap_or_default();
        if raw.is_empty() {
            return Err(ApiError::NoFiles);
        }

        let files = parse_file_list(&raw);
        if files.is_empty() {
            return Err(ApiError::NoFiles);
        }
        Ok(files)
    }

    /// Torrent name and file count
    pub async fn metadata(&self, magnet: &str) -> Result<TorrentMetadata, ApiError> {
        let path = format!("/metadata?url={}", urlencoding::encode(magnet));
        self.get_json("metadata", &path).await
    }

    /// Check a video file for embedded subtitle tracks
    pub async fn probe(&self, magnet: &str, index: u32) -> Result<ProbeResult, ApiError> {
        let path = format!("/probe?url={}&index={}", urlencoding::encode(magnet), index);
        self.get_json("probe", &path).await
    }

    /// Start a server-side extraction task and return its id
    pub async fn start_extraction(
        &self,
        magnet: &str,
        request: ExtractionRequest,
    ) -> Result<String, ApiError> {
        let mut path = format!(
            "/subtitles/extract?url={}&fileIndex={}&isSRTFile={}",
            urlencoding::encode(magnet),
            request.file_index,
            request.is_subtitle_file()
        );
        if let ExtractionKind::Embedded { sub_index } = request.kind {
            path.push_str(&format!("&subIndex={}", sub_index));
        }

        let task: ExtractResponse = self.get_json("subtitles/extract", &path).await?;
        debug!(task_id = %task.id, "extraction started");
        Ok(task.id)
    }

    /// Current state of an extraction task
    pub async fn task_status(&self, task_id: &str) -> Result<TaskStatus, ApiError> {
        let path = format!("/subtitles/status?id={}", urlencoding::encode(task_id));
        self.get_json("subtitles/status", &path).await
    }

    /// Download progress of a streamed file
    pub async fn stream_status(&self, magnet: &str, index: u32) -> Result<StreamStatus, ApiError> {
        let path = format!("/status?url={}&index={}", urlencoding::encode(magnet), index);
        self.get_json("status", &path).await
    }

    /// Probe the server root without credentials
    pub async fn health(&self) -> ApiHealth {
        match self.client.get(&self.base_url).send().await {
            Ok(response) if response.status().is_success() => ApiHealth::Online,
            Ok(response) => ApiHealth::Offline {
                status: response.status().as_u16(),
            },
            Err(e) => ApiHealth::Unreachable {
                reason: e.to_string(),
            },
        }
    }

    /// Validity and expiry of the configured key
    pub async fn api_key_status(&self) -> Result<KeyStatus, ApiError> {
        let key = self.require_key()?;
        let url = format!("{}/user/api-key-status", self.base_url);
        let response = self
            .client
            .get(&url)
            .header(API_KEY_HEADER, key)
            .send()
            .await
            .map_err(|e| ApiError::transport("user/api-key-status", e))?;

        let ok = response.status().is_success();
        let text = response
            .text()
            .await
            .map_err(|e| ApiError::transport("user/api-key-status", e))?;
        let body: KeyStatusResponse = serde_json::from_str(&text)
            .map_err(|e| ApiError::malformed("user/api-key-status", e))?;

        if !ok {
            return Ok(KeyStatus::Invalid {
                reason: body
                    .error
                    .unwrap_or_else(|| "Invalid or Expired API Key".to_string()),
            });
        }

        if body.is_master_key {
            return Ok(KeyStatus::Master);
        }

        match body.expires_at {
            Some(expires) => Ok(key_status_at(expires, Utc::now())),
            None => Err(ApiError::malformed(
                "user/api-key-status",
                "missing expiresAt",
            )),
        }
    }

    /// URL serving the extracted subtitle of a completed task
    pub fn download_url(&self, task_id: &str) -> String {
        format!(
            "{}/subtitles/download?id={}&api_key={}",
            self.base_url,
            urlencoding::encode(task_id),
            urlencoding::encode(self.api_key.as_deref().unwrap_or_default())
        )
    }

    /// URL streaming one file of a torrent
    pub fn stream_url(&self, magnet: &str, index: u32) -> String {
        format!(
            "{}/stream?url={}&index={}&api_key={}",
            self.base_url,
            urlencoding::encode(magnet),
            index,
            urlencoding::encode(self.api_key.as_deref().unwrap_or_default())
        )
    }
}

/// Days-left summary of an expiry date; partial days round up
pub fn key_status_at(expires: DateTime<Utc>, now: DateTime<Utc>) -> KeyStatus {
    const DAY_MS: i64 = 24 * 60 * 60 * 1000;
    let remaining = (expires - now).num_milliseconds();
    let days_left = remaining.div_euclid(DAY_MS) + i64::from(remaining.rem_euclid(DAY_MS) > 0);
    if days_left > 0 {
        KeyStatus::Active { days_left }
    } else {
        KeyStatus::Expired
    }
}

#[async_trait]
impl StatusSource for StreamApiClient {
    async fn task_status(&self, task_id: &str) -> Result<TaskStatus, ApiError> {
        StreamApiClient::task_status(self, task_id).await
    }

    fn download_url(&self, task_id: &str) -> String {
        StreamApiClient::download_url(self, task_id)
    }
}
