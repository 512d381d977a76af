//! Data structures shared across subcast
//!
//! Organized by domain:
//! - **Files**: torrent file listings returned by the streaming API
//! - **Extraction**: subtitle extraction requests and task status
//! - **Stream**: download progress and API key status
//! - **Playback**: the final stream + subtitle plan handed to a player

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

// =============================================================================
// File Models
// =============================================================================

/// One file inside a torrent, as reported by `GET /files`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    /// Path or display name
    pub name: String,
    /// Size in bytes (0 when the server omits it)
    pub size: u64,
    /// Opaque handle used in later API calls. Never recomputed locally.
    pub index: u32,
}

impl FileEntry {
    pub fn new(name: impl Into<String>, size: u64, index: u32) -> Self {
        Self {
            name: name.into(),
            size,
            index,
        }
    }

    /// Build an entry from one element of the wire `Files` array.
    ///
    /// The name comes from `path`, falling back to `Name`; the handle from
    /// `originalIndex`, falling back to `index`. Entries without a non-empty name
    /// or without a handle yield `None` so the caller can skip them.
    pub fn from_wire(value: &Value) -> Option<Self> {
        let name = ["path", "Name", "name"]
            .iter()
            .find_map(|key| {
                value
                    .get(*key)
                    .and_then(Value::as_str)
                    .filter(|s| !s.is_empty())
            })?;

        let index = ["originalIndex", "index"]
            .iter()
            .find_map(|key| value.get(*key).and_then(Value::as_u64))
            .and_then(|i| u32::try_from(i).ok())?;

        let size = ["size", "Size", "length"]
            .iter()
            .find_map(|key| value.get(*key))
            .and_then(|v| v.as_u64().or_else(|| v.as_f64().map(|f| f.max(0.0) as u64)))
            .unwrap_or(0);

        Some(Self::new(name, size, index))
    }

    /// Lower-cased final extension without the dot (`"mkv"`), empty if none
    pub fn extension(&self) -> String {
        match self.name.rfind('.') {
            Some(idx) => self.name[idx + 1..].to_lowercase(),
            None => String::new(),
        }
    }
}

impl fmt::Display for FileEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {} ({})", self.index, self.name, format_size(self.size))
    }
}

/// Parse the `Files` array of a `GET /files` body, skipping unusable entries
pub fn parse_file_list(files: &[Value]) -> Vec<FileEntry> {
    files
        .iter()
        .filter_map(|v| {
            let entry = FileEntry::from_wire(v);
            if entry.is_none() {
                tracing::debug!(entry = %v, "skipping file entry without name or index");
            }
            entry
        })
        .collect()
}

/// Torrent summary from `GET /metadata`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TorrentMetadata {
    pub name: String,
    #[serde(default)]
    pub file_count: u64,
}

impl fmt::Display for TorrentMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} files)", self.name, self.file_count)
    }
}

/// Embedded-subtitle probe result from `GET /probe`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbeResult {
    #[serde(default)]
    pub has_subtitles: bool,
    #[serde(default)]
    pub subtitle_tracks: Option<u32>,
}

// =============================================================================
// Extraction Models
// =============================================================================

/// What the server should extract subtitles from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExtractionKind {
    /// A standalone subtitle file inside the torrent
    SubtitleFile,
    /// An embedded track of a video container
    Embedded { sub_index: u32 },
}

/// Parameters for `GET /subtitles/extract`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionRequest {
    pub file_index: u32,
    pub kind: ExtractionKind,
}

impl ExtractionRequest {
    /// Extract a standalone subtitle file
    pub fn subtitle_file(file_index: u32) -> Self {
        Self {
            file_index,
            kind: ExtractionKind::SubtitleFile,
        }
    }

    /// Extract an embedded track from a video file
    pub fn embedded(file_index: u32, sub_index: u32) -> Self {
        Self {
            file_index,
            kind: ExtractionKind::Embedded { sub_index },
        }
    }

    pub fn is_subtitle_file(&self) -> bool {
        matches!(self.kind, ExtractionKind::SubtitleFile)
    }
}

/// Server-side task state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    Extracting,
    Complete,
    Error,
    /// Any status string this client does not know about
    #[serde(other)]
    Unknown,
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskState::Extracting => write!(f, "extracting"),
            TaskState::Complete => write!(f, "complete"),
            TaskState::Error => write!(f, "error"),
            TaskState::Unknown => write!(f, "unknown"),
        }
    }
}

/// Body of `GET /subtitles/status`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskStatus {
    pub status: TaskState,
    /// 0-100, meaningful only while extracting
    #[serde(default)]
    pub progress: Option<f64>,
    /// Present only when `status == error`
    #[serde(default)]
    pub error: Option<String>,
}

// =============================================================================
// Stream Models
// =============================================================================

/// Download progress of a streamed file from `GET /status`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamStatus {
    pub percentage_completed: f64,
    #[serde(default)]
    pub download_speed_bps: Option<f64>,
    #[serde(default)]
    pub download_speed_human: Option<String>,
}

impl StreamStatus {
    pub fn is_complete(&self) -> bool {
        self.percentage_completed >= 100.0
    }

    pub fn is_downloading(&self) -> bool {
        self.download_speed_bps.map(|s| s > 0.0).unwrap_or(false)
    }
}

impl fmt::Display for StreamStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_complete() {
            write!(f, "Stream ready")
        } else if self.is_downloading() {
            write!(
                f,
                "Downloading: {:.1}% at {}",
                self.percentage_completed,
                self.download_speed_human.as_deref().unwrap_or("?")
            )
        } else {
            write!(f, "Waiting for peers: {:.1}%", self.percentage_completed)
        }
    }
}

/// Summarised state of the configured API key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum KeyStatus {
    /// Master key, never expires
    Master,
    /// Valid for this many more days
    Active { days_left: i64 },
    Expired,
    /// Rejected by the server
    Invalid { reason: String },
}

impl fmt::Display for KeyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyStatus::Master => write!(f, "Master key is active (does not expire)"),
            KeyStatus::Active { days_left } => write!(f, "Key expires in {} day(s)", days_left),
            KeyStatus::Expired => write!(f, "Key has expired"),
            KeyStatus::Invalid { reason } => write!(f, "Invalid key: {}", reason),
        }
    }
}

// =============================================================================
// Playback Models
// =============================================================================

/// Where the subtitle track of a playback plan came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum SubtitleSource {
    /// Standalone file with the same base name as the video
    ExactMatch { file: FileEntry },
    /// Best English-scored standalone file
    Scored { file: FileEntry },
    /// Track embedded in the video container
    Embedded { sub_index: u32 },
    /// Restored from a saved session
    Saved,
    /// Nothing usable was found
    None,
}

/// Everything a player needs to start playback
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaybackPlan {
    pub video: FileEntry,
    pub stream_url: String,
    pub subtitle_url: Option<String>,
    pub subtitle_source: SubtitleSource,
}

/// Human-readable byte size (1024-based)
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.1} {}", size, UNITS[unit])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_wire_prefers_path() {
        let v = json!({"path": "dir/movie.mkv", "Name": "movie.mkv", "size": 10, "originalIndex": 3});
        let entry = FileEntry::from_wire(&v).unwrap();
        assert_eq!(entry.name, "dir/movie.mkv");
        assert_eq!(entry.index, 3);
        assert_eq!(entry.size, 10);
    }

    #[test]
    fn test_from_wire_empty_path_falls_back_to_name() {
        let v = json!({"path": "", "Name": "movie.mkv", "originalIndex": 0});
        assert_eq!(FileEntry::from_wire(&v).unwrap().name, "movie.mkv");
        assert!(FileEntry::from_wire(&json!({"path": "", "originalIndex": 0})).is_none());
    }

    #[test]
    fn test_from_wire_skips_non_string_name() {
        assert!(FileEntry::from_wire(&json!({"Name": 42, "originalIndex": 0})).is_none());
        assert!(FileEntry::from_wire(&json!({"originalIndex": 0})).is_none());
    }

    #[test]
    fn test_from_wire_requires_index() {
        assert!(FileEntry::from_wire(&json!({"Name": "a.srt"})).is_none());
        let e = FileEntry::from_wire(&json!({"Name": "a.srt", "index": 7})).unwrap();
        assert_eq!(e.index, 7);
        assert_eq!(e.size, 0);
    }

    #[test]
    fn test_parse_file_list_keeps_order() {
        let files = vec![
            json!({"Name": "b.mkv", "size": 1, "originalIndex": 5}),
            json!({"Name": null, "originalIndex": 6}),
            json!({"Name": "a.srt", "size": 2, "originalIndex": 1}),
        ];
        let parsed = parse_file_list(&files);
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].index, 5);
        assert_eq!(parsed[1].index, 1);
    }

    #[test]
    fn test_extension() {
        assert_eq!(FileEntry::new("Movie.MKV", 0, 0).extension(), "mkv");
        assert_eq!(FileEntry::new("README", 0, 0).extension(), "");
    }

    #[test]
    fn test_task_status_unknown_state() {
        let s: TaskStatus = serde_json::from_str(r#"{"status":"queued"}"#).unwrap();
        assert_eq!(s.status, TaskState::Unknown);
    }

    #[test]
    fn test_stream_status_display() {
        let s = StreamStatus {
            percentage_completed: 12.34,
            download_speed_bps: Some(1000.0),
            download_speed_human: Some("1 KB/s".into()),
        };
        assert_eq!(s.to_string(), "Downloading: 12.3% at 1 KB/s");

        let waiting = StreamStatus {
            percentage_completed: 0.0,
            download_speed_bps: None,
            download_speed_human: None,
        };
        assert_eq!(waiting.to_string(), "Waiting for peers: 0.0%");
    }

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(1536), "1.5 KB");
        assert_eq!(format_size(3 * 1024 * 1024 * 1024), "3.0 GB");
    }
}
