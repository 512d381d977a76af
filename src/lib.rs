//! subcast - stream magnet links with auto-matched subtitles
//!
//! # Modules
//!
//! - `models` - File listings, extraction tasks, playback plans
//! - `api` - Client for the remote streaming server
//! - `stream` - Subtitle matching, extraction polling, playback preparation, players
//! - `config` - User configuration
//! - `state` - Saved session for `resume`
//! - `cache` - Short-lived torrent listing cache
//! - `cli` / `commands` - Command line surface

pub mod api;
pub mod cache;
pub mod cli;
pub mod commands;
pub mod config;
pub mod models;
pub mod state;
pub mod stream;

// Re-export commonly used types
pub use models::{
    ExtractionRequest, FileEntry, KeyStatus, PlaybackPlan, ProbeResult, StreamStatus,
    SubtitleSource, TaskState, TaskStatus, TorrentMetadata,
};

pub use api::{ApiError, StreamApiClient};
pub use config::Config;
pub use stream::{ExtractionPoller, PlaybackPreparer, PollEvent, PollOutcome};
