//! Saved playback session
//!
//! Remembers the last magnet, the chosen files and any subtitle task still
//! running so that `subcast resume` can pick up where the previous run stopped.
//! Only the task id is kept; its status always comes from the server.
//! Stored at ~/.local/share/subcast/session.json

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Last playback session
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SavedSession {
    pub magnet: String,
    pub video_index: Option<u32>,
    pub video_name: Option<String>,
    pub subtitle_index: Option<u32>,
    /// Extraction task still running when the session was saved
    pub subtitle_task_id: Option<String>,
    /// Download URL of finished subtitles
    pub subtitle_url: Option<String>,
}

impl SavedSession {
    pub fn new(magnet: impl Into<String>) -> Self {
        Self {
            magnet: magnet.into(),
            ..Default::default()
        }
    }

    /// Default session file path
    pub fn default_path() -> Option<PathBuf> {
        dirs::data_dir().map(|p| p.join("subcast").join("session.json"))
    }

    /// Whether there is enough state to resume playback
    pub fn is_resumable(&self) -> bool {
        !self.magnet.is_empty() && self.video_index.is_some()
    }

    /// Load a session, `None` if the file is missing or unreadable
    pub fn load_from(path: &Path) -> Option<Self> {
        let text = std::fs::read_to_string(path).ok()?;
        match serde_json::from_str(&text) {
            Ok(session) => Some(session),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "ignoring corrupt session file");
                None
            }
        }
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write session to {}", path.display()))?;
        Ok(())
    }

    /// Remove a saved session; a missing file is not an error
    pub fn clear(path: &Path) -> Result<()> {
        match std::fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("Failed to remove {}", path.display())),
        }
    }

    /// Record a finished extraction
    pub fn subtitles_ready(&mut self, url: impl Into<String>) {
        self.subtitle_task_id = None;
        self.subtitle_url = Some(url.into());
    }
}
