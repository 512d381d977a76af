//! VLC / mpv launch
//!
//! The stream and the extracted subtitle track are both remote URLs, so the
//! player is handed URLs only and never touches the local filesystem.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use thiserror::Error;
use tokio::process::{Child, Command};
use tracing::{debug, info};

use crate::models::PlaybackPlan;

#[cfg(target_os = "macos")]
const VLC_APP_BUNDLE: &str = "/Applications/VLC.app/Contents/MacOS/VLC";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlayerType {
    #[default]
    Vlc,
    Mpv,
}

impl PlayerType {
    /// Config / CLI spelling
    pub fn name(&self) -> &'static str {
        match self {
            PlayerType::Vlc => "vlc",
            PlayerType::Mpv => "mpv",
        }
    }

    /// Case-insensitive inverse of [`PlayerType::name`]
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "vlc" => Some(PlayerType::Vlc),
            "mpv" => Some(PlayerType::Mpv),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            PlayerType::Vlc => "VLC",
            PlayerType::Mpv => "mpv",
        }
    }

    /// Arguments for a stream URL, an optional subtitle URL and a window title
    pub fn args(&self, stream_url: &str, subtitle_url: Option<&str>, title: Option<&str>) -> Vec<String> {
        let (sub_flag, title_flag, trailing) = match self {
            // --sub-file only takes local paths; remote tracks go through input-slave
            PlayerType::Vlc => ("--input-slave", "--meta-title", "--no-video-title-show"),
            PlayerType::Mpv => ("--sub-file", "--force-media-title", "--force-window=immediate"),
        };

        let mut args = vec![stream_url.to_string()];
        args.extend(subtitle_url.map(|url| format!("{}={}", sub_flag, url)));
        args.extend(title.map(|t| format!("{}={}", title_flag, t)));
        args.push(trailing.to_string());
        args
    }
}

impl std::fmt::Display for PlayerType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("{0} is not installed")]
    NotInstalled(PlayerType),

    #[error("Could not start {player}: {source}")]
    Spawn {
        player: PlayerType,
        #[source]
        source: std::io::Error,
    },
}

/// First executable named `binary` on a PATH-style search list
fn search_path(binary: &str, path_var: &std::ffi::OsStr) -> Option<PathBuf> {
    std::env::split_paths(path_var)
        .map(|dir| dir.join(binary))
        .find(|candidate| is_executable(candidate))
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file() || path.with_extension("exe").is_file()
}

/// A player whose binary has been found
#[derive(Debug, Clone)]
pub struct PlayerLauncher {
    player: PlayerType,
    program: PathBuf,
}

impl PlayerLauncher {
    /// Find the binary for `player` on PATH (or in the macOS app bundle)
    pub fn locate(player: PlayerType) -> Result<Self, LaunchError> {
        #[cfg(target_os = "macos")]
        if player == PlayerType::Vlc && Path::new(VLC_APP_BUNDLE).exists() {
            return Ok(Self::with_program(player, VLC_APP_BUNDLE));
        }

        let path_var = std::env::var_os("PATH").unwrap_or_default();
        search_path(player.name(), &path_var)
            .map(|program| Self::with_program(player, program))
            .ok_or(LaunchError::NotInstalled(player))
    }

    /// Use an explicit binary
    pub fn with_program(player: PlayerType, program: impl Into<PathBuf>) -> Self {
        Self {
            player,
            program: program.into(),
        }
    }

    pub fn player(&self) -> PlayerType {
        self.player
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Start the player detached from our stdout/stderr
    pub fn launch(&self, plan: &PlaybackPlan) -> Result<Child, LaunchError> {
        let args = self.player.args(
            &plan.stream_url,
            plan.subtitle_url.as_deref(),
            Some(&plan.video.name),
        );
        info!(player = %self.player, video = %plan.video.name, subtitles = plan.subtitle_url.is_some(), "launching player");
        debug!(program = %self.program.display(), ?args);

        Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|source| LaunchError::Spawn {
                player: self.player,
                source,
            })
    }

    /// Launch and block until the player window closes
    pub async fn launch_and_wait(&self, plan: &PlaybackPlan) -> Result<(), LaunchError> {
        let mut child = self.launch(plan)?;
        child.wait().await.map_err(|source| LaunchError::Spawn {
            player: self.player,
            source,
        })?;
        Ok(())
    }
}
