//! CLI - Command Line Interface for subcast
//!
//! Every step of the playback flow is a subcommand. All output is
//! JSON-parseable with `--json` (the default when stdout is not a TTY).
//!
//! # Examples
//!
//! ```bash
//! # Inspect a torrent and its subtitle candidates
//! subcast files "magnet:?xt=urn:btih:..."
//! subcast match "magnet:?xt=urn:btih:..."
//!
//! # Extract subtitles and play
//! subcast play "magnet:?xt=urn:btih:..." --player mpv
//! subcast resume
//! ```

use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};
use std::io::IsTerminal;
use std::path::PathBuf;

use crate::stream::PlayerType;

// =============================================================================
// Exit Codes
// =============================================================================

/// Exit codes for CLI operations (semantic for scripting)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    /// Success
    Success = 0,
    /// General error
    Error = 1,
    /// Invalid arguments
    InvalidArgs = 2,
    /// Network or HTTP error
    NetworkError = 3,
    /// No playable video in the torrent
    NoVideo = 4,
    /// Subtitle extraction failed
    ExtractionFailed = 5,
    /// Superseded by a newer request
    Cancelled = 6,
    /// Missing or rejected API key
    AuthError = 7,
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> i32 {
        code as i32
    }
}

impl From<ExitCode> for std::process::ExitCode {
    fn from(code: ExitCode) -> std::process::ExitCode {
        std::process::ExitCode::from(code as u8)
    }
}

// =============================================================================
// Main CLI Structure
// =============================================================================

/// subcast - stream magnet links with matched subtitles
#[derive(Parser, Debug)]
#[command(
    name = "subcast",
    version,
    about = "Stream magnet links with auto-matched subtitles",
    long_about = "Lists a torrent through a remote streaming server, picks the largest \
                  video and its best subtitle, has the server extract the subtitle \
                  track and opens the stream in a local player.",
    after_help = "EXAMPLES:\n\
                  subcast files \"magnet:?xt=...\"        List torrent files\n\
                  subcast match \"magnet:?xt=...\"        Show subtitle candidates\n\
                  subcast play \"magnet:?xt=...\"         Extract subtitles and play\n\
                  subcast config set-key <KEY>          Store the API key"
)]
pub struct Cli {
    /// Output format as JSON (default for non-TTY)
    #[arg(long, short = 'j', global = true)]
    pub json: bool,

    /// Suppress non-essential output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(long, short = 'v', global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Path to config file
    #[arg(long, short = 'c', global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    /// Check if JSON output should be used
    pub fn should_json(&self) -> bool {
        self.json || !std::io::stdout().is_terminal()
    }

    /// Default tracing filter for the chosen verbosity
    pub fn log_filter(&self) -> &'static str {
        match self.verbose {
            0 => "warn",
            1 => "subcast=debug,info",
            _ => "trace",
        }
    }
}

// =============================================================================
// Subcommands
// =============================================================================

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List the files of a torrent
    #[command(visible_alias = "ls")]
    Files(FilesCmd),

    /// Show subtitle candidates for a video
    #[command(visible_alias = "m")]
    Match(MatchCmd),

    /// Check a video file for embedded subtitles
    Probe(ProbeCmd),

    /// Start a subtitle extraction and wait for it
    #[command(visible_alias = "x")]
    Extract(ExtractCmd),

    /// Wait for an existing extraction task
    Poll(PollCmd),

    /// Prepare subtitles and open the stream in a local player
    #[command(visible_alias = "p")]
    Play(PlayCmd),

    /// Resume the last saved session
    Resume(ResumeCmd),

    /// Forget the saved session
    Reset,

    /// Show download progress of a streamed file
    Progress(ProgressCmd),

    /// Check whether the streaming server is reachable
    Health,

    /// Show validity and expiry of the API key
    #[command(visible_alias = "key")]
    KeyStatus,

    /// Read or change configuration
    #[command(subcommand)]
    Config(ConfigCmd),
}

// =============================================================================
// Torrent Commands
// =============================================================================

/// List the files of a torrent
#[derive(Args, Debug)]
pub struct FilesCmd {
    /// Magnet link
    #[arg(required = true)]
    pub magnet: String,

    /// Only list files of this kind
    #[arg(long, short = 'k', value_enum)]
    pub kind: Option<FileKind>,

    /// Bypass the listing cache
    #[arg(long)]
    pub refresh: bool,
}

/// File kind filter
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    /// Video files only
    Video,
    /// Subtitle files only
    Subtitle,
}

/// Show subtitle candidates for a video
#[derive(Args, Debug)]
pub struct MatchCmd {
    /// Magnet link
    #[arg(required = true)]
    pub magnet: String,

    /// Video file name to match (default: largest video)
    #[arg(long)]
    pub video: Option<String>,
}

/// Check a video file for embedded subtitles
#[derive(Args, Debug)]
pub struct ProbeCmd {
    /// Magnet link
    #[arg(required = true)]
    pub magnet: String,

    /// File index as reported by `files`
    #[arg(long, short = 'i')]
    pub index: u32,
}

// =============================================================================
// Extraction Commands
// =============================================================================

/// Start a subtitle extraction and wait for it
#[derive(Args, Debug)]
pub struct ExtractCmd {
    /// Magnet link
    #[arg(required = true)]
    pub magnet: String,

    /// Index of the subtitle file, or of the video for embedded tracks
    #[arg(long, short = 'i')]
    pub file_index: u32,

    /// Extract an embedded track instead of a subtitle file
    #[arg(long, short = 'e')]
    pub embedded: bool,

    /// Embedded track number
    #[arg(long, short = 's', default_value = "0", requires = "embedded")]
    pub sub_index: u32,
}

/// Wait for an existing extraction task
#[derive(Args, Debug)]
pub struct PollCmd {
    /// Task id returned by `extract`
    #[arg(required = true)]
    pub task_id: String,
}

// =============================================================================
// Playback Commands
// =============================================================================

/// Local player selection
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerChoice {
    /// VLC media player
    Vlc,
    /// mpv media player
    Mpv,
}

impl From<PlayerChoice> for PlayerType {
    fn from(choice: PlayerChoice) -> Self {
        match choice {
            PlayerChoice::Vlc => PlayerType::Vlc,
            PlayerChoice::Mpv => PlayerType::Mpv,
        }
    }
}

/// Prepare subtitles and open the stream in a local player
#[derive(Args, Debug)]
pub struct PlayCmd {
    /// Magnet link
    #[arg(required = true)]
    pub magnet: String,

    /// Player to launch (default from config, else VLC)
    #[arg(long, short = 'p', value_enum)]
    pub player: Option<PlayerChoice>,

    /// Print the playback plan without launching a player
    #[arg(long, short = 'n')]
    pub no_launch: bool,
}

/// Resume the last saved session
#[derive(Args, Debug)]
pub struct ResumeCmd {
    /// Player to launch (default from config, else VLC)
    #[arg(long, short = 'p', value_enum)]
    pub player: Option<PlayerChoice>,

    /// Print the playback plan without launching a player
    #[arg(long, short = 'n')]
    pub no_launch: bool,
}

/// Show download progress of a streamed file
#[derive(Args, Debug)]
pub struct ProgressCmd {
    /// Magnet link
    #[arg(required = true)]
    pub magnet: String,

    /// File index as reported by `files`
    #[arg(long, short = 'i')]
    pub index: u32,

    /// Keep refreshing until the file is fully downloaded
    #[arg(long, short = 'w')]
    pub watch: bool,
}

// =============================================================================
// Config Command
// =============================================================================

#[derive(Subcommand, Debug)]
pub enum ConfigCmd {
    /// Print the effective configuration
    Show,
    /// Store the API key
    SetKey {
        #[arg(required = true)]
        key: String,
    },
    /// Store the streaming server URL
    SetBase {
        #[arg(required = true)]
        url: String,
    },
    /// Store the default player
    SetPlayer {
        #[arg(value_enum)]
        player: PlayerChoice,
    },
}

// =============================================================================
// JSON Output Types
// =============================================================================

/// Generic JSON output wrapper with status
#[derive(Debug, Serialize, Deserialize)]
pub struct JsonOutput<T: Serialize> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "is_zero")]
    pub exit_code: i32,
}

fn is_zero(n: &i32) -> bool {
    *n == 0
}

impl<T: Serialize> JsonOutput<T> {
    /// Create success output with data
    pub fn success(data: T) -> Self {
        Self {
            data: Some(data),
            error: None,
            exit_code: 0,
        }
    }

    /// Create error output (no data)
    pub fn error_msg(msg: impl Into<String>, code: ExitCode) -> JsonOutput<()> {
        JsonOutput::<()> {
            data: None,
            error: Some(msg.into()),
            exit_code: code.into(),
        }
    }
}

/// Status OK response
#[derive(Debug, Serialize, Deserialize)]
pub struct StatusOk {
    pub status: &'static str,
}

impl Default for StatusOk {
    fn default() -> Self {
        Self { status: "ok" }
    }
}

// =============================================================================
// Output Helper
// =============================================================================

/// Output helper for consistent formatting
#[derive(Debug, Clone, Copy)]
pub struct Output {
    pub json: bool,
    pub quiet: bool,
}

impl Output {
    pub fn new(cli: &Cli) -> Self {
        Self {
            json: cli.should_json(),
            quiet: cli.quiet,
        }
    }

    /// Print success data
    pub fn print<T: Serialize>(&self, data: T) -> anyhow::Result<()> {
        if self.json {
            let output = JsonOutput::success(data);
            println!("{}", serde_json::to_string_pretty(&output)?);
        } else {
            // For non-JSON, caller should handle formatting
            println!("{}", serde_json::to_string_pretty(&data)?);
        }
        Ok(())
    }

    /// Print a plain line in text mode only
    pub fn line(&self, msg: impl std::fmt::Display) {
        if !self.json {
            println!("{}", msg);
        }
    }

    /// Print error and return exit code
    pub fn error(&self, msg: impl Into<String>, code: ExitCode) -> ExitCode {
        let msg = msg.into();
        if self.json {
            let output = JsonOutput::<()>::error_msg(&msg, code);
            if let Ok(json) = serde_json::to_string_pretty(&output) {
                eprintln!("{}", json);
            }
        } else if !self.quiet {
            eprintln!("Error: {}", msg);
        }
        code
    }

    /// Print info message (suppressed in quiet mode)
    pub fn info(&self, msg: impl std::fmt::Display) {
        if !self.quiet && !self.json {
            eprintln!("{}", msg);
        }
    }
}

// =============================================================================
// Magnet Validation
// =============================================================================

/// Validate that the input looks like a magnet link
pub fn validate_magnet(magnet: &str) -> Result<&str, &'static str> {
    let magnet = magnet.trim();
    if magnet.is_empty() {
        Err("Please enter a magnet link")
    } else if !magnet.starts_with("magnet:?") {
        Err("Invalid magnet link (expected magnet:?...)")
    } else {
        Ok(magnet)
    }
}

// =============================================================================
// Tests
// =============================================================================
