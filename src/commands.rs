//! CLI Command Handlers
//!
//! Implements all CLI commands by calling the appropriate backend services.
//! Each handler takes CLI args and Output, returns ExitCode.

use serde::Serialize;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, warn};

use crate::api::{ApiError, ApiHealth, StreamApiClient};
use crate::cache::TorrentCache;
use crate::cli::{
    validate_magnet, ConfigCmd, ExitCode, ExtractCmd, FileKind, FilesCmd, MatchCmd, Output,
    PlayCmd, PollCmd, ProbeCmd, ProgressCmd, ResumeCmd, StatusOk,
};
use crate::config::Config;
use crate::models::{
    ExtractionRequest, FileEntry, KeyStatus, PlaybackPlan, SubtitleSource, TorrentMetadata,
};
use crate::state::SavedSession;
use crate::stream::matcher::{
    find_best_subtitle, find_exact_base_match, find_largest_video, is_subtitle_file, is_video_file,
    rank_subtitles,
};
use crate::stream::{
    ExtractionPoller, PlaybackPreparer, PlayerLauncher, PlayerType, PollEvent, PollOutcome,
    PrepareError, PrepareEvent,
};

/// Stream token used for every poll started from the CLI
const CLI_STREAM: &str = "cli";

/// Delay between `progress --watch` refreshes
const PROGRESS_INTERVAL: Duration = Duration::from_secs(3);
/// Delay before retrying a failed `progress --watch` request
const PROGRESS_RETRY: Duration = Duration::from_secs(5);

/// Loaded configuration plus where it came from
pub struct Context {
    pub config: Config,
    pub config_path: Option<PathBuf>,
    pub session_path: Option<PathBuf>,
    pub cache: Option<TorrentCache>,
}

impl Context {
    pub fn load(config_path: Option<PathBuf>) -> Self {
        let config = match &config_path {
            Some(path) => Config::load_from(path),
            None => Config::load(),
        };
        Self {
            config,
            config_path,
            session_path: SavedSession::default_path(),
            cache: TorrentCache::open_default(),
        }
    }

    fn client(&self) -> StreamApiClient {
        StreamApiClient::with_base_url(self.config.api_base(), self.config.api_key())
    }

    fn poller(&self, client: Arc<StreamApiClient>) -> ExtractionPoller {
        ExtractionPoller::with_interval(client, self.config.poll_interval())
    }

    fn save_config(&self) -> anyhow::Result<()> {
        match &self.config_path {
            Some(path) => self.config.save_to(path),
            None => self.config.save(),
        }
    }

    fn save_session(&self, session: &SavedSession) {
        if let Some(path) = &self.session_path {
            if let Err(e) = session.save_to(path) {
                warn!(error = %e, "could not save session");
            }
        }
    }

    fn player(&self, choice: Option<crate::cli::PlayerChoice>) -> PlayerType {
        choice.map(Into::into).unwrap_or_else(|| self.config.player_type())
    }
}

/// Exit code for an API failure
fn api_exit_code(e: &ApiError) -> ExitCode {
    match e {
        ApiError::MissingApiKey => ExitCode::AuthError,
        ApiError::Status { status, .. } if *status == 401 || *status == 403 => ExitCode::AuthError,
        ApiError::NoFiles => ExitCode::NoVideo,
        _ => ExitCode::NetworkError,
    }
}

fn prepare_exit_code(e: &PrepareError) -> ExitCode {
    match e {
        PrepareError::MissingMagnet => ExitCode::InvalidArgs,
        PrepareError::MissingApiKey => ExitCode::AuthError,
        PrepareError::NoVideo => ExitCode::NoVideo,
        PrepareError::Api(api) => api_exit_code(api),
        PrepareError::Extraction(_) => ExitCode::ExtractionFailed,
        PrepareError::Superseded => ExitCode::Cancelled,
    }
}

/// Print extraction progress as it arrives
fn progress_printer(output: Output) -> impl Fn(PollEvent) + Send + Sync + 'static {
    move |event: PollEvent| match event {
        PollEvent::Progress { percent, .. } => {
            output.info(format!("Extracting subtitles... {:.1}%", percent))
        }
        PollEvent::Complete { .. } => output.info("Subtitles ready!"),
        PollEvent::Error { message, .. } => output.info(message),
    }
}

// =============================================================================
// Files Command
// =============================================================================

#[derive(Debug, Serialize)]
struct FilesReport {
    #[serde(skip_serializing_if = "Option::is_none")]
    metadata: Option<TorrentMetadata>,
    cached: bool,
    files: Vec<FileEntry>,
}

/// Metadata + files, from the cache when fresh
async fn load_listing(
    ctx: &Context,
    client: &StreamApiClient,
    magnet: &str,
    refresh: bool,
) -> Result<FilesReport, ApiError> {
    let cache = ctx.cache.as_ref();

    if !refresh {
        if let Some(hit) = cache.and_then(|c| c.get(magnet)) {
            debug!(magnet, "listing served from cache");
            return Ok(FilesReport {
                metadata: Some(hit.metadata),
                cached: true,
                files: hit.files,
            });
        }
    }

    let metadata = match client.metadata(magnet).await {
        Ok(m) => Some(m),
        Err(e @ ApiError::MissingApiKey) => return Err(e),
        Err(e) => {
            warn!(error = %e, "metadata unavailable");
            None
        }
    };
    let files = client.files(magnet).await?;

    if let (Some(cache), Some(metadata)) = (cache, &metadata) {
        if let Err(e) = cache.put(magnet, metadata.clone(), files.clone()) {
            warn!(error = %e, "could not write listing cache");
        }
    }

    Ok(FilesReport {
        metadata,
        cached: false,
        files,
    })
}

pub async fn files_cmd(cmd: FilesCmd, ctx: &Context, output: &Output) -> ExitCode {
    let magnet = match validate_magnet(&cmd.magnet) {
        Ok(m) => m,
        Err(e) => return output.error(e, ExitCode::InvalidArgs),
    };
    let client = ctx.client();

    output.info("Loading torrent...");
    let mut report = match load_listing(ctx, &client, magnet, cmd.refresh).await {
        Ok(r) => r,
        Err(e) => return output.error(format!("Load torrent error: {}", e), api_exit_code(&e)),
    };

    match cmd.kind {
        Some(FileKind::Video) => report.files.retain(|f| is_video_file(&f.name)),
        Some(FileKind::Subtitle) => report.files.retain(|f| is_subtitle_file(&f.name)),
        None => {}
    }

    if output.json {
        if let Err(e) = output.print(&report) {
            return output.error(format!("Failed to serialize: {}", e), ExitCode::Error);
        }
    } else {
        if let Some(meta) = &report.metadata {
            let suffix = if report.cached { " (cached)" } else { "" };
            output.line(format!("{}{}", meta, suffix));
        }
        for file in &report.files {
            output.line(file);
        }
    }
    ExitCode::Success
}

// =============================================================================
// Match Command
// =============================================================================

#[derive(Debug, Serialize)]
struct CandidateReport {
    name: String,
    index: u32,
    score: u32,
}

#[derive(Debug, Serialize)]
struct MatchReport {
    video: FileEntry,
    exact_match: Option<FileEntry>,
    best_match: Option<FileEntry>,
    candidates: Vec<CandidateReport>,
}

fn build_match_report(video: &FileEntry, files: &[FileEntry]) -> MatchReport {
    MatchReport {
        video: video.clone(),
        exact_match: find_exact_base_match(&video.name, files).cloned(),
        best_match: find_best_subtitle(&video.name, files).cloned(),
        candidates: rank_subtitles(&video.name, files)
            .into_iter()
            .map(|c| CandidateReport {
                name: c.file.name.clone(),
                index: c.file.index,
                score: c.score,
            })
            .collect(),
    }
}

pub async fn match_cmd(cmd: MatchCmd, ctx: &Context, output: &Output) -> ExitCode {
    let magnet = match validate_magnet(&cmd.magnet) {
        Ok(m) => m,
        Err(e) => return output.error(e, ExitCode::InvalidArgs),
    };
    let client = ctx.client();

    let listing = match load_listing(ctx, &client, magnet, false).await {
        Ok(l) => l,
        Err(e) => return output.error(format!("Load torrent error: {}", e), api_exit_code(&e)),
    };

    let video = match &cmd.video {
        Some(name) => listing.files.iter().find(|f| &f.name == name),
        None => find_largest_video(&listing.files),
    };
    let Some(video) = video else {
        return output.error("No video files found in torrent.", ExitCode::NoVideo);
    };

    let report = build_match_report(video, &listing.files);

    if output.json {
        if let Err(e) = output.print(&report) {
            return output.error(format!("Failed to serialize: {}", e), ExitCode::Error);
        }
    } else {
        output.line(format!("Video: {}", report.video));
        match &report.exact_match {
            Some(f) => output.line(format!("Exact match: {}", f)),
            None => output.line("Exact match: none"),
        }
        match &report.best_match {
            Some(f) => output.line(format!("Best English match: {}", f)),
            None => output.line("Best English match: none"),
        }
        for c in &report.candidates {
            output.line(format!("  {:>2}  [{}] {}", c.score, c.index, c.name));
        }
    }
    ExitCode::Success
}

// =============================================================================
// Probe Command
// =============================================================================

pub async fn probe_cmd(cmd: ProbeCmd, ctx: &Context, output: &Output) -> ExitCode {
    let magnet = match validate_magnet(&cmd.magnet) {
        Ok(m) => m,
        Err(e) => return output.error(e, ExitCode::InvalidArgs),
    };

    output.info("Checking for embedded subtitles...");
    match ctx.client().probe(magnet, cmd.index).await {
        Ok(probe) => {
            if let Err(e) = output.print(probe) {
                return output.error(format!("Failed to serialize: {}", e), ExitCode::Error);
            }
            ExitCode::Success
        }
        Err(e) => output.error(format!("Could not check for subtitles: {}", e), api_exit_code(&e)),
    }
}

// =============================================================================
// Extract / Poll Commands
// =============================================================================

#[derive(Debug, Serialize)]
struct ExtractReport {
    task_id: String,
    download_url: String,
}

/// Poll `task_id` to completion, printing progress
async fn wait_for_task(
    client: Arc<StreamApiClient>,
    ctx: &Context,
    task_id: String,
    output: &Output,
) -> Result<String, ExitCode> {
    let poller = ctx.poller(client);
    let outcome = poller
        .start(CLI_STREAM, task_id, progress_printer(*output))
        .run()
        .await;

    match outcome {
        PollOutcome::Complete { download_url } => Ok(download_url),
        PollOutcome::Failed { message } => Err(output.error(message, ExitCode::ExtractionFailed)),
        PollOutcome::Cancelled => Err(output.error(
            "Request cancelled by a newer request.",
            ExitCode::Cancelled,
        )),
    }
}

pub async fn extract_cmd(cmd: ExtractCmd, ctx: &Context, output: &Output) -> ExitCode {
    let magnet = match validate_magnet(&cmd.magnet) {
        Ok(m) => m,
        Err(e) => return output.error(e, ExitCode::InvalidArgs),
    };
    let request = if cmd.embedded {
        ExtractionRequest::embedded(cmd.file_index, cmd.sub_index)
    } else {
        ExtractionRequest::subtitle_file(cmd.file_index)
    };

    let client = Arc::new(ctx.client());
    output.info("Starting subtitle extraction...");
    let task_id = match client.start_extraction(magnet, request).await {
        Ok(id) => id,
        Err(e) => {
            return output.error(
                format!("Error starting subtitle extraction: {}", e),
                api_exit_code(&e),
            )
        }
    };
    output.info(format!("Task {}", task_id));

    match wait_for_task(client, ctx, task_id.clone(), output).await {
        Ok(download_url) => {
            if let Err(e) = output.print(ExtractReport {
                task_id,
                download_url,
            }) {
                return output.error(format!("Failed to serialize: {}", e), ExitCode::Error);
            }
            ExitCode::Success
        }
        Err(code) => code,
    }
}

pub async fn poll_cmd(cmd: PollCmd, ctx: &Context, output: &Output) -> ExitCode {
    let client = Arc::new(ctx.client());
    match wait_for_task(client, ctx, cmd.task_id.clone(), output).await {
        Ok(download_url) => {
            if let Err(e) = output.print(ExtractReport {
                task_id: cmd.task_id,
                download_url,
            }) {
                return output.error(format!("Failed to serialize: {}", e), ExitCode::Error);
            }
            ExitCode::Success
        }
        Err(code) => code,
    }
}

// =============================================================================
// Play / Resume Commands
// =============================================================================

/// Mirrors preparation progress into the saved session
struct SessionRecorder {
    session: Mutex<SavedSession>,
}

impl SessionRecorder {
    fn record(&self, event: &PrepareEvent) {
        let mut session = match self.session.lock() {
            Ok(s) => s,
            Err(poisoned) => poisoned.into_inner(),
        };
        match event {
            PrepareEvent::VideoSelected { file } => {
                session.video_index = Some(file.index);
                session.video_name = Some(file.name.clone());
            }
            PrepareEvent::ExtractionStarted { task_id, .. } => {
                session.subtitle_task_id = Some(task_id.clone());
            }
            _ => {}
        }
    }

    fn snapshot(&self) -> SavedSession {
        match self.session.lock() {
            Ok(s) => s.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

async fn launch(plan: &PlaybackPlan, player: PlayerType, output: &Output) -> ExitCode {
    let launcher = match PlayerLauncher::locate(player) {
        Ok(l) => l,
        Err(e) => return output.error(format!("{}. Install it or use --no-launch.", e), ExitCode::Error),
    };
    output.info(format!("Opening {} ...", launcher.player()));
    match launcher.launch(plan) {
        Ok(_child) => ExitCode::Success,
        Err(e) => output.error(e.to_string(), ExitCode::Error),
    }
}

fn print_plan(plan: &PlaybackPlan, output: &Output) -> Result<(), ExitCode> {
    if output.json {
        output
            .print(plan)
            .map_err(|e| output.error(format!("Failed to serialize: {}", e), ExitCode::Error))
    } else {
        output.line(format!("Video:     {}", plan.video));
        output.line(format!("Stream:    {}", plan.stream_url));
        match &plan.subtitle_url {
            Some(url) => output.line(format!("Subtitles: {}", url)),
            None => output.line("Subtitles: none"),
        }
        Ok(())
    }
}

pub async fn play_cmd(cmd: PlayCmd, ctx: &Context, output: &Output) -> ExitCode {
    let magnet = match validate_magnet(&cmd.magnet) {
        Ok(m) => m.to_string(),
        Err(e) => return output.error(e, ExitCode::InvalidArgs),
    };

    let client = Arc::new(ctx.client());
    let preparer = PlaybackPreparer::new(client.clone(), ctx.poller(client));

    let recorder = Arc::new(SessionRecorder {
        session: Mutex::new(SavedSession::new(&magnet)),
    });
    let sink_recorder = Arc::clone(&recorder);
    let out = *output;
    let sink = Arc::new(move |event: PrepareEvent| {
        sink_recorder.record(&event);
        match &event {
            PrepareEvent::VideoSelected { file } => out.info(format!("Preparing {}", file.name)),
            PrepareEvent::Status { message } => out.info(message),
            PrepareEvent::ExtractionStarted { file_name, .. } => {
                out.info(format!("Extracting subtitles from {}", file_name))
            }
            PrepareEvent::Extraction(PollEvent::Progress { percent, .. }) => {
                out.info(format!("Extracting subtitles... {:.1}%", percent))
            }
            PrepareEvent::Extraction(_) => {}
        }
    });

    let result = preparer.prepare(CLI_STREAM, &magnet, sink).await;
    let mut session = recorder.snapshot();

    let plan = match result {
        Ok(plan) => plan,
        Err(e) => {
            // Keep a pending task id so `resume` can pick it up; drop a failed one
            if !matches!(e, PrepareError::Superseded) {
                session.subtitle_task_id = None;
            }
            if session.video_index.is_some() {
                ctx.save_session(&session);
            }
            return output.error(e.to_string(), prepare_exit_code(&e));
        }
    };

    session.subtitle_task_id = None;
    session.subtitle_index = match &plan.subtitle_source {
        SubtitleSource::ExactMatch { file } | SubtitleSource::Scored { file } => Some(file.index),
        _ => None,
    };
    session.subtitle_url = plan.subtitle_url.clone();
    ctx.save_session(&session);

    if let Err(code) = print_plan(&plan, output) {
        return code;
    }
    if cmd.no_launch {
        return ExitCode::Success;
    }
    launch(&plan, ctx.player(cmd.player), output).await
}

pub async fn resume_cmd(cmd: ResumeCmd, ctx: &Context, output: &Output) -> ExitCode {
    let Some(path) = &ctx.session_path else {
        return output.error("Could not determine session path", ExitCode::Error);
    };
    let mut session = match SavedSession::load_from(path) {
        Some(s) if s.is_resumable() => s,
        _ => return output.error("No session to resume.", ExitCode::InvalidArgs),
    };
    let Some(video_index) = session.video_index else {
        return output.error("No session to resume.", ExitCode::InvalidArgs);
    };

    let client = Arc::new(ctx.client());

    if let Some(task_id) = session.subtitle_task_id.clone() {
        output.info("Resuming subtitle extraction...");
        match wait_for_task(client.clone(), ctx, task_id, output).await {
            Ok(url) => {
                session.subtitles_ready(url);
                ctx.save_session(&session);
            }
            Err(code) => {
                session.subtitle_task_id = None;
                ctx.save_session(&session);
                return code;
            }
        }
    }

    let video_name = session
        .video_name
        .clone()
        .unwrap_or_else(|| format!("File {}", video_index + 1));
    let plan = PlaybackPlan {
        video: FileEntry::new(video_name, 0, video_index),
        stream_url: client.stream_url(&session.magnet, video_index),
        subtitle_source: if session.subtitle_url.is_some() {
            SubtitleSource::Saved
        } else {
            SubtitleSource::None
        },
        subtitle_url: session.subtitle_url.clone(),
    };

    if let Err(code) = print_plan(&plan, output) {
        return code;
    }
    if cmd.no_launch {
        return ExitCode::Success;
    }
    launch(&plan, ctx.player(cmd.player), output).await
}

pub async fn reset_cmd(ctx: &Context, output: &Output) -> ExitCode {
    if let Some(path) = &ctx.session_path {
        if let Err(e) = SavedSession::clear(path) {
            return output.error(format!("Failed to clear session: {}", e), ExitCode::Error);
        }
    }
    if let Err(e) = output.print(StatusOk::default()) {
        return output.error(format!("Failed to print: {}", e), ExitCode::Error);
    }
    ExitCode::Success
}

// =============================================================================
// Progress Command
// =============================================================================

pub async fn progress_cmd(cmd: ProgressCmd, ctx: &Context, output: &Output) -> ExitCode {
    let magnet = match validate_magnet(&cmd.magnet) {
        Ok(m) => m,
        Err(e) => return output.error(e, ExitCode::InvalidArgs),
    };
    let client = ctx.client();

    if !cmd.watch {
        return match client.stream_status(magnet, cmd.index).await {
            Ok(status) => {
                output.info(&status);
                if let Err(e) = output.print(&status) {
                    return output.error(format!("Failed to serialize: {}", e), ExitCode::Error);
                }
                ExitCode::Success
            }
            Err(e) => output.error(format!("Status request failed: {}", e), api_exit_code(&e)),
        };
    }

    loop {
        match client.stream_status(magnet, cmd.index).await {
            Ok(status) => {
                output.info(&status);
                if status.is_complete() {
                    if let Err(e) = output.print(&status) {
                        return output.error(format!("Failed to serialize: {}", e), ExitCode::Error);
                    }
                    return ExitCode::Success;
                }
                tokio::time::sleep(PROGRESS_INTERVAL).await;
            }
            Err(e @ ApiError::MissingApiKey) => {
                return output.error(e.to_string(), ExitCode::AuthError)
            }
            Err(e) => {
                output.info(format!("Connection error, retrying... ({})", e));
                tokio::time::sleep(PROGRESS_RETRY).await;
            }
        }
    }
}

// =============================================================================
// Health / Key Status Commands
// =============================================================================

pub async fn health_cmd(ctx: &Context, output: &Output) -> ExitCode {
    let health = ctx.client().health().await;
    if let Err(e) = output.print(&health) {
        return output.error(format!("Failed to serialize: {}", e), ExitCode::Error);
    }
    match health {
        ApiHealth::Online => ExitCode::Success,
        ApiHealth::Offline { status } => {
            output.error(format!("Server is offline (HTTP {})", status), ExitCode::NetworkError)
        }
        ApiHealth::Unreachable { reason } => {
            output.error(format!("Server is unreachable: {}", reason), ExitCode::NetworkError)
        }
    }
}

pub async fn key_status_cmd(ctx: &Context, output: &Output) -> ExitCode {
    match ctx.client().api_key_status().await {
        Ok(status) => {
            output.info(&status);
            if let Err(e) = output.print(&status) {
                return output.error(format!("Failed to serialize: {}", e), ExitCode::Error);
            }
            match status {
                KeyStatus::Master | KeyStatus::Active { .. } => ExitCode::Success,
                KeyStatus::Expired | KeyStatus::Invalid { .. } => ExitCode::AuthError,
            }
        }
        Err(e) => output.error(
            format!("Could not verify API key status: {}", e),
            api_exit_code(&e),
        ),
    }
}

// =============================================================================
// Config Command
// =============================================================================

#[derive(Debug, Serialize)]
struct ConfigReport {
    api_key: Option<String>,
    api_base: String,
    poll_interval_ms: u64,
    player: String,
}

/// Keep the first and last four characters of a key
fn mask_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() <= 8 {
        "*".repeat(chars.len())
    } else {
        let head: String = chars[..4].iter().collect();
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{}...{}", head, tail)
    }
}

pub async fn config_cmd(cmd: ConfigCmd, mut ctx: Context, output: &Output) -> ExitCode {
    match cmd {
        ConfigCmd::Show => {
            let report = ConfigReport {
                api_key: ctx.config.api_key().map(|k| mask_key(&k)),
                api_base: ctx.config.api_base(),
                poll_interval_ms: ctx.config.poll_interval().as_millis() as u64,
                player: ctx.config.player_type().to_string(),
            };
            if let Err(e) = output.print(&report) {
                return output.error(format!("Failed to serialize: {}", e), ExitCode::Error);
            }
            return ExitCode::Success;
        }
        ConfigCmd::SetKey { key } => {
            let key = key.trim().to_string();
            if key.is_empty() {
                return output.error("API Key cannot be empty.", ExitCode::InvalidArgs);
            }
            ctx.config.api_key = Some(key);
        }
        ConfigCmd::SetBase { url } => {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return output.error("Server URL must start with http:// or https://", ExitCode::InvalidArgs);
            }
            ctx.config.api_base = Some(url.trim_end_matches('/').to_string());
        }
        ConfigCmd::SetPlayer { player } => {
            ctx.config.player = Some(PlayerType::from(player).name().to_string());
        }
    }

    if let Err(e) = ctx.save_config() {
        return output.error(format!("Error saving config: {}", e), ExitCode::Error);
    }
    if let Err(e) = output.print(StatusOk::default()) {
        return output.error(format!("Failed to print: {}", e), ExitCode::Error);
    }
    ExitCode::Success
}
