//! Playback preparation
//!
//! Turns a magnet link into a [`PlaybackPlan`]: list the torrent, pick the
//! largest video, find or extract a subtitle track, wait for the extraction
//! and build the stream URL.
//!
//! Subtitle strategy by container:
//! - `mp4`: exact subtitle file, else the best English-scored one
//! - `mkv`: exact subtitle file, else the first embedded track if the server
//!   reports any
//! - anything else: no subtitles

use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

use super::matcher::{find_best_subtitle, find_exact_base_match, find_largest_video};
use super::poller::{ExtractionPoller, PollEvent, PollOutcome, Reservation};
use crate::api::{ApiError, StreamApiClient};
use crate::models::{ExtractionRequest, FileEntry, PlaybackPlan, SubtitleSource};

/// Errors that stop playback preparation
#[derive(Debug, Error)]
pub enum PrepareError {
    #[error("Please enter a magnet link")]
    MissingMagnet,

    #[error("API Key not set. Configure it with `subcast config set-key <KEY>`")]
    MissingApiKey,

    #[error("No video files found in torrent")]
    NoVideo,

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("{0}")]
    Extraction(String),

    /// A newer request for the same stream took over
    #[error("Request cancelled by a newer request")]
    Superseded,
}

/// Progress notifications while preparing
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PrepareEvent {
    /// The video to play has been chosen
    VideoSelected { file: FileEntry },
    /// Free-form status line
    Status { message: String },
    /// An extraction task was started
    ExtractionStarted { task_id: String, file_name: String },
    /// Forwarded from the poll session
    Extraction(PollEvent),
}

/// Shared callback receiving [`PrepareEvent`]s
pub type PrepareSink = Arc<dyn Fn(PrepareEvent) + Send + Sync>;

/// Builds playback plans against one streaming server
#[derive(Clone)]
pub struct PlaybackPreparer {
    client: Arc<StreamApiClient>,
    poller: ExtractionPoller,
}

impl PlaybackPreparer {
    pub fn new(client: Arc<StreamApiClient>, poller: ExtractionPoller) -> Self {
        Self { client, poller }
    }

    pub fn client(&self) -> &StreamApiClient {
        &self.client
    }

    pub fn poller(&self) -> &ExtractionPoller {
        &self.poller
    }

    /// Prepare playback of the largest video in `magnet`.
    ///
    /// `stream` identifies the logical request; starting another preparation
    /// with the same token supersedes this one.
    pub async fn prepare(
        &self,
        stream: &str,
        magnet: &str,
        sink: PrepareSink,
    ) -> Result<PlaybackPlan, PrepareError> {
        let magnet = magnet.trim();
        if magnet.is_empty() {
            return Err(PrepareError::MissingMagnet);
        }
        if self.client.api_key().is_none() {
            return Err(PrepareError::MissingApiKey);
        }

        // Claim the stream before touching the network so a later request wins
        let claim = self.poller.reserve(stream);
        let superseded = claim.handle();

        let files = self.client.files(magnet).await?;
        if superseded.is_cancelled() {
            return Err(PrepareError::Superseded);
        }
        let video = find_largest_video(&files)
            .cloned()
            .ok_or(PrepareError::NoVideo)?;
        info!(video = %video.name, index = video.index, "selected video");
        sink(PrepareEvent::VideoSelected {
            file: video.clone(),
        });

        let (source, request) = self.choose_subtitle(magnet, &video, &files, &sink).await;
        if superseded.is_cancelled() {
            return Err(PrepareError::Superseded);
        }

        let subtitle_url = match request {
            Some((request, file_name)) => {
                Some(self.extract(claim, magnet, request, file_name, &sink).await?)
            }
            None => {
                sink(PrepareEvent::Status {
                    message: no_subtitle_message(&video),
                });
                None
            }
        };

        if superseded.is_cancelled() {
            return Err(PrepareError::Superseded);
        }
        Ok(PlaybackPlan {
            stream_url: self.client.stream_url(magnet, video.index),
            video,
            subtitle_url,
            subtitle_source: source,
        })
    }

    /// Pick the subtitle track to extract, if any
    async fn choose_subtitle(
        &self,
        magnet: &str,
        video: &FileEntry,
        files: &[FileEntry],
        sink: &PrepareSink,
    ) -> (SubtitleSource, Option<(ExtractionRequest, String)>) {
        let from_file = |file: &FileEntry, source: SubtitleSource| {
            (
                source,
                Some((ExtractionRequest::subtitle_file(file.index), file.name.clone())),
            )
        };

        match video.extension().as_str() {
            "mp4" => {
                if let Some(file) = find_exact_base_match(&video.name, files) {
                    sink(status("Found matching subtitle file. Extracting..."));
                    return from_file(file, SubtitleSource::ExactMatch { file: file.clone() });
                }
                if let Some(file) = find_best_subtitle(&video.name, files) {
                    sink(status("Found English subtitle file. Extracting..."));
                    return from_file(file, SubtitleSource::Scored { file: file.clone() });
                }
                (SubtitleSource::None, None)
            }
            "mkv" => {
                if let Some(file) = find_exact_base_match(&video.name, files) {
                    sink(status("Found external subtitle file. Extracting..."));
                    return from_file(file, SubtitleSource::ExactMatch { file: file.clone() });
                }

                sink(status("Probing for embedded subtitles..."));
                match self.client.probe(magnet, video.index).await {
                    Ok(probe) if probe.has_subtitles => {
                        sink(status(embedded_message(probe.subtitle_tracks)));
                        (
                            SubtitleSource::Embedded { sub_index: 0 },
                            Some((ExtractionRequest::embedded(video.index, 0), video.name.clone())),
                        )
                    }
                    Ok(_) => (SubtitleSource::None, None),
                    Err(e) => {
                        // A failed probe means "no subtitles", not a failed playback
                        warn!(error = %e, "subtitle probe failed");
                        (SubtitleSource::None, None)
                    }
                }
            }
            _ => (SubtitleSource::None, None),
        }
    }

    /// Start an extraction and wait for its download URL
    async fn extract(
        &self,
        claim: Reservation,
        magnet: &str,
        request: ExtractionRequest,
        file_name: String,
        sink: &PrepareSink,
    ) -> Result<String, PrepareError> {
        let task_id = self.client.start_extraction(magnet, request).await?;
        sink(PrepareEvent::ExtractionStarted {
            task_id: task_id.clone(),
            file_name,
        });

        let forward = Arc::clone(sink);
        let outcome = self
            .poller
            .start_reserved(claim, task_id, move |e: PollEvent| {
                forward(PrepareEvent::Extraction(e))
            })
            .run()
            .await;

        match outcome {
            PollOutcome::Complete { download_url } => Ok(download_url),
            PollOutcome::Failed { message } => Err(PrepareError::Extraction(message)),
            PollOutcome::Cancelled => Err(PrepareError::Superseded),
        }
    }
}

fn status(message: impl Into<String>) -> PrepareEvent {
    PrepareEvent::Status {
        message: message.into(),
    }
}

fn embedded_message(tracks: Option<u32>) -> String {
    match tracks {
        Some(n) => format!("Found {} embedded subtitle track(s). Extracting...", n),
        None => "Found embedded subtitles. Extracting...".to_string(),
    }
}

fn no_subtitle_message(video: &FileEntry) -> String {
    match video.extension().as_str() {
        "mp4" | "mkv" => "No subtitles found.".to_string(),
        _ => "No subtitle processing for this file type.".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn preparer(api_key: Option<&str>) -> PlaybackPreparer {
        let client = Arc::new(StreamApiClient::with_base_url(
            "http://127.0.0.1:9",
            api_key.map(String::from),
        ));
        let poller = ExtractionPoller::new(client.clone());
        PlaybackPreparer::new(client, poller)
    }

    fn quiet() -> PrepareSink {
        Arc::new(|_: PrepareEvent| {})
    }

    #[tokio::test]
    async fn test_empty_magnet_rejected_before_network() {
        let err = preparer(Some("k"))
            .prepare("cli", "   ", quiet())
            .await
            .unwrap_err();
        assert!(matches!(err, PrepareError::MissingMagnet));
    }

    #[tokio::test]
    async fn test_missing_key_rejected_before_network() {
        let err = preparer(None)
            .prepare("cli", "magnet:?xt=urn:btih:abc", quiet())
            .await
            .unwrap_err();
        assert!(matches!(err, PrepareError::MissingApiKey));
    }

    #[test]
    fn test_embedded_message_without_track_count() {
        assert_eq!(
            embedded_message(Some(3)),
            "Found 3 embedded subtitle track(s). Extracting..."
        );
        assert_eq!(
            embedded_message(None),
            "Found embedded subtitles. Extracting..."
        );
    }

    #[test]
    fn test_no_subtitle_message() {
        assert_eq!(
            no_subtitle_message(&FileEntry::new("a.avi", 1, 0)),
            "No subtitle processing for this file type."
        );
        assert_eq!(
            no_subtitle_message(&FileEntry::new("a.mkv", 1, 0)),
            "No subtitles found."
        );
    }
}
