//! Extraction task polling
//!
//! Drives a server-side subtitle extraction task to a terminal state by
//! polling its status at a fixed cadence. Each poll is an explicit
//! [`PollSession`] with its own cancellation token; the [`ExtractionPoller`]
//! only remembers which [`Reservation`] is live for each stream token so that
//! a new request supersedes the old one. A caller with network work to do
//! before polling reserves the stream up front and starts the session from
//! that reservation later.
//!
//! Cancellation is cooperative: a superseded session notices while waiting
//! for its next tick, or right after an in-flight request returns, and then
//! resolves as [`PollOutcome::Cancelled`] without emitting anything else.

use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::api::ApiError;
use crate::models::{TaskState, TaskStatus};

/// Delay between two status requests
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(2000);

const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Anything that can report the status of an extraction task
#[async_trait]
pub trait StatusSource: Send + Sync {
    /// Fetch the current status of `task_id`
    async fn task_status(&self, task_id: &str) -> Result<TaskStatus, ApiError>;

    /// URL serving the result of a completed task
    fn download_url(&self, task_id: &str) -> String;
}

/// Notification emitted while a session runs
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PollEvent {
    /// Still extracting; percent is rounded to one decimal
    Progress { task_id: String, percent: f64 },
    /// Subtitles are ready
    Complete {
        task_id: String,
        download_url: String,
    },
    /// Transport, HTTP, payload or server-reported failure
    Error { task_id: String, message: String },
}

impl PollEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, PollEvent::Progress { .. })
    }
}

/// How a session ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PollOutcome {
    Complete { download_url: String },
    Failed { message: String },
    /// Superseded or cancelled by the caller; not an error
    Cancelled,
}

/// Receiver of [`PollEvent`]s.
///
/// Implemented for any `Fn(PollEvent)` closure, so a channel sender can be
/// plugged in with `move |e| { let _ = tx.send(e); }`.
pub trait PollEventSink: Send + Sync {
    fn emit(&self, event: PollEvent);
}

impl<F> PollEventSink for F
where
    F: Fn(PollEvent) + Send + Sync,
{
    fn emit(&self, event: PollEvent) {
        self(event)
    }
}

/// Round to one decimal place
pub fn round_progress(percent: f64) -> f64 {
    (percent * 10.0).round() / 10.0
}

#[derive(Debug)]
struct LiveSession {
    id: Uuid,
    token: CancellationToken,
}

type Registry = Arc<Mutex<HashMap<String, LiveSession>>>;

/// Starts poll sessions and keeps at most one live session per stream token
#[derive(Clone)]
pub struct ExtractionPoller {
    source: Arc<dyn StatusSource>,
    interval: Duration,
    live: Registry,
}

impl ExtractionPoller {
    /// Create a poller with the default 2s interval
    pub fn new(source: Arc<dyn StatusSource>) -> Self {
        Self::with_interval(source, DEFAULT_POLL_INTERVAL)
    }

    /// Create a poller with a custom interval, at least 1ms
    pub fn with_interval(source: Arc<dyn StatusSource>, interval: Duration) -> Self {
        Self {
            source,
            interval: interval.max(MIN_POLL_INTERVAL),
            live: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Claim `stream` for a new request, cancelling whoever held it.
    ///
    /// The claim is released when the returned [`Reservation`] (or the
    /// session started from it) is dropped.
    pub fn reserve(&self, stream: impl Into<String>) -> Reservation {
        let stream = stream.into();
        let id = Uuid::new_v4();
        let token = CancellationToken::new();

        let previous = lock(&self.live).insert(
            stream.clone(),
            LiveSession {
                id,
                token: token.clone(),
            },
        );
        if let Some(previous) = previous {
            debug!(%stream, session = %previous.id, "superseding poll session");
            previous.token.cancel();
        }

        Reservation {
            id,
            stream,
            token,
            live: Arc::clone(&self.live),
        }
    }

    /// Register a new session for `stream`, cancelling the one it replaces.
    ///
    /// The session does nothing until [`PollSession::run`] or
    /// [`PollSession::spawn`] is called.
    pub fn start(
        &self,
        stream: impl Into<String>,
        task_id: impl Into<String>,
        sink: impl PollEventSink + 'static,
    ) -> PollSession {
        self.start_reserved(self.reserve(stream), task_id, sink)
    }

    /// Start a session under an earlier [`reserve`](Self::reserve).
    ///
    /// A reservation that was already superseded yields a session that
    /// resolves as [`PollOutcome::Cancelled`] without polling.
    pub fn start_reserved(
        &self,
        reservation: Reservation,
        task_id: impl Into<String>,
        sink: impl PollEventSink + 'static,
    ) -> PollSession {
        let task_id = task_id.into();
        info!(stream = %reservation.stream, %task_id, session = %reservation.id, "poll session started");
        PollSession {
            reservation,
            task_id,
            source: Arc::clone(&self.source),
            interval: self.interval,
            sink: Box::new(sink),
        }
    }

    /// Cancel the live session of `stream`, if any. Returns whether one existed.
    pub fn cancel(&self, stream: &str) -> bool {
        match lock(&self.live).remove(stream) {
            Some(session) => {
                session.token.cancel();
                true
            }
            None => false,
        }
    }

    /// Whether `stream` currently has a live reservation or session
    pub fn is_polling(&self, stream: &str) -> bool {
        lock(&self.live).contains_key(stream)
    }
}

fn lock(live: &Registry) -> std::sync::MutexGuard<'_, HashMap<String, LiveSession>> {
    // The map holds no invariants a panicking holder could break
    live.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Cancels one session from outside
#[derive(Debug, Clone)]
pub struct PollHandle {
    token: CancellationToken,
}

impl PollHandle {
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// A stream token's slot in the poller, held from request entry on
#[derive(Debug)]
pub struct Reservation {
    id: Uuid,
    stream: String,
    token: CancellationToken,
    live: Registry,
}

impl Reservation {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn stream(&self) -> &str {
        &self.stream
    }

    /// Whether a newer request (or an explicit cancel) took the slot
    pub fn is_superseded(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn handle(&self) -> PollHandle {
        PollHandle {
            token: self.token.clone(),
        }
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        let mut live = lock(&self.live);
        // Only drop our own entry; a newer request may own the slot now
        if live.get(&self.stream).map(|s| s.id) == Some(self.id) {
            live.remove(&self.stream);
        }
    }
}

/// One poll loop for one task
pub struct PollSession {
    reservation: Reservation,
    task_id: String,
    source: Arc<dyn StatusSource>,
    interval: Duration,
    sink: Box<dyn PollEventSink>,
}

impl std::fmt::Debug for PollSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PollSession")
            .field("id", &self.reservation.id)
            .field("stream", &self.reservation.stream)
            .field("task_id", &self.task_id)
            .field("cancelled", &self.reservation.is_superseded())
            .finish()
    }
}

impl PollSession {
    pub fn id(&self) -> Uuid {
        self.reservation.id
    }

    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    pub fn stream(&self) -> &str {
        &self.reservation.stream
    }

    pub fn handle(&self) -> PollHandle {
        self.reservation.handle()
    }

    /// Run on a background task
    pub fn spawn(self) -> JoinHandle<PollOutcome> {
        tokio::spawn(self.run())
    }

    /// Poll until the task completes, fails or this session is cancelled
    pub async fn run(self) -> PollOutcome {
        let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let token = self.reservation.token.clone();
        let outcome = loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => break PollOutcome::Cancelled,
                _ = ticker.tick() => {}
            }

            let response = self.source.task_status(&self.task_id).await;

            // A newer session may have taken over while the request was in flight
            if token.is_cancelled() {
                break PollOutcome::Cancelled;
            }

            if let Some(outcome) = self.handle_response(response) {
                break outcome;
            }
        };

        self.finish(outcome)
    }

    /// Translate one status response; `Some` means the session is over
    fn handle_response(&self, response: Result<TaskStatus, ApiError>) -> Option<PollOutcome> {
        let status = match response {
            Ok(status) => status,
            Err(e) => {
                let message = match &e {
                    ApiError::Status { .. } => format!("Error getting subtitle status: {}", e),
                    _ => format!("Error polling subtitle status: {}", e),
                };
                return Some(self.fail(message));
            }
        };

        match status.status {
            TaskState::Extracting => match status.progress {
                Some(progress) => {
                    let percent = round_progress(progress);
                    debug!(task_id = %self.task_id, percent, "extracting");
                    self.sink.emit(PollEvent::Progress {
                        task_id: self.task_id.clone(),
                        percent,
                    });
                    None
                }
                None => Some(self.fail(
                    "Error polling subtitle status: extracting status without progress".to_string(),
                )),
            },
            TaskState::Complete => {
                let download_url = self.source.download_url(&self.task_id);
                self.sink.emit(PollEvent::Complete {
                    task_id: self.task_id.clone(),
                    download_url: download_url.clone(),
                });
                Some(PollOutcome::Complete { download_url })
            }
            TaskState::Error => {
                let reason = status.error.as_deref().unwrap_or("unknown error");
                Some(self.fail(format!("Error extracting subtitles: {}", reason)))
            }
            TaskState::Unknown => Some(self.fail(
                "Error polling subtitle status: unrecognised status".to_string(),
            )),
        }
    }

    fn fail(&self, message: String) -> PollOutcome {
        warn!(task_id = %self.task_id, %message, "subtitle extraction failed");
        self.sink.emit(PollEvent::Error {
            task_id: self.task_id.clone(),
            message: message.clone(),
        });
        PollOutcome::Failed { message }
    }

    fn finish(self, outcome: PollOutcome) -> PollOutcome {
        info!(stream = %self.reservation.stream, task_id = %self.task_id, session = %self.reservation.id, ?outcome, "poll session finished");
        // Dropping the reservation frees the slot
        outcome
    }
}
