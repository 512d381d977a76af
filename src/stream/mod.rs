//! Streaming infrastructure
//!
//! - Matcher: pairs a video with its subtitle file
//! - Poller: drives server-side subtitle extraction tasks
//! - Prepare: magnet link to playback plan
//! - Player: VLC/mpv launch

pub mod matcher;
pub mod player;
pub mod poller;
pub mod prepare;

pub use matcher::{find_best_subtitle, find_exact_base_match, find_largest_video};
pub use player::{LaunchError, PlayerLauncher, PlayerType};
pub use poller::{
    ExtractionPoller, PollEvent, PollHandle, PollOutcome, PollSession, Reservation, StatusSource,
};
pub use prepare::{PlaybackPreparer, PrepareError, PrepareEvent, PrepareSink};
