//! Client for the remote streaming API
//!
//! - client: files, probe, subtitle extraction and status, URL builders
//! - error: failure taxonomy shared by every call

pub mod client;
pub mod error;

pub use client::{ApiHealth, StreamApiClient};
pub use error::ApiError;
