//! Error types for segue-ap
//!
//! Load errors are recoverable and surface to the caller of the command that
//! triggered the load. Stale (fenced) operations are not errors. Handle misuse
//! is a scheduler invariant violation and panics instead of being returned.

use segue_common::TrackRef;
use thiserror::Error;

/// Main error type for segue-ap
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration loading errors
    #[error("Configuration error: {0}")]
    Config(#[from] segue_common::Error),

    /// Track source could not find the requested track
    #[error("Track not found: {0}")]
    TrackNotFound(TrackRef),

    /// Track source failed while reading bytes
    #[error("Fetch error for {track}: {source}")]
    Fetch {
        track: TrackRef,
        #[source]
        source: std::io::Error,
    },

    /// Audio decoding errors
    #[error("Audio decode error: {0}")]
    Decode(String),

    /// Fetch or decode failed while loading a track for scheduling
    #[error("Failed to load {track}: {reason}")]
    Load { track: TrackRef, reason: String },

    /// Load abandoned because the fence was raised while it was in flight
    #[error("Load cancelled: {0}")]
    Cancelled(TrackRef),

    /// Audio output device errors
    #[error("Audio output error: {0}")]
    AudioOutput(String),

    /// Invalid state for operation
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Other errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether this error came out of fetching/decoding a track.
    ///
    /// Load failures leave current playback untouched and may be retried
    /// or skipped by the caller.
    pub fn is_load_error(&self) -> bool {
        matches!(
            self,
            Error::TrackNotFound(_) | Error::Fetch { .. } | Error::Decode(_) | Error::Load { .. }
        )
    }
}

/// Convenience Result type using segue-ap Error
pub type Result<T> = std::result::Result<T, Error>;
