//! Playback-related type definitions

use serde::{Deserialize, Serialize};

/// Playback state enumeration
///
/// Single authoritative value owned by the playback controller.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackState {
    /// Initial and terminal state: nothing scheduled
    #[default]
    Stopped,
    Playing,
    Paused,
}

impl std::fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlaybackState::Stopped => write!(f, "stopped"),
            PlaybackState::Playing => write!(f, "playing"),
            PlaybackState::Paused => write!(f, "paused"),
        }
    }
}

/// Which playback strategy a scheduled source uses
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum HandleKind {
    /// Streaming element, plays while decoding proceeds
    FastStart,
    /// Fully decoded buffer, sample-accurate start/stop
    Precise,
}

impl std::fmt::Display for HandleKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HandleKind::FastStart => write!(f, "fast_start"),
            HandleKind::Precise => write!(f, "precise"),
        }
    }
}
