//! # Segue Audio Player Library (segue-ap)
//!
//! Gapless playback scheduler over a sample-accurate audio clock.
//!
//! **Purpose:** Load tracks, decode them, trim leading silence and schedule
//! each one to start exactly where the previous one stops.
//!
//! **Architecture:** symphonia decoding into an in-process render mixer whose
//! frame counter is the audio clock; cpal pulls rendered audio from the mixer.

pub mod audio;
pub mod config;
pub mod error;
pub mod playback;

pub use config::{HeadStrategy, PlayerConfig};
pub use error::{Error, Result};
pub use playback::PlaybackEngine;
