//! # Segue Common Library
//!
//! Shared code for the segue workspace:
//! - Error type shared by configuration and event plumbing
//! - Event types (`SegueEvent`, `PlaybackState`) and the broadcast `EventBus`
//! - Configuration file resolution and TOML loading
//! - Human-readable time formatting for logs and the CLI

pub mod config;
pub mod error;
pub mod events;
pub mod human_time;
pub mod track;

pub use error::{Error, Result};
pub use track::TrackRef;
