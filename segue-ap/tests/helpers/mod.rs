//! Test helper modules for segue-ap integration tests
//!
//! Provides reusable test infrastructure components:
//! - MockLibrary / MockSource / MockDecoder: synthetic tracks with load counting and gating
//! - TestPlayer: engine wired to a manually driven 1 kHz mixer
//! - audio_generator: WAV fixtures for the symphonia decoder

#![allow(dead_code)]

pub mod audio_generator;
pub mod mock_backend;

pub use mock_backend::{eventually, test_config, MockDecoder, MockLibrary, MockSource, TestPlayer, RATE};
