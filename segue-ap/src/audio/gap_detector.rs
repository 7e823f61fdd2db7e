//! Leading/trailing silence detection
//!
//! A frame counts as audible when any channel holds a non-zero sample.
//! A buffer with no audible frame is treated as fully silent: both gaps equal
//! the full buffer duration.

use super::types::GapMetadata;
use std::time::Duration;

/// Scan planar sample data for leading and trailing silence.
///
/// Pure and deterministic. Mono buffers use their single channel for both
/// scans; multi-channel buffers OR-combine channels per frame.
pub fn detect_gaps(channels: &[Vec<f32>], sample_rate: u32) -> GapMetadata {
    if sample_rate == 0 {
        return GapMetadata::NONE;
    }

    let frames = channels.iter().map(Vec::len).max().unwrap_or(0);
    let to_duration = |frame_count: usize| Duration::from_secs_f64(frame_count as f64 / sample_rate as f64);

    let audible = |frame: usize| {
        channels
            .iter()
            .any(|channel| channel.get(frame).is_some_and(|s| *s != 0.0))
    };

    let first_audible = (0..frames).find(|&frame| audible(frame));
    let Some(first) = first_audible else {
        let full = to_duration(frames);
        return GapMetadata {
            leading_silence: full,
            trailing_silence: full,
        };
    };

    // first_audible exists, so the reverse scan always finds a frame
    let last = (first..frames).rev().find(|&frame| audible(frame)).unwrap_or(first);

    GapMetadata {
        leading_silence: to_duration(first),
        trailing_silence: to_duration(frames - 1 - last),
    }
}
