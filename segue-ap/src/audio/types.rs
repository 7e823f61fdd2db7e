//! Core audio data types

use std::time::Duration;

/// Fully decoded audio, one sample vector per channel.
///
/// **Format:**
/// - Samples are f32 (floating point -1.0 to 1.0)
/// - Planar: `channels[c][frame]`
/// - All channels have the same length
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedAudio {
    pub channels: Vec<Vec<f32>>,
    pub sample_rate: u32,
    pub duration_secs: f64,
}

impl DecodedAudio {
    /// Build from planar channel data; duration is derived from the frame count
    pub fn new(channels: Vec<Vec<f32>>, sample_rate: u32) -> Self {
        let frames = channels.first().map(Vec::len).unwrap_or(0);
        let duration_secs = if sample_rate == 0 {
            0.0
        } else {
            frames as f64 / sample_rate as f64
        };
        Self {
            channels,
            sample_rate,
            duration_secs,
        }
    }

    /// Number of frames (samples per channel)
    pub fn frames(&self) -> usize {
        self.channels.first().map(Vec::len).unwrap_or(0)
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }
}

/// Leading/trailing silence of a loaded track.
///
/// Computed once at load time, immutable thereafter.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct GapMetadata {
    pub leading_silence: Duration,
    pub trailing_silence: Duration,
}

impl GapMetadata {
    /// No trimming (used by fast-start loads)
    pub const NONE: GapMetadata = GapMetadata {
        leading_silence: Duration::ZERO,
        trailing_silence: Duration::ZERO,
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duration_from_frames() {
        let audio = DecodedAudio::new(vec![vec![0.0; 22050], vec![0.0; 22050]], 44100);
        assert_eq!(audio.frames(), 22050);
        assert_eq!(audio.channel_count(), 2);
        assert!((audio.duration_secs - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_empty_audio() {
        let audio = DecodedAudio::new(Vec::new(), 44100);
        assert_eq!(audio.frames(), 0);
        assert_eq!(audio.duration_secs, 0.0);
    }
}
