//! Audio backend: decoding, track sources, the render mixer and device output

pub mod clock;
pub mod decoder;
pub mod element;
pub mod gap_detector;
pub mod mixer;
pub mod output;
pub mod source;
pub mod types;

pub use clock::AudioClock;
pub use decoder::{DecodeStream, Decoder, SymphoniaDecoder};
pub use element::StreamingElement;
pub use gap_detector::detect_gaps;
pub use mixer::{AnalyserTap, GainControl, Mixer, VoiceId, VoiceSource};
pub use output::AudioOutput;
pub use source::{FileTrackSource, TrackSource};
pub use types::{DecodedAudio, GapMetadata};
