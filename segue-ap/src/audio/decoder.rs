//! Audio decoding using symphonia
//!
//! Decodes encoded bytes (MP3, FLAC, WAV, AAC, Vorbis) to planar f32 samples,
//! either all at once (precise playback) or chunk by chunk (fast-start
//! playback, where the first chunk is audible before the rest is decoded).

use super::types::DecodedAudio;
use crate::error::{Error, Result};
use std::io::Cursor;
use symphonia::core::audio::{AudioBuffer, Signal};
use symphonia::core::codecs::{Decoder as CodecDecoder, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{debug, warn};

/// One decoded chunk: `chunk[channel][frame]`
pub type Chunk = Vec<Vec<f32>>;

/// Turns encoded bytes into decodable sample data
pub trait Decoder: Send + Sync {
    /// Decode the whole input
    fn decode(&self, bytes: &[u8]) -> Result<DecodedAudio>;

    /// Open a progressive decode.
    ///
    /// The default decodes everything up front and yields it as one chunk.
    fn open_stream(&self, bytes: Vec<u8>) -> Result<Box<dyn DecodeStream>> {
        let audio = self.decode(&bytes)?;
        Ok(Box::new(BufferedStream::new(audio)))
    }
}

/// Progressive decode of one track
pub trait DecodeStream: Send {
    fn sample_rate(&self) -> u32;

    fn channel_count(&self) -> usize;

    /// Total duration in seconds, when the container declares it
    fn duration_hint(&self) -> Option<f64>;

    /// Next decoded chunk, `None` at end of stream
    fn next_chunk(&mut self) -> Result<Option<Chunk>>;
}

/// `DecodeStream` over audio that is already fully decoded
pub struct BufferedStream {
    audio: Option<DecodedAudio>,
    sample_rate: u32,
    channel_count: usize,
    duration: f64,
}

impl BufferedStream {
    pub fn new(audio: DecodedAudio) -> Self {
        Self {
            sample_rate: audio.sample_rate,
            channel_count: audio.channel_count(),
            duration: audio.duration_secs,
            audio: Some(audio),
        }
    }
}

impl DecodeStream for BufferedStream {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn channel_count(&self) -> usize {
        self.channel_count
    }

    fn duration_hint(&self) -> Option<f64> {
        Some(self.duration)
    }

    fn next_chunk(&mut self) -> Result<Option<Chunk>> {
        Ok(self.audio.take().map(|audio| audio.channels))
    }
}

/// Decoder backed by symphonia's default format and codec registries
#[derive(Debug, Clone, Copy, Default)]
pub struct SymphoniaDecoder;

impl SymphoniaDecoder {
    pub fn new() -> Self {
        Self
    }
}

impl Decoder for SymphoniaDecoder {
    fn decode(&self, bytes: &[u8]) -> Result<DecodedAudio> {
        let mut stream = SymphoniaStream::open(bytes.to_vec())?;
        let mut channels: Vec<Vec<f32>> = vec![Vec::new(); stream.channel_count()];

        while let Some(chunk) = stream.next_chunk()? {
            for (dest, samples) in channels.iter_mut().zip(chunk) {
                dest.extend(samples);
            }
        }

        let audio = DecodedAudio::new(channels, stream.sample_rate());
        debug!(
            "Decoded {} frames ({:.3}s) at {} Hz",
            audio.frames(),
            audio.duration_secs,
            audio.sample_rate
        );
        Ok(audio)
    }

    fn open_stream(&self, bytes: Vec<u8>) -> Result<Box<dyn DecodeStream>> {
        Ok(Box::new(SymphoniaStream::open(bytes)?))
    }
}

/// Packet-by-packet symphonia decode over an in-memory byte buffer
pub struct SymphoniaStream {
    format: Box<dyn FormatReader>,
    decoder: Box<dyn CodecDecoder>,
    track_id: u32,
    sample_rate: u32,
    channel_count: usize,
    duration_hint: Option<f64>,
}

impl SymphoniaStream {
    pub fn open(bytes: Vec<u8>) -> Result<Self> {
        let mss = MediaSourceStream::new(Box::new(Cursor::new(bytes)), Default::default());

        let probed = symphonia::default::get_probe()
            .format(&Hint::new(), mss, &FormatOptions::default(), &MetadataOptions::default())
            .map_err(|e| Error::Decode(format!("Failed to probe format: {}", e)))?;

        let format = probed.format;

        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| Error::Decode("No audio track found".to_string()))?;

        let track_id = track.id;
        let codec_params = track.codec_params.clone();

        let sample_rate = codec_params
            .sample_rate
            .ok_or_else(|| Error::Decode("Sample rate not found".to_string()))?;

        let channel_count = codec_params
            .channels
            .map(|c| c.count())
            .ok_or_else(|| Error::Decode("Channel count not found".to_string()))?;

        let duration_hint = codec_params
            .n_frames
            .map(|frames| frames as f64 / sample_rate as f64);

        let decoder = symphonia::default::get_codecs()
            .make(&codec_params, &DecoderOptions::default())
            .map_err(|e| Error::Decode(format!("Failed to create decoder: {}", e)))?;

        debug!(
            "Audio format: sample_rate={}, channels={}, duration={:?}",
            sample_rate, channel_count, duration_hint
        );

        Ok(Self {
            format,
            decoder,
            track_id,
            sample_rate,
            channel_count,
            duration_hint,
        })
    }
}

impl DecodeStream for SymphoniaStream {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn channel_count(&self) -> usize {
        self.channel_count
    }

    fn duration_hint(&self) -> Option<f64> {
        self.duration_hint
    }

    fn next_chunk(&mut self) -> Result<Option<Chunk>> {
        loop {
            let packet = match self.format.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(ref e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                    debug!("Reached end of stream");
                    return Ok(None);
                }
                Err(SymphoniaError::ResetRequired) => {
                    warn!("Stream reset required, ending decode");
                    return Ok(None);
                }
                Err(e) => return Err(Error::Decode(format!("Error reading packet: {}", e))),
            };

            // Skip packets for other tracks
            if packet.track_id() != self.track_id {
                continue;
            }

            match self.decoder.decode(&packet) {
                Ok(decoded) => {
                    let mut planar: AudioBuffer<f32> = decoded.make_equivalent();
                    decoded.convert(&mut planar);

                    let chunk: Chunk = (0..self.channel_count)
                        .map(|ch| {
                            if ch < planar.spec().channels.count() {
                                planar.chan(ch).to_vec()
                            } else {
                                vec![0.0; planar.frames()]
                            }
                        })
                        .collect();
                    return Ok(Some(chunk));
                }
                Err(SymphoniaError::DecodeError(e)) => {
                    // Corrupt packet: skip it, keep decoding
                    warn!("Decode error: {}", e);
                    continue;
                }
                Err(e) => return Err(Error::Decode(format!("Decoder failure: {}", e))),
            }
        }
    }
}
