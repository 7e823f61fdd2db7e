//! WAV fixture generation
//!
//! Writes mono 16-bit WAV files made of leading silence, an audible square
//! wave and trailing silence, so decoded gap lengths are known exactly.

use hound::{WavSpec, WavWriter};
use std::path::Path;

/// Square wave amplitude; never zero, so every body frame is audible
const AMPLITUDE: i16 = 8000;

/// Write `leading` silent frames, `body` audible frames and `trailing`
/// silent frames at `sample_rate`.
pub fn write_padded_wav<P: AsRef<Path>>(
    path: P,
    sample_rate: u32,
    leading: usize,
    body: usize,
    trailing: usize,
) -> Result<(), hound::Error> {
    let spec = WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = WavWriter::create(path, spec)?;

    for _ in 0..leading {
        writer.write_sample(0i16)?;
    }
    for i in 0..body {
        let sample = if (i / 10) % 2 == 0 { AMPLITUDE } else { -AMPLITUDE };
        writer.write_sample(sample)?;
    }
    for _ in 0..trailing {
        writer.write_sample(0i16)?;
    }

    writer.finalize()
}
