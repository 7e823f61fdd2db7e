//! Audio output using cpal
//!
//! Opens an output device and lets its callback pull rendered audio from the
//! mixer. The device callback therefore drives the audio clock.

use super::mixer::Mixer;
use crate::error::{Error, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleFormat, Stream, StreamConfig};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Preferred device rate when the device supports it
const PREFERRED_SAMPLE_RATE: u32 = 44100;

/// Audio output manager using cpal.
///
/// `Stream` is not `Send`: keep the `AudioOutput` on the thread that created it.
pub struct AudioOutput {
    device: Device,
    config: StreamConfig,
    sample_format: SampleFormat,
    stream: Option<Stream>,
    /// Stream error flag - set by audio callback on error
    error_flag: Arc<AtomicBool>,
    error_count: Arc<AtomicU32>,
}

impl AudioOutput {
    /// List available audio output devices.
    pub fn list_devices() -> Result<Vec<String>> {
        let host = cpal::default_host();

        let devices: Vec<String> = host
            .output_devices()
            .map_err(|e| Error::AudioOutput(format!("Failed to enumerate devices: {}", e)))?
            .filter_map(|device| device.name().ok())
            .collect();

        debug!("Found {} output devices", devices.len());
        Ok(devices)
    }

    /// Open an audio device for output.
    ///
    /// Falls back to the default device when `device_name` is not found.
    pub fn open(device_name: Option<&str>) -> Result<Self> {
        let host = cpal::default_host();

        let device = match device_name {
            Some(name) => {
                let mut devices = host
                    .output_devices()
                    .map_err(|e| Error::AudioOutput(format!("Failed to enumerate devices: {}", e)))?;

                match devices.find(|d| d.name().ok().as_deref() == Some(name)) {
                    Some(dev) => {
                        info!("Found requested audio device: {}", name);
                        dev
                    }
                    None => {
                        warn!("Requested device '{}' not found, falling back to default device", name);
                        host.default_output_device().ok_or_else(|| {
                            Error::AudioOutput(format!(
                                "Device '{}' not found and no default device available",
                                name
                            ))
                        })?
                    }
                }
            }
            None => host
                .default_output_device()
                .ok_or_else(|| Error::AudioOutput("No default output device found".to_string()))?,
        };

        info!(
            "Using audio device: {}",
            device.name().unwrap_or_else(|_| "Unknown".to_string())
        );

        let (config, sample_format) = Self::get_best_config(&device)?;
        debug!(
            "Audio config: sample_rate={}, channels={}, format={:?}",
            config.sample_rate.0, config.channels, sample_format
        );

        Ok(Self {
            device,
            config,
            sample_format,
            stream: None,
            error_flag: Arc::new(AtomicBool::new(false)),
            error_count: Arc::new(AtomicU32::new(0)),
        })
    }

    /// Get the best supported configuration for playback.
    ///
    /// Prefers 44.1kHz stereo f32, else the device default.
    fn get_best_config(device: &Device) -> Result<(StreamConfig, SampleFormat)> {
        let mut supported_configs = device
            .supported_output_configs()
            .map_err(|e| Error::AudioOutput(format!("Failed to get device configs: {}", e)))?;

        let preferred = supported_configs.find(|config| {
            config.channels() == 2
                && config.min_sample_rate().0 <= PREFERRED_SAMPLE_RATE
                && config.max_sample_rate().0 >= PREFERRED_SAMPLE_RATE
                && config.sample_format() == SampleFormat::F32
        });

        if let Some(supported_config) = preferred {
            let sample_format = supported_config.sample_format();
            let config = supported_config
                .with_sample_rate(cpal::SampleRate(PREFERRED_SAMPLE_RATE))
                .config();
            return Ok((config, sample_format));
        }

        let supported_config = device
            .default_output_config()
            .map_err(|e| Error::AudioOutput(format!("Failed to get default config: {}", e)))?;

        let sample_format = supported_config.sample_format();
        Ok((supported_config.config(), sample_format))
    }

    /// Device sample rate; the mixer must be created at this rate
    pub fn sample_rate(&self) -> u32 {
        self.config.sample_rate.0
    }

    /// Device channel count; the mixer must be created with this many channels
    pub fn channels(&self) -> u16 {
        self.config.channels
    }

    /// Whether the stream reported an error since it was started
    pub fn has_error(&self) -> bool {
        self.error_flag.load(Ordering::SeqCst)
    }

    pub fn error_count(&self) -> u32 {
        self.error_count.load(Ordering::SeqCst)
    }

    /// Start pulling audio from `mixer`.
    pub fn start(&mut self, mixer: Mixer) -> Result<()> {
        if mixer.sample_rate() != self.sample_rate() || mixer.channels() != self.channels() {
            return Err(Error::AudioOutput(format!(
                "Mixer format {} Hz/{} ch does not match device {} Hz/{} ch",
                mixer.sample_rate(),
                mixer.channels(),
                self.sample_rate(),
                self.channels()
            )));
        }

        info!("Starting audio stream");

        let stream = match self.sample_format {
            SampleFormat::F32 => self.build_stream::<f32>(mixer, |s| s)?,
            SampleFormat::I16 => self.build_stream::<i16>(mixer, |s| (s * i16::MAX as f32) as i16)?,
            SampleFormat::U16 => self.build_stream::<u16>(mixer, |s| ((s + 1.0) * 0.5 * u16::MAX as f32) as u16)?,
            sample_format => {
                return Err(Error::AudioOutput(format!(
                    "Unsupported sample format: {:?}",
                    sample_format
                )));
            }
        };

        stream
            .play()
            .map_err(|e| Error::AudioOutput(format!("Failed to start stream: {}", e)))?;

        self.stream = Some(stream);
        info!("Audio stream started successfully");
        Ok(())
    }

    /// Stop the device stream; the mixer clock stops advancing
    pub fn stop(&mut self) {
        if self.stream.take().is_some() {
            info!("Audio stream stopped");
        }
    }

    fn build_stream<T>(&self, mixer: Mixer, convert: fn(f32) -> T) -> Result<Stream>
    where
        T: cpal::SizedSample + Send + 'static,
    {
        let error_flag = Arc::clone(&self.error_flag);
        let error_count = Arc::clone(&self.error_count);
        let mut scratch: Vec<f32> = Vec::new();

        self.device
            .build_output_stream(
                &self.config,
                move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                    scratch.resize(data.len(), 0.0);
                    mixer.render(&mut scratch);
                    for (dest, sample) in data.iter_mut().zip(scratch.iter()) {
                        // Clamp to prevent clipping
                        *dest = convert(sample.clamp(-1.0, 1.0));
                    }
                },
                move |err| {
                    error!("Audio stream error: {}", err);
                    error_flag.store(true, Ordering::SeqCst);
                    error_count.fetch_add(1, Ordering::SeqCst);
                },
                None,
            )
            .map_err(|e| Error::AudioOutput(format!("Failed to build stream: {}", e)))
    }
}
