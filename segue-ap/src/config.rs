//! Configuration for the segue-ap audio player
//!
//! Settings are loaded from a TOML file (see `segue_common::config` for how
//! the file is located) and may be overridden by command-line flags.
//! Every key is optional; missing keys take the built-in defaults below.
//!
//! ```toml
//! volume = 0.8
//! head_strategy = "fast_start"
//! first_handoff_epsilon_secs = 0.1
//! pause_settle_ms = 100
//! progress_interval_ms = 200
//!
//! [logging]
//! level = "debug"
//! ```

use crate::error::Result;
use segue_common::config::{load_or_default, CONFIG_ENV_VAR};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

/// How the first track of a freshly started queue is loaded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum HeadStrategy {
    /// Streaming element: first sound as soon as the first chunk decodes,
    /// no silence trimming
    #[default]
    FastStart,
    /// Full decode and silence trimming before the first sound
    Precise,
}

/// Player configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    /// Initial master volume (0.0-1.0)
    pub volume: f32,

    /// Loading strategy for the head of a fresh queue
    pub head_strategy: HeadStrategy,

    /// Subtracted from the stop time of the first source of a fresh queue.
    /// Tunable; set to 0.0 for backends without early ended notifications.
    pub first_handoff_epsilon_secs: f64,

    /// Gain ramp + settle time before the clock is suspended on pause
    pub pause_settle_ms: u64,

    /// Gain ramp length when resuming from pause
    pub resume_ramp_ms: u64,

    /// Cadence of the progress stream
    pub progress_interval_ms: u64,

    /// Cadence of the spectrum stream
    pub spectrum_interval_ms: u64,

    /// Analyser window length (power of two)
    pub fft_size: usize,

    /// Event bus buffer size
    pub event_capacity: usize,

    /// Output device name (None = system default)
    pub audio_device: Option<String>,

    /// Folder that relative track references resolve against
    pub root_folder: Option<PathBuf>,

    pub logging: LoggingConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log filter (trace, debug, info, warn, error, or a full EnvFilter directive)
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            volume: 0.75,
            head_strategy: HeadStrategy::FastStart,
            first_handoff_epsilon_secs: 0.1,
            pause_settle_ms: 100,
            resume_ramp_ms: 20,
            progress_interval_ms: 200,
            spectrum_interval_ms: 50,
            fft_size: 2048,
            event_capacity: 100,
            audio_device: None,
            root_folder: None,
            logging: LoggingConfig::default(),
        }
    }
}

impl PlayerConfig {
    /// Load from `cli_path`, `$SEGUE_CONFIG` or the per-user config file,
    /// falling back to defaults when none is configured
    pub fn load(cli_path: Option<&Path>) -> Result<Self> {
        let config: PlayerConfig = load_or_default(cli_path, CONFIG_ENV_VAR)?;
        Ok(config)
    }

    /// Clamp out-of-range values to something the engine can run with
    pub fn validated(mut self) -> Self {
        if !(0.0..=1.0).contains(&self.volume) {
            warn!("volume {} out of range, clamping", self.volume);
            self.volume = self.volume.clamp(0.0, 1.0);
        }
        if self.first_handoff_epsilon_secs < 0.0 {
            warn!("first_handoff_epsilon_secs must not be negative, using 0");
            self.first_handoff_epsilon_secs = 0.0;
        }
        if !self.fft_size.is_power_of_two() || self.fft_size < 32 {
            warn!("fft_size {} is not a power of two >= 32, using 2048", self.fft_size);
            self.fft_size = 2048;
        }
        self.progress_interval_ms = self.progress_interval_ms.max(10);
        self.spectrum_interval_ms = self.spectrum_interval_ms.max(10);
        self.event_capacity = self.event_capacity.max(1);
        self
    }

    pub fn pause_settle(&self) -> Duration {
        Duration::from_millis(self.pause_settle_ms)
    }

    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms)
    }

    pub fn spectrum_interval(&self) -> Duration {
        Duration::from_millis(self.spectrum_interval_ms)
    }
}
