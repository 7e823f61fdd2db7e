//! Synthetic track backend and a manually clocked test player
//!
//! Tracks are registered in a `MockLibrary` by name with a duration and a
//! leading-silence length. `MockSource` serves them (counting fetches and
//! optionally holding them at a gate); `MockDecoder` turns them into 1 kHz
//! mono buffers. The mixer never runs on its own: tests move the clock with
//! `advance_to`.

use async_trait::async_trait;
use segue_ap::audio::{AudioClock, DecodedAudio, Decoder, Mixer, TrackSource};
use segue_ap::config::{HeadStrategy, PlayerConfig};
use segue_ap::{Error, PlaybackEngine, Result};
use segue_common::events::PlaybackState;
use segue_common::TrackRef;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;

/// Sample rate of every synthetic track and of the test mixer
pub const RATE: u32 = 1000;

#[derive(Debug, Clone, Copy)]
struct SyntheticTrack {
    frames: usize,
    leading: usize,
}

/// Named synthetic tracks shared by the mock source and decoder
#[derive(Default)]
pub struct MockLibrary {
    tracks: Mutex<HashMap<String, SyntheticTrack>>,
}

impl MockLibrary {
    /// Register `name`: `duration_secs` long, silent for its first `leading_secs`
    pub fn add(&self, name: &str, duration_secs: f64, leading_secs: f64) -> TrackRef {
        let frames = (duration_secs * RATE as f64).round() as usize;
        let leading = ((leading_secs * RATE as f64).round() as usize).min(frames);
        self.tracks
            .lock()
            .unwrap()
            .insert(name.to_string(), SyntheticTrack { frames, leading });
        TrackRef::new(name)
    }

    fn get(&self, track: &TrackRef) -> Option<SyntheticTrack> {
        self.tracks.lock().unwrap().get(track.as_str()).copied()
    }
}

/// Track source over a `MockLibrary`; unknown names are not found
pub struct MockSource {
    library: Arc<MockLibrary>,
    fetches: AtomicUsize,
    gate: watch::Sender<bool>,
}

impl MockSource {
    pub fn new(library: Arc<MockLibrary>) -> Self {
        let (gate, _) = watch::channel(true);
        Self {
            library,
            fetches: AtomicUsize::new(0),
            gate,
        }
    }

    /// Number of fetches issued so far (including ones held at the gate)
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    /// Hold every fetch until `open_gate`
    pub fn close_gate(&self) {
        self.gate.send_replace(false);
    }

    pub fn open_gate(&self) {
        self.gate.send_replace(true);
    }
}

#[async_trait]
impl TrackSource for MockSource {
    async fn fetch(&self, track: &TrackRef) -> Result<Vec<u8>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);

        let mut gate = self.gate.subscribe();
        if gate.wait_for(|open| *open).await.is_err() {
            return Err(Error::Internal("gate dropped".to_string()));
        }

        let spec = self
            .library
            .get(track)
            .ok_or_else(|| Error::TrackNotFound(track.clone()))?;
        Ok(format!("{}:{}", spec.frames, spec.leading).into_bytes())
    }
}

/// Decodes `frames:leading` into a 1 kHz mono buffer
#[derive(Default)]
pub struct MockDecoder {
    decodes: AtomicUsize,
}

impl MockDecoder {
    pub fn decode_count(&self) -> usize {
        self.decodes.load(Ordering::SeqCst)
    }
}

impl Decoder for MockDecoder {
    fn decode(&self, bytes: &[u8]) -> Result<DecodedAudio> {
        self.decodes.fetch_add(1, Ordering::SeqCst);

        let text = std::str::from_utf8(bytes).map_err(|e| Error::Decode(e.to_string()))?;
        let (frames, leading) = text
            .split_once(':')
            .and_then(|(f, l)| Some((f.parse::<usize>().ok()?, l.parse::<usize>().ok()?)))
            .ok_or_else(|| Error::Decode(format!("Not a synthetic track: {}", text)))?;

        let mut samples = vec![0.0; leading];
        samples.resize(frames, 0.5);
        Ok(DecodedAudio::new(vec![samples], RATE))
    }
}

/// Short timings so pause/progress tests run quickly
pub fn test_config(head_strategy: HeadStrategy) -> PlayerConfig {
    PlayerConfig {
        head_strategy,
        volume: 1.0,
        pause_settle_ms: 10,
        resume_ramp_ms: 5,
        progress_interval_ms: 10,
        spectrum_interval_ms: 10,
        fft_size: 64,
        ..Default::default()
    }
}

/// Poll `check` every 5ms for up to two seconds
pub async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..400 {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    false
}

/// Engine wired to mocks and a manually driven mixer
pub struct TestPlayer {
    pub engine: PlaybackEngine,
    pub mixer: Mixer,
    pub library: Arc<MockLibrary>,
    pub source: Arc<MockSource>,
    pub decoder: Arc<MockDecoder>,
}

impl TestPlayer {
    pub fn new(config: PlayerConfig) -> Self {
        let library = Arc::new(MockLibrary::default());
        let source = Arc::new(MockSource::new(Arc::clone(&library)));
        let decoder = Arc::new(MockDecoder::default());
        let mixer = Mixer::new(RATE, 1, config.fft_size);
        let engine = PlaybackEngine::new(
            config,
            mixer.clone(),
            Arc::clone(&source) as Arc<dyn TrackSource>,
            Arc::clone(&decoder) as Arc<dyn Decoder>,
        );
        Self {
            engine,
            mixer,
            library,
            source,
            decoder,
        }
    }

    pub fn precise() -> Self {
        Self::new(test_config(HeadStrategy::Precise))
    }

    pub fn track(&self, name: &str, duration_secs: f64, leading_secs: f64) -> TrackRef {
        self.library.add(name, duration_secs, leading_secs)
    }

    /// Render until the clock has reached `clock` seconds
    pub fn advance_to(&self, clock: f64) {
        let target = (clock * RATE as f64).ceil() as u64;
        let rendered = self.mixer.frames_rendered();
        if target > rendered {
            self.mixer.advance((target - rendered) as usize);
        }
    }

    /// Render just past the head's scheduled stop
    pub async fn finish_head(&self) {
        let head = self.engine.run_queue().await;
        let stop = head.first().expect("no head to finish").stop_clock;
        self.advance_to(stop + 0.002);
    }

    pub async fn wait_for_state(&self, state: PlaybackState) -> bool {
        let engine = &self.engine;
        eventually(|| async move { engine.state().await == state }).await
    }

    pub async fn wait_for_depth(&self, depth: usize) -> bool {
        let engine = &self.engine;
        eventually(|| async move { engine.run_queue().await.len() == depth }).await
    }

    pub async fn wait_for_head(&self, track: &TrackRef) -> bool {
        let engine = &self.engine;
        eventually(|| async move { engine.current_track().await.as_ref() == Some(track) }).await
    }

    pub fn clock(&self) -> f64 {
        self.mixer.now()
    }
}
