//! Render mixer: the player's audio context
//!
//! Owns every live voice and the shared audio clock. The clock is the number
//! of frames rendered divided by the output rate, so it advances only while
//! the output pulls audio and never while suspended.
//!
//! Voices are scheduled in clock seconds and resolved to whole output frames,
//! which makes back-to-back voices sample-exact: a voice stopping at frame N
//! and a voice starting at frame N never overlap and never leave a gap.
//!
//! Ended callbacks fire at most once per voice, outside the mixer lock, on
//! whichever thread called `render` (the audio callback in production).

use super::clock::AudioClock;
use super::element::{ElementRead, StreamingElement};
use super::types::DecodedAudio;
use rustfft::{num_complex::Complex, Fft, FftPlanner};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use tracing::{debug, trace};

/// Identifier of a voice inside one mixer
pub type VoiceId = u64;

/// Callback fired once when a voice finishes
pub type EndedCallback = Box<dyn FnOnce() + Send + 'static>;

/// What a voice reads its samples from
#[derive(Clone)]
pub enum VoiceSource {
    /// Fully decoded buffer (precise playback)
    Buffer(Arc<DecodedAudio>),
    /// Shared streaming element pinned to one load generation (fast-start playback)
    Element {
        element: Arc<StreamingElement>,
        generation: u64,
    },
}

impl VoiceSource {
    fn sample_rate(&self) -> u32 {
        match self {
            VoiceSource::Buffer(audio) => audio.sample_rate,
            VoiceSource::Element { element, .. } => element.sample_rate(),
        }
    }
}

/// Linear gain with an optional per-frame ramp
#[derive(Debug, Clone, Copy)]
struct GainState {
    value: f32,
    target: f32,
    step: f32,
}

impl GainState {
    fn new(value: f32) -> Self {
        Self {
            value,
            target: value,
            step: 0.0,
        }
    }

    fn set(&mut self, value: f32) {
        self.value = value;
        self.target = value;
        self.step = 0.0;
    }

    fn ramp_to(&mut self, target: f32, frames: u64) {
        if frames == 0 {
            self.set(target);
            return;
        }
        self.target = target;
        self.step = (target - self.value) / frames as f32;
    }

    fn advance(&mut self) {
        if self.step == 0.0 {
            return;
        }
        self.value += self.step;
        if (self.step > 0.0 && self.value >= self.target) || (self.step < 0.0 && self.value <= self.target) {
            self.value = self.target;
            self.step = 0.0;
        }
    }
}

/// Ring of the most recent mono samples a voice produced
struct AnalyserRing {
    samples: Vec<f32>,
    write: usize,
}

impl AnalyserRing {
    fn new(size: usize) -> Self {
        Self {
            samples: vec![0.0; size],
            write: 0,
        }
    }

    fn push(&mut self, sample: f32) {
        self.samples[self.write] = sample;
        self.write = (self.write + 1) % self.samples.len();
    }

    /// Samples in chronological order
    fn ordered(&self) -> Vec<f32> {
        let mut ordered = Vec::with_capacity(self.samples.len());
        ordered.extend_from_slice(&self.samples[self.write..]);
        ordered.extend_from_slice(&self.samples[..self.write]);
        ordered
    }
}

struct Voice {
    source: VoiceSource,
    /// Output frame at which the voice becomes audible
    start_frame: Option<u64>,
    /// Source frame read at `start_frame`
    offset_frames: u64,
    /// Output frame at which the voice goes silent
    stop_frame: Option<u64>,
    gain: GainState,
    analyser: AnalyserRing,
    ended: bool,
    on_ended: Option<EndedCallback>,
}

/// Writes one voice's frames into the interleaved output block
struct VoiceWriter<'a> {
    out: &'a mut [f32],
    out_channels: usize,
    gain: &'a mut GainState,
    analyser: &'a mut AnalyserRing,
}

impl VoiceWriter<'_> {
    fn write(&mut self, out_frame: usize, frame: Option<&[f32]>) {
        let gain = self.gain.value;
        let mut mono = 0.0;
        if let Some(frame) = frame {
            if !frame.is_empty() {
                let base = out_frame * self.out_channels;
                for channel in 0..self.out_channels {
                    // Mono sources feed every output channel
                    let sample = frame[channel.min(frame.len() - 1)] * gain;
                    self.out[base + channel] += sample;
                }
                mono = frame.iter().sum::<f32>() / frame.len() as f32 * gain;
            }
        }
        self.analyser.push(mono);
        self.gain.advance();
    }
}

impl Voice {
    fn render(&mut self, out: &mut [f32], out_channels: usize, block_start: u64, frames: usize, out_rate: u32) {
        let Some(start) = self.start_frame else {
            return;
        };
        if self.ended {
            return;
        }

        let block_end = block_start + frames as u64;
        if let Some(stop) = self.stop_frame {
            if stop <= block_start {
                self.ended = true;
                return;
            }
        }
        if start >= block_end {
            return;
        }

        let first = start.saturating_sub(block_start) as usize;
        let last = match self.stop_frame {
            Some(stop) => (stop.min(block_end) - block_start) as usize,
            None => frames,
        };

        let src_rate = self.source.sample_rate() as u64;
        let offset = self.offset_frames;
        let position = |out_frame: usize| -> usize {
            let elapsed = block_start + out_frame as u64 - start;
            (offset + elapsed * src_rate / out_rate as u64) as usize
        };

        let mut writer = VoiceWriter {
            out,
            out_channels,
            gain: &mut self.gain,
            analyser: &mut self.analyser,
        };

        let exhausted = match &self.source {
            VoiceSource::Buffer(audio) => {
                let total = audio.frames();
                let mut frame = vec![0.0; audio.channel_count()];
                let mut exhausted = false;
                for out_frame in first..last {
                    let pos = position(out_frame);
                    if pos >= total {
                        exhausted = true;
                        break;
                    }
                    for (slot, channel) in frame.iter_mut().zip(audio.channels.iter()) {
                        *slot = channel[pos];
                    }
                    writer.write(out_frame, Some(&frame));
                }
                exhausted
            }
            VoiceSource::Element { element, generation } => {
                let mut out_frame = first;
                let result = element.read_frames(*generation, (first..last).map(position), |frame| {
                    writer.write(out_frame, frame);
                    out_frame += 1;
                    true
                });
                matches!(result, ElementRead::End | ElementRead::Stale)
            }
        };

        let reached_stop = self.stop_frame.is_some_and(|stop| stop <= block_end);
        if exhausted || reached_stop {
            self.ended = true;
        }
    }
}

struct MixerInner {
    sample_rate: u32,
    channels: u16,
    frames_rendered: u64,
    running: bool,
    voices: HashMap<VoiceId, Voice>,
    next_voice_id: VoiceId,
    fft_size: usize,
}

impl MixerInner {
    fn seconds_to_frame(&self, seconds: f64) -> u64 {
        (seconds.max(0.0) * self.sample_rate as f64).round() as u64
    }
}

/// Cloneable handle to the process-wide render mixer
#[derive(Clone)]
pub struct Mixer {
    inner: Arc<Mutex<MixerInner>>,
    fft: Arc<dyn Fft<f32>>,
}

impl fmt::Debug for Mixer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock().unwrap();
        f.debug_struct("Mixer")
            .field("sample_rate", &inner.sample_rate)
            .field("channels", &inner.channels)
            .field("frames_rendered", &inner.frames_rendered)
            .field("running", &inner.running)
            .field("voices", &inner.voices.len())
            .finish()
    }
}

impl Mixer {
    /// Create a mixer rendering `channels` interleaved channels at `sample_rate`.
    ///
    /// `fft_size` is the analyser window length; it must be a power of two.
    pub fn new(sample_rate: u32, channels: u16, fft_size: usize) -> Self {
        let fft = FftPlanner::<f32>::new().plan_fft_forward(fft_size);
        Self {
            inner: Arc::new(Mutex::new(MixerInner {
                sample_rate,
                channels: channels.max(1),
                frames_rendered: 0,
                running: true,
                voices: HashMap::new(),
                next_voice_id: 1,
                fft_size,
            })),
            fft,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.inner.lock().unwrap().sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.inner.lock().unwrap().channels
    }

    /// Frames rendered since creation (the clock in frames)
    pub fn frames_rendered(&self) -> u64 {
        self.inner.lock().unwrap().frames_rendered
    }

    /// Number of voices not yet removed
    pub fn voice_count(&self) -> usize {
        self.inner.lock().unwrap().voices.len()
    }

    /// Register a new, not yet started voice
    pub fn create_voice(&self, source: VoiceSource) -> VoiceId {
        let mut inner = self.inner.lock().unwrap();
        let id = inner.next_voice_id;
        inner.next_voice_id += 1;
        let analyser = AnalyserRing::new(inner.fft_size);
        inner.voices.insert(
            id,
            Voice {
                source,
                start_frame: None,
                offset_frames: 0,
                stop_frame: None,
                gain: GainState::new(1.0),
                analyser,
                ended: false,
                on_ended: None,
            },
        );
        trace!("Created voice {}", id);
        id
    }

    /// Begin playback of `voice` at clock time `at` (seconds), reading from
    /// `offset` seconds into its source. A start time already in the past
    /// starts immediately.
    pub fn start_voice(&self, voice: VoiceId, at: f64, offset: f64) {
        let mut inner = self.inner.lock().unwrap();
        let now = inner.frames_rendered;
        let start = inner.seconds_to_frame(at).max(now);
        if let Some(v) = inner.voices.get_mut(&voice) {
            let src_rate = v.source.sample_rate() as f64;
            v.offset_frames = (offset.max(0.0) * src_rate).round() as u64;
            v.start_frame = Some(start);
            debug!("Voice {} starts at frame {} (offset {} frames)", voice, start, v.offset_frames);
        }
    }

    /// Schedule `voice` to go silent at clock time `at` (seconds)
    pub fn stop_voice_at(&self, voice: VoiceId, at: f64) {
        let mut inner = self.inner.lock().unwrap();
        let stop = inner.seconds_to_frame(at);
        if let Some(v) = inner.voices.get_mut(&voice) {
            v.stop_frame = Some(stop);
            debug!("Voice {} stops at frame {}", voice, stop);
        }
    }

    /// Silence `voice` immediately. The ended callback is dropped, not fired.
    pub fn stop_voice_now(&self, voice: VoiceId) {
        let mut inner = self.inner.lock().unwrap();
        let now = inner.frames_rendered;
        if let Some(v) = inner.voices.get_mut(&voice) {
            v.stop_frame = Some(now);
            v.ended = true;
            v.on_ended = None;
        }
    }

    /// Register the callback fired when `voice` ends
    pub fn set_ended_callback(&self, voice: VoiceId, callback: EndedCallback) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(v) = inner.voices.get_mut(&voice) {
            v.on_ended = Some(callback);
        }
    }

    /// Drop `voice` and everything it owns
    pub fn remove_voice(&self, voice: VoiceId) {
        let mut inner = self.inner.lock().unwrap();
        if inner.voices.remove(&voice).is_some() {
            trace!("Removed voice {}", voice);
        }
    }

    pub fn voice_ended(&self, voice: VoiceId) -> bool {
        let inner = self.inner.lock().unwrap();
        inner.voices.get(&voice).map(|v| v.ended).unwrap_or(true)
    }

    fn set_gain(&self, voice: VoiceId, value: f32) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(v) = inner.voices.get_mut(&voice) {
            v.gain.set(value);
        }
    }

    fn ramp_gain(&self, voice: VoiceId, value: f32, seconds: f64) {
        let mut inner = self.inner.lock().unwrap();
        let frames = inner.seconds_to_frame(seconds);
        if let Some(v) = inner.voices.get_mut(&voice) {
            v.gain.ramp_to(value, frames);
        }
    }

    fn gain_value(&self, voice: VoiceId) -> Option<(f32, f32)> {
        let inner = self.inner.lock().unwrap();
        inner.voices.get(&voice).map(|v| (v.gain.value, v.gain.target))
    }

    fn analyser_samples(&self, voice: VoiceId) -> Option<Vec<f32>> {
        let inner = self.inner.lock().unwrap();
        inner.voices.get(&voice).map(|v| v.analyser.ordered())
    }

    /// Fill `out` (interleaved, `channels()` wide) and advance the clock.
    ///
    /// While suspended the block is silent and the clock does not move.
    pub fn render(&self, out: &mut [f32]) {
        out.fill(0.0);
        let mut fired = Vec::new();
        {
            let mut guard = self.inner.lock().unwrap();
            let inner = &mut *guard;
            if !inner.running {
                return;
            }
            let out_channels = inner.channels as usize;
            let frames = out.len() / out_channels;
            let block_start = inner.frames_rendered;

            for voice in inner.voices.values_mut() {
                voice.render(out, out_channels, block_start, frames, inner.sample_rate);
                if voice.ended {
                    if let Some(callback) = voice.on_ended.take() {
                        fired.push(callback);
                    }
                }
            }
            inner.frames_rendered += frames as u64;
        }
        for callback in fired {
            callback();
        }
    }

    /// Render and discard `frames` frames (headless playback and tests)
    pub fn advance(&self, frames: usize) {
        let channels = self.channels() as usize;
        let mut scratch = vec![0.0; frames * channels];
        self.render(&mut scratch);
    }

    fn spectrum(&self, voice: VoiceId) -> Vec<f32> {
        let Some(samples) = self.analyser_samples(voice) else {
            return Vec::new();
        };
        let size = samples.len();
        if size < 2 {
            return Vec::new();
        }

        // Hann window
        let mut buffer: Vec<Complex<f32>> = samples
            .iter()
            .enumerate()
            .map(|(i, s)| {
                let w = 0.5 * (1.0 - (2.0 * std::f32::consts::PI * i as f32 / (size as f32 - 1.0)).cos());
                Complex::new(s * w, 0.0)
            })
            .collect();

        self.fft.process(&mut buffer);

        buffer[..size / 2].iter().map(|c| c.norm() / size as f32).collect()
    }
}

impl AudioClock for Mixer {
    fn now(&self) -> f64 {
        let inner = self.inner.lock().unwrap();
        inner.frames_rendered as f64 / inner.sample_rate as f64
    }

    fn suspend(&self) {
        let mut inner = self.inner.lock().unwrap();
        if inner.running {
            debug!("Audio clock suspended at frame {}", inner.frames_rendered);
            inner.running = false;
        }
    }

    fn resume(&self) {
        let mut inner = self.inner.lock().unwrap();
        if !inner.running {
            debug!("Audio clock resumed at frame {}", inner.frames_rendered);
            inner.running = true;
        }
    }

    fn is_running(&self) -> bool {
        self.inner.lock().unwrap().running
    }
}

/// Gain control owned by one scheduled source
///
/// Inert once the voice has been released.
#[derive(Clone, Debug)]
pub struct GainControl {
    mixer: Mixer,
    voice: VoiceId,
}

impl GainControl {
    pub(crate) fn new(mixer: Mixer, voice: VoiceId) -> Self {
        Self { mixer, voice }
    }

    /// Apply `value` immediately
    pub fn set(&self, value: f32) {
        self.mixer.set_gain(self.voice, value);
    }

    /// Ramp linearly to `value` over `seconds` of rendered audio
    pub fn ramp_to(&self, value: f32, seconds: f64) {
        self.mixer.ramp_gain(self.voice, value, seconds);
    }

    /// Current gain (None once released)
    pub fn value(&self) -> Option<f32> {
        self.mixer.gain_value(self.voice).map(|(value, _)| value)
    }

    /// Gain the voice is ramping towards (equals `value()` when idle)
    pub fn target(&self) -> Option<f32> {
        self.mixer.gain_value(self.voice).map(|(_, target)| target)
    }
}

/// Frequency-domain tap on one scheduled source
#[derive(Clone, Debug)]
pub struct AnalyserTap {
    mixer: Mixer,
    voice: VoiceId,
}

impl AnalyserTap {
    pub(crate) fn new(mixer: Mixer, voice: VoiceId) -> Self {
        Self { mixer, voice }
    }

    /// Magnitudes of the last `fft_size` samples, `fft_size / 2` bins.
    /// Empty once the voice has been released.
    pub fn snapshot(&self) -> Vec<f32> {
        self.mixer.spectrum(self.voice)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RATE: u32 = 1000;

    fn buffer(frames: usize, value: f32) -> VoiceSource {
        VoiceSource::Buffer(Arc::new(DecodedAudio::new(vec![vec![value; frames]], RATE)))
    }

    fn ended_flag(mixer: &Mixer, voice: VoiceId) -> Arc<std::sync::atomic::AtomicUsize> {
        let count = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let c = Arc::clone(&count);
        mixer.set_ended_callback(
            voice,
            Box::new(move || {
                c.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            }),
        );
        count
    }

    #[test]
    fn test_clock_advances_only_while_running() {
        let mixer = Mixer::new(RATE, 2, 64);
        mixer.advance(500);
        assert_eq!(mixer.now(), 0.5);

        mixer.suspend();
        mixer.advance(500);
        assert_eq!(mixer.now(), 0.5);
        assert!(!mixer.is_running());

        mixer.resume();
        mixer.advance(250);
        assert_eq!(mixer.now(), 0.75);
    }

    #[test]
    fn test_back_to_back_voices_have_no_gap_or_overlap() {
        let mixer = Mixer::new(RATE, 1, 64);
        let a = mixer.create_voice(buffer(100, 0.5));
        let b = mixer.create_voice(buffer(100, 0.25));
        mixer.start_voice(a, 0.0, 0.0);
        mixer.stop_voice_at(a, 0.05);
        mixer.start_voice(b, 0.05, 0.0);
        mixer.stop_voice_at(b, 0.1);

        let mut out = vec![0.0; 120];
        mixer.render(&mut out);

        assert!(out[..50].iter().all(|s| *s == 0.5));
        assert!(out[50..100].iter().all(|s| *s == 0.25));
        assert!(out[100..].iter().all(|s| *s == 0.0));
    }

    #[test]
    fn test_offset_trims_source_start() {
        let mixer = Mixer::new(RATE, 1, 64);
        let mut samples = vec![0.0; 10];
        samples.extend(vec![1.0; 10]);
        let voice = mixer.create_voice(VoiceSource::Buffer(Arc::new(DecodedAudio::new(vec![samples], RATE))));
        mixer.start_voice(voice, 0.0, 0.01);

        let mut out = vec![0.0; 10];
        mixer.render(&mut out);
        assert!(out.iter().all(|s| *s == 1.0));
    }

    #[test]
    fn test_ended_fires_once_at_stop_frame() {
        let mixer = Mixer::new(RATE, 1, 64);
        let voice = mixer.create_voice(buffer(1000, 0.1));
        let fired = ended_flag(&mixer, voice);
        mixer.start_voice(voice, 0.0, 0.0);
        mixer.stop_voice_at(voice, 0.2);

        mixer.advance(199);
        assert_eq!(fired.load(std::sync::atomic::Ordering::SeqCst), 0);
        mixer.advance(1);
        assert_eq!(fired.load(std::sync::atomic::Ordering::SeqCst), 1);
        mixer.advance(100);
        assert_eq!(fired.load(std::sync::atomic::Ordering::SeqCst), 1);
        assert!(mixer.voice_ended(voice));
    }

    #[test]
    fn test_ended_fires_when_buffer_exhausted() {
        let mixer = Mixer::new(RATE, 1, 64);
        let voice = mixer.create_voice(buffer(10, 0.1));
        let fired = ended_flag(&mixer, voice);
        mixer.start_voice(voice, 0.0, 0.0);
        mixer.advance(20);
        assert_eq!(fired.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[test]
    fn test_stop_now_drops_callback() {
        let mixer = Mixer::new(RATE, 1, 64);
        let voice = mixer.create_voice(buffer(100, 0.1));
        let fired = ended_flag(&mixer, voice);
        mixer.start_voice(voice, 0.0, 0.0);
        mixer.advance(10);
        mixer.stop_voice_now(voice);
        mixer.advance(100);
        assert_eq!(fired.load(std::sync::atomic::Ordering::SeqCst), 0);
    }

    #[test]
    fn test_late_start_begins_immediately() {
        let mixer = Mixer::new(RATE, 1, 64);
        mixer.advance(100);
        let voice = mixer.create_voice(buffer(100, 0.5));
        mixer.start_voice(voice, 0.05, 0.0);

        let mut out = vec![0.0; 10];
        mixer.render(&mut out);
        assert!(out.iter().all(|s| *s == 0.5));
    }

    #[test]
    fn test_mono_source_feeds_both_output_channels() {
        let mixer = Mixer::new(RATE, 2, 64);
        let voice = mixer.create_voice(buffer(10, 0.3));
        mixer.start_voice(voice, 0.0, 0.0);

        let mut out = vec![0.0; 20];
        mixer.render(&mut out);
        assert!(out.iter().all(|s| (*s - 0.3).abs() < 1e-6));
    }

    #[test]
    fn test_gain_ramp_reaches_target() {
        let mixer = Mixer::new(RATE, 1, 64);
        let voice = mixer.create_voice(buffer(1000, 1.0));
        mixer.start_voice(voice, 0.0, 0.0);
        let gain = GainControl::new(mixer.clone(), voice);

        gain.ramp_to(0.0, 0.1);
        assert_eq!(gain.target(), Some(0.0));
        mixer.advance(50);
        let midway = gain.value().unwrap();
        assert!(midway > 0.4 && midway < 0.6, "midway gain was {}", midway);
        mixer.advance(60);
        assert_eq!(gain.value(), Some(0.0));

        mixer.remove_voice(voice);
        assert_eq!(gain.value(), None);
    }

    #[test]
    fn test_element_voice_underrun_does_not_end() {
        let mixer = Mixer::new(RATE, 1, 64);
        let element = Arc::new(StreamingElement::new());
        let generation = element.begin_load(RATE, 1, Some(0.1));
        element.append(generation, vec![vec![0.5; 10]]);

        let voice = mixer.create_voice(VoiceSource::Element {
            element: Arc::clone(&element),
            generation,
        });
        let fired = ended_flag(&mixer, voice);
        mixer.start_voice(voice, 0.0, 0.0);

        let mut out = vec![0.0; 20];
        mixer.render(&mut out);
        assert!(out[..10].iter().all(|s| *s == 0.5));
        assert!(out[10..].iter().all(|s| *s == 0.0));
        assert_eq!(fired.load(std::sync::atomic::Ordering::SeqCst), 0);

        element.finish(generation);
        mixer.advance(1);
        assert_eq!(fired.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[test]
    fn test_analyser_snapshot_has_half_window_bins() {
        let mixer = Mixer::new(RATE, 1, 64);
        let samples: Vec<f32> = (0..200).map(|i| (i as f32 * 0.5).sin()).collect();
        let voice = mixer.create_voice(VoiceSource::Buffer(Arc::new(DecodedAudio::new(vec![samples], RATE))));
        mixer.start_voice(voice, 0.0, 0.0);
        mixer.advance(100);

        let tap = AnalyserTap::new(mixer.clone(), voice);
        let spectrum = tap.snapshot();
        assert_eq!(spectrum.len(), 32);
        assert!(spectrum.iter().any(|m| *m > 0.0));

        mixer.remove_voice(voice);
        assert!(tap.snapshot().is_empty());
    }
}
