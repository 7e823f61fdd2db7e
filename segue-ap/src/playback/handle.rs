//! Playback handles: one voice in the mixer, two playback strategies
//!
//! Both strategies expose the same method set. A fast-start element has no
//! stop of its own, so its scheduled stop is an immediate stop the mixer
//! applies on the owner's behalf at the stop frame. Misuse (starting twice,
//! scheduling a second stop) is a scheduler bug and panics. Releasing consumes
//! the handle, so a released handle cannot be touched again; dropping an
//! unreleased handle releases it as well.

use crate::audio::element::StreamingElement;
use crate::audio::mixer::{AnalyserTap, EndedCallback, GainControl, Mixer, VoiceId, VoiceSource};
use crate::audio::types::DecodedAudio;
use segue_common::events::HandleKind;
use std::sync::Arc;
use tracing::trace;

/// Mixer voice plus the bookkeeping both strategies share
#[derive(Debug)]
struct VoiceHandle {
    mixer: Mixer,
    voice: VoiceId,
    duration: f64,
    started: bool,
    stop_scheduled: bool,
}

impl VoiceHandle {
    fn new(mixer: &Mixer, source: VoiceSource, duration: f64) -> Self {
        let voice = mixer.create_voice(source);
        Self {
            mixer: mixer.clone(),
            voice,
            duration,
            started: false,
            stop_scheduled: false,
        }
    }

    fn start(&mut self, at: f64, offset: f64) {
        assert!(!self.started, "voice {} started twice", self.voice);
        self.started = true;
        self.mixer.start_voice(self.voice, at, offset);
    }

    fn stop_at(&mut self, at: f64) {
        assert!(self.started, "voice {} stop scheduled before start", self.voice);
        assert!(!self.stop_scheduled, "voice {} stop scheduled twice", self.voice);
        self.stop_scheduled = true;
        self.mixer.stop_voice_at(self.voice, at);
    }
}

impl Drop for VoiceHandle {
    fn drop(&mut self) {
        self.mixer.remove_voice(self.voice);
    }
}

/// Streaming-element playback: audible before decoding finishes
#[derive(Debug)]
pub struct FastStartHandle {
    inner: VoiceHandle,
}

/// Decoded-buffer playback: sample-accurate scheduled start and stop
#[derive(Debug)]
pub struct PreciseHandle {
    inner: VoiceHandle,
}

/// A playable track, owned by exactly one scheduled source until released
#[derive(Debug)]
pub enum PlaybackHandle {
    FastStart(FastStartHandle),
    Precise(PreciseHandle),
}

impl PlaybackHandle {
    /// Precise handle over fully decoded audio
    pub fn precise(mixer: &Mixer, audio: Arc<DecodedAudio>) -> Self {
        let duration = audio.duration_secs;
        PlaybackHandle::Precise(PreciseHandle {
            inner: VoiceHandle::new(mixer, VoiceSource::Buffer(audio), duration),
        })
    }

    /// Fast-start handle reading `generation` of the shared element
    pub fn fast_start(mixer: &Mixer, element: Arc<StreamingElement>, generation: u64, duration: f64) -> Self {
        PlaybackHandle::FastStart(FastStartHandle {
            inner: VoiceHandle::new(mixer, VoiceSource::Element { element, generation }, duration),
        })
    }

    fn voice_handle(&self) -> &VoiceHandle {
        match self {
            PlaybackHandle::FastStart(h) => &h.inner,
            PlaybackHandle::Precise(h) => &h.inner,
        }
    }

    fn voice_handle_mut(&mut self) -> &mut VoiceHandle {
        match self {
            PlaybackHandle::FastStart(h) => &mut h.inner,
            PlaybackHandle::Precise(h) => &mut h.inner,
        }
    }

    pub fn kind(&self) -> HandleKind {
        match self {
            PlaybackHandle::FastStart(_) => HandleKind::FastStart,
            PlaybackHandle::Precise(_) => HandleKind::Precise,
        }
    }

    /// Full track duration in seconds
    pub fn duration(&self) -> f64 {
        self.voice_handle().duration
    }

    pub fn voice(&self) -> VoiceId {
        self.voice_handle().voice
    }

    /// Begin playback at clock time `at`, `offset` seconds into the track.
    ///
    /// # Panics
    /// If the handle was already started.
    pub fn start(&mut self, at: f64, offset: f64) {
        self.voice_handle_mut().start(at, offset);
    }

    /// Schedule the exact clock time playback ends.
    ///
    /// Precise handles stop sample-accurately on their own. Fast-start
    /// handles are cut by the mixer at the same frame, as if `stop_now`
    /// were called at `at`; their ended callback fires there too.
    ///
    /// # Panics
    /// If called before `start` or more than once.
    pub fn stop_at(&mut self, at: f64) {
        match self {
            PlaybackHandle::Precise(h) => h.inner.stop_at(at),
            PlaybackHandle::FastStart(h) => {
                trace!("Fast-start voice {} cut at {:.3}", h.inner.voice, at);
                h.inner.stop_at(at);
            }
        }
    }

    /// Move a started source that is not audible yet to a new start and stop
    ///
    /// # Panics
    /// If the handle was never started.
    pub fn reschedule(&mut self, at: f64, offset: f64, stop: f64) {
        let inner = self.voice_handle_mut();
        assert!(inner.started, "voice {} rescheduled before start", inner.voice);
        inner.mixer.start_voice(inner.voice, at, offset);
        inner.mixer.stop_voice_at(inner.voice, stop);
        inner.stop_scheduled = true;
    }

    /// Silence immediately; no ended notification follows
    pub fn stop_now(&mut self) {
        let inner = self.voice_handle();
        inner.mixer.stop_voice_now(inner.voice);
    }

    /// Register the callback fired when playback ends on its own
    pub fn on_ended(&mut self, callback: EndedCallback) {
        let inner = self.voice_handle();
        inner.mixer.set_ended_callback(inner.voice, callback);
    }

    pub fn is_ended(&self) -> bool {
        let inner = self.voice_handle();
        inner.mixer.voice_ended(inner.voice)
    }

    pub fn gain(&self) -> GainControl {
        let inner = self.voice_handle();
        GainControl::new(inner.mixer.clone(), inner.voice)
    }

    pub fn analyser(&self) -> AnalyserTap {
        let inner = self.voice_handle();
        AnalyserTap::new(inner.mixer.clone(), inner.voice)
    }

    /// Stop and free the voice
    pub fn release(mut self) {
        self.stop_now();
        trace!("Released voice {}", self.voice());
    }
}
