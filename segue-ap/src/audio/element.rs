//! Shared streaming element backing fast-start playback
//!
//! One element exists per player. A background decode task appends chunks
//! while the mixer is already reading from the front, so the first sound does
//! not wait for the full decode. Loading a new track bumps the element's
//! generation; readers holding an older generation see `ElementRead::Stale`.

use std::sync::Mutex;
use tracing::{debug, warn};

/// Result of reading one frame from the element
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ElementRead {
    /// Frame decoded and copied to the output slice
    Frame,
    /// Frame not decoded yet, decoding still in progress
    Underrun,
    /// Read position is past the end of a completed decode
    End,
    /// The element has been reloaded with another track
    Stale,
}

#[derive(Debug, Default)]
struct ElementState {
    generation: u64,
    channels: Vec<Vec<f32>>,
    sample_rate: u32,
    duration_hint: Option<f64>,
    complete: bool,
    error: Option<String>,
}

impl ElementState {
    fn frames(&self) -> usize {
        self.channels.first().map(Vec::len).unwrap_or(0)
    }
}

/// Process-wide playable element for the head of a freshly started queue
#[derive(Debug, Default)]
pub struct StreamingElement {
    state: Mutex<ElementState>,
}

impl StreamingElement {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset the element for a new track and return its generation
    pub fn begin_load(&self, sample_rate: u32, channel_count: usize, duration_hint: Option<f64>) -> u64 {
        let mut state = self.state.lock().unwrap();
        state.generation += 1;
        state.channels = vec![Vec::new(); channel_count.max(1)];
        state.sample_rate = sample_rate;
        state.duration_hint = duration_hint;
        state.complete = false;
        state.error = None;
        debug!(
            "Element generation {} loading ({} Hz, {} ch, duration hint {:?})",
            state.generation, sample_rate, channel_count, duration_hint
        );
        state.generation
    }

    /// Append a decoded chunk. Returns false once the generation is stale,
    /// telling the decode task to stop.
    pub fn append(&self, generation: u64, chunk: Vec<Vec<f32>>) -> bool {
        let mut state = self.state.lock().unwrap();
        if state.generation != generation {
            return false;
        }
        let channel_count = state.channels.len();
        for (index, samples) in chunk.into_iter().enumerate().take(channel_count) {
            state.channels[index].extend(samples);
        }
        // Keep channels aligned if a chunk arrived with fewer channels
        let frames = state.channels.iter().map(Vec::len).max().unwrap_or(0);
        for channel in state.channels.iter_mut() {
            channel.resize(frames, 0.0);
        }
        true
    }

    /// Mark the decode of `generation` as complete
    pub fn finish(&self, generation: u64) {
        let mut state = self.state.lock().unwrap();
        if state.generation == generation {
            state.complete = true;
        }
    }

    /// Mark the decode of `generation` as failed; what was decoded stays playable
    pub fn fail(&self, generation: u64, reason: String) {
        let mut state = self.state.lock().unwrap();
        if state.generation == generation {
            warn!("Element generation {} decode failed: {}", generation, reason);
            state.complete = true;
            state.error = Some(reason);
        }
    }

    pub fn generation(&self) -> u64 {
        self.state.lock().unwrap().generation
    }

    pub fn sample_rate(&self) -> u32 {
        self.state.lock().unwrap().sample_rate
    }

    pub fn channel_count(&self) -> usize {
        self.state.lock().unwrap().channels.len()
    }

    pub fn decoded_frames(&self) -> usize {
        self.state.lock().unwrap().frames()
    }

    /// Duration of `generation`: the stream header's value when known,
    /// otherwise the decoded length once decoding is complete.
    pub fn duration(&self, generation: u64) -> Option<f64> {
        let state = self.state.lock().unwrap();
        if state.generation != generation || state.sample_rate == 0 {
            return None;
        }
        match state.duration_hint {
            Some(hint) => Some(hint),
            None if state.complete => Some(state.frames() as f64 / state.sample_rate as f64),
            None => None,
        }
    }

    /// Read a block of frames for the mixer.
    ///
    /// `positions` yields source frame indices; `sink` receives the frame's
    /// samples (one per element channel). Stops at the first non-`Frame`
    /// result except `Underrun`, which is reported to the sink as silence.
    pub(crate) fn read_frames<I, F>(&self, generation: u64, positions: I, mut sink: F) -> ElementRead
    where
        I: IntoIterator<Item = usize>,
        F: FnMut(Option<&[f32]>) -> bool,
    {
        let state = self.state.lock().unwrap();
        if state.generation != generation {
            return ElementRead::Stale;
        }
        let mut frame = vec![0.0; state.channels.len()];
        let mut last = ElementRead::Frame;
        for position in positions {
            if position < state.frames() {
                for (slot, channel) in frame.iter_mut().zip(state.channels.iter()) {
                    *slot = channel[position];
                }
                last = ElementRead::Frame;
                if !sink(Some(&frame)) {
                    break;
                }
            } else if state.complete {
                return ElementRead::End;
            } else {
                last = ElementRead::Underrun;
                if !sink(None) {
                    break;
                }
            }
        }
        last
    }
}
