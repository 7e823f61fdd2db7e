//! Published playback state for the presentation layer
//!
//! Values live in `watch` channels so any number of consumers can observe
//! them. Every stream returned here is lazy, infinite and independent: a new
//! call starts a fresh sequence from the current value.

use crate::audio::clock::AudioClock;
use crate::audio::mixer::AnalyserTap;
use futures::stream::Stream;
use segue_common::events::{EventBus, PlaybackState, SegueEvent};
use segue_common::TrackRef;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::{BroadcastStream, WatchStream};
use tokio_stream::StreamExt;
use tracing::warn;

/// Where the audible head source sits on the audio clock
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionAnchor {
    /// Clock time the head source started
    pub start_clock: f64,
    /// Track position (seconds) at `start_clock`
    pub offset_secs: f64,
}

impl PositionAnchor {
    /// Track position at clock time `now`, in milliseconds
    pub fn position_ms(&self, now: f64) -> u64 {
        let position = (now - self.start_clock).max(0.0) + self.offset_secs;
        (position.max(0.0) * 1000.0).round() as u64
    }
}

/// Head source details published on every promotion
#[derive(Debug, Clone)]
pub struct CurrentSource {
    pub track: TrackRef,
    pub duration_ms: u64,
    pub anchor: PositionAnchor,
    pub analyser: AnalyserTap,
}

/// Publishes playback state, current track, progress and spectrum data
pub struct StatePublisher {
    state_tx: watch::Sender<PlaybackState>,
    current_tx: watch::Sender<Option<CurrentSource>>,
    clock: Arc<dyn AudioClock>,
    events: Arc<EventBus>,
    progress_interval: Duration,
    spectrum_interval: Duration,
}

impl StatePublisher {
    pub fn new(
        clock: Arc<dyn AudioClock>,
        events: Arc<EventBus>,
        progress_interval: Duration,
        spectrum_interval: Duration,
    ) -> Self {
        let (state_tx, _) = watch::channel(PlaybackState::Stopped);
        let (current_tx, _) = watch::channel(None);
        Self {
            state_tx,
            current_tx,
            clock,
            events,
            progress_interval,
            spectrum_interval,
        }
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    pub(crate) fn emit(&self, event: SegueEvent) {
        self.events.emit_lossy(event);
    }

    pub(crate) fn set_state(&self, state: PlaybackState) {
        self.state_tx.send_replace(state);
    }

    pub(crate) fn set_current(&self, current: Option<CurrentSource>) {
        self.current_tx.send_replace(current);
    }

    pub fn state(&self) -> PlaybackState {
        *self.state_tx.borrow()
    }

    pub fn current_track(&self) -> Option<TrackRef> {
        self.current_tx.borrow().as_ref().map(|c| c.track.clone())
    }

    pub fn duration_ms(&self) -> u64 {
        self.current_tx.borrow().as_ref().map(|c| c.duration_ms).unwrap_or(0)
    }

    /// Head position in milliseconds; 0 while stopped
    pub fn position_ms(&self) -> u64 {
        compute_progress(&self.state_tx.borrow(), &self.current_tx.borrow(), self.clock.as_ref())
    }

    /// Playback state changes, starting with the current state
    pub fn playback_state_stream(&self) -> impl Stream<Item = PlaybackState> + Send + 'static {
        WatchStream::new(self.state_tx.subscribe())
    }

    /// Current track changes (None when nothing is playing)
    pub fn current_track_stream(&self) -> impl Stream<Item = Option<TrackRef>> + Send + 'static {
        WatchStream::new(self.current_tx.subscribe()).map(|current| current.map(|c| c.track))
    }

    /// Duration of the current track in milliseconds (0 when none)
    pub fn duration_stream(&self) -> impl Stream<Item = u64> + Send + 'static {
        WatchStream::new(self.current_tx.subscribe()).map(|current| current.map(|c| c.duration_ms).unwrap_or(0))
    }

    /// Progress polled at the configured cadence; 0 while stopped
    pub fn progress_stream(&self) -> impl Stream<Item = u64> + Send + 'static {
        let state_rx = self.state_tx.subscribe();
        let current_rx = self.current_tx.subscribe();
        let clock = Arc::clone(&self.clock);
        let period = self.progress_interval;

        async_stream::stream! {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let progress = compute_progress(&state_rx.borrow(), &current_rx.borrow(), clock.as_ref());
                yield progress;
            }
        }
    }

    /// Periodic frequency-domain snapshot of the head source
    /// (empty when nothing is playing)
    pub fn spectrum_stream(&self) -> impl Stream<Item = Vec<f32>> + Send + 'static {
        let current_rx = self.current_tx.subscribe();
        let period = self.spectrum_interval;

        async_stream::stream! {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let analyser = current_rx.borrow().as_ref().map(|c| c.analyser.clone());
                yield analyser.map(|a| a.snapshot()).unwrap_or_default();
            }
        }
    }

    /// Player events; lagging consumers skip what they missed
    pub fn event_stream(&self) -> impl Stream<Item = SegueEvent> + Send + 'static {
        BroadcastStream::new(self.events.subscribe()).filter_map(|result| match result {
            Ok(event) => Some(event),
            Err(BroadcastStreamRecvError::Lagged(missed)) => {
                warn!("Event stream lagged, {} events skipped", missed);
                None
            }
        })
    }
}

fn compute_progress(state: &PlaybackState, current: &Option<CurrentSource>, clock: &dyn AudioClock) -> u64 {
    if *state == PlaybackState::Stopped {
        return 0;
    }
    current
        .as_ref()
        .map(|c| c.anchor.position_ms(clock.now()))
        .unwrap_or(0)
}
