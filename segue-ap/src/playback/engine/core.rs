//! Core playback engine - construction, shared state and queries
//!
//! **Responsibilities:**
//! - PlaybackEngine / EngineInner definitions and initialization
//! - Ended-notification loop (the single consumer of voice ended callbacks)
//! - State transitions and publication of the current head
//! - Status accessors used by the presentation layer and tests

use crate::audio::clock::AudioClock;
use crate::audio::decoder::Decoder;
use crate::audio::mixer::{AnalyserTap, GainControl, Mixer};
use crate::audio::source::TrackSource;
use crate::config::PlayerConfig;
use crate::playback::fence::CancellationFence;
use crate::playback::handle::PlaybackHandle;
use crate::playback::loader::TrackLoader;
use crate::playback::publisher::{CurrentSource, PositionAnchor, StatePublisher};
use segue_common::events::{EventBus, HandleKind, PlaybackState, SegueEvent};
use segue_common::TrackRef;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex as StdMutex, Weak};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info};
use uuid::Uuid;

/// A committed source in the run queue
#[derive(Debug)]
pub(super) struct ScheduledSource {
    pub(super) id: Uuid,
    pub(super) handle: PlaybackHandle,
    pub(super) track: TrackRef,
    /// Queue position the source was scheduled for, if known
    pub(super) queue_index: Option<usize>,
    pub(super) start_clock: f64,
    pub(super) stop_clock: f64,
    /// Track position at `start_clock`
    pub(super) offset_secs: f64,
    pub(super) gain: GainControl,
    pub(super) analyser: AnalyserTap,
}

impl ScheduledSource {
    pub(super) fn anchor(&self) -> PositionAnchor {
        PositionAnchor {
            start_clock: self.start_clock,
            offset_secs: self.offset_secs,
        }
    }

    pub(super) fn duration_ms(&self) -> u64 {
        (self.handle.duration() * 1000.0).round() as u64
    }

    fn snapshot(&self) -> SourceSnapshot {
        SourceSnapshot {
            id: self.id,
            track: self.track.clone(),
            kind: self.handle.kind(),
            start_clock: self.start_clock,
            stop_clock: self.stop_clock,
            offset_secs: self.offset_secs,
            gain: self.gain.target(),
        }
    }
}

/// Read-only view of one run-queue entry
#[derive(Debug, Clone, PartialEq)]
pub struct SourceSnapshot {
    pub id: Uuid,
    pub track: TrackRef,
    pub kind: HandleKind,
    pub start_clock: f64,
    pub stop_clock: f64,
    pub offset_secs: f64,
    /// Gain target, `None` once the voice is gone
    pub gain: Option<f32>,
}

/// State owned by the single scheduling actor
#[derive(Debug)]
pub(super) struct CoreState {
    pub(super) state: PlaybackState,
    pub(super) queue: Vec<TrackRef>,
    /// Head track requested by a command whose load has not committed yet
    pub(super) pending_head: Option<(TrackRef, Option<usize>)>,
    /// Head is the audibly playing source, at most one lookahead behind it
    pub(super) run_queue: VecDeque<ScheduledSource>,
    /// Clock time the next source starts; 0 means never set
    pub(super) switch_clock: f64,
    /// Next committed source is the first of a freshly started queue
    pub(super) fresh_queue: bool,
    pub(super) volume: f32,
    /// Bumped on every pause so a stale settle does not suspend the clock
    pub(super) pause_epoch: u64,
}

impl CoreState {
    pub(super) fn head(&self) -> Option<&ScheduledSource> {
        self.run_queue.front()
    }

    /// Track the user currently considers playing: the head, or the
    /// head whose load is still in flight
    pub(super) fn current_or_pending(&self) -> Option<(TrackRef, Option<usize>)> {
        match self.head() {
            Some(head) => Some((head.track.clone(), head.queue_index)),
            None => self.pending_head.clone(),
        }
    }

    /// Queue position of the track after `source`, if any
    pub(super) fn next_index(&self, source: &ScheduledSource) -> Option<usize> {
        self.index_of(&source.track, source.queue_index)
            .map(|i| i + 1)
            .filter(|&i| i < self.queue.len())
    }

    /// Locate `track` in the queue, trusting `hint` when it still matches
    pub(super) fn index_of(&self, track: &TrackRef, hint: Option<usize>) -> Option<usize> {
        match hint {
            Some(i) if self.queue.get(i) == Some(track) => Some(i),
            _ => self.queue.iter().position(|t| t == track),
        }
    }
}

/// Shared engine internals
pub(super) struct EngineInner {
    pub(super) config: PlayerConfig,
    pub(super) mixer: Mixer,
    pub(super) loader: TrackLoader,
    pub(super) fence: Arc<CancellationFence>,
    pub(super) publisher: StatePublisher,
    pub(super) core: Mutex<CoreState>,
    /// Voice ended callbacks report the source id here
    pub(super) ended_tx: mpsc::UnboundedSender<Uuid>,
    event_task: StdMutex<Option<JoinHandle<()>>>,
}

impl EngineInner {
    /// Apply a state transition and publish it; no-op when unchanged
    pub(super) fn transition(&self, core: &mut CoreState, new_state: PlaybackState) {
        let old_state = core.state;
        if old_state == new_state {
            return;
        }
        core.state = new_state;
        info!("Playback state: {} -> {}", old_state, new_state);
        self.publisher.set_state(new_state);
        self.publisher.emit(SegueEvent::PlaybackStateChanged {
            old_state,
            new_state,
            timestamp: chrono::Utc::now(),
        });
    }

    /// Publish the run-queue head as the current track (or clear it)
    pub(super) fn publish_head(&self, core: &CoreState) {
        match core.head() {
            Some(head) => {
                self.publisher.set_current(Some(CurrentSource {
                    track: head.track.clone(),
                    duration_ms: head.duration_ms(),
                    anchor: head.anchor(),
                    analyser: head.analyser.clone(),
                }));
                info!("Now playing {} ({})", head.track, head.handle.kind());
                self.publisher.emit(SegueEvent::TrackStarted {
                    track: head.track.clone(),
                    kind: head.handle.kind(),
                    duration_ms: head.duration_ms(),
                    timestamp: chrono::Utc::now(),
                });
            }
            None => self.publisher.set_current(None),
        }
    }

    /// Head position in seconds; 0 while stopped
    pub(super) fn position_secs(&self, core: &CoreState) -> f64 {
        if core.state == PlaybackState::Stopped {
            return 0.0;
        }
        core.head()
            .map(|head| (self.mixer.now() - head.start_clock).max(0.0) + head.offset_secs)
            .unwrap_or(0.0)
    }
}

/// Gapless playback engine
///
/// Cheap to clone; every clone drives the same player.
#[derive(Clone)]
pub struct PlaybackEngine {
    pub(super) inner: Arc<EngineInner>,
}

impl PlaybackEngine {
    /// Create the engine and spawn its ended-notification loop.
    ///
    /// Must be called from within a tokio runtime. `mixer` is the shared audio
    /// context; whoever renders it (device output or a test) drives the clock.
    pub fn new(
        config: PlayerConfig,
        mixer: Mixer,
        source: Arc<dyn TrackSource>,
        decoder: Arc<dyn Decoder>,
    ) -> Self {
        let config = config.validated();
        let (ended_tx, ended_rx) = mpsc::unbounded_channel();

        let events = Arc::new(EventBus::new(config.event_capacity));
        let clock: Arc<dyn AudioClock> = Arc::new(mixer.clone());
        let publisher = StatePublisher::new(
            clock,
            Arc::clone(&events),
            config.progress_interval(),
            config.spectrum_interval(),
        );

        let core = CoreState {
            state: PlaybackState::Stopped,
            queue: Vec::new(),
            pending_head: None,
            run_queue: VecDeque::new(),
            switch_clock: 0.0,
            fresh_queue: true,
            volume: config.volume,
            pause_epoch: 0,
        };

        let fence = Arc::new(CancellationFence::new());
        let inner = Arc::new(EngineInner {
            loader: TrackLoader::new(source, decoder, mixer.clone(), Arc::clone(&fence), events),
            mixer,
            fence,
            publisher,
            core: Mutex::new(core),
            ended_tx,
            event_task: StdMutex::new(None),
            config,
        });

        let task = tokio::spawn(run_event_loop(Arc::downgrade(&inner), ended_rx));
        *inner.event_task.lock().unwrap() = Some(task);

        info!(
            "Playback engine created ({} Hz, head strategy {:?}, volume {:.2})",
            inner.mixer.sample_rate(),
            inner.config.head_strategy,
            inner.config.volume
        );
        Self { inner }
    }

    /// Release every source and stop the ended-notification loop
    pub async fn shutdown(&self) {
        info!("Shutting down playback engine");
        let mut core = self.inner.core.lock().await;
        self.inner.stop_in_place(&mut core);
        drop(core);

        if let Some(task) = self.inner.event_task.lock().unwrap().take() {
            task.abort();
        }
        info!("Playback engine shut down");
    }

    pub fn config(&self) -> &PlayerConfig {
        &self.inner.config
    }

    /// The shared audio context
    pub fn mixer(&self) -> &Mixer {
        &self.inner.mixer
    }

    pub fn publisher(&self) -> &StatePublisher {
        &self.inner.publisher
    }

    pub fn events(&self) -> &Arc<EventBus> {
        self.inner.publisher.events()
    }

    pub async fn state(&self) -> PlaybackState {
        self.inner.core.lock().await.state
    }

    /// Track of the audibly playing source
    pub async fn current_track(&self) -> Option<TrackRef> {
        self.inner.core.lock().await.head().map(|h| h.track.clone())
    }

    pub async fn queue(&self) -> Vec<TrackRef> {
        self.inner.core.lock().await.queue.clone()
    }

    pub async fn volume(&self) -> f32 {
        self.inner.core.lock().await.volume
    }

    pub async fn position_ms(&self) -> u64 {
        let core = self.inner.core.lock().await;
        (self.inner.position_secs(&core) * 1000.0).round() as u64
    }

    pub async fn duration_ms(&self) -> u64 {
        self.inner
            .core
            .lock()
            .await
            .head()
            .map(|h| h.duration_ms())
            .unwrap_or(0)
    }

    /// Current switch clock (0 when never set)
    pub async fn switch_clock(&self) -> f64 {
        self.inner.core.lock().await.switch_clock
    }

    /// Snapshot of the run queue, head first
    pub async fn run_queue(&self) -> Vec<SourceSnapshot> {
        self.inner
            .core
            .lock()
            .await
            .run_queue
            .iter()
            .map(ScheduledSource::snapshot)
            .collect()
    }
}

/// Feed voice ended notifications to the scheduler, one at a time
async fn run_event_loop(inner: Weak<EngineInner>, mut ended_rx: mpsc::UnboundedReceiver<Uuid>) {
    debug!("Ended-notification loop started");
    while let Some(id) = ended_rx.recv().await {
        let Some(inner) = inner.upgrade() else {
            break;
        };
        inner.on_source_ended(id).await;
    }
    debug!("Ended-notification loop stopped");
}
