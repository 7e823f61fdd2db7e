//! Event types for the segue event system
//!
//! Provides shared event definitions and the `EventBus` used by the player to
//! publish transitions to the presentation layer.

mod playback_types;

pub use playback_types::{HandleKind, PlaybackState};

use crate::track::TrackRef;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Segue event types
///
/// Events are broadcast via `EventBus` and can be serialized (e.g. for a
/// JSON event log or an SSE bridge run by the presentation layer).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SegueEvent {
    /// Playback state changed (Stopped / Playing / Paused)
    PlaybackStateChanged {
        /// Playback state before change
        old_state: PlaybackState,
        /// Playback state after change
        new_state: PlaybackState,
        /// When state changed
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A track became the audibly playing head of the run queue
    TrackStarted {
        track: TrackRef,
        /// Playback strategy backing the source
        kind: HandleKind,
        /// Full track duration in milliseconds
        duration_ms: u64,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// The head source reached its scheduled stop
    TrackCompleted {
        track: TrackRef,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A track could not be fetched or decoded
    ///
    /// Recoverable: current playback (if any) is unaffected; the presentation
    /// layer decides whether to retry or skip.
    TrackLoadFailed {
        track: TrackRef,
        error: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Master volume changed
    VolumeChanged {
        /// New volume (0.0-1.0)
        volume: f32,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Queue replaced wholesale
    QueueChanged {
        /// Number of entries in the new queue
        length: usize,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

impl SegueEvent {
    /// Event type name, as used in the serialized `type` tag
    pub fn event_type(&self) -> &'static str {
        match self {
            SegueEvent::PlaybackStateChanged { .. } => "PlaybackStateChanged",
            SegueEvent::TrackStarted { .. } => "TrackStarted",
            SegueEvent::TrackCompleted { .. } => "TrackCompleted",
            SegueEvent::TrackLoadFailed { .. } => "TrackLoadFailed",
            SegueEvent::VolumeChanged { .. } => "VolumeChanged",
            SegueEvent::QueueChanged { .. } => "QueueChanged",
        }
    }
}

/// Broadcast bus for `SegueEvent`s
///
/// Lossy by nature: subscribers that fall more than `capacity` events behind
/// observe a lag error and continue from the oldest retained event.
pub struct EventBus {
    tx: broadcast::Sender<SegueEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// # Examples
    ///
    /// ```
    /// use segue_common::events::EventBus;
    ///
    /// let event_bus = EventBus::new(100);
    /// assert_eq!(event_bus.capacity(), 100);
    /// ```
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<SegueEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: SegueEvent,
    ) -> Result<usize, broadcast::error::SendError<SegueEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: SegueEvent) {
        let _ = self.tx.send(event);
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
