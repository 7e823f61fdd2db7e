//! Track loader: resolve a track reference into a playback handle
//!
//! Precise loads fetch, fully decode and scan for silence before returning.
//! Fast-start loads fetch, open a progressive decode into the shared element
//! and return as soon as the first chunk is playable, reporting no gaps.
//!
//! Loads check the cancellation fence after every await point and give up
//! with `Error::Cancelled` once their token is stale.

use crate::audio::decoder::Decoder;
use crate::audio::element::StreamingElement;
use crate::audio::gap_detector::detect_gaps;
use crate::audio::mixer::Mixer;
use crate::audio::source::TrackSource;
use crate::audio::types::GapMetadata;
use crate::error::{Error, Result};
use crate::playback::fence::{CancellationFence, FenceToken};
use crate::playback::handle::PlaybackHandle;
use segue_common::events::{EventBus, HandleKind, SegueEvent};
use segue_common::TrackRef;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{oneshot, Mutex};
use tracing::{debug, warn};

/// A loaded, not yet scheduled track
#[derive(Debug)]
pub struct LoadedTrack {
    pub handle: PlaybackHandle,
    pub gaps: GapMetadata,
}

/// Builds playback handles via the track source and decoder collaborators
pub struct TrackLoader {
    source: Arc<dyn TrackSource>,
    decoder: Arc<dyn Decoder>,
    mixer: Mixer,
    fence: Arc<CancellationFence>,
    /// Failures found after a fast-start load returned are reported here
    events: Arc<EventBus>,
    element: Arc<StreamingElement>,
    /// Serialises fast-start loads over the shared element
    element_lock: Mutex<()>,
}

impl TrackLoader {
    pub fn new(
        source: Arc<dyn TrackSource>,
        decoder: Arc<dyn Decoder>,
        mixer: Mixer,
        fence: Arc<CancellationFence>,
        events: Arc<EventBus>,
    ) -> Self {
        Self {
            source,
            decoder,
            mixer,
            fence,
            events,
            element: Arc::new(StreamingElement::new()),
            element_lock: Mutex::new(()),
        }
    }

    /// The shared fast-start element
    pub fn element(&self) -> &Arc<StreamingElement> {
        &self.element
    }

    /// Load `track` with the requested playback strategy on behalf of an
    /// operation issued at `issued_at`
    pub async fn load(&self, track: &TrackRef, kind: HandleKind, issued_at: FenceToken) -> Result<LoadedTrack> {
        let started = Instant::now();
        let loaded = match kind {
            HandleKind::Precise => self.load_precise(track, issued_at).await,
            HandleKind::FastStart => self.load_fast_start(track, issued_at).await,
        };
        match &loaded {
            Ok(l) => debug!(
                "Loaded {} ({}) in {:?}: duration {:.3}s, leading silence {:?}",
                track,
                kind,
                started.elapsed(),
                l.handle.duration(),
                l.gaps.leading_silence
            ),
            Err(Error::Cancelled(_)) => debug!("Loading {} ({}) cancelled", track, kind),
            Err(e) => warn!("Loading {} ({}) failed: {}", track, kind, e),
        }
        loaded
    }

    fn check_fence(&self, track: &TrackRef, issued_at: FenceToken) -> Result<()> {
        if self.fence.is_stale(issued_at) {
            return Err(Error::Cancelled(track.clone()));
        }
        Ok(())
    }

    async fn load_precise(&self, track: &TrackRef, issued_at: FenceToken) -> Result<LoadedTrack> {
        let bytes = self.source.fetch(track).await?;
        self.check_fence(track, issued_at)?;

        let decoder = Arc::clone(&self.decoder);
        let audio = tokio::task::spawn_blocking(move || decoder.decode(&bytes))
            .await
            .map_err(|e| Error::Internal(format!("Decode task failed: {}", e)))??;
        self.check_fence(track, issued_at)?;

        let gaps = detect_gaps(&audio.channels, audio.sample_rate);
        let handle = PlaybackHandle::precise(&self.mixer, Arc::new(audio));
        Ok(LoadedTrack { handle, gaps })
    }

    async fn load_fast_start(&self, track: &TrackRef, issued_at: FenceToken) -> Result<LoadedTrack> {
        let bytes = self.source.fetch(track).await?;
        self.check_fence(track, issued_at)?;

        let decoder = Arc::clone(&self.decoder);
        let mut stream = tokio::task::spawn_blocking(move || decoder.open_stream(bytes))
            .await
            .map_err(|e| Error::Internal(format!("Decode task failed: {}", e)))??;

        // A stale load must never claim the element: a newer head may own it
        let _element_guard = self.element_lock.lock().await;
        self.check_fence(track, issued_at)?;

        let duration_hint = stream.duration_hint();
        let generation = self
            .element
            .begin_load(stream.sample_rate(), stream.channel_count(), duration_hint);

        // Playable once the first chunk is in, unless the duration is only
        // known after a full decode
        let (ready_tx, ready_rx) = oneshot::channel::<Result<()>>();
        let element = Arc::clone(&self.element);
        let events = Arc::clone(&self.events);
        let track_name = track.clone();
        tokio::task::spawn_blocking(move || {
            let mut ready_tx = Some(ready_tx);
            loop {
                match stream.next_chunk() {
                    Ok(Some(chunk)) => {
                        if !element.append(generation, chunk) {
                            debug!("Element reloaded, abandoning decode of {}", track_name);
                            return;
                        }
                        if duration_hint.is_some() {
                            if let Some(tx) = ready_tx.take() {
                                let _ = tx.send(Ok(()));
                            }
                        }
                    }
                    Ok(None) => {
                        element.finish(generation);
                        if let Some(tx) = ready_tx.take() {
                            let _ = tx.send(Ok(()));
                        }
                        return;
                    }
                    Err(e) => {
                        element.fail(generation, e.to_string());
                        match ready_tx.take() {
                            Some(tx) => {
                                let _ = tx.send(Err(e));
                            }
                            None => {
                                // Already playing: the track will end short
                                warn!("Decode of {} failed mid-stream: {}", track_name, e);
                                events.emit_lossy(SegueEvent::TrackLoadFailed {
                                    track: track_name,
                                    error: e.to_string(),
                                    timestamp: chrono::Utc::now(),
                                });
                            }
                        }
                        return;
                    }
                }
            }
        });

        ready_rx
            .await
            .map_err(|_| Error::Internal("Fast-start decode task ended unexpectedly".to_string()))??;

        let duration = self
            .element
            .duration(generation)
            .ok_or_else(|| Error::Decode(format!("Unknown duration for {}", track)))?;

        let handle = PlaybackHandle::fast_start(&self.mixer, Arc::clone(&self.element), generation, duration);
        Ok(LoadedTrack {
            handle,
            gaps: GapMetadata::NONE,
        })
    }
}
