//! Gapless scheduler - commit loaded tracks onto the audio clock
//!
//! Each committed source starts exactly where the previous one stops, so the
//! run queue's start times are strictly increasing and contiguous. The
//! scheduler keeps one source of lookahead behind the audible head.

use super::core::{CoreState, EngineInner, ScheduledSource};
use crate::audio::clock::AudioClock;
use crate::error::{Error, Result};
use crate::playback::fence::FenceToken;
use segue_common::events::{HandleKind, PlaybackState, SegueEvent};
use segue_common::TrackRef;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

/// Run-queue depth: audible head plus one lookahead
pub(super) const LOOKAHEAD_DEPTH: usize = 2;

/// A head ending this far before its scheduled stop ended early
/// (e.g. a truncated stream); render blocks land well inside it
const EARLY_END_TOLERANCE_SECS: f64 = 0.05;

/// One `schedule_next` invocation
#[derive(Debug, Clone)]
pub(super) struct ScheduleRequest {
    pub(super) track: TrackRef,
    pub(super) queue_index: Option<usize>,
    /// Requested start position; 0 means "skip leading silence"
    pub(super) offset_secs: f64,
    pub(super) issued_at: FenceToken,
    pub(super) kind: HandleKind,
    /// Source this one must follow; `None` schedules a fresh head
    pub(super) follows: Option<Uuid>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(super) enum ScheduleOutcome {
    Scheduled { id: Uuid, start: f64, stop: f64 },
    /// Fence raised while the request was in flight
    Stale,
    /// Run queue changed shape while loading; nothing committed
    Superseded,
}

impl EngineInner {
    /// Load `req.track` and commit it to the clock after the run-queue tail.
    ///
    /// Stale requests never start a voice: the fence is checked before the
    /// load, after it, and again under the core lock before committing.
    pub(super) async fn schedule_next(self: &Arc<Self>, req: ScheduleRequest) -> Result<ScheduleOutcome> {
        if self.fence.is_stale(req.issued_at) {
            debug!("Schedule of {} fenced before load", req.track);
            return Ok(ScheduleOutcome::Stale);
        }

        let loaded = match self.loader.load(&req.track, req.kind, req.issued_at).await {
            Ok(loaded) => loaded,
            Err(e) => {
                if self.fence.is_stale(req.issued_at) {
                    debug!("Load of {} failed after being fenced: {}", req.track, e);
                    return Ok(ScheduleOutcome::Stale);
                }
                warn!("Scheduling {} abandoned: {}", req.track, e);
                self.publisher.emit(SegueEvent::TrackLoadFailed {
                    track: req.track.clone(),
                    error: e.to_string(),
                    timestamp: chrono::Utc::now(),
                });
                return Err(Error::Load {
                    track: req.track,
                    reason: e.to_string(),
                });
            }
        };
        let mut handle = loaded.handle;

        let mut core = self.core.lock().await;

        if self.fence.is_stale(req.issued_at) {
            warn!("Discarding stale load of {}", req.track);
            handle.release();
            return Ok(ScheduleOutcome::Stale);
        }

        let fits = match req.follows {
            None => core.run_queue.is_empty(),
            Some(previous) => {
                core.run_queue.len() < LOOKAHEAD_DEPTH && core.run_queue.back().map(|s| s.id) == Some(previous)
            }
        };
        if !fits {
            debug!(
                "Run queue changed while loading {} (depth {}), discarding",
                req.track,
                core.run_queue.len()
            );
            handle.release();
            return Ok(ScheduleOutcome::Superseded);
        }

        let start_secs = if req.offset_secs > 0.0 {
            req.offset_secs
        } else {
            loaded.gaps.leading_silence.as_secs_f64()
        };

        let now = self.mixer.now();
        if core.run_queue.is_empty() {
            core.switch_clock = now;
        }
        let start = if core.switch_clock == 0.0 { now } else { core.switch_clock };

        let mut stop = start + handle.duration() - start_secs;
        if core.fresh_queue {
            stop -= self.config.first_handoff_epsilon_secs;
            core.fresh_queue = false;
        }
        let stop = stop.max(start);

        let gain = handle.gain();
        let paused = core.state == PlaybackState::Paused && req.follows.is_some();
        gain.set(if paused { 0.0 } else { core.volume });

        let id = Uuid::new_v4();
        let ended_tx = self.ended_tx.clone();
        handle.on_ended(Box::new(move || {
            let _ = ended_tx.send(id);
        }));
        handle.start(start, start_secs);
        handle.stop_at(stop);

        debug!(
            "Scheduled {} ({}) start={:.3} offset={:.3} stop={:.3} duration={:.3}",
            req.track,
            handle.kind(),
            start,
            start_secs,
            stop,
            handle.duration()
        );

        let analyser = handle.analyser();
        core.run_queue.push_back(ScheduledSource {
            id,
            handle,
            track: req.track,
            queue_index: req.queue_index,
            start_clock: start,
            stop_clock: stop,
            offset_secs: start_secs,
            gain,
            analyser,
        });

        if core.run_queue.len() == 1 {
            self.publish_head(&core);
        }
        if req.follows.is_none() {
            core.pending_head = None;
            self.transition(&mut core, PlaybackState::Playing);
        }

        core.switch_clock = stop;

        if core.run_queue.len() == 1 {
            self.lookahead_after_head(&core);
        }

        Ok(ScheduleOutcome::Scheduled { id, start, stop })
    }

    /// Schedule the queue entry after the sole run-queue source, if any
    pub(super) fn lookahead_after_head(self: &Arc<Self>, core: &CoreState) {
        let Some(head) = core.head() else {
            return;
        };
        let Some(next) = core.next_index(head) else {
            debug!("{} is the last queue entry, no lookahead", head.track);
            return;
        };

        let req = ScheduleRequest {
            track: core.queue[next].clone(),
            queue_index: Some(next),
            offset_secs: 0.0,
            issued_at: self.fence.issue(),
            kind: HandleKind::Precise,
            follows: Some(head.id),
        };
        spawn_lookahead(Arc::clone(self), req);
    }

    /// Ended notification from a voice: promote the next source.
    ///
    /// Only the current head may advance the queue; notifications for any
    /// other id, repeated ones, or ones arriving after a stop are ignored.
    pub(super) async fn on_source_ended(self: &Arc<Self>, id: Uuid) {
        let mut core = self.core.lock().await;

        if core.state == PlaybackState::Stopped {
            debug!("Ignoring ended notification for {} while stopped", id);
            return;
        }
        if core.head().map(|h| h.id) != Some(id) {
            debug!("Ignoring ended notification for {} (not the head)", id);
            return;
        }
        let Some(finished) = core.run_queue.pop_front() else {
            return;
        };

        let ScheduledSource {
            handle,
            track,
            stop_clock,
            ..
        } = finished;
        handle.release();
        debug!("{} finished", track);
        self.publisher.emit(SegueEvent::TrackCompleted {
            track,
            timestamp: chrono::Utc::now(),
        });

        if core.run_queue.is_empty() {
            self.fence.raise();
            core.switch_clock = 0.0;
            core.fresh_queue = true;
            self.publish_head(&core);
            self.transition(&mut core, PlaybackState::Stopped);
            return;
        }

        let lead = stop_clock - self.mixer.now();
        if lead > EARLY_END_TOLERANCE_SECS {
            self.pull_forward(&mut core, lead);
        }

        self.publish_head(&core);
        if core.run_queue.len() == 1 {
            self.lookahead_after_head(&core);
        }
    }

    /// Shift every committed source `lead` seconds earlier so the follower
    /// of a head that ended early starts now instead of after a silent gap
    fn pull_forward(&self, core: &mut CoreState, lead: f64) {
        warn!("Head ended {:.3}s before its stop, pulling the run queue forward", lead);
        for source in core.run_queue.iter_mut() {
            let start = source.start_clock - lead;
            let stop = source.stop_clock - lead;
            source.handle.reschedule(start, source.offset_secs, stop);
            source.start_clock = start;
            source.stop_clock = stop;
        }
        core.switch_clock -= lead;
    }

    /// Silence and release every scheduled source
    pub(super) fn release_all(&self, core: &mut CoreState) {
        for source in core.run_queue.drain(..) {
            debug!("Releasing {}", source.track);
            source.handle.release();
        }
    }
}

/// Run a lookahead `schedule_next` in the background
fn spawn_lookahead(inner: Arc<EngineInner>, req: ScheduleRequest) {
    let track = req.track.clone();
    tokio::spawn(async move {
        match inner.schedule_next(req).await {
            Ok(ScheduleOutcome::Scheduled { start, stop, .. }) => {
                debug!("Lookahead {} committed at {:.3}..{:.3}", track, start, stop)
            }
            Ok(outcome) => debug!("Lookahead {} not committed: {:?}", track, outcome),
            Err(e) => warn!("Lookahead {} failed: {}", track, e),
        }
    });
}

#[cfg(test)]
mod tests {
    use super::super::core::PlaybackEngine;
    use crate::audio::decoder::Decoder;
    use crate::audio::mixer::Mixer;
    use crate::audio::source::TrackSource;
    use crate::audio::types::DecodedAudio;
    use crate::config::{HeadStrategy, PlayerConfig};
    use crate::error::Result;
    use async_trait::async_trait;
    use segue_common::events::PlaybackState;
    use segue_common::TrackRef;
    use std::sync::Arc;
    use std::time::Duration;
    use uuid::Uuid;

    struct NameSource;

    #[async_trait]
    impl TrackSource for NameSource {
        async fn fetch(&self, track: &TrackRef) -> Result<Vec<u8>> {
            Ok(track.as_str().as_bytes().to_vec())
        }
    }

    /// One second of audio at 1 kHz for any input
    struct SecondDecoder;

    impl Decoder for SecondDecoder {
        fn decode(&self, _bytes: &[u8]) -> Result<DecodedAudio> {
            Ok(DecodedAudio::new(vec![vec![0.5; 1000]], 1000))
        }
    }

    fn engine() -> PlaybackEngine {
        let config = PlayerConfig {
            head_strategy: HeadStrategy::Precise,
            volume: 1.0,
            fft_size: 64,
            ..Default::default()
        };
        PlaybackEngine::new(
            config,
            Mixer::new(1000, 1, 64),
            Arc::new(NameSource),
            Arc::new(SecondDecoder),
        )
    }

    async fn wait_for_depth(engine: &PlaybackEngine, depth: usize) {
        for _ in 0..400 {
            if engine.run_queue().await.len() == depth {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("run queue never reached depth {}", depth);
    }

    #[tokio::test]
    async fn test_only_head_ended_advances_queue() {
        let engine = engine();
        let tracks: Vec<TrackRef> = ["a", "b", "c"].into_iter().map(TrackRef::from).collect();
        engine.set_queue(tracks.clone()).await.unwrap();
        engine.start(tracks[0].clone(), 0.0).await.unwrap();
        wait_for_depth(&engine, 2).await;

        let head = engine.run_queue().await[0].id;

        engine.inner.on_source_ended(Uuid::new_v4()).await;
        assert_eq!(engine.run_queue().await[0].id, head);

        engine.inner.on_source_ended(head).await;
        let after_first = engine.run_queue().await;
        assert_eq!(after_first[0].track, tracks[1]);

        // Repeat of the same notification is a no-op
        engine.inner.on_source_ended(head).await;
        let after_repeat = engine.run_queue().await;
        assert_eq!(after_repeat[0].id, after_first[0].id);
        assert_eq!(engine.current_track().await, Some(tracks[1].clone()));
    }

    #[tokio::test]
    async fn test_early_head_end_pulls_follower_forward() {
        let engine = engine();
        let tracks: Vec<TrackRef> = ["a", "b"].into_iter().map(TrackRef::from).collect();
        engine.set_queue(tracks.clone()).await.unwrap();
        engine.start(tracks[0].clone(), 0.0).await.unwrap();
        wait_for_depth(&engine, 2).await;

        // Head cut short 0.3s in, as a truncated decode would
        engine.mixer().advance(300);
        let head = engine.run_queue().await[0].id;
        engine.inner.on_source_ended(head).await;

        let run_queue = engine.run_queue().await;
        assert_eq!(run_queue[0].track, tracks[1]);
        assert!((run_queue[0].start_clock - 0.3).abs() < 1e-9);
        assert!((run_queue[0].stop_clock - 1.3).abs() < 1e-9);
        assert_eq!(engine.switch_clock().await, run_queue[0].stop_clock);
        assert_eq!(engine.position_ms().await, 0);

        let mut out = vec![0.0; 10];
        engine.mixer().render(&mut out);
        assert!(out.iter().all(|s| *s == 0.5));
    }

    #[tokio::test]
    async fn test_ended_after_stop_is_ignored() {
        let engine = engine();
        let track = TrackRef::new("a");
        engine.set_queue(vec![track.clone()]).await.unwrap();
        engine.start(track, 0.0).await.unwrap();
        let head = engine.run_queue().await[0].id;

        engine.stop().await.unwrap();
        engine.inner.on_source_ended(head).await;

        assert_eq!(engine.state().await, PlaybackState::Stopped);
        assert!(engine.run_queue().await.is_empty());
        assert_eq!(engine.switch_clock().await, 0.0);
    }
}
