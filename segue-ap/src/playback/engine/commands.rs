//! User commands - start, pause, stop, seek, skip, volume and queue
//!
//! Commands return once the scheduling step has committed (or was fenced
//! off by a newer command), never after full-track playback.

use super::core::{CoreState, EngineInner, PlaybackEngine};
use super::scheduler::{ScheduleOutcome, ScheduleRequest};
use crate::audio::clock::AudioClock;
use crate::config::HeadStrategy;
use crate::error::{Error, Result};
use segue_common::events::{HandleKind, PlaybackState, SegueEvent};
use segue_common::human_time::format_seconds;
use segue_common::TrackRef;
use std::sync::Arc;
use tracing::{debug, info};

/// How far a requested offset may sit from the paused position and still
/// count as resuming the same spot
const RESUME_TOLERANCE_SECS: f64 = 0.25;

impl EngineInner {
    fn head_kind(&self) -> HandleKind {
        match self.config.head_strategy {
            HeadStrategy::FastStart => HandleKind::FastStart,
            HeadStrategy::Precise => HandleKind::Precise,
        }
    }

    /// Fence off in-flight scheduling and drop every source.
    ///
    /// Leaves the playback state alone; callers either restart in place or
    /// transition to Stopped.
    fn reset(&self, core: &mut CoreState) {
        self.fence.raise();
        self.release_all(core);
        core.switch_clock = 0.0;
        core.fresh_queue = true;
        core.pending_head = None;
        core.pause_epoch += 1;
    }

    pub(super) fn stop_in_place(&self, core: &mut CoreState) {
        self.reset(core);
        self.publish_head(core);
        self.transition(core, PlaybackState::Stopped);
    }

    /// Paused -> Playing without touching the run queue
    fn resume_in_place(&self, core: &mut CoreState) {
        core.pause_epoch += 1;
        self.mixer.resume();
        let ramp = self.config.resume_ramp_ms as f64 / 1000.0;
        for source in &core.run_queue {
            source.gain.ramp_to(core.volume, ramp);
        }
        self.transition(core, PlaybackState::Playing);
    }

    /// Reset and schedule `track` as the head of a fresh queue
    async fn restart(self: &Arc<Self>, track: TrackRef, queue_index: Option<usize>, offset_secs: f64) -> Result<()> {
        let (issued_at, queue_index) = {
            let mut core = self.core.lock().await;
            self.reset(&mut core);
            if !self.mixer.is_running() {
                self.mixer.resume();
            }
            let queue_index = core.index_of(&track, queue_index);
            core.pending_head = Some((track.clone(), queue_index));
            (self.fence.issue(), queue_index)
        };

        let req = ScheduleRequest {
            track: track.clone(),
            queue_index,
            offset_secs: offset_secs.max(0.0),
            issued_at,
            kind: self.head_kind(),
            follows: None,
        };

        match self.schedule_next(req).await {
            Ok(ScheduleOutcome::Scheduled { start, stop, .. }) => {
                info!(
                    "Started {} at {} (clock {:.3}..{:.3})",
                    track,
                    format_seconds(offset_secs),
                    start,
                    stop
                );
                Ok(())
            }
            Ok(outcome) => {
                debug!("Start of {} superseded: {:?}", track, outcome);
                Ok(())
            }
            Err(e) => {
                let mut core = self.core.lock().await;
                if !self.fence.is_stale(issued_at) && core.run_queue.is_empty() {
                    self.stop_in_place(&mut core);
                }
                Err(e)
            }
        }
    }
}

impl PlaybackEngine {
    /// Play `track` from `offset_secs`.
    ///
    /// When paused on the same track at (about) the same position this
    /// resumes without reloading; otherwise every source is released and the
    /// track is scheduled as the head of a fresh queue.
    pub async fn start(&self, track: TrackRef, offset_secs: f64) -> Result<()> {
        let inner = &self.inner;
        {
            let mut core = inner.core.lock().await;
            if core.state == PlaybackState::Paused {
                let position = inner.position_secs(&core);
                let same_spot = offset_secs <= 0.0 || (offset_secs - position).abs() <= RESUME_TOLERANCE_SECS;
                if core.head().is_some_and(|h| h.track == track) && same_spot {
                    info!("Resuming {} at {:.3}s", track, position);
                    inner.resume_in_place(&mut core);
                    return Ok(());
                }
            }
        }
        inner.restart(track, None, offset_secs).await
    }

    /// Resume the paused head where it left off; no-op unless paused
    pub async fn resume(&self) -> Result<()> {
        let (track, position) = {
            let core = self.inner.core.lock().await;
            if core.state != PlaybackState::Paused {
                debug!("Resume ignored in state {}", core.state);
                return Ok(());
            }
            match core.head() {
                Some(head) => (head.track.clone(), self.inner.position_secs(&core)),
                None => return Ok(()),
            }
        };
        self.start(track, position).await
    }

    /// Fade out, then suspend the clock once the fade has settled
    pub async fn pause(&self) -> Result<()> {
        let inner = &self.inner;
        let settle = inner.config.pause_settle();
        let epoch = {
            let mut core = inner.core.lock().await;
            if core.state != PlaybackState::Playing {
                debug!("Pause ignored in state {}", core.state);
                return Ok(());
            }
            for source in &core.run_queue {
                source.gain.ramp_to(0.0, settle.as_secs_f64());
            }
            inner.transition(&mut core, PlaybackState::Paused);
            core.pause_epoch += 1;
            core.pause_epoch
        };

        tokio::time::sleep(settle).await;

        let core = inner.core.lock().await;
        if core.state == PlaybackState::Paused && core.pause_epoch == epoch {
            inner.mixer.suspend();
            debug!("Clock suspended at {:.3}", inner.mixer.now());
        }
        Ok(())
    }

    /// Release every source immediately and go to Stopped
    pub async fn stop(&self) -> Result<()> {
        let mut core = self.inner.core.lock().await;
        self.inner.stop_in_place(&mut core);
        Ok(())
    }

    /// Restart the current track at `position_ms`
    pub async fn seek(&self, position_ms: u64) -> Result<()> {
        let (track, index) = self
            .inner
            .core
            .lock()
            .await
            .current_or_pending()
            .ok_or_else(|| Error::InvalidState("Nothing to seek".to_string()))?;
        let offset_secs = position_ms as f64 / 1000.0;
        info!("Seeking {} to {:.3}s", track, offset_secs);
        self.inner.restart(track, index, offset_secs).await
    }

    /// Start the queue entry after the current track; no-op at the end
    pub async fn next(&self) -> Result<()> {
        self.skip(1).await
    }

    /// Start the queue entry before the current track; no-op at the start
    pub async fn previous(&self) -> Result<()> {
        self.skip(-1).await
    }

    async fn skip(&self, step: isize) -> Result<()> {
        let target = {
            let core = self.inner.core.lock().await;
            let Some((track, hint)) = core.current_or_pending() else {
                debug!("Skip ignored, nothing playing");
                return Ok(());
            };
            let Some(index) = core.index_of(&track, hint) else {
                debug!("Skip ignored, {} is not in the queue", track);
                return Ok(());
            };
            match index.checked_add_signed(step).filter(|&i| i < core.queue.len()) {
                Some(target) => (core.queue[target].clone(), target),
                None => {
                    debug!("Skip ignored at queue boundary ({} of {})", index, core.queue.len());
                    return Ok(());
                }
            }
        };
        let (track, index) = target;
        self.inner.restart(track, Some(index), 0.0).await
    }

    /// Set the master volume (clamped to 0.0..=1.0).
    ///
    /// Live sources follow immediately; a paused player picks it up on resume.
    pub async fn set_volume(&self, volume: f32) -> Result<()> {
        let volume = volume.clamp(0.0, 1.0);
        let mut core = self.inner.core.lock().await;
        core.volume = volume;
        if core.state != PlaybackState::Paused {
            for source in &core.run_queue {
                source.gain.set(volume);
            }
        }
        debug!("Volume set to {:.2}", volume);
        self.inner.publisher.emit(SegueEvent::VolumeChanged {
            volume,
            timestamp: chrono::Utc::now(),
        });
        Ok(())
    }

    /// Replace the queue. Scheduled sources keep playing; a head that
    /// gains a successor gets its lookahead.
    pub async fn set_queue(&self, tracks: Vec<TrackRef>) -> Result<()> {
        let mut core = self.inner.core.lock().await;
        core.queue = tracks;
        info!("Queue replaced ({} tracks)", core.queue.len());
        self.inner.publisher.emit(SegueEvent::QueueChanged {
            length: core.queue.len(),
            timestamp: chrono::Utc::now(),
        });

        if core.state != PlaybackState::Stopped && core.run_queue.len() == 1 {
            self.inner.lookahead_after_head(&core);
        }
        Ok(())
    }
}
