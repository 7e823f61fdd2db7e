//! Playback engine: the controller and gapless scheduler
//!
//! **Module Structure:**
//! - `core.rs`: engine construction, shared state, ended-notification loop, queries
//! - `scheduler.rs`: `schedule_next`, lookahead, run-queue promotion on ended
//! - `commands.rs`: user commands (start, pause, stop, seek, next, previous, volume, queue)
//!
//! User commands and ended notifications mutate the run queue one at a time
//! under the core lock. Loads run outside the lock and rejoin it only to
//! commit, after a fence check.

mod commands;
mod core;
mod scheduler;

pub use self::core::{PlaybackEngine, SourceSnapshot};
