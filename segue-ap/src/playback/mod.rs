//! Playback engine, scheduling and state publication

pub mod engine;
pub mod fence;
pub mod handle;
pub mod loader;
pub mod publisher;

pub use engine::{PlaybackEngine, SourceSnapshot};
pub use fence::{CancellationFence, FenceToken};
pub use handle::PlaybackHandle;
pub use loader::{LoadedTrack, TrackLoader};
pub use publisher::{PositionAnchor, StatePublisher};
