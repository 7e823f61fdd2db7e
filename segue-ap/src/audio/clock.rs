//! Shared audio clock
//!
//! The scheduler computes every start/stop time on this clock. It is
//! monotonic and advances only while resumed; pausing playback suspends it.

/// Monotonic audio clock, in seconds
pub trait AudioClock: Send + Sync {
    /// Current clock time in seconds
    fn now(&self) -> f64;

    /// Stop the clock (and audio rendering) until `resume`
    fn suspend(&self);

    /// Restart a suspended clock
    fn resume(&self);

    fn is_running(&self) -> bool;
}
