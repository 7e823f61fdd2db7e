//! Cancellation fencing for in-flight scheduling
//!
//! Every stop, seek or restart raises the fence. A scheduling operation
//! captures a token when issued and checks it at each resumption point;
//! a token older than the current epoch must not commit.

use std::sync::atomic::{AtomicU64, Ordering};

/// Epoch captured when a scheduling operation is issued
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct FenceToken(u64);

/// Monotonic cancellation fence
#[derive(Debug, Default)]
pub struct CancellationFence {
    epoch: AtomicU64,
}

impl CancellationFence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Token for an operation issued now
    pub fn issue(&self) -> FenceToken {
        FenceToken(self.epoch.load(Ordering::SeqCst))
    }

    /// Invalidate every previously issued token; returns the fresh token
    pub fn raise(&self) -> FenceToken {
        FenceToken(self.epoch.fetch_add(1, Ordering::SeqCst) + 1)
    }

    /// Whether the fence was raised after `token` was issued
    pub fn is_stale(&self, token: FenceToken) -> bool {
        token.0 < self.epoch.load(Ordering::SeqCst)
    }
}
