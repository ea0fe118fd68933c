//! Per-worker sleep/wake primitive
//!
//! Every worker owns one parking object and is its only waiter. A worker
//! parks when it has nothing assigned, and again whenever a handler running on
//! it suspends. Any other thread may wake it.
//!
//! A wake that arrives before the worker parks is remembered and consumed by
//! the next `park`, so the waker never has to know whether the worker already
//! went to sleep.

use std::sync::Arc;
use std::time::Duration;

/// Single-waiter park/wake primitive
pub trait WorkerParking: Send + Sync {
    /// Block until woken, consuming the wake
    fn park(&self);

    /// Block until woken or until `timeout` elapses
    ///
    /// Returns `true` if a wake was consumed.
    fn park_timeout(&self, timeout: Duration) -> bool;

    /// Wake the owner, or leave a wake pending if it is not parked
    fn wake(&self);

    /// Whether the owner is currently blocked in `park` (hint, may be stale)
    fn is_parked(&self) -> bool;

    /// Drop a remembered wake without blocking
    ///
    /// Returns `true` if one was pending.
    fn discard_wake(&self) -> bool {
        self.park_timeout(Duration::ZERO)
    }
}

cfg_if::cfg_if! {
    if #[cfg(target_os = "linux")] {
        mod futex_linux;
        pub use futex_linux::FutexParking as PlatformParking;
    } else {
        mod fallback;
        pub use fallback::CondvarParking as PlatformParking;
    }
}

/// Create a new platform-appropriate parking instance
pub fn new_parking() -> Arc<dyn WorkerParking> {
    Arc::new(PlatformParking::new())
}
