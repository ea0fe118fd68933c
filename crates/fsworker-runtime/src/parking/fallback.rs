//! Condvar-based parking for platforms without futex

use super::WorkerParking;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

pub struct CondvarParking {
    /// true = wake pending
    mutex: Mutex<bool>,
    condvar: Condvar,
    parked: AtomicBool,
}

impl CondvarParking {
    pub fn new() -> Self {
        Self {
            mutex: Mutex::new(false),
            condvar: Condvar::new(),
            parked: AtomicBool::new(false),
        }
    }

    fn guard(&self) -> MutexGuard<'_, bool> {
        self.mutex.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for CondvarParking {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkerParking for CondvarParking {
    fn park(&self) {
        let mut guard = self.guard();
        self.parked.store(true, Ordering::Release);
        while !*guard {
            guard = self
                .condvar
                .wait(guard)
                .unwrap_or_else(PoisonError::into_inner);
        }
        *guard = false;
        self.parked.store(false, Ordering::Release);
    }

    fn park_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut guard = self.guard();
        self.parked.store(true, Ordering::Release);
        while !*guard {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            guard = self
                .condvar
                .wait_timeout(guard, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        let woken = *guard;
        *guard = false;
        self.parked.store(false, Ordering::Release);
        woken
    }

    fn wake(&self) {
        *self.guard() = true;
        self.condvar.notify_one();
    }

    fn is_parked(&self) -> bool {
        self.parked.load(Ordering::Acquire)
    }
}
