//! Linux futex-based worker parking
//!
//! Futex word semantics:
//! - 0 = no wake pending
//! - 1 = wake pending
//!
//! `park` swaps the word to 0; if it was 1 the wake is consumed and the
//! worker keeps running. Otherwise it FUTEX_WAITs on the word being 0. A wake
//! that lands between the swap and the wait changes the word, so the kernel
//! returns EAGAIN and the loop consumes it.

use super::WorkerParking;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::{Duration, Instant};

pub struct FutexParking {
    futex: AtomicU32,
    parked: AtomicBool,
}

impl FutexParking {
    pub fn new() -> Self {
        Self {
            futex: AtomicU32::new(0),
            parked: AtomicBool::new(false),
        }
    }

    #[inline]
    fn try_consume(&self) -> bool {
        self.futex.swap(0, Ordering::AcqRel) == 1
    }

    /// One FUTEX_WAIT while the word is 0. Spurious returns are fine, the
    /// callers loop.
    fn futex_wait(&self, timeout: Option<Duration>) {
        let timespec = timeout.map(|d| libc::timespec {
            tv_sec: d.as_secs() as libc::time_t,
            tv_nsec: d.subsec_nanos() as libc::c_long,
        });
        let timespec_ptr = match &timespec {
            Some(ts) => ts as *const libc::timespec,
            None => std::ptr::null(),
        };

        // Safety: the futex word lives as long as self; the kernel only
        // reads it and the optional timespec on our stack.
        unsafe {
            libc::syscall(
                libc::SYS_futex,
                self.futex.as_ptr(),
                libc::FUTEX_WAIT | libc::FUTEX_PRIVATE_FLAG,
                0u32,
                timespec_ptr,
                std::ptr::null::<u32>(),
                0u32,
            );
        }
    }
}

impl Default for FutexParking {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkerParking for FutexParking {
    fn park(&self) {
        self.parked.store(true, Ordering::Release);
        while !self.try_consume() {
            self.futex_wait(None);
        }
        self.parked.store(false, Ordering::Release);
    }

    fn park_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        self.parked.store(true, Ordering::Release);
        let woken = loop {
            if self.try_consume() {
                break true;
            }
            let now = Instant::now();
            if now >= deadline {
                break false;
            }
            self.futex_wait(Some(deadline - now));
        };
        self.parked.store(false, Ordering::Release);
        woken
    }

    fn wake(&self) {
        self.futex.store(1, Ordering::Release);

        // Safety: FUTEX_WAKE on a word we own, waking at most our one waiter.
        unsafe {
            libc::syscall(
                libc::SYS_futex,
                self.futex.as_ptr(),
                libc::FUTEX_WAKE | libc::FUTEX_PRIVATE_FLAG,
                1i32,
                std::ptr::null::<libc::timespec>(),
                std::ptr::null::<u32>(),
                0u32,
            );
        }
    }

    fn is_parked(&self) -> bool {
        self.parked.load(Ordering::Acquire)
    }
}
