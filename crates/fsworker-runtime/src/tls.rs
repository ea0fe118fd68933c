//! Thread-local worker identity
//!
//! Diagnostics only. Scheduling decisions never read this; handlers get
//! their worker from the `CallContext` they are given.

use fsworker_core::WorkerId;
use std::cell::Cell;

thread_local! {
    static WORKER_ID: Cell<Option<WorkerId>> = const { Cell::new(None) };
}

#[inline]
pub fn set_current_worker(id: WorkerId) {
    WORKER_ID.with(|cell| cell.set(Some(id)));
}

#[inline]
pub fn clear_current_worker() {
    WORKER_ID.with(|cell| cell.set(None));
}

/// Worker running on this OS thread, `None` outside the pool
#[inline]
pub fn current_worker() -> Option<WorkerId> {
    WORKER_ID.with(|cell| cell.get())
}
