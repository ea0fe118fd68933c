//! Process records and the collaborator interface around them
//!
//! The pool owns one `ProcessContext` per process table slot, holding the
//! work-admission state of that process: at most one normal call, at most one
//! postponed callback, and whether it is waiting for a thread (PENDING) or
//! being served by one.

use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

use fsworker_core::{Message, ProcFlags, ProcId, WorkerId};

use crate::context::CallContext;

/// Handler for a normal call; reads its input from `ctx.message()`
pub type Handler = Arc<dyn Fn(&mut CallContext) + Send + Sync>;

/// Wrap a closure as a [`Handler`]
pub fn handler<F>(f: F) -> Handler
where
    F: Fn(&mut CallContext) + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Services the pool calls around stored work
///
/// `lock_proc` must block until the process is exclusively held.
pub trait ProcessHooks: Send + Sync + 'static {
    fn lock_proc(&self, proc: ProcId);

    fn unlock_proc(&self, proc: ProcId);

    /// Run the postponed process-manager callback stored for `ctx.proc()`
    fn service_pm_postponed(&self, ctx: &mut CallContext);

    /// Per-call cleanup, run with the process still locked
    fn thread_cleanup(&self, _ctx: &mut CallContext) {}
}

/// Work-admission state of one process
#[derive(Default)]
pub(crate) struct ProcessContext {
    pub(crate) flags: ProcFlags,
    pub(crate) worker: Option<WorkerId>,
    pub(crate) normal: Option<(Handler, Message)>,
    /// Valid only while `PM_WORK` is set
    pub(crate) pm_msg: Message,
}

impl ProcessContext {
    #[inline]
    pub(crate) fn is_pending(&self) -> bool {
        self.flags.contains(ProcFlags::PENDING)
    }

    #[inline]
    pub(crate) fn is_active(&self) -> bool {
        self.worker.is_some()
    }

    #[inline]
    pub(crate) fn has_pm_work(&self) -> bool {
        self.flags.contains(ProcFlags::PM_WORK)
    }

    pub(crate) fn snapshot(&self) -> ProcessSnapshot {
        ProcessSnapshot {
            flags: self.flags,
            worker: self.worker,
            normal_call: self.normal.as_ref().map(|(_, m)| m.m_type),
            postponed_call: self.has_pm_work().then_some(self.pm_msg.m_type),
        }
    }
}

/// Read-only view of a process record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessSnapshot {
    pub flags: ProcFlags,
    pub worker: Option<WorkerId>,
    /// Message type of the stored normal call
    pub normal_call: Option<i32>,
    /// Message type of the stored postponed callback
    pub postponed_call: Option<i32>,
}

impl ProcessSnapshot {
    pub fn is_pending(&self) -> bool {
        self.flags.contains(ProcFlags::PENDING)
    }

    pub fn is_active(&self) -> bool {
        self.worker.is_some()
    }
}

/// Blocking per-process lock table
///
/// Usable as the locking half of a [`ProcessHooks`] implementation.
/// Locks are not owned by a thread: a worker that changes its process with
/// `set_proc` unlocks a different entry than it locked.
pub struct TableLocks {
    held: Mutex<Vec<bool>>,
    released: Condvar,
}

impl TableLocks {
    pub fn new(nr_procs: usize) -> Self {
        Self {
            held: Mutex::new(vec![false; nr_procs]),
            released: Condvar::new(),
        }
    }

    fn guard(&self) -> MutexGuard<'_, Vec<bool>> {
        self.held.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn lock(&self, proc: ProcId) {
        let mut held = self.guard();
        while held[proc.as_usize()] {
            held = self
                .released
                .wait(held)
                .unwrap_or_else(PoisonError::into_inner);
        }
        held[proc.as_usize()] = true;
    }

    pub fn try_lock(&self, proc: ProcId) -> bool {
        let mut held = self.guard();
        if held[proc.as_usize()] {
            return false;
        }
        held[proc.as_usize()] = true;
        true
    }

    pub fn unlock(&self, proc: ProcId) {
        self.guard()[proc.as_usize()] = false;
        self.released.notify_all();
    }

    pub fn is_locked(&self, proc: ProcId) -> bool {
        self.guard()[proc.as_usize()]
    }
}
