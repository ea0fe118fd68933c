//! Per-call execution context
//!
//! A `CallContext` is what a handler sees of the thread running it: the
//! current process, the request message and the call's error code. Suspending
//! saves the error code in the worker record; resuming restores it and
//! re-reads the process binding, which `set_proc` may have changed.

use std::sync::Arc;

use fsworker_core::constants::OK;
use fsworker_core::{
    Endpoint, FatalError, Message, PendingReply, ProcId, ReplyKind, ReplySlot, WorkerId,
};
use fsworker_core::{kdebug, ktrace};

use crate::parking::WorkerParking;
use crate::pool::{PoolHandle, Shared};

/// Execution context of the call running on a worker
pub struct CallContext {
    shared: Arc<Shared>,
    worker: WorkerId,
    proc: ProcId,

    /// Request being served
    pub m_in: Message,

    /// Error code of the current call
    pub err_code: i32,
}

/// A worker that saved its state and may go to sleep
///
/// Obtained from [`CallContext::suspend`] and handed back to
/// [`CallContext::resume`].
#[must_use = "a suspended worker must be resumed"]
pub struct SuspendedWorker {
    worker: WorkerId,
    parking: Arc<dyn WorkerParking>,
}

impl SuspendedWorker {
    pub fn worker(&self) -> WorkerId {
        self.worker
    }

    /// Block until another thread signals, stops or replies to this worker
    pub fn sleep(&self) {
        self.parking.park();
    }
}

impl CallContext {
    pub(crate) fn new(shared: Arc<Shared>, worker: WorkerId, proc: ProcId) -> Self {
        Self {
            shared,
            worker,
            proc,
            m_in: Message::default(),
            err_code: OK,
        }
    }

    #[inline]
    pub fn worker(&self) -> WorkerId {
        self.worker
    }

    /// Process currently served
    #[inline]
    pub fn proc(&self) -> ProcId {
        self.proc
    }

    #[inline]
    pub fn message(&self) -> &Message {
        &self.m_in
    }

    /// Whether a normal call is stored for the current process
    ///
    /// True for the whole duration of a normal call.
    pub fn has_normal_work(&self) -> bool {
        let state = self.shared.lock();
        state.procs[self.proc.as_usize()].normal.is_some()
    }

    /// Scheduler API of the pool this call runs in
    pub fn pool(&self) -> PoolHandle {
        PoolHandle::from_shared(Arc::clone(&self.shared))
    }

    /// Save call state ahead of blocking
    pub fn suspend(&mut self) -> SuspendedWorker {
        let mut state = self.shared.lock();
        let rec = match state.worker_mut(self.worker) {
            Ok(rec) => rec,
            Err(e) => e.terminate(),
        };
        debug_assert_eq!(rec.proc, Some(self.proc));
        rec.err_code = self.err_code;

        SuspendedWorker {
            worker: self.worker,
            parking: Arc::clone(&rec.parking),
        }
    }

    /// Restore call state after blocking
    pub fn resume(&mut self, suspended: SuspendedWorker) {
        let state = self.shared.lock();
        let rec = match state.worker_ref(suspended.worker) {
            Ok(rec) => rec,
            Err(e) => e.terminate(),
        };
        self.proc = match rec.proc {
            Some(proc) => proc,
            None => FatalError::InconsistentState {
                proc: self.proc,
                reason: "worker resumed without a process",
            }
            .terminate(),
        };
        self.err_code = rec.err_code;
    }

    /// Sleep until woken by another thread
    pub fn wait(&mut self) {
        let suspended = self.suspend();
        suspended.sleep();
        self.resume(suspended);
    }

    /// Block until `endpoint` replies or this worker is stopped
    ///
    /// A stopped worker gets an `EIO` reply.
    pub fn wait_for_reply(&mut self, endpoint: Endpoint, kind: ReplyKind) -> Message {
        let slot = ReplySlot::new();
        {
            let mut state = self.shared.lock();
            let rec = match state.worker_mut(self.worker) {
                Ok(rec) => rec,
                Err(e) => e.terminate(),
            };
            rec.task = endpoint;
            rec.reply = Some(PendingReply {
                kind,
                slot: slot.clone(),
            });
        }
        ktrace!("{} waiting on {}", self.worker, endpoint);

        let reply = loop {
            if let Some(reply) = slot.take() {
                break reply;
            }
            self.wait();
        };

        let mut state = self.shared.lock();
        if let Ok(rec) = state.worker_mut(self.worker) {
            rec.task = Endpoint::NONE;
            rec.reply = None;
        }
        reply
    }

    /// Rebind this worker to `target`
    ///
    /// The caller must hold the locks of both processes, and neither process
    /// continues regular operation afterwards. Only for system shutdown.
    /// A target with pending or active work is refused.
    pub fn set_proc(&mut self, target: ProcId) -> Result<(), FatalError> {
        if target == self.proc {
            return Ok(());
        }

        let mut state = self.shared.lock();
        let rec = state.proc_ref(target)?;
        if rec.is_active() || rec.is_pending() {
            return Err(FatalError::TargetNotIdle { proc: target });
        }

        state.proc_mut(self.proc)?.worker = None;
        state.proc_mut(target)?.worker = Some(self.worker);
        state.worker_mut(self.worker)?.proc = Some(target);
        kdebug!("{} moved from {} to {}", self.worker, self.proc, target);
        self.proc = target;
        Ok(())
    }
}
