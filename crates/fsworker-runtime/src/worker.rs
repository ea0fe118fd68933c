//! Worker threads
//!
//! Each worker is an OS thread that loops: get work, run it, repeat. Its
//! bookkeeping record lives in the pool state so other threads can bind it
//! to a process, register the endpoint it waits on and wake it.

use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::thread::ThreadId;

use fsworker_core::constants::OK;
use fsworker_core::kprint::{clear_worker_tag, set_worker_tag};
use fsworker_core::{kdebug, ktrace};
use fsworker_core::{Endpoint, PendingReply, ProcFlags, ProcId, WorkerId};

use crate::context::CallContext;
use crate::parking::WorkerParking;
use crate::pool::Shared;
use crate::tls::{clear_current_worker, set_current_worker};

/// Per-worker record, guarded by the pool lock
pub(crate) struct WorkerRecord {
    pub(crate) id: WorkerId,
    /// Process being served; `None` while idle
    pub(crate) proc: Option<ProcId>,
    /// Endpoint the worker is blocked on, `Endpoint::NONE` if any
    pub(crate) task: Endpoint,
    /// Where the reply from `task` goes
    pub(crate) reply: Option<PendingReply>,
    /// Error code saved across a suspension
    pub(crate) err_code: i32,
    pub(crate) tid: Option<ThreadId>,
    pub(crate) parking: Arc<dyn WorkerParking>,
}

impl WorkerRecord {
    pub(crate) fn new(id: WorkerId, parking: Arc<dyn WorkerParking>) -> Self {
        Self {
            id,
            proc: None,
            task: Endpoint::NONE,
            reply: None,
            err_code: OK,
            tid: None,
            parking,
        }
    }
}

/// Thread body of worker `id`
pub(crate) fn worker_main(shared: Arc<Shared>, id: WorkerId, ready: Sender<()>) {
    set_current_worker(id);
    set_worker_tag(id.as_u32());
    let _ = ready.send(());
    drop(ready);
    ktrace!("{} ready", id);

    while let Some(proc) = get_work(&shared, id) {
        run_work(&shared, id, proc);
    }

    ktrace!("{} exiting", id);
    clear_worker_tag();
    clear_current_worker();
}

/// Wait until a process is bound to this worker
///
/// Pending work is claimed directly when the activation policy allows it.
/// Returns `None` once the pool is shutting down.
fn get_work(shared: &Shared, id: WorkerId) -> Option<ProcId> {
    let index = id.as_usize();
    let mut state = shared.lock();

    loop {
        let mut assigned = state.workers[index].proc;
        if assigned.is_none() && !state.exiting && state.may_do_pending() {
            match state.claim_pending(id) {
                Ok(proc) => assigned = Some(proc),
                Err(e) => e.terminate(),
            }
        }
        if let Some(proc) = assigned {
            // A wake aimed at the idle worker must not end the first wait of the call
            state.workers[index].parking.discard_wake();
            return Some(proc);
        }
        if state.exiting {
            return None;
        }

        let parking = Arc::clone(&state.workers[index].parking);
        drop(state);
        parking.park();
        state = shared.lock();

        if state.workers[index].proc.is_none() && !state.exiting {
            kdebug!("{} woken without work", id);
        }
    }
}

/// Serve the stored work of `proc`: normal call first, then the postponed one
fn run_work(shared: &Arc<Shared>, id: WorkerId, proc: ProcId) {
    let mut ctx = CallContext::new(Arc::clone(shared), id, proc);
    shared.hooks.lock_proc(proc);

    let normal = {
        let state = shared.lock();
        state.procs[proc.as_usize()]
            .normal
            .as_ref()
            .map(|(func, msg)| (Arc::clone(func), msg.clone()))
    };

    if let Some((func, msg)) = normal {
        ctx.m_in = msg;
        ctx.err_code = OK;
        if shared.config.debug_logging {
            kdebug!("{} call {:#x}", proc, ctx.m_in.m_type);
        }

        func(&mut ctx);

        // Cleared only now so the call still counts as stored while it runs.
        // A handler that rebound the worker leaves both processes cleared.
        let mut state = shared.lock();
        state.procs[ctx.proc().as_usize()].normal = None;
        if ctx.proc() != proc {
            state.procs[proc.as_usize()].normal = None;
        }
    }

    let pm_msg = {
        let state = shared.lock();
        let rec = &state.procs[ctx.proc().as_usize()];
        rec.has_pm_work().then(|| rec.pm_msg.clone())
    };

    if let Some(msg) = pm_msg {
        ctx.m_in = msg;
        if shared.config.debug_logging {
            kdebug!("{} postponed call {:#x}", ctx.proc(), ctx.m_in.m_type);
        }

        shared.hooks.service_pm_postponed(&mut ctx);

        shared.lock().procs[ctx.proc().as_usize()]
            .flags
            .remove(ProcFlags::PM_WORK);
    }

    shared.hooks.thread_cleanup(&mut ctx);
    shared.hooks.unlock_proc(ctx.proc());

    if let Err(e) = shared.lock().unbind(id, ctx.proc()) {
        e.terminate();
    }
}
