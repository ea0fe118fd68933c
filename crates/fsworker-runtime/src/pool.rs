//! Worker pool: admission counters, activation policy and the scheduler API
//!
//! A fixed set of N workers serves per-process work. Normal work may only
//! be activated while at least two workers are idle, so one worker (the
//! spare) is always left for calls that are themselves needed to finish
//! already running work. Callers that are part of such a chain pass
//! `use_spare` and may take the last idle worker.
//!
//! Work that cannot be activated is left PENDING on its process record and
//! picked up, in process table order, by workers as they become idle or by
//! [`PoolHandle::allow`] when admission is re-enabled.
//!
//! # Locking
//!
//! Counters, worker records and the process table live in one `PoolState`
//! behind a single mutex. It is never held while a handler runs or while a
//! worker is parked. Handlers run under the per-process lock supplied by the
//! [`ProcessHooks`] collaborator.

use std::backtrace::Backtrace;
use std::ops::Deref;
use std::sync::{mpsc, Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle, ThreadId};

use fsworker_core::constants::EIO;
use fsworker_core::{
    Endpoint, FatalError, Message, PoolError, PoolResult, ProcFlags, ProcId, WorkKind, WorkerId,
};
use fsworker_core::{kdebug, kinfo, ktrace, kwarn};

use crate::config::PoolConfig;
use crate::parking::new_parking;
use crate::process::{Handler, ProcessContext, ProcessHooks, ProcessSnapshot};
use crate::worker::{worker_main, WorkerRecord};

/// Everything guarded by the pool lock
pub(crate) struct PoolState {
    /// Empty while the pool is not initialized
    pub(crate) workers: Vec<WorkerRecord>,
    pub(crate) procs: Vec<ProcessContext>,
    pub(crate) pending: usize,
    pub(crate) busy: usize,
    pub(crate) block_all: bool,
    pub(crate) running: bool,
    /// Set by cleanup; an idle worker woken while set exits
    pub(crate) exiting: bool,
    pub(crate) debug: bool,
}

impl PoolState {
    fn new(config: &PoolConfig) -> Self {
        Self {
            workers: Vec::new(),
            procs: (0..config.nr_procs).map(|_| ProcessContext::default()).collect(),
            pending: 0,
            busy: 0,
            block_all: false,
            running: false,
            exiting: false,
            debug: config.debug_logging,
        }
    }

    /// Idle workers, spare included
    #[inline]
    pub(crate) fn available(&self) -> usize {
        self.workers.len() - self.busy
    }

    #[inline]
    pub(crate) fn is_idle(&self) -> bool {
        self.pending == 0 && self.busy == 0
    }

    /// Pending work exists, a non-spare worker is free, and admission is on
    #[inline]
    pub(crate) fn may_do_pending(&self) -> bool {
        self.pending > 0 && self.available() > 1 && !self.block_all
    }

    pub(crate) fn proc_ref(&self, proc: ProcId) -> Result<&ProcessContext, FatalError> {
        self.procs
            .get(proc.as_usize())
            .ok_or(FatalError::NoSuchProcess(proc))
    }

    pub(crate) fn proc_mut(&mut self, proc: ProcId) -> Result<&mut ProcessContext, FatalError> {
        self.procs
            .get_mut(proc.as_usize())
            .ok_or(FatalError::NoSuchProcess(proc))
    }

    pub(crate) fn worker_ref(&self, worker: WorkerId) -> Result<&WorkerRecord, FatalError> {
        self.workers
            .get(worker.as_usize())
            .ok_or(FatalError::NoSuchWorker(worker))
    }

    pub(crate) fn worker_mut(&mut self, worker: WorkerId) -> Result<&mut WorkerRecord, FatalError> {
        self.workers
            .get_mut(worker.as_usize())
            .ok_or(FatalError::NoSuchWorker(worker))
    }

    fn bind(&mut self, worker: WorkerId, proc: ProcId) {
        self.procs[proc.as_usize()].worker = Some(worker);
        self.workers[worker.as_usize()].proc = Some(proc);
        self.busy += 1;
    }

    /// Drop the worker/process binding after the work cycle finished
    ///
    /// Work accepted for the process after the worker passed the point where
    /// it would have served it is activated again right away. It may use the
    /// spare: it was accepted while the process already had a thread.
    pub(crate) fn unbind(&mut self, worker: WorkerId, proc: ProcId) -> Result<(), FatalError> {
        let rec = &mut self.procs[proc.as_usize()];
        rec.worker = None;
        let leftover = rec.normal.is_some() || rec.has_pm_work();
        self.workers[worker.as_usize()].proc = None;
        debug_assert!(self.busy > 0);
        self.busy -= 1;

        if leftover {
            kdebug!("{} got more work during its work cycle", proc);
            self.try_activate(proc, true)?;
        }
        Ok(())
    }

    /// Hand `proc` to the lowest-indexed idle worker and wake it
    ///
    /// The caller must have checked that a worker is free.
    fn assign(&mut self, proc: ProcId) -> Result<WorkerId, FatalError> {
        let worker = self
            .workers
            .iter()
            .find(|w| w.proc.is_none())
            .map(|w| w.id)
            .ok_or(FatalError::InconsistentState {
                proc,
                reason: "no free worker to assign",
            })?;

        self.bind(worker, proc);
        if self.debug {
            kdebug!("assigned {} to {}", proc, worker);
        }
        self.workers[worker.as_usize()].parking.wake();
        Ok(worker)
    }

    /// Activate new work for `proc` now, or mark it pending
    fn try_activate(&mut self, proc: ProcId, use_spare: bool) -> Result<(), FatalError> {
        let needed = if use_spare { 1 } else { 2 };

        // Spare-permitted work also bypasses the admission block; such work
        // cannot be left pending without risking a deadlock.
        if needed <= self.available() && (!self.block_all || use_spare) {
            self.assign(proc)?;
        } else {
            self.proc_mut(proc)?.flags.insert(ProcFlags::PENDING);
            self.pending += 1;
            if self.debug {
                kdebug!("{} pending ({} pending, {} idle)", proc, self.pending, self.available());
            }
        }
        Ok(())
    }

    /// Hand pending work to free workers in process table order
    fn drain_pending(&mut self) -> Result<(), FatalError> {
        for index in 0..self.procs.len() {
            if !self.may_do_pending() {
                break;
            }
            if self.procs[index].is_pending() {
                self.procs[index].flags.remove(ProcFlags::PENDING);
                self.pending -= 1;
                self.assign(ProcId::new(index as u32))?;
            }
        }
        Ok(())
    }

    /// Bind the first pending process to `worker` without waking anybody
    pub(crate) fn claim_pending(&mut self, worker: WorkerId) -> Result<ProcId, FatalError> {
        let index = self
            .procs
            .iter()
            .position(|p| p.is_pending())
            .ok_or(FatalError::PendingInconsistency)?;

        let proc = ProcId::new(index as u32);
        self.procs[index].flags.remove(ProcFlags::PENDING);
        self.pending -= 1;
        self.bind(worker, proc);
        if self.debug {
            kdebug!("{} took pending {}", worker, proc);
        }
        Ok(proc)
    }

    /// Fail the worker's outstanding reply with EIO and wake it
    fn stop_worker(&mut self, worker: WorkerId) -> Result<(), FatalError> {
        let rec = self.worker_mut(worker)?;
        if !rec.task.is_none() {
            match rec.reply.take() {
                Some(pending) => {
                    ktrace!("{} stopped while waiting on {} ({:?})", worker, rec.task, pending.kind);
                    pending.slot.fail(EIO);
                    rec.task = Endpoint::NONE;
                }
                None => return Err(FatalError::ReplyStorage { worker }),
            }
        } else {
            kwarn!("stopping {} not blocked on any task", worker);
            kwarn!("{}", Backtrace::force_capture());
        }
        rec.parking.wake();
        Ok(())
    }
}

/// State shared by the pool handle, the worker threads and call contexts
pub(crate) struct Shared {
    pub(crate) state: Mutex<PoolState>,
    pub(crate) hooks: Arc<dyn ProcessHooks>,
    pub(crate) config: PoolConfig,
}

impl Shared {
    pub(crate) fn lock(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Counter snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    pub workers: usize,
    pub busy: usize,
    pub pending: usize,
    pub available: usize,
    /// Workers currently blocked in their parking object
    pub parked: usize,
    pub admission_enabled: bool,
    pub running: bool,
}

/// Cloneable handle to the scheduler API of one pool
#[derive(Clone)]
pub struct PoolHandle {
    shared: Arc<Shared>,
}

impl PoolHandle {
    pub(crate) fn from_shared(shared: Arc<Shared>) -> Self {
        Self { shared }
    }

    /// Schedule work for `proc`
    ///
    /// With a handler this is a normal call; without one it is the postponed
    /// process-manager callback, run through
    /// [`ProcessHooks::service_pm_postponed`]. The message is copied.
    /// `use_spare` allows the last idle worker to take the work.
    ///
    /// A process carries at most one unit of each kind. A unit of the other
    /// kind added to a process that is already pending or active is stored
    /// and served with it.
    pub fn start(
        &self,
        proc: ProcId,
        func: Option<Handler>,
        msg: &Message,
        use_spare: bool,
    ) -> Result<(), FatalError> {
        let mut state = self.shared.lock();
        let rec = state.proc_ref(proc)?;

        let is_pm_work = func.is_none();
        let is_pending = rec.is_pending();
        let is_active = rec.is_active();
        let has_pm_work = rec.has_pm_work();

        if is_pending || is_active {
            if is_pending && is_active {
                return Err(FatalError::InconsistentState {
                    proc,
                    reason: "work cannot be both pending and active",
                });
            }
            if let (false, Some((_, existing))) = (is_pm_work, &rec.normal) {
                return Err(FatalError::DuplicateWork {
                    proc,
                    kind: WorkKind::Normal,
                    existing: existing.m_type,
                    submitted: msg.m_type,
                });
            }
            if is_pm_work && has_pm_work {
                return Err(FatalError::DuplicateWork {
                    proc,
                    kind: WorkKind::Postponed,
                    existing: rec.pm_msg.m_type,
                    submitted: msg.m_type,
                });
            }
            ktrace!(
                "adding {} work to {} {}",
                if is_pm_work { WorkKind::Postponed } else { WorkKind::Normal },
                if is_pending { "pending" } else { "active" },
                proc
            );
        } else if rec.normal.is_some() || has_pm_work {
            return Err(FatalError::InconsistentState {
                proc,
                reason: "stored work without pending or active state",
            });
        }

        let rec = state.proc_mut(proc)?;
        match func {
            Some(func) => rec.normal = Some((func, msg.clone())),
            None => {
                rec.pm_msg = msg.clone();
                rec.flags.insert(ProcFlags::PM_WORK);
            }
        }

        if !is_pending && !is_active {
            state.try_activate(proc, use_spare)?;
        }
        Ok(())
    }

    /// Enable or disable admission of new work
    ///
    /// While disabled, new work is left pending even with idle workers,
    /// unless it may use the spare. Enabling hands pending work to idle
    /// workers in process table order. Active work is never stopped.
    /// Meant for server initialization only.
    pub fn allow(&self, allow: bool) -> Result<(), FatalError> {
        let mut state = self.shared.lock();
        state.block_all = !allow;
        if state.debug {
            kdebug!("admission {}", if allow { "enabled" } else { "disabled" });
        }
        state.drain_pending()
    }

    /// Whether normal work can be added for `proc` right now
    ///
    /// True when the process has no work at all, or only pending postponed
    /// work. An active worker would not look at normal work added mid-cycle,
    /// so active processes report false.
    pub fn can_start(&self, proc: ProcId) -> bool {
        let state = self.shared.lock();
        let Ok(rec) = state.proc_ref(proc) else {
            return false;
        };
        if !rec.is_pending() && !rec.is_active() {
            return true;
        }
        rec.normal.is_none() && rec.is_pending()
    }

    /// Idle workers, spare included
    pub fn available(&self) -> usize {
        self.shared.lock().available()
    }

    /// No work pending and no worker busy
    pub fn is_idle(&self) -> bool {
        self.shared.lock().is_idle()
    }

    /// Wake a suspended worker
    pub fn signal(&self, worker: WorkerId) -> Result<(), FatalError> {
        let state = self.shared.lock();
        state.worker_ref(worker)?.parking.wake();
        Ok(())
    }

    /// Abort the external request `worker` is blocked on
    ///
    /// The outstanding reply is replaced by an `EIO` error, the worker no
    /// longer counts as waiting on its endpoint and is woken; the handler sees
    /// the error when its wait returns. Stopping a
    /// worker that waits on nothing is logged with a backtrace and otherwise
    /// harmless.
    pub fn stop(&self, worker: WorkerId) -> Result<(), FatalError> {
        self.shared.lock().stop_worker(worker)
    }

    /// Stop every busy worker blocked on `endpoint`
    ///
    /// Used when a driver or peer server died or stopped responding.
    pub fn stop_by_endpoint(&self, endpoint: Endpoint) -> Result<(), FatalError> {
        if endpoint.is_none() {
            return Ok(());
        }
        let mut state = self.shared.lock();
        let blocked: Vec<WorkerId> = state
            .workers
            .iter()
            .filter(|w| w.proc.is_some() && w.task == endpoint)
            .map(|w| w.id)
            .collect();
        if !blocked.is_empty() {
            kinfo!("stopping {} worker(s) blocked on {}", blocked.len(), endpoint);
        }
        for worker in blocked {
            state.stop_worker(worker)?;
        }
        Ok(())
    }

    /// Hand a reply from `endpoint` to the first worker waiting for it
    ///
    /// Returns false if no busy worker is waiting on `endpoint`.
    pub fn deliver_reply(&self, endpoint: Endpoint, reply: Message) -> bool {
        if endpoint.is_none() {
            return false;
        }
        let mut state = self.shared.lock();
        let Some(rec) = state
            .workers
            .iter_mut()
            .find(|w| w.proc.is_some() && w.task == endpoint)
        else {
            kdebug!("no worker waiting on {}", endpoint);
            return false;
        };

        let Some(pending) = rec.reply.take() else {
            kwarn!("{} waits on {} without a reply slot", rec.id, endpoint);
            return false;
        };
        pending.slot.fill(reply);
        rec.task = Endpoint::NONE;
        rec.parking.wake();
        true
    }

    /// Busy workers blocked on `endpoint`, in index order
    pub fn waiting_on(&self, endpoint: Endpoint) -> Vec<WorkerId> {
        let state = self.shared.lock();
        state
            .workers
            .iter()
            .filter(|w| w.proc.is_some() && !endpoint.is_none() && w.task == endpoint)
            .map(|w| w.id)
            .collect()
    }

    /// Worker running on the OS thread `tid`
    pub fn worker_by_thread(&self, tid: ThreadId) -> Option<WorkerId> {
        let state = self.shared.lock();
        state
            .workers
            .iter()
            .find(|w| w.tid == Some(tid))
            .map(|w| w.id)
    }

    /// Snapshot of one process record
    pub fn process(&self, proc: ProcId) -> Option<ProcessSnapshot> {
        let state = self.shared.lock();
        state.proc_ref(proc).ok().map(|p| p.snapshot())
    }

    /// Process served by `worker`, if any
    pub fn worker_process(&self, worker: WorkerId) -> Option<ProcId> {
        let state = self.shared.lock();
        state.worker_ref(worker).ok().and_then(|w| w.proc)
    }

    pub fn stats(&self) -> PoolStats {
        let state = self.shared.lock();
        PoolStats {
            workers: state.workers.len(),
            busy: state.busy,
            pending: state.pending,
            available: state.available(),
            parked: state.workers.iter().filter(|w| w.parking.is_parked()).count(),
            admission_enabled: !state.block_all,
            running: state.running,
        }
    }

    /// Recount the records behind both counters and check both bindings
    pub fn check_invariants(&self) -> Result<(), FatalError> {
        let state = self.shared.lock();

        for (index, rec) in state.procs.iter().enumerate() {
            let proc = ProcId::new(index as u32);
            if rec.is_pending() && rec.is_active() {
                return Err(FatalError::InconsistentState {
                    proc,
                    reason: "work cannot be both pending and active",
                });
            }
            if (rec.normal.is_some() || rec.has_pm_work()) && !rec.is_pending() && !rec.is_active()
            {
                return Err(FatalError::InconsistentState {
                    proc,
                    reason: "stored work without pending or active state",
                });
            }
            if let Some(worker) = rec.worker {
                let bound = state.worker_ref(worker)?.proc;
                if bound != Some(proc) {
                    return Err(FatalError::InconsistentState {
                        proc,
                        reason: "worker back-reference mismatch",
                    });
                }
            }
        }

        let flagged = state.procs.iter().filter(|p| p.is_pending()).count();
        if flagged != state.pending {
            return Err(FatalError::CounterMismatch {
                counter: "pending",
                recorded: state.pending,
                actual: flagged,
            });
        }

        let bound = state.workers.iter().filter(|w| w.proc.is_some()).count();
        if bound != state.busy {
            return Err(FatalError::CounterMismatch {
                counter: "busy",
                recorded: state.busy,
                actual: bound,
            });
        }
        Ok(())
    }

    pub fn num_workers(&self) -> usize {
        self.shared.config.num_workers
    }

    pub fn nr_procs(&self) -> usize {
        self.shared.config.nr_procs
    }
}

/// Owner of the worker threads
///
/// Created idle; [`init`](WorkerPool::init) starts the threads and
/// [`cleanup`](WorkerPool::cleanup) stops them again, after which `init` may
/// run once more. The scheduler API is reachable through `Deref` to
/// [`PoolHandle`].
pub struct WorkerPool {
    handle: PoolHandle,
    threads: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    pub fn new(config: PoolConfig, hooks: Arc<dyn ProcessHooks>) -> PoolResult<Self> {
        config.validate().map_err(PoolError::InvalidConfig)?;

        let shared = Arc::new(Shared {
            state: Mutex::new(PoolState::new(&config)),
            hooks,
            config,
        });

        Ok(Self {
            handle: PoolHandle::from_shared(shared),
            threads: Vec::new(),
        })
    }

    /// Start all worker threads and wait until each reached its loop
    ///
    /// A thread spawn failure is reported as [`PoolError::Fatal`] after the
    /// threads already started were stopped again; the pool is then back in
    /// its uninitialized state.
    pub fn init(&mut self) -> PoolResult<()> {
        let shared = Arc::clone(&self.handle.shared);
        let n = shared.config.num_workers;

        {
            let mut state = shared.lock();
            if state.running {
                return Err(PoolError::AlreadyInitialized);
            }
            state.workers = (0..n)
                .map(|i| WorkerRecord::new(WorkerId::new(i as u32), new_parking()))
                .collect();
            state.busy = 0;
            state.block_all = false;
            state.exiting = false;
            state.running = true;
        }

        let (ready_tx, ready_rx) = mpsc::channel();
        for i in 0..n {
            let id = WorkerId::new(i as u32);
            let thread_shared = Arc::clone(&shared);
            let thread_ready = ready_tx.clone();

            let spawned = thread::Builder::new()
                .name(format!("fsworker-{}", i))
                .stack_size(shared.config.stack_size)
                .spawn(move || worker_main(thread_shared, id, thread_ready));

            match spawned {
                Ok(handle) => {
                    shared.lock().workers[i].tid = Some(handle.thread().id());
                    self.threads.push(handle);
                }
                Err(e) => {
                    let err = FatalError::ThreadSpawn {
                        worker: id,
                        reason: e.to_string(),
                    };
                    kwarn!("{}; stopping {} started worker(s)", err, self.threads.len());
                    self.shutdown_threads()?;
                    return Err(err.into());
                }
            }
        }
        drop(ready_tx);

        for _ in 0..n {
            if ready_rx.recv().is_err() {
                break;
            }
        }
        kinfo!(
            "worker pool started: {} workers, {} process slots",
            n,
            shared.config.nr_procs
        );
        Ok(())
    }

    /// Terminate and join all worker threads
    ///
    /// Only valid while the pool is idle.
    pub fn cleanup(&mut self) -> PoolResult<()> {
        {
            let state = self.handle.shared.lock();
            if !state.running {
                return Err(PoolError::NotInitialized);
            }
            if !state.is_idle() {
                return Err(PoolError::NotIdle {
                    pending: state.pending,
                    busy: state.busy,
                });
            }
        }

        self.shutdown_threads()?;
        kinfo!("worker pool stopped");
        Ok(())
    }

    /// Make every started worker leave its loop, join it, and drop the records
    fn shutdown_threads(&mut self) -> Result<(), FatalError> {
        {
            // Waking an idle worker while exiting makes it leave its loop
            let mut state = self.handle.shared.lock();
            state.exiting = true;
            for worker in &state.workers {
                worker.parking.wake();
            }
        }

        for (i, handle) in self.threads.drain(..).enumerate() {
            handle.join().map_err(|_| FatalError::ThreadJoin {
                worker: WorkerId::new(i as u32),
            })?;
        }

        // Only records without a thread can still be bound here: work handed
        // to them during a failed init goes back to pending.
        let mut state = self.handle.shared.lock();
        let stranded: Vec<ProcId> = state.workers.iter().filter_map(|w| w.proc).collect();
        for proc in stranded {
            let rec = state.proc_mut(proc)?;
            rec.worker = None;
            rec.flags.insert(ProcFlags::PENDING);
            state.pending += 1;
        }
        state.workers.clear();
        state.busy = 0;
        state.running = false;
        state.exiting = false;
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.handle.shared.lock().running
    }

    pub fn handle(&self) -> PoolHandle {
        self.handle.clone()
    }
}

impl Deref for WorkerPool {
    type Target = PoolHandle;

    fn deref(&self) -> &PoolHandle {
        &self.handle
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        if self.threads.is_empty() {
            return;
        }
        match self.cleanup() {
            Ok(()) => {}
            Err(e) => {
                // Busy workers leave once their current work is done
                kwarn!("dropping worker pool: {}", e);
                let mut state = self.handle.shared.lock();
                state.exiting = true;
                for worker in &state.workers {
                    worker.parking.wake();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests;
