use super::*;
use crate::context::CallContext;
use crate::process::{handler, TableLocks};
use crate::tls::current_worker;
use fsworker_core::constants::OK;
use fsworker_core::ReplyKind;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Condvar};
use std::time::{Duration, Instant};

const TIMEOUT: Duration = Duration::from_secs(5);

struct TestHooks {
    locks: TableLocks,
    log: Mutex<Vec<(ProcId, i32)>>,
    cleanups: AtomicUsize,
}

impl TestHooks {
    fn new(nr_procs: usize) -> Arc<Self> {
        Arc::new(Self {
            locks: TableLocks::new(nr_procs),
            log: Mutex::new(Vec::new()),
            cleanups: AtomicUsize::new(0),
        })
    }

    fn record(&self, ctx: &CallContext) {
        self.log
            .lock()
            .unwrap()
            .push((ctx.proc(), ctx.message().m_type));
    }

    fn log(&self) -> Vec<(ProcId, i32)> {
        self.log.lock().unwrap().clone()
    }
}

impl ProcessHooks for TestHooks {
    fn lock_proc(&self, proc: ProcId) {
        self.locks.lock(proc);
    }

    fn unlock_proc(&self, proc: ProcId) {
        self.locks.unlock(proc);
    }

    fn service_pm_postponed(&self, ctx: &mut CallContext) {
        self.record(ctx);
    }

    fn thread_cleanup(&self, _ctx: &mut CallContext) {
        self.cleanups.fetch_add(1, Ordering::SeqCst);
    }
}

/// Closed until opened once; handlers block on it
#[derive(Default)]
struct Gate {
    open: Mutex<bool>,
    opened: Condvar,
}

impl Gate {
    fn wait(&self) {
        let mut open = self.open.lock().unwrap();
        while !*open {
            open = self.opened.wait(open).unwrap();
        }
    }

    fn open(&self) {
        *self.open.lock().unwrap() = true;
        self.opened.notify_all();
    }
}

/// Hooks whose per-call cleanup reports in, then blocks on a gate
struct SlowCleanup {
    inner: Arc<TestHooks>,
    gate: Arc<Gate>,
    entered: mpsc::Sender<ProcId>,
}

impl ProcessHooks for SlowCleanup {
    fn lock_proc(&self, proc: ProcId) {
        self.inner.lock_proc(proc);
    }

    fn unlock_proc(&self, proc: ProcId) {
        self.inner.unlock_proc(proc);
    }

    fn service_pm_postponed(&self, ctx: &mut CallContext) {
        self.inner.service_pm_postponed(ctx);
    }

    fn thread_cleanup(&self, ctx: &mut CallContext) {
        let _ = self.entered.send(ctx.proc());
        self.gate.wait();
    }
}

fn config(workers: usize) -> PoolConfig {
    PoolConfig::defaults()
        .num_workers(workers)
        .nr_procs(16)
        .stack_size(128 * 1024)
}

fn new_pool(workers: usize) -> (WorkerPool, Arc<TestHooks>) {
    let hooks = TestHooks::new(16);
    let mut pool = WorkerPool::new(config(workers), hooks.clone()).unwrap();
    pool.init().unwrap();
    (pool, hooks)
}

/// Handler that reports its process, then blocks on `gate`
fn gated(gate: &Arc<Gate>, started: &mpsc::Sender<ProcId>) -> Handler {
    let gate = Arc::clone(gate);
    let started = started.clone();
    handler(move |ctx| {
        let _ = started.send(ctx.proc());
        gate.wait();
    })
}

fn recording(hooks: &Arc<TestHooks>) -> Handler {
    let hooks = Arc::clone(hooks);
    handler(move |ctx| hooks.record(ctx))
}

fn recv<T>(rx: &mpsc::Receiver<T>) -> T {
    rx.recv_timeout(TIMEOUT).expect("timed out waiting for handler")
}

fn wait_until(what: &str, cond: impl Fn() -> bool) {
    let deadline = Instant::now() + TIMEOUT;
    while !cond() {
        assert!(Instant::now() < deadline, "timed out waiting for {}", what);
        thread::sleep(Duration::from_millis(1));
    }
}

fn p(index: u32) -> ProcId {
    ProcId::new(index)
}

#[test]
fn test_spare_worker_reserved() {
    let (pool, _hooks) = new_pool(3);
    let gate = Arc::new(Gate::default());
    let (tx, rx) = mpsc::channel();
    let msg = Message::new(0x10);

    pool.start(p(0), Some(gated(&gate, &tx)), &msg, false).unwrap();
    pool.start(p(1), Some(gated(&gate, &tx)), &msg, false).unwrap();
    assert_eq!(pool.available(), 1);

    // Only the spare is left
    pool.start(p(2), Some(gated(&gate, &tx)), &msg, false).unwrap();
    assert!(pool.process(p(2)).unwrap().is_pending());
    assert_eq!(pool.stats().pending, 1);

    pool.start(p(3), Some(gated(&gate, &tx)), &msg, true).unwrap();
    assert!(pool.process(p(3)).unwrap().is_active());

    let mut started = vec![recv(&rx), recv(&rx), recv(&rx)];
    started.sort();
    assert_eq!(started, vec![p(0), p(1), p(3)]);

    let stats = pool.stats();
    assert_eq!(stats.busy, 3);
    assert_eq!(stats.available, 0);
    pool.check_invariants().unwrap();

    gate.open();
    assert_eq!(recv(&rx), p(2));
    wait_until("pool idle", || pool.is_idle());
    assert_eq!(pool.available(), 3);
    wait_until("workers parked", || pool.stats().parked == 3);
    pool.check_invariants().unwrap();
}

#[test]
fn test_admission_gate() {
    let (pool, _hooks) = new_pool(3);
    let gate = Arc::new(Gate::default());
    let (tx, rx) = mpsc::channel();
    let msg = Message::new(0x11);

    pool.allow(false).unwrap();
    assert!(!pool.stats().admission_enabled);

    pool.start(p(1), Some(gated(&gate, &tx)), &msg, false).unwrap();
    assert!(pool.process(p(1)).unwrap().is_pending());
    assert_eq!(pool.available(), 3);

    // Work that may use the spare is never held back
    pool.start(p(2), Some(gated(&gate, &tx)), &msg, true).unwrap();
    assert_eq!(recv(&rx), p(2));

    pool.allow(true).unwrap();
    assert_eq!(recv(&rx), p(1));
    assert_eq!(pool.stats().pending, 0);

    gate.open();
    wait_until("pool idle", || pool.is_idle());
}

#[test]
fn test_pending_drained_in_table_order() {
    let (pool, _hooks) = new_pool(4);
    let gate = Arc::new(Gate::default());
    let (tx, rx) = mpsc::channel();
    let msg = Message::new(0x12);

    pool.allow(false).unwrap();
    for index in [5, 2, 12, 9] {
        pool.start(p(index), Some(gated(&gate, &tx)), &msg, false).unwrap();
    }
    assert_eq!(pool.stats().pending, 4);

    pool.allow(true).unwrap();

    // Lowest process first, each to the lowest idle worker; the spare stays
    assert_eq!(pool.process(p(2)).unwrap().worker, Some(WorkerId::new(0)));
    assert_eq!(pool.process(p(5)).unwrap().worker, Some(WorkerId::new(1)));
    assert_eq!(pool.process(p(9)).unwrap().worker, Some(WorkerId::new(2)));
    assert!(pool.process(p(12)).unwrap().is_pending());
    assert_eq!(pool.stats().pending, 1);
    pool.check_invariants().unwrap();

    for _ in 0..3 {
        recv(&rx);
    }
    gate.open();
    assert_eq!(recv(&rx), p(12));
    wait_until("pool idle", || pool.is_idle());
}

#[test]
fn test_duplicate_work_rejected() {
    let (pool, hooks) = new_pool(2);
    let gate = Arc::new(Gate::default());
    let (tx, rx) = mpsc::channel();

    pool.start(p(1), Some(gated(&gate, &tx)), &Message::new(0x20), false)
        .unwrap();
    assert_eq!(recv(&rx), p(1));
    assert!(!pool.can_start(p(1)));

    let err = pool
        .start(p(1), Some(recording(&hooks)), &Message::new(0x21), false)
        .unwrap_err();
    assert_eq!(
        err,
        FatalError::DuplicateWork {
            proc: p(1),
            kind: WorkKind::Normal,
            existing: 0x20,
            submitted: 0x21,
        }
    );

    // Postponed work rides along with the active process
    pool.start(p(1), None, &Message::new(0x30), false).unwrap();
    assert_eq!(pool.process(p(1)).unwrap().postponed_call, Some(0x30));

    let err = pool.start(p(1), None, &Message::new(0x31), false).unwrap_err();
    assert!(matches!(
        err,
        FatalError::DuplicateWork { kind: WorkKind::Postponed, .. }
    ));

    gate.open();
    wait_until("pool idle", || pool.is_idle());
    assert_eq!(hooks.log(), vec![(p(1), 0x30)]);

    let snap = pool.process(p(1)).unwrap();
    assert_eq!(snap.normal_call, None);
    assert_eq!(snap.postponed_call, None);
    pool.check_invariants().unwrap();
}

#[test]
fn test_normal_work_runs_before_postponed() {
    let (pool, hooks) = new_pool(3);

    assert!(pool.can_start(p(3)));
    pool.allow(false).unwrap();

    pool.start(p(3), None, &Message::new(0x40), false).unwrap();
    assert!(pool.process(p(3)).unwrap().is_pending());
    assert!(pool.can_start(p(3)));

    pool.start(p(3), Some(recording(&hooks)), &Message::new(0x41), false)
        .unwrap();
    assert!(!pool.can_start(p(3)));
    assert_eq!(pool.stats().pending, 1);

    pool.allow(true).unwrap();
    wait_until("pool idle", || pool.is_idle());

    assert_eq!(hooks.log(), vec![(p(3), 0x41), (p(3), 0x40)]);
    assert_eq!(hooks.cleanups.load(Ordering::SeqCst), 1);
    assert!(!hooks.locks.is_locked(p(3)));
}

#[test]
fn test_handler_sees_message_and_clean_error_code() {
    let (pool, _hooks) = new_pool(2);
    let (tx, rx) = mpsc::channel();

    let h = handler(move |ctx| {
        let _ = tx.send((ctx.message().clone(), ctx.err_code, ctx.has_normal_work()));
        ctx.err_code = -1;
    });
    let msg = Message::with_payload(0x50, b"open".to_vec());
    pool.start(p(4), Some(h.clone()), &msg, false).unwrap();
    let (seen, err_code, stored) = recv(&rx);
    assert_eq!(seen, msg);
    assert_eq!(err_code, OK);
    assert!(stored);

    wait_until("pool idle", || pool.is_idle());
    pool.start(p(4), Some(h), &msg, false).unwrap();
    assert_eq!(recv(&rx).1, OK);
    wait_until("pool idle", || pool.is_idle());
}

#[test]
fn test_cleanup_requires_idle_and_allows_reinit() {
    let (mut pool, hooks) = new_pool(2);
    let gate = Arc::new(Gate::default());
    let (tx, rx) = mpsc::channel();

    pool.start(p(0), Some(gated(&gate, &tx)), &Message::new(1), false)
        .unwrap();
    recv(&rx);
    assert!(!pool.is_idle());
    assert_eq!(
        pool.cleanup(),
        Err(PoolError::NotIdle { pending: 0, busy: 1 })
    );

    gate.open();
    wait_until("pool idle", || pool.is_idle());
    pool.cleanup().unwrap();
    assert!(!pool.is_running());
    assert_eq!(pool.available(), 0);
    assert_eq!(pool.cleanup(), Err(PoolError::NotInitialized));

    pool.init().unwrap();
    assert_eq!(pool.init(), Err(PoolError::AlreadyInitialized));
    pool.start(p(0), Some(recording(&hooks)), &Message::new(2), false)
        .unwrap();
    wait_until("pool idle", || pool.is_idle());
    assert_eq!(hooks.log(), vec![(p(0), 2)]);
    pool.cleanup().unwrap();
}

#[test]
fn test_start_before_init_stays_pending() {
    let hooks = TestHooks::new(16);
    let mut pool = WorkerPool::new(config(2), hooks.clone()).unwrap();

    pool.start(p(6), Some(recording(&hooks)), &Message::new(7), false)
        .unwrap();
    let stats = pool.stats();
    assert_eq!(stats.pending, 1);
    assert_eq!(stats.available, 0);
    assert!(!stats.running);

    pool.init().unwrap();
    wait_until("pool idle", || pool.is_idle());
    assert_eq!(hooks.log(), vec![(p(6), 7)]);
}

#[test]
fn test_invalid_config_and_process() {
    let hooks = TestHooks::new(16);
    let err = WorkerPool::new(config(1), hooks.clone()).err();
    assert!(matches!(err, Some(PoolError::InvalidConfig(_))));

    let (pool, hooks) = new_pool(2);
    let err = pool
        .start(p(16), Some(recording(&hooks)), &Message::new(1), false)
        .unwrap_err();
    assert_eq!(err, FatalError::NoSuchProcess(p(16)));
    assert!(pool.process(p(16)).is_none());
    assert!(!pool.can_start(p(16)));
    assert_eq!(pool.num_workers(), 2);
    assert_eq!(pool.nr_procs(), 16);
}

#[test]
fn test_stop_fails_reply_with_eio() {
    let (pool, _hooks) = new_pool(2);
    let (tx, rx) = mpsc::channel();
    let driver = Endpoint::new(7);

    let h = handler(move |ctx| {
        ctx.err_code = 42;
        let reply = ctx.wait_for_reply(driver, ReplyKind::Driver);
        let _ = tx.send((reply.m_type, ctx.err_code));
    });
    pool.start(p(1), Some(h), &Message::new(0x60), false).unwrap();

    wait_until("worker blocked", || !pool.waiting_on(driver).is_empty());
    let worker = pool.waiting_on(driver)[0];
    assert_eq!(pool.worker_process(worker), Some(p(1)));

    pool.stop(worker).unwrap();
    assert_eq!(recv(&rx), (EIO, 42));

    wait_until("pool idle", || pool.is_idle());
    assert!(pool.waiting_on(driver).is_empty());
}

#[test]
fn test_stop_by_endpoint_and_deliver_reply() {
    let (pool, _hooks) = new_pool(4);
    let (tx, rx) = mpsc::channel();
    let failed = Endpoint::new(7);
    let alive = Endpoint::new(8);

    for (index, ep) in [(1, failed), (2, failed), (3, alive)] {
        let tx = tx.clone();
        let h = handler(move |ctx| {
            let reply = ctx.wait_for_reply(ep, ReplyKind::FileServer);
            let _ = tx.send((ctx.proc(), reply.m_type));
        });
        pool.start(p(index), Some(h), &Message::new(0x70), false).unwrap();
    }

    wait_until("workers blocked", || {
        pool.waiting_on(failed).len() == 2 && pool.waiting_on(alive).len() == 1
    });

    pool.stop_by_endpoint(Endpoint::NONE).unwrap();
    pool.stop_by_endpoint(failed).unwrap();
    let mut stopped = vec![recv(&rx), recv(&rx)];
    stopped.sort();
    assert_eq!(stopped, vec![(p(1), EIO), (p(2), EIO)]);
    assert_eq!(pool.waiting_on(alive).len(), 1);

    assert!(!pool.deliver_reply(Endpoint::new(99), Message::new(0)));
    assert!(pool.deliver_reply(alive, Message::new(5)));
    assert_eq!(recv(&rx), (p(3), 5));

    wait_until("pool idle", || pool.is_idle());
    pool.check_invariants().unwrap();
}

#[test]
fn test_stop_idle_worker_is_harmless() {
    let (pool, hooks) = new_pool(2);

    pool.stop(WorkerId::new(0)).unwrap();
    assert_eq!(
        pool.stop(WorkerId::new(9)),
        Err(FatalError::NoSuchWorker(WorkerId::new(9)))
    );

    // The stray wake must not take the worker down
    for index in 0..4 {
        pool.start(p(index), Some(recording(&hooks)), &Message::new(1), false)
            .unwrap();
        wait_until("pool idle", || pool.is_idle());
    }
    assert_eq!(hooks.log().len(), 4);
    assert_eq!(pool.available(), 2);
}

#[test]
fn test_signal_resumes_waiting_handler() {
    let (pool, _hooks) = new_pool(2);
    let (tx, rx) = mpsc::channel();

    let h = handler(move |ctx| {
        ctx.err_code = 13;
        let _ = tx.send(Err(ctx.worker()));
        ctx.wait();
        let _ = tx.send(Ok((ctx.proc(), ctx.err_code)));
    });
    pool.start(p(2), Some(h), &Message::new(0x80), false).unwrap();

    let worker = match recv(&rx) {
        Err(worker) => worker,
        Ok(_) => panic!("handler finished without waiting"),
    };
    pool.signal(worker).unwrap();
    assert_eq!(recv(&rx), Ok((p(2), 13)));
    wait_until("pool idle", || pool.is_idle());
}

#[test]
fn test_worker_identity() {
    let (pool, _hooks) = new_pool(2);
    let (tx, rx) = mpsc::channel();

    let h = handler(move |ctx| {
        let _ = tx.send((ctx.worker(), thread::current().id(), current_worker()));
    });
    pool.start(p(0), Some(h), &Message::new(1), false).unwrap();

    let (worker, tid, tls_worker) = recv(&rx);
    assert_eq!(tls_worker, Some(worker));
    assert_eq!(pool.worker_by_thread(tid), Some(worker));
    assert_eq!(pool.worker_by_thread(thread::current().id()), None);
    assert_eq!(current_worker(), None);
    wait_until("pool idle", || pool.is_idle());
}

#[test]
fn test_set_proc_rebinds_worker() {
    let (pool, hooks) = new_pool(3);
    let gate = Arc::new(Gate::default());
    let (tx, rx) = mpsc::channel();
    let (started_tx, started_rx) = mpsc::channel();

    pool.start(p(3), Some(gated(&gate, &started_tx)), &Message::new(1), false)
        .unwrap();
    assert_eq!(recv(&started_rx), p(3));

    let locks = Arc::clone(&hooks);
    let h = handler(move |ctx| {
        let busy = ctx.set_proc(p(3));
        let same = ctx.set_proc(p(1));

        locks.locks.lock(p(2));
        let moved = ctx.set_proc(p(2));
        locks.locks.unlock(p(1));

        let pool = ctx.pool();
        let _ = tx.send((
            busy,
            same,
            moved,
            ctx.proc(),
            pool.process(p(2)).and_then(|s| s.worker) == Some(ctx.worker()),
            pool.process(p(1)).and_then(|s| s.worker),
        ));
    });
    pool.start(p(1), Some(h), &Message::new(2), false).unwrap();

    let (busy, same, moved, now, bound, old) = recv(&rx);
    assert_eq!(busy, Err(FatalError::TargetNotIdle { proc: p(3) }));
    assert_eq!(same, Ok(()));
    assert_eq!(moved, Ok(()));
    assert_eq!(now, p(2));
    assert!(bound);
    assert_eq!(old, None);

    gate.open();
    wait_until("pool idle", || pool.is_idle());
    assert!(!hooks.locks.is_locked(p(1)));
    assert!(!hooks.locks.is_locked(p(2)));
    assert!(pool.process(p(1)).unwrap().normal_call.is_none());
    pool.check_invariants().unwrap();
}

#[test]
fn test_submit_from_handler() {
    let (pool, hooks) = new_pool(3);
    let (tx, rx) = mpsc::channel();

    let follow_up = recording(&hooks);
    let h = handler(move |ctx| {
        let result = ctx
            .pool()
            .start(p(9), Some(follow_up.clone()), &Message::new(0x91), true);
        let _ = tx.send(result);
    });
    pool.start(p(8), Some(h), &Message::new(0x90), false).unwrap();

    assert_eq!(recv(&rx), Ok(()));
    wait_until("pool idle", || pool.is_idle());
    assert_eq!(hooks.log(), vec![(p(9), 0x91)]);
}

#[test]
fn test_duplicate_work_on_pending_process() {
    let (pool, hooks) = new_pool(2);
    pool.allow(false).unwrap();

    pool.start(p(4), Some(recording(&hooks)), &Message::new(0x20), false)
        .unwrap();
    assert!(pool.process(p(4)).unwrap().is_pending());

    let err = pool
        .start(p(4), Some(recording(&hooks)), &Message::new(0x21), false)
        .unwrap_err();
    assert_eq!(
        err,
        FatalError::DuplicateWork {
            proc: p(4),
            kind: WorkKind::Normal,
            existing: 0x20,
            submitted: 0x21,
        }
    );

    pool.start(p(4), None, &Message::new(0x30), false).unwrap();
    let err = pool.start(p(4), None, &Message::new(0x31), true).unwrap_err();
    assert_eq!(
        err,
        FatalError::DuplicateWork {
            proc: p(4),
            kind: WorkKind::Postponed,
            existing: 0x30,
            submitted: 0x31,
        }
    );

    // Rejected submissions leave the record as it was
    let snap = pool.process(p(4)).unwrap();
    assert!(snap.is_pending());
    assert_eq!(snap.normal_call, Some(0x20));
    assert_eq!(snap.postponed_call, Some(0x30));
    assert_eq!(pool.stats().pending, 1);
    pool.check_invariants().unwrap();

    pool.allow(true).unwrap();
    wait_until("pool idle", || pool.is_idle());
    assert_eq!(hooks.log(), vec![(p(4), 0x20), (p(4), 0x30)]);
}

#[test]
fn test_corrupt_process_record_rejected() {
    let (pool, hooks) = new_pool(2);

    pool.handle.shared.lock().procs[5]
        .flags
        .insert(ProcFlags::PM_WORK);
    let err = pool
        .start(p(5), Some(recording(&hooks)), &Message::new(1), false)
        .unwrap_err();
    assert_eq!(
        err,
        FatalError::InconsistentState {
            proc: p(5),
            reason: "stored work without pending or active state",
        }
    );
    assert_eq!(pool.process(p(5)).unwrap().normal_call, None);
    assert_eq!(pool.stats().busy, 0);
    assert_eq!(pool.stats().pending, 0);

    {
        let mut state = pool.handle.shared.lock();
        state.procs[5].flags.remove(ProcFlags::PM_WORK);
        state.procs[6].flags.insert(ProcFlags::PENDING);
        state.procs[6].worker = Some(WorkerId::new(0));
    }
    let err = pool.start(p(6), None, &Message::new(2), false).unwrap_err();
    assert_eq!(
        err,
        FatalError::InconsistentState {
            proc: p(6),
            reason: "work cannot be both pending and active",
        }
    );
    assert!(matches!(
        pool.check_invariants(),
        Err(FatalError::InconsistentState { .. })
    ));

    {
        let mut state = pool.handle.shared.lock();
        state.procs[6].flags.remove(ProcFlags::PENDING);
        state.procs[6].worker = None;
    }
    pool.check_invariants().unwrap();
    assert!(hooks.log().is_empty());
}

#[test]
fn test_work_added_during_cleanup_runs() {
    let inner = TestHooks::new(16);
    let gate = Arc::new(Gate::default());
    let (tx, rx) = mpsc::channel();
    let hooks = Arc::new(SlowCleanup {
        inner: Arc::clone(&inner),
        gate: Arc::clone(&gate),
        entered: tx,
    });
    let mut pool = WorkerPool::new(config(2), hooks).unwrap();
    pool.init().unwrap();

    pool.start(p(1), Some(recording(&inner)), &Message::new(0x21), false)
        .unwrap();
    assert_eq!(recv(&rx), p(1));

    // The worker is past both servicing steps but still bound
    assert!(pool.process(p(1)).unwrap().is_active());
    pool.start(p(1), None, &Message::new(0x30), false).unwrap();
    pool.start(p(1), Some(recording(&inner)), &Message::new(0x22), false)
        .unwrap();

    gate.open();
    wait_until("pool idle", || pool.is_idle());
    assert_eq!(
        inner.log(),
        vec![(p(1), 0x21), (p(1), 0x22), (p(1), 0x30)]
    );

    let snap = pool.process(p(1)).unwrap();
    assert!(snap.flags.is_empty());
    assert_eq!(snap.worker, None);
    pool.check_invariants().unwrap();

    pool.start(p(1), Some(recording(&inner)), &Message::new(0x23), false)
        .unwrap();
    wait_until("pool idle", || pool.is_idle());
    assert_eq!(inner.log().len(), 4);
}

#[cfg(target_pointer_width = "64")]
#[test]
fn test_failed_init_rolls_back() {
    let hooks = TestHooks::new(16);
    let mut pool = WorkerPool::new(config(2).stack_size(1 << 50), hooks.clone()).unwrap();

    let err = pool.init().unwrap_err();
    assert!(matches!(
        err,
        PoolError::Fatal(FatalError::ThreadSpawn { .. })
    ));
    assert!(!pool.is_running());
    assert_eq!(pool.available(), 0);

    // No phantom workers: new work waits for a working init
    pool.start(p(0), Some(recording(&hooks)), &Message::new(1), false)
        .unwrap();
    assert!(pool.process(p(0)).unwrap().is_pending());
    assert_eq!(pool.stats().busy, 0);
    pool.check_invariants().unwrap();
    assert_eq!(pool.cleanup(), Err(PoolError::NotInitialized));
}

#[test]
fn test_set_proc_refuses_pending_target() {
    let (pool, hooks) = new_pool(3);
    let (tx, rx) = mpsc::channel();

    pool.allow(false).unwrap();
    pool.start(p(5), Some(recording(&hooks)), &Message::new(0x55), false)
        .unwrap();
    assert!(pool.process(p(5)).unwrap().is_pending());

    let h = handler(move |ctx| {
        let _ = tx.send(ctx.set_proc(p(5)));
    });
    pool.start(p(1), Some(h), &Message::new(1), true).unwrap();
    assert_eq!(recv(&rx), Err(FatalError::TargetNotIdle { proc: p(5) }));

    wait_until("handler done", || pool.stats().busy == 0);
    let snap = pool.process(p(5)).unwrap();
    assert!(snap.is_pending());
    assert_eq!(snap.worker, None);
    pool.check_invariants().unwrap();

    pool.allow(true).unwrap();
    wait_until("pool idle", || pool.is_idle());
    assert_eq!(hooks.log(), vec![(p(5), 0x55)]);
}
