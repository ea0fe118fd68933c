//! Basic worker pool example
//!
//! A toy file server: read calls block on a driver endpoint until a driver
//! thread replies. Halfway through, one driver "crashes" and every worker
//! blocked on it is stopped with EIO. Exit notifications from the process
//! manager arrive as postponed calls.
//!
//! # Environment Variables
//!
//! - `FSW_FLUSH_EPRINT=1` - Flush log output immediately
//! - `FSW_LOG_LEVEL=debug` - Set log level (off, error, warn, info, debug, trace)
//! - `FSW_NUM_WORKERS=N` - Override the number of workers

use fsworker::constants::EIO;
use fsworker::{handler, kdebug, kinfo, kwarn};
use fsworker::{
    CallContext, Endpoint, Message, PoolConfig, ProcId, ProcessHooks, ReplyKind, TableLocks,
    WorkerPool,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

const READ: i32 = 3;
const EXIT: i32 = 0x101;

const DISK: Endpoint = Endpoint::new(100);
const TAPE: Endpoint = Endpoint::new(101);

struct Hooks {
    locks: TableLocks,
    exits: AtomicUsize,
}

impl ProcessHooks for Hooks {
    fn lock_proc(&self, proc: ProcId) {
        self.locks.lock(proc);
    }

    fn unlock_proc(&self, proc: ProcId) {
        self.locks.unlock(proc);
    }

    fn service_pm_postponed(&self, ctx: &mut CallContext) {
        kdebug!("{} exited", ctx.proc());
        self.exits.fetch_add(1, Ordering::SeqCst);
    }
}

// FSW_LOG_LEVEL=debug FSW_FLUSH_EPRINT=1 cargo run -p fsworker-basic
fn main() {
    println!("=== fsworker Basic Example ===\n");

    let config = PoolConfig::default().nr_procs(32).debug_logging(true);
    let hooks = Arc::new(Hooks {
        locks: TableLocks::new(config.nr_procs),
        exits: AtomicUsize::new(0),
    });

    let mut pool = match WorkerPool::new(config, hooks.clone()) {
        Ok(pool) => pool,
        Err(e) => {
            eprintln!("error: {}", e);
            std::process::exit(1);
        }
    };
    if let Err(e) = pool.init() {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }

    let ok = Arc::new(AtomicUsize::new(0));
    let failed = Arc::new(AtomicUsize::new(0));

    let read = {
        let ok = ok.clone();
        let failed = failed.clone();
        handler(move |ctx| {
            let driver = if ctx.proc().as_u32() % 2 == 0 { DISK } else { TAPE };
            let reply = ctx.wait_for_reply(driver, ReplyKind::Driver);
            if reply.m_type == EIO {
                failed.fetch_add(1, Ordering::SeqCst);
            } else {
                ok.fetch_add(1, Ordering::SeqCst);
            }
        })
    };

    // Hold work back until "initialization" is done
    if let Err(e) = pool.allow(false) {
        e.terminate();
    }
    let n = 12;
    for i in 0..n {
        let proc = ProcId::new(i);
        let msg = Message::with_payload(READ, format!("block {}", i));
        if let Err(e) = pool.start(proc, Some(read.clone()), &msg, false) {
            e.terminate();
        }
    }
    println!("Queued {} reads, {} pending", n, pool.stats().pending);
    if let Err(e) = pool.allow(true) {
        e.terminate();
    }

    // Disk driver answers everything; the tape driver dies after a while
    let handle = pool.handle();
    let driver = thread::spawn(move || {
        let start = Instant::now();
        while !handle.is_idle() {
            if handle.deliver_reply(DISK, Message::with_payload(0, "data")) {
                continue;
            }
            if start.elapsed() > Duration::from_millis(50) {
                if let Err(e) = handle.stop_by_endpoint(TAPE) {
                    e.terminate();
                }
            }
            thread::sleep(Duration::from_millis(1));
        }
    });

    for i in 0..n {
        let exit = Message::new(EXIT);
        if let Err(e) = pool.start(ProcId::new(i), None, &exit, true) {
            e.terminate();
        }
    }

    if driver.join().is_err() {
        kwarn!("driver thread panicked");
    }

    let stats = pool.stats();
    kinfo!("pool stats: {:?}", stats);
    println!(
        "\n{} reads ok, {} failed with EIO, {} exits handled",
        ok.load(Ordering::SeqCst),
        failed.load(Ordering::SeqCst),
        hooks.exits.load(Ordering::SeqCst)
    );

    if let Err(e) = pool.cleanup() {
        eprintln!("error: {}", e);
    }
    println!("\n=== Example Complete ===");
}
