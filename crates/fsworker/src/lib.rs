//! # fsworker - Request Worker Pool
//!
//! Fixed-size thread pool serving per-process requests in a file server.
//!
//! ## Features
//!
//! - **One thread per process**: a process is served by at most one worker at
//!   a time; its normal call runs first, its postponed callback second
//! - **Spare worker**: ordinary work never takes the last idle worker, so
//!   calls needed to finish running work always find a thread
//! - **Pending work**: work that cannot start is remembered on the process and
//!   picked up in process table order
//! - **Admission gate**: new work can be held back during initialization
//! - **Blocking calls**: handlers suspend while waiting for a driver or peer
//!   server, and can be stopped with an `EIO` reply when that peer dies
//!
//! ## Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use fsworker::{handler, CallContext, Message, PoolConfig, ProcId, ProcessHooks,
//!                TableLocks, WorkerPool};
//!
//! struct Hooks(TableLocks);
//!
//! impl ProcessHooks for Hooks {
//!     fn lock_proc(&self, proc: ProcId) { self.0.lock(proc) }
//!     fn unlock_proc(&self, proc: ProcId) { self.0.unlock(proc) }
//!     fn service_pm_postponed(&self, ctx: &mut CallContext) {
//!         println!("postponed call for {}", ctx.proc());
//!     }
//! }
//!
//! let config = PoolConfig::default();
//! let hooks = Arc::new(Hooks(TableLocks::new(config.nr_procs)));
//! let mut pool = WorkerPool::new(config, hooks)?;
//! pool.init()?;
//!
//! let open = handler(|ctx| println!("{} calls {:#x}", ctx.proc(), ctx.message().m_type));
//! pool.start(ProcId::new(1), Some(open), &Message::new(0x05), false)?;
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Request Dispatcher                      │
//! │          start(), allow(), stop_by_endpoint(), ...          │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Pool State                           │
//! │    pending / busy counters, admission gate, process table   │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!          ┌───────────────────┼───────────────────┐
//!          ▼                   ▼                   ▼
//!    ┌───────────┐      ┌───────────┐      ┌───────────┐
//!    │  Worker   │      │  Worker   │      │   Spare   │
//!    │  Thread   │      │  Thread   │      │  Worker   │
//!    └───────────┘      └───────────┘      └───────────┘
//!          │                   │                   │
//!          └───────────────────┼───────────────────┘
//!                              ▼
//!    ┌─────────────────────────────────────────────────────────┐
//!    │                     ProcessHooks                        │
//!    │    process locks, postponed callbacks, call cleanup     │
//!    └─────────────────────────────────────────────────────────┘
//! ```

// Re-export core types
pub use fsworker_core::{
    Endpoint,
    FatalError,
    Message,
    PendingReply,
    PoolError,
    PoolResult,
    ProcFlags,
    ProcId,
    ReplyKind,
    ReplySlot,
    WorkKind,
    WorkerId,
};
pub use fsworker_core::constants;

// Re-export kprint macros for debug logging
pub use fsworker_core::{kprintln, kerror, kwarn, kinfo, kdebug, ktrace};
pub use fsworker_core::kprint::{LogLevel, init as init_logging, set_log_level, set_flush_enabled};

// Re-export env utilities
pub use fsworker_core::{env_get, env_get_bool, env_get_opt, env_get_size};

// Re-export runtime types
pub use fsworker_runtime::{
    current_worker,
    handler,
    CallContext,
    Handler,
    PoolConfig,
    PoolHandle,
    PoolStats,
    ProcessHooks,
    ProcessSnapshot,
    SuspendedWorker,
    TableLocks,
    WorkerPool,
};
