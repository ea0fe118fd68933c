//! # fsworker-runtime
//!
//! Thread pool runtime for the fsworker request pool.
//!
//! This crate provides:
//! - Worker threads with a per-worker park/wake primitive (futex on Linux)
//! - Work admission with a reserved spare worker and an admission gate
//! - Pending work bookkeeping, drained in process table order
//! - Suspend/resume, reply waiting and stopping of blocked workers
//! - Environment-driven configuration

pub mod config;
pub mod context;
pub mod parking;
pub mod pool;
pub mod process;
pub mod tls;
mod worker;

// Re-exports
pub use config::PoolConfig;
pub use context::{CallContext, SuspendedWorker};
pub use parking::{new_parking, WorkerParking};
pub use pool::{PoolHandle, PoolStats, WorkerPool};
pub use process::{handler, Handler, ProcessHooks, ProcessSnapshot, TableLocks};
pub use tls::current_worker;
