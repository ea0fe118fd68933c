//! # fsworker-core
//!
//! Core types for the fsworker request pool: identifiers, per-process flags,
//! messages and reply slots, the error taxonomy, logging macros and
//! environment helpers.
//!
//! This crate holds no threads and no scheduling logic. Everything that
//! runs lives in `fsworker-runtime`.
//!
//! ## Modules
//!
//! - `id` - ProcId, WorkerId and Endpoint
//! - `flags` - PENDING / PM_WORK process flags, work kinds
//! - `message` - Messages and reply slots
//! - `error` - Fatal consistency violations and lifecycle errors
//! - `kprint` - Kernel-style leveled logging macros
//! - `env` - Environment variable utilities

pub mod id;
pub mod flags;
pub mod message;
pub mod error;
pub mod kprint;
pub mod env;

pub use id::{Endpoint, ProcId, WorkerId};
pub use flags::{ProcFlags, WorkKind};
pub use message::{Message, PendingReply, ReplyKind, ReplySlot};
pub use error::{FatalError, PoolError, PoolResult};
pub use env::{env_get, env_get_bool, env_get_opt, env_get_size};

/// Pool sizing defaults and status codes
pub mod constants {
    /// Default number of worker threads, spare included
    pub const DEFAULT_NUM_WORKERS: usize = 9;

    /// Default size of the process table
    pub const DEFAULT_NR_PROCS: usize = 256;

    /// Default stack size for worker threads
    pub const DEFAULT_STACK_SIZE: usize = 256 * 1024;

    /// Upper bound on worker threads
    pub const MAX_WORKERS: usize = 64;

    /// Success status
    pub const OK: i32 = 0;

    /// I/O error status injected into replies of stopped workers
    pub const EIO: i32 = -libc::EIO;
}
