//! Error types for the worker pool
//!
//! Two tiers. `FatalError` is a broken invariant in a caller or in the
//! runtime; the server cannot continue and [`FatalError::terminate`] ends the
//! process. `PoolError` covers lifecycle preconditions (init twice, cleanup
//! while busy) that a caller can act on. Failures of external services never
//! show up here: they travel inside the reply message as an `EIO` status.

use core::fmt;

use crate::flags::WorkKind;
use crate::id::{ProcId, WorkerId};

/// Result type for pool lifecycle operations
pub type PoolResult<T> = Result<T, PoolError>;

/// Consistency violations that must stop the server
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FatalError {
    /// A second unit of the same kind was submitted for a process
    DuplicateWork {
        proc: ProcId,
        kind: WorkKind,
        existing: i32,
        submitted: i32,
    },

    /// Process record violates the pending/active bookkeeping
    InconsistentState {
        proc: ProcId,
        reason: &'static str,
    },

    /// Pending counter is non-zero but no process is flagged pending
    PendingInconsistency,

    /// An admission counter disagrees with the records it counts
    CounterMismatch {
        counter: &'static str,
        recorded: usize,
        actual: usize,
    },

    /// Worker waits on an endpoint but has no reply slot registered
    ReplyStorage { worker: WorkerId },

    /// Rebind target is already served by a worker
    TargetNotIdle { proc: ProcId },

    /// Process id outside the process table
    NoSuchProcess(ProcId),

    /// Worker id outside the pool
    NoSuchWorker(WorkerId),

    /// Worker thread could not be created
    ThreadSpawn { worker: WorkerId, reason: String },

    /// Worker thread could not be joined
    ThreadJoin { worker: WorkerId },
}

impl FatalError {
    /// Log the violation and abort the whole server process
    pub fn terminate(&self) -> ! {
        crate::kerror!("fatal: {}", self);
        std::process::abort()
    }
}

impl fmt::Display for FatalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FatalError::DuplicateWork { proc, kind, existing, submitted } => write!(
                f,
                "{} has two {} calls ({:#x}, {:#x})",
                proc, kind, existing, submitted
            ),
            FatalError::InconsistentState { proc, reason } => {
                write!(f, "worker administration error for {}: {}", proc, reason)
            }
            FatalError::PendingInconsistency => write!(f, "pending work inconsistency"),
            FatalError::CounterMismatch { counter, recorded, actual } => write!(
                f,
                "{} counter is {} but {} records match",
                counter, recorded, actual
            ),
            FatalError::ReplyStorage { worker } => {
                write!(f, "reply storage consistency error on {}", worker)
            }
            FatalError::TargetNotIdle { proc } => {
                write!(f, "set_proc: target {} not idle", proc)
            }
            FatalError::NoSuchProcess(proc) => write!(f, "{} outside process table", proc),
            FatalError::NoSuchWorker(worker) => write!(f, "{} outside worker pool", worker),
            FatalError::ThreadSpawn { worker, reason } => {
                write!(f, "unable to start thread for {}: {}", worker, reason)
            }
            FatalError::ThreadJoin { worker } => write!(f, "could not join {}", worker),
        }
    }
}

impl std::error::Error for FatalError {}

/// Lifecycle and precondition errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    /// Pool threads are not running
    NotInitialized,

    /// Pool threads are already running
    AlreadyInitialized,

    /// Cleanup requested while work is pending or active
    NotIdle { pending: usize, busy: usize },

    /// Configuration rejected by validation
    InvalidConfig(&'static str),

    /// Consistency violation
    Fatal(FatalError),
}

impl fmt::Display for PoolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PoolError::NotInitialized => write!(f, "worker pool not initialized"),
            PoolError::AlreadyInitialized => write!(f, "worker pool already initialized"),
            PoolError::NotIdle { pending, busy } => {
                write!(f, "worker pool not idle ({} pending, {} busy)", pending, busy)
            }
            PoolError::InvalidConfig(msg) => write!(f, "invalid configuration: {}", msg),
            PoolError::Fatal(e) => write!(f, "fatal: {}", e),
        }
    }
}

impl std::error::Error for PoolError {}

impl From<FatalError> for PoolError {
    fn from(e: FatalError) -> Self {
        PoolError::Fatal(e)
    }
}
