//! Worker pool configuration
//!
//! Library defaults with environment overrides:
//!
//! - `FSW_NUM_WORKERS` - Number of worker threads, spare included
//! - `FSW_NR_PROCS` - Size of the process table
//! - `FSW_STACK_SIZE` - Worker stack size, accepts K/M suffixes
//! - `FSW_DEBUG` - Per-call debug logging (0/1)

use fsworker_core::constants::{
    DEFAULT_NR_PROCS, DEFAULT_NUM_WORKERS, DEFAULT_STACK_SIZE, MAX_WORKERS,
};
use fsworker_core::env::{env_get, env_get_bool, env_get_size};

/// Smallest stack a worker thread is started with
const MIN_STACK_SIZE: usize = 16 * 1024;

#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Number of worker threads, including the spare
    pub num_workers: usize,

    /// Number of process records
    pub nr_procs: usize,

    /// Stack size of each worker thread
    pub stack_size: usize,

    /// Log every activation and completion at debug level
    pub debug_logging: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

impl PoolConfig {
    /// Library defaults only, ignoring the environment
    pub fn defaults() -> Self {
        Self {
            num_workers: DEFAULT_NUM_WORKERS,
            nr_procs: DEFAULT_NR_PROCS,
            stack_size: DEFAULT_STACK_SIZE,
            debug_logging: false,
        }
    }

    /// Library defaults with environment overrides applied
    pub fn from_env() -> Self {
        let d = Self::defaults();
        Self {
            num_workers: env_get("FSW_NUM_WORKERS", d.num_workers),
            nr_procs: env_get("FSW_NR_PROCS", d.nr_procs),
            stack_size: env_get_size("FSW_STACK_SIZE", d.stack_size),
            debug_logging: env_get_bool("FSW_DEBUG", d.debug_logging),
        }
    }

    pub fn num_workers(mut self, n: usize) -> Self {
        self.num_workers = n;
        self
    }

    pub fn nr_procs(mut self, n: usize) -> Self {
        self.nr_procs = n;
        self
    }

    pub fn stack_size(mut self, bytes: usize) -> Self {
        self.stack_size = bytes;
        self
    }

    pub fn debug_logging(mut self, enable: bool) -> Self {
        self.debug_logging = enable;
        self
    }

    pub fn validate(&self) -> Result<(), &'static str> {
        // One worker for regular work plus the spare
        if self.num_workers < 2 {
            return Err("num_workers must be at least 2");
        }
        if self.num_workers > MAX_WORKERS {
            return Err("num_workers exceeds maximum");
        }
        if self.nr_procs == 0 {
            return Err("nr_procs must be at least 1");
        }
        if self.nr_procs > u32::MAX as usize {
            return Err("nr_procs exceeds process id range");
        }
        if self.stack_size < MIN_STACK_SIZE {
            return Err("stack_size below minimum");
        }
        Ok(())
    }
}
