//! Identifier types for processes, workers and external endpoints

use core::fmt;

/// Index of a client process in the pool's process table
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct ProcId(u32);

impl ProcId {
    /// Create a new ProcId from a table index
    #[inline]
    pub const fn new(index: u32) -> Self {
        ProcId(index)
    }

    /// Get the raw u32 value
    #[inline]
    pub const fn as_u32(self) -> u32 {
        self.0
    }

    /// Get as usize for indexing
    #[inline]
    pub const fn as_usize(self) -> usize {
        self.0 as usize
    }
}

impl From<u32> for ProcId {
    #[inline]
    fn from(index: u32) -> Self {
        ProcId(index)
    }
}

impl fmt::Debug for ProcId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ProcId({})", self.0)
    }
}

impl fmt::Display for ProcId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "proc {}", self.0)
    }
}

/// Stable index of a worker in the fixed pool
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct WorkerId(u32);

impl WorkerId {
    #[inline]
    pub const fn new(index: u32) -> Self {
        WorkerId(index)
    }

    #[inline]
    pub const fn as_u32(self) -> u32 {
        self.0
    }

    #[inline]
    pub const fn as_usize(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "WorkerId({})", self.0)
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "worker {}", self.0)
    }
}

/// Identifier of an external service (driver or peer file server)
///
/// `Endpoint::NONE` is the "not waiting on anybody" sentinel.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct Endpoint(i32);

impl Endpoint {
    /// Sentinel value indicating no endpoint
    pub const NONE: Endpoint = Endpoint(i32::MIN);

    #[inline]
    pub const fn new(raw: i32) -> Self {
        Endpoint(raw)
    }

    #[inline]
    pub const fn as_i32(self) -> i32 {
        self.0
    }

    #[inline]
    pub const fn is_none(self) -> bool {
        self.0 == i32::MIN
    }

    /// Convert to Option, mapping the sentinel to `None`
    #[inline]
    pub const fn to_option(self) -> Option<Endpoint> {
        if self.is_none() {
            None
        } else {
            Some(self)
        }
    }
}

impl Default for Endpoint {
    fn default() -> Self {
        Endpoint::NONE
    }
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_none() {
            write!(f, "Endpoint(NONE)")
        } else {
            write!(f, "Endpoint({})", self.0)
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_none() {
            write!(f, "none")
        } else {
            write!(f, "{}", self.0)
        }
    }
}
