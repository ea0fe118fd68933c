//! Per-process scheduling flags and work kinds

use core::fmt;

/// Scheduling flags carried by each process record
#[derive(Clone, Copy, PartialEq, Eq, Default)]
#[repr(transparent)]
pub struct ProcFlags(u32);

impl ProcFlags {
    /// Work is queued for the process but no worker is assigned yet
    pub const PENDING: ProcFlags = ProcFlags(1 << 0);

    /// A postponed callback from the process manager is stored
    pub const PM_WORK: ProcFlags = ProcFlags(1 << 1);

    #[inline]
    pub const fn empty() -> Self {
        ProcFlags(0)
    }

    #[inline]
    pub const fn contains(self, other: ProcFlags) -> bool {
        self.0 & other.0 == other.0
    }

    #[inline]
    pub fn insert(&mut self, other: ProcFlags) {
        self.0 |= other.0;
    }

    #[inline]
    pub fn remove(&mut self, other: ProcFlags) {
        self.0 &= !other.0;
    }

    #[inline]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Debug for ProcFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names = Vec::new();
        if self.contains(ProcFlags::PENDING) {
            names.push("PENDING");
        }
        if self.contains(ProcFlags::PM_WORK) {
            names.push("PM_WORK");
        }
        write!(f, "ProcFlags({})", names.join("|"))
    }
}

/// The two kinds of work a process can carry at the same time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkKind {
    /// Client-originated call with its own handler
    Normal,
    /// Follow-up callback from the process manager
    Postponed,
}

impl fmt::Display for WorkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkKind::Normal => write!(f, "normal"),
            WorkKind::Postponed => write!(f, "postponed"),
        }
    }
}
