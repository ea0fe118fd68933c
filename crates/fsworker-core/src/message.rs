//! Request/reply messages and the reply slots workers block on

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// A request or reply message
///
/// `m_type` carries the call number on requests and the status code on
/// replies (negative errno values for errors).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Message {
    pub m_type: i32,
    pub payload: Vec<u8>,
}

impl Message {
    pub fn new(m_type: i32) -> Self {
        Self { m_type, payload: Vec::new() }
    }

    pub fn with_payload(m_type: i32, payload: impl Into<Vec<u8>>) -> Self {
        Self { m_type, payload: payload.into() }
    }

    /// Whether this reply carries an error status
    #[inline]
    pub fn is_error(&self) -> bool {
        self.m_type < 0
    }
}

/// Which kind of peer a worker is awaiting a reply from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyKind {
    /// Character or block device driver
    Driver,
    /// Peer file server
    FileServer,
}

/// Shared buffer a reply is written into while a worker sleeps
///
/// One clone lives in the worker record, the other with the handler that
/// waits for it.
#[derive(Debug, Clone, Default)]
pub struct ReplySlot {
    inner: Arc<Mutex<Option<Message>>>,
}

impl ReplySlot {
    pub fn new() -> Self {
        Self::default()
    }

    fn guard(&self) -> MutexGuard<'_, Option<Message>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store a reply
    pub fn fill(&self, reply: Message) {
        *self.guard() = Some(reply);
    }

    /// Store an error reply with the given (negative) status
    pub fn fail(&self, status: i32) {
        self.fill(Message::new(status));
    }

    /// Take the reply out, if one has arrived
    pub fn take(&self) -> Option<Message> {
        self.guard().take()
    }

    pub fn is_filled(&self) -> bool {
        self.guard().is_some()
    }
}

/// An outstanding reply registered on a worker
#[derive(Debug, Clone)]
pub struct PendingReply {
    pub kind: ReplyKind,
    pub slot: ReplySlot,
}
