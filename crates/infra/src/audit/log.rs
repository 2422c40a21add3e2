use std::sync::{Arc, RwLock};

use thiserror::Error;

use accessgate_core::DomainResult;

use super::model::AuditEvent;
use super::query::{AuditFilter, AuditPage, PageRequest, select_page};

/// Audit write failure. Logged and counted, never propagated to the
/// operation that produced the event.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuditWriteError {
    #[error("audit log unavailable: {0}")]
    Unavailable(String),

    #[error("audit log lock poisoned")]
    Poisoned,

    #[error("audit queue closed")]
    QueueClosed,

    #[error("audit queue full")]
    QueueFull,
}

/// Append-only audit storage.
pub trait AuditLog: Send + Sync {
    /// Append `event`, assigning its sequence number. Returns the stored event.
    fn append(&self, event: AuditEvent) -> Result<AuditEvent, AuditWriteError>;

    fn query(&self, filter: &AuditFilter, page: &PageRequest) -> DomainResult<AuditPage>;
}

impl<S> AuditLog for Arc<S>
where
    S: AuditLog + ?Sized,
{
    fn append(&self, event: AuditEvent) -> Result<AuditEvent, AuditWriteError> {
        (**self).append(event)
    }

    fn query(&self, filter: &AuditFilter, page: &PageRequest) -> DomainResult<AuditPage> {
        (**self).query(filter, page)
    }
}

/// In-memory audit log for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryAuditLog {
    events: RwLock<Vec<AuditEvent>>,
}

impl InMemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.events.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl AuditLog for InMemoryAuditLog {
    fn append(&self, mut event: AuditEvent) -> Result<AuditEvent, AuditWriteError> {
        let mut events = self.events.write().map_err(|_| AuditWriteError::Poisoned)?;
        event.sequence = events.len() as u64 + 1;
        events.push(event.clone());
        Ok(event)
    }

    fn query(&self, filter: &AuditFilter, page: &PageRequest) -> DomainResult<AuditPage> {
        let events = self
            .events
            .read()
            .map_err(|_| accessgate_core::DomainError::unavailable("audit log lock poisoned"))?;
        select_page(events.iter(), filter, page)
    }
}
