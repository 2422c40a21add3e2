use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use accessgate_auth::RequestEvent;
use accessgate_core::{ExpectedVersion, RequestId};

use super::StoreError;

/// Append-only event streams, one per access request.
///
/// The stream version is the number of events in it, which matches
/// `AccessRequest::version` after replay.
pub trait RequestStore: Send + Sync {
    /// Reserve the next identifier (`REQ-001`, `REQ-002`, ...).
    fn next_id(&self) -> Result<RequestId, StoreError>;

    /// Append `events`, failing with [`StoreError::Concurrency`] when the
    /// stream is not at `expected`. Returns the new stream version.
    fn append(
        &self,
        id: &RequestId,
        events: &[RequestEvent],
        expected: ExpectedVersion,
    ) -> Result<u64, StoreError>;

    /// Full history of one request (empty if unknown).
    fn load(&self, id: &RequestId) -> Result<Vec<RequestEvent>, StoreError>;

    /// Every known request id in creation order.
    fn ids(&self) -> Result<Vec<RequestId>, StoreError>;
}

impl<S> RequestStore for Arc<S>
where
    S: RequestStore + ?Sized,
{
    fn next_id(&self) -> Result<RequestId, StoreError> {
        (**self).next_id()
    }

    fn append(
        &self,
        id: &RequestId,
        events: &[RequestEvent],
        expected: ExpectedVersion,
    ) -> Result<u64, StoreError> {
        (**self).append(id, events, expected)
    }

    fn load(&self, id: &RequestId) -> Result<Vec<RequestEvent>, StoreError> {
        (**self).load(id)
    }

    fn ids(&self) -> Result<Vec<RequestId>, StoreError> {
        (**self).ids()
    }
}

#[derive(Debug, Default)]
struct Streams {
    order: Vec<RequestId>,
    events: HashMap<RequestId, Vec<RequestEvent>>,
}

/// In-memory request event store.
///
/// Intended for tests/dev. Not optimized for performance.
#[derive(Debug, Default)]
pub struct InMemoryRequestStore {
    sequence: AtomicU64,
    streams: RwLock<Streams>,
}

impl InMemoryRequestStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RequestStore for InMemoryRequestStore {
    fn next_id(&self) -> Result<RequestId, StoreError> {
        let n = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(RequestId::from_sequence(n))
    }

    fn append(
        &self,
        id: &RequestId,
        events: &[RequestEvent],
        expected: ExpectedVersion,
    ) -> Result<u64, StoreError> {
        let mut streams = self.streams.write().map_err(|_| StoreError::Poisoned)?;

        let current = streams.events.get(id).map(|s| s.len() as u64).unwrap_or(0);
        if !expected.matches(current) {
            return Err(StoreError::Concurrency {
                expected,
                actual: current,
            });
        }
        if events.is_empty() {
            return Ok(current);
        }

        if current == 0 {
            streams.order.push(id.clone());
        }
        let stream = streams.events.entry(id.clone()).or_default();
        stream.extend(events.iter().cloned());
        Ok(stream.len() as u64)
    }

    fn load(&self, id: &RequestId) -> Result<Vec<RequestEvent>, StoreError> {
        let streams = self.streams.read().map_err(|_| StoreError::Poisoned)?;
        Ok(streams.events.get(id).cloned().unwrap_or_default())
    }

    fn ids(&self) -> Result<Vec<RequestId>, StoreError> {
        let streams = self.streams.read().map_err(|_| StoreError::Poisoned)?;
        Ok(streams.order.clone())
    }
}
