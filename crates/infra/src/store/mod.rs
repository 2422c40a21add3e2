//! Persistence seams for engine state.
//!
//! Every store is a trait with an in-memory implementation. Each write is a
//! single atomic replace of one value, which is what gives per-principal write
//! atomicity for assignment sets.

mod in_memory;
mod requests;

use std::sync::Arc;

use thiserror::Error;

use accessgate_auth::{AssignmentSet, Permission, Principal, Role, SodRule};
use accessgate_core::{DomainError, ExpectedVersion, PermissionId, PrincipalId, RoleId};

pub use in_memory::InMemoryRepository;
pub use requests::{InMemoryRequestStore, RequestStore};

/// Storage-level failure.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Transient: connection lost, lock contention. Safe to retry.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("optimistic concurrency check failed (expected: {expected:?}, actual: {actual})")]
    Concurrency {
        expected: ExpectedVersion,
        actual: u64,
    },

    #[error("store lock poisoned")]
    Poisoned,
}

impl From<StoreError> for DomainError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::Unavailable(msg) => DomainError::unavailable(msg),
            StoreError::Concurrency { .. } => DomainError::conflict(value.to_string()),
            StoreError::Poisoned => DomainError::unavailable(value.to_string()),
        }
    }
}

/// Keyed store of whole values.
pub trait Repository<K, V>: Send + Sync {
    fn get(&self, key: &K) -> Result<Option<V>, StoreError>;

    /// Insert or replace.
    fn upsert(&self, key: K, value: V) -> Result<(), StoreError>;

    /// Insert only if absent. Returns `false` when the key already existed.
    fn insert_new(&self, key: K, value: V) -> Result<bool, StoreError>;

    /// All values, in key order.
    fn list(&self) -> Result<Vec<V>, StoreError>;
}

impl<K, V, S> Repository<K, V> for Arc<S>
where
    S: Repository<K, V> + ?Sized,
{
    fn get(&self, key: &K) -> Result<Option<V>, StoreError> {
        (**self).get(key)
    }

    fn upsert(&self, key: K, value: V) -> Result<(), StoreError> {
        (**self).upsert(key, value)
    }

    fn insert_new(&self, key: K, value: V) -> Result<bool, StoreError> {
        (**self).insert_new(key, value)
    }

    fn list(&self) -> Result<Vec<V>, StoreError> {
        (**self).list()
    }
}

/// The full set of stores the engine runs against.
#[derive(Clone)]
pub struct Stores {
    pub permissions: Arc<dyn Repository<PermissionId, Permission>>,
    pub roles: Arc<dyn Repository<RoleId, Role>>,
    pub principals: Arc<dyn Repository<PrincipalId, Principal>>,
    pub assignments: Arc<dyn Repository<PrincipalId, AssignmentSet>>,
    pub sod_rules: Arc<dyn Repository<u64, SodRule>>,
    pub requests: Arc<dyn RequestStore>,
}

impl Stores {
    pub fn in_memory() -> Self {
        Self {
            permissions: Arc::new(InMemoryRepository::new()),
            roles: Arc::new(InMemoryRepository::new()),
            principals: Arc::new(InMemoryRepository::new()),
            assignments: Arc::new(InMemoryRepository::new()),
            sod_rules: Arc::new(InMemoryRepository::new()),
            requests: Arc::new(InMemoryRequestStore::new()),
        }
    }
}

impl core::fmt::Debug for Stores {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Stores").finish_non_exhaustive()
    }
}
