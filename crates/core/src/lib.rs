//! `accessgate-core`: domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives shared by every other crate:
//! identifiers, the error taxonomy, the aggregate contract, time and retry
//! policy. No storage or transport concerns live here.

pub mod aggregate;
pub mod clock;
pub mod error;
pub mod id;
pub mod retry;

pub use aggregate::{Aggregate, AggregateRoot, ExpectedVersion};
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{DomainError, DomainResult};
pub use id::{PermissionId, PrincipalId, RequestId, RoleId};
pub use retry::RetryPolicy;
