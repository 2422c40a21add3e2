//! `accessgate-auth`: pure RBAC domain: catalog, roles, principals, the
//! assignment graph, segregation-of-duties rules, the access-request
//! aggregate and the authorization evaluator.
//!
//! This crate is intentionally decoupled from HTTP and storage: nothing here
//! performs IO. The orchestration (locking, persistence, audit) lives in
//! `accessgate-infra`.

pub mod assignment;
pub mod authorize;
pub mod permission;
pub mod principal;
pub mod request;
pub mod role;
pub mod sod;

pub use assignment::{AssignmentChange, AssignmentSet, AssignmentSource, RoleAssignment};
pub use authorize::{
    AuthorizationExplanation, DenialKind, DenialReason, ExplainInput, PrincipalState,
    effective_permissions, explain,
};
pub use permission::{NewPermission, Permission, PermissionStatus, well_known};
pub use principal::{NewPrincipal, Principal, PrincipalStatus};
pub use request::{
    AccessRequest, ApproveRequest, ExpireRequest, RejectRequest, RequestCommand, RequestEvent,
    RequestKind, RequestPriority, RequestStatus, SubmitRequest,
};
pub use role::{NewRole, PermissionDiff, Role, RoleKind, RoleStatus, RoleUpdate};
pub use sod::{SodRule, SodViolation, check_conflict};
