use chrono::{DateTime, Utc};
use serde::Deserialize;

use accessgate_auth::{RequestKind, RequestPriority, RequestStatus};
use accessgate_core::{PermissionId, PrincipalId, RoleId};
use accessgate_infra::audit::{AuditCategory, AuditCursor, AuditFilter, AuditOutcome};
use accessgate_infra::engine::{NewAccessRequest, RequestFilter};

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct AssignRoleRequest {
    pub role: RoleId,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct ReconcileRequest {
    pub roles: Vec<RoleId>,
}

#[derive(Debug, Deserialize)]
pub struct AddSodRuleRequest {
    pub role_a: RoleId,
    pub role_b: RoleId,
    #[serde(default)]
    pub description: String,
}

/// Body of `POST /requests`; the requester is always the caller.
#[derive(Debug, Deserialize)]
pub struct SubmitAccessRequest {
    #[serde(default)]
    pub target: Option<PrincipalId>,
    pub role: RoleId,
    pub justification: String,
    #[serde(default)]
    pub kind: RequestKind,
    #[serde(default)]
    pub priority: Option<RequestPriority>,
    #[serde(default)]
    pub temporary: bool,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

impl SubmitAccessRequest {
    pub fn into_new(self, requester: PrincipalId) -> NewAccessRequest {
        NewAccessRequest {
            requester,
            target: self.target,
            role: self.role,
            justification: self.justification,
            kind: self.kind,
            priority: self.priority,
            temporary: self.temporary,
            expires_at: self.expires_at,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ApproveRequestBody {
    #[serde(default)]
    pub comment: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RejectRequestBody {
    pub reason: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct ExpireRequestBody {
    #[serde(default)]
    pub as_of: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct AuthorizeRequest {
    pub principal: PrincipalId,
    pub permission: PermissionId,
    #[serde(default)]
    pub as_of: Option<DateTime<Utc>>,
}

// -------------------------
// Query parameters
// -------------------------

#[derive(Debug, Default, Deserialize)]
pub struct AsOfQuery {
    pub as_of: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct ExplainQuery {
    pub principal: PrincipalId,
    pub permission: PermissionId,
    pub as_of: Option<DateTime<Utc>>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RequestListQuery {
    pub requester: Option<PrincipalId>,
    pub target: Option<PrincipalId>,
    pub status: Option<RequestStatus>,
}

impl From<RequestListQuery> for RequestFilter {
    fn from(q: RequestListQuery) -> Self {
        RequestFilter {
            requester: q.requester,
            target: q.target,
            status: q.status,
        }
    }
}

/// Flat audit query string (`serde_urlencoded` cannot flatten nested structs).
#[derive(Debug, Default, Deserialize)]
pub struct AuditQuery {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub principal: Option<PrincipalId>,
    pub category: Option<AuditCategory>,
    pub outcome: Option<AuditOutcome>,
    pub limit: Option<u32>,
    pub cursor: Option<String>,
}

impl AuditQuery {
    pub fn filter(&self) -> AuditFilter {
        AuditFilter {
            from: self.from,
            to: self.to,
            principal: self.principal.clone(),
            category: self.category,
            outcome: self.outcome,
        }
    }

    pub fn cursor(&self) -> Option<AuditCursor> {
        self.cursor.clone().map(AuditCursor::new)
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct StreamQuery {
    /// Only forward notifications about this subject (request or principal id).
    pub subject: Option<String>,
}
