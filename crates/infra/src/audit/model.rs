use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use accessgate_core::PrincipalId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditCategory {
    Authentication,
    Authorization,
    RoleChange,
    PermissionChange,
    RequestLifecycle,
    DirectorySync,
}

impl AuditCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditCategory::Authentication => "authentication",
            AuditCategory::Authorization => "authorization",
            AuditCategory::RoleChange => "role_change",
            AuditCategory::PermissionChange => "permission_change",
            AuditCategory::RequestLifecycle => "request_lifecycle",
            AuditCategory::DirectorySync => "directory_sync",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditOutcome {
    Success,
    Denied,
    Error,
}

/// One append-only audit record.
///
/// `sequence` is 0 until the log assigns it on append.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub id: Uuid,
    pub sequence: u64,
    pub timestamp: DateTime<Utc>,
    pub actor: PrincipalId,
    pub category: AuditCategory,
    pub action: String,
    pub outcome: AuditOutcome,
    /// Entity acted upon (principal, role, permission or request id).
    pub subject: String,
    pub source_address: Option<String>,
    pub details: JsonValue,
}

impl AuditEvent {
    pub fn new(
        timestamp: DateTime<Utc>,
        actor: PrincipalId,
        category: AuditCategory,
        action: impl Into<String>,
        outcome: AuditOutcome,
        subject: impl ToString,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            sequence: 0,
            timestamp,
            actor,
            category,
            action: action.into(),
            outcome,
            subject: subject.to_string(),
            source_address: None,
            details: JsonValue::Null,
        }
    }

    pub fn with_source(mut self, source_address: Option<String>) -> Self {
        self.source_address = source_address;
        self
    }

    pub fn with_details(mut self, details: JsonValue) -> Self {
        self.details = details;
        self
    }

    /// Whether `principal` is either the actor or the subject.
    pub fn involves(&self, principal: &PrincipalId) -> bool {
        &self.actor == principal || self.subject == principal.as_str()
    }
}
