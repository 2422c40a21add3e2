//! Authorization decisions and their explanations.

use chrono::{DateTime, Utc};
use serde_json::json;

use accessgate_auth::{AuthorizationExplanation, ExplainInput, explain};
use accessgate_core::{DomainResult, PermissionId, PrincipalId};

use super::{AccessEngine, OperationContext, ids};
use crate::audit::{AuditCategory, AuditOutcome};

impl AccessEngine {
    /// Does `principal` hold `permission` at `as_of`?
    ///
    /// Unknown principals and permissions are simply denied. Every decision
    /// is audited through the buffered recorder.
    pub fn authorize(
        &self,
        ctx: &OperationContext,
        principal: &PrincipalId,
        permission: &PermissionId,
        as_of: DateTime<Utc>,
    ) -> DomainResult<bool> {
        let active = self.active_roles_for(principal, as_of)?;
        let roles = self.roles_for(&active)?;
        let granting: Vec<_> = roles
            .iter()
            .filter(|role| role.grants(permission))
            .map(|role| role.id.clone())
            .collect();
        let granted = !granting.is_empty();

        let outcome = if granted {
            AuditOutcome::Success
        } else {
            tracing::debug!(principal = %principal, permission = %permission, "authorization denied");
            AuditOutcome::Denied
        };
        self.audit(
            ctx,
            AuditCategory::Authorization,
            "authorize",
            outcome,
            principal,
            json!({
                "permission": permission,
                "as_of": as_of,
                "granting_roles": ids(&granting),
            }),
        );
        Ok(granted)
    }

    /// The decision `authorize` would take, with the reasoning behind it.
    /// Not audited.
    pub fn explain(
        &self,
        principal: &PrincipalId,
        permission: &PermissionId,
        as_of: DateTime<Utc>,
    ) -> DomainResult<AuthorizationExplanation> {
        let principal_record = self.stores.principals.get(principal)?;
        let permission_record = self.stores.permissions.get(permission)?;
        let active = self.active_roles_for(principal, as_of)?;

        // All roles, so a denial can suggest which one to request. Retired
        // roles still grant through existing assignments but are never
        // suggested.
        let roles = self.roles()?;

        Ok(explain(ExplainInput {
            principal_id: principal,
            principal: principal_record.as_ref(),
            permission_id: permission,
            permission: permission_record.as_ref(),
            active_roles: &active,
            roles: &roles,
            as_of,
        }))
    }
}
