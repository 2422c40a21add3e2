//! Assignment graph operations and the SoD gate in front of every grant.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde_json::json;

use accessgate_auth::{
    AssignmentChange, AssignmentSet, AssignmentSource, RoleAssignment, SodViolation,
    check_conflict, effective_permissions,
};
use accessgate_core::{DomainError, DomainResult, PermissionId, PrincipalId, RequestId, RoleId};
use accessgate_events::Notification;

use super::{AccessEngine, OperationContext};
use crate::audit::{AuditCategory, AuditOutcome};

/// A grant that passed validation and SoD, not yet persisted.
pub(super) struct GrantPlan {
    pub previous: AssignmentSet,
    pub updated: AssignmentSet,
    pub assignment: RoleAssignment,
    pub change: AssignmentChange,
}

pub(super) enum GrantError {
    Sod(SodViolation),
    Domain(DomainError),
}

impl From<DomainError> for GrantError {
    fn from(value: DomainError) -> Self {
        GrantError::Domain(value)
    }
}

impl From<GrantError> for DomainError {
    fn from(value: GrantError) -> Self {
        match value {
            GrantError::Sod(violation) => violation.into(),
            GrantError::Domain(err) => err,
        }
    }
}

impl AccessEngine {
    /// Run `op` under `principal`'s lock, retrying transient store failures.
    /// The lock is released between attempts.
    pub(super) fn with_principal<T>(
        &self,
        principal: &PrincipalId,
        operation: &str,
        mut op: impl FnMut() -> DomainResult<T>,
    ) -> DomainResult<T> {
        self.config
            .retry
            .run(operation, |_| self.principal_locks.with(principal, &mut op))
    }

    /// Validate a grant of `role` to `principal` against the current state.
    ///
    /// Must be called with the principal's lock held.
    pub(super) fn plan_grant(
        &self,
        principal: &PrincipalId,
        role: &RoleId,
        expires_at: Option<DateTime<Utc>>,
        source: AssignmentSource,
        request_id: Option<&RequestId>,
        now: DateTime<Utc>,
    ) -> Result<GrantPlan, GrantError> {
        let previous = self.load_assignments(principal)?;
        self.plan_grant_on(previous, role, expires_at, source, request_id, now)
    }

    /// Validate a grant against `previous` instead of the stored set, so
    /// several changes can be planned before one save.
    pub(super) fn plan_grant_on(
        &self,
        previous: AssignmentSet,
        role: &RoleId,
        expires_at: Option<DateTime<Utc>>,
        source: AssignmentSource,
        request_id: Option<&RequestId>,
        now: DateTime<Utc>,
    ) -> Result<GrantPlan, GrantError> {
        let principal = &previous.principal;
        let target = self.load_principal(principal)?;
        if target.is_terminated() {
            return Err(DomainError::conflict(format!("principal {principal} is terminated")).into());
        }
        self.load_role(role)?.ensure_active()?;
        if expires_at.is_some_and(|e| e <= now) {
            return Err(DomainError::validation("expiry must be in the future").into());
        }

        let rules = self.load_sod_rules()?;
        if let Some(violation) = check_conflict(&rules, &previous.active_roles(now), role) {
            return Err(GrantError::Sod(violation));
        }

        let mut updated = previous.clone();
        let change = updated.grant(role.clone(), expires_at, source, request_id.cloned(), now);
        let assignment = updated
            .active_assignment(role, now)
            .cloned()
            .ok_or_else(|| DomainError::conflict(format!("assignment of {role} to {principal} did not take effect")))?;

        Ok(GrantPlan {
            previous,
            updated,
            assignment,
            change,
        })
    }

    /// Audit and publish a rejected grant.
    pub(super) fn report_violation(
        &self,
        ctx: &OperationContext,
        category: AuditCategory,
        action: &str,
        principal: &PrincipalId,
        violation: &SodViolation,
        request_id: Option<&RequestId>,
    ) {
        tracing::warn!(
            principal = %principal,
            rule_id = violation.rule_id,
            role = %violation.candidate,
            conflicting_role = %violation.conflicting_role,
            "SoD violation"
        );

        let subject = request_id.map_or_else(|| principal.to_string(), ToString::to_string);
        self.audit(
            ctx,
            category,
            action,
            AuditOutcome::Denied,
            subject,
            json!({
                "principal": principal,
                "rule_id": violation.rule_id,
                "role": violation.candidate,
                "conflicting_role": violation.conflicting_role,
                "description": violation.description,
            }),
        );
        self.publish(Notification::SodViolationDetected {
            request_id: request_id.cloned(),
            principal: principal.clone(),
            role: violation.candidate.clone(),
            conflicting_role: violation.conflicting_role.clone(),
            rule_id: violation.rule_id,
            occurred_at: self.now(),
        });
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Mutations
    // ─────────────────────────────────────────────────────────────────────────

    /// Grant `role` to `principal`. Re-assigning an active pair replaces its
    /// expiry.
    pub fn assign(
        &self,
        ctx: &OperationContext,
        principal: &PrincipalId,
        role: &RoleId,
        expires_at: Option<DateTime<Utc>>,
        source: AssignmentSource,
    ) -> DomainResult<RoleAssignment> {
        self.with_principal(principal, "assign", || {
            let now = self.now();
            let plan = match self.plan_grant(principal, role, expires_at, source, None, now) {
                Ok(plan) => plan,
                Err(GrantError::Sod(violation)) => {
                    self.report_violation(ctx, AuditCategory::RoleChange, "assign_role", principal, &violation, None);
                    return Err(violation.into());
                }
                Err(GrantError::Domain(err)) => return Err(err),
            };

            self.save_assignments(plan.updated)?;

            tracing::info!(principal = %principal, role = %role, source = %source, "role assigned");
            self.audit(
                ctx,
                AuditCategory::RoleChange,
                "assign_role",
                AuditOutcome::Success,
                principal,
                json!({
                    "role": role,
                    "expires_at": plan.assignment.expires_at,
                    "source": source,
                    "result": plan.change,
                }),
            );
            Ok(plan.assignment)
        })
    }

    /// Revoke the active assignment of `role`. Returns whether anything
    /// changed; revoking a missing assignment is a no-op.
    pub fn revoke(
        &self,
        ctx: &OperationContext,
        principal: &PrincipalId,
        role: &RoleId,
    ) -> DomainResult<bool> {
        self.with_principal(principal, "revoke", || {
            self.load_principal(principal)?;
            let now = self.now();
            let mut set = self.load_assignments(principal)?;
            if !set.revoke(role, now) {
                tracing::debug!(principal = %principal, role = %role, "nothing to revoke");
                return Ok(false);
            }
            self.save_assignments(set)?;

            tracing::info!(principal = %principal, role = %role, "role revoked");
            self.audit(
                ctx,
                AuditCategory::RoleChange,
                "revoke_role",
                AuditOutcome::Success,
                principal,
                json!({ "role": role }),
            );
            Ok(true)
        })
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Reads
    // ─────────────────────────────────────────────────────────────────────────

    /// Roles with an active assignment at `as_of`. Unknown principals have none.
    pub fn active_roles_for(
        &self,
        principal: &PrincipalId,
        as_of: DateTime<Utc>,
    ) -> DomainResult<BTreeSet<RoleId>> {
        Ok(self.load_assignments(principal)?.active_roles(as_of))
    }

    /// Union of the permissions of the active roles at `as_of`.
    pub fn effective_permissions_for(
        &self,
        principal: &PrincipalId,
        as_of: DateTime<Utc>,
    ) -> DomainResult<BTreeSet<PermissionId>> {
        let active = self.active_roles_for(principal, as_of)?;
        let roles = self.roles_for(&active)?;
        Ok(effective_permissions(&active, &roles))
    }

    /// Full assignment history, including expired and revoked records.
    pub fn assignments_for(&self, principal: &PrincipalId) -> DomainResult<Vec<RoleAssignment>> {
        self.load_principal(principal)?;
        Ok(self.load_assignments(principal)?.history().to_vec())
    }

    /// Would granting `candidate` to `principal` now violate an SoD rule?
    pub fn check_conflict(
        &self,
        principal: &PrincipalId,
        candidate: &RoleId,
    ) -> DomainResult<Option<SodViolation>> {
        let active = self.active_roles_for(principal, self.now())?;
        Ok(check_conflict(&self.load_sod_rules()?, &active, candidate))
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::{admin, at, engine, seeded};
    use accessgate_auth::{AssignmentSource, NewRole};
    use accessgate_core::{DomainError, PermissionId, PrincipalId, RoleId};
    use accessgate_events::Notification;
    use chrono::Duration;

    #[test]
    fn reassigning_an_active_pair_updates_expiry() {
        let (engine, clock) = engine();
        seeded(&engine);
        let ctx = admin();
        let jane = PrincipalId::new("jane.smith");
        let role = RoleId::new("ROLE_HR_VIEWER");

        engine.assign(&ctx, &jane, &role, Some(at(2, 1)), AssignmentSource::Manual).unwrap();
        let updated = engine.assign(&ctx, &jane, &role, None, AssignmentSource::Manual).unwrap();
        assert_eq!(updated.expires_at, None);
        assert_eq!(engine.assignments_for(&jane).unwrap().len(), 1);

        clock.advance(Duration::days(365));
        assert!(engine.active_roles_for(&jane, engine.now()).unwrap().contains(&role));
    }

    #[test]
    fn assign_checks_references_and_expiry() {
        let (engine, _) = engine();
        seeded(&engine);
        let ctx = admin();
        let jane = PrincipalId::new("jane.smith");

        let err = engine
            .assign(&ctx, &PrincipalId::new("ghost"), &RoleId::new("ROLE_USER"), None, AssignmentSource::Manual)
            .unwrap_err();
        assert!(matches!(err, DomainError::NotFound { kind: "principal", .. }));

        let err = engine
            .assign(&ctx, &jane, &RoleId::new("ROLE_NOPE"), None, AssignmentSource::Manual)
            .unwrap_err();
        assert!(matches!(err, DomainError::NotFound { kind: "role", .. }));

        let err = engine
            .assign(&ctx, &jane, &RoleId::new("ROLE_USER"), Some(engine.now()), AssignmentSource::Manual)
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));

        engine.create_role(&ctx, NewRole::new("ROLE_OLD", "Old")).unwrap();
        engine.retire_role(&ctx, &RoleId::new("ROLE_OLD")).unwrap();
        let err = engine
            .assign(&ctx, &jane, &RoleId::new("ROLE_OLD"), None, AssignmentSource::Manual)
            .unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));
    }

    #[test]
    fn sod_conflict_blocks_manual_assignment_and_notifies() {
        let (engine, _) = engine();
        let events = seeded(&engine);
        let ctx = admin();
        let alice = PrincipalId::new("alice.lee");

        engine
            .assign(&ctx, &alice, &RoleId::new("ROLE_FINANCE_MANAGER"), None, AssignmentSource::Manual)
            .unwrap();
        let err = engine
            .assign(&ctx, &alice, &RoleId::new("ROLE_HR_MANAGER"), None, AssignmentSource::Manual)
            .unwrap_err();
        assert!(matches!(err, DomainError::PolicyViolation(_)));

        let active = engine.active_roles_for(&alice, engine.now()).unwrap();
        assert_eq!(active.into_iter().collect::<Vec<_>>(), vec![RoleId::new("ROLE_FINANCE_MANAGER")]);
        assert!(events.drain().iter().any(|e| matches!(
            e.payload(),
            Notification::SodViolationDetected { request_id: None, .. }
        )));
    }

    #[test]
    fn revoke_is_idempotent() {
        let (engine, _) = engine();
        seeded(&engine);
        let ctx = admin();
        let john = PrincipalId::new("john.doe");
        let role = RoleId::new("ROLE_USER");

        engine.assign(&ctx, &john, &role, None, AssignmentSource::Manual).unwrap();
        assert!(engine.revoke(&ctx, &john, &role).unwrap());
        assert!(!engine.revoke(&ctx, &john, &role).unwrap());
        assert!(engine.active_roles_for(&john, engine.now()).unwrap().is_empty());
        assert_eq!(engine.assignments_for(&john).unwrap().len(), 1);
    }

    #[test]
    fn existing_assignment_keeps_granting_after_role_retirement() {
        let (engine, _) = engine();
        seeded(&engine);
        let ctx = admin();
        let john = PrincipalId::new("john.doe");
        let role = RoleId::new("ROLE_HR_VIEWER");
        let hr_read = PermissionId::new("HR_READ");

        engine.assign(&ctx, &john, &role, None, AssignmentSource::Manual).unwrap();
        engine.retire_role(&ctx, &role).unwrap();

        let now = engine.now();
        assert!(engine.active_roles_for(&john, now).unwrap().contains(&role));
        assert!(engine.effective_permissions_for(&john, now).unwrap().contains(&hr_read));
        assert!(engine.authorize(&ctx, &john, &hr_read, now).unwrap());
        assert_eq!(engine.explain(&john, &hr_read, now).unwrap().granting_roles, vec![role.clone()]);

        // New grants of the retired role are refused.
        let err = engine
            .assign(&ctx, &PrincipalId::new("bob.wilson"), &role, None, AssignmentSource::Manual)
            .unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));

        engine.revoke(&ctx, &john, &role).unwrap();
        assert!(!engine.authorize(&ctx, &john, &hr_read, engine.now()).unwrap());
    }
}
