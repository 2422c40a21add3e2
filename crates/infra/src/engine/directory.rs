//! Principal directory and reconciliation against an external directory.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::json;

use accessgate_auth::{AssignmentSource, NewPrincipal, Principal};
use accessgate_core::{DomainError, DomainResult, PrincipalId, RoleId};

use super::assignments::GrantError;
use super::{AccessEngine, OperationContext, ids};
use crate::audit::{AuditCategory, AuditOutcome};

/// One principal as the external directory sees it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryEntry {
    pub principal: NewPrincipal,
    /// Roles the directory says the principal should hold.
    #[serde(default)]
    pub roles: Vec<RoleId>,
}

/// A role that could not be brought in line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReconcileFailure {
    pub role: RoleId,
    pub error: &'static str,
    pub message: String,
}

/// What `reconcile` changed for one principal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub principal: PrincipalId,
    pub assigned: Vec<RoleId>,
    pub revoked: Vec<RoleId>,
    pub unchanged: Vec<RoleId>,
    pub failures: Vec<ReconcileFailure>,
}

impl ReconcileReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// A directory entry that could not be processed at all.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntryFailure {
    pub principal: PrincipalId,
    pub error: &'static str,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DirectorySyncReport {
    /// Principals created because the directory knew them and we did not.
    pub created: Vec<PrincipalId>,
    pub reconciled: Vec<ReconcileReport>,
    pub failed: Vec<EntryFailure>,
}

impl AccessEngine {
    // ─────────────────────────────────────────────────────────────────────────
    // Principal lifecycle
    // ─────────────────────────────────────────────────────────────────────────

    pub fn create_principal(
        &self,
        ctx: &OperationContext,
        new: NewPrincipal,
    ) -> DomainResult<Principal> {
        let principal = Principal::create(new, self.now())?;
        let id = principal.id.clone();

        self.with_principal(&id, "create_principal", || {
            if !self.stores.principals.insert_new(id.clone(), principal.clone())? {
                return Err(DomainError::conflict(format!("principal {id} already exists")));
            }

            tracing::info!(principal = %id, "principal created");
            self.audit(
                ctx,
                AuditCategory::DirectorySync,
                "create_principal",
                AuditOutcome::Success,
                &id,
                json!({
                    "display_name": principal.display_name,
                    "department": principal.department,
                }),
            );
            Ok(principal.clone())
        })
    }

    pub fn suspend_principal(&self, ctx: &OperationContext, id: &PrincipalId) -> DomainResult<Principal> {
        self.change_status(ctx, id, "suspend_principal", |p, at| p.suspend(at))
    }

    pub fn reactivate_principal(&self, ctx: &OperationContext, id: &PrincipalId) -> DomainResult<Principal> {
        self.change_status(ctx, id, "reactivate_principal", |p, at| p.reactivate(at))
    }

    /// Mark the principal terminated and revoke every active assignment.
    pub fn terminate_principal(&self, ctx: &OperationContext, id: &PrincipalId) -> DomainResult<Principal> {
        self.with_principal(id, "terminate_principal", || {
            let now = self.now();
            let mut principal = self.load_principal(id)?;
            principal.terminate(now)?;

            // Assignments first: a retry after a failed principal write finds
            // nothing left to revoke.
            let mut set = self.load_assignments(id)?;
            let revoked = set.revoke_all(now);
            if !revoked.is_empty() {
                self.save_assignments(set)?;
            }
            self.stores.principals.upsert(id.clone(), principal.clone())?;

            tracing::info!(principal = %id, revoked = revoked.len(), "principal terminated");
            self.audit(
                ctx,
                AuditCategory::DirectorySync,
                "terminate_principal",
                AuditOutcome::Success,
                id,
                json!({ "status": principal.status, "revoked": ids(&revoked) }),
            );
            Ok(principal)
        })
    }

    fn change_status(
        &self,
        ctx: &OperationContext,
        id: &PrincipalId,
        action: &'static str,
        transition: impl Fn(&mut Principal, chrono::DateTime<chrono::Utc>) -> DomainResult<()>,
    ) -> DomainResult<Principal> {
        self.with_principal(id, action, || {
            let mut principal = self.load_principal(id)?;
            let before = principal.status;
            transition(&mut principal, self.now())?;
            self.stores.principals.upsert(id.clone(), principal.clone())?;

            tracing::info!(principal = %id, from = %before, to = %principal.status, "principal status changed");
            self.audit(
                ctx,
                AuditCategory::DirectorySync,
                action,
                AuditOutcome::Success,
                id,
                json!({ "before": before, "after": principal.status }),
            );
            Ok(principal)
        })
    }

    pub fn principal(&self, id: &PrincipalId) -> DomainResult<Principal> {
        self.load_principal(id)
    }

    /// Every principal, ordered by id.
    pub fn principals(&self) -> DomainResult<Vec<Principal>> {
        Ok(self.stores.principals.list()?)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Reconciliation
    // ─────────────────────────────────────────────────────────────────────────

    /// Bring `principal`'s active roles in line with `desired`.
    ///
    /// Extras are revoked first, then missing roles are assigned with source
    /// `directory-sync`. A role that cannot be assigned is reported in the
    /// result and does not stop the others. Every change is planned against
    /// one working set and saved at once, so a failed save leaves the stored
    /// assignments untouched.
    pub fn reconcile(
        &self,
        ctx: &OperationContext,
        principal: &PrincipalId,
        desired: &[RoleId],
    ) -> DomainResult<ReconcileReport> {
        let desired: BTreeSet<RoleId> = desired.iter().cloned().collect();

        self.with_principal(principal, "reconcile", || {
            if self.load_principal(principal)?.is_terminated() {
                return Err(DomainError::conflict(format!("principal {principal} is terminated")));
            }

            let now = self.now();
            let mut working = self.load_assignments(principal)?;
            let current = working.active_roles(now);

            let mut report = ReconcileReport {
                principal: principal.clone(),
                assigned: Vec::new(),
                revoked: current.difference(&desired).cloned().collect(),
                unchanged: current.intersection(&desired).cloned().collect(),
                failures: Vec::new(),
            };

            for role in &report.revoked {
                working.revoke(role, now);
            }

            let mut granted = Vec::new();
            let mut violations = Vec::new();
            for role in desired.difference(&current) {
                let source = AssignmentSource::DirectorySync;
                match self.plan_grant_on(working.clone(), role, None, source, None, now) {
                    Ok(plan) => {
                        working = plan.updated;
                        report.assigned.push(role.clone());
                        granted.push(plan.change);
                    }
                    Err(GrantError::Sod(violation)) => {
                        let err = DomainError::from(violation.clone());
                        report.failures.push(ReconcileFailure {
                            role: role.clone(),
                            error: err.code(),
                            message: err.to_string(),
                        });
                        violations.push(violation);
                    }
                    Err(GrantError::Domain(err)) if err.is_transient() => return Err(err),
                    Err(GrantError::Domain(err)) => {
                        report.failures.push(ReconcileFailure {
                            role: role.clone(),
                            error: err.code(),
                            message: err.to_string(),
                        });
                    }
                }
            }

            if !report.revoked.is_empty() || !report.assigned.is_empty() {
                self.save_assignments(working)?;
            }

            // Audit only once the save has gone through.
            for violation in &violations {
                self.report_violation(ctx, AuditCategory::DirectorySync, "reconcile", principal, violation, None);
            }
            for role in &report.revoked {
                self.audit(
                    ctx,
                    AuditCategory::RoleChange,
                    "revoke_role",
                    AuditOutcome::Success,
                    principal,
                    json!({ "role": role, "source": AssignmentSource::DirectorySync }),
                );
            }
            for (role, change) in report.assigned.iter().zip(&granted) {
                self.audit(
                    ctx,
                    AuditCategory::RoleChange,
                    "assign_role",
                    AuditOutcome::Success,
                    principal,
                    json!({
                        "role": role,
                        "expires_at": null,
                        "source": AssignmentSource::DirectorySync,
                        "result": change,
                    }),
                );
            }

            let outcome = if report.is_clean() {
                AuditOutcome::Success
            } else {
                AuditOutcome::Error
            };
            tracing::info!(
                principal = %principal,
                assigned = report.assigned.len(),
                revoked = report.revoked.len(),
                failed = report.failures.len(),
                "principal reconciled"
            );
            self.audit(
                ctx,
                AuditCategory::DirectorySync,
                "reconcile",
                outcome,
                principal,
                json!({
                    "assigned": ids(&report.assigned),
                    "revoked": ids(&report.revoked),
                    "unchanged": ids(&report.unchanged),
                    "failures": report.failures,
                }),
            );
            Ok(report)
        })
    }

    /// Apply a batch of directory entries. Unknown principals are created
    /// when `auto_create_principals` is set; every entry is processed even
    /// when earlier ones fail.
    pub fn sync_directory(&self, ctx: &OperationContext, entries: Vec<DirectoryEntry>) -> DirectorySyncReport {
        let mut report = DirectorySyncReport::default();

        for entry in entries {
            let id = entry.principal.id.clone();
            let fail = |err: DomainError| EntryFailure {
                principal: id.clone(),
                error: err.code(),
                message: err.to_string(),
            };

            let known = match self.stores.principals.get(&id) {
                Ok(found) => found.is_some(),
                Err(err) => {
                    report.failed.push(fail(err.into()));
                    continue;
                }
            };

            if !known {
                if !self.config.auto_create_principals {
                    report.failed.push(fail(DomainError::not_found("principal", &id)));
                    continue;
                }
                match self.create_principal(ctx, entry.principal) {
                    Ok(_) => report.created.push(id.clone()),
                    Err(err) => {
                        report.failed.push(fail(err));
                        continue;
                    }
                }
            }

            match self.reconcile(ctx, &id, &entry.roles) {
                Ok(reconciled) => report.reconciled.push(reconciled),
                Err(err) => report.failed.push(fail(err)),
            }
        }

        tracing::info!(
            created = report.created.len(),
            reconciled = report.reconciled.len(),
            failed = report.failed.len(),
            "directory sync finished"
        );
        report
    }
}
