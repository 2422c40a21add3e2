//! Access request workflow: submit, approve, reject, expire.
//!
//! Requests are event-sourced. Every operation loads the request's stream,
//! rebuilds it with [`AccessRequest::replay`], lets the aggregate decide, and
//! appends the resulting events with an exact expected version.
//!
//! ```text
//! approve(id)
//!   ↓  lock target principal
//! 1. replay request, handle Approve        → InvalidState / Validation
//!   ↓
//! 2. plan grant (references, expiry, SoD)  → PolicyViolation (stays Pending)
//!   ↓
//! 3. write assignment set
//!   ↓
//! 4. append [Approved, Provisioned]        → on failure: restore step 3
//!   ↓
//! 5. audit + RequestApproved notification
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use accessgate_auth::{
    AccessRequest, ApproveRequest, AssignmentSet, AssignmentSource, ExpireRequest, RejectRequest,
    RequestCommand, RequestEvent, RequestKind, RequestPriority, RequestStatus, SubmitRequest,
};
use accessgate_core::{
    Aggregate, AggregateRoot, DomainError, DomainResult, ExpectedVersion, PrincipalId, RequestId,
    RoleId,
};
use accessgate_events::Notification;

use super::assignments::GrantError;
use super::{AccessEngine, OperationContext};
use crate::audit::{AuditCategory, AuditOutcome};

/// Caller input for [`AccessEngine::submit`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewAccessRequest {
    pub requester: PrincipalId,
    /// Who receives the role; defaults to the requester.
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

impl NewAccessRequest {
    pub fn new(
        requester: impl Into<PrincipalId>,
        role: impl Into<RoleId>,
        justification: impl Into<String>,
    ) -> Self {
        Self {
            requester: requester.into(),
            target: None,
            role: role.into(),
            justification: justification.into(),
            kind: RequestKind::RoleBased,
            priority: None,
            temporary: false,
            expires_at: None,
        }
    }

    pub fn for_target(mut self, target: impl Into<PrincipalId>) -> Self {
        self.target = Some(target.into());
        self
    }

    pub fn kind(mut self, kind: RequestKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn priority(mut self, priority: RequestPriority) -> Self {
        self.priority = Some(priority);
        self
    }

    /// Temporary access ending at `expires_at`.
    pub fn until(mut self, expires_at: DateTime<Utc>) -> Self {
        self.temporary = true;
        self.expires_at = Some(expires_at);
        self
    }
}

/// Listing filter. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestFilter {
    pub requester: Option<PrincipalId>,
    pub target: Option<PrincipalId>,
    pub status: Option<RequestStatus>,
}

impl RequestFilter {
    pub fn matches(&self, request: &AccessRequest) -> bool {
        self.requester.as_ref().is_none_or(|r| &request.requester == r)
            && self.target.as_ref().is_none_or(|t| &request.target == t)
            && self.status.is_none_or(|s| request.status == s)
    }
}

impl AccessEngine {
    fn load_request(&self, id: &RequestId) -> DomainResult<AccessRequest> {
        let events = self.stores.requests.load(id)?;
        if events.is_empty() {
            return Err(DomainError::not_found("request", id));
        }
        Ok(AccessRequest::replay(id.clone(), &events))
    }

    fn append_request_events(
        &self,
        request: &mut AccessRequest,
        events: &[RequestEvent],
    ) -> DomainResult<()> {
        self.stores
            .requests
            .append(&request.id, events, ExpectedVersion::Exact(request.version()))?;
        for event in events {
            request.apply(event);
        }
        Ok(())
    }

    /// Put a principal's assignments back after a failed workflow write.
    fn restore_assignments(&self, previous: AssignmentSet) {
        let principal = previous.principal.clone();
        if let Err(err) = self.save_assignments(previous) {
            tracing::error!(principal = %principal, error = %err, "failed to restore assignments");
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Submit
    // ─────────────────────────────────────────────────────────────────────────

    pub fn submit(&self, ctx: &OperationContext, new: NewAccessRequest) -> DomainResult<AccessRequest> {
        let now = self.now();

        self.load_principal(&new.requester)?;
        let target_id = new.target.clone().unwrap_or_else(|| new.requester.clone());
        if self.load_principal(&target_id)?.is_terminated() {
            return Err(DomainError::conflict(format!("principal {target_id} is terminated")));
        }
        let role = self.load_role(&new.role)?;
        role.ensure_active()?;
        if let RequestKind::PermissionBased { permissions } = &new.kind {
            if let Some(missing) = permissions.iter().find(|p| !role.grants(p)) {
                return Err(DomainError::validation(format!(
                    "role {} does not grant {missing}",
                    role.id
                )));
            }
        }

        let id = self.stores.requests.next_id()?;
        let request = AccessRequest::empty(id.clone());
        let events = request.handle(&RequestCommand::Submit(SubmitRequest {
            request_id: id.clone(),
            requester: new.requester,
            target: Some(target_id.clone()),
            role: new.role,
            justification: new.justification,
            kind: new.kind,
            priority: new.priority,
            temporary: new.temporary,
            expires_at: new.expires_at,
            occurred_at: now,
        }))?;

        self.with_principal(&target_id, "submit", || {
            let mut stored = request.clone();
            self.append_request_events(&mut stored, &events)?;

            tracing::info!(request = %id, target = %stored.target, role = %stored.role, "access request submitted");
            self.audit(
                ctx,
                AuditCategory::RequestLifecycle,
                "submit_request",
                AuditOutcome::Success,
                &id,
                json!({
                    "requester": stored.requester,
                    "target": stored.target,
                    "role": stored.role,
                    "kind": stored.kind,
                    "priority": stored.priority,
                    "expires_at": stored.expires_at,
                }),
            );
            self.publish(Notification::RequestSubmitted {
                request_id: id.clone(),
                requester: stored.requester.clone(),
                target: stored.target.clone(),
                role: stored.role.clone(),
                occurred_at: now,
            });
            Ok(stored)
        })
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Decide
    // ─────────────────────────────────────────────────────────────────────────

    /// Approve a pending request and provision its role.
    ///
    /// Either the assignment exists and the request is `Provisioned`, or
    /// neither changed.
    pub fn approve(
        &self,
        ctx: &OperationContext,
        id: &RequestId,
        approver: &PrincipalId,
        comment: Option<String>,
    ) -> DomainResult<AccessRequest> {
        let target = self.load_request(id)?.target;
        self.load_principal(approver)?;

        let mut write_failure: Option<String> = None;
        let result = self.with_principal(&target, "approve", || {
            write_failure = None;
            let now = self.now();
            let mut request = self.load_request(id)?;
            let events = request.handle(&RequestCommand::Approve(ApproveRequest {
                approver: approver.clone(),
                comment: comment.clone(),
                allow_self_approval: self.config.allow_self_approval,
                occurred_at: now,
            }))?;

            let plan = match self.plan_grant(
                &request.target,
                &request.role,
                request.expires_at,
                AssignmentSource::RequestWorkflow,
                Some(id),
                now,
            ) {
                Ok(plan) => plan,
                Err(GrantError::Sod(violation)) => {
                    self.report_violation(
                        ctx,
                        AuditCategory::RequestLifecycle,
                        "approve_request",
                        &request.target,
                        &violation,
                        Some(id),
                    );
                    return Err(violation.into());
                }
                Err(GrantError::Domain(err)) => return Err(err),
            };

            if let Err(err) = self.save_assignments(plan.updated) {
                write_failure = Some(err.to_string());
                return Err(err);
            }
            if let Err(err) = self.append_request_events(&mut request, &events) {
                write_failure = Some(err.to_string());
                self.restore_assignments(plan.previous);
                return Err(err);
            }

            tracing::info!(request = %id, approver = %approver, target = %request.target, role = %request.role, "access request approved");
            self.audit(
                ctx,
                AuditCategory::RequestLifecycle,
                "approve_request",
                AuditOutcome::Success,
                id,
                json!({
                    "approver": approver,
                    "target": request.target,
                    "role": request.role,
                    "expires_at": request.expires_at,
                    "comment": request.comment,
                }),
            );
            self.publish(Notification::RequestApproved {
                request_id: id.clone(),
                target: request.target.clone(),
                role: request.role.clone(),
                approver: approver.clone(),
                expires_at: request.expires_at,
                occurred_at: now,
            });
            Ok(request)
        });

        if let (Err(err), Some(cause)) = (&result, &write_failure) {
            tracing::error!(request = %id, error = %err, cause = %cause, "approval failed to persist");
            self.audit(
                ctx,
                AuditCategory::RequestLifecycle,
                "approve_request",
                AuditOutcome::Error,
                id,
                json!({ "approver": approver, "error": err.code(), "cause": cause }),
            );
        }
        result
    }

    pub fn reject(
        &self,
        ctx: &OperationContext,
        id: &RequestId,
        approver: &PrincipalId,
        reason: &str,
    ) -> DomainResult<AccessRequest> {
        let target = self.load_request(id)?.target;
        self.load_principal(approver)?;

        self.with_principal(&target, "reject", || {
            let now = self.now();
            let mut request = self.load_request(id)?;
            let events = request.handle(&RequestCommand::Reject(RejectRequest {
                approver: approver.clone(),
                reason: reason.to_string(),
                occurred_at: now,
            }))?;
            self.append_request_events(&mut request, &events)?;

            let recorded = request.comment.clone().unwrap_or_default();
            tracing::info!(request = %id, approver = %approver, "access request rejected");
            self.audit(
                ctx,
                AuditCategory::RequestLifecycle,
                "reject_request",
                AuditOutcome::Success,
                id,
                json!({ "approver": approver, "reason": recorded }),
            );
            self.publish(Notification::RequestRejected {
                request_id: id.clone(),
                requester: request.requester.clone(),
                approver: approver.clone(),
                reason: recorded,
                occurred_at: now,
            });
            Ok(request)
        })
    }

    /// Expire a provisioned temporary grant once `as_of` is past its expiry,
    /// revoking the linked assignment. Before that point the request is
    /// returned unchanged.
    pub fn expire(
        &self,
        ctx: &OperationContext,
        id: &RequestId,
        as_of: DateTime<Utc>,
    ) -> DomainResult<AccessRequest> {
        let target = self.load_request(id)?.target;

        self.with_principal(&target, "expire", || {
            let mut request = self.load_request(id)?;
            let events = request.handle(&RequestCommand::Expire(ExpireRequest { as_of }))?;
            if events.is_empty() {
                return Ok(request);
            }

            let now = self.now();
            let previous = self.load_assignments(&target)?;
            let mut set = previous.clone();
            let revoked = set.revoke_linked(id, now);
            if revoked.is_some() {
                self.save_assignments(set)?;
            }
            if let Err(err) = self.append_request_events(&mut request, &events) {
                if revoked.is_some() {
                    self.restore_assignments(previous);
                }
                return Err(err);
            }

            tracing::info!(request = %id, target = %target, role = %request.role, "access request expired");
            self.audit(
                ctx,
                AuditCategory::RequestLifecycle,
                "expire_request",
                AuditOutcome::Success,
                id,
                json!({
                    "target": request.target,
                    "role": request.role,
                    "expires_at": request.expires_at,
                    "revoked": revoked,
                }),
            );
            self.publish(Notification::RequestExpired {
                request_id: id.clone(),
                target: request.target.clone(),
                role: request.role.clone(),
                occurred_at: as_of,
            });
            Ok(request)
        })
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Reads (with lazy expiry)
    // ─────────────────────────────────────────────────────────────────────────

    /// Current state of a request; a grant past its expiry is expired first.
    pub fn request(&self, id: &RequestId) -> DomainResult<AccessRequest> {
        let request = self.load_request(id)?;
        let now = self.now();
        if request.is_due(now) {
            return self.expire(&OperationContext::system(), id, now);
        }
        Ok(request)
    }

    /// Every request matching `filter`, in submission order.
    pub fn requests(&self, filter: &RequestFilter) -> DomainResult<Vec<AccessRequest>> {
        let mut matching = Vec::new();
        for id in self.stores.requests.ids()? {
            let request = self.request(&id)?;
            if filter.matches(&request) {
                matching.push(request);
            }
        }
        Ok(matching)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::super::tests::{admin, at, engine, seeded};
    use accessgate_core::PermissionId;

    fn ctx(actor: &'static str) -> OperationContext {
        OperationContext::new(actor)
    }

    #[test]
    fn submit_assigns_sequential_ids_and_defaults_target() {
        let (engine, _) = engine();
        seeded(&engine);

        let first = engine
            .submit(&ctx("john.doe"), NewAccessRequest::new("john.doe", "ROLE_ADMIN", "Need admin access for project"))
            .unwrap();
        assert_eq!(first.id.as_str(), "REQ-001");
        assert_eq!(first.status, RequestStatus::Pending);
        assert_eq!(first.target, PrincipalId::new("john.doe"));
        assert_eq!(first.version, 1);

        let second = engine
            .submit(
                &ctx("john.doe"),
                NewAccessRequest::new("john.doe", "ROLE_HR_VIEWER", "Onboarding").for_target("bob.wilson"),
            )
            .unwrap();
        assert_eq!(second.id.as_str(), "REQ-002");
        assert_eq!(second.target, PrincipalId::new("bob.wilson"));
    }

    #[test]
    fn submit_validates_references() {
        let (engine, _) = engine();
        seeded(&engine);
        let c = ctx("john.doe");

        let err = engine
            .submit(&c, NewAccessRequest::new("ghost", "ROLE_ADMIN", "why"))
            .unwrap_err();
        assert!(matches!(err, DomainError::NotFound { kind: "principal", .. }));

        let err = engine
            .submit(&c, NewAccessRequest::new("john.doe", "ROLE_NOPE", "why"))
            .unwrap_err();
        assert!(matches!(err, DomainError::NotFound { kind: "role", .. }));

        let err = engine
            .submit(
                &c,
                NewAccessRequest::new("john.doe", "ROLE_HR_VIEWER", "payroll").kind(RequestKind::PermissionBased {
                    permissions: vec![PermissionId::new("HR_PAYROLL")],
                }),
            )
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));

        let err = engine
            .submit(&c, NewAccessRequest::new("john.doe", "ROLE_USER", "   "))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn self_approval_is_refused_by_default() {
        let (engine, _) = engine();
        seeded(&engine);
        let request = engine
            .submit(&ctx("john.doe"), NewAccessRequest::new("john.doe", "ROLE_USER", "daily work"))
            .unwrap();

        let err = engine
            .approve(&ctx("john.doe"), &request.id, &PrincipalId::new("john.doe"), None)
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
        assert_eq!(engine.request(&request.id).unwrap().status, RequestStatus::Pending);
    }

    #[test]
    fn reject_records_reason_and_blocks_redecision() {
        let (engine, _) = engine();
        seeded(&engine);
        let request = engine
            .submit(&ctx("john.doe"), NewAccessRequest::new("john.doe", "ROLE_ADMIN", "curious"))
            .unwrap();
        let approver = PrincipalId::new("admin");

        let err = engine.reject(&admin(), &request.id, &approver, " ").unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));

        let rejected = engine
            .reject(&admin(), &request.id, &approver, "Not needed for current role")
            .unwrap();
        assert_eq!(rejected.status, RequestStatus::Rejected);
        assert_eq!(rejected.comment.as_deref(), Some("Not needed for current role"));

        let err = engine.approve(&admin(), &request.id, &approver, None).unwrap_err();
        assert!(matches!(err, DomainError::InvalidState(_)));
        assert!(engine.active_roles_for(&request.target, engine.now()).unwrap().is_empty());
    }

    #[test]
    fn expire_before_the_deadline_changes_nothing() {
        let (engine, _) = engine();
        seeded(&engine);
        let request = engine
            .submit(
                &ctx("jane.smith"),
                NewAccessRequest::new("jane.smith", "ROLE_FINANCE_MANAGER", "Quarter close").until(at(2, 1)),
            )
            .unwrap();
        engine.approve(&admin(), &request.id, &PrincipalId::new("admin"), None).unwrap();

        let unchanged = engine.expire(&admin(), &request.id, at(1, 15)).unwrap();
        assert_eq!(unchanged.status, RequestStatus::Provisioned);

        let pending = engine
            .submit(&ctx("jane.smith"), NewAccessRequest::new("jane.smith", "ROLE_USER", "basics"))
            .unwrap();
        let err = engine.expire(&admin(), &pending.id, at(3, 1)).unwrap_err();
        assert!(matches!(err, DomainError::InvalidState(_)));
    }

    #[test]
    fn listing_filters_by_status_and_requester() {
        let (engine, _) = engine();
        seeded(&engine);
        engine
            .submit(&ctx("john.doe"), NewAccessRequest::new("john.doe", "ROLE_USER", "a"))
            .unwrap();
        let second = engine
            .submit(&ctx("jane.smith"), NewAccessRequest::new("jane.smith", "ROLE_USER", "b"))
            .unwrap();
        engine
            .reject(&admin(), &second.id, &PrincipalId::new("admin"), "no")
            .unwrap();

        let pending = engine
            .requests(&RequestFilter {
                status: Some(RequestStatus::Pending),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].requester, PrincipalId::new("john.doe"));

        let janes = engine
            .requests(&RequestFilter {
                requester: Some(PrincipalId::new("jane.smith")),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(janes.len(), 1);
        assert_eq!(janes[0].status, RequestStatus::Rejected);
    }
}
