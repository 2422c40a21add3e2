//! Access request aggregate (event-sourced).
//!
//! A request moves through a strict state machine:
//!
//! ```text
//! Pending ──approve──▶ Approved ──▶ Provisioned ──expire──▶ Expired
//!    └────reject────▶ Rejected
//! ```
//!
//! Approval and provisioning are decided together: `approve` yields both the
//! `Approved` and `Provisioned` events, and the caller applies them only after
//! the role assignment has been written.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use accessgate_core::{
    Aggregate, AggregateRoot, DomainError, PermissionId, PrincipalId, RequestId, RoleId,
};
use accessgate_events::Event;

// ─────────────────────────────────────────────────────────────────────────────
// Request Status / Kind / Priority
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
    Provisioned,
    Expired,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Approved => "approved",
            RequestStatus::Rejected => "rejected",
            RequestStatus::Provisioned => "provisioned",
            RequestStatus::Expired => "expired",
        }
    }
}

impl core::fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What is being asked for.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum RequestKind {
    /// The whole role.
    #[default]
    RoleBased,
    /// Specific permissions; the role is the vehicle that grants them.
    PermissionBased { permissions: Vec<PermissionId> },
    /// Break-glass access. Always temporary, always high priority.
    Emergency,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestPriority {
    Low,
    #[default]
    Medium,
    High,
}

// ─────────────────────────────────────────────────────────────────────────────
// Access Request Aggregate
// ─────────────────────────────────────────────────────────────────────────────

/// # Invariants
/// - Justification is never empty.
/// - `expires_at` is set iff `temporary`, and lies after `submitted_at`.
/// - Only a `Pending` request can be decided.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccessRequest {
    pub id: RequestId,
    pub requester: PrincipalId,
    pub target: PrincipalId,
    pub role: RoleId,
    pub justification: String,
    pub kind: RequestKind,
    pub priority: RequestPriority,
    pub temporary: bool,
    pub expires_at: Option<DateTime<Utc>>,
    pub status: RequestStatus,
    pub approver: Option<PrincipalId>,
    pub comment: Option<String>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub decided_at: Option<DateTime<Utc>>,
    pub expired_at: Option<DateTime<Utc>>,
    pub version: u64,
    #[serde(skip)]
    pub created: bool,
}

impl AccessRequest {
    pub fn empty(id: RequestId) -> Self {
        Self {
            id,
            requester: PrincipalId::from_static(""),
            target: PrincipalId::from_static(""),
            role: RoleId::from_static(""),
            justification: String::new(),
            kind: RequestKind::RoleBased,
            priority: RequestPriority::Medium,
            temporary: false,
            expires_at: None,
            status: RequestStatus::Pending,
            approver: None,
            comment: None,
            submitted_at: None,
            decided_at: None,
            expired_at: None,
            version: 0,
            created: false,
        }
    }

    /// Rebuild a request from its event history.
    pub fn replay<'a>(id: RequestId, events: impl IntoIterator<Item = &'a RequestEvent>) -> Self {
        let mut request = Self::empty(id);
        for event in events {
            request.apply(event);
        }
        request
    }

    pub fn is_pending(&self) -> bool {
        self.status == RequestStatus::Pending
    }

    /// Whether [`ExpireRequest`] at `as_of` would transition this request.
    pub fn is_due(&self, as_of: DateTime<Utc>) -> bool {
        matches!(self.status, RequestStatus::Approved | RequestStatus::Provisioned)
            && self.expires_at.is_some_and(|e| as_of > e)
    }

    fn ensure_created(&self) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found("request", &self.id));
        }
        Ok(())
    }

    fn ensure_pending(&self, action: &str) -> Result<(), DomainError> {
        if self.status != RequestStatus::Pending {
            return Err(DomainError::invalid_state(format!(
                "cannot {action} request {} in status {}",
                self.id, self.status
            )));
        }
        Ok(())
    }
}

impl AggregateRoot for AccessRequest {
    type Id = RequestId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Commands
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitRequest {
    pub request_id: RequestId,
    pub requester: PrincipalId,
    /// Defaults to the requester.
    pub target: Option<PrincipalId>,
    pub role: RoleId,
    pub justification: String,
    pub kind: RequestKind,
    pub priority: Option<RequestPriority>,
    pub temporary: bool,
    pub expires_at: Option<DateTime<Utc>>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApproveRequest {
    pub approver: PrincipalId,
    pub comment: Option<String>,
    pub allow_self_approval: bool,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RejectRequest {
    pub approver: PrincipalId,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpireRequest {
    pub as_of: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum RequestCommand {
    Submit(SubmitRequest),
    Approve(ApproveRequest),
    Reject(RejectRequest),
    Expire(ExpireRequest),
}

// ─────────────────────────────────────────────────────────────────────────────
// Events
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestSubmitted {
    pub request_id: RequestId,
    pub requester: PrincipalId,
    pub target: PrincipalId,
    pub role: RoleId,
    pub justification: String,
    pub kind: RequestKind,
    pub priority: RequestPriority,
    pub temporary: bool,
    pub expires_at: Option<DateTime<Utc>>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestApproved {
    pub approver: PrincipalId,
    pub comment: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestProvisioned {
    pub target: PrincipalId,
    pub role: RoleId,
    pub expires_at: Option<DateTime<Utc>>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestRejected {
    pub approver: PrincipalId,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestExpired {
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestEvent {
    Submitted(RequestSubmitted),
    Approved(RequestApproved),
    Provisioned(RequestProvisioned),
    Rejected(RequestRejected),
    Expired(RequestExpired),
}

impl Event for RequestEvent {
    fn event_type(&self) -> &'static str {
        match self {
            RequestEvent::Submitted(_) => "access.request.submitted",
            RequestEvent::Approved(_) => "access.request.approved",
            RequestEvent::Provisioned(_) => "access.request.provisioned",
            RequestEvent::Rejected(_) => "access.request.rejected",
            RequestEvent::Expired(_) => "access.request.expired",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            RequestEvent::Submitted(e) => e.occurred_at,
            RequestEvent::Approved(e) => e.occurred_at,
            RequestEvent::Provisioned(e) => e.occurred_at,
            RequestEvent::Rejected(e) => e.occurred_at,
            RequestEvent::Expired(e) => e.occurred_at,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Aggregate Implementation
// ─────────────────────────────────────────────────────────────────────────────

impl Aggregate for AccessRequest {
    type Command = RequestCommand;
    type Event = RequestEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            RequestEvent::Submitted(e) => self.apply_submitted(e),
            RequestEvent::Approved(e) => self.apply_approved(e),
            RequestEvent::Provisioned(_) => self.status = RequestStatus::Provisioned,
            RequestEvent::Rejected(e) => self.apply_rejected(e),
            RequestEvent::Expired(e) => self.apply_expired(e),
        }
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            RequestCommand::Submit(cmd) => self.handle_submit(cmd),
            RequestCommand::Approve(cmd) => self.handle_approve(cmd),
            RequestCommand::Reject(cmd) => self.handle_reject(cmd),
            RequestCommand::Expire(cmd) => self.handle_expire(cmd),
        }
    }
}

impl AccessRequest {
    // ─────────────────────────────────────────────────────────────────────────
    // Command Handlers
    // ─────────────────────────────────────────────────────────────────────────

    fn handle_submit(&self, cmd: &SubmitRequest) -> Result<Vec<RequestEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict(format!("request {} already exists", self.id)));
        }

        cmd.requester.validate()?;
        cmd.role.validate()?;
        let target = cmd.target.clone().unwrap_or_else(|| cmd.requester.clone());
        target.validate()?;

        let justification = cmd.justification.trim();
        if justification.is_empty() {
            return Err(DomainError::validation("justification cannot be empty"));
        }

        match (cmd.temporary, cmd.expires_at) {
            (false, Some(_)) => {
                return Err(DomainError::validation(
                    "expires_at requires the request to be temporary",
                ));
            }
            (true, None) => {
                return Err(DomainError::validation(
                    "temporary access requires an expiry date",
                ));
            }
            (true, Some(expires_at)) if expires_at <= cmd.occurred_at => {
                return Err(DomainError::validation(
                    "expiry date must be after the submission time",
                ));
            }
            _ => {}
        }

        let priority = match &cmd.kind {
            RequestKind::RoleBased => cmd.priority.unwrap_or_default(),
            RequestKind::PermissionBased { permissions } => {
                if permissions.is_empty() {
                    return Err(DomainError::validation(
                        "permission-based request must name at least one permission",
                    ));
                }
                for permission in permissions {
                    permission.validate()?;
                }
                cmd.priority.unwrap_or_default()
            }
            RequestKind::Emergency => {
                if !cmd.temporary {
                    return Err(DomainError::validation("emergency access must be temporary"));
                }
                RequestPriority::High
            }
        };

        Ok(vec![RequestEvent::Submitted(RequestSubmitted {
            request_id: self.id.clone(),
            requester: cmd.requester.clone(),
            target,
            role: cmd.role.clone(),
            justification: justification.to_string(),
            kind: cmd.kind.clone(),
            priority,
            temporary: cmd.temporary,
            expires_at: cmd.expires_at,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_approve(&self, cmd: &ApproveRequest) -> Result<Vec<RequestEvent>, DomainError> {
        self.ensure_created()?;
        self.ensure_pending("approve")?;

        if !cmd.allow_self_approval && (cmd.approver == self.requester || cmd.approver == self.target) {
            return Err(DomainError::validation(format!(
                "{} cannot approve their own request",
                cmd.approver
            )));
        }

        let comment = cmd
            .comment
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_string);

        Ok(vec![
            RequestEvent::Approved(RequestApproved {
                approver: cmd.approver.clone(),
                comment,
                occurred_at: cmd.occurred_at,
            }),
            RequestEvent::Provisioned(RequestProvisioned {
                target: self.target.clone(),
                role: self.role.clone(),
                expires_at: self.expires_at,
                occurred_at: cmd.occurred_at,
            }),
        ])
    }

    fn handle_reject(&self, cmd: &RejectRequest) -> Result<Vec<RequestEvent>, DomainError> {
        self.ensure_created()?;
        self.ensure_pending("reject")?;

        let reason = cmd.reason.trim();
        if reason.is_empty() {
            return Err(DomainError::validation("rejection reason cannot be empty"));
        }

        Ok(vec![RequestEvent::Rejected(RequestRejected {
            approver: cmd.approver.clone(),
            reason: reason.to_string(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_expire(&self, cmd: &ExpireRequest) -> Result<Vec<RequestEvent>, DomainError> {
        self.ensure_created()?;

        let expirable = matches!(self.status, RequestStatus::Approved | RequestStatus::Provisioned);
        if !expirable || self.expires_at.is_none() {
            return Err(DomainError::invalid_state(format!(
                "request {} in status {} has no grant that can expire",
                self.id, self.status
            )));
        }

        if !self.is_due(cmd.as_of) {
            return Ok(Vec::new());
        }

        Ok(vec![RequestEvent::Expired(RequestExpired {
            occurred_at: cmd.as_of,
        })])
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Event Appliers
    // ─────────────────────────────────────────────────────────────────────────

    fn apply_submitted(&mut self, e: &RequestSubmitted) {
        self.id = e.request_id.clone();
        self.requester = e.requester.clone();
        self.target = e.target.clone();
        self.role = e.role.clone();
        self.justification = e.justification.clone();
        self.kind = e.kind.clone();
        self.priority = e.priority;
        self.temporary = e.temporary;
        self.expires_at = e.expires_at;
        self.status = RequestStatus::Pending;
        self.submitted_at = Some(e.occurred_at);
        self.created = true;
    }

    fn apply_approved(&mut self, e: &RequestApproved) {
        self.status = RequestStatus::Approved;
        self.approver = Some(e.approver.clone());
        self.comment = e.comment.clone();
        self.decided_at = Some(e.occurred_at);
    }

    fn apply_rejected(&mut self, e: &RequestRejected) {
        self.status = RequestStatus::Rejected;
        self.approver = Some(e.approver.clone());
        self.comment = Some(e.reason.clone());
        self.decided_at = Some(e.occurred_at);
    }

    fn apply_expired(&mut self, e: &RequestExpired) {
        self.status = RequestStatus::Expired;
        self.expired_at = Some(e.occurred_at);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn jan(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, day, 9, 0, 0).unwrap()
    }

    fn submit(kind: RequestKind, temporary: bool, expires_at: Option<DateTime<Utc>>) -> SubmitRequest {
        SubmitRequest {
            request_id: RequestId::from_sequence(1),
            requester: PrincipalId::new("john.doe"),
            target: None,
            role: RoleId::new("ROLE_ADMIN"),
            justification: "need admin access".to_string(),
            kind,
            priority: None,
            temporary,
            expires_at,
            occurred_at: jan(1),
        }
    }

    fn run(request: &mut AccessRequest, cmd: RequestCommand) -> Vec<RequestEvent> {
        let events = request.handle(&cmd).unwrap();
        for event in &events {
            request.apply(event);
        }
        events
    }

    fn pending(temporary: bool, expires_at: Option<DateTime<Utc>>) -> AccessRequest {
        let mut request = AccessRequest::empty(RequestId::from_sequence(1));
        run(
            &mut request,
            RequestCommand::Submit(submit(RequestKind::RoleBased, temporary, expires_at)),
        );
        request
    }

    fn approve_by(approver: &'static str) -> RequestCommand {
        RequestCommand::Approve(ApproveRequest {
            approver: PrincipalId::new(approver),
            comment: Some("  ok ".to_string()),
            allow_self_approval: false,
            occurred_at: jan(2),
        })
    }

    #[test]
    fn submit_defaults_target_and_priority() {
        let request = pending(false, None);

        assert!(request.created);
        assert_eq!(request.status, RequestStatus::Pending);
        assert_eq!(request.target, PrincipalId::new("john.doe"));
        assert_eq!(request.priority, RequestPriority::Medium);
        assert_eq!(request.version, 1);
    }

    #[test]
    fn submit_validates_justification_and_expiry() {
        let request = AccessRequest::empty(RequestId::from_sequence(1));

        let mut blank = submit(RequestKind::RoleBased, false, None);
        blank.justification = "   ".to_string();
        let cases = vec![
            blank,
            submit(RequestKind::RoleBased, false, Some(jan(20))),
            submit(RequestKind::RoleBased, true, None),
            submit(RequestKind::RoleBased, true, Some(jan(1))),
            submit(RequestKind::PermissionBased { permissions: vec![] }, false, None),
            submit(RequestKind::Emergency, false, None),
        ];

        for cmd in cases {
            let result = request.handle(&RequestCommand::Submit(cmd));
            assert!(matches!(result, Err(DomainError::Validation(_))), "{result:?}");
        }
    }

    #[test]
    fn emergency_requests_are_high_priority() {
        let mut request = AccessRequest::empty(RequestId::from_sequence(1));
        let mut cmd = submit(RequestKind::Emergency, true, Some(jan(1) + Duration::hours(4)));
        cmd.priority = Some(RequestPriority::Low);
        run(&mut request, RequestCommand::Submit(cmd));

        assert_eq!(request.priority, RequestPriority::High);
    }

    #[test]
    fn approve_emits_approved_then_provisioned() {
        let mut request = pending(false, None);
        let events = run(&mut request, approve_by("mgr1"));

        assert!(matches!(events[0], RequestEvent::Approved(_)));
        assert!(matches!(events[1], RequestEvent::Provisioned(_)));
        assert_eq!(request.status, RequestStatus::Provisioned);
        assert_eq!(request.approver, Some(PrincipalId::new("mgr1")));
        assert_eq!(request.comment.as_deref(), Some("ok"));
        assert_eq!(request.version, 3);
    }

    #[test]
    fn self_approval_is_blocked_unless_allowed() {
        let request = pending(false, None);
        let err = request.handle(&approve_by("john.doe")).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));

        let allowed = RequestCommand::Approve(ApproveRequest {
            approver: PrincipalId::new("john.doe"),
            comment: None,
            allow_self_approval: true,
            occurred_at: jan(2),
        });
        assert_eq!(request.handle(&allowed).unwrap().len(), 2);
    }

    #[test]
    fn decided_requests_cannot_be_decided_again() {
        let mut request = pending(false, None);
        run(&mut request, approve_by("mgr1"));
        let snapshot = request.clone();

        let reject = RequestCommand::Reject(RejectRequest {
            approver: PrincipalId::new("mgr1"),
            reason: "no".to_string(),
            occurred_at: jan(3),
        });
        assert!(matches!(request.handle(&approve_by("mgr1")), Err(DomainError::InvalidState(_))));
        assert!(matches!(request.handle(&reject), Err(DomainError::InvalidState(_))));
        assert_eq!(request, snapshot);
    }

    #[test]
    fn reject_requires_a_reason() {
        let mut request = pending(false, None);
        let blank = RequestCommand::Reject(RejectRequest {
            approver: PrincipalId::new("mgr1"),
            reason: " ".to_string(),
            occurred_at: jan(2),
        });
        assert!(matches!(request.handle(&blank), Err(DomainError::Validation(_))));

        run(
            &mut request,
            RequestCommand::Reject(RejectRequest {
                approver: PrincipalId::new("mgr1"),
                reason: "not justified".to_string(),
                occurred_at: jan(2),
            }),
        );
        assert_eq!(request.status, RequestStatus::Rejected);
        assert_eq!(request.comment.as_deref(), Some("not justified"));
    }

    #[test]
    fn expire_only_after_the_expiry_instant() {
        let feb_1 = Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).unwrap();
        let mut request = pending(true, Some(feb_1));
        run(&mut request, approve_by("mgr1"));

        let at = |as_of| RequestCommand::Expire(ExpireRequest { as_of });
        assert!(request.handle(&at(feb_1)).unwrap().is_empty());
        assert!(!request.is_due(feb_1));

        run(&mut request, at(feb_1 + Duration::days(1)));
        assert_eq!(request.status, RequestStatus::Expired);
        assert!(matches!(
            request.handle(&at(feb_1 + Duration::days(2))),
            Err(DomainError::InvalidState(_))
        ));
    }

    #[test]
    fn expire_rejects_pending_and_permanent_grants() {
        let as_of = RequestCommand::Expire(ExpireRequest { as_of: jan(30) });
        let request = pending(false, None);
        assert!(matches!(request.handle(&as_of), Err(DomainError::InvalidState(_))));

        let mut permanent = pending(false, None);
        run(&mut permanent, approve_by("mgr1"));
        assert!(matches!(permanent.handle(&as_of), Err(DomainError::InvalidState(_))));
    }

    #[test]
    fn kind_is_a_tagged_variant_on_the_wire() {
        let kind = RequestKind::PermissionBased {
            permissions: vec![PermissionId::new("FINANCE_READ")],
        };
        let json = serde_json::to_value(&kind).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "type": "permission-based", "permissions": ["FINANCE_READ"] })
        );

        let parsed: RequestKind = serde_json::from_str(r#"{"type":"emergency"}"#).unwrap();
        assert_eq!(parsed, RequestKind::Emergency);
    }

    #[test]
    fn replay_rebuilds_state() {
        let mut request = pending(false, None);
        let mut history = vec![];
        history.extend(
            AccessRequest::empty(RequestId::from_sequence(1))
                .handle(&RequestCommand::Submit(submit(RequestKind::RoleBased, false, None)))
                .unwrap(),
        );
        history.extend(run(&mut request, approve_by("mgr1")));

        let rebuilt = AccessRequest::replay(RequestId::from_sequence(1), &history);
        assert_eq!(rebuilt, request);
    }
}
