//! Assignment graph: principal → roles with temporal validity.
//!
//! Records are never deleted. Revocation stamps `revoked_at`, expiry is a
//! read-time comparison against `expires_at`, so the full history stays
//! available for audit views.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use accessgate_core::{PrincipalId, RequestId, RoleId};

/// How an assignment came to exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AssignmentSource {
    #[default]
    Manual,
    RequestWorkflow,
    DirectorySync,
}

impl core::fmt::Display for AssignmentSource {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            AssignmentSource::Manual => write!(f, "manual"),
            AssignmentSource::RequestWorkflow => write!(f, "request-workflow"),
            AssignmentSource::DirectorySync => write!(f, "directory-sync"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleAssignment {
    pub principal: PrincipalId,
    pub role: RoleId,
    pub assigned_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub source: AssignmentSource,
    pub request_id: Option<RequestId>,
    pub revoked_at: Option<DateTime<Utc>>,
}

impl RoleAssignment {
    /// Not revoked, and either permanent or expiring strictly after `as_of`.
    pub fn is_active(&self, as_of: DateTime<Utc>) -> bool {
        self.revoked_at.is_none() && self.expires_at.is_none_or(|expires_at| expires_at > as_of)
    }
}

/// Outcome of [`AssignmentSet::grant`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "change", rename_all = "snake_case")]
pub enum AssignmentChange {
    Created,
    /// The pair was already active; its expiry/source/link were replaced.
    Updated {
        previous_expires_at: Option<DateTime<Utc>>,
    },
}

/// Every assignment record of one principal.
///
/// Stored and replaced as a single value so readers always observe a
/// consistent snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignmentSet {
    pub principal: PrincipalId,
    records: Vec<RoleAssignment>,
}

impl AssignmentSet {
    pub fn new(principal: PrincipalId) -> Self {
        Self {
            principal,
            records: Vec::new(),
        }
    }

    /// Full history, including expired and revoked records.
    pub fn history(&self) -> &[RoleAssignment] {
        &self.records
    }

    pub fn active(&self, as_of: DateTime<Utc>) -> impl Iterator<Item = &RoleAssignment> {
        self.records.iter().filter(move |a| a.is_active(as_of))
    }

    pub fn active_roles(&self, as_of: DateTime<Utc>) -> BTreeSet<RoleId> {
        self.active(as_of).map(|a| a.role.clone()).collect()
    }

    pub fn active_assignment(&self, role: &RoleId, as_of: DateTime<Utc>) -> Option<&RoleAssignment> {
        self.records
            .iter()
            .find(|a| &a.role == role && a.is_active(as_of))
    }

    /// Create an assignment, or update the active one for the same role.
    pub fn grant(
        &mut self,
        role: RoleId,
        expires_at: Option<DateTime<Utc>>,
        source: AssignmentSource,
        request_id: Option<RequestId>,
        at: DateTime<Utc>,
    ) -> AssignmentChange {
        if let Some(existing) = self
            .records
            .iter_mut()
            .find(|a| a.role == role && a.is_active(at))
        {
            let previous_expires_at = existing.expires_at;
            existing.expires_at = expires_at;
            existing.source = source;
            existing.request_id = request_id;
            return AssignmentChange::Updated { previous_expires_at };
        }

        self.records.push(RoleAssignment {
            principal: self.principal.clone(),
            role,
            assigned_at: at,
            expires_at,
            source,
            request_id,
            revoked_at: None,
        });
        AssignmentChange::Created
    }

    /// Revoke the active assignment for `role`. Returns `false` when there was none.
    pub fn revoke(&mut self, role: &RoleId, at: DateTime<Utc>) -> bool {
        let mut changed = false;
        for record in self
            .records
            .iter_mut()
            .filter(|a| &a.role == role && a.is_active(at))
        {
            record.revoked_at = Some(at);
            changed = true;
        }
        changed
    }

    /// Revoke the assignment provisioned by `request_id`, if it is still linked
    /// to that request and not yet revoked.
    pub fn revoke_linked(&mut self, request_id: &RequestId, at: DateTime<Utc>) -> Option<RoleId> {
        let record = self
            .records
            .iter_mut()
            .find(|a| a.request_id.as_ref() == Some(request_id) && a.revoked_at.is_none())?;
        record.revoked_at = Some(at);
        Some(record.role.clone())
    }

    /// Revoke everything active; returns the affected roles in sorted order.
    pub fn revoke_all(&mut self, at: DateTime<Utc>) -> Vec<RoleId> {
        let mut revoked = BTreeSet::new();
        for record in self.records.iter_mut().filter(|a| a.is_active(at)) {
            record.revoked_at = Some(at);
            revoked.insert(record.role.clone());
        }
        revoked.into_iter().collect()
    }

    /// Active assignments whose expiry falls in `(as_of, until]`.
    pub fn expiring_between(
        &self,
        as_of: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> impl Iterator<Item = &RoleAssignment> {
        self.active(as_of)
            .filter(move |a| a.expires_at.is_some_and(|e| e <= until))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(month: u32, day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, month, day, 0, 0, 0).unwrap()
    }

    fn role(id: &'static str) -> RoleId {
        RoleId::new(id)
    }

    #[test]
    fn expiry_is_exclusive_at_the_boundary() {
        let mut set = AssignmentSet::new(PrincipalId::new("jane.smith"));
        set.grant(role("ROLE_FINANCE_MANAGER"), Some(at(2, 1)), AssignmentSource::Manual, None, at(1, 1));

        assert!(set.active_roles(at(1, 31)).contains(&role("ROLE_FINANCE_MANAGER")));
        assert!(set.active_roles(at(2, 1)).is_empty());
        assert!(set.active_roles(at(2, 2)).is_empty());
        assert_eq!(set.history().len(), 1);
    }

    #[test]
    fn regrant_updates_instead_of_duplicating() {
        let mut set = AssignmentSet::new(PrincipalId::new("jane.smith"));
        let r = role("ROLE_HR_VIEWER");
        assert_eq!(
            set.grant(r.clone(), Some(at(2, 1)), AssignmentSource::Manual, None, at(1, 1)),
            AssignmentChange::Created
        );
        assert_eq!(
            set.grant(r.clone(), None, AssignmentSource::DirectorySync, None, at(1, 2)),
            AssignmentChange::Updated {
                previous_expires_at: Some(at(2, 1))
            }
        );

        assert_eq!(set.history().len(), 1);
        assert_eq!(set.history()[0].source, AssignmentSource::DirectorySync);
        assert!(set.active_roles(at(12, 31)).contains(&r));
    }

    #[test]
    fn regrant_after_expiry_starts_a_new_record() {
        let mut set = AssignmentSet::new(PrincipalId::new("jane.smith"));
        let r = role("ROLE_HR_VIEWER");
        set.grant(r.clone(), Some(at(2, 1)), AssignmentSource::Manual, None, at(1, 1));
        set.grant(r.clone(), None, AssignmentSource::Manual, None, at(3, 1));

        assert_eq!(set.history().len(), 2);
        assert_eq!(set.active(at(3, 2)).count(), 1);
    }

    #[test]
    fn revoke_is_soft_and_idempotent() {
        let mut set = AssignmentSet::new(PrincipalId::new("bob.wilson"));
        let r = role("ROLE_ADMIN");
        set.grant(r.clone(), None, AssignmentSource::Manual, None, at(1, 1));

        assert!(set.revoke(&r, at(1, 5)));
        assert!(!set.revoke(&r, at(1, 6)));
        assert!(set.active_roles(at(1, 2)).is_empty());
        assert_eq!(set.history()[0].revoked_at, Some(at(1, 5)));
    }

    #[test]
    fn revoke_linked_only_touches_the_linked_record() {
        let mut set = AssignmentSet::new(PrincipalId::new("bob.wilson"));
        let req = RequestId::from_sequence(3);
        set.grant(role("ROLE_A"), None, AssignmentSource::Manual, None, at(1, 1));
        set.grant(
            role("ROLE_B"),
            Some(at(2, 1)),
            AssignmentSource::RequestWorkflow,
            Some(req.clone()),
            at(1, 1),
        );

        assert_eq!(set.revoke_linked(&req, at(2, 2)), Some(role("ROLE_B")));
        assert_eq!(set.revoke_linked(&req, at(2, 3)), None);
        assert_eq!(set.active_roles(at(2, 2)), BTreeSet::from([role("ROLE_A")]));
    }

    #[test]
    fn revoke_all_and_expiring_window() {
        let mut set = AssignmentSet::new(PrincipalId::new("bob.wilson"));
        set.grant(role("ROLE_A"), Some(at(1, 10)), AssignmentSource::Manual, None, at(1, 1));
        set.grant(role("ROLE_B"), Some(at(3, 1)), AssignmentSource::Manual, None, at(1, 1));
        set.grant(role("ROLE_C"), None, AssignmentSource::Manual, None, at(1, 1));

        assert_eq!(set.expiring_between(at(1, 1), at(1, 31)).count(), 1);

        let revoked = set.revoke_all(at(1, 2));
        assert_eq!(revoked, vec![role("ROLE_A"), role("ROLE_B"), role("ROLE_C")]);
        assert!(set.active_roles(at(1, 2)).is_empty());
    }
}
