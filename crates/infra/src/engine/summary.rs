//! Dashboard figures.

use chrono::{DateTime, Utc};
use serde::Serialize;

use accessgate_auth::{PrincipalStatus, RequestStatus, RoleKind};
use accessgate_core::DomainResult;

use super::AccessEngine;
use super::workflow::RequestFilter;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PrincipalCounts {
    pub total: usize,
    pub active: usize,
    pub suspended: usize,
    pub terminated: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RoleCounts {
    pub total: usize,
    pub active: usize,
    pub retired: usize,
    pub functional: usize,
    pub organizational: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RequestCounts {
    pub total: usize,
    pub pending: usize,
    pub approved: usize,
    pub rejected: usize,
    pub provisioned: usize,
    pub expired: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub as_of: DateTime<Utc>,
    pub principals: PrincipalCounts,
    pub roles: RoleCounts,
    pub permissions: usize,
    pub sod_rules: usize,
    pub requests: RequestCounts,
    pub active_assignments: usize,
    /// Active assignments whose expiry falls within the configured window.
    pub expiring_soon: usize,
}

impl AccessEngine {
    /// Counts across the whole engine. Request states reflect lazy expiry at
    /// the current time; assignment figures are evaluated at `as_of`.
    pub fn summary(&self, as_of: DateTime<Utc>) -> DomainResult<Summary> {
        let mut principals = PrincipalCounts::default();
        let mut active_assignments = 0;
        let mut expiring_soon = 0;
        let horizon = as_of
            .checked_add_signed(self.config.expiring_window())
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        for principal in self.principals()? {
            principals.total += 1;
            match principal.status {
                PrincipalStatus::Active => principals.active += 1,
                PrincipalStatus::Suspended => principals.suspended += 1,
                PrincipalStatus::Terminated => principals.terminated += 1,
            }

            let set = self.load_assignments(&principal.id)?;
            active_assignments += set.active(as_of).count();
            expiring_soon += set.expiring_between(as_of, horizon).count();
        }

        let mut roles = RoleCounts::default();
        for role in self.roles()? {
            roles.total += 1;
            if role.is_active() {
                roles.active += 1;
            } else {
                roles.retired += 1;
            }
            match role.kind {
                RoleKind::Functional => roles.functional += 1,
                RoleKind::Organizational => roles.organizational += 1,
            }
        }

        let mut requests = RequestCounts::default();
        for request in self.requests(&RequestFilter::default())? {
            requests.total += 1;
            match request.status {
                RequestStatus::Pending => requests.pending += 1,
                RequestStatus::Approved => requests.approved += 1,
                RequestStatus::Rejected => requests.rejected += 1,
                RequestStatus::Provisioned => requests.provisioned += 1,
                RequestStatus::Expired => requests.expired += 1,
            }
        }

        Ok(Summary {
            as_of,
            principals,
            roles,
            permissions: self.permissions()?.len(),
            sod_rules: self.sod_rules()?.len(),
            requests,
            active_assignments,
            expiring_soon,
        })
    }
}
