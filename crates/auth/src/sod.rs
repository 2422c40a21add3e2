//! Segregation-of-duties: mutually exclusive role pairs.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use accessgate_core::{DomainError, DomainResult, RoleId};

/// A pair of roles that one principal must never hold together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SodRule {
    /// Declaration sequence; rules are evaluated in ascending id order.
    pub id: u64,
    pub roles: (RoleId, RoleId),
    pub description: String,
    pub created_at: DateTime<Utc>,
}

impl SodRule {
    pub fn new(
        id: u64,
        role_a: RoleId,
        role_b: RoleId,
        description: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> DomainResult<Self> {
        if role_a == role_b {
            return Err(DomainError::validation(format!(
                "SoD rule must name two distinct roles (got {role_a} twice)"
            )));
        }
        Ok(Self {
            id,
            roles: (role_a, role_b),
            description: description.into(),
            created_at,
        })
    }

    /// Unordered pair equality.
    pub fn covers(&self, a: &RoleId, b: &RoleId) -> bool {
        let (x, y) = &self.roles;
        (x == a && y == b) || (x == b && y == a)
    }

    pub fn involves(&self, role: &RoleId) -> bool {
        &self.roles.0 == role || &self.roles.1 == role
    }

    /// The other half of the pair, if `role` is part of it.
    pub fn counterpart(&self, role: &RoleId) -> Option<&RoleId> {
        if &self.roles.0 == role {
            Some(&self.roles.1)
        } else if &self.roles.1 == role {
            Some(&self.roles.0)
        } else {
            None
        }
    }
}

/// A violated rule. `candidate` is the requested role whenever the rule names it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SodViolation {
    pub rule_id: u64,
    pub candidate: RoleId,
    pub conflicting_role: RoleId,
    pub description: String,
}

impl core::fmt::Display for SodViolation {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "role {} conflicts with {} (rule {}: {})",
            self.candidate, self.conflicting_role, self.rule_id, self.description
        )
    }
}

impl From<SodViolation> for DomainError {
    fn from(value: SodViolation) -> Self {
        DomainError::policy(value.to_string())
    }
}

/// Test `active ∪ {candidate}` against `rules` in declaration order and
/// return the first rule whose two roles are both present.
///
/// Pure: no IO, no audit.
pub fn check_conflict(
    rules: &[SodRule],
    active: &BTreeSet<RoleId>,
    candidate: &RoleId,
) -> Option<SodViolation> {
    let holds = |role: &RoleId| role == candidate || active.contains(role);

    rules.iter().find_map(|rule| {
        let (a, b) = &rule.roles;
        if !(holds(a) && holds(b)) {
            return None;
        }
        let (candidate, conflicting_role) = match rule.counterpart(candidate) {
            Some(other) => (candidate.clone(), other.clone()),
            None => (a.clone(), b.clone()),
        };
        Some(SodViolation {
            rule_id: rule.id,
            candidate,
            conflicting_role,
            description: rule.description.clone(),
        })
    })
}
