use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::Serialize;

use accessgate_core::{PermissionId, PrincipalId, RoleId};

use crate::{Permission, PermissionStatus, Principal, PrincipalStatus, Role};

/// Union of the permissions granted by every role in `active`.
///
/// - No IO
/// - No panics
/// - Deterministic (sorted, deduplicated)
///
/// Roles in `roles` that are not in `active` are ignored; so are ids in
/// `active` with no matching role.
pub fn effective_permissions<'a, I>(active: &BTreeSet<RoleId>, roles: I) -> BTreeSet<PermissionId>
where
    I: IntoIterator<Item = &'a Role>,
{
    roles
        .into_iter()
        .filter(|role| active.contains(&role.id))
        .flat_map(|role| role.permissions().iter().cloned())
        .collect()
}

// ─────────────────────────────────────────────────────────────────────────────
// Authorization Explanation (Audit Trail)
// ─────────────────────────────────────────────────────────────────────────────

/// Detailed explanation of an authorization decision.
///
/// This structure provides transparent, debuggable information about why
/// a check was allowed or denied.
#[derive(Debug, Clone, Serialize)]
pub struct AuthorizationExplanation {
    /// The permission that was being checked.
    pub required_permission: PermissionId,

    /// Whether the authorization was granted.
    pub granted: bool,

    /// Human-readable reason for the decision.
    pub reason: String,

    pub as_of: DateTime<Utc>,

    /// Details about the principal's state.
    pub principal: PrincipalState,

    /// Active roles that carry the permission (empty on denial).
    pub granting_roles: Vec<RoleId>,

    /// If denied, this explains what was missing.
    pub denial_reason: Option<DenialReason>,
}

/// State of the principal being checked, as of the evaluation instant.
#[derive(Debug, Clone, Serialize)]
pub struct PrincipalState {
    pub principal_id: PrincipalId,
    /// `None` when the principal is not in the directory.
    pub status: Option<PrincipalStatus>,
    pub active_roles: Vec<RoleId>,
    pub effective_permissions: Vec<PermissionId>,
}

/// Detailed reason why authorization was denied.
#[derive(Debug, Clone, Serialize)]
pub struct DenialReason {
    pub kind: DenialKind,
    pub message: String,
    pub suggestions: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DenialKind {
    UnknownPrincipal,
    UnknownPermission,
    NoActiveRoles,
    MissingPermission,
}

/// Everything [`explain`] needs, resolved by the caller.
#[derive(Debug, Clone, Copy)]
pub struct ExplainInput<'a> {
    pub principal_id: &'a PrincipalId,
    pub principal: Option<&'a Principal>,
    pub permission_id: &'a PermissionId,
    pub permission: Option<&'a Permission>,
    pub active_roles: &'a BTreeSet<RoleId>,
    /// The whole role store (used to find roles that would grant the permission).
    pub roles: &'a [Role],
    pub as_of: DateTime<Utc>,
}

/// Explain why an authorization decision was made (or would be made).
///
/// The decision is exactly the one `authorize` takes: granted iff some
/// active role carries the permission. Principal status only shows up in the
/// explanation text.
pub fn explain(input: ExplainInput<'_>) -> AuthorizationExplanation {
    let required = input.permission_id;
    let effective = effective_permissions(input.active_roles, input.roles);

    let granting_roles: Vec<RoleId> = input
        .roles
        .iter()
        .filter(|role| input.active_roles.contains(&role.id) && role.grants(required))
        .map(|role| role.id.clone())
        .collect();

    let principal = PrincipalState {
        principal_id: input.principal_id.clone(),
        status: input.principal.map(|p| p.status),
        active_roles: input.active_roles.iter().cloned().collect(),
        effective_permissions: effective.iter().cloned().collect(),
    };

    if effective.contains(required) {
        let mut reason = format!(
            "Principal '{}' holds '{}' through role(s) {}",
            input.principal_id,
            required,
            join(&granting_roles)
        );
        if input.permission.is_some_and(|p| p.status == PermissionStatus::Deprecated) {
            reason.push_str(" (permission is deprecated)");
        }
        if let Some(status) = input.principal.map(|p| p.status).filter(|s| *s != PrincipalStatus::Active) {
            reason.push_str(&format!(" (principal is {status})"));
        }

        return AuthorizationExplanation {
            required_permission: required.clone(),
            granted: true,
            reason,
            as_of: input.as_of,
            principal,
            granting_roles,
            denial_reason: None,
        };
    }

    let denial = if input.principal.is_none() {
        DenialReason {
            kind: DenialKind::UnknownPrincipal,
            message: format!("Principal '{}' is not in the directory", input.principal_id),
            suggestions: vec![
                "Create the principal or run a directory sync".to_string(),
            ],
        }
    } else if input.permission.is_none() {
        DenialReason {
            kind: DenialKind::UnknownPermission,
            message: format!("Permission '{required}' is not in the catalog"),
            suggestions: vec!["Check the permission identifier for typos".to_string()],
        }
    } else {
        // Roles that would grant this permission if requested.
        let candidates: Vec<RoleId> = input
            .roles
            .iter()
            .filter(|role| role.is_active() && role.grants(required))
            .map(|role| role.id.clone())
            .collect();

        let mut suggestions = Vec::new();
        if candidates.is_empty() {
            suggestions.push(format!(
                "No active role grants '{required}'; add it to a role first"
            ));
        } else {
            suggestions.push(format!(
                "Submit an access request for one of: {}",
                join(&candidates)
            ));
        }

        if input.active_roles.is_empty() {
            DenialReason {
                kind: DenialKind::NoActiveRoles,
                message: format!(
                    "Principal '{}' has no active role assignments",
                    input.principal_id
                ),
                suggestions,
            }
        } else {
            DenialReason {
                kind: DenialKind::MissingPermission,
                message: format!("Missing required permission: '{required}'"),
                suggestions,
            }
        }
    };

    AuthorizationExplanation {
        required_permission: required.clone(),
        granted: false,
        reason: format!(
            "Principal '{}' does not hold '{}'. Current permissions: [{}]",
            input.principal_id,
            required,
            join(&principal.effective_permissions)
        ),
        as_of: input.as_of,
        principal,
        granting_roles,
        denial_reason: Some(denial),
    }
}

fn join<T: core::fmt::Display>(items: &[T]) -> String {
    items
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
