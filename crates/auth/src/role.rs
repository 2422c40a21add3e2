//! Roles: named, ordered bundles of catalog permissions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use accessgate_core::{DomainError, DomainResult, PermissionId, RoleId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoleKind {
    /// Job-function bundle (`ROLE_FINANCE_MANAGER`).
    #[default]
    Functional,
    /// Tied to the org chart (department membership).
    Organizational,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoleStatus {
    #[default]
    Active,
    /// No new assignments; existing ones stay until revoked or expired.
    Retired,
}

/// A role in the role store.
///
/// # Invariants
/// - `permissions` never contains duplicates; order is first-insertion order.
/// - A retired role is never modified again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub id: RoleId,
    pub name: String,
    pub kind: RoleKind,
    pub status: RoleStatus,
    pub description: Option<String>,
    permissions: Vec<PermissionId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for creating a role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewRole {
    pub id: RoleId,
    pub name: String,
    #[serde(default)]
    pub kind: RoleKind,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub permissions: Vec<PermissionId>,
}

impl NewRole {
    pub fn new(id: impl Into<RoleId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind: RoleKind::Functional,
            description: None,
            permissions: Vec::new(),
        }
    }

    pub fn kind(mut self, kind: RoleKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn permissions<I, P>(mut self, permissions: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PermissionId>,
    {
        self.permissions = permissions.into_iter().map(Into::into).collect();
        self
    }
}

/// Permission delta applied to an existing role.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleUpdate {
    #[serde(default)]
    pub add: Vec<PermissionId>,
    #[serde(default)]
    pub remove: Vec<PermissionId>,
}

impl RoleUpdate {
    pub fn is_empty(&self) -> bool {
        self.add.is_empty() && self.remove.is_empty()
    }
}

/// What actually changed on a role (for audit details).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionDiff {
    pub before: Vec<PermissionId>,
    pub after: Vec<PermissionId>,
    pub added: Vec<PermissionId>,
    pub removed: Vec<PermissionId>,
}

impl PermissionDiff {
    pub fn is_noop(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

impl Role {
    pub fn create(new: NewRole, at: DateTime<Utc>) -> DomainResult<Self> {
        new.id.validate()?;
        if new.name.trim().is_empty() {
            return Err(DomainError::validation("role name cannot be empty"));
        }
        for permission in &new.permissions {
            permission.validate()?;
        }

        let mut role = Self {
            id: new.id,
            name: new.name.trim().to_string(),
            kind: new.kind,
            status: RoleStatus::Active,
            description: new.description.filter(|d| !d.trim().is_empty()),
            permissions: Vec::with_capacity(new.permissions.len()),
            created_at: at,
            updated_at: at,
        };
        for permission in new.permissions {
            role.grant(permission);
        }
        Ok(role)
    }

    pub fn is_active(&self) -> bool {
        self.status == RoleStatus::Active
    }

    /// Granted permissions in insertion order.
    pub fn permissions(&self) -> &[PermissionId] {
        &self.permissions
    }

    pub fn grants(&self, permission: &PermissionId) -> bool {
        self.permissions.contains(permission)
    }

    /// Add a permission; returns `false` when it was already granted.
    pub fn grant(&mut self, permission: PermissionId) -> bool {
        if self.grants(&permission) {
            return false;
        }
        self.permissions.push(permission);
        true
    }

    /// Remove a permission; returns `false` when the role did not hold it.
    pub fn revoke(&mut self, permission: &PermissionId) -> bool {
        let before = self.permissions.len();
        self.permissions.retain(|p| p != permission);
        self.permissions.len() != before
    }

    /// Apply `update` (removals first, then additions).
    ///
    /// The caller is responsible for checking that every added permission
    /// exists and is active in the catalog.
    pub fn apply_update(&mut self, update: &RoleUpdate, at: DateTime<Utc>) -> DomainResult<PermissionDiff> {
        self.ensure_active()?;

        let before = self.permissions.clone();
        let mut diff = PermissionDiff {
            before,
            ..Default::default()
        };

        for permission in &update.remove {
            if self.revoke(permission) {
                diff.removed.push(permission.clone());
            }
        }
        for permission in &update.add {
            permission.validate()?;
            if self.grant(permission.clone()) {
                diff.added.push(permission.clone());
            }
        }

        diff.after = self.permissions.clone();
        if !diff.is_noop() {
            self.updated_at = at;
        }
        Ok(diff)
    }

    pub fn retire(&mut self, at: DateTime<Utc>) -> DomainResult<()> {
        self.ensure_active()?;
        self.status = RoleStatus::Retired;
        self.updated_at = at;
        Ok(())
    }

    pub fn ensure_active(&self) -> DomainResult<()> {
        if self.status == RoleStatus::Retired {
            return Err(DomainError::conflict(format!("role {} is retired", self.id)));
        }
        Ok(())
    }
}
