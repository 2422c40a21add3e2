use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use accessgate_core::{DomainError, DomainResult, PermissionId};

/// Lifecycle status of a catalog permission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionStatus {
    #[default]
    Active,
    /// Still resolvable through existing role references, but can no longer
    /// be added to a role.
    Deprecated,
}

/// A catalog permission (e.g. `SYSTEM_CONFIG`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permission {
    pub id: PermissionId,
    pub name: String,
    pub category: String,
    pub description: Option<String>,
    pub status: PermissionStatus,
    pub created_at: DateTime<Utc>,
}

/// Input for creating a permission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPermission {
    pub id: PermissionId,
    pub name: String,
    pub category: String,
    #[serde(default)]
    pub description: Option<String>,
}

impl NewPermission {
    pub fn new(
        id: impl Into<PermissionId>,
        name: impl Into<String>,
        category: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            category: category.into(),
            description: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn validate(&self) -> DomainResult<()> {
        self.id.validate()?;
        if self.name.trim().is_empty() {
            return Err(DomainError::validation("permission name cannot be empty"));
        }
        if self.category.trim().is_empty() {
            return Err(DomainError::validation("permission category cannot be empty"));
        }
        Ok(())
    }
}

impl Permission {
    pub fn create(new: NewPermission, at: DateTime<Utc>) -> DomainResult<Self> {
        new.validate()?;
        Ok(Self {
            id: new.id,
            name: new.name.trim().to_string(),
            category: new.category.trim().to_string(),
            description: new.description.filter(|d| !d.trim().is_empty()),
            status: PermissionStatus::Active,
            created_at: at,
        })
    }

    pub fn is_active(&self) -> bool {
        self.status == PermissionStatus::Active
    }

    pub fn deprecate(&mut self) -> DomainResult<()> {
        if self.status == PermissionStatus::Deprecated {
            return Err(DomainError::conflict(format!(
                "permission {} is already deprecated",
                self.id
            )));
        }
        self.status = PermissionStatus::Deprecated;
        Ok(())
    }
}

/// Permission identifiers the engine and the HTTP surface refer to directly.
pub mod well_known {
    use accessgate_core::PermissionId;

    pub const USER_READ: PermissionId = PermissionId::from_static("USER_READ");
    pub const USER_CREATE: PermissionId = PermissionId::from_static("USER_CREATE");
    pub const USER_UPDATE: PermissionId = PermissionId::from_static("USER_UPDATE");
    pub const USER_DELETE: PermissionId = PermissionId::from_static("USER_DELETE");
    pub const ROLE_READ: PermissionId = PermissionId::from_static("ROLE_READ");
    pub const ROLE_CREATE: PermissionId = PermissionId::from_static("ROLE_CREATE");
    pub const ROLE_UPDATE: PermissionId = PermissionId::from_static("ROLE_UPDATE");
    pub const ROLE_DELETE: PermissionId = PermissionId::from_static("ROLE_DELETE");
    pub const ROLE_ASSIGN: PermissionId = PermissionId::from_static("ROLE_ASSIGN");
    pub const PERMISSION_READ: PermissionId = PermissionId::from_static("PERMISSION_READ");
    pub const PERMISSION_CREATE: PermissionId = PermissionId::from_static("PERMISSION_CREATE");
    pub const PERMISSION_UPDATE: PermissionId = PermissionId::from_static("PERMISSION_UPDATE");
    pub const PERMISSION_DELETE: PermissionId = PermissionId::from_static("PERMISSION_DELETE");
    pub const REQUEST_READ: PermissionId = PermissionId::from_static("REQUEST_READ");
    pub const REQUEST_CREATE: PermissionId = PermissionId::from_static("REQUEST_CREATE");
    pub const REQUEST_APPROVE: PermissionId = PermissionId::from_static("REQUEST_APPROVE");
    pub const AUDIT_READ: PermissionId = PermissionId::from_static("AUDIT_READ");
    pub const REPORT_READ: PermissionId = PermissionId::from_static("REPORT_READ");
    pub const AD_SYNC: PermissionId = PermissionId::from_static("AD_SYNC");
}
