//! Permission catalog, role store and SoD rule administration.

use std::collections::BTreeMap;

use serde_json::json;

use accessgate_auth::{
    NewPermission, NewRole, Permission, PermissionDiff, Role, RoleUpdate, SodRule,
};
use accessgate_core::{DomainError, DomainResult, PermissionId, RoleId};

use super::{AccessEngine, OperationContext, ids};
use crate::audit::{AuditCategory, AuditOutcome};

impl AccessEngine {
    // ─────────────────────────────────────────────────────────────────────────
    // Permissions
    // ─────────────────────────────────────────────────────────────────────────

    pub fn create_permission(
        &self,
        ctx: &OperationContext,
        new: NewPermission,
    ) -> DomainResult<Permission> {
        let permission = Permission::create(new, self.now())?;

        self.with_catalog_lock(|| {
            let inserted = self
                .stores
                .permissions
                .insert_new(permission.id.clone(), permission.clone())?;
            if !inserted {
                return Err(DomainError::conflict(format!(
                    "permission {} already exists",
                    permission.id
                )));
            }

            tracing::info!(permission = %permission.id, category = %permission.category, "permission created");
            self.audit(
                ctx,
                AuditCategory::PermissionChange,
                "create_permission",
                AuditOutcome::Success,
                &permission.id,
                json!({
                    "name": permission.name,
                    "category": permission.category,
                    "before": [],
                    "after": [permission.id],
                    "added": [permission.id],
                    "removed": [],
                }),
            );
            Ok(permission)
        })
    }

    /// Mark a permission deprecated. Roles that already carry it keep it;
    /// it can no longer be added to a role.
    pub fn retire_permission(
        &self,
        ctx: &OperationContext,
        id: &PermissionId,
    ) -> DomainResult<Permission> {
        self.with_catalog_lock(|| {
            let mut permission = self.load_permission(id)?;
            permission.deprecate()?;
            self.stores.permissions.upsert(id.clone(), permission.clone())?;

            tracing::info!(permission = %id, "permission deprecated");
            self.audit(
                ctx,
                AuditCategory::PermissionChange,
                "retire_permission",
                AuditOutcome::Success,
                id,
                json!({
                    "before": [id],
                    "after": [],
                    "added": [],
                    "removed": [id],
                }),
            );
            Ok(permission)
        })
    }

    pub fn permission(&self, id: &PermissionId) -> DomainResult<Permission> {
        self.load_permission(id)
    }

    /// Every permission, ordered by id.
    pub fn permissions(&self) -> DomainResult<Vec<Permission>> {
        Ok(self.stores.permissions.list()?)
    }

    pub fn permissions_by_category(&self) -> DomainResult<BTreeMap<String, Vec<Permission>>> {
        let mut grouped: BTreeMap<String, Vec<Permission>> = BTreeMap::new();
        for permission in self.permissions()? {
            grouped
                .entry(permission.category.clone())
                .or_default()
                .push(permission);
        }
        Ok(grouped)
    }

    /// Permissions named for a role must exist and still be active.
    fn ensure_grantable(&self, permissions: &[PermissionId]) -> DomainResult<()> {
        for id in permissions {
            let permission = self.load_permission(id)?;
            if !permission.is_active() {
                return Err(DomainError::conflict(format!(
                    "permission {id} is deprecated and cannot be granted"
                )));
            }
        }
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Roles
    // ─────────────────────────────────────────────────────────────────────────

    pub fn create_role(&self, ctx: &OperationContext, new: NewRole) -> DomainResult<Role> {
        let role = Role::create(new, self.now())?;

        self.with_catalog_lock(|| {
            self.ensure_grantable(role.permissions())?;

            let inserted = self.stores.roles.insert_new(role.id.clone(), role.clone())?;
            if !inserted {
                return Err(DomainError::conflict(format!("role {} already exists", role.id)));
            }

            tracing::info!(role = %role.id, permissions = role.permissions().len(), "role created");
            self.audit(
                ctx,
                AuditCategory::RoleChange,
                "create_role",
                AuditOutcome::Success,
                &role.id,
                json!({
                    "name": role.name,
                    "kind": role.kind,
                    "before": [],
                    "after": ids(role.permissions()),
                    "added": ids(role.permissions()),
                    "removed": [],
                }),
            );
            Ok(role)
        })
    }

    /// Add and remove permissions on a role. Removals apply first.
    pub fn update_role(
        &self,
        ctx: &OperationContext,
        id: &RoleId,
        update: RoleUpdate,
    ) -> DomainResult<(Role, PermissionDiff)> {
        self.with_catalog_lock(|| {
            let mut role = self.load_role(id)?;
            role.ensure_active()?;
            self.ensure_grantable(&update.add)?;

            let diff = role.apply_update(&update, self.now())?;
            if !diff.is_noop() {
                self.stores.roles.upsert(id.clone(), role.clone())?;
            }

            tracing::info!(
                role = %id,
                added = diff.added.len(),
                removed = diff.removed.len(),
                "role permissions updated"
            );
            self.audit(
                ctx,
                AuditCategory::RoleChange,
                "update_role",
                AuditOutcome::Success,
                id,
                json!({
                    "before": ids(&diff.before),
                    "after": ids(&diff.after),
                    "added": ids(&diff.added),
                    "removed": ids(&diff.removed),
                }),
            );
            Ok((role, diff))
        })
    }

    /// Retire a role. Existing assignments keep granting its permissions until
    /// they are revoked or expire; the role cannot be assigned or requested again.
    pub fn retire_role(&self, ctx: &OperationContext, id: &RoleId) -> DomainResult<Role> {
        self.with_catalog_lock(|| {
            let mut role = self.load_role(id)?;
            role.retire(self.now())?;
            self.stores.roles.upsert(id.clone(), role.clone())?;

            tracing::info!(role = %id, "role retired");
            self.audit(
                ctx,
                AuditCategory::RoleChange,
                "retire_role",
                AuditOutcome::Success,
                id,
                json!({
                    "before": ids(role.permissions()),
                    "after": ids(role.permissions()),
                    "added": [],
                    "removed": [],
                    "status": role.status,
                }),
            );
            Ok(role)
        })
    }

    pub fn role(&self, id: &RoleId) -> DomainResult<Role> {
        self.load_role(id)
    }

    /// Every role, ordered by id.
    pub fn roles(&self) -> DomainResult<Vec<Role>> {
        Ok(self.stores.roles.list()?)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // SoD rules
    // ─────────────────────────────────────────────────────────────────────────

    /// Declare two roles mutually exclusive. Rules are numbered in declaration
    /// order, which is also the order `check_conflict` evaluates them in.
    pub fn add_sod_rule(
        &self,
        ctx: &OperationContext,
        role_a: RoleId,
        role_b: RoleId,
        description: impl Into<String>,
    ) -> DomainResult<SodRule> {
        let description = description.into();

        self.with_catalog_lock(|| {
            self.load_role(&role_a)?;
            self.load_role(&role_b)?;

            let existing = self.load_sod_rules()?;
            if existing.iter().any(|r| r.covers(&role_a, &role_b)) {
                return Err(DomainError::conflict(format!(
                    "an SoD rule for {role_a} and {role_b} already exists"
                )));
            }

            let next_id = existing.iter().map(|r| r.id).max().unwrap_or(0) + 1;
            let rule = SodRule::new(next_id, role_a, role_b, description, self.now())?;
            if !self.stores.sod_rules.insert_new(rule.id, rule.clone())? {
                return Err(DomainError::conflict(format!("SoD rule {} already exists", rule.id)));
            }

            tracing::info!(rule_id = rule.id, role_a = %rule.roles.0, role_b = %rule.roles.1, "SoD rule added");
            self.audit(
                ctx,
                AuditCategory::RoleChange,
                "add_sod_rule",
                AuditOutcome::Success,
                format!("sod-rule-{}", rule.id),
                json!({
                    "rule_id": rule.id,
                    "roles": [rule.roles.0, rule.roles.1],
                    "description": rule.description,
                }),
            );
            Ok(rule)
        })
    }

    /// Every SoD rule in declaration order.
    pub fn sod_rules(&self) -> DomainResult<Vec<SodRule>> {
        self.load_sod_rules()
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::{admin, engine};
    use accessgate_auth::{NewPermission, NewRole, PermissionStatus, RoleUpdate};
    use accessgate_core::{DomainError, PermissionId, RoleId};

    #[test]
    fn duplicate_permission_is_a_conflict() {
        let (engine, _) = engine();
        let ctx = admin();
        engine
            .create_permission(&ctx, NewPermission::new("SYSTEM_CONFIG", "System Configuration", "System Administration"))
            .unwrap();

        let err = engine
            .create_permission(&ctx, NewPermission::new("SYSTEM_CONFIG", "Again", "System Administration"))
            .unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));

        let err = engine
            .create_permission(&ctx, NewPermission::new("system_config", "Lower", "System Administration"))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn deprecated_permission_cannot_be_added_to_a_role() {
        let (engine, _) = engine();
        let ctx = admin();
        engine
            .create_permission(&ctx, NewPermission::new("AD_SYNC", "AD Synchronization", "System Administration"))
            .unwrap();
        let retired = engine.retire_permission(&ctx, &PermissionId::new("AD_SYNC")).unwrap();
        assert_eq!(retired.status, PermissionStatus::Deprecated);

        let err = engine
            .create_role(&ctx, NewRole::new("ROLE_SYNC", "Sync").permissions(["AD_SYNC"]))
            .unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));

        let err = engine
            .create_role(&ctx, NewRole::new("ROLE_SYNC", "Sync").permissions(["UNKNOWN"]))
            .unwrap_err();
        assert!(matches!(err, DomainError::NotFound { kind: "permission", .. }));
    }

    #[test]
    fn retired_role_rejects_updates() {
        let (engine, _) = engine();
        let ctx = admin();
        engine
            .create_permission(&ctx, NewPermission::new("HR_READ", "View HR Data", "HR"))
            .unwrap();
        engine.create_role(&ctx, NewRole::new("ROLE_HR_VIEWER", "HR Viewer")).unwrap();
        engine.retire_role(&ctx, &RoleId::new("ROLE_HR_VIEWER")).unwrap();

        let err = engine
            .update_role(
                &ctx,
                &RoleId::new("ROLE_HR_VIEWER"),
                RoleUpdate {
                    add: vec![PermissionId::new("HR_READ")],
                    remove: vec![],
                },
            )
            .unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));
        assert!(matches!(
            engine.retire_role(&ctx, &RoleId::new("ROLE_HR_VIEWER")),
            Err(DomainError::Conflict(_))
        ));
    }

    #[test]
    fn sod_rules_are_numbered_and_deduplicated() {
        let (engine, _) = engine();
        let ctx = admin();
        engine.create_role(&ctx, NewRole::new("ROLE_A", "A")).unwrap();
        engine.create_role(&ctx, NewRole::new("ROLE_B", "B")).unwrap();
        engine.create_role(&ctx, NewRole::new("ROLE_C", "C")).unwrap();

        let first = engine.add_sod_rule(&ctx, "ROLE_A".into(), "ROLE_B".into(), "A/B").unwrap();
        let second = engine.add_sod_rule(&ctx, "ROLE_C".into(), "ROLE_A".into(), "C/A").unwrap();
        assert_eq!((first.id, second.id), (1, 2));

        let dup = engine.add_sod_rule(&ctx, "ROLE_B".into(), "ROLE_A".into(), "again");
        assert!(matches!(dup, Err(DomainError::Conflict(_))));
        let same = engine.add_sod_rule(&ctx, "ROLE_A".into(), "ROLE_A".into(), "self");
        assert!(matches!(same, Err(DomainError::Validation(_))));
        let unknown = engine.add_sod_rule(&ctx, "ROLE_A".into(), "ROLE_Z".into(), "?");
        assert!(matches!(unknown, Err(DomainError::NotFound { kind: "role", .. })));

        let ids: Vec<u64> = engine.sod_rules().unwrap().iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn permissions_group_by_category() {
        let (engine, _) = engine();
        let ctx = admin();
        engine.create_permission(&ctx, NewPermission::new("HR_READ", "View HR Data", "HR")).unwrap();
        engine.create_permission(&ctx, NewPermission::new("HR_UPDATE", "Update HR Data", "HR")).unwrap();
        engine
            .create_permission(&ctx, NewPermission::new("FINANCE_READ", "View Financial Data", "Finance"))
            .unwrap();

        let grouped = engine.permissions_by_category().unwrap();
        assert_eq!(grouped.keys().cloned().collect::<Vec<_>>(), vec!["Finance", "HR"]);
        assert_eq!(grouped["HR"].len(), 2);
    }
}
