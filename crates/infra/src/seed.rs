//! Default catalog: the permissions, roles and SoD rules a fresh deployment
//! starts with.

use accessgate_auth::{AssignmentSource, NewPermission, NewPrincipal, NewRole, RoleKind};
use accessgate_core::{DomainError, DomainResult, RoleId};

use crate::engine::{AccessEngine, OperationContext};

/// Catalog content to load into an empty engine.
#[derive(Debug, Clone)]
pub struct Catalog {
    pub permissions: Vec<NewPermission>,
    pub roles: Vec<NewRole>,
    pub sod_rules: Vec<(RoleId, RoleId, String)>,
}

const PERMISSIONS: &[(&str, &str, &str, &str)] = &[
    ("USER_READ", "View Users", "User Management", "View user information and details"),
    ("USER_CREATE", "Create Users", "User Management", "Create new user accounts"),
    ("USER_UPDATE", "Update Users", "User Management", "Modify existing user information"),
    ("USER_DELETE", "Delete Users", "User Management", "Remove user accounts from system"),
    ("ROLE_READ", "View Roles", "Role Management", "View role information and assignments"),
    ("ROLE_CREATE", "Create Roles", "Role Management", "Create new roles in the system"),
    ("ROLE_UPDATE", "Update Roles", "Role Management", "Modify existing role definitions"),
    ("ROLE_DELETE", "Delete Roles", "Role Management", "Remove roles from the system"),
    ("ROLE_ASSIGN", "Assign Roles", "Role Management", "Assign roles to users"),
    ("PERMISSION_READ", "View Permissions", "Permission Management", "View permission definitions"),
    ("PERMISSION_CREATE", "Create Permissions", "Permission Management", "Create new permissions"),
    ("PERMISSION_UPDATE", "Update Permissions", "Permission Management", "Modify permission definitions"),
    ("PERMISSION_DELETE", "Delete Permissions", "Permission Management", "Remove permissions"),
    ("PERMISSION_ASSIGN", "Assign Permissions", "Permission Management", "Assign permissions to roles/users"),
    ("REQUEST_READ", "View Requests", "Access Requests", "View access requests"),
    ("REQUEST_CREATE", "Create Requests", "Access Requests", "Submit access requests"),
    ("REQUEST_APPROVE", "Approve Requests", "Access Requests", "Approve or reject access requests"),
    ("REQUEST_DELETE", "Delete Requests", "Access Requests", "Remove access requests"),
    ("AUDIT_READ", "View Audit Logs", "Audit & Compliance", "Access audit log information"),
    ("AUDIT_EXPORT", "Export Audit Logs", "Audit & Compliance", "Export audit logs for compliance"),
    ("REPORT_READ", "View Reports", "Audit & Compliance", "Access compliance reports"),
    ("REPORT_GENERATE", "Generate Reports", "Audit & Compliance", "Create compliance reports"),
    ("SYSTEM_CONFIG", "System Configuration", "System Administration", "Modify system settings"),
    ("SYSTEM_BACKUP", "System Backup", "System Administration", "Perform system backups"),
    ("SYSTEM_RESTORE", "System Restore", "System Administration", "Restore system from backup"),
    ("AD_SYNC", "AD Synchronization", "System Administration", "Sync with Active Directory"),
    ("FINANCE_READ", "View Financial Data", "Finance", "Access financial information"),
    ("FINANCE_APPROVE", "Approve Expenses", "Finance", "Approve financial transactions"),
    ("FINANCE_REPORT", "Financial Reports", "Finance", "Generate financial reports"),
    ("HR_READ", "View HR Data", "HR", "Access HR information"),
    ("HR_UPDATE", "Update HR Data", "HR", "Modify employee information"),
    ("HR_PAYROLL", "Payroll Access", "HR", "Access payroll information"),
];

/// Every permission outside the Finance and HR business categories.
fn administrative_permissions() -> Vec<&'static str> {
    PERMISSIONS
        .iter()
        .filter(|(_, _, category, _)| !matches!(*category, "Finance" | "HR"))
        .map(|(id, ..)| *id)
        .collect()
}

pub fn default_catalog() -> Catalog {
    let permissions = PERMISSIONS
        .iter()
        .map(|(id, name, category, description)| {
            NewPermission::new(*id, *name, *category).with_description(*description)
        })
        .collect();

    let roles = vec![
        NewRole::new("ROLE_ADMIN", "System Administrator")
            .description("Full system access and control")
            .permissions(administrative_permissions()),
        NewRole::new("ROLE_MANAGER", "Manager")
            .kind(RoleKind::Organizational)
            .description("Team and access request management")
            .permissions([
                "USER_READ",
                "ROLE_READ",
                "PERMISSION_READ",
                "REQUEST_READ",
                "REQUEST_CREATE",
                "REQUEST_APPROVE",
                "AUDIT_READ",
                "REPORT_READ",
            ]),
        NewRole::new("ROLE_HR_MANAGER", "HR Manager")
            .description("HR data and employee management")
            .permissions([
                "HR_READ",
                "HR_UPDATE",
                "HR_PAYROLL",
                "USER_READ",
                "USER_UPDATE",
                "REQUEST_READ",
                "REQUEST_CREATE",
                "REPORT_READ",
            ]),
        NewRole::new("ROLE_FINANCE_MANAGER", "Finance Manager")
            .description("Financial data and approval access")
            .permissions([
                "FINANCE_READ",
                "FINANCE_APPROVE",
                "FINANCE_REPORT",
                "REQUEST_READ",
                "REQUEST_CREATE",
                "REPORT_READ",
            ]),
        NewRole::new("ROLE_HR_VIEWER", "HR Viewer")
            .description("Read-only access to HR data")
            .permissions(["HR_READ", "USER_READ", "REQUEST_CREATE"]),
        NewRole::new("ROLE_USER", "Standard User")
            .description("Basic system access")
            .permissions([
                "USER_READ",
                "ROLE_READ",
                "PERMISSION_READ",
                "REQUEST_READ",
                "REQUEST_CREATE",
            ]),
    ];

    let sod_rules = vec![(
        RoleId::new("ROLE_FINANCE_MANAGER"),
        RoleId::new("ROLE_HR_MANAGER"),
        "Payroll administration and expense approval must be held by different people".to_string(),
    )];

    Catalog {
        permissions,
        roles,
        sod_rules,
    }
}

/// Load `catalog` into `engine`. Entries that already exist are left alone,
/// so this can run on every start.
pub fn apply_catalog(engine: &AccessEngine, ctx: &OperationContext, catalog: Catalog) -> DomainResult<()> {
    let mut created = 0;
    for permission in catalog.permissions {
        if absent(engine.permission(&permission.id))? {
            engine.create_permission(ctx, permission)?;
            created += 1;
        }
    }
    for role in catalog.roles {
        if absent(engine.role(&role.id))? {
            engine.create_role(ctx, role)?;
            created += 1;
        }
    }
    let rules = engine.sod_rules()?;
    for (role_a, role_b, description) in catalog.sod_rules {
        if !rules.iter().any(|r| r.covers(&role_a, &role_b)) {
            engine.add_sod_rule(ctx, role_a, role_b, description)?;
            created += 1;
        }
    }
    tracing::info!(created, "catalog applied");
    Ok(())
}

/// Make sure `admin` exists and holds `ROLE_ADMIN`.
pub fn bootstrap_admin(engine: &AccessEngine, ctx: &OperationContext, admin: NewPrincipal) -> DomainResult<()> {
    let id = admin.id.clone();
    if absent(engine.principal(&id))? {
        engine.create_principal(ctx, admin)?;
    }
    engine.assign(ctx, &id, &RoleId::new("ROLE_ADMIN"), None, AssignmentSource::Manual)?;
    Ok(())
}

fn absent<T>(lookup: DomainResult<T>) -> DomainResult<bool> {
    match lookup {
        Ok(_) => Ok(false),
        Err(DomainError::NotFound { .. }) => Ok(true),
        Err(err) => Err(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn every_role_permission_is_in_the_catalog() {
        let catalog = default_catalog();
        let known: HashSet<_> = catalog.permissions.iter().map(|p| p.id.clone()).collect();

        for role in &catalog.roles {
            for permission in &role.permissions {
                assert!(known.contains(permission), "{} references {}", role.id, permission);
            }
        }
    }

    #[test]
    fn applying_twice_changes_nothing() {
        let (engine, _) = crate::engine::tests::engine();
        let ctx = OperationContext::system();
        apply_catalog(&engine, &ctx, default_catalog()).unwrap();
        apply_catalog(&engine, &ctx, default_catalog()).unwrap();
        bootstrap_admin(&engine, &ctx, NewPrincipal::new("admin", "Admin")).unwrap();
        bootstrap_admin(&engine, &ctx, NewPrincipal::new("admin", "Admin")).unwrap();

        assert_eq!(engine.permissions().unwrap().len(), 32);
        assert_eq!(engine.roles().unwrap().len(), 6);
        assert_eq!(engine.sod_rules().unwrap().len(), 1);
        assert_eq!(engine.assignments_for(&"admin".into()).unwrap().len(), 1);
    }

    #[test]
    fn admin_covers_administration_but_not_business_data() {
        let catalog = default_catalog();
        let admin = catalog.roles.iter().find(|r| r.id.as_str() == "ROLE_ADMIN").unwrap();
        assert_eq!(admin.permissions.len(), 26);
        assert!(admin.permissions.iter().any(|p| p.as_str() == "SYSTEM_CONFIG"));
        assert!(!admin.permissions.iter().any(|p| p.as_str() == "HR_PAYROLL"));
    }
}
