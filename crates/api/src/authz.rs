//! API-side authorization guard for administrative routes.
//!
//! The guard asks the engine itself (`authorize`), so every check is audited
//! like any other decision.

use accessgate_core::{PermissionId, PrincipalId};

use crate::app::errors;
use crate::app::services::AppServices;
use crate::context::CallerContext;

/// Fail with 403 unless the caller holds `permission` right now.
pub async fn require(
    services: &AppServices,
    caller: &CallerContext,
    permission: PermissionId,
) -> Result<(), axum::response::Response> {
    let ctx = caller.operation();
    let principal = caller.principal_id().clone();
    let required = permission.clone();
    let granted = services
        .run(move |engine| engine.authorize(&ctx, &principal, &required, engine.now()))
        .await?;

    if granted {
        Ok(())
    } else {
        tracing::debug!(caller = %caller.principal_id(), permission = %permission, "route forbidden");
        Err(errors::forbidden(format!(
            "{} lacks permission {permission}",
            caller.principal_id()
        )))
    }
}

/// Callers may always act on themselves; anyone else needs `permission`.
pub async fn require_self_or(
    services: &AppServices,
    caller: &CallerContext,
    subject: &PrincipalId,
    permission: PermissionId,
) -> Result<(), axum::response::Response> {
    if caller.principal_id() == subject {
        return Ok(());
    }
    require(services, caller, permission).await
}
