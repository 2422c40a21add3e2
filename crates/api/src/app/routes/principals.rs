//! Principal directory, role assignment and directory sync endpoints.

use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use serde_json::json;

use accessgate_auth::{well_known, AssignmentSource, NewPrincipal};
use accessgate_core::{PrincipalId, RoleId};
use accessgate_infra::engine::DirectoryEntry;

use crate::app::dto::{AsOfQuery, AssignRoleRequest, ReconcileRequest};
use crate::app::errors::ApiResult;
use crate::app::routes::common::parse_id;
use crate::app::services::AppServices;
use crate::authz;
use crate::context::CallerContext;

// ─────────────────────────────────────────────────────────────────────────────
// Router
// ─────────────────────────────────────────────────────────────────────────────

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_principals).post(create_principal))
        .route("/:id", get(get_principal))
        .route("/:id/suspend", post(suspend_principal))
        .route("/:id/reactivate", post(reactivate_principal))
        .route("/:id/terminate", post(terminate_principal))
        .route(
            "/:id/roles",
            get(list_assignments).post(assign_role).put(reconcile_roles),
        )
        .route("/:id/roles/:role", delete(revoke_role))
        .route("/:id/roles/:role/conflicts", get(check_conflict))
        .route("/:id/permissions", get(effective_permissions))
}

pub fn directory_router() -> Router {
    Router::new().route("/sync", post(sync_directory))
}

// ─────────────────────────────────────────────────────────────────────────────
// Principals
// ─────────────────────────────────────────────────────────────────────────────

/// GET /principals
pub async fn list_principals(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<CallerContext>,
) -> ApiResult {
    authz::require(&services, &caller, well_known::USER_READ).await?;
    services
        .respond(StatusCode::OK, |engine| {
            Ok(json!({ "principals": engine.principals()? }))
        })
        .await
}

/// GET /principals/:id
pub async fn get_principal(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<CallerContext>,
    Path(id): Path<String>,
) -> ApiResult {
    let id = parse_id(&id, PrincipalId::parse)?;
    authz::require_self_or(&services, &caller, &id, well_known::USER_READ).await?;
    services
        .respond(StatusCode::OK, move |engine| engine.principal(&id))
        .await
}

/// POST /principals
pub async fn create_principal(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<CallerContext>,
    Json(body): Json<NewPrincipal>,
) -> ApiResult {
    authz::require(&services, &caller, well_known::USER_CREATE).await?;
    let ctx = caller.operation();
    services
        .respond(StatusCode::CREATED, move |engine| engine.create_principal(&ctx, body))
        .await
}

/// POST /principals/:id/suspend
pub async fn suspend_principal(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<CallerContext>,
    Path(id): Path<String>,
) -> ApiResult {
    authz::require(&services, &caller, well_known::USER_UPDATE).await?;
    let id = parse_id(&id, PrincipalId::parse)?;
    let ctx = caller.operation();
    services
        .respond(StatusCode::OK, move |engine| engine.suspend_principal(&ctx, &id))
        .await
}

/// POST /principals/:id/reactivate
pub async fn reactivate_principal(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<CallerContext>,
    Path(id): Path<String>,
) -> ApiResult {
    authz::require(&services, &caller, well_known::USER_UPDATE).await?;
    let id = parse_id(&id, PrincipalId::parse)?;
    let ctx = caller.operation();
    services
        .respond(StatusCode::OK, move |engine| engine.reactivate_principal(&ctx, &id))
        .await
}

/// POST /principals/:id/terminate - also revokes every assignment
pub async fn terminate_principal(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<CallerContext>,
    Path(id): Path<String>,
) -> ApiResult {
    authz::require(&services, &caller, well_known::USER_DELETE).await?;
    let id = parse_id(&id, PrincipalId::parse)?;
    let ctx = caller.operation();
    services
        .respond(StatusCode::OK, move |engine| engine.terminate_principal(&ctx, &id))
        .await
}

// ─────────────────────────────────────────────────────────────────────────────
// Assignments
// ─────────────────────────────────────────────────────────────────────────────

/// GET /principals/:id/roles - full assignment history
pub async fn list_assignments(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<CallerContext>,
    Path(id): Path<String>,
) -> ApiResult {
    let id = parse_id(&id, PrincipalId::parse)?;
    authz::require_self_or(&services, &caller, &id, well_known::ROLE_READ).await?;
    services
        .respond(StatusCode::OK, move |engine| {
            let now = engine.now();
            Ok(json!({
                "principal": id,
                "active_roles": engine.active_roles_for(&id, now)?,
                "assignments": engine.assignments_for(&id)?,
            }))
        })
        .await
}

/// POST /principals/:id/roles - `{ "role": ..., "expires_at": ... }`
pub async fn assign_role(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<CallerContext>,
    Path(id): Path<String>,
    Json(body): Json<AssignRoleRequest>,
) -> ApiResult {
    authz::require(&services, &caller, well_known::ROLE_ASSIGN).await?;
    let id = parse_id(&id, PrincipalId::parse)?;
    let ctx = caller.operation();
    services
        .respond(StatusCode::CREATED, move |engine| {
            engine.assign(&ctx, &id, &body.role, body.expires_at, AssignmentSource::Manual)
        })
        .await
}

/// DELETE /principals/:id/roles/:role - idempotent
pub async fn revoke_role(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<CallerContext>,
    Path((id, role)): Path<(String, String)>,
) -> ApiResult {
    authz::require(&services, &caller, well_known::ROLE_ASSIGN).await?;
    let id = parse_id(&id, PrincipalId::parse)?;
    let role = parse_id(&role, RoleId::parse)?;
    let ctx = caller.operation();
    services
        .respond(StatusCode::OK, move |engine| {
            let revoked = engine.revoke(&ctx, &id, &role)?;
            Ok(json!({ "principal": id, "role": role, "revoked": revoked }))
        })
        .await
}

/// GET /principals/:id/roles/:role/conflicts - SoD pre-check
pub async fn check_conflict(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<CallerContext>,
    Path((id, role)): Path<(String, String)>,
) -> ApiResult {
    let id = parse_id(&id, PrincipalId::parse)?;
    let role = parse_id(&role, RoleId::parse)?;
    authz::require_self_or(&services, &caller, &id, well_known::ROLE_READ).await?;
    services
        .respond(StatusCode::OK, move |engine| {
            let violation = engine.check_conflict(&id, &role)?;
            Ok(json!({ "conflict": violation.is_some(), "violation": violation }))
        })
        .await
}

/// GET /principals/:id/permissions?as_of=
pub async fn effective_permissions(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<CallerContext>,
    Path(id): Path<String>,
    Query(query): Query<AsOfQuery>,
) -> ApiResult {
    let id = parse_id(&id, PrincipalId::parse)?;
    authz::require_self_or(&services, &caller, &id, well_known::USER_READ).await?;
    services
        .respond(StatusCode::OK, move |engine| {
            let as_of = query.as_of.unwrap_or_else(|| engine.now());
            Ok(json!({
                "principal": id,
                "as_of": as_of,
                "permissions": engine.effective_permissions_for(&id, as_of)?,
            }))
        })
        .await
}

// ─────────────────────────────────────────────────────────────────────────────
// Directory sync
// ─────────────────────────────────────────────────────────────────────────────

/// PUT /principals/:id/roles - `{ "roles": [...] }` reconcile to exactly this set
pub async fn reconcile_roles(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<CallerContext>,
    Path(id): Path<String>,
    Json(body): Json<ReconcileRequest>,
) -> ApiResult {
    authz::require(&services, &caller, well_known::AD_SYNC).await?;
    let id = parse_id(&id, PrincipalId::parse)?;
    let ctx = caller.operation();
    services
        .respond(StatusCode::OK, move |engine| engine.reconcile(&ctx, &id, &body.roles))
        .await
}

/// POST /directory/sync - batch of `{ "principal": {...}, "roles": [...] }`
pub async fn sync_directory(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<CallerContext>,
    Json(entries): Json<Vec<DirectoryEntry>>,
) -> ApiResult {
    authz::require(&services, &caller, well_known::AD_SYNC).await?;
    let ctx = caller.operation();
    services
        .respond(StatusCode::OK, move |engine| Ok(engine.sync_directory(&ctx, entries)))
        .await
}
