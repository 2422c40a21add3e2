//! Permission catalog, role store and SoD rule endpoints.

use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde_json::json;

use accessgate_auth::{well_known, NewPermission, NewRole, RoleUpdate};
use accessgate_core::{PermissionId, RoleId};

use crate::app::dto::AddSodRuleRequest;
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
        .route("/permissions", get(list_permissions).post(create_permission))
        .route("/permissions/by-category", get(permissions_by_category))
        .route("/permissions/:id", get(get_permission).delete(retire_permission))
        .route("/roles", get(list_roles).post(create_role))
        .route("/roles/:id", get(get_role).patch(update_role).delete(retire_role))
        .route("/sod-rules", get(list_sod_rules).post(add_sod_rule))
}

// ─────────────────────────────────────────────────────────────────────────────
// Permissions
// ─────────────────────────────────────────────────────────────────────────────

/// GET /permissions
pub async fn list_permissions(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<CallerContext>,
) -> ApiResult {
    authz::require(&services, &caller, well_known::PERMISSION_READ).await?;
    services
        .respond(StatusCode::OK, |engine| {
            Ok(json!({ "permissions": engine.permissions()? }))
        })
        .await
}

/// GET /permissions/by-category
pub async fn permissions_by_category(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<CallerContext>,
) -> ApiResult {
    authz::require(&services, &caller, well_known::PERMISSION_READ).await?;
    services
        .respond(StatusCode::OK, |engine| engine.permissions_by_category())
        .await
}

/// GET /permissions/:id
pub async fn get_permission(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<CallerContext>,
    Path(id): Path<String>,
) -> ApiResult {
    authz::require(&services, &caller, well_known::PERMISSION_READ).await?;
    let id = parse_id(&id, PermissionId::parse)?;
    services
        .respond(StatusCode::OK, move |engine| engine.permission(&id))
        .await
}

/// POST /permissions
pub async fn create_permission(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<CallerContext>,
    Json(body): Json<NewPermission>,
) -> ApiResult {
    authz::require(&services, &caller, well_known::PERMISSION_CREATE).await?;
    let ctx = caller.operation();
    services
        .respond(StatusCode::CREATED, move |engine| engine.create_permission(&ctx, body))
        .await
}

/// DELETE /permissions/:id - deprecate; roles holding it keep it
pub async fn retire_permission(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<CallerContext>,
    Path(id): Path<String>,
) -> ApiResult {
    authz::require(&services, &caller, well_known::PERMISSION_DELETE).await?;
    let id = parse_id(&id, PermissionId::parse)?;
    let ctx = caller.operation();
    services
        .respond(StatusCode::OK, move |engine| engine.retire_permission(&ctx, &id))
        .await
}

// ─────────────────────────────────────────────────────────────────────────────
// Roles
// ─────────────────────────────────────────────────────────────────────────────

/// GET /roles
pub async fn list_roles(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<CallerContext>,
) -> ApiResult {
    authz::require(&services, &caller, well_known::ROLE_READ).await?;
    services
        .respond(StatusCode::OK, |engine| Ok(json!({ "roles": engine.roles()? })))
        .await
}

/// GET /roles/:id
pub async fn get_role(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<CallerContext>,
    Path(id): Path<String>,
) -> ApiResult {
    authz::require(&services, &caller, well_known::ROLE_READ).await?;
    let id = parse_id(&id, RoleId::parse)?;
    services
        .respond(StatusCode::OK, move |engine| engine.role(&id))
        .await
}

/// POST /roles
pub async fn create_role(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<CallerContext>,
    Json(body): Json<NewRole>,
) -> ApiResult {
    authz::require(&services, &caller, well_known::ROLE_CREATE).await?;
    let ctx = caller.operation();
    services
        .respond(StatusCode::CREATED, move |engine| engine.create_role(&ctx, body))
        .await
}

/// PATCH /roles/:id - `{ "add": [...], "remove": [...] }`
pub async fn update_role(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<CallerContext>,
    Path(id): Path<String>,
    Json(body): Json<RoleUpdate>,
) -> ApiResult {
    authz::require(&services, &caller, well_known::ROLE_UPDATE).await?;
    let id = parse_id(&id, RoleId::parse)?;
    let ctx = caller.operation();
    services
        .respond(StatusCode::OK, move |engine| {
            let (role, diff) = engine.update_role(&ctx, &id, body)?;
            Ok(json!({ "role": role, "diff": diff }))
        })
        .await
}

/// DELETE /roles/:id - retire
pub async fn retire_role(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<CallerContext>,
    Path(id): Path<String>,
) -> ApiResult {
    authz::require(&services, &caller, well_known::ROLE_DELETE).await?;
    let id = parse_id(&id, RoleId::parse)?;
    let ctx = caller.operation();
    services
        .respond(StatusCode::OK, move |engine| engine.retire_role(&ctx, &id))
        .await
}

// ─────────────────────────────────────────────────────────────────────────────
// SoD rules
// ─────────────────────────────────────────────────────────────────────────────

/// GET /sod-rules
pub async fn list_sod_rules(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<CallerContext>,
) -> ApiResult {
    authz::require(&services, &caller, well_known::ROLE_READ).await?;
    services
        .respond(StatusCode::OK, |engine| Ok(json!({ "rules": engine.sod_rules()? })))
        .await
}

/// POST /sod-rules
pub async fn add_sod_rule(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<CallerContext>,
    Json(body): Json<AddSodRuleRequest>,
) -> ApiResult {
    authz::require(&services, &caller, well_known::ROLE_UPDATE).await?;
    let ctx = caller.operation();
    services
        .respond(StatusCode::CREATED, move |engine| {
            engine.add_sod_rule(&ctx, body.role_a, body.role_b, body.description)
        })
        .await
}
