use std::sync::Arc;

use axum::{
    extract::{Extension, Query},
    http::StatusCode,
};
use serde_json::json;

use accessgate_auth::well_known;

use crate::app::dto::AsOfQuery;
use crate::app::errors::ApiResult;
use crate::app::services::AppServices;
use crate::authz;
use crate::context::CallerContext;

pub async fn health() -> StatusCode {
    StatusCode::OK
}

/// GET /whoami - the caller, its active roles and effective permissions
pub async fn whoami(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<CallerContext>,
) -> ApiResult {
    let principal = caller.principal_id().clone();
    let source = caller.source_address().map(str::to_string);
    services
        .respond(StatusCode::OK, move |engine| {
            let now = engine.now();
            Ok(json!({
                "principal_id": principal,
                "source_address": source,
                "roles": engine.active_roles_for(&principal, now)?,
                "permissions": engine.effective_permissions_for(&principal, now)?,
            }))
        })
        .await
}

/// GET /summary?as_of= - dashboard counts
pub async fn summary(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<CallerContext>,
    Query(query): Query<AsOfQuery>,
) -> ApiResult {
    authz::require(&services, &caller, well_known::REPORT_READ).await?;

    services
        .respond(StatusCode::OK, move |engine| {
            engine.summary(query.as_of.unwrap_or_else(|| engine.now()))
        })
        .await
}
