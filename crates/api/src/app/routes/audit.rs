//! Authorization decisions and audit-log endpoints.
//!
//! These endpoints give visibility into authorization decisions to help
//! debug "Why was this request denied?" questions.

use std::sync::Arc;

use axum::{
    extract::{Extension, Query},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde_json::json;

use accessgate_auth::well_known;
use accessgate_infra::audit::PageRequest;

use crate::app::dto::{AuditQuery, AuthorizeRequest, ExplainQuery};
use crate::app::errors::ApiResult;
use crate::app::services::AppServices;
use crate::authz;
use crate::context::CallerContext;

// ─────────────────────────────────────────────────────────────────────────────
// Router
// ─────────────────────────────────────────────────────────────────────────────

pub fn authz_router() -> Router {
    Router::new()
        .route("/check", post(authorize))
        .route("/explain", get(explain))
}

pub fn router() -> Router {
    Router::new()
        .route("/events", get(query_events))
        .route("/stats", get(stats))
}

// ─────────────────────────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────────────────────────

/// POST /authz/check - the decision point for relying services
///
/// Open to any identified caller; the decision itself is audited.
pub async fn authorize(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<CallerContext>,
    Json(body): Json<AuthorizeRequest>,
) -> ApiResult {
    let ctx = caller.operation();
    services
        .respond(StatusCode::OK, move |engine| {
            let as_of = body.as_of.unwrap_or_else(|| engine.now());
            let granted = engine.authorize(&ctx, &body.principal, &body.permission, as_of)?;
            Ok(json!({
                "principal": body.principal,
                "permission": body.permission,
                "as_of": as_of,
                "granted": granted,
            }))
        })
        .await
}

/// GET /authz/explain?principal=&permission=&as_of=
pub async fn explain(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<CallerContext>,
    Query(query): Query<ExplainQuery>,
) -> ApiResult {
    authz::require_self_or(&services, &caller, &query.principal, well_known::AUDIT_READ).await?;
    services
        .respond(StatusCode::OK, move |engine| {
            let as_of = query.as_of.unwrap_or_else(|| engine.now());
            engine.explain(&query.principal, &query.permission, as_of)
        })
        .await
}

/// GET /audit/events?from=&to=&principal=&category=&outcome=&limit=&cursor=
pub async fn query_events(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<CallerContext>,
    Query(query): Query<AuditQuery>,
) -> ApiResult {
    authz::require(&services, &caller, well_known::AUDIT_READ).await?;
    services
        .respond(StatusCode::OK, move |engine| {
            let page = PageRequest {
                limit: engine.config().page_size(query.limit),
                cursor: query.cursor(),
            };
            engine.audit_query(&query.filter(), &page)
        })
        .await
}

/// GET /audit/stats - delivery counters of the audit writer
pub async fn stats(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<CallerContext>,
) -> ApiResult {
    authz::require(&services, &caller, well_known::AUDIT_READ).await?;
    services
        .respond(StatusCode::OK, |engine| Ok(engine.audit_stats()))
        .await
}
