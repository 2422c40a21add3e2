//! Access-request workflow endpoints.

use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde_json::json;

use accessgate_auth::well_known;
use accessgate_core::RequestId;
use accessgate_infra::engine::RequestFilter;

use crate::app::dto::{
    ApproveRequestBody, ExpireRequestBody, RejectRequestBody, RequestListQuery,
    SubmitAccessRequest,
};
use crate::app::errors::ApiResult;
use crate::app::routes::common::parse_id;
use crate::app::services::AppServices;
use crate::authz;
use crate::context::CallerContext;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_requests).post(submit_request))
        .route("/:id", get(get_request))
        .route("/:id/approve", post(approve_request))
        .route("/:id/reject", post(reject_request))
        .route("/:id/expire", post(expire_request))
}

/// POST /requests - the caller is the requester
pub async fn submit_request(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<CallerContext>,
    Json(body): Json<SubmitAccessRequest>,
) -> ApiResult {
    authz::require(&services, &caller, well_known::REQUEST_CREATE).await?;
    let ctx = caller.operation();
    let new = body.into_new(caller.principal_id().clone());
    services
        .respond(StatusCode::CREATED, move |engine| engine.submit(&ctx, new))
        .await
}

/// GET /requests?requester=&target=&status=
///
/// Without `REQUEST_READ` the caller only sees requests they made.
pub async fn list_requests(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<CallerContext>,
    Query(query): Query<RequestListQuery>,
) -> ApiResult {
    let mut filter = RequestFilter::from(query);
    if filter.requester.as_ref() != Some(caller.principal_id())
        && authz::require(&services, &caller, well_known::REQUEST_READ).await.is_err()
    {
        filter.requester = Some(caller.principal_id().clone());
    }
    services
        .respond(StatusCode::OK, move |engine| {
            Ok(json!({ "requests": engine.requests(&filter)? }))
        })
        .await
}

/// GET /requests/:id
pub async fn get_request(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<CallerContext>,
    Path(id): Path<String>,
) -> ApiResult {
    let id = parse_id(&id, RequestId::parse)?;
    let request = services
        .run({
            let id = id.clone();
            move |engine| engine.request(&id)
        })
        .await?;

    let involved = &request.requester == caller.principal_id() || &request.target == caller.principal_id();
    if !involved {
        authz::require(&services, &caller, well_known::REQUEST_READ).await?;
    }
    Ok((StatusCode::OK, Json(request)).into_response())
}

/// POST /requests/:id/approve - the caller is the approver
pub async fn approve_request(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<CallerContext>,
    Path(id): Path<String>,
    body: Option<Json<ApproveRequestBody>>,
) -> ApiResult {
    authz::require(&services, &caller, well_known::REQUEST_APPROVE).await?;
    let id = parse_id(&id, RequestId::parse)?;
    let ctx = caller.operation();
    let approver = caller.principal_id().clone();
    let comment = body.and_then(|Json(b)| b.comment);
    services
        .respond(StatusCode::OK, move |engine| engine.approve(&ctx, &id, &approver, comment))
        .await
}

/// POST /requests/:id/reject - `{ "reason": ... }`
pub async fn reject_request(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<CallerContext>,
    Path(id): Path<String>,
    Json(body): Json<RejectRequestBody>,
) -> ApiResult {
    authz::require(&services, &caller, well_known::REQUEST_APPROVE).await?;
    let id = parse_id(&id, RequestId::parse)?;
    let ctx = caller.operation();
    let approver = caller.principal_id().clone();
    services
        .respond(StatusCode::OK, move |engine| {
            engine.reject(&ctx, &id, &approver, &body.reason)
        })
        .await
}

/// POST /requests/:id/expire - `{ "as_of": ... }`, defaults to now
pub async fn expire_request(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<CallerContext>,
    Path(id): Path<String>,
    body: Option<Json<ExpireRequestBody>>,
) -> ApiResult {
    authz::require(&services, &caller, well_known::REQUEST_APPROVE).await?;
    let id = parse_id(&id, RequestId::parse)?;
    let ctx = caller.operation();
    let as_of = body.and_then(|Json(b)| b.as_of);
    services
        .respond(StatusCode::OK, move |engine| {
            engine.expire(&ctx, &id, as_of.unwrap_or_else(|| engine.now()))
        })
        .await
}
