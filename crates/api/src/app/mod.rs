//! HTTP API application wiring (Axum router + service wiring).
//!
//! - `services.rs`: engine wiring and the blocking-call bridge
//! - `routes/`: HTTP routes + handlers (one file per area)
//! - `dto.rs`: request DTOs and query parameters
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::{routing::get, Extension, Router};
use tower::ServiceBuilder;

use crate::middleware;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

use services::AppServices;

/// Build the full HTTP router (public entrypoint used by `main.rs`).
pub fn build_app(services: Arc<AppServices>) -> Router {
    // Engine routes: require a caller identity.
    let protected = routes::router()
        .layer(Extension(services))
        .layer(axum::middleware::from_fn(middleware::caller_middleware));

    Router::new()
        .route("/health", get(routes::system::health))
        .merge(protected)
        .layer(ServiceBuilder::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    use crate::config::ApiConfig;

    fn app() -> Router {
        let services = services::build_services(&ApiConfig::default()).unwrap();
        build_app(Arc::new(services))
    }

    fn get(uri: &str, caller: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().uri(uri);
        if let Some(caller) = caller {
            builder = builder.header(crate::middleware::PRINCIPAL_HEADER, caller);
        }
        builder.body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn health_needs_no_caller() {
        let res = app().oneshot(get("/health", None)).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn engine_routes_need_a_caller() {
        let res = app().oneshot(get("/roles", None)).await.unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn admin_reads_catalog_but_unknown_caller_is_forbidden() {
        let app = app();
        let res = app.clone().oneshot(get("/roles/ROLE_ADMIN", Some("admin"))).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);

        let res = app.oneshot(get("/roles", Some("mallory"))).await.unwrap();
        assert_eq!(res.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn malformed_path_id_is_a_validation_error() {
        let res = app().oneshot(get("/roles/not-a-role", Some("admin"))).await.unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }
}
