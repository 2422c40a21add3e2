use axum::{routing::get, Router};

pub mod audit;
pub mod catalog;
pub mod common;
pub mod event_stream;
pub mod principals;
pub mod requests;
pub mod system;

/// Router for all caller-identified endpoints.
pub fn router() -> Router {
    Router::new()
        .route("/whoami", get(system::whoami))
        .route("/summary", get(system::summary))
        .merge(catalog::router())
        .nest("/principals", principals::router())
        .nest("/directory", principals::directory_router())
        .nest("/requests", requests::router())
        .nest("/authz", audit::authz_router())
        .nest("/audit", audit::router())
        .nest("/notifications", event_stream::router())
}
