//! Engine wiring for the HTTP layer.

use std::sync::Arc;

use axum::http::StatusCode;

use accessgate_auth::NewPrincipal;
use accessgate_core::{DomainResult, SystemClock};
use accessgate_events::{BusPublisher, EventEnvelope, InMemoryEventBus, Notification};
use accessgate_infra::audit::InMemoryAuditLog;
use accessgate_infra::seed::{apply_catalog, bootstrap_admin, default_catalog};
use accessgate_infra::store::Stores;
use accessgate_infra::{AccessEngine, OperationContext};

use crate::app::errors::{self, ApiResult};
use crate::config::ApiConfig;

pub type NotificationBus = InMemoryEventBus<EventEnvelope<Notification>>;

/// Shared state behind every handler.
pub struct AppServices {
    pub engine: Arc<AccessEngine>,
    /// Bus the engine publishes notifications to (SSE subscribers read it).
    pub notifications: Arc<NotificationBus>,
}

impl AppServices {
    /// Run a synchronous engine call on the blocking pool.
    ///
    /// Engine operations may sleep between retries and block on the audit
    /// queue, so they never run on the async workers.
    pub async fn run<T, F>(&self, f: F) -> Result<T, axum::response::Response>
    where
        F: FnOnce(&AccessEngine) -> DomainResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let engine = self.engine.clone();
        match tokio::task::spawn_blocking(move || f(&engine)).await {
            Ok(result) => result.map_err(errors::domain_error_to_response),
            Err(join) => {
                tracing::error!(error = %join, "engine task failed");
                Err(errors::json_error(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "engine task failed",
                ))
            }
        }
    }

    /// [`Self::run`] and serialize the value as a JSON 200/201.
    pub async fn respond<T, F>(&self, status: StatusCode, f: F) -> ApiResult
    where
        F: FnOnce(&AccessEngine) -> DomainResult<T> + Send + 'static,
        T: serde::Serialize + Send + 'static,
    {
        use axum::response::IntoResponse;

        let value = self.run(f).await?;
        Ok((status, axum::Json(value)).into_response())
    }
}

/// Build an in-memory engine. With `seed_catalog` set, the default catalog is
/// loaded and the bootstrap administrator is created with `ROLE_ADMIN`.
pub fn build_services(config: &ApiConfig) -> DomainResult<AppServices> {
    let notifications = Arc::new(NotificationBus::new());
    let engine = AccessEngine::new(
        config.engine.clone(),
        Stores::in_memory(),
        Arc::new(SystemClock),
        Arc::new(InMemoryAuditLog::new()),
        Arc::new(BusPublisher::new(notifications.clone())),
    );

    let ctx = OperationContext::system();
    if config.seed_catalog {
        apply_catalog(&engine, &ctx, default_catalog())?;
        bootstrap_admin(
            &engine,
            &ctx,
            NewPrincipal::new(config.admin_id.clone(), config.admin_name.clone()),
        )?;
    }
    tracing::info!(admin = %config.admin_id, seeded = config.seed_catalog, "engine ready");

    Ok(AppServices {
        engine: Arc::new(engine),
        notifications,
    })
}
