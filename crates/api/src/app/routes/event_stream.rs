//! Notification stream for dispatchers and operational visibility.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Extension, Query},
    response::{
        sse::{Event as SseEvent, KeepAlive, Sse},
        IntoResponse,
    },
    routing::get,
    Router,
};
use tokio::sync::mpsc::unbounded_channel;
use tokio_stream::wrappers::UnboundedReceiverStream;

use accessgate_auth::well_known;
use accessgate_events::{EventBus, EventEnvelope, Notification};

use crate::app::dto::StreamQuery;
use crate::app::errors::ApiResult;
use crate::app::services::AppServices;
use crate::authz;
use crate::context::CallerContext;

const HEARTBEAT: Duration = Duration::from_secs(15);

// ─────────────────────────────────────────────────────────────────────────────
// Router
// ─────────────────────────────────────────────────────────────────────────────

pub fn router() -> Router {
    Router::new().route("/stream", get(stream_notifications))
}

// ─────────────────────────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────────────────────────

/// GET /notifications/stream?subject=
///
/// Streams engine notifications via Server-Sent Events. Each SSE event is
/// named after the notification type (`access.request.approved`, ...) and
/// carries the JSON envelope.
pub async fn stream_notifications(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<CallerContext>,
    Query(query): Query<StreamQuery>,
) -> ApiResult {
    authz::require(&services, &caller, well_known::AUDIT_READ).await?;

    let (tx, rx) = unbounded_channel::<Result<SseEvent, std::convert::Infallible>>();

    // The bus subscription is a blocking receiver; forward from a blocking task.
    let subscription = services.notifications.subscribe();
    tokio::task::spawn_blocking(move || {
        loop {
            match subscription.recv_timeout(Duration::from_secs(1)) {
                Ok(envelope) => {
                    if query.subject.as_deref().is_some_and(|s| s != envelope.subject()) {
                        continue;
                    }
                    let Some(event) = to_sse(&envelope) else {
                        continue;
                    };
                    if tx.send(Ok(event)).is_err() {
                        break; // client went away
                    }
                }
                Err(std::sync::mpsc::RecvTimeoutError::Timeout) => {
                    if tx.is_closed() {
                        break;
                    }
                }
                Err(std::sync::mpsc::RecvTimeoutError::Disconnected) => break,
            }
        }
        tracing::debug!("notification stream closed");
    });

    let stream = UnboundedReceiverStream::new(rx);
    Ok(Sse::new(stream)
        .keep_alive(KeepAlive::new().interval(HEARTBEAT))
        .into_response())
}

// ─────────────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────────────

fn to_sse(envelope: &EventEnvelope<Notification>) -> Option<SseEvent> {
    match serde_json::to_string(envelope) {
        Ok(data) => Some(
            SseEvent::default()
                .event(envelope.event_type())
                .id(envelope.sequence_number().to_string())
                .data(data),
        ),
        Err(err) => {
            tracing::warn!(error = %err, "notification not serializable");
            None
        }
    }
}
