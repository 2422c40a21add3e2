//! Notifications: the domain events an external dispatcher subscribes to.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use accessgate_core::{PrincipalId, RequestId, RoleId};

use crate::{Event, EventBus, EventEnvelope};

/// Domain events published by the engine for notification delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    RequestSubmitted {
        request_id: RequestId,
        requester: PrincipalId,
        target: PrincipalId,
        role: RoleId,
        occurred_at: DateTime<Utc>,
    },
    RequestApproved {
        request_id: RequestId,
        target: PrincipalId,
        role: RoleId,
        approver: PrincipalId,
        expires_at: Option<DateTime<Utc>>,
        occurred_at: DateTime<Utc>,
    },
    RequestRejected {
        request_id: RequestId,
        requester: PrincipalId,
        approver: PrincipalId,
        reason: String,
        occurred_at: DateTime<Utc>,
    },
    RequestExpired {
        request_id: RequestId,
        target: PrincipalId,
        role: RoleId,
        occurred_at: DateTime<Utc>,
    },
    SodViolationDetected {
        request_id: Option<RequestId>,
        principal: PrincipalId,
        role: RoleId,
        conflicting_role: RoleId,
        rule_id: u64,
        occurred_at: DateTime<Utc>,
    },
}

impl Notification {
    /// Entity the notification is about (request id, or the principal for
    /// violations raised outside the workflow).
    pub fn subject(&self) -> String {
        match self {
            Notification::RequestSubmitted { request_id, .. }
            | Notification::RequestApproved { request_id, .. }
            | Notification::RequestRejected { request_id, .. }
            | Notification::RequestExpired { request_id, .. } => request_id.to_string(),
            Notification::SodViolationDetected {
                request_id: Some(request_id),
                ..
            } => request_id.to_string(),
            Notification::SodViolationDetected { principal, .. } => principal.to_string(),
        }
    }
}

impl Event for Notification {
    fn event_type(&self) -> &'static str {
        match self {
            Notification::RequestSubmitted { .. } => "access.request.submitted",
            Notification::RequestApproved { .. } => "access.request.approved",
            Notification::RequestRejected { .. } => "access.request.rejected",
            Notification::RequestExpired { .. } => "access.request.expired",
            Notification::SodViolationDetected { .. } => "access.sod.violation_detected",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            Notification::RequestSubmitted { occurred_at, .. }
            | Notification::RequestApproved { occurred_at, .. }
            | Notification::RequestRejected { occurred_at, .. }
            | Notification::RequestExpired { occurred_at, .. }
            | Notification::SodViolationDetected { occurred_at, .. } => *occurred_at,
        }
    }
}

/// Engine-side publishing seam. Publication never fails the caller.
pub trait NotificationPublisher: Send + Sync {
    fn publish(&self, notification: Notification);
}

/// Publishes notifications onto an [`EventBus`] wrapped in sequenced envelopes.
#[derive(Debug)]
pub struct BusPublisher<B> {
    bus: B,
    sequence: AtomicU64,
}

impl<B> BusPublisher<B> {
    pub fn new(bus: B) -> Self {
        Self {
            bus,
            sequence: AtomicU64::new(0),
        }
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }
}

impl<B> NotificationPublisher for BusPublisher<B>
where
    B: EventBus<EventEnvelope<Notification>>,
{
    fn publish(&self, notification: Notification) {
        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        let envelope = EventEnvelope::new(
            Uuid::now_v7(),
            notification.subject(),
            notification.event_type(),
            sequence,
            notification,
        );

        if let Err(err) = self.bus.publish(envelope) {
            tracing::warn!(error = ?err, sequence, "notification publish failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::InMemoryEventBus;
    use std::sync::Arc;

    #[test]
    fn publisher_wraps_notifications_in_sequenced_envelopes() {
        let bus: Arc<InMemoryEventBus<EventEnvelope<Notification>>> = Arc::new(InMemoryEventBus::new());
        let sub = bus.subscribe();
        let publisher = BusPublisher::new(bus.clone());

        let now = Utc::now();
        publisher.publish(Notification::RequestSubmitted {
            request_id: RequestId::from_sequence(1),
            requester: PrincipalId::new("john.doe"),
            target: PrincipalId::new("john.doe"),
            role: RoleId::new("ROLE_ADMIN"),
            occurred_at: now,
        });
        publisher.publish(Notification::SodViolationDetected {
            request_id: None,
            principal: PrincipalId::new("alice.lee"),
            role: RoleId::new("ROLE_A"),
            conflicting_role: RoleId::new("ROLE_B"),
            rule_id: 1,
            occurred_at: now,
        });

        let received = sub.drain();
        assert_eq!(received.len(), 2);
        assert_eq!(received[0].sequence_number(), 1);
        assert_eq!(received[0].subject(), "REQ-001");
        assert_eq!(received[0].event_type(), "access.request.submitted");
        assert_eq!(received[1].sequence_number(), 2);
        assert_eq!(received[1].subject(), "alice.lee");
    }
}
