//! The access engine: application-level orchestration over the stores.
//!
//! `AccessEngine` composes the pure domain types from `accessgate-auth` with
//! the persistence seams in [`crate::store`], the buffered [`AuditRecorder`]
//! and a [`NotificationPublisher`]. Every public operation follows the same
//! shape:
//!
//! ```text
//! Operation(ctx, ...)
//!   ↓
//! 1. Validate references (principal / role / permission exist and are usable)
//!   ↓
//! 2. Take the per-principal lock when the principal's assignments change
//!   ↓
//! 3. Decide (pure domain code: aggregate `handle`, `check_conflict`, ...)
//!   ↓
//! 4. Persist (single atomic replace per principal, request event append)
//!   ↓
//! 5. Record audit + publish notifications (while the lock is still held)
//! ```
//!
//! Transient storage failures are retried at the operation boundary with the
//! configured [`accessgate_core::RetryPolicy`]; each attempt re-acquires the
//! lock and re-reads state.

mod assignments;
mod authorize;
mod catalog;
mod directory;
mod summary;
mod workflow;

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use accessgate_auth::{AssignmentSet, Permission, Principal, Role, SodRule};
use accessgate_core::{Clock, DomainError, DomainResult, PermissionId, PrincipalId, RoleId};
use accessgate_events::{Notification, NotificationPublisher};

use crate::audit::{
    AuditCategory, AuditEvent, AuditFilter, AuditIter, AuditLog, AuditOutcome, AuditPage,
    AuditRecorder, AuditStats, PageRequest,
};
use crate::config::EngineConfig;
use crate::locks::KeyedLocks;
use crate::store::Stores;

pub use directory::{
    DirectoryEntry, DirectorySyncReport, EntryFailure, ReconcileFailure, ReconcileReport,
};
pub use summary::{PrincipalCounts, RequestCounts, RoleCounts, Summary};
pub use workflow::{NewAccessRequest, RequestFilter};

/// Who is performing an operation, and from where.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationContext {
    pub actor: PrincipalId,
    /// Network origin, recorded on audit events.
    pub source_address: Option<String>,
}

impl OperationContext {
    pub fn new(actor: impl Into<PrincipalId>) -> Self {
        Self {
            actor: actor.into(),
            source_address: None,
        }
    }

    pub fn with_source(mut self, source_address: impl Into<String>) -> Self {
        self.source_address = Some(source_address.into());
        self
    }

    /// Context for work the engine does on its own behalf (lazy expiry).
    pub fn system() -> Self {
        Self::new("system")
    }
}

/// Authorization and access-request engine.
///
/// Cheap to share behind an `Arc`; all methods take `&self`.
pub struct AccessEngine {
    config: EngineConfig,
    clock: Arc<dyn Clock>,
    stores: Stores,
    principal_locks: KeyedLocks<PrincipalId>,
    /// Serializes catalog administration (ids, SoD rule numbering).
    catalog_lock: Mutex<()>,
    audit: AuditRecorder,
    notifications: Arc<dyn NotificationPublisher>,
}

impl AccessEngine {
    pub fn new(
        config: EngineConfig,
        stores: Stores,
        clock: Arc<dyn Clock>,
        audit_log: Arc<dyn AuditLog>,
        notifications: Arc<dyn NotificationPublisher>,
    ) -> Self {
        let audit = AuditRecorder::spawn(audit_log, config.audit_queue_capacity);
        Self {
            config,
            clock,
            stores,
            principal_locks: KeyedLocks::new(),
            catalog_lock: Mutex::new(()),
            audit,
            notifications,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Audit pass-through
    // ─────────────────────────────────────────────────────────────────────────

    /// One page of audit events (pending events are flushed first).
    pub fn audit_query(&self, filter: &AuditFilter, page: &PageRequest) -> DomainResult<AuditPage> {
        let page = PageRequest {
            limit: self.config.page_size(Some(page.limit)),
            cursor: page.cursor.clone(),
        };
        self.audit.query(filter, &page)
    }

    /// Lazily iterate every matching audit event.
    pub fn audit_iter(&self, filter: AuditFilter, page_size: Option<u32>) -> AuditIter<'_, dyn AuditLog> {
        self.audit.iter(filter, self.config.page_size(page_size))
    }

    pub fn audit_stats(&self) -> AuditStats {
        self.audit.stats()
    }

    /// Wait until every recorded audit event has reached the log.
    pub fn flush_audit(&self) {
        self.audit.flush();
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Shared helpers
    // ─────────────────────────────────────────────────────────────────────────

    fn audit(
        &self,
        ctx: &OperationContext,
        category: AuditCategory,
        action: &str,
        outcome: AuditOutcome,
        subject: impl ToString,
        details: JsonValue,
    ) {
        let event = AuditEvent::new(self.now(), ctx.actor.clone(), category, action, outcome, subject)
            .with_source(ctx.source_address.clone())
            .with_details(details);
        // Authorization decisions never wait on the audit queue.
        if category == AuditCategory::Authorization {
            self.audit.try_record(event);
        } else {
            self.audit.record(event);
        }
    }

    fn publish(&self, notification: Notification) {
        self.notifications.publish(notification);
    }

    fn with_catalog_lock<T>(&self, f: impl FnOnce() -> DomainResult<T>) -> DomainResult<T> {
        let _guard = self.catalog_lock.lock().unwrap_or_else(|e| e.into_inner());
        f()
    }

    fn load_permission(&self, id: &PermissionId) -> DomainResult<Permission> {
        self.stores
            .permissions
            .get(id)?
            .ok_or_else(|| DomainError::not_found("permission", id))
    }

    fn load_role(&self, id: &RoleId) -> DomainResult<Role> {
        self.stores
            .roles
            .get(id)?
            .ok_or_else(|| DomainError::not_found("role", id))
    }

    fn load_principal(&self, id: &PrincipalId) -> DomainResult<Principal> {
        self.stores
            .principals
            .get(id)?
            .ok_or_else(|| DomainError::not_found("principal", id))
    }

    /// Snapshot of a principal's assignments (empty when none were ever made).
    fn load_assignments(&self, principal: &PrincipalId) -> DomainResult<AssignmentSet> {
        Ok(self
            .stores
            .assignments
            .get(principal)?
            .unwrap_or_else(|| AssignmentSet::new(principal.clone())))
    }

    fn save_assignments(&self, set: AssignmentSet) -> DomainResult<()> {
        self.stores.assignments.upsert(set.principal.clone(), set)?;
        Ok(())
    }

    /// SoD rules in declaration order.
    fn load_sod_rules(&self) -> DomainResult<Vec<SodRule>> {
        Ok(self.stores.sod_rules.list()?)
    }

    /// Definitions of the roles among `ids`. Retired roles are included: an
    /// assignment made before retirement keeps granting until it ends.
    fn roles_for(&self, ids: &BTreeSet<RoleId>) -> DomainResult<Vec<Role>> {
        let mut roles = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(role) = self.stores.roles.get(id)? {
                roles.push(role);
            }
        }
        Ok(roles)
    }
}

impl core::fmt::Debug for AccessEngine {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AccessEngine")
            .field("config", &self.config)
            .field("audit", &self.audit)
            .finish_non_exhaustive()
    }
}

fn ids<'a, T>(items: impl IntoIterator<Item = &'a T>) -> Vec<String>
where
    T: core::fmt::Display + 'a,
{
    items.into_iter().map(ToString::to_string).collect()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::ops::Deref;

    use accessgate_auth::NewPrincipal;
    use accessgate_core::{ManualClock, RetryPolicy};
    use accessgate_events::{BusPublisher, EventBus, EventEnvelope, InMemoryEventBus, Subscription};
    use chrono::TimeZone;

    use crate::audit::InMemoryAuditLog;
    use crate::seed::{apply_catalog, bootstrap_admin, default_catalog};

    pub(crate) type NotificationBus = InMemoryEventBus<EventEnvelope<Notification>>;

    /// Engine plus the bus its notifications go to.
    pub(crate) struct TestEngine {
        engine: AccessEngine,
        bus: Arc<NotificationBus>,
    }

    impl Deref for TestEngine {
        type Target = AccessEngine;

        fn deref(&self) -> &Self::Target {
            &self.engine
        }
    }

    pub(crate) fn at(month: u32, day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, month, day, 0, 0, 0).unwrap()
    }

    pub(crate) fn admin() -> OperationContext {
        OperationContext::new("admin").with_source("10.0.0.1")
    }

    /// Empty engine on a manual clock starting 2026-01-01.
    pub(crate) fn engine() -> (TestEngine, Arc<ManualClock>) {
        engine_with(Stores::in_memory(), Arc::new(InMemoryAuditLog::new()), 10_000)
    }

    pub(crate) fn engine_with(
        stores: Stores,
        audit_log: Arc<dyn AuditLog>,
        audit_queue_capacity: usize,
    ) -> (TestEngine, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(at(1, 1)));
        let bus = Arc::new(NotificationBus::new());
        let config = EngineConfig {
            retry: RetryPolicy {
                max_attempts: 3,
                initial_backoff_ms: 1,
                max_backoff_ms: 2,
            },
            audit_queue_capacity,
            ..EngineConfig::default()
        };
        let engine = AccessEngine::new(
            config,
            stores,
            clock.clone(),
            audit_log,
            Arc::new(BusPublisher::new(bus.clone())),
        );
        (TestEngine { engine, bus }, clock)
    }

    /// Default catalog, an administrator and a handful of employees.
    /// Returns a subscription opened after seeding.
    pub(crate) fn seeded(engine: &TestEngine) -> Subscription<EventEnvelope<Notification>> {
        let ctx = OperationContext::system();
        apply_catalog(engine, &ctx, default_catalog()).unwrap();
        bootstrap_admin(engine, &ctx, NewPrincipal::new("admin", "System Administrator")).unwrap();
        for (id, name, department) in [
            ("john.doe", "John Doe", "Engineering"),
            ("jane.smith", "Jane Smith", "Finance"),
            ("alice.lee", "Alice Lee", "Finance"),
            ("bob.wilson", "Bob Wilson", "Sales"),
        ] {
            engine
                .create_principal(&ctx, NewPrincipal::new(id, name).department(department))
                .unwrap();
        }
        engine.bus.subscribe()
    }

    #[test]
    fn operation_context_carries_source() {
        let ctx = admin();
        assert_eq!(ctx.actor, PrincipalId::new("admin"));
        assert_eq!(ctx.source_address.as_deref(), Some("10.0.0.1"));
        assert_eq!(OperationContext::system().actor.as_str(), "system");
    }

    #[test]
    fn audit_events_carry_actor_and_source() {
        let (engine, _) = engine();
        seeded(&engine);
        engine
            .revoke(&admin(), &PrincipalId::new("john.doe"), &RoleId::new("ROLE_USER"))
            .unwrap();
        engine
            .assign(&admin(), &PrincipalId::new("john.doe"), &RoleId::new("ROLE_USER"), None, Default::default())
            .unwrap();

        let page = engine
            .audit_query(
                &AuditFilter {
                    category: Some(AuditCategory::RoleChange),
                    principal: Some(PrincipalId::new("john.doe")),
                    ..Default::default()
                },
                &PageRequest::first(10),
            )
            .unwrap();
        assert_eq!(page.events.len(), 1);
        let event = &page.events[0];
        assert_eq!(event.actor, PrincipalId::new("admin"));
        assert_eq!(event.source_address.as_deref(), Some("10.0.0.1"));
        assert_eq!(event.action, "assign_role");
        assert_eq!(event.details["role"], "ROLE_USER");
    }
}
