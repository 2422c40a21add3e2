//! Audit recorder: append-only log of every governed action.

mod log;
mod model;
mod query;
mod recorder;

pub use log::{AuditLog, AuditWriteError, InMemoryAuditLog};
pub use model::{AuditCategory, AuditEvent, AuditOutcome};
pub use query::{AuditCursor, AuditFilter, AuditIter, AuditPage, PageRequest, select_page};
pub use recorder::{AuditRecorder, AuditStats};

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::{Arc, Condvar, Mutex};

    use accessgate_core::{DomainError, DomainResult, PrincipalId};
    use chrono::{DateTime, Duration, TimeZone, Utc};

    fn t(minute: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap() + Duration::minutes(minute)
    }

    fn event(minute: i64, actor: &'static str, outcome: AuditOutcome) -> AuditEvent {
        AuditEvent::new(
            t(minute),
            PrincipalId::new(actor),
            AuditCategory::Authorization,
            "authorize",
            outcome,
            "SYSTEM_CONFIG",
        )
    }

    #[test]
    fn query_orders_by_timestamp_then_sequence() {
        let log = InMemoryAuditLog::new();
        log.append(event(5, "a", AuditOutcome::Success)).unwrap();
        log.append(event(1, "b", AuditOutcome::Denied)).unwrap();
        log.append(event(5, "c", AuditOutcome::Success)).unwrap();

        let page = log.query(&AuditFilter::default(), &PageRequest::first(10)).unwrap();
        let actors: Vec<_> = page.events.iter().map(|e| e.actor.as_str().to_string()).collect();
        assert_eq!(actors, vec!["b", "a", "c"]);
        assert!(!page.has_more);
        assert!(page.next_cursor.is_none());
    }

    #[test]
    fn filters_combine() {
        let log = InMemoryAuditLog::new();
        log.append(event(1, "john.doe", AuditOutcome::Denied)).unwrap();
        log.append(event(2, "john.doe", AuditOutcome::Success)).unwrap();
        log.append(event(3, "jane.smith", AuditOutcome::Denied)).unwrap();

        let filter = AuditFilter {
            principal: Some(PrincipalId::new("john.doe")),
            outcome: Some(AuditOutcome::Denied),
            ..Default::default()
        };
        let page = log.query(&filter, &PageRequest::first(10)).unwrap();
        assert_eq!(page.events.len(), 1);
        assert_eq!(page.events[0].timestamp, t(1));

        let window = AuditFilter {
            from: Some(t(2)),
            to: Some(t(3)),
            ..Default::default()
        };
        assert_eq!(log.query(&window, &PageRequest::first(10)).unwrap().events.len(), 1);
    }

    #[test]
    fn cursor_pages_are_restartable() {
        let log = InMemoryAuditLog::new();
        for minute in 0..5 {
            log.append(event(minute, "a", AuditOutcome::Success)).unwrap();
        }

        let first = log.query(&AuditFilter::default(), &PageRequest::first(2)).unwrap();
        assert!(first.has_more);
        let cursor = first.next_cursor.clone().unwrap();

        let second = log
            .query(&AuditFilter::default(), &PageRequest::after(2, cursor.clone()))
            .unwrap();
        let again = log
            .query(&AuditFilter::default(), &PageRequest::after(2, cursor))
            .unwrap();
        assert_eq!(second, again);
        assert_eq!(second.events[0].timestamp, t(2));

        let bad = log.query(&AuditFilter::default(), &PageRequest::after(2, AuditCursor::new("nope")));
        assert!(matches!(bad, Err(DomainError::Validation(_))));
    }

    #[test]
    fn iterator_walks_every_page_lazily() {
        let log = InMemoryAuditLog::new();
        for minute in 0..7 {
            log.append(event(minute, "a", AuditOutcome::Success)).unwrap();
        }

        let all: DomainResult<Vec<_>> = AuditIter::new(&log, AuditFilter::default(), 3).collect();
        let sequences: Vec<u64> = all.unwrap().iter().map(|e| e.sequence).collect();
        assert_eq!(sequences, (1..=7).collect::<Vec<_>>());

        let first_two: Vec<_> = AuditIter::new(&log, AuditFilter::default(), 3).take(2).collect();
        assert_eq!(first_two.len(), 2);
    }

    #[test]
    fn recorder_flushes_before_query() {
        let log = Arc::new(InMemoryAuditLog::new());
        let recorder = AuditRecorder::spawn(log.clone(), 4);

        for minute in 0..20 {
            recorder.record(event(minute, "a", AuditOutcome::Success));
        }

        let page = recorder.query(&AuditFilter::default(), &PageRequest::first(100)).unwrap();
        assert_eq!(page.events.len(), 20);
        assert_eq!(recorder.stats(), AuditStats { written: 20, failed: 0 });
    }

    struct BrokenLog;

    impl AuditLog for BrokenLog {
        fn append(&self, _event: AuditEvent) -> Result<AuditEvent, AuditWriteError> {
            Err(AuditWriteError::Unavailable("disk full".to_string()))
        }

        fn query(&self, _filter: &AuditFilter, _page: &PageRequest) -> DomainResult<AuditPage> {
            Ok(AuditPage {
                events: vec![],
                next_cursor: None,
                has_more: false,
            })
        }
    }

    #[test]
    fn write_failures_are_counted_not_propagated() {
        let recorder = AuditRecorder::spawn(Arc::new(BrokenLog), 8);
        recorder.record(event(0, "a", AuditOutcome::Success));
        recorder.record(event(1, "a", AuditOutcome::Success));
        recorder.flush();

        assert_eq!(recorder.stats(), AuditStats { written: 0, failed: 2 });
    }

    /// Log whose writes wait while the gate is closed.
    #[derive(Debug, Default)]
    pub(crate) struct GatedLog {
        pub(crate) inner: InMemoryAuditLog,
        closed: Mutex<bool>,
        opened: Condvar,
    }

    impl GatedLog {
        pub(crate) fn close(&self) {
            *self.closed.lock().unwrap() = true;
        }

        pub(crate) fn open(&self) {
            *self.closed.lock().unwrap() = false;
            self.opened.notify_all();
        }
    }

    impl AuditLog for GatedLog {
        fn append(&self, event: AuditEvent) -> Result<AuditEvent, AuditWriteError> {
            let mut closed = self.closed.lock().unwrap();
            while *closed {
                closed = self.opened.wait(closed).unwrap();
            }
            drop(closed);
            self.inner.append(event)
        }

        fn query(&self, filter: &AuditFilter, page: &PageRequest) -> DomainResult<AuditPage> {
            self.inner.query(filter, page)
        }
    }

    #[test]
    fn try_record_drops_rather_than_waits_on_a_full_queue() {
        let log = Arc::new(GatedLog::default());
        let recorder = AuditRecorder::spawn(log.clone(), 1);
        log.close();

        for minute in 0..5 {
            recorder.try_record(event(minute, "a", AuditOutcome::Denied));
        }
        // One event can sit in the worker and one in the queue.
        assert!(recorder.stats().failed >= 3);

        log.open();
        recorder.flush();
        let stats = recorder.stats();
        assert_eq!(stats.written + stats.failed, 5);
        assert_eq!(log.inner.len() as u64, stats.written);
    }
}
