//! Buffered audit recording off the critical path.
//!
//! Events go through one FIFO queue drained by a worker thread, so the order
//! in which callers record is the order in which the log receives them.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, SyncSender, TrySendError};
use std::sync::{Arc, Mutex};
use std::thread;

use serde::Serialize;

use accessgate_core::DomainResult;

use super::log::{AuditLog, AuditWriteError};
use super::model::AuditEvent;
use super::query::{AuditFilter, AuditIter, AuditPage, PageRequest};

enum Message {
    Record(AuditEvent),
    Flush(mpsc::Sender<()>),
}

/// Delivery counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AuditStats {
    pub written: u64,
    pub failed: u64,
}

#[derive(Debug, Default)]
struct Counters {
    written: AtomicU64,
    failed: AtomicU64,
}

impl Counters {
    fn write(&self, log: &dyn AuditLog, event: AuditEvent) {
        let id = event.id;
        match log.append(event) {
            Ok(_) => {
                self.written.fetch_add(1, Ordering::Relaxed);
            }
            Err(err) => {
                self.failed.fetch_add(1, Ordering::Relaxed);
                tracing::error!(error = %err, audit_event_id = %id, "audit write failed");
            }
        }
    }
}

/// Handle to the audit queue.
///
/// `record` never fails the caller. When the worker thread cannot be started
/// the recorder degrades to synchronous writes.
pub struct AuditRecorder {
    log: Arc<dyn AuditLog>,
    sender: Mutex<Option<SyncSender<Message>>>,
    worker: Mutex<Option<thread::JoinHandle<()>>>,
    counters: Arc<Counters>,
}

impl AuditRecorder {
    pub fn spawn(log: Arc<dyn AuditLog>, capacity: usize) -> Self {
        let counters = Arc::new(Counters::default());
        let (tx, rx) = mpsc::sync_channel::<Message>(capacity.max(1));

        let worker_log = log.clone();
        let worker_counters = counters.clone();
        let spawned = thread::Builder::new()
            .name("audit-recorder".to_string())
            .spawn(move || {
                for message in rx {
                    match message {
                        Message::Record(event) => worker_counters.write(worker_log.as_ref(), event),
                        Message::Flush(done) => {
                            let _ = done.send(());
                        }
                    }
                }
            });

        let (sender, worker) = match spawned {
            Ok(handle) => (Some(tx), Some(handle)),
            Err(err) => {
                tracing::error!(error = %err, "audit worker failed to start; recording synchronously");
                (None, None)
            }
        };

        Self {
            log,
            sender: Mutex::new(sender),
            worker: Mutex::new(worker),
            counters,
        }
    }

    /// Queue `event` for the log.
    ///
    /// Applies backpressure (blocks) only when the queue is full.
    pub fn record(&self, event: AuditEvent) {
        let sender = match self.sender.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };

        let Some(sender) = sender else {
            self.counters.write(self.log.as_ref(), event);
            return;
        };

        match sender.try_send(Message::Record(event)) {
            Ok(()) => {}
            Err(TrySendError::Full(message)) => {
                tracing::warn!("audit queue full; waiting for the worker");
                if sender.send(message).is_err() {
                    self.report_closed();
                }
            }
            Err(TrySendError::Disconnected(_)) => self.report_closed(),
        }
    }

    /// Queue `event` without ever waiting. A full queue drops the event; the
    /// drop is logged and counted as a failed write.
    pub fn try_record(&self, event: AuditEvent) {
        let sender = match self.sender.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };

        let Some(sender) = sender else {
            self.counters.write(self.log.as_ref(), event);
            return;
        };

        match sender.try_send(Message::Record(event)) {
            Ok(()) => {}
            Err(TrySendError::Full(Message::Record(event))) => {
                self.counters.failed.fetch_add(1, Ordering::Relaxed);
                tracing::error!(
                    error = %AuditWriteError::QueueFull,
                    audit_event_id = %event.id,
                    "audit write failed"
                );
            }
            Err(TrySendError::Full(_)) => {}
            Err(TrySendError::Disconnected(_)) => self.report_closed(),
        }
    }

    fn report_closed(&self) {
        self.counters.failed.fetch_add(1, Ordering::Relaxed);
        tracing::error!(error = %AuditWriteError::QueueClosed, "audit write failed");
    }

    /// Block until every event recorded before this call has reached the log.
    pub fn flush(&self) {
        let sender = match self.sender.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        let Some(sender) = sender else {
            return;
        };

        let (done_tx, done_rx) = mpsc::channel();
        if sender.send(Message::Flush(done_tx)).is_ok() {
            let _ = done_rx.recv();
        }
    }

    /// Query with read-your-writes: pending events are flushed first.
    pub fn query(&self, filter: &AuditFilter, page: &PageRequest) -> DomainResult<AuditPage> {
        self.flush();
        self.log.query(filter, page)
    }

    /// Lazy iterator over all matching events (flushes first).
    pub fn iter(&self, filter: AuditFilter, page_size: u32) -> AuditIter<'_, dyn AuditLog> {
        self.flush();
        AuditIter::new(self.log.as_ref(), filter, page_size)
    }

    pub fn stats(&self) -> AuditStats {
        AuditStats {
            written: self.counters.written.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
        }
    }

    /// Drain the queue and stop the worker.
    pub fn shutdown(&self) {
        let sender = match self.sender.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        drop(sender);

        let worker = match self.worker.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(handle) = worker {
            let _ = handle.join();
        }
    }
}

impl Drop for AuditRecorder {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl core::fmt::Debug for AuditRecorder {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AuditRecorder")
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}
