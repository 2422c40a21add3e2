//! Audit query interface: filters, cursor pagination and a lazy iterator.
//!
//! Results are ordered by `(timestamp, sequence)` ascending. The cursor names
//! the position of the last returned event, so a page can be re-fetched from
//! any cursor at any time (restartable), and events appended later with a
//! later timestamp simply show up on subsequent pages.

use std::collections::VecDeque;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use accessgate_core::{DomainError, DomainResult, PrincipalId};

use super::log::AuditLog;
use super::model::{AuditCategory, AuditEvent, AuditOutcome};

/// Filter criteria for audit queries. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditFilter {
    /// Inclusive lower bound.
    pub from: Option<DateTime<Utc>>,
    /// Exclusive upper bound.
    pub to: Option<DateTime<Utc>>,
    /// Matches the actor or the subject.
    pub principal: Option<PrincipalId>,
    pub category: Option<AuditCategory>,
    pub outcome: Option<AuditOutcome>,
}

impl AuditFilter {
    pub fn matches(&self, event: &AuditEvent) -> bool {
        self.from.is_none_or(|from| event.timestamp >= from)
            && self.to.is_none_or(|to| event.timestamp < to)
            && self.principal.as_ref().is_none_or(|p| event.involves(p))
            && self.category.is_none_or(|c| event.category == c)
            && self.outcome.is_none_or(|o| event.outcome == o)
    }
}

/// Opaque position in the `(timestamp, sequence)` order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AuditCursor(String);

impl AuditCursor {
    pub fn after(event: &AuditEvent) -> Self {
        Self(format!(
            "{}~{}",
            event.timestamp.to_rfc3339_opts(SecondsFormat::Nanos, true),
            event.sequence
        ))
    }

    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn position(&self) -> DomainResult<(DateTime<Utc>, u64)> {
        let invalid = || DomainError::validation(format!("invalid audit cursor '{}'", self.0));
        let (ts, seq) = self.0.rsplit_once('~').ok_or_else(invalid)?;
        let ts = DateTime::parse_from_rfc3339(ts).map_err(|_| invalid())?;
        let seq = seq.parse::<u64>().map_err(|_| invalid())?;
        Ok((ts.with_timezone(&Utc), seq))
    }
}

/// Pagination parameters for audit queries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    pub limit: u32,
    #[serde(default)]
    pub cursor: Option<AuditCursor>,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            limit: 50,
            cursor: None,
        }
    }
}

impl PageRequest {
    pub fn first(limit: u32) -> Self {
        Self {
            limit: limit.max(1),
            cursor: None,
        }
    }

    pub fn after(limit: u32, cursor: AuditCursor) -> Self {
        Self {
            limit: limit.max(1),
            cursor: Some(cursor),
        }
    }
}

/// One page of audit results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditPage {
    pub events: Vec<AuditEvent>,
    /// Cursor to pass for the following page (`None` when exhausted).
    pub next_cursor: Option<AuditCursor>,
    pub has_more: bool,
}

/// Select one page out of `events` (any order) according to `filter`/`page`.
pub fn select_page<'a, I>(events: I, filter: &AuditFilter, page: &PageRequest) -> DomainResult<AuditPage>
where
    I: IntoIterator<Item = &'a AuditEvent>,
{
    let after = page.cursor.as_ref().map(AuditCursor::position).transpose()?;

    let mut matching: Vec<&AuditEvent> = events
        .into_iter()
        .filter(|e| filter.matches(e))
        .filter(|e| after.is_none_or(|pos| (e.timestamp, e.sequence) > pos))
        .collect();
    matching.sort_by_key(|e| (e.timestamp, e.sequence));

    let limit = page.limit.max(1) as usize;
    let has_more = matching.len() > limit;
    let events: Vec<AuditEvent> = matching.into_iter().take(limit).cloned().collect();
    let next_cursor = if has_more {
        events.last().map(AuditCursor::after)
    } else {
        None
    };

    Ok(AuditPage {
        events,
        next_cursor,
        has_more,
    })
}

/// Lazily walks every matching event, fetching one page at a time.
pub struct AuditIter<'a, L: ?Sized> {
    log: &'a L,
    filter: AuditFilter,
    page_size: u32,
    cursor: Option<AuditCursor>,
    buffer: VecDeque<AuditEvent>,
    exhausted: bool,
}

impl<'a, L> AuditIter<'a, L>
where
    L: AuditLog + ?Sized,
{
    pub fn new(log: &'a L, filter: AuditFilter, page_size: u32) -> Self {
        Self {
            log,
            filter,
            page_size: page_size.max(1),
            cursor: None,
            buffer: VecDeque::new(),
            exhausted: false,
        }
    }

    /// Resume from a cursor obtained from an earlier page.
    pub fn resume(mut self, cursor: AuditCursor) -> Self {
        self.cursor = Some(cursor);
        self
    }

    fn fetch(&mut self) -> DomainResult<()> {
        let request = PageRequest {
            limit: self.page_size,
            cursor: self.cursor.clone(),
        };
        let page = self.log.query(&self.filter, &request)?;
        if let Some(last) = page.events.last() {
            self.cursor = Some(AuditCursor::after(last));
        }
        self.exhausted = !page.has_more;
        self.buffer.extend(page.events);
        Ok(())
    }
}

impl<L> Iterator for AuditIter<'_, L>
where
    L: AuditLog + ?Sized,
{
    type Item = DomainResult<AuditEvent>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.buffer.is_empty() && !self.exhausted {
            if let Err(err) = self.fetch() {
                self.exhausted = true;
                return Some(Err(err));
            }
        }
        self.buffer.pop_front().map(Ok)
    }
}
