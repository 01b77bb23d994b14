use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const DEFAULT_AUDIT_CAPACITY: usize = 100;
pub const DETAILS_MAX_CHARS: usize = 50;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Success,
    Failure,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Success => "success",
            Outcome::Failure => "failure",
        }
    }
}

/// Fields supplied by the caller; id and timestamp are assigned on record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuditRecord {
    pub actor: String,
    pub action: String,
    pub target: String,
    pub outcome: Outcome,
    pub details: String,
}

impl AuditRecord {
    pub fn new(actor: impl Into<String>, action: impl Into<String>, target: impl Into<String>, outcome: Outcome, details: impl Into<String>) -> Self {
        Self { actor: actor.into(), action: action.into(), target: target.into(), outcome, details: details.into() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AuditLogEntry {
    pub log_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub actor: String,
    pub action: String,
    pub target: String,
    pub outcome: Outcome,
    pub details: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct AuditSummary {
    pub total: usize,
    pub successes: usize,
    pub failures: usize,
    pub latest: Option<DateTime<Utc>>,
}

/// Bounded in-memory audit trail, newest entry first.
///
/// Each record is pushed and the oldest entry evicted under a single lock, so
/// concurrent writers never observe more than `capacity` entries.
#[derive(Debug)]
pub struct AuditLog {
    entries: Mutex<VecDeque<AuditLogEntry>>,
    capacity: usize,
}

impl Default for AuditLog {
    fn default() -> Self { Self::new() }
}

impl AuditLog {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_AUDIT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self { entries: Mutex::new(VecDeque::with_capacity(capacity + 1)), capacity }
    }

    pub fn capacity(&self) -> usize { self.capacity }

    pub fn record(&self, record: AuditRecord) {
        let entry = AuditLogEntry {
            log_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            actor: record.actor,
            action: record.action,
            target: record.target,
            outcome: record.outcome,
            details: record.details,
        };
        tracing::debug!(actor = %entry.actor, action = %entry.action, target = %entry.target, outcome = entry.outcome.as_str(), "audit");
        crate::telemetry::record_audit(entry.outcome);
        let mut entries = self.lock();
        entries.push_front(entry);
        while entries.len() > self.capacity {
            entries.pop_back();
        }
    }

    pub fn list(&self) -> Vec<AuditLogEntry> {
        self.lock().iter().cloned().collect()
    }

    pub fn recent(&self, n: usize) -> Vec<AuditLogEntry> {
        self.lock().iter().take(n).cloned().collect()
    }

    pub fn len(&self) -> usize { self.lock().len() }

    pub fn is_empty(&self) -> bool { self.lock().is_empty() }

    pub fn summary(&self) -> AuditSummary {
        let entries = self.lock();
        let failures = entries.iter().filter(|e| e.outcome == Outcome::Failure).count();
        AuditSummary {
            total: entries.len(),
            successes: entries.len() - failures,
            failures,
            latest: entries.front().map(|e| e.timestamp),
        }
    }

    // A panic elsewhere must not make recording fail.
    fn lock(&self) -> MutexGuard<'_, VecDeque<AuditLogEntry>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// First `max_chars` characters of `text`, split on a char boundary.
pub fn truncate_details(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}
