//! Events emitted to collaborators after a mutation commits.

use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A state transition other subsystems care about.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ProgressEvent {
    CourseCompleted {
        user_id: String,
        course_id: String,
        completed_at: DateTime<Utc>,
    },
    CertificateIssued {
        user_id: String,
        course_id: String,
        certificate_id: Uuid,
        issued_at: DateTime<Utc>,
    },
}

impl ProgressEvent {
    pub fn user_id(&self) -> &str {
        match self {
            ProgressEvent::CourseCompleted { user_id, .. }
            | ProgressEvent::CertificateIssued { user_id, .. } => user_id,
        }
    }

    pub fn course_id(&self) -> &str {
        match self {
            ProgressEvent::CourseCompleted { course_id, .. }
            | ProgressEvent::CertificateIssued { course_id, .. } => course_id,
        }
    }
}

/// Receiver of progress events.
pub trait EventSink: Send + Sync {
    fn publish(&self, event: &ProgressEvent);
}

/// Discards every event.
pub struct NoopSink;

impl EventSink for NoopSink {
    fn publish(&self, _: &ProgressEvent) {}
}

/// Logs every event through `tracing`.
pub struct LogSink;

impl EventSink for LogSink {
    fn publish(&self, event: &ProgressEvent) {
        match event {
            ProgressEvent::CourseCompleted {
                user_id,
                course_id,
                completed_at,
            } => tracing::info!(%user_id, %course_id, %completed_at, "course completed"),
            ProgressEvent::CertificateIssued {
                user_id,
                course_id,
                certificate_id,
                ..
            } => tracing::info!(%user_id, %course_id, %certificate_id, "certificate issued"),
        }
    }
}

/// Keeps every event in memory, in publication order.
#[derive(Default)]
pub struct CollectingSink {
    events: Mutex<Vec<ProgressEvent>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the events published so far.
    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl EventSink for CollectingSink {
    fn publish(&self, event: &ProgressEvent) {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(event.clone());
    }
}
