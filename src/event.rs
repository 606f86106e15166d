//! Structured events emitted by the orchestrator on every job transition.
//!
//! Consumers subscribe to build progress bars, dashboards or audit logs.
//! Events are the orchestrator's voice; job-scoped logs are the worker's.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::error::ErrorKind;
use crate::model::{CaseId, JobId, JobStatus};

/// A structured event emitted by the orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobEvent {
    /// Monotonic sequence number. Consumers can detect gaps.
    pub seq: u64,
    pub timestamp: DateTime<Utc>,
    pub job_id: JobId,
    pub kind: JobEventKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobEventKind {
    Submitted {
        seed: u64,
    },
    StatusChanged {
        from: JobStatus,
        to: JobStatus,
        attempt: u32,
    },
    Progress {
        progress: u8,
        phase: Option<String>,
    },
    RetryScheduled {
        attempt: u32,
        delay_ms: u64,
        error: String,
    },
    Completed {
        case_id: CaseId,
        duration_ms: u64,
    },
    Failed {
        kind: ErrorKind,
        error: String,
        attempts: u32,
    },
}

impl JobEventKind {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobEventKind::Completed { .. }
                | JobEventKind::Failed { .. }
                | JobEventKind::StatusChanged {
                    to: JobStatus::Cancelled,
                    ..
                }
        )
    }
}

/// Fan-out of job events. Slow subscribers lose old events, never block
/// the orchestrator.
#[derive(Debug)]
pub struct EventBus {
    tx: broadcast::Sender<JobEvent>,
    seq: AtomicU64,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            tx,
            seq: AtomicU64::new(0),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.tx.subscribe()
    }

    pub fn emit(&self, job_id: JobId, kind: JobEventKind) {
        let event = JobEvent {
            seq: self.seq.fetch_add(1, Ordering::Relaxed) + 1,
            timestamp: Utc::now(),
            job_id,
            kind,
        };
        // No subscribers is fine.
        let _ = self.tx.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}
