//! Work queues feeding the orchestrator.
//!
//! A queue only carries job ids. Job state lives in the
//! [`CaseStore`](crate::store::CaseStore); a message is acknowledged once
//! its job reaches a terminal status, or re-queued with a delay for a retry.

pub mod channel;
pub mod pgmq;

pub use channel::ChannelQueue;
pub use pgmq::PgmqQueue;

use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;
use crate::model::JobId;

/// A message handed to a worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueMessage {
    pub msg_id: i64,
    pub job_id: JobId,
    /// Deliveries so far, including this one.
    pub read_count: u32,
}

#[async_trait]
pub trait WorkQueue: Send + Sync {
    async fn enqueue(&self, job_id: JobId) -> Result<()>;

    /// Next visible message, or `None` when the queue is empty.
    async fn dequeue(&self) -> Result<Option<QueueMessage>>;

    /// Remove a message for good.
    async fn ack(&self, msg: &QueueMessage) -> Result<()>;

    /// Hide a message for `delay`, then deliver it again.
    async fn retry(&self, msg: &QueueMessage, delay: Duration) -> Result<()>;

    /// Resolves when new work may be available. May resolve spuriously.
    async fn ready(&self);
}
