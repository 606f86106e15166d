//! In-process queue for tests, the `generate` command and single-node use.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;

use super::{QueueMessage, WorkQueue};
use crate::error::Result;
use crate::model::JobId;

#[derive(Debug, Default)]
struct Shared {
    messages: Mutex<VecDeque<QueueMessage>>,
    notify: Notify,
}

impl Shared {
    fn push(&self, msg: QueueMessage) {
        self.messages
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(msg);
        self.notify.notify_one();
    }
}

#[derive(Debug, Default)]
pub struct ChannelQueue {
    shared: std::sync::Arc<Shared>,
    next_id: AtomicI64,
}

impl ChannelQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages waiting for delivery. Delayed retries are not counted.
    pub fn len(&self) -> usize {
        self.shared
            .messages
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl WorkQueue for ChannelQueue {
    async fn enqueue(&self, job_id: JobId) -> Result<()> {
        let msg_id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        self.shared.push(QueueMessage {
            msg_id,
            job_id,
            read_count: 0,
        });
        Ok(())
    }

    async fn dequeue(&self) -> Result<Option<QueueMessage>> {
        let mut messages = self
            .shared
            .messages
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        Ok(messages.pop_front().map(|mut msg| {
            msg.read_count += 1;
            msg
        }))
    }

    async fn ack(&self, _msg: &QueueMessage) -> Result<()> {
        Ok(())
    }

    async fn retry(&self, msg: &QueueMessage, delay: Duration) -> Result<()> {
        let shared = std::sync::Arc::clone(&self.shared);
        let msg = msg.clone();
        if delay.is_zero() {
            shared.push(msg);
        } else {
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                shared.push(msg);
            });
        }
        Ok(())
    }

    async fn ready(&self) {
        self.shared.notify.notified().await;
    }
}
