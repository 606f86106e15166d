//! pgmq-backed queue via direct SQLx.
//!
//! Calls pgmq's SQL functions (`pgmq.send`, `pgmq.read`, `pgmq.archive`,
//! `pgmq.set_vt`) and wakes workers with LISTEN/NOTIFY.

use std::time::Duration;

use async_trait::async_trait;
use opentelemetry::KeyValue;
use sqlx::PgPool;
use sqlx::postgres::PgListener;
use tokio::sync::Mutex;
use tracing::warn;
use uuid::Uuid;

use super::{QueueMessage, WorkQueue};
use crate::error::{Error, Result};
use crate::model::JobId;
use crate::telemetry::metrics;

pub const DEFAULT_QUEUE: &str = "generation_jobs";

/// NOTIFY channel carrying the job id of every enqueued job.
const READY_CHANNEL: &str = "generation_jobs_ready";

pub struct PgmqQueue {
    pool: PgPool,
    queue: String,
    /// Seconds a read message stays invisible to other readers.
    visibility_timeout: i32,
    listener: Mutex<Option<PgListener>>,
}

impl PgmqQueue {
    /// Connect a NOTIFY listener and make sure the queue exists.
    pub async fn connect(pool: PgPool, queue: &str, visibility_timeout: Duration) -> Result<Self> {
        sqlx::query("SELECT pgmq.create($1)")
            .bind(queue)
            .execute(&pool)
            .await?;
        let mut listener = PgListener::connect_with(&pool).await?;
        listener.listen(READY_CHANNEL).await?;
        let q = Self {
            pool,
            queue: queue.to_string(),
            visibility_timeout: i32::try_from(visibility_timeout.as_secs()).unwrap_or(i32::MAX),
            listener: Mutex::new(Some(listener)),
        };
        q.count("create");
        Ok(q)
    }

    fn count(&self, operation: &'static str) {
        metrics::queue_operations().add(
            1,
            &[
                KeyValue::new("queue", self.queue.clone()),
                KeyValue::new("operation", operation),
            ],
        );
    }
}

#[async_trait]
impl WorkQueue for PgmqQueue {
    async fn enqueue(&self, job_id: JobId) -> Result<()> {
        let payload = serde_json::json!({ "job_id": job_id.0.to_string() });
        sqlx::query("SELECT pgmq.send($1, $2, 0)")
            .bind(&self.queue)
            .bind(&payload)
            .execute(&self.pool)
            .await?;
        sqlx::query("SELECT pg_notify($1, $2)")
            .bind(READY_CHANNEL)
            .bind(job_id.0.to_string())
            .execute(&self.pool)
            .await?;
        self.count("send");
        Ok(())
    }

    async fn dequeue(&self) -> Result<Option<QueueMessage>> {
        let row = sqlx::query_as::<_, (i64, i32, serde_json::Value)>(
            "SELECT msg_id, read_ct, message FROM pgmq.read($1, $2, 1)",
        )
        .bind(&self.queue)
        .bind(self.visibility_timeout)
        .fetch_optional(&self.pool)
        .await?;

        let Some((msg_id, read_ct, message)) = row else {
            self.count("read_empty");
            return Ok(None);
        };
        self.count("read");

        let job_id = message
            .get("job_id")
            .and_then(|v| v.as_str())
            .and_then(|s| Uuid::parse_str(s).ok())
            .ok_or_else(|| {
                Error::Other(format!("bad pgmq payload in message {msg_id}: missing job_id"))
            })?;

        Ok(Some(QueueMessage {
            msg_id,
            job_id: JobId(job_id),
            read_count: u32::try_from(read_ct).unwrap_or(0),
        }))
    }

    /// Archived rather than deleted, for audit.
    async fn ack(&self, msg: &QueueMessage) -> Result<()> {
        sqlx::query("SELECT pgmq.archive($1, $2)")
            .bind(&self.queue)
            .bind(msg.msg_id)
            .execute(&self.pool)
            .await?;
        self.count("archive");
        Ok(())
    }

    async fn retry(&self, msg: &QueueMessage, delay: Duration) -> Result<()> {
        let delay = i32::try_from(delay.as_secs().max(1)).unwrap_or(i32::MAX);
        sqlx::query("SELECT msg_id FROM pgmq.set_vt($1, $2, $3)")
            .bind(&self.queue)
            .bind(msg.msg_id)
            .bind(delay)
            .execute(&self.pool)
            .await?;
        self.count("set_vt");
        Ok(())
    }

    async fn ready(&self) {
        let mut guard = self.listener.lock().await;
        let Some(listener) = guard.as_mut() else {
            return std::future::pending().await;
        };
        if let Err(e) = listener.recv().await {
            warn!("PgListener error: {e}, falling back to poll");
            *guard = None;
        }
    }
}
