//! Job orchestrator: accepts requests, runs them as retryable jobs and
//! reports progress.
//!
//! The dispatch loop wakes on queue readiness, a finished worker or the poll
//! interval. A semaphore bounds how many jobs are processing at once.

mod worker;

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::Utc;
use opentelemetry::KeyValue;
use tokio::sync::{Notify, Semaphore, broadcast};
use tokio::task::JoinSet;
use tracing::{error, info};

use crate::config::{Config, GenerationPolicy};
use crate::error::{Error, Result};
use crate::event::{EventBus, JobEvent, JobEventKind};
use crate::model::{CaseId, GenerationJob, GenerationRequest, JobId, JobStatus, MysteryCase};
use crate::pipeline::CaseGenerator;
use crate::provider::ProviderRegistry;
use crate::queue::WorkQueue;
use crate::store::CaseStore;
use crate::telemetry::metrics;
use crate::validate::{QualityValidator, UniquenessValidator};

/// Where seeds come from for requests that do not pin one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeedSource {
    Entropy,
    /// `start`, `start + 1`, ... in submission order.
    Sequence { start: u64 },
}

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub max_concurrent: usize,
    pub max_attempts: u32,
    /// Wall-clock budget for one attempt.
    pub job_timeout: Duration,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
    /// Fallback wake-up when no queue notification arrives.
    pub poll_interval: Duration,
    pub seeds: SeedSource,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 4,
            max_attempts: 3,
            job_timeout: Duration::from_secs(60),
            backoff_base: Duration::from_millis(500),
            backoff_max: Duration::from_secs(60),
            poll_interval: Duration::from_secs(1),
            seeds: SeedSource::Entropy,
        }
    }
}

impl OrchestratorConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_concurrent: config.max_concurrent,
            max_attempts: config.max_attempts,
            job_timeout: config.job_timeout,
            backoff_base: config.backoff_base,
            ..Self::default()
        }
    }

    /// `base * 2^(attempt-1)`, capped at `backoff_max`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(20);
        self.backoff_base
            .saturating_mul(1u32 << exp)
            .min(self.backoff_max)
    }
}

/// Handle to a running orchestrator. Cheap to clone.
#[derive(Clone)]
pub struct JobOrchestrator {
    inner: Arc<Inner>,
}

struct Inner {
    generator: Arc<CaseGenerator>,
    providers: ProviderRegistry,
    store: Arc<dyn CaseStore>,
    queue: Arc<dyn WorkQueue>,
    quality: QualityValidator,
    uniqueness: UniquenessValidator,
    config: OrchestratorConfig,
    events: EventBus,
    shutdown: Notify,
    next_seed: AtomicU64,
}

impl JobOrchestrator {
    pub fn new(
        generator: Arc<CaseGenerator>,
        providers: ProviderRegistry,
        store: Arc<dyn CaseStore>,
        queue: Arc<dyn WorkQueue>,
        policy: &GenerationPolicy,
        config: OrchestratorConfig,
    ) -> Self {
        let start = match config.seeds {
            SeedSource::Entropy => 0,
            SeedSource::Sequence { start } => start,
        };
        Self {
            inner: Arc::new(Inner {
                generator,
                providers,
                store,
                queue,
                quality: QualityValidator::new(policy.quality.clone()),
                uniqueness: UniquenessValidator::new(policy.min_uniqueness),
                config,
                events: EventBus::default(),
                shutdown: Notify::new(),
                next_seed: AtomicU64::new(start),
            }),
        }
    }

    /// Persist a pending job and queue it.
    ///
    /// Malformed requests are rejected here and never become jobs.
    pub async fn submit(&self, request: GenerationRequest) -> Result<GenerationJob> {
        request.validate()?;
        let seed = request
            .constraints
            .seed
            .unwrap_or_else(|| self.inner.next_seed());
        let job = GenerationJob::new(request, seed);

        self.inner.store.create_job(&job).await?;
        self.inner.queue.enqueue(job.id).await?;

        metrics::jobs_submitted().add(
            1,
            &[
                KeyValue::new("subject", job.request.subject.to_string()),
                KeyValue::new("difficulty", job.request.difficulty.to_string()),
            ],
        );
        info!(job_id = %job.id, seed, "job submitted");
        self.inner
            .events
            .emit(job.id, JobEventKind::Submitted { seed });
        Ok(job)
    }

    pub async fn status(&self, id: JobId) -> Result<GenerationJob> {
        self.inner
            .store
            .get_job(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("job {id}")))
    }

    pub async fn fetch_case(&self, id: CaseId) -> Result<MysteryCase> {
        self.inner
            .store
            .get_case(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("case {id}")))
    }

    /// Cancel a pending or processing job.
    ///
    /// A processing attempt is not interrupted; its result is discarded.
    pub async fn cancel(&self, id: JobId) -> Result<GenerationJob> {
        loop {
            let mut job = self.status(id).await?;
            let from = job.status;
            if from.is_terminal() {
                return Err(Error::InvalidTransition {
                    from: from.to_string(),
                    to: JobStatus::Cancelled.to_string(),
                });
            }
            let now = Utc::now();
            job.status = JobStatus::Cancelled;
            job.updated_at = now;
            job.finished_at = Some(now);
            if self.inner.store.update_job(&job, from).await? {
                info!(job_id = %id, %from, "job cancelled");
                self.inner.transitioned(&job, from);
                return Ok(job);
            }
            // Lost a race with a worker; look again.
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.inner.events.subscribe()
    }

    /// Wait until the job reaches a terminal status.
    pub async fn await_terminal(&self, id: JobId, timeout: Duration) -> Result<GenerationJob> {
        let mut events = self.subscribe();
        let wait = async {
            loop {
                let job = self.status(id).await?;
                if job.status.is_terminal() {
                    return Ok(job);
                }
                loop {
                    match events.recv().await {
                        Ok(event) if event.job_id == id && event.kind.is_terminal() => break,
                        Ok(_) => continue,
                        Err(broadcast::error::RecvError::Lagged(_)) => break,
                        Err(broadcast::error::RecvError::Closed) => {
                            return Err(Error::Other("event stream closed".to_string()));
                        }
                    }
                }
            }
        };
        tokio::time::timeout(timeout, wait)
            .await
            .map_err(|_| Error::Timeout(timeout))?
    }

    /// Run the dispatch loop until [`shutdown`](Self::shutdown).
    ///
    /// Workers still running at shutdown are awaited before returning.
    pub async fn run(&self) -> Result<()> {
        let semaphore = Arc::new(Semaphore::new(self.inner.config.max_concurrent));
        let mut workers = JoinSet::new();
        info!(
            max_concurrent = self.inner.config.max_concurrent,
            "orchestrator started"
        );

        loop {
            while let Ok(permit) = Arc::clone(&semaphore).try_acquire_owned() {
                match self.inner.queue.dequeue().await {
                    Ok(Some(msg)) => {
                        let inner = Arc::clone(&self.inner);
                        workers.spawn(async move {
                            let _permit = permit;
                            inner.process(msg).await;
                        });
                    }
                    Ok(None) => break,
                    Err(e) => {
                        error!("dequeue failed: {e}");
                        break;
                    }
                }
            }

            tokio::select! {
                _ = self.inner.shutdown.notified() => {
                    info!(in_flight = workers.len(), "orchestrator shutting down");
                    break;
                }
                _ = self.inner.queue.ready() => {}
                Some(result) = workers.join_next(), if !workers.is_empty() => {
                    if let Err(e) = result {
                        error!("job worker crashed: {e}");
                    }
                }
                _ = tokio::time::sleep(self.inner.config.poll_interval) => {}
            }
        }

        while let Some(result) = workers.join_next().await {
            if let Err(e) = result {
                error!("job worker crashed: {e}");
            }
        }
        Ok(())
    }

    /// Run the dispatch loop on a background task.
    pub fn start(&self) -> tokio::task::JoinHandle<Result<()>> {
        let this = self.clone();
        tokio::spawn(async move { this.run().await })
    }

    /// Signal the dispatch loop to stop.
    pub fn shutdown(&self) {
        self.inner.shutdown.notify_one();
    }
}

impl Inner {
    fn next_seed(&self) -> u64 {
        match self.config.seeds {
            SeedSource::Entropy => rand::random(),
            SeedSource::Sequence { .. } => self.next_seed.fetch_add(1, Ordering::Relaxed),
        }
    }

    /// Events and metrics for a status change already written to the store.
    fn transitioned(&self, job: &GenerationJob, from: JobStatus) {
        metrics::job_state_transitions().add(
            1,
            &[
                KeyValue::new("from", from.to_string()),
                KeyValue::new("to", job.status.to_string()),
            ],
        );
        self.events.emit(
            job.id,
            JobEventKind::StatusChanged {
                from,
                to: job.status,
                attempt: job.attempts,
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_and_caps() {
        let config = OrchestratorConfig {
            backoff_base: Duration::from_millis(100),
            backoff_max: Duration::from_millis(500),
            ..OrchestratorConfig::default()
        };
        assert_eq!(config.backoff(1), Duration::from_millis(100));
        assert_eq!(config.backoff(2), Duration::from_millis(200));
        assert_eq!(config.backoff(3), Duration::from_millis(400));
        assert_eq!(config.backoff(4), Duration::from_millis(500));
        assert_eq!(config.backoff(40), Duration::from_millis(500));
    }
}
