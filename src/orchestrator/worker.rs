//! One job attempt, from dequeue to a terminal status or a scheduled retry.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use opentelemetry::KeyValue;
use tokio::sync::mpsc;
use tracing::{Instrument, error, info, warn};

use super::Inner;
use crate::error::{Error, Result};
use crate::event::JobEventKind;
use crate::model::{CaseFingerprint, GenerationJob, JobError, JobStatus, MysteryCase};
use crate::provider::CompletionOptions;
use crate::queue::QueueMessage;
use crate::store::Commit;
use crate::telemetry::job::{record_state_transition, start_job_span};
use crate::telemetry::metrics;

const START_PROGRESS: u8 = 5;
const PIPELINE_DONE: u8 = 80;
const TEASER_DONE: u8 = 85;
const VALIDATED: u8 = 95;

const TEASER_SYSTEM: &str = "You write one-sentence teasers for mystery stories read by primary \
school children. Keep it friendly and exciting. Never mention violence or danger.";

enum Attempt {
    /// A validated case, not yet committed.
    Ready(MysteryCase, CaseFingerprint),
    /// The job left `processing` under us, usually through cancellation.
    Abandoned,
}

impl Inner {
    pub(super) async fn process(self: Arc<Self>, msg: QueueMessage) {
        if let Err(e) = self.handle(&msg).await {
            error!(job_id = %msg.job_id, "job handling failed: {e}");
        }
    }

    async fn handle(&self, msg: &QueueMessage) -> Result<()> {
        let Some(mut job) = self.store.get_job(msg.job_id).await? else {
            warn!(job_id = %msg.job_id, "queued job not found, dropping message");
            return self.queue.ack(msg).await;
        };
        if job.status.is_terminal() {
            info!(job_id = %job.id, status = %job.status, "job already terminal, dropping message");
            return self.queue.ack(msg).await;
        }

        // A message for a job still marked processing was redelivered after
        // its worker went away; the attempt is taken over.
        let from = job.status;
        let now = Utc::now();
        job.status = JobStatus::Processing;
        job.attempts += 1;
        job.started_at.get_or_insert(now);
        job.updated_at = now;
        job.advance(START_PROGRESS);
        if !self.store.update_job(&job, from).await? {
            info!(job_id = %job.id, "job changed before it could start, dropping message");
            return self.queue.ack(msg).await;
        }

        let span = start_job_span(&job.id, job.attempts);
        record_state_transition(&span, &from.to_string(), "processing");
        self.transitioned(&job, from);
        self.progressed(&job, None);

        let started = Instant::now();
        let outcome = tokio::time::timeout(self.config.job_timeout, self.attempt(&mut job))
            .instrument(span.clone())
            .await
            .unwrap_or_else(|_| Err(Error::Timeout(self.config.job_timeout)));
        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;

        match outcome {
            Ok(Attempt::Ready(case, fingerprint)) => {
                self.complete(job, msg, case, fingerprint, elapsed_ms, &span)
                    .await
            }
            Ok(Attempt::Abandoned) => {
                span.in_scope(|| info!("job left processing mid-attempt, result discarded"));
                self.queue.ack(msg).await
            }
            Err(e) => self.fail(job, msg, e, elapsed_ms, &span).await,
        }
    }

    async fn attempt(&self, job: &mut GenerationJob) -> Result<Attempt> {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let generator = Arc::clone(&self.generator);
        let request = job.request.clone();
        let seed = job.seed;
        let pipeline = tokio::task::spawn_blocking(move || {
            generator.generate_with_progress(&request, seed, &mut |p| {
                let _ = tx.send((p.phase, p.scaled(START_PROGRESS, PIPELINE_DONE)));
            })
        });

        while let Some((phase, progress)) = rx.recv().await {
            if !self.advance(job, progress, Some(phase)).await? {
                return Ok(Attempt::Abandoned);
            }
        }
        let mut case = pipeline
            .await
            .map_err(|e| Error::Other(format!("pipeline task failed: {e}")))??;

        let options = CompletionOptions {
            system: Some(TEASER_SYSTEM.to_string()),
            max_tokens: 120,
            temperature: 0.8,
        };
        let completion = self.providers.complete(&teaser_prompt(&case), &options).await?;
        info!(
            provider = %completion.provider,
            providers_tried = completion.attempts,
            "teaser written"
        );
        case.narrative.teaser = Some(completion.text);
        if !self.advance(job, TEASER_DONE, None).await? {
            return Ok(Attempt::Abandoned);
        }

        let fingerprint = CaseFingerprint::compute(&case);
        let verdict = self
            .uniqueness
            .assess(&fingerprint, self.store.as_ref())
            .await?;
        if let Some(warning) = &verdict.warning {
            warn!(uniqueness = verdict.uniqueness, "{warning}");
        }
        if let Err(e) = self.quality.validate(&case) {
            if let Error::QualityViolation(violations) = &e {
                for v in violations {
                    metrics::quality_violations()
                        .add(1, &[KeyValue::new("rule", v.rule.to_string())]);
                }
            }
            return Err(e);
        }
        if !self.advance(job, VALIDATED, None).await? {
            return Ok(Attempt::Abandoned);
        }

        Ok(Attempt::Ready(case, fingerprint))
    }

    /// Commit a validated case and complete the job in one store write.
    async fn complete(
        &self,
        job: GenerationJob,
        msg: &QueueMessage,
        case: MysteryCase,
        fingerprint: CaseFingerprint,
        elapsed_ms: f64,
        span: &tracing::Span,
    ) -> Result<()> {
        let mut done = job.clone();
        done.status = JobStatus::Completed;
        done.case_id = Some(case.id);
        done.error = None;
        done.advance(100);
        done.finished_at = Some(Utc::now());
        done.updated_at = Utc::now();

        let commit = match self
            .store
            .commit_case(&done, JobStatus::Processing, &fingerprint, &case)
            .await
        {
            Ok(commit) => commit,
            Err(e) => return self.fail(job, msg, e, elapsed_ms, span).await,
        };
        match commit {
            Commit::Committed => {
                record_state_transition(span, "processing", "completed");
                self.transitioned(&done, JobStatus::Processing);
                self.progressed(&done, None);
                metrics::cases_generated().add(
                    1,
                    &[KeyValue::new("template", case.blueprint.template_id.clone())],
                );
                metrics::job_duration_ms()
                    .record(elapsed_ms, &[KeyValue::new("outcome", "completed")]);
                span.in_scope(|| info!(case_id = %case.id, elapsed_ms, "job completed"));
                self.events.emit(
                    done.id,
                    JobEventKind::Completed {
                        case_id: case.id,
                        duration_ms: elapsed_ms as u64,
                    },
                );
                self.queue.ack(msg).await
            }
            Commit::Stale => {
                span.in_scope(|| warn!(case_id = %case.id, "job left processing, result discarded"));
                self.queue.ack(msg).await
            }
            Commit::Duplicate => {
                metrics::duplicates_rejected().add(1, &[KeyValue::new("reason", "claimed")]);
                let e = Error::DuplicateCase(format!(
                    "combined hash {} was claimed by another case",
                    &fingerprint.combined_hash[..12.min(fingerprint.combined_hash.len())]
                ));
                self.fail(job, msg, e, elapsed_ms, span).await
            }
        }
    }

    /// Raise and persist progress. `false` when the job is no longer ours.
    async fn advance(
        &self,
        job: &mut GenerationJob,
        progress: u8,
        phase: Option<&str>,
    ) -> Result<bool> {
        if !job.advance(progress) {
            return Ok(true);
        }
        if !self.store.update_job(job, JobStatus::Processing).await? {
            return Ok(false);
        }
        self.progressed(job, phase);
        Ok(true)
    }

    fn progressed(&self, job: &GenerationJob, phase: Option<&str>) {
        self.events.emit(
            job.id,
            JobEventKind::Progress {
                progress: job.progress,
                phase: phase.map(str::to_string),
            },
        );
    }

    async fn fail(
        &self,
        mut job: GenerationJob,
        msg: &QueueMessage,
        e: Error,
        elapsed_ms: f64,
        span: &tracing::Span,
    ) -> Result<()> {
        let retry = e.is_retryable() && job.attempts < self.config.max_attempts;
        let message = e.to_string();
        job.error = Some(JobError {
            kind: e.kind(),
            message: message.clone(),
        });
        job.updated_at = Utc::now();

        if retry {
            job.status = JobStatus::Pending;
            if !self.store.update_job(&job, JobStatus::Processing).await? {
                return self.queue.ack(msg).await;
            }
            let delay = self.config.backoff(job.attempts);
            record_state_transition(span, "processing", "pending");
            span.in_scope(|| {
                warn!(error = %message, attempt = job.attempts, delay_ms = delay.as_millis() as u64, "attempt failed, retrying");
            });
            self.transitioned(&job, JobStatus::Processing);
            metrics::job_duration_ms().record(elapsed_ms, &[KeyValue::new("outcome", "retry")]);
            self.events.emit(
                job.id,
                JobEventKind::RetryScheduled {
                    attempt: job.attempts,
                    delay_ms: delay.as_millis() as u64,
                    error: message,
                },
            );
            return self.queue.retry(msg, delay).await;
        }

        job.status = JobStatus::Failed;
        job.finished_at = Some(Utc::now());
        if self.store.update_job(&job, JobStatus::Processing).await? {
            record_state_transition(span, "processing", "failed");
            span.in_scope(|| {
                error!(error = %message, kind = %e.kind(), attempts = job.attempts, "job failed");
            });
            self.transitioned(&job, JobStatus::Processing);
            metrics::job_duration_ms().record(elapsed_ms, &[KeyValue::new("outcome", "failed")]);
            self.events.emit(
                job.id,
                JobEventKind::Failed {
                    kind: e.kind(),
                    error: message,
                    attempts: job.attempts,
                },
            );
        }
        self.queue.ack(msg).await
    }
}

/// Prompt understood by every provider: an instruction followed by
/// `Title:` and `Hook:` lines.
fn teaser_prompt(case: &MysteryCase) -> String {
    let place = case
        .blueprint
        .steps
        .first()
        .map(|s| s.location.as_str())
        .unwrap_or("the school");
    format!(
        "Write a one-sentence teaser for this school mystery.\n\
         Title: {}\n\
         Hook: Something is wrong with {} near the {}, and {} people were nearby.\n",
        case.narrative.title,
        case.blueprint.target,
        place,
        case.suspects.len()
    )
}
