//! Integration tests for the job orchestrator over the in-memory store and
//! channel queue.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use casegen::config::GenerationPolicy;
use casegen::error::{Error, ErrorKind};
use casegen::event::{JobEvent, JobEventKind};
use casegen::model::*;
use casegen::orchestrator::{JobOrchestrator, OrchestratorConfig, SeedSource};
use casegen::pipeline::CaseGenerator;
use casegen::provider::{
    CompletionOptions, CompletionProvider, ProviderError, ProviderRegistry, TemplateProvider,
};
use casegen::queue::ChannelQueue;
use casegen::store::{CaseStore, Commit, MemoryStore, SimilarCase};
use tokio::sync::{Notify, broadcast};
use tokio::task::JoinHandle;

const WAIT: Duration = Duration::from_secs(20);

struct Harness {
    orchestrator: JobOrchestrator,
    store: Arc<MemoryStore>,
    runner: JoinHandle<casegen::error::Result<()>>,
}

impl Harness {
    fn start(providers: ProviderRegistry, config: OrchestratorConfig) -> Self {
        let harness = Self::idle(providers, config);
        let runner = harness.orchestrator.start();
        Self { runner, ..harness }
    }

    /// Orchestrator whose dispatch loop has not been started.
    fn idle(providers: ProviderRegistry, config: OrchestratorConfig) -> Self {
        Self::idle_over(providers, config, |store| store)
    }

    /// Started orchestrator whose store is `wrap` applied to the memory store.
    fn start_over<S: CaseStore + 'static>(
        providers: ProviderRegistry,
        config: OrchestratorConfig,
        wrap: impl FnOnce(Arc<MemoryStore>) -> Arc<S>,
    ) -> Self {
        let harness = Self::idle_over(providers, config, wrap);
        let runner = harness.orchestrator.start();
        Self { runner, ..harness }
    }

    fn idle_over<S: CaseStore + 'static>(
        providers: ProviderRegistry,
        config: OrchestratorConfig,
        wrap: impl FnOnce(Arc<MemoryStore>) -> Arc<S>,
    ) -> Self {
        let policy = GenerationPolicy::default();
        let store = Arc::new(MemoryStore::new());
        let orchestrator = JobOrchestrator::new(
            Arc::new(CaseGenerator::builtin(&policy).unwrap()),
            providers,
            wrap(store.clone()),
            Arc::new(ChannelQueue::new()),
            &policy,
            config,
        );
        Self {
            orchestrator,
            store,
            runner: tokio::spawn(async { Ok(()) }),
        }
    }

    async fn stop(self) {
        self.orchestrator.shutdown();
        self.runner.await.unwrap().unwrap();
    }
}

fn config() -> OrchestratorConfig {
    OrchestratorConfig {
        max_concurrent: 4,
        max_attempts: 3,
        job_timeout: Duration::from_secs(10),
        backoff_base: Duration::from_millis(1),
        backoff_max: Duration::from_millis(10),
        poll_interval: Duration::from_millis(20),
        seeds: SeedSource::Sequence { start: 1 },
    }
}

fn offline() -> ProviderRegistry {
    ProviderRegistry::new().with_provider(Arc::new(TemplateProvider))
}

fn rookie_math() -> GenerationRequest {
    GenerationRequest::new(
        Difficulty::Rookie,
        Subject::Math,
        GradeLevel::P4,
        PuzzleComplexity::Basic,
    )
    .suspect_count(3)
}

/// Events for `id` up to and including its terminal event.
async fn history(rx: &mut broadcast::Receiver<JobEvent>, id: JobId) -> Vec<JobEventKind> {
    let mut out = Vec::new();
    loop {
        let event = tokio::time::timeout(WAIT, rx.recv()).await.unwrap().unwrap();
        if event.job_id != id {
            continue;
        }
        let done = event.kind.is_terminal();
        out.push(event.kind);
        if done {
            return out;
        }
    }
}

/// Fails its first `failures` calls, then answers.
struct Flaky {
    failures: usize,
    calls: AtomicUsize,
}

impl Flaky {
    fn new(failures: usize) -> Self {
        Self {
            failures,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl CompletionProvider for Flaky {
    fn name(&self) -> &str {
        "flaky"
    }

    async fn generate_completion(
        &self,
        _prompt: &str,
        _options: &CompletionOptions,
    ) -> Result<String, ProviderError> {
        if self.calls.fetch_add(1, Ordering::SeqCst) < self.failures {
            Err(ProviderError::Request("rate limited".into()))
        } else {
            Ok("A puzzling day at school.".into())
        }
    }
}

/// Blocks until the gate opens.
struct Gated(Arc<Notify>);

#[async_trait]
impl CompletionProvider for Gated {
    fn name(&self) -> &str {
        "gated"
    }

    async fn generate_completion(
        &self,
        _prompt: &str,
        _options: &CompletionOptions,
    ) -> Result<String, ProviderError> {
        self.0.notified().await;
        Ok("Who did it?".into())
    }
}

/// Records the highest number of overlapping calls.
#[derive(Default)]
struct Overlap {
    active: AtomicUsize,
    peak: AtomicUsize,
}

#[async_trait]
impl CompletionProvider for Overlap {
    fn name(&self) -> &str {
        "overlap"
    }

    async fn generate_completion(
        &self,
        _prompt: &str,
        _options: &CompletionOptions,
    ) -> Result<String, ProviderError> {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(30)).await;
        self.active.fetch_sub(1, Ordering::SeqCst);
        Ok("One more mystery.".into())
    }
}

/// Memory store whose commits can be intercepted.
struct Intercept {
    inner: Arc<MemoryStore>,
    commits: AtomicUsize,
    on_commit: fn(usize) -> Option<Error>,
    cancel_before_commit: bool,
}

impl Intercept {
    fn new(inner: Arc<MemoryStore>) -> Self {
        Self {
            inner,
            commits: AtomicUsize::new(0),
            on_commit: |_| None,
            cancel_before_commit: false,
        }
    }
}

#[async_trait]
impl CaseStore for Intercept {
    async fn insert_if_absent(
        &self,
        fingerprint: &CaseFingerprint,
        case_id: CaseId,
    ) -> casegen::error::Result<bool> {
        self.inner.insert_if_absent(fingerprint, case_id).await
    }

    async fn find_similar(
        &self,
        fingerprint: &CaseFingerprint,
    ) -> casegen::error::Result<Vec<SimilarCase>> {
        self.inner.find_similar(fingerprint).await
    }

    async fn save_case(&self, case: &MysteryCase) -> casegen::error::Result<()> {
        self.inner.save_case(case).await
    }

    async fn get_case(&self, id: CaseId) -> casegen::error::Result<Option<MysteryCase>> {
        self.inner.get_case(id).await
    }

    async fn create_job(&self, job: &GenerationJob) -> casegen::error::Result<()> {
        self.inner.create_job(job).await
    }

    async fn get_job(&self, id: JobId) -> casegen::error::Result<Option<GenerationJob>> {
        self.inner.get_job(id).await
    }

    async fn update_job(
        &self,
        job: &GenerationJob,
        expected: JobStatus,
    ) -> casegen::error::Result<bool> {
        self.inner.update_job(job, expected).await
    }

    async fn commit_case(
        &self,
        job: &GenerationJob,
        expected: JobStatus,
        fingerprint: &CaseFingerprint,
        case: &MysteryCase,
    ) -> casegen::error::Result<Commit> {
        let n = self.commits.fetch_add(1, Ordering::SeqCst);
        if let Some(e) = (self.on_commit)(n) {
            return Err(e);
        }
        if self.cancel_before_commit {
            // A cancel that lands after the last progress write.
            let mut cancelled = self.inner.get_job(job.id).await?.unwrap();
            cancelled.status = JobStatus::Cancelled;
            assert!(self.inner.update_job(&cancelled, JobStatus::Processing).await?);
        }
        self.inner.commit_case(job, expected, fingerprint, case).await
    }
}

// ---------------------------------------------------------------------------
// End-to-end scenarios
// ---------------------------------------------------------------------------

#[tokio::test]
async fn scenario_a_job_completes_with_a_fair_case() {
    let h = Harness::start(offline(), config());
    let mut events = h.orchestrator.subscribe();

    let job = h.orchestrator.submit(rookie_math()).await.unwrap();
    assert_eq!(job.status, JobStatus::Pending);
    assert_eq!(job.progress, 0);

    let done = h.orchestrator.await_terminal(job.id, WAIT).await.unwrap();
    assert_eq!(done.status, JobStatus::Completed);
    assert_eq!(done.progress, 100);
    assert_eq!(done.attempts, 1);
    assert!(done.error.is_none());
    assert!(done.finished_at.is_some());

    let case = h.orchestrator.fetch_case(done.case_id.unwrap()).await.unwrap();
    assert_eq!(case.suspects.iter().filter(|s| s.is_guilty).count(), 1);
    assert!(case.puzzles.len() >= 3);
    assert!(case.scenes.len() >= 2);
    let teaser = case.narrative.teaser.as_deref().unwrap();
    assert!(teaser.starts_with(&case.narrative.title));

    let progress: Vec<u8> = history(&mut events, job.id).await
        .into_iter()
        .filter_map(|k| match k {
            JobEventKind::Progress { progress, .. } => Some(progress),
            _ => None,
        })
        .collect();
    assert_eq!(progress.first(), Some(&5));
    assert_eq!(progress.last(), Some(&100));
    assert!(progress.windows(2).all(|w| w[0] < w[1]), "{progress:?}");
    assert!(progress.contains(&85));
    assert!(progress.contains(&95));

    h.stop().await;
}

#[tokio::test]
async fn scenario_b_identical_requests_get_distinct_cases() {
    let h = Harness::start(offline(), config());
    let first = h.orchestrator.submit(rookie_math()).await.unwrap();
    let second = h.orchestrator.submit(rookie_math()).await.unwrap();
    assert_ne!(first.seed, second.seed);

    let a = h.orchestrator.await_terminal(first.id, WAIT).await.unwrap();
    let b = h.orchestrator.await_terminal(second.id, WAIT).await.unwrap();
    assert_eq!(a.status, JobStatus::Completed);
    assert_eq!(b.status, JobStatus::Completed);

    let ca = h.orchestrator.fetch_case(a.case_id.unwrap()).await.unwrap();
    let cb = h.orchestrator.fetch_case(b.case_id.unwrap()).await.unwrap();
    assert_ne!(
        CaseFingerprint::compute(&ca).combined_hash,
        CaseFingerprint::compute(&cb).combined_hash
    );
    for case in [&ca, &cb] {
        assert_eq!(case.suspects.iter().filter(|s| s.is_guilty).count(), 1);
        assert!(case.puzzles.iter().all(|p| !p.answer.is_empty()));
    }
    assert_eq!(h.store.case_count(), 2);
    h.stop().await;
}

#[tokio::test]
async fn scenario_c_primary_provider_failure_falls_back_without_failing() {
    let providers = ProviderRegistry::new()
        .with_provider(Arc::new(Flaky::new(usize::MAX)))
        .with_provider(Arc::new(TemplateProvider));
    let h = Harness::start(providers, config());

    let job = h.orchestrator.submit(rookie_math()).await.unwrap();
    let done = h.orchestrator.await_terminal(job.id, WAIT).await.unwrap();
    assert_eq!(done.status, JobStatus::Completed);
    assert_eq!(done.attempts, 1);

    let case = h.orchestrator.fetch_case(done.case_id.unwrap()).await.unwrap();
    assert!(case.narrative.teaser.unwrap().ends_with("Can you crack the case?"));
    h.stop().await;
}

#[tokio::test]
async fn provider_failure_on_first_attempt_is_retried() {
    let providers = ProviderRegistry::new().with_provider(Arc::new(Flaky::new(1)));
    let h = Harness::start(providers, config());
    let mut events = h.orchestrator.subscribe();

    let job = h.orchestrator.submit(rookie_math()).await.unwrap();
    let done = h.orchestrator.await_terminal(job.id, WAIT).await.unwrap();
    assert_eq!(done.status, JobStatus::Completed);
    assert_eq!(done.attempts, 2);
    assert_eq!(done.retries(), 1);

    let kinds = history(&mut events, job.id).await;
    assert!(!kinds.iter().any(|k| matches!(k, JobEventKind::Failed { .. })));
    assert_eq!(
        kinds
            .iter()
            .filter(|k| matches!(k, JobEventKind::RetryScheduled { .. }))
            .count(),
        1
    );
    h.stop().await;
}

#[tokio::test]
async fn scenario_d_template_mismatch_fails_without_retry() {
    let h = Harness::start(offline(), config());
    let request = GenerationRequest::new(
        Difficulty::Rookie,
        Subject::Science,
        GradeLevel::P3,
        PuzzleComplexity::Basic,
    )
    .crime_kind(CrimeKind::Forgery);

    let job = h.orchestrator.submit(request).await.unwrap();
    let done = h.orchestrator.await_terminal(job.id, WAIT).await.unwrap();
    assert_eq!(done.status, JobStatus::Failed);
    assert_eq!(done.attempts, 1);
    assert_eq!(done.retries(), 0);
    let error = done.error.unwrap();
    assert_eq!(error.kind, ErrorKind::TemplateMismatch);
    assert!(error.message.contains("no crime template matches"));
    assert!(done.case_id.is_none());
    h.stop().await;
}

// ---------------------------------------------------------------------------
// Duplicates, retries, timeouts
// ---------------------------------------------------------------------------

#[tokio::test]
async fn explicit_seed_resubmission_is_rejected_as_duplicate() {
    let h = Harness::start(offline(), config());
    let request = rookie_math().seed(4242);

    let first = h.orchestrator.submit(request.clone()).await.unwrap();
    let first = h.orchestrator.await_terminal(first.id, WAIT).await.unwrap();
    assert_eq!(first.status, JobStatus::Completed);

    let second = h.orchestrator.submit(request).await.unwrap();
    assert_eq!(second.seed, 4242);
    let second = h.orchestrator.await_terminal(second.id, WAIT).await.unwrap();
    assert_eq!(second.status, JobStatus::Failed);
    assert_eq!(second.attempts, 1);
    assert_eq!(second.error.unwrap().kind, ErrorKind::DuplicateCase);
    assert_eq!(h.store.case_count(), 1);
    assert_eq!(h.store.fingerprint_count(), 1);
    h.stop().await;
}

#[tokio::test]
async fn retryable_failures_exhaust_attempts_then_fail() {
    let providers = ProviderRegistry::new().with_provider(Arc::new(Flaky::new(usize::MAX)));
    let h = Harness::start(providers, config());
    let mut events = h.orchestrator.subscribe();

    let job = h.orchestrator.submit(rookie_math()).await.unwrap();
    let done = h.orchestrator.await_terminal(job.id, WAIT).await.unwrap();
    assert_eq!(done.status, JobStatus::Failed);
    assert_eq!(done.attempts, 3);
    let error = done.error.unwrap();
    assert_eq!(error.kind, ErrorKind::Provider);
    assert!(error.message.contains("rate limited"), "{}", error.message);

    let kinds = history(&mut events, job.id).await;
    let retries: Vec<u32> = kinds
        .iter()
        .filter_map(|k| match k {
            JobEventKind::RetryScheduled { attempt, .. } => Some(*attempt),
            _ => None,
        })
        .collect();
    assert_eq!(retries, vec![1, 2]);
    assert!(matches!(
        kinds.last(),
        Some(JobEventKind::Failed { attempts: 3, .. })
    ));
    h.stop().await;
}

#[tokio::test]
async fn attempt_exceeding_the_timeout_fails() {
    let gate = Arc::new(Notify::new());
    let providers = ProviderRegistry::new().with_provider(Arc::new(Gated(gate)));
    let h = Harness::start(
        providers,
        OrchestratorConfig {
            max_attempts: 1,
            job_timeout: Duration::from_millis(200),
            ..config()
        },
    );

    let job = h.orchestrator.submit(rookie_math()).await.unwrap();
    let done = h.orchestrator.await_terminal(job.id, WAIT).await.unwrap();
    assert_eq!(done.status, JobStatus::Failed);
    assert_eq!(done.error.unwrap().kind, ErrorKind::Timeout);
    h.stop().await;
}

#[tokio::test]
async fn invalid_requests_are_rejected_at_submit() {
    let h = Harness::idle(offline(), config());
    let err = h
        .orchestrator
        .submit(rookie_math().suspect_count(9))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidRequest(_)), "{err}");
}

#[tokio::test]
async fn unknown_ids_are_not_found() {
    let h = Harness::idle(offline(), config());
    assert!(matches!(
        h.orchestrator.status(JobId::new()).await,
        Err(Error::NotFound(_))
    ));
    assert!(matches!(
        h.orchestrator.fetch_case(CaseId::new()).await,
        Err(Error::NotFound(_))
    ));
}

#[tokio::test]
async fn failed_commit_is_retried_with_the_same_seed() {
    let h = Harness::start_over(offline(), config(), |store| {
        Arc::new(Intercept {
            on_commit: |n| (n == 0).then(|| Error::Other("connection reset".into())),
            ..Intercept::new(store)
        })
    });
    let mut events = h.orchestrator.subscribe();

    let job = h.orchestrator.submit(rookie_math()).await.unwrap();
    let done = h.orchestrator.await_terminal(job.id, WAIT).await.unwrap();
    assert_eq!(done.status, JobStatus::Completed, "{:?}", done.error);
    assert_eq!(done.attempts, 2);
    assert_eq!(done.seed, job.seed);

    let kinds = history(&mut events, job.id).await;
    assert!(kinds.iter().any(
        |k| matches!(k, JobEventKind::RetryScheduled { error, .. } if error.contains("connection reset"))
    ));
    assert!(h.orchestrator.fetch_case(done.case_id.unwrap()).await.is_ok());
    assert_eq!(h.store.fingerprint_count(), 1);
    assert_eq!(h.store.case_count(), 1);
    h.stop().await;
}

// ---------------------------------------------------------------------------
// Cancellation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn pending_job_can_be_cancelled_once() {
    let h = Harness::idle(offline(), config());
    let job = h.orchestrator.submit(rookie_math()).await.unwrap();

    let cancelled = h.orchestrator.cancel(job.id).await.unwrap();
    assert_eq!(cancelled.status, JobStatus::Cancelled);
    assert!(matches!(
        h.orchestrator.cancel(job.id).await,
        Err(Error::InvalidTransition { .. })
    ));

    // The queued message is dropped once dispatch starts.
    let runner = h.orchestrator.start();
    tokio::time::sleep(Duration::from_millis(100)).await;
    let after = h.orchestrator.status(job.id).await.unwrap();
    assert_eq!(after.status, JobStatus::Cancelled);
    assert_eq!(after.attempts, 0);
    assert_eq!(h.store.case_count(), 0);

    h.orchestrator.shutdown();
    runner.await.unwrap().unwrap();
}

#[tokio::test]
async fn cancelling_a_processing_job_discards_its_result() {
    let gate = Arc::new(Notify::new());
    let providers = ProviderRegistry::new().with_provider(Arc::new(Gated(gate.clone())));
    let h = Harness::start(providers, config());
    let mut events = h.orchestrator.subscribe();

    let job = h.orchestrator.submit(rookie_math()).await.unwrap();
    loop {
        let event = events.recv().await.unwrap();
        if event.job_id == job.id
            && matches!(
                event.kind,
                JobEventKind::StatusChanged {
                    to: JobStatus::Processing,
                    ..
                }
            )
        {
            break;
        }
    }

    let cancelled = h.orchestrator.cancel(job.id).await.unwrap();
    assert_eq!(cancelled.status, JobStatus::Cancelled);
    gate.notify_one();

    let done = h.orchestrator.await_terminal(job.id, WAIT).await.unwrap();
    assert_eq!(done.status, JobStatus::Cancelled);
    assert!(done.case_id.is_none());

    let store = h.store.clone();
    h.stop().await;
    assert_eq!(store.case_count(), 0);
    assert_eq!(store.fingerprint_count(), 0);
}

#[tokio::test]
async fn cancel_racing_the_commit_leaves_no_claim() {
    let mut intercept = None;
    let h = Harness::start_over(offline(), config(), |store| {
        let wrapped = Arc::new(Intercept {
            cancel_before_commit: true,
            ..Intercept::new(store)
        });
        intercept = Some(wrapped.clone());
        wrapped
    });
    let intercept = intercept.unwrap();

    let job = h.orchestrator.submit(rookie_math()).await.unwrap();
    tokio::time::timeout(WAIT, async {
        while intercept.commits.load(Ordering::SeqCst) == 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();

    // Shutdown waits for the in-flight worker.
    let store = h.store.clone();
    h.stop().await;
    let after = store.get_job(job.id).await.unwrap().unwrap();
    assert_eq!(after.status, JobStatus::Cancelled);
    assert!(after.case_id.is_none());
    assert_eq!(store.fingerprint_count(), 0);
    assert_eq!(store.case_count(), 0);
}

// ---------------------------------------------------------------------------
// Concurrency
// ---------------------------------------------------------------------------

#[tokio::test]
async fn processing_is_bounded_by_max_concurrent() {
    let overlap = Arc::new(Overlap::default());
    let providers = ProviderRegistry::new().with_provider(overlap.clone());
    let h = Harness::start(
        providers,
        OrchestratorConfig {
            max_concurrent: 2,
            ..config()
        },
    );

    let mut ids = Vec::new();
    for _ in 0..6 {
        ids.push(h.orchestrator.submit(rookie_math()).await.unwrap().id);
    }
    for id in ids {
        let done = h.orchestrator.await_terminal(id, WAIT).await.unwrap();
        assert_eq!(done.status, JobStatus::Completed);
    }
    assert!(overlap.peak.load(Ordering::SeqCst) <= 2);
    h.stop().await;
}
