//! In-process store for tests and single-binary runs.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use super::{CaseStore, Commit, SIMILAR_FACETS, SimilarCase, validate_transition};
use crate::error::Result;
use crate::model::{CaseFingerprint, CaseId, GenerationJob, JobId, JobStatus, MysteryCase};

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    /// Keyed by combined hash.
    fingerprints: HashMap<String, (CaseFingerprint, CaseId)>,
    cases: HashMap<CaseId, MysteryCase>,
    jobs: HashMap<JobId, GenerationJob>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // Every critical section leaves Inner consistent, so a poisoned lock
        // is still safe to read.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn fingerprint_count(&self) -> usize {
        self.lock().fingerprints.len()
    }

    pub fn case_count(&self) -> usize {
        self.lock().cases.len()
    }
}

#[async_trait]
impl CaseStore for MemoryStore {
    async fn insert_if_absent(
        &self,
        fingerprint: &CaseFingerprint,
        case_id: CaseId,
    ) -> Result<bool> {
        let mut inner = self.lock();
        if inner.fingerprints.contains_key(&fingerprint.combined_hash) {
            return Ok(false);
        }
        inner.fingerprints.insert(
            fingerprint.combined_hash.clone(),
            (fingerprint.clone(), case_id),
        );
        Ok(true)
    }

    async fn find_similar(&self, fingerprint: &CaseFingerprint) -> Result<Vec<SimilarCase>> {
        let inner = self.lock();
        let mut out: Vec<SimilarCase> = inner
            .fingerprints
            .values()
            .filter_map(|(stored, case_id)| {
                let matching_facets = stored.matching_facets(fingerprint);
                (matching_facets.len() >= SIMILAR_FACETS).then(|| SimilarCase {
                    case_id: *case_id,
                    matching_facets,
                })
            })
            .collect();
        out.sort_by(|a, b| b.matching_facets.len().cmp(&a.matching_facets.len()));
        Ok(out)
    }

    async fn save_case(&self, case: &MysteryCase) -> Result<()> {
        self.lock().cases.insert(case.id, case.clone());
        Ok(())
    }

    async fn get_case(&self, id: CaseId) -> Result<Option<MysteryCase>> {
        Ok(self.lock().cases.get(&id).cloned())
    }

    async fn create_job(&self, job: &GenerationJob) -> Result<()> {
        self.lock().jobs.insert(job.id, job.clone());
        Ok(())
    }

    async fn get_job(&self, id: JobId) -> Result<Option<GenerationJob>> {
        Ok(self.lock().jobs.get(&id).cloned())
    }

    async fn update_job(&self, job: &GenerationJob, expected: JobStatus) -> Result<bool> {
        validate_transition(expected, job.status)?;
        let mut inner = self.lock();
        match inner.jobs.get_mut(&job.id) {
            Some(stored) if stored.status == expected => {
                *stored = job.clone();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn commit_case(
        &self,
        job: &GenerationJob,
        expected: JobStatus,
        fingerprint: &CaseFingerprint,
        case: &MysteryCase,
    ) -> Result<Commit> {
        validate_transition(expected, job.status)?;
        let mut inner = self.lock();
        if inner.jobs.get(&job.id).is_none_or(|stored| stored.status != expected) {
            return Ok(Commit::Stale);
        }
        if inner.fingerprints.contains_key(&fingerprint.combined_hash) {
            return Ok(Commit::Duplicate);
        }
        inner.fingerprints.insert(
            fingerprint.combined_hash.clone(),
            (fingerprint.clone(), case.id),
        );
        inner.cases.insert(case.id, case.clone());
        inner.jobs.insert(job.id, job.clone());
        Ok(Commit::Committed)
    }
}
