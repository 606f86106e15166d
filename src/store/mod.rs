//! Persistence of fingerprints, cases and jobs.
//!
//! [`CaseStore::commit_case`] is the one serialization point between
//! concurrent jobs: two runs may both pass the similarity check, but only
//! one of them can claim a combined hash. The claim, the case body and the
//! job's completion are written together or not at all.

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::model::{
    CaseFingerprint, CaseId, Facet, GenerationJob, JobId, JobStatus, MysteryCase,
};

/// Facets needed before two cases count as similar.
pub const SIMILAR_FACETS: usize = 2;

/// A stored case sharing at least [`SIMILAR_FACETS`] facet hashes with a probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimilarCase {
    pub case_id: CaseId,
    pub matching_facets: Vec<Facet>,
}

/// Outcome of [`CaseStore::commit_case`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Commit {
    Committed,
    /// The combined hash already belongs to another case. Nothing was written.
    Duplicate,
    /// The job left the expected status. Nothing was written.
    Stale,
}

#[async_trait]
pub trait CaseStore: Send + Sync {
    /// Claim the fingerprint's combined hash for `case_id`.
    /// Returns `false` when the hash is already taken.
    async fn insert_if_absent(&self, fingerprint: &CaseFingerprint, case_id: CaseId)
    -> Result<bool>;

    /// Stored cases sharing two or more facets with `fingerprint`.
    async fn find_similar(&self, fingerprint: &CaseFingerprint) -> Result<Vec<SimilarCase>>;

    async fn save_case(&self, case: &MysteryCase) -> Result<()>;

    async fn get_case(&self, id: CaseId) -> Result<Option<MysteryCase>>;

    async fn create_job(&self, job: &GenerationJob) -> Result<()>;

    async fn get_job(&self, id: JobId) -> Result<Option<GenerationJob>>;

    /// Write `job` only if the stored status still equals `expected`.
    /// Returns `false` when another writer got there first.
    async fn update_job(&self, job: &GenerationJob, expected: JobStatus) -> Result<bool>;

    /// Atomically claim `fingerprint` for `case`, save the case and write
    /// `job`, provided the job's stored status still equals `expected`.
    async fn commit_case(
        &self,
        job: &GenerationJob,
        expected: JobStatus,
        fingerprint: &CaseFingerprint,
        case: &MysteryCase,
    ) -> Result<Commit>;
}

/// Validate a status change before it is written.
pub(crate) fn validate_transition(from: JobStatus, to: JobStatus) -> Result<()> {
    if from == to || from.can_transition_to(to) {
        Ok(())
    } else {
        Err(Error::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
        })
    }
}
