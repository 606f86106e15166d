//! Postgres-backed store.
//!
//! Cases and jobs are stored as JSONB bodies next to the columns that
//! queries filter on. The fingerprint table's primary key on
//! `combined_hash` makes the claim atomic across processes, and
//! `commit_case` runs the claim, the case insert and the job write in one
//! transaction behind a row lock on the job.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgExecutor, PgPool};
use sqlx::postgres::PgPoolOptions;
use uuid::Uuid;

use super::{CaseStore, Commit, SIMILAR_FACETS, SimilarCase, validate_transition};
use crate::error::{Error, Result};
use crate::model::{CaseFingerprint, CaseId, GenerationJob, JobId, JobStatus, MysteryCase};

/// Owns the connection pool; the pgmq queue shares it.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(url)
            .await?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Run all pending migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| Error::Other(format!("migration failed: {e}")))?;
        Ok(())
    }

    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[derive(sqlx::FromRow)]
struct FingerprintRow {
    case_id: Uuid,
    structure_hash: String,
    character_hash: String,
    puzzle_hash: String,
    location_hash: String,
    combined_hash: String,
    created_at: DateTime<Utc>,
}

impl FingerprintRow {
    fn into_fingerprint(self) -> (CaseId, CaseFingerprint) {
        (
            CaseId(self.case_id),
            CaseFingerprint {
                structure_hash: self.structure_hash,
                character_hash: self.character_hash,
                puzzle_hash: self.puzzle_hash,
                location_hash: self.location_hash,
                combined_hash: self.combined_hash,
                timestamp: self.created_at,
            },
        )
    }
}

#[async_trait]
impl CaseStore for PgStore {
    async fn insert_if_absent(
        &self,
        fingerprint: &CaseFingerprint,
        case_id: CaseId,
    ) -> Result<bool> {
        claim(&self.pool, fingerprint, case_id).await
    }

    async fn find_similar(&self, fingerprint: &CaseFingerprint) -> Result<Vec<SimilarCase>> {
        let rows: Vec<FingerprintRow> = sqlx::query_as(
            "SELECT case_id, structure_hash, character_hash, puzzle_hash, location_hash, combined_hash, created_at
             FROM case_fingerprints
             WHERE (structure_hash = $1)::int + (character_hash = $2)::int
                 + (puzzle_hash = $3)::int + (location_hash = $4)::int >= $5",
        )
        .bind(&fingerprint.structure_hash)
        .bind(&fingerprint.character_hash)
        .bind(&fingerprint.puzzle_hash)
        .bind(&fingerprint.location_hash)
        .bind(SIMILAR_FACETS as i32)
        .fetch_all(&self.pool)
        .await?;

        let mut out: Vec<SimilarCase> = rows
            .into_iter()
            .map(|row| {
                let (case_id, stored) = row.into_fingerprint();
                SimilarCase {
                    case_id,
                    matching_facets: stored.matching_facets(fingerprint),
                }
            })
            .collect();
        out.sort_by(|a, b| b.matching_facets.len().cmp(&a.matching_facets.len()));
        Ok(out)
    }

    async fn save_case(&self, case: &MysteryCase) -> Result<()> {
        insert_case(&self.pool, case).await
    }

    async fn get_case(&self, id: CaseId) -> Result<Option<MysteryCase>> {
        let row: Option<(serde_json::Value,)> =
            sqlx::query_as("SELECT body FROM cases WHERE id = $1")
                .bind(id.0)
                .fetch_optional(&self.pool)
                .await?;
        row.map(|(body,)| serde_json::from_value(body).map_err(Error::from))
            .transpose()
    }

    async fn create_job(&self, job: &GenerationJob) -> Result<()> {
        let body = serde_json::to_value(job)?;
        sqlx::query(
            "INSERT INTO generation_jobs (id, status, body, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(job.id.0)
        .bind(job.status.to_string())
        .bind(&body)
        .bind(job.created_at)
        .bind(job.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_job(&self, id: JobId) -> Result<Option<GenerationJob>> {
        let row: Option<(serde_json::Value,)> =
            sqlx::query_as("SELECT body FROM generation_jobs WHERE id = $1")
                .bind(id.0)
                .fetch_optional(&self.pool)
                .await?;
        row.map(|(body,)| serde_json::from_value(body).map_err(Error::from))
            .transpose()
    }

    async fn update_job(&self, job: &GenerationJob, expected: JobStatus) -> Result<bool> {
        validate_transition(expected, job.status)?;
        write_job(&self.pool, job, expected).await
    }

    async fn commit_case(
        &self,
        job: &GenerationJob,
        expected: JobStatus,
        fingerprint: &CaseFingerprint,
        case: &MysteryCase,
    ) -> Result<Commit> {
        validate_transition(expected, job.status)?;
        // Dropping the transaction without commit rolls it back.
        let mut tx = self.pool.begin().await?;
        let status: Option<(String,)> =
            sqlx::query_as("SELECT status FROM generation_jobs WHERE id = $1 FOR UPDATE")
                .bind(job.id.0)
                .fetch_optional(&mut *tx)
                .await?;
        if status.is_none_or(|(s,)| s != expected.to_string()) {
            return Ok(Commit::Stale);
        }
        if !claim(&mut *tx, fingerprint, case.id).await? {
            return Ok(Commit::Duplicate);
        }
        insert_case(&mut *tx, case).await?;
        if !write_job(&mut *tx, job, expected).await? {
            return Ok(Commit::Stale);
        }
        tx.commit().await?;
        Ok(Commit::Committed)
    }
}

async fn claim<'e>(
    db: impl PgExecutor<'e>,
    fingerprint: &CaseFingerprint,
    case_id: CaseId,
) -> Result<bool> {
    let inserted: Option<(String,)> = sqlx::query_as(
        "INSERT INTO case_fingerprints (combined_hash, case_id, structure_hash, character_hash, puzzle_hash, location_hash, created_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7)
         ON CONFLICT (combined_hash) DO NOTHING
         RETURNING combined_hash",
    )
    .bind(&fingerprint.combined_hash)
    .bind(case_id.0)
    .bind(&fingerprint.structure_hash)
    .bind(&fingerprint.character_hash)
    .bind(&fingerprint.puzzle_hash)
    .bind(&fingerprint.location_hash)
    .bind(fingerprint.timestamp)
    .fetch_optional(db)
    .await?;
    Ok(inserted.is_some())
}

async fn insert_case<'e>(db: impl PgExecutor<'e>, case: &MysteryCase) -> Result<()> {
    let body = serde_json::to_value(case)?;
    sqlx::query(
        "INSERT INTO cases (id, seed, body, created_at) VALUES ($1, $2, $3, $4)
         ON CONFLICT (id) DO UPDATE SET body = EXCLUDED.body",
    )
    .bind(case.id.0)
    .bind(case.seed as i64)
    .bind(&body)
    .bind(case.created_at)
    .execute(db)
    .await?;
    Ok(())
}

async fn write_job<'e>(
    db: impl PgExecutor<'e>,
    job: &GenerationJob,
    expected: JobStatus,
) -> Result<bool> {
    let body = serde_json::to_value(job)?;
    let rows_affected = sqlx::query(
        "UPDATE generation_jobs SET status = $1, body = $2, updated_at = $3
         WHERE id = $4 AND status = $5",
    )
    .bind(job.status.to_string())
    .bind(&body)
    .bind(job.updated_at)
    .bind(job.id.0)
    .bind(expected.to_string())
    .execute(db)
    .await?
    .rows_affected();
    Ok(rows_affected == 1)
}
