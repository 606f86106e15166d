//! Near-duplicate rejection against previously stored fingerprints.

use opentelemetry::KeyValue;
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::model::CaseFingerprint;
use crate::store::{CaseStore, SimilarCase};
use crate::telemetry::metrics;

const FACET_COUNT: usize = 4;

/// Outcome of an accepted uniqueness check.
#[derive(Debug, Clone, PartialEq)]
pub struct UniquenessVerdict {
    /// 1.0 when nothing similar is stored; 1 - matching facets / 4 otherwise.
    pub uniqueness: f64,
    pub similar: Vec<SimilarCase>,
    pub warning: Option<String>,
}

pub struct UniquenessValidator {
    min_uniqueness: f64,
}

impl UniquenessValidator {
    pub fn new(min_uniqueness: f64) -> Self {
        Self { min_uniqueness }
    }

    /// Compare `fingerprint` against the store.
    ///
    /// Read-only: a passing verdict does not reserve anything. The caller
    /// must still claim the combined hash with
    /// [`CaseStore::commit_case`].
    pub async fn assess(
        &self,
        fingerprint: &CaseFingerprint,
        store: &dyn CaseStore,
    ) -> Result<UniquenessVerdict> {
        let similar = store.find_similar(fingerprint).await?;

        let Some(closest) = similar.first() else {
            return Ok(UniquenessVerdict {
                uniqueness: 1.0,
                similar,
                warning: None,
            });
        };

        let matching = closest.matching_facets.len();
        if matching == FACET_COUNT {
            reject("identical");
            return Err(Error::DuplicateCase(format!(
                "identical to case {} (combined hash {})",
                closest.case_id,
                short(&fingerprint.combined_hash)
            )));
        }

        let uniqueness = 1.0 - matching as f64 / FACET_COUNT as f64;
        if uniqueness < self.min_uniqueness {
            reject("similar");
            return Err(Error::DuplicateCase(format!(
                "uniqueness {uniqueness:.2} below {:.2}: shares {:?} with case {}",
                self.min_uniqueness, closest.matching_facets, closest.case_id
            )));
        }

        let warning = format!(
            "similar to case {} on {:?} (uniqueness {uniqueness:.2})",
            closest.case_id, closest.matching_facets
        );
        warn!(case = %closest.case_id, uniqueness, "accepting similar case");
        Ok(UniquenessVerdict {
            uniqueness,
            similar,
            warning: Some(warning),
        })
    }
}

fn reject(reason: &'static str) {
    info!(reason, "duplicate case rejected");
    metrics::duplicates_rejected().add(1, &[KeyValue::new("reason", reason)]);
}

fn short(hash: &str) -> &str {
    &hash[..hash.len().min(12)]
}
