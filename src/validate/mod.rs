//! Post-pipeline gates: fingerprinting, uniqueness and quality.

pub mod fingerprint;
pub mod quality;
pub mod uniqueness;

pub use quality::{QualityRule, QualityValidator, QualityViolation};
pub use uniqueness::{UniquenessValidator, UniquenessVerdict};
