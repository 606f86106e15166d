//! # casegen
//!
//! Generates children's mystery cases that are solvable, fair and not
//! duplicates of earlier cases, and runs generation as retryable jobs.
//!
//! A [`pipeline::CaseGenerator`] turns a request and a seed into a
//! [`model::MysteryCase`]; the [`validate`] module fingerprints and checks
//! it; the [`orchestrator::JobOrchestrator`] wraps the whole run in a job
//! backed by a [`store::CaseStore`] and a [`queue::WorkQueue`].

pub mod config;
pub mod curriculum;
pub mod error;
pub mod event;
pub mod model;
pub mod orchestrator;
pub mod pipeline;
pub mod provider;
pub mod queue;
pub mod store;
pub mod telemetry;
pub mod templates;
pub mod validate;
