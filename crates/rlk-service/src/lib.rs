//! The exposed application surface of the ranking engine.
//!
//! [`LadderService`] is stateless over a shared [`rlk_store::StandingStore`]:
//! every mutating flow is per-ladder serialized (async mutex), reads a fresh
//! versioned snapshot, computes a pure plan via `rlk-ranking`, and commits
//! the affected rows in one store transaction keyed on the snapshot version.
//! A stale version is the only automatically retried failure — three
//! attempts, each with a fresh read — per the concurrency contract.

mod service;
mod types;

pub use service::LadderService;
pub use types::{
    FastTrackChoice, FastTrackSummary, MatchApplied, SeedReport, ServiceError,
};
