//! Near-duplicate rejection for folders of crowd-sourced photos.
//!
//! [`Deduplicator::plan`] hashes every image of a folder and clusters the
//! near-duplicates without touching anything; [`Deduplicator::apply`] deletes
//! or moves the rejected files. [`find_duplicates_to_reject`] does both.

pub mod cluster;
pub mod config;
pub mod dedup;
pub mod error;
pub mod hasher;
pub mod history;
pub mod policy;
pub mod scanner;
pub mod submissions;

pub use cluster::{ResolveStrategy, SimilarityGraph};
pub use config::DedupConfig;
pub use dedup::{
    ApplyAction, ApplyOptions, ApplyReport, DedupPlan, Deduplicator, DuplicateCluster, MatchKind,
    Progress, RejectOutcome, find_duplicates_to_reject,
};
pub use error::{DedupError, Result};
pub use hasher::{HashAlgorithm, HashSettings, SkippedImage};
pub use policy::SurvivorPolicy;
