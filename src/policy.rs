use serde::{Deserialize, Serialize};
use std::cmp::Reverse;

use crate::hasher::Fingerprint;

/// Which member of a duplicate cluster is kept.
///
/// Clustering always keeps the first discovered member, so a policy works by
/// deciding the discovery order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum SurvivorPolicy {
    /// Filename order
    #[default]
    First,
    /// Most pixels, then largest file
    Largest,
    /// Earliest creation (or modification) time
    Oldest,
}

impl SurvivorPolicy {
    /// Stable-sort `prints` into discovery order.
    pub fn order(self, prints: &mut [Fingerprint]) {
        match self {
            SurvivorPolicy::First => prints.sort_by(|a, b| a.file.name.cmp(&b.file.name)),
            SurvivorPolicy::Largest => {
                prints.sort_by_key(|p| (Reverse(p.pixels()), Reverse(p.file.size)))
            }
            SurvivorPolicy::Oldest => prints.sort_by_key(|p| p.file.timestamp),
        }
    }
}
