//! Duplicate clustering over a similarity graph.
//!
//! Nodes are indices into a caller-owned list in discovery order. Nothing
//! here touches the filesystem, so the resolution rules can be exercised on
//! synthetic distances.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet, VecDeque};

/// How chained clusters (A~B, B~C, A≁C) are collapsed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum ResolveStrategy {
    /// Walk cluster keys in discovery order; each surviving key rejects its
    /// direct neighbors. In a chain the far end can survive.
    #[default]
    Greedy,
    /// Union-find over all edges; each connected group keeps only its first
    /// discovered member.
    Components,
}

/// One survivor and the members rejected in its favour.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cluster {
    pub survivor: usize,
    pub rejected: Vec<usize>,
}

#[derive(Debug, Clone, Default)]
pub struct SimilarityGraph {
    neighbors: Vec<Vec<usize>>,
}

impl SimilarityGraph {
    /// Compare every pair of `items` and link those whose distance is at most
    /// `threshold`. Neighbor lists are kept in discovery order.
    pub fn build<T, F>(items: &[T], threshold: u32, distance: F) -> Self
    where
        F: Fn(&T, &T) -> u32,
    {
        let mut neighbors = vec![Vec::new(); items.len()];
        for i in 0..items.len() {
            for j in (i + 1)..items.len() {
                if distance(&items[i], &items[j]) <= threshold {
                    neighbors[i].push(j);
                    neighbors[j].push(i);
                }
            }
        }
        for list in &mut neighbors {
            list.sort_unstable();
        }
        Self { neighbors }
    }

    /// Build a graph from directed edges `from -> to`. Edges pointing outside
    /// `0..len` are ignored.
    pub fn from_edges(len: usize, edges: &[(usize, usize)]) -> Self {
        let mut neighbors = vec![Vec::new(); len];
        for &(from, to) in edges {
            if from < len && to < len && from != to && !neighbors[from].contains(&to) {
                neighbors[from].push(to);
            }
        }
        Self { neighbors }
    }

    pub fn len(&self) -> usize {
        self.neighbors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.neighbors.is_empty()
    }

    pub fn neighbors(&self, node: usize) -> &[usize] {
        self.neighbors.get(node).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Nodes with at least one duplicate neighbor, in discovery order.
    pub fn keys(&self) -> Vec<usize> {
        (0..self.neighbors.len())
            .filter(|&node| !self.neighbors[node].is_empty())
            .collect()
    }

    pub fn resolve(&self, strategy: ResolveStrategy) -> Vec<Cluster> {
        match strategy {
            ResolveStrategy::Greedy => self.resolve_greedy(),
            ResolveStrategy::Components => self.resolve_components(),
        }
    }

    /// Take pending keys front to back. Every neighbor of the current key that
    /// has not been rejected yet is rejected and dropped from the pending keys,
    /// so it never forms a cluster of its own.
    pub fn resolve_greedy(&self) -> Vec<Cluster> {
        let mut pending: VecDeque<usize> = self.keys().into();
        let mut rejected: HashSet<usize> = HashSet::new();
        let mut clusters = Vec::new();

        while let Some(key) = pending.pop_front() {
            let mut members = Vec::new();
            for &neighbor in &self.neighbors[key] {
                if !rejected.insert(neighbor) {
                    continue;
                }
                // absent when the neighbor is not a key or was already taken
                pending.retain(|&k| k != neighbor);
                members.push(neighbor);
            }
            if !members.is_empty() {
                clusters.push(Cluster {
                    survivor: key,
                    rejected: members,
                });
            }
        }

        clusters
    }

    /// Group connected nodes with union-find; the lowest index of a group
    /// survives.
    pub fn resolve_components(&self) -> Vec<Cluster> {
        let mut sets = DisjointSet::new(self.neighbors.len());
        for (node, list) in self.neighbors.iter().enumerate() {
            for &neighbor in list {
                sets.union(node, neighbor);
            }
        }

        let mut groups: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        for node in self.keys() {
            groups.entry(sets.find(node)).or_default().push(node);
        }

        groups
            .into_values()
            .filter(|members| members.len() > 1)
            .map(|members| Cluster {
                survivor: members[0],
                rejected: members[1..].to_vec(),
            })
            .collect()
    }
}

/// Union-find whose representative is always the smallest member.
struct DisjointSet {
    parent: Vec<usize>,
}

impl DisjointSet {
    fn new(len: usize) -> Self {
        Self {
            parent: (0..len).collect(),
        }
    }

    fn find(&mut self, node: usize) -> usize {
        let mut root = node;
        while self.parent[root] != root {
            root = self.parent[root];
        }
        let mut current = node;
        while self.parent[current] != root {
            let next = self.parent[current];
            self.parent[current] = root;
            current = next;
        }
        root
    }

    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra == rb {
            return;
        }
        let (low, high) = if ra < rb { (ra, rb) } else { (rb, ra) };
        self.parent[high] = low;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hamming(a: &u64, b: &u64) -> u32 {
        (a ^ b).count_ones()
    }

    fn rejected(clusters: &[Cluster]) -> Vec<usize> {
        let mut all: Vec<usize> = clusters.iter().flat_map(|c| c.rejected.clone()).collect();
        all.sort_unstable();
        all
    }

    #[test]
    fn test_empty_and_single() {
        let none: Vec<u64> = Vec::new();
        assert!(SimilarityGraph::build(&none, 10, hamming).resolve_greedy().is_empty());
        assert!(SimilarityGraph::build(&[0u64], 10, hamming).resolve_greedy().is_empty());
    }

    #[test]
    fn test_unrelated_hashes_form_no_cluster() {
        let hashes = [0u64, u64::MAX, 0xFFFF_FFFF_0000_0000];
        let graph = SimilarityGraph::build(&hashes, 10, hamming);
        assert!(graph.keys().is_empty());
        assert!(graph.resolve(ResolveStrategy::Greedy).is_empty());
        assert!(graph.resolve(ResolveStrategy::Components).is_empty());
    }

    #[test]
    fn test_first_discovered_survives() {
        // A, B, C all within one bit of each other
        let hashes = [0b000u64, 0b001, 0b011];
        let graph = SimilarityGraph::build(&hashes, 2, hamming);

        let clusters = graph.resolve_greedy();
        assert_eq!(
            clusters,
            vec![Cluster {
                survivor: 0,
                rejected: vec![1, 2]
            }]
        );
        assert_eq!(graph.resolve_components(), clusters);
    }

    #[test]
    fn test_chain_greedy_keeps_far_end() {
        // A~B and B~C, but A and C are 8 bits apart
        let hashes = [0x00u64, 0x0F, 0xFF];
        let graph = SimilarityGraph::build(&hashes, 4, hamming);
        assert_eq!(graph.keys(), vec![0, 1, 2]);

        let greedy = graph.resolve_greedy();
        assert_eq!(rejected(&greedy), vec![1]);
        assert_eq!(greedy[0].survivor, 0);

        let components = graph.resolve_components();
        assert_eq!(rejected(&components), vec![1, 2]);
        assert_eq!(components[0].survivor, 0);
    }

    #[test]
    fn test_directed_edges_follow_pending_key() {
        // only 2 -> 0 is recorded; 2 is the sole key and rejects 0
        let graph = SimilarityGraph::from_edges(3, &[(2, 0), (2, 0), (5, 1)]);
        assert_eq!(graph.keys(), vec![2]);
        assert_eq!(
            graph.resolve_greedy(),
            vec![Cluster {
                survivor: 2,
                rejected: vec![0]
            }]
        );
    }

    #[test]
    fn test_already_rejected_neighbor_is_skipped() {
        // 0 -> {1, 2}, 3 -> {2}: 2 is rejected once, 3 keeps nothing
        let graph = SimilarityGraph::from_edges(4, &[(0, 1), (0, 2), (3, 2)]);
        let clusters = graph.resolve_greedy();
        assert_eq!(clusters.len(), 1);
        assert_eq!(rejected(&clusters), vec![1, 2]);
    }

    #[test]
    fn test_separate_clusters_each_keep_one() {
        let hashes = [0u64, u64::MAX, 1, u64::MAX - 1, 0xF0F0_F0F0_F0F0_F0F0];
        let graph = SimilarityGraph::build(&hashes, 3, hamming);
        for strategy in [ResolveStrategy::Greedy, ResolveStrategy::Components] {
            let clusters = graph.resolve(strategy);
            let survivors: Vec<_> = clusters.iter().map(|c| c.survivor).collect();
            assert_eq!(survivors, vec![0, 1]);
            assert_eq!(rejected(&clusters), vec![2, 3]);
        }
    }
}
