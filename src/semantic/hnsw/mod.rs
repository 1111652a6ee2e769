//! Hierarchical navigable small-world graph over lazily resolved vectors.
//!
//! Nodes hold [`LazyValue`] handles rather than raw vectors, so the graph can
//! be snapshotted by key alone (see [`IndexSnapshot`]).
//!
//! Construction is single-writer: `add_items` takes `&mut self`. Once built,
//! `search` only needs `&self` and may run from many threads at once.
//!
//! Insertion order matters. The same items inserted in a different order
//! produce a different graph even with the same seed.

mod graph;
mod params;
mod random;
mod snapshot;

use std::sync::Arc;

use crate::semantic::distance::DistanceFn;
use crate::semantic::lazy::LazyValue;
use graph::{Candidate, DistanceCache, Node};

pub use params::{
    default_level_lambda, HnswParams, NeighbourHeuristic, DEFAULT_CONSTRUCTION_PRUNING, DEFAULT_M,
};
pub use random::SeededRandom;
pub use snapshot::{IndexSnapshot, NodeSnapshot};

/// Errors that can occur during index operations.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("Dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("Invalid index snapshot: {0}")]
    InvalidSnapshot(String),
}

/// One k-NN hit.
#[derive(Debug, Clone)]
pub struct SearchResult<K> {
    pub item: Arc<LazyValue<K, Vec<f32>>>,
    pub distance: f32,
}

pub struct HnswIndex<K> {
    params: HnswParams,
    distance: DistanceFn,
    random: SeededRandom,
    nodes: Vec<Node<K>>,
    entry_point: Option<usize>,
    dimension: Option<usize>,
}

impl<K> HnswIndex<K> {
    pub fn new(params: HnswParams, distance: DistanceFn, random: SeededRandom) -> Self {
        Self {
            params,
            distance,
            random,
            nodes: Vec::new(),
            entry_point: None,
            dimension: None,
        }
    }

    pub fn params(&self) -> &HnswParams {
        &self.params
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Vector dimension, known once the first item is inserted.
    pub fn dimension(&self) -> Option<usize> {
        self.dimension
    }

    /// Highest layer currently in the graph.
    pub fn max_layer(&self) -> Option<usize> {
        self.entry_point.map(|id| self.nodes[id].layer)
    }

    /// Iterate over stored items in insertion order.
    pub fn items(&self) -> impl Iterator<Item = &Arc<LazyValue<K, Vec<f32>>>> {
        self.nodes.iter().map(|n| &n.item)
    }

    /// Insert a batch of items.
    ///
    /// Every item is resolved and dimension-checked before any of them is
    /// linked, so a failing batch leaves the graph untouched.
    pub fn add_items(&mut self, items: Vec<Arc<LazyValue<K, Vec<f32>>>>) -> Result<(), IndexError> {
        if items.is_empty() {
            return Ok(());
        }

        let mut expected = self.dimension;
        for item in &items {
            let got = item.value().len();
            match expected {
                Some(expected) if expected != got => {
                    return Err(IndexError::DimensionMismatch { expected, got });
                }
                None => expected = Some(got),
                _ => {}
            }
        }
        self.dimension = expected;

        let mut cache = DistanceCache::new(self.params.enable_distance_cache);
        for item in items {
            let layer = self.random_level();
            let id = self.nodes.len();
            self.nodes.push(Node::new(item, layer));
            self.link_node(&mut cache, id);
        }

        log::debug!(
            "HNSW graph now holds {} nodes (top layer {:?}, {} cached distances)",
            self.nodes.len(),
            self.max_layer(),
            cache.len()
        );

        Ok(())
    }

    /// Find the `k` nearest items to `query`, closest first.
    ///
    /// An empty index yields no results. When `k` covers the whole index
    /// every item is scored directly, so all items come back.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchResult<K>>, IndexError> {
        let Some(entry_id) = self.entry_point else {
            return Ok(Vec::new());
        };
        if let Some(expected) = self.dimension {
            if expected != query.len() {
                return Err(IndexError::DimensionMismatch {
                    expected,
                    got: query.len(),
                });
            }
        }
        if k == 0 {
            return Ok(Vec::new());
        }

        let distance_to = |id: usize| (self.distance)(query, self.nodes[id].vector());

        let found = if k >= self.nodes.len() {
            let mut all: Vec<Candidate> = (0..self.nodes.len())
                .map(|id| Candidate {
                    distance: distance_to(id),
                    id,
                })
                .collect();
            all.sort();
            all
        } else {
            let entry = Candidate {
                distance: distance_to(entry_id),
                id: entry_id,
            };
            let top = self.nodes[entry_id].layer;
            let best = self.descend(entry, top, 0, distance_to);
            self.search_layer(&[best], k, 0, distance_to)
        };

        Ok(found
            .into_iter()
            .take(k)
            .map(|c| SearchResult {
                item: self.nodes[c.id].item.clone(),
                distance: c.distance,
            })
            .collect())
    }
}
