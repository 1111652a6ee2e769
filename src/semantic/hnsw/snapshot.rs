//! Key-only snapshots of the graph.
//!
//! A snapshot records each node's key, layer and adjacency, never its vector.
//! Restoring replays the keys through a [`LazyRegistry`], so vectors are
//! fetched again only when a distance actually needs them.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::graph::Node;
use super::{HnswIndex, HnswParams, IndexError, SeededRandom};
use crate::semantic::distance::DistanceFn;
use crate::semantic::lazy::{LazyRegistry, LazyValue};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSnapshot<K> {
    pub key: K,
    pub layer: usize,
    pub connections: Vec<Vec<usize>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexSnapshot<K> {
    pub params: HnswParams,
    pub dimension: Option<usize>,
    pub entry_point: Option<usize>,
    pub nodes: Vec<NodeSnapshot<K>>,
}

impl<K: Clone> HnswIndex<K> {
    pub fn snapshot(&self) -> IndexSnapshot<K> {
        IndexSnapshot {
            params: self.params.clone(),
            dimension: self.dimension,
            entry_point: self.entry_point,
            nodes: self
                .nodes
                .iter()
                .map(|node| NodeSnapshot {
                    key: node.item.key().clone(),
                    layer: node.layer,
                    connections: node.connections.clone(),
                })
                .collect(),
        }
    }
}

impl<K> HnswIndex<K> {
    /// Rebuild an index from a snapshot without re-running construction.
    ///
    /// The random source only matters for items added after the restore.
    pub fn restore(
        snapshot: IndexSnapshot<K>,
        registry: &LazyRegistry<K, Vec<f32>>,
        distance: DistanceFn,
        random: SeededRandom,
    ) -> Result<Self, IndexError> {
        Self::restore_with(snapshot, distance, random, |key| Ok(registry.wrap(key)))
    }

    /// Like [`HnswIndex::restore`], but `wrap` builds each node's handle.
    ///
    /// Handles are built in node order. The first error from `wrap` aborts
    /// the restore.
    pub fn restore_with<E, F>(
        snapshot: IndexSnapshot<K>,
        distance: DistanceFn,
        random: SeededRandom,
        mut wrap: F,
    ) -> Result<Self, E>
    where
        E: From<IndexError>,
        F: FnMut(K) -> Result<Arc<LazyValue<K, Vec<f32>>>, E>,
    {
        let count = snapshot.nodes.len();

        match snapshot.entry_point {
            Some(id) if id >= count => {
                return Err(IndexError::InvalidSnapshot(format!(
                    "entry point {id} out of range for {count} nodes"
                ))
                .into());
            }
            None if count > 0 => {
                return Err(IndexError::InvalidSnapshot(
                    "non-empty snapshot without an entry point".to_string(),
                )
                .into());
            }
            _ => {}
        }

        let mut nodes = Vec::with_capacity(count);
        for (id, node) in snapshot.nodes.into_iter().enumerate() {
            if node.connections.len() != node.layer + 1 {
                return Err(IndexError::InvalidSnapshot(format!(
                    "node {id} has {} neighbour lists for layer {}",
                    node.connections.len(),
                    node.layer
                ))
                .into());
            }
            if let Some(bad) = node.connections.iter().flatten().find(|&&n| n >= count) {
                return Err(IndexError::InvalidSnapshot(format!(
                    "node {id} links to missing node {bad}"
                ))
                .into());
            }

            nodes.push(Node {
                item: wrap(node.key)?,
                layer: node.layer,
                connections: node.connections,
            });
        }

        Ok(Self {
            params: snapshot.params,
            distance,
            random,
            nodes,
            entry_point: snapshot.entry_point,
            dimension: snapshot.dimension,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::semantic::distance::DistanceMetric;

    fn vector_for(key: &String) -> Vec<f32> {
        let n = key.len() as f32;
        vec![n.sin(), n.cos(), 1.0]
    }

    fn build() -> HnswIndex<String> {
        let registry = LazyRegistry::new(vector_for);
        let mut index = HnswIndex::new(
            HnswParams::new(4),
            DistanceMetric::Cosine.distance_fn(),
            SeededRandom::new(5),
        );
        let items = (1..40).map(|i| registry.wrap("x".repeat(i))).collect();
        index.add_items(items).unwrap();
        index
    }

    #[test]
    fn test_snapshot_holds_keys_not_vectors() {
        let index = build();
        let snapshot = index.snapshot();
        let json = serde_json::to_value(&snapshot).unwrap();

        let first = &json["nodes"][0];
        assert_eq!(first["key"], "x");
        assert!(first.get("vector").is_none());
        assert_eq!(snapshot.nodes.len(), index.len());
    }

    #[test]
    fn test_restored_index_answers_the_same() {
        let index = build();
        let json = serde_json::to_string(&index.snapshot()).unwrap();
        let snapshot: IndexSnapshot<String> = serde_json::from_str(&json).unwrap();

        let registry = LazyRegistry::new(vector_for);
        let restored = HnswIndex::restore(
            snapshot,
            &registry,
            DistanceMetric::Cosine.distance_fn(),
            SeededRandom::new(5),
        )
        .unwrap();

        assert!(restored.items().all(|item| !item.is_resolved()));

        let query = vector_for(&"x".repeat(12));
        let a: Vec<String> = index.search(&query, 5).unwrap().iter().map(|r| r.item.key().clone()).collect();
        let b: Vec<String> = restored.search(&query, 5).unwrap().iter().map(|r| r.item.key().clone()).collect();
        assert_eq!(a, b);
    }

    #[test]
    fn test_restore_rejects_dangling_edges() {
        let mut snapshot = build().snapshot();
        snapshot.nodes[0].connections[0].push(10_000);

        let registry = LazyRegistry::new(vector_for);
        let result = HnswIndex::restore(
            snapshot,
            &registry,
            DistanceMetric::Cosine.distance_fn(),
            SeededRandom::new(5),
        );
        assert!(matches!(result, Err(IndexError::InvalidSnapshot(_))));
    }
}
