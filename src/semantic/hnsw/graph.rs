//! Graph internals: node storage, layer search and neighbour selection.

use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, HashMap, HashSet};
use std::sync::Arc;

use super::params::NeighbourHeuristic;
use super::HnswIndex;
use crate::semantic::lazy::LazyValue;

pub(super) type NodeId = usize;

pub(super) struct Node<K> {
    pub(super) item: Arc<LazyValue<K, Vec<f32>>>,
    pub(super) layer: usize,
    /// Neighbour lists, one per layer `0..=layer`.
    pub(super) connections: Vec<Vec<NodeId>>,
}

impl<K> Node<K> {
    pub(super) fn new(item: Arc<LazyValue<K, Vec<f32>>>, layer: usize) -> Self {
        Self {
            item,
            layer,
            connections: vec![Vec::new(); layer + 1],
        }
    }

    pub(super) fn vector(&self) -> &[f32] {
        self.item.value()
    }
}

/// A node paired with its distance to whatever is being searched for.
///
/// Ordered by distance, then id, so heap order never depends on insertion
/// into a hash set.
#[derive(Clone, Copy, Debug)]
pub(super) struct Candidate {
    pub(super) distance: f32,
    pub(super) id: NodeId,
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Candidate {}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.distance
            .total_cmp(&other.distance)
            .then_with(|| self.id.cmp(&other.id))
    }
}

/// Pairwise node distances memoised during one batch insert.
pub(super) struct DistanceCache {
    enabled: bool,
    map: HashMap<(NodeId, NodeId), f32>,
}

impl DistanceCache {
    pub(super) fn new(enabled: bool) -> Self {
        Self {
            enabled,
            map: HashMap::new(),
        }
    }

    pub(super) fn len(&self) -> usize {
        self.map.len()
    }
}

impl<K> HnswIndex<K> {
    pub(super) fn neighbours(&self, id: NodeId, layer: usize) -> &[NodeId] {
        self.nodes[id]
            .connections
            .get(layer)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub(super) fn node_distance(&self, cache: &mut DistanceCache, a: NodeId, b: NodeId) -> f32 {
        if !cache.enabled {
            return (self.distance)(self.nodes[a].vector(), self.nodes[b].vector());
        }

        let key = if a < b { (a, b) } else { (b, a) };
        if let Some(&d) = cache.map.get(&key) {
            return d;
        }
        let d = (self.distance)(self.nodes[a].vector(), self.nodes[b].vector());
        cache.map.insert(key, d);
        d
    }

    /// Draw a layer from the exponential distribution.
    pub(super) fn random_level(&self) -> usize {
        let uniform = 1.0 - self.random.next_f64();
        (-uniform.ln() * self.params.level_lambda).floor() as usize
    }

    /// Best-first search restricted to one layer.
    ///
    /// Returns up to `ef` candidates sorted by ascending distance.
    pub(super) fn search_layer<F>(
        &self,
        entry_points: &[Candidate],
        ef: usize,
        layer: usize,
        mut distance_to: F,
    ) -> Vec<Candidate>
    where
        F: FnMut(NodeId) -> f32,
    {
        let ef = ef.max(1);
        let mut visited: HashSet<NodeId> = entry_points.iter().map(|c| c.id).collect();
        let mut candidates: BinaryHeap<Reverse<Candidate>> =
            entry_points.iter().copied().map(Reverse).collect();
        let mut results: BinaryHeap<Candidate> = entry_points.iter().copied().collect();
        while results.len() > ef {
            results.pop();
        }

        while let Some(Reverse(current)) = candidates.pop() {
            let furthest = results.peek().map_or(f32::INFINITY, |c| c.distance);
            if current.distance > furthest {
                break;
            }

            for &neighbour in self.neighbours(current.id, layer) {
                if !visited.insert(neighbour) {
                    continue;
                }

                let distance = distance_to(neighbour);
                let furthest = results.peek().map_or(f32::INFINITY, |c| c.distance);
                if results.len() < ef || distance < furthest {
                    let candidate = Candidate {
                        distance,
                        id: neighbour,
                    };
                    candidates.push(Reverse(candidate));
                    results.push(candidate);
                    if results.len() > ef {
                        results.pop();
                    }
                }
            }
        }

        results.into_sorted_vec()
    }

    /// Greedy walk from `entry` down to (but not including) `target_layer`.
    pub(super) fn descend<F>(
        &self,
        entry: Candidate,
        from_layer: usize,
        target_layer: usize,
        mut distance_to: F,
    ) -> Candidate
    where
        F: FnMut(NodeId) -> f32,
    {
        let mut best = entry;
        let mut layer = from_layer;
        while layer > target_layer {
            if let Some(&closest) = self
                .search_layer(&[best], 1, layer, &mut distance_to)
                .first()
            {
                best = closest;
            }
            layer -= 1;
        }
        best
    }

    /// Pick up to `m` neighbours for `base` out of `candidates`.
    ///
    /// `candidates` carry their distance to `base`.
    pub(super) fn select_neighbours(
        &self,
        cache: &mut DistanceCache,
        base: NodeId,
        candidates: &[Candidate],
        m: usize,
        layer: usize,
    ) -> Vec<Candidate> {
        match self.params.neighbour_heuristic {
            NeighbourHeuristic::SelectSimple => {
                let mut sorted = candidates.to_vec();
                sorted.sort();
                sorted.truncate(m);
                sorted
            }
            NeighbourHeuristic::SelectHeuristic => {
                self.select_neighbours_heuristic(cache, base, candidates, m, layer)
            }
        }
    }

    fn select_neighbours_heuristic(
        &self,
        cache: &mut DistanceCache,
        base: NodeId,
        candidates: &[Candidate],
        m: usize,
        layer: usize,
    ) -> Vec<Candidate> {
        let mut seen: HashSet<NodeId> = candidates.iter().map(|c| c.id).collect();
        seen.insert(base);
        let mut working: BinaryHeap<Reverse<Candidate>> =
            candidates.iter().copied().map(Reverse).collect();

        if self.params.expand_best_selection {
            for candidate in candidates {
                for &neighbour in self.neighbours(candidate.id, layer) {
                    if seen.insert(neighbour) {
                        let distance = self.node_distance(cache, base, neighbour);
                        working.push(Reverse(Candidate {
                            distance,
                            id: neighbour,
                        }));
                    }
                }
            }
        }

        let mut selected: Vec<Candidate> = Vec::with_capacity(m);
        let mut discarded: BinaryHeap<Reverse<Candidate>> = BinaryHeap::new();

        while selected.len() < m {
            let Some(Reverse(candidate)) = working.pop() else {
                break;
            };

            let diverse = selected
                .iter()
                .all(|s| self.node_distance(cache, candidate.id, s.id) > candidate.distance);
            if diverse {
                selected.push(candidate);
            } else {
                discarded.push(Reverse(candidate));
            }
        }

        if self.params.keep_pruned_connections {
            while selected.len() < m {
                let Some(Reverse(candidate)) = discarded.pop() else {
                    break;
                };
                selected.push(candidate);
            }
        }

        selected
    }

    /// Insert the node at `id`, which must already be pushed into `nodes`.
    pub(super) fn link_node(&mut self, cache: &mut DistanceCache, id: NodeId) {
        let Some(entry_id) = self.entry_point else {
            self.entry_point = Some(id);
            return;
        };

        let level = self.nodes[id].layer;
        let top = self.nodes[entry_id].layer;

        let entry = Candidate {
            distance: self.node_distance(cache, id, entry_id),
            id: entry_id,
        };

        let best = self.descend(entry, top, level, |other| {
            (self.distance)(self.nodes[id].vector(), self.nodes[other].vector())
        });

        let mut entry_points = vec![best];
        for layer in (0..=level.min(top)).rev() {
            let found = self.search_layer(
                &entry_points,
                self.params.construction_pruning,
                layer,
                |other| self.node_distance(cache, id, other),
            );

            let max = self.params.max_connections(layer);
            let selected = self.select_neighbours(cache, id, &found, max, layer);
            self.nodes[id].connections[layer] = selected.iter().map(|c| c.id).collect();

            for neighbour in &selected {
                self.connect(cache, neighbour.id, id, layer);
            }

            entry_points = found;
        }

        if level > top {
            self.entry_point = Some(id);
        }
    }

    /// Add a `from -> to` edge, shrinking `from`'s list if it overflows.
    fn connect(&mut self, cache: &mut DistanceCache, from: NodeId, to: NodeId, layer: usize) {
        let max = self.params.max_connections(layer);
        let list = &mut self.nodes[from].connections[layer];
        if list.contains(&to) {
            return;
        }
        list.push(to);
        if list.len() <= max {
            return;
        }

        let current = list.clone();
        let candidates: Vec<Candidate> = current
            .into_iter()
            .map(|other| Candidate {
                distance: self.node_distance(cache, from, other),
                id: other,
            })
            .collect();
        let kept = self.select_neighbours(cache, from, &candidates, max, layer);
        self.nodes[from].connections[layer] = kept.into_iter().map(|c| c.id).collect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_candidate_order_breaks_ties_by_id() {
        let a = Candidate { distance: 0.5, id: 3 };
        let b = Candidate { distance: 0.5, id: 1 };
        let c = Candidate { distance: 0.1, id: 9 };

        let mut v = vec![a, b, c];
        v.sort();
        let ids: Vec<_> = v.iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![9, 1, 3]);
    }
}
