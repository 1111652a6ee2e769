use serde::{Deserialize, Serialize};

/// Default number of neighbours per node on upper layers.
pub const DEFAULT_M: usize = 15;

/// Default candidate list size explored while inserting.
pub const DEFAULT_CONSTRUCTION_PRUNING: usize = 400;

/// How neighbours are chosen among insertion candidates.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NeighbourHeuristic {
    /// Keep the `M` closest candidates.
    SelectSimple,
    /// Prefer candidates that are closer to the new node than to any
    /// neighbour already selected, which spreads edges across directions.
    #[default]
    SelectHeuristic,
}

/// Construction parameters, fixed when the index is created.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HnswParams {
    /// Max neighbours per node on layers above 0. Layer 0 allows `2 * m`.
    pub m: usize,
    /// Scale of the exponential level distribution, canonically `1 / ln(m)`.
    pub level_lambda: f64,
    pub construction_pruning: usize,
    pub neighbour_heuristic: NeighbourHeuristic,
    /// Also consider the candidates' own neighbours during selection.
    pub expand_best_selection: bool,
    /// Top up a heuristic selection with discarded candidates until `m` is reached.
    pub keep_pruned_connections: bool,
    /// Memoise pairwise node distances for the duration of a batch insert.
    pub enable_distance_cache: bool,
}

impl HnswParams {
    pub fn new(m: usize) -> Self {
        Self {
            m,
            level_lambda: default_level_lambda(m),
            ..Self::default()
        }
    }

    /// Maximum number of connections a node keeps on `layer`.
    pub fn max_connections(&self, layer: usize) -> usize {
        if layer == 0 {
            self.m * 2
        } else {
            self.m
        }
    }
}

impl Default for HnswParams {
    fn default() -> Self {
        Self {
            m: DEFAULT_M,
            level_lambda: default_level_lambda(DEFAULT_M),
            construction_pruning: DEFAULT_CONSTRUCTION_PRUNING,
            neighbour_heuristic: NeighbourHeuristic::SelectHeuristic,
            expand_best_selection: true,
            keep_pruned_connections: true,
            enable_distance_cache: true,
        }
    }
}

pub fn default_level_lambda(m: usize) -> f64 {
    1.0 / (m.max(2) as f64).ln()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_lambda_matches_m() {
        let params = HnswParams::new(15);
        assert!((params.level_lambda - 1.0 / 15f64.ln()).abs() < 1e-12);
    }

    #[test]
    fn test_layer_zero_has_double_capacity() {
        let params = HnswParams::new(8);
        assert_eq!(params.max_connections(0), 16);
        assert_eq!(params.max_connections(1), 8);
        assert_eq!(params.max_connections(5), 8);
    }
}
