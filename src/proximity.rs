//! Proximity Index
//!
//! Uniform spatial hash over node positions, rebuilt from scratch every
//! tick. Cells are `radio_range` on a side, so any pair within range sits
//! in the same cell or one of its 8 neighbors. Rebuild and query are both
//! linear-ish at the target scale (a few hundred nodes), never quadratic.

use crate::store::NodeStore;
use crate::types::{NodeId, Position};
use std::collections::HashMap;

/// Spatial hash index answering range queries over current positions
#[derive(Debug, Default)]
pub struct SpatialGrid {
    cell_size: f64,
    cells: HashMap<(i64, i64), Vec<NodeId>>,
    positions: HashMap<NodeId, Position>,
}

impl SpatialGrid {
    /// Create an index with the given cell size (normally the radio range)
    pub fn new(cell_size: f64) -> Self {
        Self {
            cell_size,
            cells: HashMap::new(),
            positions: HashMap::new(),
        }
    }

    fn cell_of(&self, position: &Position) -> (i64, i64) {
        (
            (position.x / self.cell_size).floor() as i64,
            (position.y / self.cell_size).floor() as i64,
        )
    }

    /// Rebuild the index from the store. Insertion follows the store's
    /// `NodeId` order, so per-cell candidate lists are deterministic.
    pub fn rebuild(&mut self, store: &NodeStore) {
        self.cells.clear();
        self.positions.clear();
        for node in store.iter() {
            let cell = self.cell_of(&node.position);
            self.cells.entry(cell).or_default().push(node.id);
            self.positions.insert(node.id, node.position);
        }
    }

    /// All nodes within `radius` of `point`, excluding `exclude` if given.
    /// Sorted by `NodeId`.
    pub fn neighbors_within(
        &self,
        point: &Position,
        radius: f64,
        exclude: Option<NodeId>,
    ) -> Vec<NodeId> {
        let mut result = Vec::new();
        let (cx, cy) = self.cell_of(point);
        // Radius may exceed the cell size; widen the scan accordingly.
        let reach = (radius / self.cell_size).ceil() as i64;
        for dx in -reach..=reach {
            for dy in -reach..=reach {
                if let Some(candidates) = self.cells.get(&(cx + dx, cy + dy)) {
                    for &id in candidates {
                        if Some(id) == exclude {
                            continue;
                        }
                        let position = &self.positions[&id];
                        if point.distance_to(position) <= radius {
                            result.push(id);
                        }
                    }
                }
            }
        }
        result.sort_unstable();
        result
    }

    /// All unordered pairs within `radius` of each other. Each pair appears
    /// exactly once as `(low, high)`; the list is sorted. Coincident nodes
    /// are neither duplicated nor omitted.
    pub fn pairs_within(&self, radius: f64) -> Vec<(NodeId, NodeId)> {
        let mut result = Vec::new();
        for (&id, position) in &self.positions {
            for other in self.neighbors_within(position, radius, Some(id)) {
                if id < other {
                    result.push((id, other));
                }
            }
        }
        result.sort_unstable();
        result
    }

    /// Position of a node as of the last rebuild
    pub fn position_of(&self, id: NodeId) -> Option<Position> {
        self.positions.get(&id).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimConfig;
    use crate::store::NodeSpec;

    fn grid_for(positions: &[(u64, f64, f64)]) -> SpatialGrid {
        let config = SimConfig::default();
        let mut store = NodeStore::new();
        for &(id, x, y) in positions {
            store
                .insert(NodeSpec::benign(id, x, y, 10.0, 0.0), &config)
                .unwrap();
        }
        let mut grid = SpatialGrid::new(250.0);
        grid.rebuild(&store);
        grid
    }

    #[test]
    fn neighbors_respect_radius() {
        let grid = grid_for(&[(1, 0.0, 0.0), (2, 100.0, 0.0), (3, 400.0, 0.0)]);
        let neighbors = grid.neighbors_within(&Position::new(0.0, 0.0), 250.0, Some(NodeId(1)));
        assert_eq!(neighbors, vec![NodeId(2)]);
    }

    #[test]
    fn pairs_cross_cell_borders() {
        // 240 and 260 land in different cells but are within 250 of each other.
        let grid = grid_for(&[(1, 240.0, 0.0), (2, 260.0, 0.0)]);
        assert_eq!(grid.pairs_within(250.0), vec![(NodeId(1), NodeId(2))]);
    }

    #[test]
    fn coincident_nodes_produce_one_pair() {
        let grid = grid_for(&[(1, 50.0, 50.0), (2, 50.0, 50.0)]);
        let pairs = grid.pairs_within(250.0);
        assert_eq!(pairs, vec![(NodeId(1), NodeId(2))]);
    }

    #[test]
    fn query_radius_larger_than_cell_size() {
        let grid = grid_for(&[(1, 0.0, 0.0), (2, 590.0, 0.0)]);
        let neighbors = grid.neighbors_within(&Position::new(0.0, 0.0), 600.0, Some(NodeId(1)));
        assert_eq!(neighbors, vec![NodeId(2)]);
    }

    #[test]
    fn rebuild_replaces_stale_entries() {
        let config = SimConfig::default();
        let mut store = NodeStore::new();
        store
            .insert(NodeSpec::benign(1, 0.0, 0.0, 10.0, 0.0), &config)
            .unwrap();
        let mut grid = SpatialGrid::new(250.0);
        grid.rebuild(&store);
        assert_eq!(grid.position_of(NodeId(1)).unwrap().x, 0.0);

        let update = crate::types::MobilityUpdate {
            node_id: NodeId(1),
            position: Position::new(500.0, 0.0),
            speed: 10.0,
            heading: 0.0,
            lane_hint: 0,
        };
        store.apply_mobility(1, &[update], 10.0, 75.0).unwrap();
        grid.rebuild(&store);
        assert_eq!(grid.position_of(NodeId(1)).unwrap().x, 500.0);
        assert!(grid
            .neighbors_within(&Position::new(0.0, 0.0), 250.0, None)
            .is_empty());
    }
}
