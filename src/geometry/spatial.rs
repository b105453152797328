//! Spatial index for pointer hit testing
//!
//! Uses an R-tree (via `rstar`) over node boxes in map coordinates. Boxes may
//! overlap after a drag; the topmost one in render order wins.

use emath::Pos2;
use rstar::{Envelope, PointDistance, RTree, RTreeObject, AABB};

use super::bounds::node_rect;
use crate::model::{NodeType, QuestGraph};

/// Index entry for one rendered node
#[derive(Debug, Clone)]
pub struct SpatialNode {
    pub id: String,
    pub node_type: NodeType,
    /// Render order; higher is drawn later (on top)
    pub z: usize,
    bounds: AABB<[f32; 2]>,
}

impl SpatialNode {
    pub fn new(id: impl Into<String>, node_type: NodeType, z: usize, min: [f32; 2], max: [f32; 2]) -> Self {
        Self {
            id: id.into(),
            node_type,
            z,
            bounds: AABB::from_corners(min, max),
        }
    }

    pub fn bounds(&self) -> &AABB<[f32; 2]> {
        &self.bounds
    }
}

impl RTreeObject for SpatialNode {
    type Envelope = AABB<[f32; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.bounds
    }
}

impl PointDistance for SpatialNode {
    fn distance_2(&self, point: &[f32; 2]) -> f32 {
        self.bounds.distance_2(point)
    }

    fn contains_point(&self, point: &[f32; 2]) -> bool {
        self.bounds.contains_point(point)
    }
}

/// R-tree of node boxes
pub struct SpatialIndex {
    tree: RTree<SpatialNode>,
}

impl Default for SpatialIndex {
    fn default() -> Self {
        Self { tree: RTree::new() }
    }
}

impl std::fmt::Debug for SpatialIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpatialIndex")
            .field("count", &self.tree.size())
            .finish_non_exhaustive()
    }
}

impl SpatialIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index every node of `graph` at its current position
    pub fn from_graph(graph: &QuestGraph) -> Self {
        let entries = graph
            .nodes()
            .enumerate()
            .map(|(z, node)| {
                let rect = node_rect(node);
                SpatialNode::new(
                    node.id.clone(),
                    node.node_type,
                    z,
                    [rect.min.x, rect.min.y],
                    [rect.max.x, rect.max.y],
                )
            })
            .collect();
        Self {
            tree: RTree::bulk_load(entries),
        }
    }

    /// Topmost node whose box contains `point`
    pub fn hit_test(&self, point: Pos2) -> Option<&SpatialNode> {
        self.tree
            .locate_all_at_point(&[point.x, point.y])
            .max_by_key(|node| node.z)
    }

    /// Nodes whose boxes intersect a map-space rectangle
    pub fn query_rect(&self, min: Pos2, max: Pos2) -> Vec<&SpatialNode> {
        let bounds = AABB::from_corners([min.x, min.y], [max.x, max.y]);
        self.tree.locate_in_envelope_intersecting(&bounds).collect()
    }

    pub fn len(&self) -> usize {
        self.tree.size()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{NodeStatus, QuestNode};
    use proptest::prelude::*;

    fn graph_with(nodes: &[(&str, NodeType, f32, f32)]) -> QuestGraph {
        QuestGraph::from_parts(
            nodes
                .iter()
                .map(|(id, t, x, y)| QuestNode::new(*id, *id, *t, NodeStatus::NotStarted, Pos2::new(*x, *y)))
                .collect(),
            vec![],
        )
    }

    #[test]
    fn test_empty_index() {
        let index = SpatialIndex::new();
        assert!(index.is_empty());
        assert!(index.hit_test(Pos2::ZERO).is_none());
    }

    #[test]
    fn test_hit_inside_and_miss() {
        let graph = graph_with(&[("a", NodeType::Choice, 0.0, 0.0)]);
        let index = SpatialIndex::from_graph(&graph);
        assert_eq!(index.hit_test(Pos2::new(100.0, 30.0)).unwrap().id, "a");
        assert!(index.hit_test(Pos2::new(230.0, 30.0)).is_none());
    }

    #[test]
    fn test_overlap_resolves_topmost() {
        let graph = graph_with(&[
            ("under", NodeType::Choice, 0.0, 0.0),
            ("over", NodeType::Future, 50.0, 10.0),
        ]);
        let index = SpatialIndex::from_graph(&graph);
        assert_eq!(index.hit_test(Pos2::new(60.0, 20.0)).unwrap().id, "over");
        assert_eq!(index.hit_test(Pos2::new(10.0, 5.0)).unwrap().id, "under");
    }

    #[test]
    fn test_point_distance_uses_box() {
        let node = SpatialNode::new("a", NodeType::Choice, 0, [0.0, 0.0], [10.0, 10.0]);
        assert!(node.contains_point(&[5.0, 5.0]));
        assert!(!node.contains_point(&[13.0, 14.0]));
        assert_eq!(node.distance_2(&[5.0, 5.0]), 0.0);
        assert_eq!(node.distance_2(&[13.0, 14.0]), 25.0);
    }

    #[test]
    fn test_query_rect() {
        let graph = graph_with(&[
            ("a", NodeType::Future, 0.0, 0.0),
            ("b", NodeType::Future, 1000.0, 1000.0),
        ]);
        let index = SpatialIndex::from_graph(&graph);
        let found = index.query_rect(Pos2::new(-10.0, -10.0), Pos2::new(20.0, 20.0));
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, "a");
    }

    proptest! {
        // Nodes on a grid wider than any box never overlap, so every interior
        // point resolves to exactly its own node and gaps resolve to none.
        #[test]
        fn hit_test_exclusive(col in 0usize..6, row in 0usize..6, fx in 0.01f32..0.99, fy in 0.01f32..0.99) {
            let mut nodes = Vec::new();
            for r in 0..6 {
                for c in 0..6 {
                    let id = format!("n{}_{}", r, c);
                    nodes.push(QuestNode::new(
                        id,
                        "n",
                        NodeType::Future,
                        NodeStatus::NotStarted,
                        Pos2::new(c as f32 * 300.0, r as f32 * 200.0),
                    ));
                }
            }
            let graph = QuestGraph::from_parts(nodes, vec![]);
            let index = SpatialIndex::from_graph(&graph);

            let inside = Pos2::new(col as f32 * 300.0 + 150.0 * fx, row as f32 * 200.0 + 60.0 * fy);
            let expected = format!("n{}_{}", row, col);
            prop_assert_eq!(index.hit_test(inside).map(|n| n.id.clone()), Some(expected));

            let gap = Pos2::new(col as f32 * 300.0 + 160.0 + 100.0 * fx, row as f32 * 200.0 + 70.0 + 100.0 * fy);
            prop_assert!(index.hit_test(gap).is_none());
        }
    }
}
