//! Node bounding boxes by type

use emath::{Pos2, Rect, Vec2};

use crate::model::{NodeType, QuestNode};

/// Box size per node type. Anchors are larger, CHOICE is a wide rectangle,
/// FUTURE a smaller dashed box.
pub fn node_size(node_type: NodeType) -> Vec2 {
    match node_type {
        NodeType::Current | NodeType::Goal => Vec2::new(180.0, 90.0),
        NodeType::Choice => Vec2::new(220.0, 70.0),
        NodeType::Future => Vec2::new(150.0, 60.0),
    }
}

/// Box of a node in map coordinates (`position` is the top-left corner)
pub fn node_rect(node: &QuestNode) -> Rect {
    Rect::from_min_size(node.position, node_size(node.node_type))
}

/// Where outgoing edges leave a node
pub fn source_anchor(node: &QuestNode) -> Pos2 {
    node_rect(node).right_center()
}

/// Where incoming edges enter a node
pub fn target_anchor(node: &QuestNode) -> Pos2 {
    node_rect(node).left_center()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::NodeStatus;

    #[test]
    fn test_anchor_points() {
        let node = QuestNode::new("c", "c", NodeType::Choice, NodeStatus::NotStarted, Pos2::new(10.0, 20.0));
        assert_eq!(source_anchor(&node), Pos2::new(230.0, 55.0));
        assert_eq!(target_anchor(&node), Pos2::new(10.0, 55.0));
    }

    #[test]
    fn test_anchor_boxes_are_larger() {
        let anchor = node_size(NodeType::Goal);
        let future = node_size(NodeType::Future);
        assert!(anchor.x > future.x && anchor.y > future.y);
    }
}
