//! In-memory node/edge collections for one quest
//!
//! Nodes and edges are kept in insertion order, which is also the render
//! (z) order used by hit-testing. Merges are keyed by id: inserting an id
//! that already exists, or one that was retired by a removal, is a no-op,
//! so a server response can be re-applied any number of times.
//!
//! Completion unlocks direct successors only. A LOCKED node two hops
//! downstream stays LOCKED until its own predecessor completes; the cascade
//! is deliberately single-hop.

use std::collections::BTreeSet;

use emath::Pos2;
use indexmap::IndexMap;
use tracing::{debug, warn};

use super::types::*;
use crate::error::GraphError;

/// Node/edge graph of one quest
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QuestGraph {
    nodes: IndexMap<String, QuestNode>,
    edges: IndexMap<String, QuestEdge>,
    /// Ids removed from this graph; never accepted again
    retired: BTreeSet<String>,
}

/// What a `complete_node` call changed
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Completion {
    /// False when the node was already COMPLETED
    pub newly_completed: bool,
    /// Status the node had before the call
    pub previous_status: NodeStatus,
    /// Edges switched from DOTTED to SOLID
    pub solidified: Vec<String>,
    /// Successors moved from LOCKED to NOT_STARTED
    pub unlocked: Vec<String>,
}

impl Completion {
    pub fn changed(&self) -> bool {
        self.newly_completed || !self.solidified.is_empty() || !self.unlocked.is_empty()
    }

    /// Field reverts that undo this completion of `id` and nothing else
    pub fn reverts(&self, id: &str) -> Vec<Revert> {
        let mut reverts = Vec::new();
        if self.newly_completed {
            reverts.push(Revert::node(id, NodeField::Status(NodeStatus::Completed), NodeField::Status(self.previous_status)));
        }
        reverts.extend(self.solidified.iter().map(|edge_id| Revert::Edge {
            id: edge_id.clone(),
            written: EdgeType::Solid,
            previous: EdgeType::Dotted,
        }));
        reverts.extend(self.unlocked.iter().map(|node_id| {
            Revert::node(node_id, NodeField::Status(NodeStatus::NotStarted), NodeField::Status(NodeStatus::Locked))
        }));
        reverts
    }
}

/// One node field value
#[derive(Debug, Clone, PartialEq)]
pub enum NodeField {
    Title(String),
    Description(Option<String>),
    Category(Option<String>),
    Status(NodeStatus),
    Recommended(Option<bool>),
    AiComment(Option<String>),
    Position(Pos2),
}

impl NodeField {
    /// The same field as currently held by `node`
    fn read(&self, node: &QuestNode) -> NodeField {
        match self {
            NodeField::Title(_) => NodeField::Title(node.title.clone()),
            NodeField::Description(_) => NodeField::Description(node.description.clone()),
            NodeField::Category(_) => NodeField::Category(node.category.clone()),
            NodeField::Status(_) => NodeField::Status(node.status),
            NodeField::Recommended(_) => NodeField::Recommended(node.is_recommended),
            NodeField::AiComment(_) => NodeField::AiComment(node.ai_comment.clone()),
            NodeField::Position(_) => NodeField::Position(node.position),
        }
    }

    fn write(self, node: &mut QuestNode) {
        match self {
            NodeField::Title(v) => node.title = v,
            NodeField::Description(v) => node.description = v,
            NodeField::Category(v) => node.category = v,
            NodeField::Status(v) => node.status = v,
            NodeField::Recommended(v) => node.is_recommended = v,
            NodeField::AiComment(v) => node.ai_comment = v,
            NodeField::Position(v) => node.position = v,
        }
    }
}

/// Puts back one field a command wrote.
///
/// Applies only while the field still holds `written`, so a later change
/// by some other command survives the rollback.
#[derive(Debug, Clone, PartialEq)]
pub enum Revert {
    Node {
        id: String,
        written: NodeField,
        previous: NodeField,
    },
    Edge {
        id: String,
        written: EdgeType,
        previous: EdgeType,
    },
}

impl Revert {
    pub fn node(id: impl Into<String>, written: NodeField, previous: NodeField) -> Self {
        Revert::Node {
            id: id.into(),
            written,
            previous,
        }
    }
}

impl QuestGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a graph from wire collections, applying the usual merge rules
    pub fn from_parts(nodes: Vec<QuestNode>, edges: Vec<QuestEdge>) -> Self {
        let mut graph = Self::new();
        graph.add_nodes(nodes);
        graph.add_edges(edges);
        graph
    }

    // =========================================================================
    // QUERIES
    // =========================================================================

    /// Nodes in render order
    pub fn nodes(&self) -> impl Iterator<Item = &QuestNode> {
        self.nodes.values()
    }

    pub fn edges(&self) -> impl Iterator<Item = &QuestEdge> {
        self.edges.values()
    }

    pub fn node(&self, id: &str) -> Option<&QuestNode> {
        self.nodes.get(id)
    }

    pub fn edge(&self, id: &str) -> Option<&QuestEdge> {
        self.edges.get(id)
    }

    pub fn contains_node(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn is_retired(&self, id: &str) -> bool {
        self.retired.contains(id)
    }

    /// The CURRENT or GOAL anchor, if generated
    pub fn anchor(&self, node_type: NodeType) -> Option<&QuestNode> {
        self.nodes.values().find(|n| n.node_type == node_type)
    }

    pub fn nodes_of_type(&self, node_type: NodeType) -> impl Iterator<Item = &QuestNode> {
        self.nodes.values().filter(move |n| n.node_type == node_type)
    }

    pub fn outgoing<'a>(&'a self, id: &'a str) -> impl Iterator<Item = &'a QuestEdge> + 'a {
        self.edges.values().filter(move |e| e.source_id == id)
    }

    pub fn incoming<'a>(&'a self, id: &'a str) -> impl Iterator<Item = &'a QuestEdge> + 'a {
        self.edges.values().filter(move |e| e.target_id == id)
    }

    /// Every edge endpoint resolves to a node
    pub fn is_closed(&self) -> bool {
        self.edges
            .values()
            .all(|e| self.nodes.contains_key(&e.source_id) && self.nodes.contains_key(&e.target_id))
    }

    /// Export as wire collections
    pub fn to_parts(&self) -> (Vec<QuestNode>, Vec<QuestEdge>) {
        (
            self.nodes.values().cloned().collect(),
            self.edges.values().cloned().collect(),
        )
    }

    // =========================================================================
    // MERGE
    // =========================================================================

    /// Insert nodes whose ids are new. Returns the number inserted.
    ///
    /// A second CURRENT or GOAL anchor is refused.
    pub fn add_nodes(&mut self, nodes: impl IntoIterator<Item = QuestNode>) -> usize {
        let mut inserted = 0;
        for node in nodes {
            if self.nodes.contains_key(&node.id) || self.retired.contains(&node.id) {
                continue;
            }
            if node.node_type.is_anchor() && self.anchor(node.node_type).is_some() {
                warn!(node_id = %node.id, node_type = node.node_type.as_str(), "duplicate anchor ignored");
                continue;
            }
            self.nodes.insert(node.id.clone(), node);
            inserted += 1;
        }
        inserted
    }

    /// Insert edges whose ids are new and whose endpoints exist.
    ///
    /// Edges sourced from a COMPLETED node are stored SOLID.
    pub fn add_edges(&mut self, edges: impl IntoIterator<Item = QuestEdge>) -> usize {
        let mut inserted = 0;
        for mut edge in edges {
            if self.edges.contains_key(&edge.id) || self.retired.contains(&edge.id) {
                continue;
            }
            let Some(source) = self.nodes.get(&edge.source_id) else {
                warn!(edge_id = %edge.id, source_id = %edge.source_id, "edge source missing, dropped");
                continue;
            };
            if !self.nodes.contains_key(&edge.target_id) {
                warn!(edge_id = %edge.id, target_id = %edge.target_id, "edge target missing, dropped");
                continue;
            }
            if source.is_completed() {
                edge.edge_type = EdgeType::Solid;
            }
            self.edges.insert(edge.id.clone(), edge);
            inserted += 1;
        }
        inserted
    }

    /// Merge a layout delta: nodes first so its edges can resolve
    pub fn merge(&mut self, delta: GraphDelta) -> (usize, usize) {
        let nodes = self.add_nodes(delta.nodes);
        let edges = self.add_edges(delta.edges);
        debug!(nodes, edges, "merged delta");
        (nodes, edges)
    }

    // =========================================================================
    // LIFECYCLE
    // =========================================================================

    /// Apply a partial update. Absent ids are a no-op (`Ok(false)`).
    ///
    /// A patch that sets COMPLETED runs the completion cascade; a LOCKED node
    /// cannot be moved to any other status through a patch.
    pub fn update_node(&mut self, id: &str, patch: &NodePatch) -> Result<bool, GraphError> {
        Ok(!self.patch_node(id, patch)?.is_empty())
    }

    /// `update_node` that reports what it changed as reverts; empty when
    /// nothing changed
    pub fn patch_node(&mut self, id: &str, patch: &NodePatch) -> Result<Vec<Revert>, GraphError> {
        let Some(node) = self.nodes.get_mut(id) else {
            return Ok(Vec::new());
        };

        if let Some(requested) = patch.status {
            if node.status == NodeStatus::Locked
                && requested != NodeStatus::Locked
            {
                return Err(GraphError::LockedTransition {
                    id: id.to_string(),
                    requested,
                });
            }
        }

        let mut fields = Vec::new();
        if let Some(title) = &patch.title {
            fields.push(NodeField::Title(title.clone()));
        }
        if let Some(description) = &patch.description {
            fields.push(NodeField::Description(Some(description.clone())));
        }
        if let Some(category) = &patch.category {
            fields.push(NodeField::Category(Some(category.clone())));
        }
        if let Some(recommended) = patch.is_recommended {
            fields.push(NodeField::Recommended(Some(recommended)));
        }
        if let Some(comment) = &patch.ai_comment {
            fields.push(NodeField::AiComment(Some(comment.clone())));
        }
        let completes = match patch.status {
            Some(NodeStatus::Completed) => true,
            Some(status) => {
                fields.push(NodeField::Status(status));
                false
            }
            None => false,
        };

        let mut reverts = Vec::new();
        for written in fields {
            let previous = written.read(node);
            if previous != written {
                written.clone().write(node);
                reverts.push(Revert::node(id, written, previous));
            }
        }
        if !reverts.is_empty() {
            node.touch();
        }

        if completes {
            if let Some(completion) = self.complete_node(id)? {
                reverts.extend(completion.reverts(id));
            }
        }
        Ok(reverts)
    }

    /// Mark a node COMPLETED, solidify its outgoing edges and unlock its
    /// direct LOCKED successors. Returns `Ok(None)` if the node is absent.
    ///
    /// Re-running on a completed node reproduces the same graph. A LOCKED
    /// node cannot be completed before a predecessor unlocks it.
    pub fn complete_node(&mut self, id: &str) -> Result<Option<Completion>, GraphError> {
        let Some(node) = self.nodes.get_mut(id) else {
            return Ok(None);
        };
        if node.status == NodeStatus::Locked {
            return Err(GraphError::LockedTransition {
                id: id.to_string(),
                requested: NodeStatus::Completed,
            });
        }
        let mut completion = Completion {
            previous_status: node.status,
            ..Completion::default()
        };

        if node.status != NodeStatus::Completed {
            node.status = NodeStatus::Completed;
            node.touch();
            completion.newly_completed = true;
        }

        let mut successors = Vec::new();
        for edge in self.edges.values_mut().filter(|e| e.source_id == id) {
            if edge.edge_type != EdgeType::Solid {
                edge.edge_type = EdgeType::Solid;
                completion.solidified.push(edge.id.clone());
            }
            successors.push(edge.target_id.clone());
        }

        for target_id in successors {
            if let Some(target) = self.nodes.get_mut(&target_id) {
                if target.status == NodeStatus::Locked {
                    target.status = NodeStatus::NotStarted;
                    target.touch();
                    completion.unlocked.push(target_id);
                }
            }
        }

        if completion.changed() {
            debug!(
                node_id = %id,
                solidified = completion.solidified.len(),
                unlocked = completion.unlocked.len(),
                "node completed"
            );
        }
        Ok(Some(completion))
    }

    /// Move a node. Anchors refuse; absent ids are a no-op (`Ok(false)`).
    pub fn set_position(&mut self, id: &str, position: Pos2) -> Result<bool, GraphError> {
        let Some(node) = self.nodes.get_mut(id) else {
            return Ok(false);
        };
        if node.node_type.is_anchor() {
            return Err(GraphError::AnchorImmovable {
                id: id.to_string(),
                node_type: node.node_type,
            });
        }
        if node.position == position {
            return Ok(false);
        }
        node.position = position;
        node.touch();
        Ok(true)
    }

    /// Replace the origin tag once the backend has confirmed a node
    pub fn confirm_node(&mut self, id: &str, server_id: ServerId) -> bool {
        match self.nodes.get_mut(id) {
            Some(node) if node.origin != NodeOrigin::Confirmed(server_id) => {
                node.origin = NodeOrigin::Confirmed(server_id);
                true
            }
            _ => false,
        }
    }

    /// Remove a node and every incident edge; its id is retired for good.
    pub fn remove_node(&mut self, id: &str) -> Option<QuestNode> {
        let node = self.nodes.shift_remove(id)?;
        let incident: Vec<String> = self
            .edges
            .values()
            .filter(|e| e.source_id == id || e.target_id == id)
            .map(|e| e.id.clone())
            .collect();
        for edge_id in incident {
            self.edges.shift_remove(&edge_id);
            self.retired.insert(edge_id);
        }
        self.retired.insert(id.to_string());
        debug!(node_id = %id, "node removed");
        Some(node)
    }

    /// Apply rollback reverts. Returns how many took effect.
    ///
    /// A revert is skipped when its node or edge is gone or the field no
    /// longer holds the value the command wrote. Anchors keep their position.
    pub fn revert(&mut self, reverts: Vec<Revert>) -> usize {
        let mut reverted = 0;
        for revert in reverts {
            match revert {
                Revert::Node { id, written, previous } => {
                    let Some(node) = self.nodes.get_mut(&id) else {
                        continue;
                    };
                    if written.read(node) != written
                        || (node.node_type.is_anchor() && matches!(previous, NodeField::Position(_)))
                    {
                        debug!(node_id = %id, "field changed since, revert skipped");
                        continue;
                    }
                    previous.write(node);
                    node.touch();
                    reverted += 1;
                }
                Revert::Edge { id, written, previous } => {
                    let Some(edge) = self.edges.get_mut(&id) else {
                        continue;
                    };
                    if edge.edge_type != written {
                        debug!(edge_id = %id, "edge changed since, revert skipped");
                        continue;
                    }
                    edge.edge_type = previous;
                    reverted += 1;
                }
            }
        }
        reverted
    }
}
