//! Organizational hierarchy graph.
//!
//! The graph is an immutable snapshot tree keyed by [`NodeId`]. Structural edits
//! (`with_node`, `with_parent`, `without_node`) validate against the current
//! tree and return a new graph, so a cycle or a second root can never be
//! committed.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use hrgate_core::NodeId;

/// Level of a hierarchy node.
///
/// Variants are declared in evaluation order: a child must always sit at a
/// strictly deeper level than its parent.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
    Global,
    Company,
    Location,
    Department,
    Team,
    Role,
    User,
}

impl NodeType {
    pub fn as_str(self) -> &'static str {
        match self {
            NodeType::Global => "global",
            NodeType::Company => "company",
            NodeType::Location => "location",
            NodeType::Department => "department",
            NodeType::Team => "team",
            NodeType::Role => "role",
            NodeType::User => "user",
        }
    }
}

impl core::fmt::Display for NodeType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HierarchyNode {
    pub id: NodeId,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    #[serde(default)]
    pub parent_id: Option<NodeId>,
    pub name: String,
}

impl HierarchyNode {
    pub fn root(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: NodeId::new(id),
            node_type: NodeType::Global,
            parent_id: None,
            name: name.into(),
        }
    }

    pub fn child(
        id: impl Into<String>,
        node_type: NodeType,
        parent: &NodeId,
        name: impl Into<String>,
    ) -> Self {
        Self {
            id: NodeId::new(id),
            node_type,
            parent_id: Some(parent.clone()),
            name: name.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HierarchyError {
    #[error("hierarchy node not found: {0}")]
    NodeNotFound(NodeId),

    #[error("cycle detected: '{node}' cannot be placed under '{parent}'")]
    CycleDetected { node: NodeId, parent: NodeId },

    #[error("duplicate hierarchy node: {0}")]
    DuplicateNode(NodeId),

    #[error("global root already exists: {0}")]
    RootAlreadyExists(NodeId),

    #[error("hierarchy has no global root")]
    MissingRoot,

    #[error("invalid placement of '{node}': {reason}")]
    InvalidPlacement { node: NodeId, reason: String },

    #[error("node '{0}' still has child nodes")]
    HasChildren(NodeId),
}

/// Immutable tree of organizational scope nodes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HierarchyGraph {
    nodes: BTreeMap<NodeId, HierarchyNode>,
    children: BTreeMap<NodeId, BTreeSet<NodeId>>,
    root: Option<NodeId>,
}

impl HierarchyGraph {
    /// An empty graph. The first node added must be the global root.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a graph from unordered rows (as loaded from the record store).
    ///
    /// Rows are attached breadth-first from the root; rows that can never be
    /// attached either reference a missing parent or form a cycle.
    pub fn from_nodes(rows: impl IntoIterator<Item = HierarchyNode>) -> Result<Self, HierarchyError> {
        let mut pending: BTreeMap<NodeId, HierarchyNode> = BTreeMap::new();
        for row in rows {
            if pending.contains_key(&row.id) {
                return Err(HierarchyError::DuplicateNode(row.id));
            }
            pending.insert(row.id.clone(), row);
        }

        let mut graph = Self::new();
        let roots: Vec<NodeId> = pending
            .values()
            .filter(|n| n.parent_id.is_none())
            .map(|n| n.id.clone())
            .collect();
        let root_id = match roots.as_slice() {
            [] => return Err(HierarchyError::MissingRoot),
            [only] => only.clone(),
            [_, second, ..] => return Err(HierarchyError::RootAlreadyExists(second.clone())),
        };

        let mut by_parent: BTreeMap<NodeId, Vec<NodeId>> = BTreeMap::new();
        for node in pending.values() {
            if let Some(parent) = &node.parent_id {
                by_parent.entry(parent.clone()).or_default().push(node.id.clone());
            }
        }

        let mut queue = VecDeque::from([root_id]);
        while let Some(id) = queue.pop_front() {
            let Some(node) = pending.remove(&id) else {
                continue;
            };
            graph.attach(node)?;
            if let Some(kids) = by_parent.get(&id) {
                queue.extend(kids.iter().cloned());
            }
        }

        match pending.values().next() {
            Some(orphan) => Err(unattached_error(&pending, orphan)),
            None => Ok(graph),
        }
    }

    /// Return a new graph with `node` added.
    pub fn with_node(&self, node: HierarchyNode) -> Result<Self, HierarchyError> {
        let mut next = self.clone();
        next.attach(node)?;
        Ok(next)
    }

    /// Return a new graph with `node_id` re-parented under `new_parent`.
    ///
    /// Rejected when `new_parent` is the node itself or one of its descendants.
    pub fn with_parent(&self, node_id: &NodeId, new_parent: &NodeId) -> Result<Self, HierarchyError> {
        let node = self.node(node_id)?.clone();
        let parent = self.node(new_parent)?;

        if node.parent_id.is_none() {
            return Err(HierarchyError::InvalidPlacement {
                node: node_id.clone(),
                reason: "the global root cannot be moved".to_string(),
            });
        }
        if node_id == new_parent || self.is_ancestor(node_id, new_parent)? {
            return Err(HierarchyError::CycleDetected {
                node: node_id.clone(),
                parent: new_parent.clone(),
            });
        }
        check_placement(&node, parent)?;

        let mut next = self.clone();
        if let Some(old_parent) = &node.parent_id {
            if let Some(siblings) = next.children.get_mut(old_parent) {
                siblings.remove(node_id);
            }
        }
        next.children
            .entry(new_parent.clone())
            .or_default()
            .insert(node_id.clone());
        if let Some(stored) = next.nodes.get_mut(node_id) {
            stored.parent_id = Some(new_parent.clone());
        }
        Ok(next)
    }

    /// Return a new graph without `node_id`. Only leaf nodes can be removed.
    pub fn without_node(&self, node_id: &NodeId) -> Result<Self, HierarchyError> {
        let node = self.node(node_id)?;
        if !self.children(node_id)?.is_empty() {
            return Err(HierarchyError::HasChildren(node_id.clone()));
        }
        if node.parent_id.is_none() {
            return Err(HierarchyError::InvalidPlacement {
                node: node_id.clone(),
                reason: "the global root cannot be removed".to_string(),
            });
        }

        let mut next = self.clone();
        if let Some(parent) = &node.parent_id {
            if let Some(siblings) = next.children.get_mut(parent) {
                siblings.remove(node_id);
            }
        }
        next.children.remove(node_id);
        next.nodes.remove(node_id);
        Ok(next)
    }

    pub fn node(&self, id: &NodeId) -> Result<&HierarchyNode, HierarchyError> {
        self.nodes
            .get(id)
            .ok_or_else(|| HierarchyError::NodeNotFound(id.clone()))
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn root(&self) -> Option<&HierarchyNode> {
        self.root.as_ref().and_then(|id| self.nodes.get(id))
    }

    pub fn parent(&self, id: &NodeId) -> Result<Option<&HierarchyNode>, HierarchyError> {
        let node = self.node(id)?;
        match &node.parent_id {
            Some(parent) => self.node(parent).map(Some),
            None => Ok(None),
        }
    }

    /// Children of `id`, ordered by node id.
    pub fn children(&self, id: &NodeId) -> Result<Vec<&HierarchyNode>, HierarchyError> {
        self.node(id)?;
        Ok(self
            .children
            .get(id)
            .into_iter()
            .flatten()
            .filter_map(|child| self.nodes.get(child))
            .collect())
    }

    /// Nodes from the global root down to `id` (inclusive), root first.
    pub fn path_to_root(&self, id: &NodeId) -> Result<Vec<&HierarchyNode>, HierarchyError> {
        let mut path = Vec::new();
        let mut cursor = Some(self.node(id)?);
        while let Some(node) = cursor {
            if path.len() > self.nodes.len() {
                return Err(HierarchyError::CycleDetected {
                    node: id.clone(),
                    parent: node.id.clone(),
                });
            }
            path.push(node);
            cursor = match &node.parent_id {
                Some(parent) => Some(self.node(parent)?),
                None => None,
            };
        }
        path.reverse();
        Ok(path)
    }

    /// Whether `ancestor` lies strictly above `id`.
    pub fn is_ancestor(&self, ancestor: &NodeId, id: &NodeId) -> Result<bool, HierarchyError> {
        Ok(self
            .path_to_root(id)?
            .iter()
            .any(|n| &n.id == ancestor && &n.id != id))
    }

    /// The unique `role` node named `name`, if exactly one exists.
    pub fn role_node(&self, name: &str) -> Option<&HierarchyNode> {
        let mut matches = self
            .nodes
            .values()
            .filter(|n| n.node_type == NodeType::Role && n.name == name);
        let first = matches.next()?;
        match matches.next() {
            Some(_) => None,
            None => Some(first),
        }
    }

    /// All nodes, ordered by id.
    pub fn nodes(&self) -> impl Iterator<Item = &HierarchyNode> {
        self.nodes.values()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn attach(&mut self, node: HierarchyNode) -> Result<(), HierarchyError> {
        if self.nodes.contains_key(&node.id) {
            return Err(HierarchyError::DuplicateNode(node.id));
        }

        match &node.parent_id {
            None => {
                if let Some(existing) = &self.root {
                    return Err(HierarchyError::RootAlreadyExists(existing.clone()));
                }
                if node.node_type != NodeType::Global {
                    return Err(HierarchyError::InvalidPlacement {
                        node: node.id,
                        reason: "only the global node may have no parent".to_string(),
                    });
                }
                self.root = Some(node.id.clone());
            }
            Some(parent_id) => {
                if parent_id == &node.id {
                    return Err(HierarchyError::CycleDetected {
                        node: node.id.clone(),
                        parent: parent_id.clone(),
                    });
                }
                let parent = self.node(parent_id)?;
                check_placement(&node, parent)?;
                self.children
                    .entry(parent_id.clone())
                    .or_default()
                    .insert(node.id.clone());
            }
        }

        self.nodes.insert(node.id.clone(), node);
        Ok(())
    }
}

/// Explain why `orphan` could not be attached: its parent chain either leaves
/// the row set or loops back on itself.
fn unattached_error(pending: &BTreeMap<NodeId, HierarchyNode>, orphan: &HierarchyNode) -> HierarchyError {
    let mut seen = BTreeSet::new();
    let mut cursor = orphan;
    loop {
        seen.insert(cursor.id.clone());
        let Some(parent) = &cursor.parent_id else {
            return HierarchyError::MissingRoot;
        };
        if seen.contains(parent) {
            return HierarchyError::CycleDetected {
                node: cursor.id.clone(),
                parent: parent.clone(),
            };
        }
        match pending.get(parent) {
            Some(next) => cursor = next,
            None => return HierarchyError::NodeNotFound(parent.clone()),
        }
    }
}

fn check_placement(node: &HierarchyNode, parent: &HierarchyNode) -> Result<(), HierarchyError> {
    if node.node_type <= parent.node_type {
        return Err(HierarchyError::InvalidPlacement {
            node: node.id.clone(),
            reason: format!(
                "a {} node cannot sit under a {} node",
                node.node_type, parent.node_type
            ),
        });
    }
    Ok(())
}
