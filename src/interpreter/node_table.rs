use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::error::EditError;
use crate::dom::NodeHandle;

/// Engine-assigned identifier for a logical node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub u64);

impl NodeId {
    /// Never bound; in target position it means "top of the operand stack".
    pub const SENTINEL: NodeId = NodeId(0);

    pub fn is_sentinel(self) -> bool {
        self == Self::SENTINEL
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for NodeId {
    fn from(value: u64) -> Self {
        NodeId(value)
    }
}

/// Bidirectional map between engine ids and live nodes.
///
/// Several ids may name the same node; the reverse direction reports the most
/// recently bound one that is still live.
#[derive(Debug, Default)]
pub struct NodeTable {
    nodes: HashMap<NodeId, NodeHandle>,
    ids: HashMap<NodeHandle, Vec<NodeId>>,
}

impl NodeTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(&mut self, id: NodeId, node: NodeHandle) -> Result<(), EditError> {
        if id.is_sentinel() {
            return Err(EditError::ReservedNodeId);
        }
        if self.nodes.contains_key(&id) {
            return Err(EditError::DuplicateBinding(id));
        }
        self.nodes.insert(id, node);
        self.ids.entry(node).or_default().push(id);
        Ok(())
    }

    pub fn lookup(&self, id: NodeId) -> Result<NodeHandle, EditError> {
        self.nodes
            .get(&id)
            .copied()
            .ok_or(EditError::UnknownNode(id))
    }

    /// Idempotent: unbinding an unknown id is a no-op.
    pub fn unbind(&mut self, id: NodeId) -> Option<NodeHandle> {
        let node = self.nodes.remove(&id)?;
        self.forget_alias(node, id);
        Some(node)
    }

    /// Swaps the node behind an existing id, returning the node it replaced.
    /// Other ids naming either node are left alone.
    pub fn rebind(&mut self, id: NodeId, node: NodeHandle) -> Result<NodeHandle, EditError> {
        let previous = self.lookup(id)?;
        self.forget_alias(previous, id);
        self.nodes.insert(id, node);
        self.ids.entry(node).or_default().push(id);
        Ok(previous)
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    /// Reverse lookup used when resolving event targets.
    pub fn id_of(&self, node: NodeHandle) -> Option<NodeId> {
        self.ids.get(&node).and_then(|ids| ids.last()).copied()
    }

    /// Every id currently naming `node`, oldest first.
    pub fn ids_of(&self, node: NodeHandle) -> &[NodeId] {
        self.ids.get(&node).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Drops every binding whose node satisfies `predicate`, returning the
    /// released ids.
    pub fn unbind_where(&mut self, mut predicate: impl FnMut(NodeHandle) -> bool) -> Vec<NodeId> {
        let doomed: Vec<NodeId> = self
            .nodes
            .iter()
            .filter(|(_, node)| predicate(**node))
            .map(|(id, _)| *id)
            .collect();
        for id in &doomed {
            self.unbind(*id);
        }
        doomed
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn forget_alias(&mut self, node: NodeHandle, id: NodeId) {
        if let Some(ids) = self.ids.get_mut(&node) {
            ids.retain(|alias| *alias != id);
            if ids.is_empty() {
                self.ids.remove(&node);
            }
        }
    }
}
