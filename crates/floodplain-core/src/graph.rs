use crate::error::StructuralError;
use crate::id::*;
use serde::{Deserialize, Serialize};
use slotmap::{SecondaryMap, SlotMap};

// ---------------------------------------------------------------------------
// Core data structures
// ---------------------------------------------------------------------------

/// Which kind of flow-network member a node is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    /// A river reach with hydrology, dike and retention state.
    Segment,
    /// A headwater that draws its discharge stochastically.
    Source,
}

/// Adjacency lists for a single node, tracking incoming and outgoing edges.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct NodeAdjacency {
    /// Edges whose destination is this node.
    inputs: Vec<EdgeId>,
    /// Edges whose source is this node.
    outputs: Vec<EdgeId>,
}

/// Per-node data stored in the flow graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeData {
    pub kind: NodeKind,
}

/// Per-edge data stored in the flow graph. Water flows `from -> to`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeData {
    pub from: NodeId,
    pub to: NodeId,
}

/// A structural change, recorded for whoever keeps derived orderings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphChange {
    NodeAdded(NodeId),
    NodeRemoved(NodeId),
    EdgeAdded { edge: EdgeId, from: NodeId, to: NodeId },
    EdgeRemoved { edge: EdgeId, from: NodeId, to: NodeId },
}

// ---------------------------------------------------------------------------
// FlowGraph
// ---------------------------------------------------------------------------

/// The river network: a directed multigraph of segments and sources, plus
/// the segment -> steward ownership association.
///
/// Topology lives here and only here; segments and stewards carry scalar
/// state. Every mutation appends a [`GraphChange`] that the owner drains
/// (see [`FlowGraph::drain_changes`]) to keep its schedule current.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct FlowGraph {
    nodes: SlotMap<NodeId, NodeData>,
    edges: SlotMap<EdgeId, EdgeData>,
    adjacency: SecondaryMap<NodeId, NodeAdjacency>,
    /// At most one owner per segment.
    owners: SecondaryMap<NodeId, StewardId>,

    /// Changes not yet drained.
    #[serde(skip)]
    changes: Vec<GraphChange>,
}

impl FlowGraph {
    pub fn new() -> Self {
        Self::default()
    }

    // -----------------------------------------------------------------------
    // Mutation
    // -----------------------------------------------------------------------

    /// Add a node of the given kind.
    pub fn add_node(&mut self, kind: NodeKind) -> NodeId {
        let node = self.nodes.insert(NodeData { kind });
        self.adjacency.insert(node, NodeAdjacency::default());
        self.changes.push(GraphChange::NodeAdded(node));
        node
    }

    /// Remove a node, its incident edges and its ownership entry.
    /// Returns `false` if the node did not exist.
    pub fn remove_node(&mut self, node: NodeId) -> bool {
        let Some(adj) = self.adjacency.get(node) else {
            return false;
        };
        let incident: Vec<EdgeId> = adj
            .inputs
            .iter()
            .chain(adj.outputs.iter())
            .copied()
            .collect();
        for edge in incident {
            self.disconnect(edge);
        }
        self.nodes.remove(node);
        self.adjacency.remove(node);
        self.owners.remove(node);
        self.changes.push(GraphChange::NodeRemoved(node));
        true
    }

    /// Add a flow edge `from -> to`. Parallel edges are allowed; ordering
    /// invariants (acyclic, single outflow) are checked by the scheduler.
    pub fn connect(&mut self, from: NodeId, to: NodeId) -> Result<EdgeId, StructuralError> {
        if !self.nodes.contains_key(from) {
            return Err(StructuralError::UnknownNode(from));
        }
        if !self.nodes.contains_key(to) {
            return Err(StructuralError::UnknownNode(to));
        }
        let edge = self.edges.insert(EdgeData { from, to });
        if let Some(adj) = self.adjacency.get_mut(from) {
            adj.outputs.push(edge);
        }
        if let Some(adj) = self.adjacency.get_mut(to) {
            adj.inputs.push(edge);
        }
        self.changes.push(GraphChange::EdgeAdded { edge, from, to });
        Ok(edge)
    }

    /// Remove an edge. Returns its endpoints, or `None` if it did not exist.
    pub fn disconnect(&mut self, edge: EdgeId) -> Option<EdgeData> {
        let data = self.edges.remove(edge)?;
        if let Some(adj) = self.adjacency.get_mut(data.from) {
            adj.outputs.retain(|&e| e != edge);
        }
        if let Some(adj) = self.adjacency.get_mut(data.to) {
            adj.inputs.retain(|&e| e != edge);
        }
        self.changes.push(GraphChange::EdgeRemoved {
            edge,
            from: data.from,
            to: data.to,
        });
        Some(data)
    }

    /// Make `steward` the owner of `segment`.
    ///
    /// Fails with [`StructuralError::MultipleOwners`] if a different steward
    /// already owns it. Reassigning the same owner is a no-op.
    pub fn assign_owner(
        &mut self,
        segment: NodeId,
        steward: StewardId,
    ) -> Result<(), StructuralError> {
        match self.nodes.get(segment) {
            None => return Err(StructuralError::UnknownNode(segment)),
            Some(data) if data.kind != NodeKind::Segment => {
                return Err(StructuralError::NotASegment(segment));
            }
            Some(_) => {}
        }
        match self.owners.get(segment) {
            Some(&owner) if owner != steward => {
                Err(StructuralError::MultipleOwners { segment, owner })
            }
            _ => {
                self.owners.insert(segment, steward);
                Ok(())
            }
        }
    }

    /// Drop the ownership entry of a segment, returning the former owner.
    pub fn release_owner(&mut self, segment: NodeId) -> Option<StewardId> {
        self.owners.remove(segment)
    }

    /// Take all recorded changes, oldest first.
    pub fn drain_changes(&mut self) -> Vec<GraphChange> {
        std::mem::take(&mut self.changes)
    }

    pub fn has_pending_changes(&self) -> bool {
        !self.changes.is_empty()
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    pub fn get_node(&self, node: NodeId) -> Option<&NodeData> {
        self.nodes.get(node)
    }

    pub fn get_edge(&self, edge: EdgeId) -> Option<&EdgeData> {
        self.edges.get(edge)
    }

    pub fn kind_of(&self, node: NodeId) -> Option<NodeKind> {
        self.nodes.get(node).map(|n| n.kind)
    }

    /// Get the edges coming into a node.
    pub fn get_inputs(&self, node: NodeId) -> &[EdgeId] {
        self.adjacency
            .get(node)
            .map(|adj| adj.inputs.as_slice())
            .unwrap_or(&[])
    }

    /// Get the edges going out of a node.
    pub fn get_outputs(&self, node: NodeId) -> &[EdgeId] {
        self.adjacency
            .get(node)
            .map(|adj| adj.outputs.as_slice())
            .unwrap_or(&[])
    }

    /// Direct upstream neighbours, one entry per incoming edge.
    pub fn predecessors(&self, node: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.get_inputs(node)
            .iter()
            .filter_map(|&e| self.edges.get(e).map(|d| d.from))
    }

    /// Direct downstream neighbours, one entry per outgoing edge.
    pub fn successors(&self, node: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.get_outputs(node)
            .iter()
            .filter_map(|&e| self.edges.get(e).map(|d| d.to))
    }

    pub fn in_degree(&self, node: NodeId) -> usize {
        self.get_inputs(node).len()
    }

    pub fn out_degree(&self, node: NodeId) -> usize {
        self.get_outputs(node).len()
    }

    /// The first edge `from -> to`, if any.
    pub fn find_edge(&self, from: NodeId, to: NodeId) -> Option<EdgeId> {
        self.get_outputs(from)
            .iter()
            .copied()
            .find(|&e| self.edges.get(e).is_some_and(|d| d.to == to))
    }

    pub fn owner_of(&self, segment: NodeId) -> Option<StewardId> {
        self.owners.get(segment).copied()
    }

    /// Segments owned by `steward`, in node-key order.
    pub fn segments_of(&self, steward: StewardId) -> Vec<NodeId> {
        self.owners
            .iter()
            .filter(|&(_, &owner)| owner == steward)
            .map(|(node, _)| node)
            .collect()
    }

    /// The single downstream run starting at `node` (inclusive) and ending
    /// at the terminus.
    ///
    /// Fails with [`StructuralError::MultipleOutflows`] on a node with more
    /// than one successor, and with [`StructuralError::Cycle`] if the walk
    /// revisits a node.
    pub fn downstream(&self, node: NodeId) -> Result<Vec<NodeId>, StructuralError> {
        if !self.nodes.contains_key(node) {
            return Err(StructuralError::UnknownNode(node));
        }
        let mut run = vec![node];
        let mut current = node;
        loop {
            let outputs = self.get_outputs(current);
            match outputs {
                [] => return Ok(run),
                [edge] => {
                    let Some(next) = self.edges.get(*edge).map(|d| d.to) else {
                        return Ok(run);
                    };
                    if run.len() > self.nodes.len() || run.contains(&next) {
                        return Err(StructuralError::Cycle);
                    }
                    run.push(next);
                    current = next;
                }
                _ => {
                    return Err(StructuralError::MultipleOutflows {
                        node: current,
                        successors: outputs.len(),
                    });
                }
            }
        }
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn contains_node(&self, node: NodeId) -> bool {
        self.nodes.contains_key(node)
    }

    pub fn contains_edge(&self, edge: EdgeId) -> bool {
        self.edges.contains_key(edge)
    }

    /// Iterate over all node IDs and their data.
    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &NodeData)> {
        self.nodes.iter()
    }

    /// Iterate over all edge IDs and their data.
    pub fn edges(&self) -> impl Iterator<Item = (EdgeId, &EdgeData)> {
        self.edges.iter()
    }
}
