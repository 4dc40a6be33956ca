//! Topological ordering of the flow network.
//!
//! The order is computed eagerly whenever the network changes and cached
//! until the next change. A network that violates the single-outflow or
//! acyclicity invariant leaves the scheduler *faulted*: the fault is kept
//! and returned by every tick until the network is repaired.

use std::collections::BTreeSet;

use slotmap::SecondaryMap;

use crate::error::StructuralError;
use crate::graph::FlowGraph;
use crate::id::NodeId;

#[derive(Debug, Clone, Default)]
pub struct TopologyScheduler {
    /// Cached order, valid when `fault` is `None`.
    order: Vec<NodeId>,
    fault: Option<StructuralError>,
    recomputations: u64,
}

impl TopologyScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Order every node of `graph` so each appears after all of its
    /// predecessors.
    ///
    /// Kahn's algorithm with a name-ordered ready set: among nodes that are
    /// ready at the same time the lexicographically smallest name goes first
    /// (node key breaks remaining ties).
    ///
    /// Fails with [`StructuralError::MultipleOutflows`] if any node has more
    /// than one outgoing edge, and with [`StructuralError::Cycle`] if not
    /// every node can be placed.
    pub fn compute_order<'a>(
        graph: &FlowGraph,
        name_of: impl Fn(NodeId) -> &'a str,
    ) -> Result<Vec<NodeId>, StructuralError> {
        for (node, _) in graph.nodes() {
            let successors = graph.out_degree(node);
            if successors > 1 {
                return Err(StructuralError::MultipleOutflows { node, successors });
            }
        }

        let mut in_degree: SecondaryMap<NodeId, usize> = SecondaryMap::new();
        let mut ready: BTreeSet<(&'a str, NodeId)> = BTreeSet::new();
        for (node, _) in graph.nodes() {
            let degree = graph.in_degree(node);
            in_degree.insert(node, degree);
            if degree == 0 {
                ready.insert((name_of(node), node));
            }
        }

        let mut order = Vec::with_capacity(graph.node_count());
        while let Some((_, node)) = ready.pop_first() {
            order.push(node);
            for next in graph.successors(node) {
                if let Some(degree) = in_degree.get_mut(next) {
                    *degree -= 1;
                    if *degree == 0 {
                        ready.insert((name_of(next), next));
                    }
                }
            }
        }

        if order.len() != graph.node_count() {
            return Err(StructuralError::Cycle);
        }
        Ok(order)
    }

    /// Recompute and cache the order. On failure the previous order is
    /// dropped and the error is kept as the scheduler's fault.
    pub fn refresh<'a>(
        &mut self,
        graph: &FlowGraph,
        name_of: impl Fn(NodeId) -> &'a str,
    ) -> Result<&[NodeId], StructuralError> {
        self.recomputations += 1;
        match Self::compute_order(graph, name_of) {
            Ok(order) => {
                self.order = order;
                self.fault = None;
                Ok(&self.order)
            }
            Err(err) => {
                self.order.clear();
                self.fault = Some(err.clone());
                Err(err)
            }
        }
    }

    /// The cached order, or the fault that prevents one.
    pub fn order(&self) -> Result<&[NodeId], StructuralError> {
        match &self.fault {
            Some(err) => Err(err.clone()),
            None => Ok(&self.order),
        }
    }

    pub fn fault(&self) -> Option<&StructuralError> {
        self.fault.as_ref()
    }

    pub fn is_faulted(&self) -> bool {
        self.fault.is_some()
    }

    /// Number of times the order has been recomputed.
    pub fn recomputations(&self) -> u64 {
        self.recomputations
    }

    /// Temporarily take ownership of the cached order.
    /// Call `restore_order` to put it back.
    pub(crate) fn take_order(&mut self) -> Result<Vec<NodeId>, StructuralError> {
        if let Some(err) = &self.fault {
            return Err(err.clone());
        }
        Ok(std::mem::take(&mut self.order))
    }

    /// Restore the cached order after a `take_order` call.
    pub(crate) fn restore_order(&mut self, order: Vec<NodeId>) {
        self.order = order;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::NodeKind;

    type Labels = SecondaryMap<NodeId, &'static str>;

    fn named_graph(names: &[&'static str]) -> (FlowGraph, Vec<NodeId>, Labels) {
        let mut graph = FlowGraph::new();
        let mut labels = SecondaryMap::new();
        let nodes: Vec<NodeId> = names
            .iter()
            .map(|&name| {
                let node = graph.add_node(NodeKind::Segment);
                labels.insert(node, name);
                node
            })
            .collect();
        (graph, nodes, labels)
    }

    fn order_of(graph: &FlowGraph, labels: &Labels) -> Result<Vec<NodeId>, StructuralError> {
        TopologyScheduler::compute_order(graph, |n| labels.get(n).copied().unwrap_or(""))
    }

    #[test]
    fn chain_orders_upstream_first() {
        let (mut graph, n, labels) = named_graph(&["C", "B", "A"]);
        // A -> B -> C, inserted in reverse
        graph.connect(n[2], n[1]).unwrap();
        graph.connect(n[1], n[0]).unwrap();
        assert_eq!(order_of(&graph, &labels).unwrap(), vec![n[2], n[1], n[0]]);
    }

    #[test]
    fn closing_the_chain_is_a_cycle() {
        let (mut graph, n, labels) = named_graph(&["A", "B", "C"]);
        graph.connect(n[0], n[1]).unwrap();
        graph.connect(n[1], n[2]).unwrap();
        graph.connect(n[2], n[0]).unwrap();
        assert_eq!(order_of(&graph, &labels), Err(StructuralError::Cycle));
    }

    #[test]
    fn self_loop_is_a_cycle() {
        let (mut graph, n, labels) = named_graph(&["A"]);
        graph.connect(n[0], n[0]).unwrap();
        assert_eq!(order_of(&graph, &labels), Err(StructuralError::Cycle));
    }

    #[test]
    fn two_successors_rejected() {
        let (mut graph, n, labels) = named_graph(&["A", "B", "C"]);
        graph.connect(n[0], n[1]).unwrap();
        graph.connect(n[0], n[2]).unwrap();
        assert_eq!(
            order_of(&graph, &labels),
            Err(StructuralError::MultipleOutflows {
                node: n[0],
                successors: 2
            })
        );
    }

    #[test]
    fn ready_nodes_ordered_by_name() {
        // Three headwaters join at "mouth".
        let (mut graph, n, labels) = named_graph(&["mouth", "zeta", "alpha", "mid"]);
        graph.connect(n[1], n[0]).unwrap();
        graph.connect(n[2], n[0]).unwrap();
        graph.connect(n[3], n[0]).unwrap();
        assert_eq!(
            order_of(&graph, &labels).unwrap(),
            vec![n[2], n[3], n[1], n[0]]
        );
    }

    #[test]
    fn confluence_waits_for_all_tributaries() {
        //  a -> c -> d
        //  b ------^
        let (mut graph, n, labels) = named_graph(&["a", "b", "c", "d"]);
        graph.connect(n[0], n[2]).unwrap();
        graph.connect(n[2], n[3]).unwrap();
        graph.connect(n[1], n[3]).unwrap();
        let order = order_of(&graph, &labels).unwrap();
        let pos = |node: NodeId| order.iter().position(|&x| x == node).unwrap();
        assert!(pos(n[0]) < pos(n[2]));
        assert!(pos(n[2]) < pos(n[3]));
        assert!(pos(n[1]) < pos(n[3]));
    }

    #[test]
    fn refresh_records_and_clears_fault() {
        let (mut graph, n, labels) = named_graph(&["A", "B"]);
        let edge = graph.connect(n[0], n[1]).unwrap();
        graph.connect(n[1], n[0]).unwrap();

        let mut scheduler = TopologyScheduler::new();
        let name = |node| labels.get(node).copied().unwrap_or("");
        assert!(scheduler.refresh(&graph, name).is_err());
        assert!(scheduler.is_faulted());
        assert_eq!(scheduler.order(), Err(StructuralError::Cycle));
        assert!(scheduler.take_order().is_err());

        graph.disconnect(edge);
        assert_eq!(scheduler.refresh(&graph, name).unwrap(), &[n[1], n[0]]);
        assert!(scheduler.fault().is_none());
        assert_eq!(scheduler.recomputations(), 2);
    }

    #[test]
    fn take_and_restore_order() {
        let (graph, n, labels) = named_graph(&["A"]);
        let mut scheduler = TopologyScheduler::new();
        scheduler
            .refresh(&graph, |node| labels.get(node).copied().unwrap_or(""))
            .unwrap();
        let order = scheduler.take_order().unwrap();
        assert_eq!(order, vec![n[0]]);
        assert!(scheduler.order().unwrap().is_empty());
        scheduler.restore_order(order);
        assert_eq!(scheduler.order().unwrap(), &[n[0]]);
    }
}
