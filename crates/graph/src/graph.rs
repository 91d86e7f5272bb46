// SPDX-License-Identifier: MIT

//! The in-memory BPMN graph handed to the executor (§6).

use crate::node::{Flow, Node, NodeDetail, NodeKind};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Graph {
    pub nodes: Vec<Node>,
    pub flows: Vec<Flow>,
}

impl Graph {
    pub fn new(nodes: Vec<Node>, flows: Vec<Flow>) -> Self {
        Self { nodes, flows }
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// Outgoing flows from `node_id`, in declaration order — the ordering
    /// the executor relies on for exclusive-gateway tie-breaks (§4.1).
    pub fn outgoing(&self, node_id: &str) -> Vec<&Flow> {
        self.flows.iter().filter(|f| f.source_ref == node_id).collect()
    }

    /// Incoming flows to `node_id`, used to size parallel/inclusive joins.
    pub fn incoming(&self, node_id: &str) -> Vec<&Flow> {
        self.flows.iter().filter(|f| f.target_ref == node_id).collect()
    }

    pub fn start_events(&self) -> Vec<&Node> {
        self.nodes.iter().filter(|n| n.kind() == NodeKind::Start).collect()
    }

    /// The graph's sole start event, or `None` if there isn't exactly one
    /// (§4.2 `create_instance` requires a selector when this is ambiguous).
    pub fn unique_start_event(&self) -> Option<&Node> {
        let mut starts = self.start_events().into_iter();
        let first = starts.next()?;
        if starts.next().is_some() {
            None
        } else {
            Some(first)
        }
    }

    pub fn node_index(&self) -> HashMap<&str, &NodeDetail> {
        self.nodes.iter().map(|n| (n.id.as_str(), &n.detail)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{GatewayDirection, GatewayKind, TaskKind};

    fn linear_graph() -> Graph {
        Graph::new(
            vec![
                Node::start("Start_1"),
                Node::task("Task_1", TaskKind::Service),
                Node::end("End_1"),
            ],
            vec![
                Flow::unconditional("Flow_1", "Start_1", "Task_1"),
                Flow::unconditional("Flow_2", "Task_1", "End_1"),
            ],
        )
    }

    #[test]
    fn unique_start_event_found_for_single_start() {
        let graph = linear_graph();
        assert_eq!(graph.unique_start_event().unwrap().id, "Start_1");
    }

    #[test]
    fn unique_start_event_is_none_for_multiple_starts() {
        let mut graph = linear_graph();
        graph.nodes.push(Node::start("Start_2"));
        assert!(graph.unique_start_event().is_none());
    }

    #[test]
    fn outgoing_preserves_declaration_order() {
        let graph = Graph::new(
            vec![
                Node::gateway("GW_1", GatewayKind::Exclusive, GatewayDirection::Split),
                Node::end("End_a"),
                Node::end("End_b"),
            ],
            vec![
                Flow::unconditional("F1", "GW_1", "End_a"),
                Flow::unconditional("F2", "GW_1", "End_b"),
            ],
        );
        let out = graph.outgoing("GW_1");
        assert_eq!(out[0].id, "F1");
        assert_eq!(out[1].id, "F2");
    }
}
