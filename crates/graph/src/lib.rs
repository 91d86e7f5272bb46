// SPDX-License-Identifier: MIT

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! wfe-graph: the in-memory BPMN graph type handed to the executor, and the
//! parser collaborator contract that produces it (§6).

pub mod condition;
pub mod graph;
pub mod node;
pub mod parser;

pub use condition::{Condition, ConditionError};
pub use graph::Graph;
pub use node::{
    Flow, GatewayDirection, GatewayKind, IntermediateKind, Node, NodeDetail, NodeKind, TaskKind,
};
pub use parser::{BpmnParser, FixtureParser, ParseError};
