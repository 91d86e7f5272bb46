// SPDX-License-Identifier: MIT

//! Graph node and flow types (§6 "Collaborator: BPMN Parser").
//!
//! `Graph = { nodes: [Node], flows: [Flow] }`, exactly the shape the spec
//! hands the executor. Parsing BPMN XML into this shape is an external
//! collaborator's job (see [`crate::parser`]); this module only defines the
//! shape itself.

use crate::condition::Condition;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Start,
    End,
    Task,
    Gateway,
    Intermediate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    User,
    Service,
    Script,
    Receive,
}

impl TaskKind {
    /// §4.1: user and receive tasks are asynchronous wait states; service
    /// and script tasks invoke the registry and advance synchronously.
    pub fn is_asynchronous(self) -> bool {
        matches!(self, TaskKind::User | TaskKind::Receive)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GatewayKind {
    Exclusive,
    Parallel,
    Inclusive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GatewayDirection {
    Split,
    Join,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntermediateKind {
    BoundaryTimer,
    IntermediateTimer,
}

/// Type-specific fields the parser attaches to a node, per node kind (§6).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "node_kind")]
pub enum NodeDetail {
    Start,
    End,
    Task { task_kind: TaskKind },
    Gateway { gateway_kind: GatewayKind, direction: GatewayDirection },
    Timer { kind: IntermediateKind, definition: wfe_core::TimerDefinition },
}

impl NodeDetail {
    pub fn kind(&self) -> NodeKind {
        match self {
            NodeDetail::Start => NodeKind::Start,
            NodeDetail::End => NodeKind::End,
            NodeDetail::Task { .. } => NodeKind::Task,
            NodeDetail::Gateway { .. } => NodeKind::Gateway,
            NodeDetail::Timer { .. } => NodeKind::Intermediate,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    pub detail: NodeDetail,
}

impl Node {
    pub fn start(id: impl Into<String>) -> Self {
        Self { id: id.into(), detail: NodeDetail::Start }
    }

    pub fn end(id: impl Into<String>) -> Self {
        Self { id: id.into(), detail: NodeDetail::End }
    }

    pub fn task(id: impl Into<String>, task_kind: TaskKind) -> Self {
        Self { id: id.into(), detail: NodeDetail::Task { task_kind } }
    }

    pub fn gateway(id: impl Into<String>, gateway_kind: GatewayKind, direction: GatewayDirection) -> Self {
        Self { id: id.into(), detail: NodeDetail::Gateway { gateway_kind, direction } }
    }

    pub fn timer(id: impl Into<String>, kind: IntermediateKind, definition: wfe_core::TimerDefinition) -> Self {
        Self { id: id.into(), detail: NodeDetail::Timer { kind, definition } }
    }

    pub fn kind(&self) -> NodeKind {
        self.detail.kind()
    }
}

/// A directed sequence flow between two nodes, optionally guarded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Flow {
    pub id: String,
    pub source_ref: String,
    pub target_ref: String,
    #[serde(default)]
    pub condition: Condition,
    #[serde(default)]
    pub is_default: bool,
}

impl Flow {
    pub fn unconditional(id: impl Into<String>, source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            source_ref: source.into(),
            target_ref: target.into(),
            condition: Condition::Always,
            is_default: false,
        }
    }

    pub fn conditional(
        id: impl Into<String>,
        source: impl Into<String>,
        target: impl Into<String>,
        condition: Condition,
    ) -> Self {
        Self {
            id: id.into(),
            source_ref: source.into(),
            target_ref: target.into(),
            condition,
            is_default: false,
        }
    }

    pub fn default_flow(id: impl Into<String>, source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            source_ref: source.into(),
            target_ref: target.into(),
            condition: Condition::Always,
            is_default: true,
        }
    }
}
