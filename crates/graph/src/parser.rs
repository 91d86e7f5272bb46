// SPDX-License-Identifier: MIT

//! The BPMN parser collaborator (§6, §1 "Out of scope").
//!
//! Parsing BPMN XML into a [`crate::Graph`] is a pure function owned by an
//! external collaborator. This crate only pins down the contract: given
//! `bpmn_xml`, return a `Graph` or a `ParseError`. No XML parsing lives
//! here — callers inject a real implementation (or, in tests, a fixture).

use crate::graph::Graph;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ParseError {
    #[error("malformed BPMN XML: {0}")]
    Malformed(String),
}

/// Contract for the BPMN parser collaborator: `xml -> Graph`.
pub trait BpmnParser: Send + Sync {
    fn parse(&self, bpmn_xml: &str) -> Result<Graph, ParseError>;
}

/// A parser over pre-built fixture graphs keyed by their source XML string,
/// used in tests and by the CLI's offline scenarios to stand in for the real
/// collaborator without this crate taking on an XML dependency.
#[derive(Default)]
pub struct FixtureParser {
    fixtures: std::collections::HashMap<String, Graph>,
}

impl FixtureParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_fixture(mut self, bpmn_xml: impl Into<String>, graph: Graph) -> Self {
        self.fixtures.insert(bpmn_xml.into(), graph);
        self
    }
}

impl BpmnParser for FixtureParser {
    fn parse(&self, bpmn_xml: &str) -> Result<Graph, ParseError> {
        self.fixtures
            .get(bpmn_xml)
            .cloned()
            .ok_or_else(|| ParseError::Malformed("no fixture registered for this XML".to_string()))
    }
}
