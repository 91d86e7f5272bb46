// SPDX-License-Identifier: MIT

//! Error taxonomy (§7). Validation errors surface to the caller; task and
//! gateway errors transition the instance to `ERROR`; transient I/O is
//! retried by the dispatch layer.

use crate::id::ProcessDefinitionId;
use thiserror::Error;

/// A process definition could not be used to create or resume an instance.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum InvalidProcessDefinitionError {
    #[error("process definition {0} does not exist")]
    NotFound(ProcessDefinitionId),
    #[error("process definition {0} has multiple start events; a start_event_id selector is required")]
    AmbiguousStartEvent(ProcessDefinitionId),
    #[error("process definition {0} has no start event")]
    NoStartEvent(ProcessDefinitionId),
    #[error("unknown start event id {start_event_id} in definition {definition_id}")]
    UnknownStartEvent { definition_id: ProcessDefinitionId, start_event_id: String },
    #[error("unknown node kind {0:?} in graph")]
    UnknownNodeKind(String),
}

/// A variable in a `create_instance` request failed validation (§4.2).
#[derive(Debug, Error, Clone, PartialEq)]
pub enum InvalidVariableError {
    #[error("unknown variable type tag: {0}")]
    UnknownType(String),
    #[error("value {value} does not match declared type {type_tag}")]
    TypeMismatch { type_tag: String, value: serde_json::Value },
}

/// An instance status transition outside the matrix in §4.2.
#[derive(Debug, Error, Clone, PartialEq)]
#[error("cannot transition instance from {from:?} to {to:?}")]
pub struct InvalidStateTransitionError {
    pub from: crate::status::ProcessStatus,
    pub to: crate::status::ProcessStatus,
}

/// An exclusive gateway had no matching condition and no default flow (§4.1).
#[derive(Debug, Error, Clone, PartialEq)]
#[error("gateway {node_id} had no matching outgoing flow and no default flow")]
pub struct GatewayNoMatchError {
    pub node_id: String,
}

/// A task invocation exceeded `process.script_timeout` (§5).
#[derive(Debug, Error, Clone, PartialEq)]
#[error("task {node_id} timed out after {timeout_ms}ms")]
pub struct TaskTimeoutError {
    pub node_id: String,
    pub timeout_ms: u64,
}

/// A task invocation returned an application-level error.
#[derive(Debug, Error, Clone, PartialEq)]
#[error("task {node_id} failed: {message}")]
pub struct TaskExecutionError {
    pub node_id: String,
    pub message: String,
}

/// State store or event bus I/O failure; retried with bounded backoff by the
/// dispatch layer (§7), up to `process.max_retries`.
#[derive(Debug, Error, Clone, PartialEq)]
#[error("transient engine I/O error: {0}")]
pub struct EngineTransientError(pub String);

/// A token CAS (compare-and-set) lost a race against a concurrent mutation.
#[derive(Debug, Error, Clone, PartialEq)]
#[error("CAS conflict on {key}: expected generation {expected}, found {actual:?}")]
pub struct CasConflictError {
    pub key: String,
    pub expected: u64,
    pub actual: Option<u64>,
}

/// Raised when a token already exists at the target of `create_initial_token`
/// or a move — duplicate delivery must be a no-op, not a double-advance.
#[derive(Debug, Error, Clone, PartialEq)]
#[error("token already exists for instance {instance_id} at node {node_id}")]
pub struct DuplicateTokenError {
    pub instance_id: crate::id::ProcessInstanceId,
    pub node_id: String,
}

/// Raised when an in-flight step observes that its instance's tokens were
/// deleted out from under it by a concurrent `terminate_instance` — silently
/// swallowed by the dispatch layer per §5 cancellation semantics.
#[derive(Debug, Error, Clone, PartialEq)]
#[error("instance {0} is gone")]
pub struct InstanceGoneError(pub crate::id::ProcessInstanceId);

/// The umbrella error for any other instance-scoped failure (§7).
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ProcessInstanceError {
    #[error(transparent)]
    InvalidDefinition(#[from] InvalidProcessDefinitionError),
    #[error(transparent)]
    InvalidVariable(#[from] InvalidVariableError),
    #[error(transparent)]
    InvalidTransition(#[from] InvalidStateTransitionError),
    #[error(transparent)]
    GatewayNoMatch(#[from] GatewayNoMatchError),
    #[error(transparent)]
    TaskTimeout(#[from] TaskTimeoutError),
    #[error(transparent)]
    TaskExecution(#[from] TaskExecutionError),
    #[error(transparent)]
    Transient(#[from] EngineTransientError),
    #[error(transparent)]
    CasConflict(#[from] CasConflictError),
    #[error(transparent)]
    DuplicateToken(#[from] DuplicateTokenError),
    #[error(transparent)]
    InstanceGone(#[from] InstanceGoneError),
    #[error("{0}")]
    Other(String),
}
