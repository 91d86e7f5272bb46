// SPDX-License-Identifier: MIT

//! Engine-level error taxonomy: wraps the domain errors from `wfe-core` and
//! the collaborator errors from `wfe-storage`/`wfe-graph` into one type the
//! dispatch layer can match on (§7).

use thiserror::Error;
use wfe_core::{
    GatewayNoMatchError, InvalidProcessDefinitionError, InvalidStateTransitionError,
    InvalidVariableError, TaskExecutionError, TaskTimeoutError,
};
use wfe_graph::ConditionError;
use wfe_storage::StateStoreError;

use crate::timer_scheduler::TimerSchedulerError;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    InvalidDefinition(#[from] InvalidProcessDefinitionError),
    #[error(transparent)]
    InvalidVariable(#[from] InvalidVariableError),
    #[error(transparent)]
    InvalidTransition(#[from] InvalidStateTransitionError),
    #[error(transparent)]
    GatewayNoMatch(#[from] GatewayNoMatchError),
    #[error(transparent)]
    Condition(#[from] ConditionError),
    #[error(transparent)]
    TaskTimeout(#[from] TaskTimeoutError),
    #[error(transparent)]
    TaskExecution(#[from] TaskExecutionError),
    #[error(transparent)]
    Store(#[from] StateStoreError),
    #[error(transparent)]
    TimerScheduler(#[from] TimerSchedulerError),
    #[error("node {0} not found in graph")]
    UnknownNode(String),
    #[error("node {0} has no outgoing flow")]
    NoOutgoingFlow(String),
}

/// Maps the engine's own error taxonomy onto the umbrella instance-scoped
/// error the dispatch layer matches on (§7), so a dispatch handler composed
/// from `wfe-engine` calls can return `ProcessInstanceError` directly.
impl From<EngineError> for wfe_core::ProcessInstanceError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::InvalidDefinition(e) => e.into(),
            EngineError::InvalidVariable(e) => e.into(),
            EngineError::InvalidTransition(e) => e.into(),
            EngineError::GatewayNoMatch(e) => e.into(),
            EngineError::TaskTimeout(e) => e.into(),
            EngineError::TaskExecution(e) => e.into(),
            EngineError::Condition(e) => wfe_core::ProcessInstanceError::Other(e.to_string()),
            EngineError::Store(StateStoreError::Cas(e)) => e.into(),
            EngineError::Store(StateStoreError::DuplicateToken(e)) => e.into(),
            EngineError::Store(e) => wfe_core::ProcessInstanceError::Transient(wfe_core::EngineTransientError(e.to_string())),
            EngineError::UnknownNode(n) => wfe_core::ProcessInstanceError::Other(format!("node {n} not found in graph")),
            EngineError::NoOutgoingFlow(n) => wfe_core::ProcessInstanceError::Other(format!("node {n} has no outgoing flow")),
            EngineError::TimerScheduler(e) => wfe_core::ProcessInstanceError::Other(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cas_conflicts_surface_as_cas_conflict_not_other() {
        let err = EngineError::Store(StateStoreError::Cas(wfe_core::CasConflictError {
            key: "timer:1".into(),
            expected: 1,
            actual: Some(2),
        }));
        let mapped: wfe_core::ProcessInstanceError = err.into();
        assert!(matches!(mapped, wfe_core::ProcessInstanceError::CasConflict(_)));
    }
}
