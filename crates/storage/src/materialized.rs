// SPDX-License-Identifier: MIT

//! Materialized state rebuilt by replaying the WAL (§4.4 `recover_from_crash`).
//!
//! This mirrors the event-sourcing shape used throughout the engine: events
//! are facts about what happened, state is derived by folding them.

use std::collections::HashMap;

use wfe_core::{
    id::ScopeId, ProcessInstanceId, StateEvent, TimerRecord, TimerRecordId, TimerState, Token,
    TokenId, VariableValue,
};

/// One versioned variable write. History is preserved; the store never
/// deletes old versions (§3 invariant 3).
#[derive(Debug, Clone)]
pub struct VariableEntry {
    pub version: u64,
    pub value: VariableValue,
}

#[derive(Debug, Default)]
pub struct MaterializedState {
    pub tokens: HashMap<ProcessInstanceId, HashMap<TokenId, Token>>,
    /// (instance, scope, name) -> history, ordered oldest to newest.
    pub variables: HashMap<(ProcessInstanceId, ScopeId, String), Vec<VariableEntry>>,
    pub timers: HashMap<TimerRecordId, TimerRecord>,
}

impl MaterializedState {
    pub fn apply(&mut self, event: &StateEvent) {
        match event {
            StateEvent::TokenCreated { token } => {
                self.tokens.entry(token.instance_id).or_default().insert(token.id, token.clone());
            }
            StateEvent::TokenMoved { old_token_id, new_token } => {
                let bucket = self.tokens.entry(new_token.instance_id).or_default();
                bucket.remove(old_token_id);
                bucket.insert(new_token.id, new_token.clone());
            }
            StateEvent::TokenDeleted { instance_id, token_id } => {
                if let Some(bucket) = self.tokens.get_mut(instance_id) {
                    bucket.remove(token_id);
                }
            }
            StateEvent::TokensDeleted { instance_id } => {
                self.tokens.remove(instance_id);
            }
            StateEvent::VariableSet { instance_id, name, scope, value, version } => {
                let key = (*instance_id, scope.clone(), name.clone());
                self.variables.entry(key).or_default().push(VariableEntry {
                    version: *version,
                    value: value.clone(),
                });
            }
            StateEvent::TimerPut { record } => {
                self.timers.insert(record.id, record.clone());
            }
            StateEvent::TimerStateChanged { id, state, generation, .. } => {
                if let Some(record) = self.timers.get_mut(id) {
                    record.state = *state;
                    record.generation = *generation;
                }
            }
            // Instance lifecycle events are folded by the instance repository,
            // not the token/variable/timer materialized view.
            StateEvent::InstanceCreated { .. }
            | StateEvent::InstanceStatusChanged { .. }
            | StateEvent::InstanceErrored { .. } => {}
        }
    }

    pub fn tokens_for(&self, instance_id: ProcessInstanceId) -> Vec<Token> {
        self.tokens.get(&instance_id).map(|m| m.values().cloned().collect()).unwrap_or_default()
    }

    /// Latest version at or below `at_version` (or latest overall, if
    /// `at_version` is `None`) — §3 invariant 3.
    pub fn variable_at(
        &self,
        instance_id: ProcessInstanceId,
        scope: &ScopeId,
        name: &str,
        at_version: Option<u64>,
    ) -> Option<&VariableEntry> {
        let key = (instance_id, scope.clone(), name.to_string());
        let history = self.variables.get(&key)?;
        match at_version {
            Some(snapshot) => history.iter().filter(|e| e.version <= snapshot).next_back(),
            None => history.last(),
        }
    }

    pub fn latest_variables(
        &self,
        instance_id: ProcessInstanceId,
    ) -> HashMap<(ScopeId, String), VariableValue> {
        self.variables
            .iter()
            .filter(|((iid, _, _), _)| *iid == instance_id)
            .filter_map(|((_, scope, name), history)| {
                history.last().map(|e| ((scope.clone(), name.clone()), e.value.clone()))
            })
            .collect()
    }

    pub fn next_variable_version(&self, instance_id: ProcessInstanceId, scope: &ScopeId, name: &str) -> u64 {
        let key = (instance_id, scope.clone(), name.to_string());
        self.variables.get(&key).and_then(|h| h.last()).map(|e| e.version + 1).unwrap_or(1)
    }

    /// The still-armed record for `(instance_id, node_id)`, if any.
    pub fn timer_for(&self, instance_id: ProcessInstanceId, node_id: &str) -> Option<TimerRecord> {
        self.timers
            .values()
            .find(|t| t.instance_id == instance_id && t.node_id == node_id && t.state == TimerState::Armed)
            .cloned()
    }

    pub fn due_timers(&self, now: chrono::DateTime<chrono::Utc>) -> Vec<TimerRecord> {
        let mut due: Vec<TimerRecord> =
            self.timers.values().filter(|t| t.is_due(now)).cloned().collect();
        due.sort_by_key(|t| t.next_fire_time);
        due
    }
}
