// SPDX-License-Identifier: MIT

//! The `StateStore` contract (§4.3) and its WAL-backed implementation.
//!
//! Every mutation is linearizable per key: the implementation takes a single
//! writer lock, checks its precondition against the in-memory materialized
//! view, appends the resulting [`StateEvent`] to the WAL, folds it into the
//! view, and only then releases the lock and returns. Readers see either the
//! state before or after a mutation, never a partial one.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::broadcast;
use wfe_core::{
    id::ScopeId, CasConflictError, DuplicateTokenError, ProcessInstanceId, StateEvent,
    TimerRecord, TimerRecordId, TimerState, Token, TokenId, VariableValue,
};

use crate::materialized::MaterializedState;
use crate::wal::{Wal, WalError};

#[derive(Debug, thiserror::Error)]
pub enum StateStoreError {
    #[error(transparent)]
    Cas(#[from] CasConflictError),
    #[error(transparent)]
    DuplicateToken(#[from] DuplicateTokenError),
    #[error(transparent)]
    Wal(#[from] WalError),
    #[error("timer {0} not found")]
    TimerNotFound(TimerRecordId),
}

/// The transactional state collaborator described in §4.3: CAS-guarded
/// mutation of tokens, variables and timers, plus a durable change feed the
/// Timer Scheduler and dispatch layer subscribe to for wake-ups.
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn get_token_positions(&self, instance_id: ProcessInstanceId) -> Vec<Token>;

    async fn add_token(&self, token: Token) -> Result<(), StateStoreError>;

    async fn remove_token(&self, instance_id: ProcessInstanceId, token_id: TokenId);

    /// Atomically retire `old_token_id` and install `new_token` — the move
    /// primitive a gateway or task completion uses to advance a token
    /// without ever exposing a state where the token is at neither node.
    async fn replace_token_atomic(
        &self,
        old_token_id: TokenId,
        new_token: Token,
    ) -> Result<(), StateStoreError>;

    async fn delete_tokens(&self, instance_id: ProcessInstanceId);

    async fn set_variable(
        &self,
        instance_id: ProcessInstanceId,
        scope: ScopeId,
        name: String,
        value: VariableValue,
    ) -> u64;

    async fn get_variable(
        &self,
        instance_id: ProcessInstanceId,
        scope: &ScopeId,
        name: &str,
        at_version: Option<u64>,
    ) -> Option<VariableValue>;

    async fn get_variables(
        &self,
        instance_id: ProcessInstanceId,
    ) -> HashMap<(ScopeId, String), VariableValue>;

    async fn put_timer(&self, record: TimerRecord) -> Result<(), StateStoreError>;

    /// The still-armed timer record for `(instance_id, node_id)`, if one has
    /// already been registered — lets a caller tell "already parked at this
    /// timer" apart from "first time reaching it" without re-arming (§4.1).
    async fn timer_for(&self, instance_id: ProcessInstanceId, node_id: &str) -> Option<TimerRecord>;

    async fn due_timers(&self, now: DateTime<Utc>) -> Vec<TimerRecord>;

    /// CAS-guarded at-most-once firing: succeeds only if the timer is still
    /// `Armed` at `expected_generation` (§4.4).
    async fn mark_timer_fired(
        &self,
        id: TimerRecordId,
        expected_generation: u64,
    ) -> Result<(), StateStoreError>;

    async fn cancel_timer(&self, id: TimerRecordId) -> Result<(), StateStoreError>;

    /// A durable change feed: every applied [`StateEvent`] is broadcast here
    /// after it is committed to the WAL, so the Timer Scheduler and the
    /// dispatch layer can wake on state changes instead of polling alone.
    fn subscribe(&self) -> broadcast::Receiver<StateEvent>;
}

/// WAL-backed [`StateStore`]. `Arc`-cloneable; the daemon holds one instance
/// shared across the executor, timer scheduler and dispatch layer.
#[derive(Clone)]
pub struct WalStateStore {
    inner: Arc<Inner>,
}

struct Inner {
    state: Mutex<MaterializedState>,
    wal: Mutex<Wal>,
    changes: broadcast::Sender<StateEvent>,
}

impl WalStateStore {
    pub fn in_memory() -> Self {
        Self::from_parts(MaterializedState::default(), Wal::in_memory())
    }

    pub fn with_wal(wal: Wal) -> Self {
        Self::from_parts(MaterializedState::default(), wal)
    }

    fn from_parts(state: MaterializedState, wal: Wal) -> Self {
        let (changes, _) = broadcast::channel(1024);
        Self { inner: Arc::new(Inner { state: Mutex::new(state), wal: Mutex::new(wal), changes }) }
    }

    /// Rebuild from a WAL file on disk, replaying every event in order
    /// before the store accepts new writes (§4.4 crash recovery).
    pub async fn recover_from_wal(path: &std::path::Path) -> Result<Self, StateStoreError> {
        let mut state = MaterializedState::default();
        Wal::replay(path, |event| state.apply(&event)).await?;
        let wal = Wal::open(path)?;
        Ok(Self::from_parts(state, wal))
    }

    fn commit(&self, event: StateEvent) -> Result<(), WalError> {
        self.inner.wal.lock().append(&event)?;
        self.inner.state.lock().apply(&event);
        let _ = self.inner.changes.send(event);
        Ok(())
    }
}

#[async_trait]
impl StateStore for WalStateStore {
    async fn get_token_positions(&self, instance_id: ProcessInstanceId) -> Vec<Token> {
        self.inner.state.lock().tokens_for(instance_id)
    }

    async fn add_token(&self, token: Token) -> Result<(), StateStoreError> {
        {
            let state = self.inner.state.lock();
            let duplicate = state
                .tokens_for(token.instance_id)
                .iter()
                .any(|existing| existing.node_id == token.node_id && existing.scope_id == token.scope_id);
            if duplicate {
                return Err(DuplicateTokenError {
                    instance_id: token.instance_id,
                    node_id: token.node_id.clone(),
                }
                .into());
            }
        }
        self.commit(StateEvent::TokenCreated { token })?;
        Ok(())
    }

    async fn remove_token(&self, instance_id: ProcessInstanceId, token_id: TokenId) {
        let _ = self.commit(StateEvent::TokenDeleted { instance_id, token_id });
    }

    async fn replace_token_atomic(
        &self,
        old_token_id: TokenId,
        new_token: Token,
    ) -> Result<(), StateStoreError> {
        self.commit(StateEvent::TokenMoved { old_token_id, new_token })?;
        Ok(())
    }

    async fn delete_tokens(&self, instance_id: ProcessInstanceId) {
        let _ = self.commit(StateEvent::TokensDeleted { instance_id });
    }

    async fn set_variable(
        &self,
        instance_id: ProcessInstanceId,
        scope: ScopeId,
        name: String,
        value: VariableValue,
    ) -> u64 {
        let version = self.inner.state.lock().next_variable_version(instance_id, &scope, &name);
        let _ = self.commit(StateEvent::VariableSet { instance_id, scope, name, value, version });
        version
    }

    async fn get_variable(
        &self,
        instance_id: ProcessInstanceId,
        scope: &ScopeId,
        name: &str,
        at_version: Option<u64>,
    ) -> Option<VariableValue> {
        self.inner
            .state
            .lock()
            .variable_at(instance_id, scope, name, at_version)
            .map(|entry| entry.value.clone())
    }

    async fn get_variables(
        &self,
        instance_id: ProcessInstanceId,
    ) -> HashMap<(ScopeId, String), VariableValue> {
        self.inner.state.lock().latest_variables(instance_id)
    }

    async fn put_timer(&self, record: TimerRecord) -> Result<(), StateStoreError> {
        self.commit(StateEvent::TimerPut { record })?;
        Ok(())
    }

    async fn timer_for(&self, instance_id: ProcessInstanceId, node_id: &str) -> Option<TimerRecord> {
        self.inner.state.lock().timer_for(instance_id, node_id)
    }

    async fn due_timers(&self, now: DateTime<Utc>) -> Vec<TimerRecord> {
        self.inner.state.lock().due_timers(now)
    }

    async fn mark_timer_fired(
        &self,
        id: TimerRecordId,
        expected_generation: u64,
    ) -> Result<(), StateStoreError> {
        let (instance_id, actual) = {
            let state = self.inner.state.lock();
            let record = state.timers.get(&id).ok_or(StateStoreError::TimerNotFound(id))?;
            (record.instance_id, record.generation)
        };
        if actual != expected_generation {
            return Err(CasConflictError {
                key: format!("timer:{id}"),
                expected: expected_generation,
                actual: Some(actual),
            }
            .into());
        }
        self.commit(StateEvent::TimerStateChanged {
            id,
            instance_id,
            state: TimerState::Fired,
            generation: expected_generation + 1,
        })?;
        Ok(())
    }

    async fn cancel_timer(&self, id: TimerRecordId) -> Result<(), StateStoreError> {
        let (instance_id, generation) = {
            let state = self.inner.state.lock();
            let record = state.timers.get(&id).ok_or(StateStoreError::TimerNotFound(id))?;
            (record.instance_id, record.generation)
        };
        self.commit(StateEvent::TimerStateChanged {
            id,
            instance_id,
            state: TimerState::Cancelled,
            generation: generation + 1,
        })?;
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<StateEvent> {
        self.inner.changes.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wfe_core::ProcessDefinitionId;

    fn token(instance_id: ProcessInstanceId, node_id: &str) -> Token {
        Token::new(instance_id, node_id)
    }

    #[tokio::test]
    async fn add_token_rejects_duplicate_position() {
        let store = WalStateStore::in_memory();
        let instance_id = ProcessInstanceId::new();
        store.add_token(token(instance_id, "Task_1")).await.unwrap();
        let err = store.add_token(token(instance_id, "Task_1")).await.unwrap_err();
        assert!(matches!(err, StateStoreError::DuplicateToken(_)));
    }

    #[tokio::test]
    async fn replace_token_atomic_moves_without_a_gap() {
        let store = WalStateStore::in_memory();
        let instance_id = ProcessInstanceId::new();
        let start = token(instance_id, "Task_1");
        store.add_token(start.clone()).await.unwrap();

        let moved = token(instance_id, "Task_2");
        store.replace_token_atomic(start.id, moved.clone()).await.unwrap();

        let positions = store.get_token_positions(instance_id).await;
        assert_eq!(positions.len(), 1);
        assert_eq!(positions[0].node_id, "Task_2");
    }

    #[tokio::test]
    async fn set_variable_versions_increment_monotonically() {
        let store = WalStateStore::in_memory();
        let instance_id = ProcessInstanceId::new();
        let v1 = store
            .set_variable(instance_id, None, "x".into(), VariableValue::Integer(1))
            .await;
        let v2 = store
            .set_variable(instance_id, None, "x".into(), VariableValue::Integer(2))
            .await;
        assert_eq!(v1, 1);
        assert_eq!(v2, 2);
        assert_eq!(
            store.get_variable(instance_id, &None, "x", None).await,
            Some(VariableValue::Integer(2))
        );
        assert_eq!(
            store.get_variable(instance_id, &None, "x", Some(1)).await,
            Some(VariableValue::Integer(1))
        );
    }

    #[tokio::test]
    async fn mark_timer_fired_rejects_stale_generation() {
        let store = WalStateStore::in_memory();
        let instance_id = ProcessInstanceId::new();
        let record = TimerRecord::new(
            instance_id,
            ProcessDefinitionId::new(),
            "Timer_1",
            wfe_core::TimerDefinition::Duration("PT1S".into()),
            Utc::now(),
        );
        let id = record.id;
        store.put_timer(record).await.unwrap();

        store.mark_timer_fired(id, 0).await.unwrap();
        let err = store.mark_timer_fired(id, 0).await.unwrap_err();
        assert!(matches!(err, StateStoreError::Cas(_)));
    }

    #[tokio::test]
    async fn subscribers_observe_committed_events() {
        let store = WalStateStore::in_memory();
        let mut rx = store.subscribe();
        let instance_id = ProcessInstanceId::new();
        store.add_token(token(instance_id, "Task_1")).await.unwrap();
        let event = rx.recv().await.unwrap();
        assert!(matches!(event, StateEvent::TokenCreated { .. }));
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// Invariant 6 (§8): writes to the same (instance, scope, name)
            /// strictly increase the version counter, and a read at any
            /// recorded version returns exactly the value written at that
            /// version — the highest version not exceeding the snapshot.
            #[test]
            fn variable_versions_increase_and_reads_pin_to_their_snapshot(
                values in prop::collection::vec(any::<i64>(), 1..12)
            ) {
                let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
                let (versions, reads, latest) = rt.block_on(async {
                    let store = WalStateStore::in_memory();
                    let instance_id = ProcessInstanceId::new();

                    let mut versions = Vec::new();
                    for value in &values {
                        let version = store
                            .set_variable(instance_id, None, "x".into(), VariableValue::Integer(*value))
                            .await;
                        versions.push(version);
                    }

                    let mut reads = Vec::new();
                    for &version in &versions {
                        reads.push(store.get_variable(instance_id, &None, "x", Some(version)).await);
                    }
                    let latest = store.get_variable(instance_id, &None, "x", None).await;
                    (versions, reads, latest)
                });

                for pair in versions.windows(2) {
                    prop_assert!(pair[1] > pair[0], "versions must strictly increase: {:?}", pair);
                }
                for (value, read) in values.iter().zip(reads.iter()) {
                    prop_assert_eq!(read, &Some(VariableValue::Integer(*value)));
                }
                prop_assert_eq!(latest, Some(VariableValue::Integer(*values.last().unwrap())));
            }
        }
    }
}
