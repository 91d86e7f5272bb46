// SPDX-License-Identifier: MIT

//! Process instance lifecycle manager (§4.2): validates and performs every
//! status transition, and owns `create_instance`'s variable decoding and
//! idempotent instance-row upsert.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use wfe_core::{
    Clock, InvalidProcessDefinitionError, InvalidVariableError, ProcessDefinitionId,
    ProcessInstanceId, ProcessStatus, RawVariables, VariableValue,
};
use wfe_storage::{
    DefinitionRepository, InstanceRepository, ProcessInstanceRecord, StateStore,
};

#[derive(Debug, thiserror::Error)]
pub enum InstanceManagerError {
    #[error(transparent)]
    InvalidDefinition(#[from] InvalidProcessDefinitionError),
    #[error(transparent)]
    InvalidVariable(#[from] InvalidVariableError),
    #[error(transparent)]
    InvalidTransition(#[from] wfe_core::InvalidStateTransitionError),
    #[error("instance {0} not found")]
    InstanceNotFound(ProcessInstanceId),
}

pub struct InstanceManager<C: Clock> {
    definitions: Arc<dyn DefinitionRepository>,
    instances: Arc<dyn InstanceRepository>,
    store: Arc<dyn StateStore>,
    clock: C,
}

impl<C: Clock> InstanceManager<C> {
    pub fn new(
        definitions: Arc<dyn DefinitionRepository>,
        instances: Arc<dyn InstanceRepository>,
        store: Arc<dyn StateStore>,
        clock: C,
    ) -> Self {
        Self { definitions, instances, store, clock }
    }

    /// Validate the definition exists, decode and validate `variables`,
    /// and idempotently upsert the instance row in `RUNNING` (§4.2 — new
    /// instances go straight to `RUNNING`, there is no persisted `CREATED`).
    pub async fn create_instance(
        &self,
        instance_id: ProcessInstanceId,
        definition_id: ProcessDefinitionId,
        variables: RawVariables,
    ) -> Result<(ProcessInstanceRecord, HashMap<String, VariableValue>), InstanceManagerError> {
        self.definitions
            .get(definition_id)
            .await
            .ok_or(InvalidProcessDefinitionError::NotFound(definition_id))?;

        let decoded = wfe_core::decode_variables(variables)?;

        let record = ProcessInstanceRecord::new(instance_id, definition_id, self.clock.now());
        let record = self.instances.create_or_get(record).await;

        for (name, value) in &decoded {
            self.store.set_variable(instance_id, None, name.clone(), value.clone()).await;
        }

        tracing::info!(%instance_id, %definition_id, "instance created");
        Ok((record, decoded))
    }

    pub async fn get_instance(
        &self,
        instance_id: ProcessInstanceId,
    ) -> Result<ProcessInstanceRecord, InstanceManagerError> {
        self.instances.get(instance_id).await.ok_or(InstanceManagerError::InstanceNotFound(instance_id))
    }

    pub async fn get_instance_variables(
        &self,
        instance_id: ProcessInstanceId,
    ) -> HashMap<String, VariableValue> {
        self.store
            .get_variables(instance_id)
            .await
            .into_iter()
            .map(|((_, name), value)| (name, value))
            .collect()
    }

    async fn transition(
        &self,
        instance_id: ProcessInstanceId,
        to: ProcessStatus,
    ) -> Result<ProcessInstanceRecord, InstanceManagerError> {
        let mut record = self.get_instance(instance_id).await?;
        record.status.validate_transition(to)?;
        record.status = to;
        if to.is_terminal() {
            record.end_time = Some(self.clock.now());
        }
        self.instances.update(record.clone()).await;
        tracing::info!(%instance_id, to = %to, "instance transitioned");
        Ok(record)
    }

    pub async fn suspend(&self, instance_id: ProcessInstanceId) -> Result<ProcessInstanceRecord, InstanceManagerError> {
        self.transition(instance_id, ProcessStatus::Suspended).await
    }

    pub async fn resume(&self, instance_id: ProcessInstanceId) -> Result<ProcessInstanceRecord, InstanceManagerError> {
        self.transition(instance_id, ProcessStatus::Running).await
    }

    /// Forcibly terminate an instance: tokens are deleted and status moves
    /// to `COMPLETED` from whichever non-terminal status it was in.
    pub async fn terminate(&self, instance_id: ProcessInstanceId) -> Result<ProcessInstanceRecord, InstanceManagerError> {
        self.store.delete_tokens(instance_id).await;
        self.transition(instance_id, ProcessStatus::Completed).await
    }

    /// Transition an instance into `ERROR` after a task/gateway failure,
    /// recording the cause for `get_instance` callers (§4.2, §7).
    pub async fn set_error_state(
        &self,
        instance_id: ProcessInstanceId,
        error: impl Into<String>,
    ) -> Result<ProcessInstanceRecord, InstanceManagerError> {
        let mut record = self.transition(instance_id, ProcessStatus::Error).await?;
        record.error = Some(error.into());
        self.instances.update(record.clone()).await;
        Ok(record)
    }

    /// Mark an instance complete once its token set has drained naturally
    /// (every token reached an end event), rather than via `terminate`.
    pub async fn complete(&self, instance_id: ProcessInstanceId) -> Result<ProcessInstanceRecord, InstanceManagerError> {
        self.transition(instance_id, ProcessStatus::Completed).await
    }

    pub fn now(&self) -> chrono::DateTime<Utc> {
        self.clock.now()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wfe_core::FakeClock;
    use wfe_storage::{InMemoryDefinitionRepository, InMemoryInstanceRepository, ProcessDefinitionRecord, WalStateStore};

    fn manager() -> (InstanceManager<FakeClock>, Arc<InMemoryDefinitionRepository>, ProcessDefinitionId) {
        let definitions = Arc::new(InMemoryDefinitionRepository::new());
        let instances = Arc::new(InMemoryInstanceRepository::new());
        let store = Arc::new(WalStateStore::in_memory());
        let clock = FakeClock::new(Utc::now());
        let definition_id = ProcessDefinitionId::new();
        (
            InstanceManager::new(definitions.clone(), instances, store, clock),
            definitions,
            definition_id,
        )
    }

    #[tokio::test]
    async fn create_instance_rejects_unknown_definition() {
        let (manager, _definitions, definition_id) = manager();
        let err = manager
            .create_instance(ProcessInstanceId::new(), definition_id, HashMap::new())
            .await
            .unwrap_err();
        assert!(matches!(err, InstanceManagerError::InvalidDefinition(_)));
    }

    #[tokio::test]
    async fn create_instance_decodes_variables_and_starts_running() {
        let (manager, definitions, definition_id) = manager();
        definitions
            .put(ProcessDefinitionRecord {
                id: definition_id,
                name: "demo".into(),
                bpmn_xml: "<definitions/>".into(),
                version: 1,
            })
            .await;

        let mut raw = HashMap::new();
        raw.insert(
            "amount".to_string(),
            wfe_core::RawVariable { type_tag: "integer".into(), value: serde_json::json!(1000) },
        );

        let instance_id = ProcessInstanceId::new();
        let (record, decoded) = manager.create_instance(instance_id, definition_id, raw).await.unwrap();
        assert_eq!(record.status, ProcessStatus::Running);
        assert_eq!(decoded.get("amount"), Some(&VariableValue::Integer(1000)));
    }

    #[tokio::test]
    async fn suspend_then_resume_round_trips() {
        let (manager, definitions, definition_id) = manager();
        definitions
            .put(ProcessDefinitionRecord {
                id: definition_id,
                name: "demo".into(),
                bpmn_xml: "<definitions/>".into(),
                version: 1,
            })
            .await;
        let instance_id = ProcessInstanceId::new();
        manager.create_instance(instance_id, definition_id, HashMap::new()).await.unwrap();

        manager.suspend(instance_id).await.unwrap();
        let suspended = manager.get_instance(instance_id).await.unwrap();
        assert_eq!(suspended.status, ProcessStatus::Suspended);

        manager.resume(instance_id).await.unwrap();
        let running = manager.get_instance(instance_id).await.unwrap();
        assert_eq!(running.status, ProcessStatus::Running);
    }

    #[tokio::test]
    async fn terminate_is_rejected_once_already_completed() {
        let (manager, definitions, definition_id) = manager();
        definitions
            .put(ProcessDefinitionRecord {
                id: definition_id,
                name: "demo".into(),
                bpmn_xml: "<definitions/>".into(),
                version: 1,
            })
            .await;
        let instance_id = ProcessInstanceId::new();
        manager.create_instance(instance_id, definition_id, HashMap::new()).await.unwrap();
        manager.terminate(instance_id).await.unwrap();
        let err = manager.terminate(instance_id).await.unwrap_err();
        assert!(matches!(err, InstanceManagerError::InvalidTransition(_)));
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        #[derive(Debug, Clone, Copy)]
        enum LifecycleOp {
            Suspend,
            Resume,
            Terminate,
            SetError,
        }

        impl LifecycleOp {
            /// The status a successful application of this op lands on.
            fn target(self) -> ProcessStatus {
                match self {
                    LifecycleOp::Suspend => ProcessStatus::Suspended,
                    LifecycleOp::Resume => ProcessStatus::Running,
                    LifecycleOp::Terminate => ProcessStatus::Completed,
                    LifecycleOp::SetError => ProcessStatus::Error,
                }
            }

            async fn apply(
                self,
                manager: &InstanceManager<FakeClock>,
                instance_id: ProcessInstanceId,
            ) -> Result<(), InstanceManagerError> {
                match self {
                    LifecycleOp::Suspend => manager.suspend(instance_id).await.map(|_| ()),
                    LifecycleOp::Resume => manager.resume(instance_id).await.map(|_| ()),
                    LifecycleOp::Terminate => manager.terminate(instance_id).await.map(|_| ()),
                    LifecycleOp::SetError => manager.set_error_state(instance_id, "boom").await.map(|_| ()),
                }
            }
        }

        fn lifecycle_op() -> impl Strategy<Value = LifecycleOp> {
            prop_oneof![
                Just(LifecycleOp::Suspend),
                Just(LifecycleOp::Resume),
                Just(LifecycleOp::Terminate),
                Just(LifecycleOp::SetError),
            ]
        }

        proptest! {
            /// Invariant 1 (§8): for any sequence of lifecycle operations, the
            /// instance's status path is a valid walk of the matrix in §4.2 —
            /// every op either lands on the status the matrix predicts or is
            /// rejected, and the persisted status never drifts from that walk.
            #[test]
            fn any_op_sequence_stays_on_the_status_matrix(ops in prop::collection::vec(lifecycle_op(), 0..20)) {
                // Collected as (op allowed by the matrix, op actually accepted, resulting status)
                // so every `prop_assert!` below runs outside the async block.
                let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
                let steps: Vec<(bool, bool, ProcessStatus)> = rt.block_on(async {
                    let (manager, definitions, definition_id) = manager();
                    definitions
                        .put(ProcessDefinitionRecord {
                            id: definition_id,
                            name: "demo".into(),
                            bpmn_xml: "<definitions/>".into(),
                            version: 1,
                        })
                        .await;
                    let instance_id = ProcessInstanceId::new();
                    manager.create_instance(instance_id, definition_id, HashMap::new()).await.unwrap();

                    let mut expected = ProcessStatus::Running;
                    let mut steps = Vec::new();
                    for op in ops {
                        let to = op.target();
                        let matrix_allows = expected.validate_transition(to).is_ok();
                        let accepted = op.apply(&manager, instance_id).await.is_ok();
                        if matrix_allows {
                            expected = to;
                        }
                        let record = manager.get_instance(instance_id).await.unwrap();
                        steps.push((matrix_allows, accepted, record.status));
                    }
                    steps
                });

                let mut expected = ProcessStatus::Running;
                for (matrix_allows, accepted, status) in steps {
                    prop_assert_eq!(accepted, matrix_allows);
                    if matrix_allows {
                        expected = status;
                    }
                    prop_assert_eq!(status, expected);
                }
            }

            /// Invariant 3 (§8): suspend followed by resume preserves the
            /// multiset of tokens exactly — lifecycle transitions never touch
            /// the token set.
            #[test]
            fn suspend_then_resume_preserves_the_token_multiset(
                node_ids in prop::collection::vec("[A-Za-z]{1,8}", 0..6)
            ) {
                let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
                let (before, after) = rt.block_on(async {
                    let definitions = Arc::new(wfe_storage::InMemoryDefinitionRepository::new());
                    let instances_repo = Arc::new(wfe_storage::InMemoryInstanceRepository::new());
                    let store = Arc::new(wfe_storage::WalStateStore::in_memory());
                    let clock = FakeClock::new(Utc::now());
                    let definition_id = ProcessDefinitionId::new();
                    definitions
                        .put(ProcessDefinitionRecord {
                            id: definition_id,
                            name: "demo".into(),
                            bpmn_xml: "<definitions/>".into(),
                            version: 1,
                        })
                        .await;
                    let manager = InstanceManager::new(definitions, instances_repo, store.clone(), clock);
                    let instance_id = ProcessInstanceId::new();
                    manager.create_instance(instance_id, definition_id, HashMap::new()).await.unwrap();

                    // add_token rejects a second token at the same position, so
                    // dedupe the generated node ids before placing them.
                    let mut seen = std::collections::HashSet::new();
                    for node_id in node_ids {
                        if seen.insert(node_id.clone()) {
                            store.add_token(wfe_core::Token::new(instance_id, node_id)).await.unwrap();
                        }
                    }
                    let before = store.get_token_positions(instance_id).await;

                    manager.suspend(instance_id).await.unwrap();
                    manager.resume(instance_id).await.unwrap();

                    let after = store.get_token_positions(instance_id).await;
                    (before, after)
                });

                let mut before_ids: Vec<_> = before.iter().map(|t| t.id).collect();
                let mut after_ids: Vec<_> = after.iter().map(|t| t.id).collect();
                before_ids.sort();
                after_ids.sort();
                prop_assert_eq!(before_ids, after_ids);
            }
        }
    }
}
