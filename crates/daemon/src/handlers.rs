// SPDX-License-Identifier: MIT

//! Dispatch handlers (§5): the two functions registered against the
//! `process_execution` and `timer_execution` queues, composed from the
//! `wfe-engine` collaborators the way `handle_process_started` and
//! `handle_timer_triggered` compose theirs against the instance manager,
//! executor and timer scheduler.

use std::sync::Arc;

use wfe_core::{BusEvent, Clock, ProcessInstanceError, ProcessStatus, RawVariable, RawVariables};
use wfe_engine::{InstanceManager, ProcessExecutor, RunOutcome, TaskRegistry, TimerSink};
use wfe_graph::BpmnParser;
use wfe_storage::{require_definition, DefinitionRepository};

/// Everything a dispatch handler needs to run an instance forward one step.
/// Cloned cheaply (every field is an `Arc`) into each spawned dispatch
/// worker.
pub struct EngineContext<C: Clock, R: TaskRegistry, S: TimerSink> {
    pub definitions: Arc<dyn DefinitionRepository>,
    pub instances: Arc<InstanceManager<C>>,
    pub executor: Arc<ProcessExecutor<C, R, S>>,
    pub parser: Arc<dyn BpmnParser>,
}

impl<C: Clock, R: TaskRegistry, S: TimerSink> Clone for EngineContext<C, R, S> {
    fn clone(&self) -> Self {
        Self {
            definitions: self.definitions.clone(),
            instances: self.instances.clone(),
            executor: self.executor.clone(),
            parser: self.parser.clone(),
        }
    }
}

/// Route a dispatched event to its handler, mapping every failure onto the
/// umbrella [`ProcessInstanceError`] the [`wfe_bus::Dispatcher`] matches on.
pub async fn handle<C: Clock, R: TaskRegistry, S: TimerSink>(
    ctx: &EngineContext<C, R, S>,
    event: BusEvent,
) -> Result<(), ProcessInstanceError> {
    match event {
        BusEvent::ProcessStarted { instance_id, definition_id, variables, .. } => {
            let raw = decode_raw_variables(variables)?;
            let (_record, _decoded) = ctx
                .instances
                .create_instance(instance_id, definition_id, raw)
                .await
                .map_err(instance_manager_error)?;
            run_and_settle(ctx, instance_id, definition_id, None).await
        }
        BusEvent::ProcessTimerTriggered { instance_id, definition_id, node_id } => {
            let record = ctx
                .instances
                .get_instance(instance_id)
                .await
                .map_err(|_| ProcessInstanceError::InstanceGone(wfe_core::InstanceGoneError(instance_id)))?;
            if record.status != ProcessStatus::Running {
                // Suspended or already-terminal instances ignore stray timer
                // fires rather than erroring the dispatch (§4.2, §5).
                return Ok(());
            }
            run_and_settle(ctx, instance_id, definition_id, Some(node_id)).await
        }
    }
}

/// Parse and run the definition's graph forward, then persist whatever the
/// executor decided: `Finished` completes the instance, `Waiting` leaves it
/// running with tokens parked.
async fn run_and_settle<C: Clock, R: TaskRegistry, S: TimerSink>(
    ctx: &EngineContext<C, R, S>,
    instance_id: wfe_core::ProcessInstanceId,
    definition_id: wfe_core::ProcessDefinitionId,
    resume_node_id: Option<String>,
) -> Result<(), ProcessInstanceError> {
    let definition = require_definition(ctx.definitions.as_ref(), definition_id)
        .await
        .map_err(ProcessInstanceError::from)?;
    let graph = ctx.parser.parse(&definition.bpmn_xml).map_err(|e| ProcessInstanceError::Other(e.to_string()))?;

    let outcome = match resume_node_id {
        None => ctx.executor.create_initial_token(instance_id, definition_id, &graph, None).await,
        Some(node_id) => ctx.executor.resume_after_timer(instance_id, definition_id, &graph, &node_id).await,
    };

    match outcome {
        Ok(RunOutcome::Finished) => {
            ctx.instances.complete(instance_id).await.map_err(instance_manager_error)?;
            Ok(())
        }
        Ok(RunOutcome::Waiting) => Ok(()),
        Err(e) => {
            let message = e.to_string();
            let mapped: ProcessInstanceError = e.into();
            ctx.instances
                .set_error_state(instance_id, message)
                .await
                .map_err(instance_manager_error)?;
            Err(mapped)
        }
    }
}

fn decode_raw_variables(value: serde_json::Value) -> Result<RawVariables, ProcessInstanceError> {
    if value.is_null() {
        return Ok(RawVariables::new());
    }
    serde_json::from_value::<std::collections::HashMap<String, RawVariable>>(value)
        .map_err(|e| ProcessInstanceError::Other(format!("malformed process.started variables: {e}")))
}

fn instance_manager_error(err: wfe_engine::InstanceManagerError) -> ProcessInstanceError {
    match err {
        wfe_engine::InstanceManagerError::InvalidDefinition(e) => e.into(),
        wfe_engine::InstanceManagerError::InvalidVariable(e) => e.into(),
        wfe_engine::InstanceManagerError::InvalidTransition(e) => e.into(),
        wfe_engine::InstanceManagerError::InstanceNotFound(id) => {
            ProcessInstanceError::InstanceGone(wfe_core::InstanceGoneError(id))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use wfe_core::{FakeClock, ProcessDefinitionId, ProcessInstanceId};
    use wfe_engine::{FnTaskRegistry, NoopTimerSink, TimerScheduler};
    use wfe_graph::{FixtureParser, Flow, Graph, Node};
    use wfe_storage::{
        InMemoryDefinitionRepository, InMemoryInstanceRepository, ProcessDefinitionRecord, WalStateStore,
    };

    async fn context() -> (EngineContext<FakeClock, FnTaskRegistry, NoopTimerSink>, ProcessDefinitionId) {
        let bpmn_xml = "<definitions/>".to_string();
        let graph = Graph::new(
            vec![Node::start("Start_1"), Node::end("End_1")],
            vec![Flow::unconditional("Flow_1", "Start_1", "End_1")],
        );
        let parser = Arc::new(FixtureParser::new().with_fixture(bpmn_xml.clone(), graph));

        let definitions = Arc::new(InMemoryDefinitionRepository::new());
        let instances_repo = Arc::new(InMemoryInstanceRepository::new());
        let store = Arc::new(WalStateStore::in_memory());
        let clock = FakeClock::new(Utc::now());

        let definition_id = ProcessDefinitionId::new();
        definitions
            .put(ProcessDefinitionRecord { id: definition_id, name: "demo".into(), bpmn_xml, version: 1 })
            .await;

        let instances = Arc::new(InstanceManager::new(definitions.clone(), instances_repo, store.clone(), clock.clone()));
        let registry = Arc::new(FnTaskRegistry::new());
        let scheduler = Arc::new(TimerScheduler::new(
            store.clone(),
            clock.clone(),
            Arc::new(NoopTimerSink),
            std::time::Duration::from_secs(1),
        ));
        let executor = Arc::new(ProcessExecutor::new(store, clock, registry, std::time::Duration::from_secs(5), scheduler));

        (EngineContext { definitions, instances, executor, parser }, definition_id)
    }

    #[tokio::test]
    async fn process_started_runs_a_linear_process_to_completion() {
        let (ctx, definition_id) = context().await;
        let instance_id = ProcessInstanceId::new();
        let event = BusEvent::ProcessStarted {
            instance_id,
            definition_id,
            variables: serde_json::json!({}),
            source: None,
            timestamp: Utc::now(),
        };
        handle(&ctx, event).await.unwrap();
        let record = ctx.instances.get_instance(instance_id).await.unwrap();
        assert_eq!(record.status, ProcessStatus::Completed);
    }

    #[tokio::test]
    async fn process_started_with_unknown_definition_is_reported_not_as_instance_gone() {
        let (ctx, _definition_id) = context().await;
        let instance_id = ProcessInstanceId::new();
        let event = BusEvent::ProcessStarted {
            instance_id,
            definition_id: ProcessDefinitionId::new(),
            variables: serde_json::json!({}),
            source: None,
            timestamp: Utc::now(),
        };
        let err = handle(&ctx, event).await.unwrap_err();
        assert!(matches!(err, ProcessInstanceError::InvalidDefinition(_)));
    }

    #[tokio::test]
    async fn timer_triggered_against_a_suspended_instance_is_ignored() {
        let (ctx, definition_id) = context().await;
        let instance_id = ProcessInstanceId::new();
        ctx.instances.create_instance(instance_id, definition_id, Default::default()).await.unwrap();
        ctx.instances.suspend(instance_id).await.unwrap();

        let event = BusEvent::ProcessTimerTriggered { instance_id, definition_id, node_id: "Timer_1".into() };
        handle(&ctx, event).await.unwrap();
        let record = ctx.instances.get_instance(instance_id).await.unwrap();
        assert_eq!(record.status, ProcessStatus::Suspended);
    }
}
