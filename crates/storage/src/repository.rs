// SPDX-License-Identifier: MIT

//! The two catalog collaborators that sit beside the [`crate::StateStore`]:
//! process definitions (immutable BPMN sources) and process instances
//! (lifecycle rows). §4.2 treats both as the "transactional KV-over-relations
//! collaborator" the instance manager reads and writes through.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use wfe_core::{InvalidProcessDefinitionError, ProcessDefinitionId, ProcessInstanceId, ProcessStatus};

/// An immutable, versioned BPMN source (§3). Parsing it into a
/// [`wfe_graph::Graph`] is the `BpmnParser` collaborator's job, not this
/// repository's — it only stores and retrieves bytes.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessDefinitionRecord {
    pub id: ProcessDefinitionId,
    pub name: String,
    pub bpmn_xml: String,
    pub version: u32,
}

#[async_trait]
pub trait DefinitionRepository: Send + Sync {
    async fn put(&self, record: ProcessDefinitionRecord);
    async fn get(&self, id: ProcessDefinitionId) -> Option<ProcessDefinitionRecord>;
}

#[derive(Default, Clone)]
pub struct InMemoryDefinitionRepository {
    records: Arc<RwLock<HashMap<ProcessDefinitionId, ProcessDefinitionRecord>>>,
}

impl InMemoryDefinitionRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DefinitionRepository for InMemoryDefinitionRepository {
    async fn put(&self, record: ProcessDefinitionRecord) {
        self.records.write().insert(record.id, record);
    }

    async fn get(&self, id: ProcessDefinitionId) -> Option<ProcessDefinitionRecord> {
        self.records.read().get(&id).cloned()
    }
}

/// A process instance's lifecycle row (§3, §4.2). Token and variable state
/// live in the [`crate::StateStore`]; this is just identity, status and the
/// timestamps the status transitions stamp.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessInstanceRecord {
    pub id: ProcessInstanceId,
    pub definition_id: ProcessDefinitionId,
    pub status: ProcessStatus,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl ProcessInstanceRecord {
    pub fn new(
        id: ProcessInstanceId,
        definition_id: ProcessDefinitionId,
        start_time: DateTime<Utc>,
    ) -> Self {
        Self { id, definition_id, status: ProcessStatus::Running, start_time, end_time: None, error: None }
    }
}

#[async_trait]
pub trait InstanceRepository: Send + Sync {
    /// Insert the instance row if absent, or return the existing one
    /// unchanged — `create_instance` is idempotent on a client-supplied
    /// instance id (§4.2).
    async fn create_or_get(&self, record: ProcessInstanceRecord) -> ProcessInstanceRecord;

    async fn get(&self, id: ProcessInstanceId) -> Option<ProcessInstanceRecord>;

    async fn update(&self, record: ProcessInstanceRecord);

    async fn delete(&self, id: ProcessInstanceId);

    /// All instances currently in `status`, used by the daemon to enforce
    /// `process.max_instances` and to sweep completed rows on
    /// `process.cleanup_interval`.
    async fn list_by_status(&self, status: ProcessStatus) -> Vec<ProcessInstanceRecord>;
}

#[derive(Default, Clone)]
pub struct InMemoryInstanceRepository {
    records: Arc<RwLock<HashMap<ProcessInstanceId, ProcessInstanceRecord>>>,
}

impl InMemoryInstanceRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl InstanceRepository for InMemoryInstanceRepository {
    async fn create_or_get(&self, record: ProcessInstanceRecord) -> ProcessInstanceRecord {
        let mut records = self.records.write();
        records.entry(record.id).or_insert(record).clone()
    }

    async fn get(&self, id: ProcessInstanceId) -> Option<ProcessInstanceRecord> {
        self.records.read().get(&id).cloned()
    }

    async fn update(&self, record: ProcessInstanceRecord) {
        self.records.write().insert(record.id, record);
    }

    async fn delete(&self, id: ProcessInstanceId) {
        self.records.write().remove(&id);
    }

    async fn list_by_status(&self, status: ProcessStatus) -> Vec<ProcessInstanceRecord> {
        self.records.read().values().filter(|r| r.status == status).cloned().collect()
    }
}

/// Look up a definition and reject the lookup with the §7 error that names
/// the missing id, rather than leaving callers to map `None` themselves.
pub async fn require_definition(
    repo: &dyn DefinitionRepository,
    id: ProcessDefinitionId,
) -> Result<ProcessDefinitionRecord, InvalidProcessDefinitionError> {
    repo.get(id).await.ok_or(InvalidProcessDefinitionError::NotFound(id))
}
