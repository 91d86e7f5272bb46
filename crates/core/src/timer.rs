// SPDX-License-Identifier: MIT

//! TimerRecord: a persisted, armed-or-fired time-based trigger (§3, §4.4).

use crate::id::{ProcessDefinitionId, ProcessInstanceId, TimerRecordId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimerState {
    Armed,
    Fired,
    Cancelled,
}

crate::simple_display! {
    TimerState {
        Armed => "armed",
        Fired => "fired",
        Cancelled => "cancelled",
    }
}

/// An ISO-8601 duration (`PT5M`) or a cron expression, exactly as declared
/// on the BPMN timer definition. Parsing/evaluating it into a concrete next
/// fire time is a Timer Scheduler responsibility (§4.4), not this type's.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum TimerDefinition {
    Duration(String),
    Cron(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimerRecord {
    pub id: TimerRecordId,
    pub instance_id: ProcessInstanceId,
    pub definition_id: ProcessDefinitionId,
    pub node_id: String,
    pub definition: TimerDefinition,
    pub next_fire_time: chrono::DateTime<chrono::Utc>,
    pub state: TimerState,
    /// Optimistic version, bumped on every CAS-guarded state change
    /// (`mark_timer_fired`, cancellation). Mirrors the state store's CAS
    /// primitive (§4.3) at the domain level.
    pub generation: u64,
}

impl TimerRecord {
    pub fn new(
        instance_id: ProcessInstanceId,
        definition_id: ProcessDefinitionId,
        node_id: impl Into<String>,
        definition: TimerDefinition,
        next_fire_time: chrono::DateTime<chrono::Utc>,
    ) -> Self {
        Self {
            id: TimerRecordId::new(),
            instance_id,
            definition_id,
            node_id: node_id.into(),
            definition,
            next_fire_time,
            state: TimerState::Armed,
            generation: 0,
        }
    }

    pub fn is_due(&self, now: chrono::DateTime<chrono::Utc>) -> bool {
        self.state == TimerState::Armed && self.next_fire_time <= now
    }
}
