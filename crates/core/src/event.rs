// SPDX-License-Identifier: MIT

//! Two event vocabularies:
//!
//! - [`BusEvent`] — the wire payloads carried on the event bus topics (§6).
//! - [`StateEvent`] — the durable facts applied to the state store's
//!   materialized view (§4.3); every mutation is represented as one of
//!   these so replay after a crash reconstructs state exactly.

use crate::id::{ProcessDefinitionId, ProcessInstanceId, TimerRecordId, TokenId};
use crate::timer::TimerState;
use crate::token::{Token, TokenData};
use crate::variable::VariableValue;
use serde::{Deserialize, Serialize};

/// Bus topics and payloads (§6).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "topic")]
pub enum BusEvent {
    #[serde(rename = "process.started")]
    ProcessStarted {
        instance_id: ProcessInstanceId,
        definition_id: ProcessDefinitionId,
        #[serde(default)]
        variables: serde_json::Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        source: Option<String>,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
    #[serde(rename = "process.timer_triggered")]
    ProcessTimerTriggered {
        instance_id: ProcessInstanceId,
        definition_id: ProcessDefinitionId,
        node_id: String,
    },
}

impl BusEvent {
    pub fn topic(&self) -> &'static str {
        match self {
            BusEvent::ProcessStarted { .. } => "process.started",
            BusEvent::ProcessTimerTriggered { .. } => "process.timer_triggered",
        }
    }

    /// Durable queue each topic binds to (§4.5).
    pub fn queue_name(&self) -> &'static str {
        match self {
            BusEvent::ProcessStarted { .. } => "process_execution",
            BusEvent::ProcessTimerTriggered { .. } => "timer_execution",
        }
    }

    pub fn instance_id(&self) -> ProcessInstanceId {
        match self {
            BusEvent::ProcessStarted { instance_id, .. }
            | BusEvent::ProcessTimerTriggered { instance_id, .. } => *instance_id,
        }
    }
}

/// A durable fact about a state mutation, written to the state store's
/// append log and replayed to rebuild the materialized view (§4.3, §4.4
/// crash recovery).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StateEvent {
    TokenCreated { token: Token },
    TokenMoved { old_token_id: TokenId, new_token: Token },
    TokenDeleted { instance_id: ProcessInstanceId, token_id: TokenId },
    TokensDeleted { instance_id: ProcessInstanceId },
    VariableSet {
        instance_id: ProcessInstanceId,
        name: String,
        scope: crate::id::ScopeId,
        value: VariableValue,
        version: u64,
    },
    TimerPut { record: crate::timer::TimerRecord },
    TimerStateChanged {
        id: TimerRecordId,
        instance_id: ProcessInstanceId,
        state: TimerState,
        generation: u64,
    },
    InstanceCreated {
        instance_id: ProcessInstanceId,
        definition_id: ProcessDefinitionId,
        start_time: chrono::DateTime<chrono::Utc>,
    },
    InstanceStatusChanged {
        instance_id: ProcessInstanceId,
        status: crate::status::ProcessStatus,
        end_time: Option<chrono::DateTime<chrono::Utc>>,
    },
    InstanceErrored { instance_id: ProcessInstanceId, error: String },
}

impl StateEvent {
    pub fn instance_id(&self) -> ProcessInstanceId {
        match self {
            StateEvent::TokenCreated { token } => token.instance_id,
            StateEvent::TokenMoved { new_token, .. } => new_token.instance_id,
            StateEvent::TokenDeleted { instance_id, .. }
            | StateEvent::TokensDeleted { instance_id }
            | StateEvent::VariableSet { instance_id, .. }
            | StateEvent::InstanceCreated { instance_id, .. }
            | StateEvent::InstanceStatusChanged { instance_id, .. }
            | StateEvent::InstanceErrored { instance_id, .. }
            | StateEvent::TimerStateChanged { instance_id, .. } => *instance_id,
            StateEvent::TimerPut { record } => record.instance_id,
        }
    }
}

/// Small data bag attached to a token-creation event, reused by
/// `create_initial_token` and `move_token`.
pub fn empty_token_data() -> TokenData {
    TokenData::new()
}
