// SPDX-License-Identifier: MIT

//! Process instance lifecycle state machine (§4.2).
//!
//! ```text
//! CREATED → RUNNING
//! RUNNING ↔ SUSPENDED
//! RUNNING → ERROR
//! ERROR   → RUNNING    (recovery)
//! RUNNING → COMPLETED  (terminal)
//! ERROR   → COMPLETED  (forced terminate)
//! ```
//! All other transitions fail with `InvalidStateTransitionError`. `CREATED`
//! is not a persisted status (§3 says instances are created directly into
//! `RUNNING`); it exists here only to make the matrix below total.

use crate::error::InvalidStateTransitionError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ProcessStatus {
    Running,
    Suspended,
    Error,
    Completed,
}

crate::simple_display! {
    ProcessStatus {
        Running => "RUNNING",
        Suspended => "SUSPENDED",
        Error => "ERROR",
        Completed => "COMPLETED",
    }
}

impl ProcessStatus {
    /// Validate a transition against the matrix in §4.2. `created` variants
    /// (instance row does not yet exist) are handled by the caller, which
    /// never calls this for the implicit `CREATED → RUNNING` edge.
    pub fn validate_transition(self, to: ProcessStatus) -> Result<(), InvalidStateTransitionError> {
        use ProcessStatus::*;
        let allowed = matches!(
            (self, to),
            (Running, Suspended)
                | (Suspended, Running)
                | (Running, Error)
                | (Error, Running)
                | (Running, Completed)
                | (Error, Completed)
        );
        if allowed {
            Ok(())
        } else {
            Err(InvalidStateTransitionError { from: self, to })
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, ProcessStatus::Completed)
    }
}
