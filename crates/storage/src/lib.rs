// SPDX-License-Identifier: MIT

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! wfe-storage: the durable state collaborators (§4.3, §4.4).
//!
//! [`MaterializedState`] is the in-memory projection of applied
//! [`wfe_core::StateEvent`]s; [`Wal`] makes that projection durable and
//! crash-recoverable; [`WalStateStore`] is the CAS-guarded façade the engine
//! talks to. [`repository`] holds the two catalog collaborators (process
//! definitions and instance lifecycle rows) that sit beside it.

pub mod materialized;
pub mod repository;
pub mod state_store;
pub mod wal;

pub use materialized::{MaterializedState, VariableEntry};
pub use repository::{
    require_definition, DefinitionRepository, InMemoryDefinitionRepository,
    InMemoryInstanceRepository, InstanceRepository, ProcessDefinitionRecord,
    ProcessInstanceRecord,
};
pub use state_store::{StateStore, StateStoreError, WalStateStore};
pub use wal::{Wal, WalError};
