// SPDX-License-Identifier: MIT

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! wfe-bus: the event bus client contract (§4.5, §6), an in-process
//! implementation for tests, a NATS JetStream implementation for
//! production, and the per-instance dispatch layer (§5) that sits on top
//! of both.

pub mod client;
pub mod dispatch;
pub mod memory;
pub mod nats;
pub mod sink;

pub use client::{BusError, EventBusClient, EventSubscription};
pub use dispatch::{Dispatcher, InstanceLocks};
pub use memory::InMemoryEventBus;
pub use nats::{NatsBusConfig, NatsEventBus};
pub use sink::BusTimerSink;
