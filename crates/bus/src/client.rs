// SPDX-License-Identifier: MIT

//! The event bus client contract (§4.5, §6): publish [`BusEvent`]s onto
//! their topic's durable queue, and subscribe to receive at-least-once
//! delivery of every event published to a topic.

use async_trait::async_trait;
use wfe_core::BusEvent;

#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("bus connection error: {0}")]
    Connection(String),
    #[error("failed to publish to {topic}: {message}")]
    Publish { topic: String, message: String },
    #[error("failed to decode event from {topic}: {message}")]
    Decode { topic: String, message: String },
}

/// A durably-queued, at-least-once delivery channel between the API surface
/// that creates/signals instances and the dispatch layer that runs them.
#[async_trait]
pub trait EventBusClient: Send + Sync {
    async fn publish(&self, event: BusEvent) -> Result<(), BusError>;

    /// Subscribe to a durable queue by name (`process_execution`,
    /// `timer_execution` — see [`BusEvent::queue_name`]). Each subscriber
    /// gets its own durable position; redelivery on crash is the
    /// implementation's job.
    async fn subscribe(&self, queue_name: &str) -> Result<Box<dyn EventSubscription>, BusError>;
}

#[async_trait]
pub trait EventSubscription: Send {
    /// Block until the next event arrives, or `None` if the subscription
    /// was closed.
    async fn next(&mut self) -> Option<BusEvent>;

    /// Acknowledge the most recently returned event, advancing the durable
    /// position so it is not redelivered after a crash.
    async fn ack(&mut self) -> Result<(), BusError>;
}
