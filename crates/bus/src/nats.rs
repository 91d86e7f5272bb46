// SPDX-License-Identifier: MIT

//! NATS JetStream-backed [`EventBusClient`] (§4.5): each topic's durable
//! queue is a JetStream work-queue stream, so every event is delivered to
//! exactly one dispatch-layer worker at least once, with redelivery on
//! crash handled by JetStream's ack/redeliver machinery rather than
//! anything this crate tracks itself.

use async_nats::jetstream::{self, consumer::pull, stream};
use async_trait::async_trait;
use futures::StreamExt;
use wfe_core::BusEvent;

use crate::client::{BusError, EventBusClient, EventSubscription};

const SUBJECT_PREFIX: &str = "wfe.events";

#[derive(Debug, Clone)]
pub struct NatsBusConfig {
    pub url: String,
    pub stream_name: String,
}

impl NatsBusConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into(), stream_name: "WFE_EVENTS".to_string() }
    }
}

pub struct NatsEventBus {
    jetstream: jetstream::Context,
    config: NatsBusConfig,
}

impl NatsEventBus {
    pub async fn connect(config: NatsBusConfig) -> Result<Self, BusError> {
        let client = async_nats::connect(&config.url)
            .await
            .map_err(|e| BusError::Connection(e.to_string()))?;
        let jetstream = jetstream::new(client);

        jetstream
            .get_or_create_stream(stream::Config {
                name: config.stream_name.clone(),
                subjects: vec![format!("{SUBJECT_PREFIX}.>")],
                storage: stream::StorageType::File,
                retention: stream::RetentionPolicy::WorkQueue,
                ..Default::default()
            })
            .await
            .map_err(|e| BusError::Connection(format!("failed to create stream: {e}")))?;

        Ok(Self { jetstream, config })
    }

    fn subject(queue_name: &str) -> String {
        format!("{SUBJECT_PREFIX}.{queue_name}")
    }
}

#[async_trait]
impl EventBusClient for NatsEventBus {
    async fn publish(&self, event: BusEvent) -> Result<(), BusError> {
        let subject = Self::subject(event.queue_name());
        let bytes = serde_json::to_vec(&event)
            .map_err(|e| BusError::Publish { topic: subject.clone(), message: e.to_string() })?;

        self.jetstream
            .publish(subject.clone(), bytes.into())
            .await
            .map_err(|e| BusError::Publish { topic: subject.clone(), message: e.to_string() })?
            .await
            .map_err(|e| BusError::Publish { topic: subject, message: e.to_string() })?;
        Ok(())
    }

    async fn subscribe(&self, queue_name: &str) -> Result<Box<dyn EventSubscription>, BusError> {
        let subject = Self::subject(queue_name);
        let stream = self
            .jetstream
            .get_stream(&self.config.stream_name)
            .await
            .map_err(|e| BusError::Connection(format!("failed to get stream: {e}")))?;

        let consumer = stream
            .create_consumer(pull::Config {
                durable_name: Some(format!("{queue_name}-worker")),
                filter_subject: subject.clone(),
                ..Default::default()
            })
            .await
            .map_err(|e| BusError::Connection(format!("failed to create consumer: {e}")))?;

        let messages = consumer
            .messages()
            .await
            .map_err(|e| BusError::Connection(format!("failed to start consuming: {e}")))?;

        Ok(Box::new(NatsSubscription { subject, messages: Box::pin(messages), pending_ack: None }))
    }
}

struct NatsSubscription {
    subject: String,
    messages: std::pin::Pin<Box<pull::Stream>>,
    pending_ack: Option<jetstream::Message>,
}

#[async_trait]
impl EventSubscription for NatsSubscription {
    async fn next(&mut self) -> Option<BusEvent> {
        loop {
            let message = self.messages.next().await?.ok()?;
            match serde_json::from_slice::<BusEvent>(&message.payload) {
                Ok(event) => {
                    self.pending_ack = Some(message);
                    return Some(event);
                }
                Err(e) => {
                    tracing::warn!(subject = %self.subject, error = %e, "dropping malformed bus message");
                    let _ = message.ack().await;
                }
            }
        }
    }

    async fn ack(&mut self) -> Result<(), BusError> {
        if let Some(message) = self.pending_ack.take() {
            message
                .ack()
                .await
                .map_err(|e| BusError::Connection(format!("failed to ack: {e}")))?;
        }
        Ok(())
    }
}
