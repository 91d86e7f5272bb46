// SPDX-License-Identifier: MIT

//! An in-process [`EventBusClient`] backed by unbounded channels, used by
//! tests and the CLI's offline scenarios in place of a real broker.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use wfe_core::BusEvent;

use crate::client::{BusError, EventBusClient, EventSubscription};

#[derive(Clone, Default)]
pub struct InMemoryEventBus {
    queues: Arc<Mutex<HashMap<String, Vec<mpsc::UnboundedSender<BusEvent>>>>>,
}

impl InMemoryEventBus {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EventBusClient for InMemoryEventBus {
    async fn publish(&self, event: BusEvent) -> Result<(), BusError> {
        let queue_name = event.queue_name();
        let senders = self.queues.lock().get(queue_name).cloned().unwrap_or_default();
        for sender in senders {
            // A closed receiver just means that subscriber is gone; other
            // subscribers on the same durable queue still get the event.
            let _ = sender.send(event.clone());
        }
        Ok(())
    }

    async fn subscribe(&self, queue_name: &str) -> Result<Box<dyn EventSubscription>, BusError> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.queues.lock().entry(queue_name.to_string()).or_default().push(tx);
        Ok(Box::new(InMemorySubscription { rx }))
    }
}

struct InMemorySubscription {
    rx: mpsc::UnboundedReceiver<BusEvent>,
}

#[async_trait]
impl EventSubscription for InMemorySubscription {
    async fn next(&mut self) -> Option<BusEvent> {
        self.rx.recv().await
    }

    async fn ack(&mut self) -> Result<(), BusError> {
        // No redelivery tracking in-process; ack is a no-op.
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wfe_core::{ProcessDefinitionId, ProcessInstanceId};

    #[tokio::test]
    async fn published_events_are_delivered_to_subscribers_on_the_same_queue() {
        let bus = InMemoryEventBus::new();
        let mut sub = bus.subscribe("process_execution").await.unwrap();

        let event = BusEvent::ProcessStarted {
            instance_id: ProcessInstanceId::new(),
            definition_id: ProcessDefinitionId::new(),
            variables: serde_json::json!({}),
            source: None,
            timestamp: chrono::Utc::now(),
        };
        bus.publish(event.clone()).await.unwrap();

        let received = sub.next().await.unwrap();
        assert_eq!(received, event);
    }

    #[tokio::test]
    async fn subscribers_on_a_different_queue_do_not_receive_the_event() {
        let bus = InMemoryEventBus::new();
        let mut timer_sub = bus.subscribe("timer_execution").await.unwrap();

        bus.publish(BusEvent::ProcessStarted {
            instance_id: ProcessInstanceId::new(),
            definition_id: ProcessDefinitionId::new(),
            variables: serde_json::json!({}),
            source: None,
            timestamp: chrono::Utc::now(),
        })
        .await
        .unwrap();

        let got = tokio::time::timeout(std::time::Duration::from_millis(50), timer_sub.next()).await;
        assert!(got.is_err(), "timer_execution subscriber should not see a process_execution event");
    }
}
