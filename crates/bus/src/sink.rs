// SPDX-License-Identifier: MIT

//! Bridges the timer scheduler's bus-agnostic [`TimerSink`] to a real
//! [`EventBusClient`], so `wfe-daemon` can hand the scheduler a sink backed
//! by NATS (or the in-memory bus in tests) without `wfe-engine` ever
//! depending on `wfe-bus`.

use std::sync::Arc;

use wfe_core::BusEvent;
use wfe_engine::TimerSink;

use crate::client::EventBusClient;

pub struct BusTimerSink {
    bus: Arc<dyn EventBusClient>,
}

impl BusTimerSink {
    pub fn new(bus: Arc<dyn EventBusClient>) -> Self {
        Self { bus }
    }
}

#[async_trait::async_trait]
impl TimerSink for BusTimerSink {
    async fn publish(&self, event: BusEvent) {
        if let Err(e) = self.bus.publish(event.clone()).await {
            tracing::error!(error = %e, queue = event.queue_name(), "failed to publish timer event");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryEventBus;
    use wfe_core::{ProcessDefinitionId, ProcessInstanceId};

    #[tokio::test]
    async fn publish_forwards_to_the_underlying_bus() {
        let bus = Arc::new(InMemoryEventBus::new());
        let mut sub = bus.subscribe("timer_execution").await.unwrap();
        let sink = BusTimerSink::new(bus);

        let event = BusEvent::ProcessTimerTriggered {
            instance_id: ProcessInstanceId::new(),
            definition_id: ProcessDefinitionId::new(),
            node_id: "Timer_1".to_string(),
        };
        sink.publish(event.clone()).await;

        assert_eq!(sub.next().await.unwrap(), event);
    }
}
