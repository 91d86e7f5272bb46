// SPDX-License-Identifier: MIT

//! The dispatch layer (§5): consumes `process.started` and
//! `process.timer_triggered` off their durable queues and serializes
//! execution per instance so two dispatch workers never advance the same
//! instance's tokens concurrently.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Mutex as AsyncMutex;
use wfe_core::{BusEvent, ProcessInstanceId};

use crate::client::{EventBusClient, EventSubscription};

/// One advisory lock per instance id, created on first use and kept for the
/// life of the process. Two effects for the same instance always contend on
/// the same `tokio::sync::Mutex`, however many dispatch workers are pulling
/// off the queue (§5 "serialized per-instance execution").
#[derive(Default)]
pub struct InstanceLocks {
    locks: Mutex<HashMap<ProcessInstanceId, Arc<AsyncMutex<()>>>>,
}

impl InstanceLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lock_for(&self, instance_id: ProcessInstanceId) -> Arc<AsyncMutex<()>> {
        self.locks.lock().entry(instance_id).or_insert_with(|| Arc::new(AsyncMutex::new(()))).clone()
    }
}

/// Pulls events off a single durable queue and calls `handler` for each,
/// holding that event's instance lock for the duration of the call so
/// handlers never need their own synchronization.
pub struct Dispatcher {
    bus: Arc<dyn EventBusClient>,
    locks: Arc<InstanceLocks>,
}

impl Dispatcher {
    pub fn new(bus: Arc<dyn EventBusClient>, locks: Arc<InstanceLocks>) -> Self {
        Self { bus, locks }
    }

    /// Run forever, pulling from `queue_name` and invoking `handler` for
    /// each delivered event. `handler` returning `Err` leaves the event
    /// unacked so it is redelivered (§5 retry policy); returning `Ok` acks.
    pub async fn run<F, Fut>(&self, queue_name: &str, handler: F) -> Result<(), crate::client::BusError>
    where
        F: Fn(BusEvent) -> Fut + Send + Sync,
        Fut: std::future::Future<Output = Result<(), wfe_core::ProcessInstanceError>> + Send,
    {
        let mut subscription = self.bus.subscribe(queue_name).await?;
        while let Some(event) = subscription.next().await {
            let instance_id = event.instance_id();
            let lock = self.locks.lock_for(instance_id);
            let _guard = lock.lock().await;

            match handler(event).await {
                Ok(()) => {
                    if let Err(e) = subscription.ack().await {
                        tracing::error!(%instance_id, error = %e, "failed to ack dispatched event");
                    }
                }
                Err(wfe_core::ProcessInstanceError::InstanceGone(_)) => {
                    // Instance was torn down concurrently; ack and move on.
                    let _ = subscription.ack().await;
                }
                Err(e) => {
                    tracing::error!(%instance_id, error = %e, "dispatch handler failed, leaving event unacked");
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryEventBus;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use wfe_core::{ProcessDefinitionId, ProcessInstanceId};

    #[tokio::test]
    async fn dispatcher_serializes_events_for_the_same_instance() {
        let bus = Arc::new(InMemoryEventBus::new());
        let locks = Arc::new(InstanceLocks::new());
        let dispatcher = Dispatcher::new(bus.clone(), locks);

        let instance_id = ProcessInstanceId::new();
        let concurrent = Arc::new(AtomicUsize::new(0));
        let max_concurrent = Arc::new(AtomicUsize::new(0));

        let concurrent_for_handler = concurrent.clone();
        let max_for_handler = max_concurrent.clone();
        let run = tokio::spawn({
            let dispatcher = dispatcher;
            async move {
                let _ = tokio::time::timeout(
                    std::time::Duration::from_millis(200),
                    dispatcher.run("process_execution", move |_event| {
                        let concurrent = concurrent_for_handler.clone();
                        let max_concurrent = max_for_handler.clone();
                        async move {
                            let now = concurrent.fetch_add(1, Ordering::SeqCst) + 1;
                            max_concurrent.fetch_max(now, Ordering::SeqCst);
                            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
                            concurrent.fetch_sub(1, Ordering::SeqCst);
                            Ok(())
                        }
                    }),
                )
                .await;
            }
        });

        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        for _ in 0..3 {
            bus.publish(BusEvent::ProcessStarted {
                instance_id,
                definition_id: ProcessDefinitionId::new(),
                variables: serde_json::json!({}),
                source: None,
                timestamp: chrono::Utc::now(),
            })
            .await
            .unwrap();
        }

        let _ = run.await;
        assert_eq!(max_concurrent.load(Ordering::SeqCst), 1);
    }
}
