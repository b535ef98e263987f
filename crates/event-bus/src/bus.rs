use std::sync::Arc;

use async_trait::async_trait;
use common::CorrelationId;

use crate::{EventPayload, IntegrationEvent, Result};

/// Error type returned by event handlers.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Consumer-side callback for one subscription.
///
/// A handler error is logged by the bus and the message is not retried; the
/// handler must stay safe to invoke again for the same event on redelivery.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: IntegrationEvent) -> std::result::Result<(), HandlerError>;
}

/// Publish/subscribe over a partitioned, at-least-once log.
///
/// Every consumer group subscribed to a topic receives every message; inside
/// one group, messages of the same aggregate are handled in publish order.
#[async_trait]
pub trait EventBus: Send + Sync {
    /// Appends an event to a topic.
    async fn publish(&self, topic: &str, event: IntegrationEvent) -> Result<()>;

    /// Registers a consumer group's handler on a topic.
    async fn subscribe(
        &self,
        topic: &str,
        group: &str,
        handler: Arc<dyn EventHandler>,
    ) -> Result<()>;
}

/// Extension trait providing typed publishing.
#[async_trait]
pub trait EventBusExt: EventBus {
    /// Wraps a payload in an envelope and publishes it on its topic.
    ///
    /// Returns the published envelope.
    async fn publish_payload<P>(
        &self,
        payload: &P,
        correlation_id: Option<CorrelationId>,
    ) -> Result<IntegrationEvent>
    where
        P: EventPayload + Sync,
    {
        let mut event = IntegrationEvent::from_payload(payload)?;
        event.correlation_id = correlation_id;
        self.publish(P::TOPIC, event.clone()).await?;
        Ok(event)
    }
}

impl<T: EventBus + ?Sized> EventBusExt for T {}

#[async_trait]
impl<B: EventBus + ?Sized> EventBus for Arc<B> {
    async fn publish(&self, topic: &str, event: IntegrationEvent) -> Result<()> {
        (**self).publish(topic, event).await
    }

    async fn subscribe(
        &self,
        topic: &str,
        group: &str,
        handler: Arc<dyn EventHandler>,
    ) -> Result<()> {
        (**self).subscribe(topic, group, handler).await
    }
}
