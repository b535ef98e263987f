use chrono::{DateTime, Utc};
use common::{CorrelationId, EventId};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use uuid::Uuid;

use crate::{BusError, EventPayload, Result};

/// Envelope carried on every topic.
///
/// `event_id` is the deduplication key for consumers; `aggregate_id` picks the
/// partition, so events of one aggregate are delivered in publish order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegrationEvent {
    pub event_id: EventId,
    pub event_type: String,
    pub aggregate_id: Uuid,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<CorrelationId>,
    pub payload: serde_json::Value,
}

impl IntegrationEvent {
    /// Creates a new envelope builder.
    pub fn builder() -> IntegrationEventBuilder {
        IntegrationEventBuilder::default()
    }

    /// Wraps a typed payload, filling type tag and aggregate id from it.
    pub fn from_payload<P: EventPayload>(payload: &P) -> Result<Self> {
        Ok(Self::builder()
            .event_type(P::EVENT_TYPE)
            .aggregate_id(payload.aggregate_id())
            .payload(payload)?
            .build())
    }

    /// Decodes the payload, checking the type tag first.
    pub fn decode<P: EventPayload + DeserializeOwned>(&self) -> Result<P> {
        if self.event_type != P::EVENT_TYPE {
            return Err(BusError::EventTypeMismatch {
                expected: P::EVENT_TYPE.to_string(),
                actual: self.event_type.clone(),
            });
        }
        Ok(serde_json::from_value(self.payload.clone())?)
    }
}

/// Builder for [`IntegrationEvent`].
#[derive(Debug, Default)]
pub struct IntegrationEventBuilder {
    event_id: Option<EventId>,
    event_type: Option<String>,
    aggregate_id: Option<Uuid>,
    timestamp: Option<DateTime<Utc>>,
    correlation_id: Option<CorrelationId>,
    payload: Option<serde_json::Value>,
}

impl IntegrationEventBuilder {
    /// Sets an explicit event id. A random one is generated otherwise.
    pub fn event_id(mut self, id: EventId) -> Self {
        self.event_id = Some(id);
        self
    }

    pub fn event_type(mut self, event_type: impl Into<String>) -> Self {
        self.event_type = Some(event_type.into());
        self
    }

    pub fn aggregate_id(mut self, id: impl Into<Uuid>) -> Self {
        self.aggregate_id = Some(id.into());
        self
    }

    pub fn timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn correlation_id(mut self, id: Option<CorrelationId>) -> Self {
        self.correlation_id = id;
        self
    }

    /// Serializes a payload into the envelope.
    pub fn payload<T: Serialize>(mut self, payload: &T) -> Result<Self> {
        self.payload = Some(serde_json::to_value(payload)?);
        Ok(self)
    }

    pub fn payload_raw(mut self, payload: serde_json::Value) -> Self {
        self.payload = Some(payload);
        self
    }

    /// Builds the envelope, defaulting missing fields.
    pub fn build(self) -> IntegrationEvent {
        IntegrationEvent {
            event_id: self.event_id.unwrap_or_default(),
            event_type: self.event_type.unwrap_or_default(),
            aggregate_id: self.aggregate_id.unwrap_or_else(Uuid::nil),
            timestamp: self.timestamp.unwrap_or_else(Utc::now),
            correlation_id: self.correlation_id,
            payload: self.payload.unwrap_or(serde_json::Value::Null),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{OrderCancelled, OrderConfirmed};
    use common::{Money, OrderId};

    #[test]
    fn envelope_uses_camel_case_wire_names() {
        let order_id = OrderId::new();
        let event = IntegrationEvent::from_payload(&OrderCancelled {
            order_id,
            reason: "Saga compensation".to_string(),
        })
        .unwrap();

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["eventType"], "OrderCancelled");
        assert_eq!(json["aggregateId"], order_id.to_string());
        assert!(json.get("eventId").is_some());
        assert!(json.get("timestamp").is_some());
        assert!(json.get("correlationId").is_none());
        assert_eq!(json["payload"]["reason"], "Saga compensation");
    }

    #[test]
    fn correlation_id_is_carried_when_set() {
        let correlation_id = CorrelationId::new();
        let event = IntegrationEvent::builder()
            .event_type("Ping")
            .correlation_id(Some(correlation_id))
            .build();

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["correlationId"], correlation_id.to_string());
    }

    #[test]
    fn decode_checks_event_type() {
        let event = IntegrationEvent::from_payload(&OrderConfirmed {
            order_id: OrderId::new(),
            total_amount: Money::from_cents(500),
        })
        .unwrap();

        let decoded: OrderConfirmed = event.decode().unwrap();
        assert_eq!(decoded.total_amount, Money::from_cents(500));

        let wrong = event.decode::<OrderCancelled>();
        assert!(matches!(wrong, Err(BusError::EventTypeMismatch { .. })));
    }

    #[test]
    fn builder_generates_defaults() {
        let a = IntegrationEvent::builder().build();
        let b = IntegrationEvent::builder().build();
        assert_ne!(a.event_id, b.event_id);
        assert!(a.payload.is_null());
    }
}
