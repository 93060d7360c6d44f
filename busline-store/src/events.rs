use async_trait::async_trait;
use busline_core::events::TicketEventPublisher;
use busline_core::{CoreError, CoreResult};
use busline_shared::models::events::{TICKETS_ISSUED_TOPIC, TICKETS_STATUS_TOPIC};
use busline_shared::{TicketIssuedEvent, TicketStatusChangedEvent};
use rdkafka::config::ClientConfig;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use std::time::Duration;
use tracing::{error, info};

#[derive(Clone)]
pub struct EventProducer {
    producer: FutureProducer,
}

impl EventProducer {
    pub fn new(brokers: &str) -> Result<Self, rdkafka::error::KafkaError> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("message.timeout.ms", "5000")
            .create()?;

        Ok(Self { producer })
    }

    pub async fn publish(&self, topic: &str, key: &str, payload: &str) -> Result<(), rdkafka::error::KafkaError> {
        let record = FutureRecord::to(topic).key(key).payload(payload);

        match self.producer.send(record, Timeout::After(Duration::from_secs(0))).await {
            Ok(_) => {
                info!("Sent message to {}/{}", topic, key);
                Ok(())
            }
            Err((e, _msg)) => {
                error!("Failed to send message to {}: {}", topic, e);
                Err(e)
            }
        }
    }

    async fn publish_json<T: serde::Serialize + Sync>(&self, topic: &str, key: &str, event: &T) -> CoreResult<()> {
        let payload = serde_json::to_string(event).map_err(|e| CoreError::StorageError(e.to_string()))?;
        self.publish(topic, key, &payload)
            .await
            .map_err(|e| CoreError::StorageError(e.to_string()))
    }
}

#[async_trait]
impl TicketEventPublisher for EventProducer {
    async fn ticket_issued(&self, event: &TicketIssuedEvent) -> CoreResult<()> {
        // Keyed by trip so one trip's events stay ordered on a partition.
        self.publish_json(TICKETS_ISSUED_TOPIC, &event.trip_id.to_string(), event).await
    }

    async fn ticket_status_changed(&self, event: &TicketStatusChangedEvent) -> CoreResult<()> {
        self.publish_json(TICKETS_STATUS_TOPIC, &event.trip_id.to_string(), event).await
    }
}
