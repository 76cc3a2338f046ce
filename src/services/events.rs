//! Domain event publishing over NATS.

use crate::domain::events::DomainEvent;

/// Publishes domain events when a NATS connection is available.
///
/// Publishing never fails a request: errors are logged and dropped.
#[derive(Clone, Default)]
pub struct EventPublisher {
    client: Option<async_nats::Client>,
}

impl EventPublisher {
    pub fn disabled() -> Self { Self::default() }

    pub async fn connect(url: Option<&str>) -> Self {
        let Some(url) = url else { return Self::disabled() };
        match async_nats::connect(url).await {
            Ok(client) => {
                tracing::info!(url = %url, "Connected to NATS");
                Self { client: Some(client) }
            }
            Err(e) => {
                tracing::warn!(url = %url, error = %e, "NATS unavailable; events will not be published");
                Self::disabled()
            }
        }
    }

    pub async fn publish(&self, event: DomainEvent) {
        let Some(client) = &self.client else { return };
        let subject = event.subject();
        let payload = match serde_json::to_vec(&event) {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!(subject, error = %e, "Failed to encode event");
                return;
            }
        };
        if let Err(e) = client.publish(subject.to_string(), payload.into()).await {
            tracing::warn!(subject, error = %e, "Failed to publish event");
        }
    }
}
