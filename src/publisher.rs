//! Publishes committed domain events.

use tracing::{debug, warn};
use crate::domain::events::DomainEvent;

/// Fans committed events out to NATS, or only logs them when no NATS
/// connection is configured. Publishing is best effort: failures are logged
/// and never surface to the caller, since the state change is already durable.
#[derive(Clone, Debug, Default)]
pub struct EventPublisher {
    nats: Option<async_nats::Client>,
}

impl EventPublisher {
    pub fn disabled() -> Self { Self { nats: None } }

    pub fn nats(client: async_nats::Client) -> Self { Self { nats: Some(client) } }

    pub fn is_enabled(&self) -> bool { self.nats.is_some() }

    pub async fn publish(&self, events: Vec<DomainEvent>) {
        for event in events {
            let subject = event.subject();
            let Some(client) = &self.nats else {
                debug!(subject, ?event, "domain event");
                continue;
            };
            let payload = match serde_json::to_vec(&event) {
                Ok(p) => p,
                Err(e) => { warn!(subject, error = %e, "failed to encode domain event"); continue; }
            };
            if let Err(e) = client.publish(subject.to_string(), payload.into()).await {
                warn!(subject, error = %e, "failed to publish domain event");
            }
        }
    }
}
