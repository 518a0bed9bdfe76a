//! Broadcast of allow-listed facts after commit

use crate::error::RecvError;
use crate::filter::FactFilter;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tenantry_core::{BridgeConfig, Fact, FactId, FactMetadata, FactPublisher, StreamId, StreamType};
use tokio::sync::broadcast;

/// Message delivered to subscribers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub fact_id: FactId,
    pub fact_type: String,
    pub stream_id: StreamId,
    pub stream_type: StreamType,
    pub payload: Value,
    pub metadata: FactMetadata,
    pub created_at: DateTime<Utc>,
}

impl From<&Fact> for Notification {
    fn from(fact: &Fact) -> Self {
        Self {
            fact_id: fact.id,
            fact_type: fact.fact_type.clone(),
            stream_id: fact.stream_id,
            stream_type: fact.stream_type,
            payload: fact.payload.clone(),
            metadata: fact.metadata.clone(),
            created_at: fact.created_at,
        }
    }
}

/// Publishes filtered facts over a `tokio::sync::broadcast` channel.
///
/// Sending never blocks the appender; with no subscribers the message is
/// dropped.
pub struct NotificationBridge {
    filter: FactFilter,
    sender: broadcast::Sender<Notification>,
}

impl NotificationBridge {
    pub fn new(config: &BridgeConfig) -> Self {
        Self::with_filter(
            FactFilter::allow_list(config.allow_list.iter().cloned()),
            config.channel_capacity,
        )
    }

    pub fn with_filter(filter: FactFilter, capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { filter, sender }
    }

    pub fn subscribe(&self) -> Subscription {
        Subscription {
            receiver: self.sender.subscribe(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    pub fn filter(&self) -> &FactFilter {
        &self.filter
    }
}

impl FactPublisher for NotificationBridge {
    fn publish(&self, fact: &Fact) {
        if !self.filter.matches(&fact.fact_type) {
            return;
        }
        match self.sender.send(Notification::from(fact)) {
            Ok(receivers) => tracing::debug!(
                fact_id = %fact.id,
                fact_type = %fact.fact_type,
                receivers,
                "Published notification"
            ),
            Err(_) => tracing::debug!(
                fact_id = %fact.id,
                fact_type = %fact.fact_type,
                "No subscribers, notification dropped"
            ),
        }
    }
}

/// Receiving half handed to one consumer
pub struct Subscription {
    receiver: broadcast::Receiver<Notification>,
}

impl Subscription {
    /// Wait for the next notification.
    ///
    /// A lagging subscriber gets [`RecvError::Lagged`] once; the following
    /// call continues from the oldest notification still buffered.
    pub async fn recv(&mut self) -> Result<Notification, RecvError> {
        match self.receiver.recv().await {
            Ok(notification) => Ok(notification),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "Subscriber lagged, notifications dropped");
                Err(RecvError::Lagged(skipped))
            }
            Err(broadcast::error::RecvError::Closed) => Err(RecvError::Closed),
        }
    }

    /// Next notification if one is already buffered
    pub fn try_recv(&mut self) -> Result<Option<Notification>, RecvError> {
        match self.receiver.try_recv() {
            Ok(notification) => Ok(Some(notification)),
            Err(broadcast::error::TryRecvError::Empty) => Ok(None),
            Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "Subscriber lagged, notifications dropped");
                Err(RecvError::Lagged(skipped))
            }
            Err(broadcast::error::TryRecvError::Closed) => Err(RecvError::Closed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;
    use uuid::Uuid;

    fn fact(fact_type: &str) -> Fact {
        Fact {
            id: Uuid::new_v4(),
            stream_id: Uuid::new_v4(),
            stream_type: StreamType::Organization,
            stream_version: 1,
            fact_type: fact_type.to_string(),
            payload: json!({"name": "Acme"}),
            metadata: FactMetadata {
                actor_id: Uuid::new_v4(),
                organization_id: Uuid::new_v4(),
                correlation_id: Uuid::new_v4(),
                reason: "bridge unit test".to_string(),
                causation_id: None,
            },
            created_at: Utc::now(),
            processed_at: None,
            processing_error: None,
        }
    }

    #[tokio::test]
    async fn only_allow_listed_facts_are_forwarded() {
        let bridge = NotificationBridge::new(&BridgeConfig::default());
        let mut sub = bridge.subscribe();

        bridge.publish(&fact("organization.created"));
        let wanted = fact(tenantry_core::BOOTSTRAP_INITIATED);
        bridge.publish(&wanted);

        let got = tokio::time::timeout(Duration::from_millis(100), sub.recv())
            .await
            .expect("notification should arrive")
            .unwrap();
        assert_eq!(got.fact_id, wanted.id);
        assert_eq!(got.payload, wanted.payload);
        assert_eq!(sub.try_recv(), Ok(None));
    }

    #[tokio::test]
    async fn publishing_without_subscribers_is_harmless() {
        let bridge = NotificationBridge::new(&BridgeConfig::default());
        assert_eq!(bridge.subscriber_count(), 0);
        bridge.publish(&fact(tenantry_core::BOOTSTRAP_INITIATED));
    }

    #[tokio::test]
    async fn lagging_subscriber_is_told_how_much_it_missed() {
        let bridge = NotificationBridge::with_filter(FactFilter::All, 2);
        let mut sub = bridge.subscribe();
        let facts: Vec<Fact> = (0..4).map(|_| fact("organization.updated")).collect();
        for f in &facts {
            bridge.publish(f);
        }

        assert_eq!(sub.recv().await, Err(RecvError::Lagged(2)));
        assert_eq!(sub.recv().await.unwrap().fact_id, facts[2].id);
        assert_eq!(sub.recv().await.unwrap().fact_id, facts[3].id);
    }

    #[tokio::test]
    async fn closed_bridge_ends_subscription() {
        let bridge = NotificationBridge::new(&BridgeConfig::default());
        let mut sub = bridge.subscribe();
        drop(bridge);
        assert_eq!(sub.recv().await, Err(RecvError::Closed));
        assert_eq!(sub.try_recv(), Err(RecvError::Closed));
    }

    #[test]
    fn notification_wire_shape() {
        let n = Notification::from(&fact(tenantry_core::BOOTSTRAP_INITIATED));
        let value = serde_json::to_value(&n).unwrap();
        for key in [
            "fact_id",
            "fact_type",
            "stream_id",
            "stream_type",
            "payload",
            "metadata",
            "created_at",
        ] {
            assert!(value.get(key).is_some(), "missing {}", key);
        }
        assert_eq!(value["stream_type"], "organization");
    }
}
