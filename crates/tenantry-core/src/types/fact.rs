use crate::types::{context::ActorContext, stream::StreamType};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Fact identifier
pub type FactId = Uuid;

/// Aggregate instance identifier
pub type StreamId = Uuid;

/// Metadata stored alongside every fact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactMetadata {
    pub actor_id: Uuid,
    pub organization_id: Uuid,
    pub correlation_id: Uuid,

    /// Why the change happened (at least 10 characters)
    pub reason: String,

    /// Fact that caused this one, set on cascade follow-ups
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub causation_id: Option<FactId>,
}

impl FactMetadata {
    pub fn from_context(ctx: &ActorContext, reason: impl Into<String>) -> Self {
        Self {
            actor_id: ctx.actor_id,
            organization_id: ctx.organization_id,
            correlation_id: ctx.correlation_id,
            reason: reason.into(),
            causation_id: None,
        }
    }
}

/// An appended fact, exactly as stored in the log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fact {
    pub id: FactId,
    pub stream_id: StreamId,
    pub stream_type: StreamType,
    pub stream_version: i64,
    pub fact_type: String,
    pub payload: Value,
    pub metadata: FactMetadata,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
    pub processing_error: Option<String>,
}

impl Fact {
    pub fn is_processed(&self) -> bool {
        self.processed_at.is_some() && self.processing_error.is_none()
    }

    pub fn is_failed(&self) -> bool {
        self.processing_error.is_some()
    }

    /// Deserialize the payload into a typed struct.
    pub fn payload_as<T: serde::de::DeserializeOwned>(&self) -> crate::Result<T> {
        serde_json::from_value(self.payload.clone()).map_err(|e| {
            crate::TenantryError::Serialization(format!(
                "{} payload for fact {}: {}",
                self.fact_type, self.id, e
            ))
        })
    }
}

/// A fact to append at an explicit version
#[derive(Debug, Clone, PartialEq)]
pub struct NewFact {
    pub stream_id: StreamId,
    pub stream_type: StreamType,
    /// Must equal the stream's last version + 1
    pub stream_version: i64,
    pub fact_type: String,
    pub payload: Value,
    pub reason: String,
}

/// A fact whose version is resolved by the store at append time
#[derive(Debug, Clone, PartialEq)]
pub struct FactDraft {
    pub stream_id: StreamId,
    pub stream_type: StreamType,
    pub fact_type: String,
    pub payload: Value,
    pub reason: String,
}

impl FactDraft {
    pub fn new(
        stream_type: StreamType,
        stream_id: StreamId,
        fact_type: impl Into<String>,
        payload: Value,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            stream_id,
            stream_type,
            fact_type: fact_type.into(),
            payload,
            reason: reason.into(),
        }
    }

    pub fn at_version(self, stream_version: i64) -> NewFact {
        NewFact {
            stream_id: self.stream_id,
            stream_type: self.stream_type,
            stream_version,
            fact_type: self.fact_type,
            payload: self.payload,
            reason: self.reason,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn fact_wire_shape() {
        let ctx = ActorContext::new(Uuid::new_v4(), Uuid::new_v4());
        let fact = Fact {
            id: Uuid::new_v4(),
            stream_id: Uuid::new_v4(),
            stream_type: StreamType::Organization,
            stream_version: 1,
            fact_type: "organization.created".into(),
            payload: json!({"name": "Acme"}),
            metadata: FactMetadata::from_context(&ctx, "Provisioning a new tenant"),
            created_at: Utc::now(),
            processed_at: None,
            processing_error: None,
        };

        let value = serde_json::to_value(&fact).unwrap();
        assert_eq!(value["stream_type"], "organization");
        assert_eq!(value["stream_version"], 1);
        assert_eq!(value["metadata"]["reason"], "Provisioning a new tenant");
        assert!(value["metadata"].get("causation_id").is_none());
        assert!(value["processed_at"].is_null());
    }

    #[test]
    fn draft_carries_fields_into_new_fact() {
        let stream_id = Uuid::new_v4();
        let draft = FactDraft::new(
            StreamType::Contact,
            stream_id,
            "contact.created",
            json!({}),
            "Contact added during bootstrap",
        );
        let new = draft.at_version(3);
        assert_eq!(new.stream_id, stream_id);
        assert_eq!(new.stream_version, 3);
        assert_eq!(new.fact_type, "contact.created");
    }
}
