//! In-memory DNS and email capabilities.
//!
//! Deterministic and scriptable, for tests and single-process development.
//! Nothing is persisted.

use crate::capability::{DeliveryId, DnsProvider, EmailSender, RecordId};
use crate::error::{Result, SagaError};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{HashMap, HashSet};

/// How one resolver answers queries
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolverBehavior {
    /// Answers with the created record once it has propagated
    Propagated,
    /// Never sees the record
    Absent,
    /// Answers with an outdated target
    Stale(String),
    /// Never answers; the verifier's timeout fires
    Hang,
    /// Fails the query outright
    Fail(String),
}

#[derive(Debug, Default)]
struct DnsState {
    records: HashMap<String, (RecordId, String)>,
    resolvers: HashMap<String, ResolverBehavior>,
    visible_after_creates: u32,
    create_calls: u32,
    query_calls: u32,
    delete_calls: u32,
    failing_creates: u32,
}

/// Scriptable DNS provider
#[derive(Debug, Default)]
pub struct InMemoryDns {
    state: Mutex<DnsState>,
}

impl InMemoryDns {
    /// Records propagate immediately to every resolver
    pub fn new() -> Self {
        Self::default()
    }

    /// Every resolver answers absent, so verification never succeeds
    pub fn never_propagating() -> Self {
        let dns = Self::new();
        dns.state.lock().visible_after_creates = u32::MAX;
        dns
    }

    /// Records become visible once `create_record` has been called `n` times
    pub fn visible_after_creates(self, n: u32) -> Self {
        self.state.lock().visible_after_creates = n;
        self
    }

    /// Override how one resolver behaves
    pub fn set_resolver(&self, resolver: impl Into<String>, behavior: ResolverBehavior) {
        self.state.lock().resolvers.insert(resolver.into(), behavior);
    }

    /// Fail the next `n` record creations
    pub fn fail_next_creates(&self, n: u32) {
        self.state.lock().failing_creates = n;
    }

    /// Pre-existing record, as if created by an earlier run
    pub fn insert_record(&self, name: &str, target: &str, record_id: &str) {
        self.state
            .lock()
            .records
            .insert(normalize(name), (record_id.to_string(), target.to_string()));
    }

    pub fn record(&self, name: &str) -> Option<(RecordId, String)> {
        self.state.lock().records.get(&normalize(name)).cloned()
    }

    pub fn create_calls(&self) -> u32 {
        self.state.lock().create_calls
    }

    pub fn query_calls(&self) -> u32 {
        self.state.lock().query_calls
    }

    pub fn delete_calls(&self) -> u32 {
        self.state.lock().delete_calls
    }
}

fn normalize(name: &str) -> String {
    name.trim_end_matches('.').to_ascii_lowercase()
}

#[async_trait]
impl DnsProvider for InMemoryDns {
    async fn create_record(&self, name: &str, target: &str) -> Result<RecordId> {
        let mut state = self.state.lock();
        state.create_calls += 1;
        if state.failing_creates > 0 {
            state.failing_creates -= 1;
            return Err(SagaError::Provider(format!("record creation for {} rejected", name)));
        }

        let key = normalize(name);
        if let Some((record_id, existing)) = state.records.get(&key) {
            if existing == target {
                return Ok(record_id.clone());
            }
        }
        let record_id = format!("rec-{}", uuid::Uuid::new_v4().simple());
        state
            .records
            .insert(key, (record_id.clone(), target.to_string()));
        Ok(record_id)
    }

    async fn query(&self, resolver: &str, name: &str) -> Result<Option<String>> {
        let behavior = {
            let mut state = self.state.lock();
            state.query_calls += 1;
            let behavior = state
                .resolvers
                .get(resolver)
                .cloned()
                .unwrap_or(ResolverBehavior::Propagated);
            if behavior == ResolverBehavior::Propagated {
                if state.create_calls < state.visible_after_creates {
                    return Ok(None);
                }
                return Ok(state.records.get(&normalize(name)).map(|(_, t)| t.clone()));
            }
            behavior
        };

        match behavior {
            ResolverBehavior::Absent => Ok(None),
            ResolverBehavior::Stale(target) => Ok(Some(target)),
            ResolverBehavior::Hang => {
                futures::future::pending::<()>().await;
                Ok(None)
            }
            ResolverBehavior::Fail(message) => Err(SagaError::Provider(message)),
            ResolverBehavior::Propagated => Ok(None),
        }
    }

    async fn delete_record(&self, name: &str, record_id: &str) -> Result<()> {
        let mut state = self.state.lock();
        state.delete_calls += 1;
        let key = normalize(name);
        if matches!(state.records.get(&key), Some((id, _)) if id == record_id) {
            state.records.remove(&key);
        }
        Ok(())
    }
}

/// A message accepted by [`InMemoryEmail`]
#[derive(Debug, Clone, PartialEq)]
pub struct SentEmail {
    pub to: String,
    pub template: String,
    pub data: Value,
    pub delivery_id: DeliveryId,
}

/// Email sender that records instead of delivering
#[derive(Debug, Default)]
pub struct InMemoryEmail {
    sent: Mutex<Vec<SentEmail>>,
    failing: Mutex<HashSet<String>>,
}

impl InMemoryEmail {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject every message to `address`
    pub fn fail_for(&self, address: impl Into<String>) {
        self.failing.lock().insert(address.into());
    }

    pub fn sent(&self) -> Vec<SentEmail> {
        self.sent.lock().clone()
    }
}

#[async_trait]
impl EmailSender for InMemoryEmail {
    async fn send(&self, to: &str, template: &str, data: &Value) -> Result<DeliveryId> {
        if self.failing.lock().contains(to) {
            return Err(SagaError::Provider(format!("mailbox {} unavailable", to)));
        }
        let delivery_id = format!("msg-{}", uuid::Uuid::new_v4().simple());
        self.sent.lock().push(SentEmail {
            to: to.to_string(),
            template: template.to_string(),
            data: data.clone(),
            delivery_id: delivery_id.clone(),
        });
        Ok(delivery_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_is_idempotent_for_same_target() {
        let dns = InMemoryDns::new();
        let first = dns.create_record("acme.tenants.local", "ingress").await.unwrap();
        let second = dns.create_record("ACME.tenants.local.", "ingress").await.unwrap();
        assert_eq!(first, second);
        assert_eq!(dns.create_calls(), 2);
    }

    #[tokio::test]
    async fn propagation_can_be_delayed() {
        let dns = InMemoryDns::new().visible_after_creates(2);
        dns.create_record("acme.tenants.local", "ingress").await.unwrap();
        assert_eq!(dns.query("1.1.1.1", "acme.tenants.local").await.unwrap(), None);
        dns.create_record("acme.tenants.local", "ingress").await.unwrap();
        assert_eq!(
            dns.query("1.1.1.1", "acme.tenants.local").await.unwrap(),
            Some("ingress".to_string())
        );
    }

    #[tokio::test]
    async fn delete_removes_only_the_matching_record() {
        let dns = InMemoryDns::new();
        let id = dns.create_record("acme.tenants.local", "ingress").await.unwrap();
        dns.delete_record("acme.tenants.local", "rec-other").await.unwrap();
        assert!(dns.record("acme.tenants.local").is_some());

        dns.delete_record("acme.tenants.local", &id).await.unwrap();
        dns.delete_record("acme.tenants.local", &id).await.unwrap();
        assert!(dns.record("acme.tenants.local").is_none());
        assert_eq!(dns.delete_calls(), 3);
    }

    #[tokio::test]
    async fn email_failures_are_per_address() {
        let email = InMemoryEmail::new();
        email.fail_for("bounce@example.com");
        assert!(email
            .send("bounce@example.com", "invite", &Value::Null)
            .await
            .is_err());
        email.send("ok@example.com", "invite", &Value::Null).await.unwrap();
        assert_eq!(email.sent().len(), 1);
    }
}
