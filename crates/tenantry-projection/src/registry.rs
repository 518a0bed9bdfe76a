//! Dispatch router keyed by `(stream_type, fact_type)`.

use crate::handler::{Effects, ProjectionHandler};
use rusqlite::Connection;
use std::collections::HashMap;
use tenantry_core::{Fact, Result, StreamType, TenantryError};

type RouteKey = (StreamType, String);

/// Routes each fact to at most one handler.
pub struct HandlerRegistry {
    handlers: HashMap<RouteKey, Box<dyn ProjectionHandler>>,
}

impl HandlerRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Registry with every standard handler installed
    pub fn standard() -> Self {
        let mut registry = Self::new();
        crate::handlers::register_standard(&mut registry);
        registry
    }

    /// Register a handler
    ///
    /// Panics if a handler for the same route is already registered.
    pub fn register(&mut self, handler: Box<dyn ProjectionHandler>) {
        let key = (handler.stream_type(), handler.fact_type().to_string());
        if self.handlers.contains_key(&key) {
            panic!(
                "Handler for {}/{} already registered",
                key.0.as_str(),
                key.1
            );
        }
        self.handlers.insert(key, handler);
    }

    /// Try to register a handler, returning error if already registered
    pub fn try_register(&mut self, handler: Box<dyn ProjectionHandler>) -> Result<()> {
        let key = (handler.stream_type(), handler.fact_type().to_string());
        if self.handlers.contains_key(&key) {
            return Err(TenantryError::Validation(format!(
                "Handler for {}/{} already registered",
                key.0.as_str(),
                key.1
            )));
        }
        self.handlers.insert(key, handler);
        Ok(())
    }

    pub fn get(&self, stream_type: StreamType, fact_type: &str) -> Option<&dyn ProjectionHandler> {
        self.handlers
            .get(&(stream_type, fact_type.to_string()))
            .map(|h| h.as_ref())
    }

    /// Apply `fact` with its registered handler.
    ///
    /// Returns `Ok(None)` when no handler is registered; the fact stays
    /// unprocessed until one is.
    pub fn dispatch(&self, conn: &Connection, fact: &Fact) -> Result<Option<Effects>> {
        match self.get(fact.stream_type, &fact.fact_type) {
            Some(handler) => handler.apply(conn, fact).map(Some),
            None => {
                tracing::debug!(
                    fact_id = %fact.id,
                    stream_type = %fact.stream_type,
                    fact_type = %fact.fact_type,
                    "No handler registered, leaving fact unprocessed"
                );
                Ok(None)
            }
        }
    }

    /// Registered routes, sorted
    pub fn routes(&self) -> Vec<(StreamType, &str)> {
        let mut routes: Vec<_> = self
            .handlers
            .keys()
            .map(|(stream_type, fact_type)| (*stream_type, fact_type.as_str()))
            .collect();
        routes.sort_by(|a, b| (a.0.as_str(), a.1).cmp(&(b.0.as_str(), b.1)));
        routes
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::FnHandler;
    use crate::payloads::{LinkChanged, LinkKind};
    use crate::schema::init_schema;
    use chrono::Utc;
    use serde_json::{json, Value};
    use tenantry_core::FactMetadata;
    use uuid::Uuid;

    fn noop(_conn: &Connection, _fact: &Fact) -> Result<Effects> {
        Ok(Effects::none())
    }

    fn fact(stream_type: StreamType, stream_id: Uuid, fact_type: &str, payload: Value) -> Fact {
        Fact {
            id: Uuid::new_v4(),
            stream_id,
            stream_type,
            stream_version: 1,
            fact_type: fact_type.to_string(),
            payload,
            metadata: FactMetadata {
                actor_id: Uuid::new_v4(),
                organization_id: Uuid::new_v4(),
                correlation_id: Uuid::new_v4(),
                reason: "registry unit test".to_string(),
                causation_id: None,
            },
            created_at: Utc::now(),
            processed_at: None,
            processing_error: None,
        }
    }

    fn db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        conn
    }

    #[test]
    fn standard_registry_covers_catalogue() {
        let registry = HandlerRegistry::standard();
        assert_eq!(registry.len(), 26);
        assert!(registry
            .get(StreamType::Organization, "organization.created")
            .is_some());
        assert!(registry.get(StreamType::Junction, "link.removed").is_some());
        assert!(registry
            .get(StreamType::Contact, "organization.created")
            .is_none());
    }

    #[test]
    #[should_panic(expected = "already registered")]
    fn duplicate_registration_panics() {
        let mut registry = HandlerRegistry::new();
        registry.register(Box::new(FnHandler::new(StreamType::Contact, "contact.noted", noop)));
        registry.register(Box::new(FnHandler::new(StreamType::Contact, "contact.noted", noop)));
    }

    #[test]
    fn try_register_rejects_duplicates() {
        let mut registry = HandlerRegistry::new();
        registry
            .try_register(Box::new(FnHandler::new(StreamType::Contact, "contact.noted", noop)))
            .unwrap();
        let err = registry
            .try_register(Box::new(FnHandler::new(StreamType::Contact, "contact.noted", noop)))
            .unwrap_err();
        assert!(matches!(err, TenantryError::Validation(_)));
    }

    #[test]
    fn unknown_route_dispatches_to_nothing() {
        let conn = db();
        let registry = HandlerRegistry::standard();
        let f = fact(StreamType::Organization, Uuid::new_v4(), "organization.renamed", json!({}));
        assert!(registry.dispatch(&conn, &f).unwrap().is_none());
    }

    #[test]
    fn creation_is_idempotent() {
        let conn = db();
        let registry = HandlerRegistry::standard();
        let org_id = Uuid::new_v4();
        let payload = json!({
            "name": "Acme Health",
            "org_type": "provider",
            "subdomain": "acme",
        });
        let f = fact(StreamType::Organization, org_id, "organization.created", payload);

        registry.dispatch(&conn, &f).unwrap();
        registry.dispatch(&conn, &f).unwrap();

        let (count, status): (i64, String) = conn
            .query_row(
                "SELECT COUNT(*), MAX(subdomain_status) FROM organizations WHERE id = ?1",
                [org_id.to_string()],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .unwrap();
        assert_eq!(count, 1);
        assert_eq!(status, "pending");
    }

    #[test]
    fn update_of_missing_row_fails() {
        let conn = db();
        let registry = HandlerRegistry::standard();
        let f = fact(
            StreamType::Contact,
            Uuid::new_v4(),
            "contact.updated",
            json!({"first_name": "Ada"}),
        );
        let err = registry.dispatch(&conn, &f).unwrap_err();
        assert!(matches!(err, TenantryError::HandlerFailure(_)));
    }

    #[test]
    fn user_phones_are_routed_by_owner() {
        let conn = db();
        let registry = HandlerRegistry::standard();
        let user_phone = fact(
            StreamType::Phone,
            Uuid::new_v4(),
            "phone.created",
            json!({"user_id": Uuid::new_v4(), "number": "+15550100"}),
        );
        let org_phone = fact(
            StreamType::Phone,
            Uuid::new_v4(),
            "phone.created",
            json!({"organization_id": Uuid::new_v4(), "number": "+15550101"}),
        );
        registry.dispatch(&conn, &user_phone).unwrap();
        registry.dispatch(&conn, &org_phone).unwrap();

        let count = |table: &str| -> i64 {
            conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| row.get(0))
                .unwrap()
        };
        assert_eq!(count("user_phones"), 1);
        assert_eq!(count("phones"), 1);
    }

    #[test]
    fn organization_deletion_cascades_to_children() {
        let conn = db();
        let registry = HandlerRegistry::standard();
        let org_id = Uuid::new_v4();
        let contact_id = Uuid::new_v4();

        let created = json!({"name": "Platform", "org_type": "platform_owner"});
        registry
            .dispatch(&conn, &fact(StreamType::Organization, org_id, "organization.created", created))
            .unwrap();
        registry
            .dispatch(
                &conn,
                &fact(
                    StreamType::Contact,
                    contact_id,
                    "contact.created",
                    json!({
                        "organization_id": org_id,
                        "first_name": "Ada",
                        "last_name": "Lovelace",
                        "email": "ada@example.com",
                    }),
                ),
            )
            .unwrap();

        let effects = registry
            .dispatch(&conn, &fact(StreamType::Organization, org_id, "organization.deleted", json!({})))
            .unwrap()
            .unwrap();
        assert_eq!(effects.follow_ups.len(), 1);
        assert_eq!(effects.follow_ups[0].fact_type, "contact.deleted");
        assert_eq!(effects.follow_ups[0].stream_id, contact_id);
    }

    #[test]
    fn contact_deletion_removes_links() {
        let conn = db();
        let registry = HandlerRegistry::standard();
        let (org_id, contact_id) = (Uuid::new_v4(), Uuid::new_v4());
        registry
            .dispatch(
                &conn,
                &fact(
                    StreamType::Contact,
                    contact_id,
                    "contact.created",
                    json!({"first_name": "Ada", "last_name": "L", "email": "ada@example.com"}),
                ),
            )
            .unwrap();

        let link = LinkChanged {
            kind: LinkKind::OrganizationContact,
            left_id: org_id,
            right_id: contact_id,
        };
        let link_stream = link.kind.stream_id(org_id, contact_id);
        registry
            .dispatch(&conn, &fact(StreamType::Junction, link_stream, "link.created", json!(link)))
            .unwrap();

        let effects = registry
            .dispatch(&conn, &fact(StreamType::Contact, contact_id, "contact.deleted", json!({})))
            .unwrap()
            .unwrap();
        assert_eq!(effects.follow_ups.len(), 1);
        let removal = &effects.follow_ups[0];
        assert_eq!(removal.fact_type, "link.removed");
        assert_eq!(removal.stream_id, link_stream);

        let mut removed = fact(StreamType::Junction, link_stream, "link.removed", removal.payload.clone());
        removed.stream_version = 2;
        registry.dispatch(&conn, &removed).unwrap();
        registry.dispatch(&conn, &removed).unwrap();
        let remaining: i64 = conn
            .query_row("SELECT COUNT(*) FROM organization_contacts", [], |row| row.get(0))
            .unwrap();
        assert_eq!(remaining, 0);
    }

    #[test]
    fn link_on_wrong_stream_is_rejected() {
        let conn = db();
        let registry = HandlerRegistry::standard();
        let link = LinkChanged {
            kind: LinkKind::ContactPhone,
            left_id: Uuid::new_v4(),
            right_id: Uuid::new_v4(),
        };
        let f = fact(StreamType::Junction, Uuid::new_v4(), "link.created", json!(link));
        assert!(matches!(
            registry.dispatch(&conn, &f),
            Err(TenantryError::HandlerFailure(_))
        ));
    }

    #[test]
    fn verified_subdomain_survives_replayed_dns_fact() {
        let conn = db();
        let registry = HandlerRegistry::standard();
        let org_id = Uuid::new_v4();
        registry
            .dispatch(
                &conn,
                &fact(
                    StreamType::Organization,
                    org_id,
                    "organization.created",
                    json!({"name": "Acme", "org_type": "provider", "subdomain": "acme"}),
                ),
            )
            .unwrap();
        let dns = fact(
            StreamType::Organization,
            org_id,
            "organization.subdomain.dns_created",
            json!({"fqdn": "acme.tenants.local", "target": "ingress", "record_id": "rec-1"}),
        );
        registry.dispatch(&conn, &dns).unwrap();
        registry
            .dispatch(
                &conn,
                &fact(
                    StreamType::Organization,
                    org_id,
                    "organization.subdomain.verified",
                    json!({"fqdn": "acme.tenants.local", "agreeing": 2, "total": 3, "attempt": 1}),
                ),
            )
            .unwrap();
        registry.dispatch(&conn, &dns).unwrap();

        let status: String = conn
            .query_row(
                "SELECT subdomain_status FROM organizations WHERE id = ?1",
                [org_id.to_string()],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(status, "verified");
    }
}
