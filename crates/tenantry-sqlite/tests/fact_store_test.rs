//! Append, dispatch, retry and replay against an on-disk store

use parking_lot::Mutex;
use rusqlite::Connection;
use serde_json::json;
use std::sync::Arc;
use tempfile::TempDir;
use tenantry_core::{
    ActorContext, AllowAll, Fact, FactDraft, FactPublisher, NewFact, PermissionPolicy, StoreConfig,
    StreamType, TenantryError,
};
use tenantry_projection::handler::{Effects, FnHandler};
use tenantry_projection::payloads::{LinkChanged, LinkKind};
use tenantry_projection::queries;
use tenantry_projection::HandlerRegistry;
use tenantry_sqlite::{FailedFactFilter, OperatorSurface, SqliteFactStore};
use uuid::Uuid;

fn create_store(registry: HandlerRegistry) -> (SqliteFactStore, TempDir) {
    let temp_dir = tempfile::tempdir().unwrap();
    let config = StoreConfig::new(temp_dir.path().join("facts.db"));
    let store = SqliteFactStore::open(config, registry).unwrap();
    (store, temp_dir)
}

fn actor() -> ActorContext {
    ActorContext::new(Uuid::new_v4(), Uuid::new_v4())
}

fn org_created(org_id: Uuid, version: i64) -> NewFact {
    NewFact {
        stream_id: org_id,
        stream_type: StreamType::Organization,
        stream_version: version,
        fact_type: "organization.created".into(),
        payload: json!({"name": "Acme Health", "org_type": "provider", "subdomain": "acme"}),
        reason: "Provisioning a new provider tenant".into(),
    }
}

fn draft(stream_type: StreamType, stream_id: Uuid, fact_type: &str, payload: serde_json::Value) -> FactDraft {
    FactDraft::new(
        stream_type,
        stream_id,
        fact_type,
        payload,
        "Integration test fixture data",
    )
}

fn count(store: &SqliteFactStore, sql: &str) -> i64 {
    store
        .read(|conn| Ok(conn.query_row(sql, [], |row| row.get(0)).unwrap()))
        .unwrap()
}

#[test]
fn creation_fact_projects_live_row() {
    let (store, _dir) = create_store(HandlerRegistry::standard());
    let org_id = Uuid::new_v4();

    let fact_id = store.append(&actor(), org_created(org_id, 1)).unwrap();

    let fact = store.get(fact_id).unwrap().unwrap();
    assert!(fact.is_processed());
    let row = store
        .read(|conn| queries::get_organization(conn, org_id))
        .unwrap()
        .unwrap();
    assert!(row.deleted_at.is_none());
    assert_eq!(row.subdomain.as_deref(), Some("acme"));
}

#[test]
fn duplicate_delivery_leaves_one_row() {
    let (store, _dir) = create_store(HandlerRegistry::standard());
    let org_id = Uuid::new_v4();
    let ctx = actor();

    let fact_id = store.append(&ctx, org_created(org_id, 1)).unwrap();
    let err = store.append(&ctx, org_created(org_id, 1)).unwrap_err();
    assert!(matches!(
        err,
        TenantryError::ConcurrentModification { expected: 1, actual: 1, .. }
    ));
    assert!(err.is_retryable());

    store.retry(fact_id).unwrap();
    store.retry(fact_id).unwrap();

    assert_eq!(count(&store, "SELECT COUNT(*) FROM organizations"), 1);
    assert_eq!(count(&store, "SELECT COUNT(*) FROM facts"), 1);
}

#[test]
fn versions_follow_append_order() {
    let (store, _dir) = create_store(HandlerRegistry::standard());
    let org_id = Uuid::new_v4();
    let ctx = actor();

    store.append(&ctx, org_created(org_id, 1)).unwrap();
    assert!(matches!(
        store.append(&ctx, org_created(org_id, 3)),
        Err(TenantryError::ConcurrentModification { actual: 1, .. })
    ));

    for name in ["Acme One", "Acme Two"] {
        store
            .append_next(
                &ctx,
                draft(StreamType::Organization, org_id, "organization.updated", json!({"name": name})),
            )
            .unwrap();
    }

    let versions: Vec<i64> = store
        .stream(org_id)
        .unwrap()
        .iter()
        .map(|f| f.stream_version)
        .collect();
    assert_eq!(versions, vec![1, 2, 3]);
    assert_eq!(store.last_version(org_id).unwrap(), 3);
    assert_eq!(store.last_version(Uuid::new_v4()).unwrap(), 0);
}

#[test]
fn invalid_input_is_rejected_before_append() {
    let (store, _dir) = create_store(HandlerRegistry::standard());
    let org_id = Uuid::new_v4();

    let short_reason = NewFact {
        reason: "too short".into(),
        ..org_created(org_id, 1)
    };
    assert!(matches!(
        store.append(&actor(), short_reason),
        Err(TenantryError::Validation(_))
    ));

    let wrong_namespace = NewFact {
        fact_type: "contact.created".into(),
        ..org_created(org_id, 1)
    };
    assert!(matches!(
        store.append(&actor(), wrong_namespace),
        Err(TenantryError::Validation(_))
    ));
    assert_eq!(store.last_version(org_id).unwrap(), 0);
}

#[test]
fn handler_failure_is_recorded_not_raised() {
    let (store, _dir) = create_store(HandlerRegistry::standard());
    let contact_id = Uuid::new_v4();

    let fact = store
        .append_next(
            &actor(),
            draft(StreamType::Contact, contact_id, "contact.updated", json!({"email": "a@b.c"})),
        )
        .unwrap();

    assert!(fact.is_failed());
    assert!(fact.processed_at.is_none());
    assert!(fact.processing_error.unwrap().contains("not found"));
}

#[test]
fn unknown_fact_type_stays_unprocessed() {
    let (store, _dir) = create_store(HandlerRegistry::standard());
    let fact = store
        .append_next(
            &actor(),
            draft(
                StreamType::Organization,
                Uuid::new_v4(),
                "organization.renamed_in_future",
                json!({}),
            ),
        )
        .unwrap();
    assert!(fact.processed_at.is_none());
    assert!(fact.processing_error.is_none());
}

#[test]
fn retry_after_fix_clears_failure() {
    let (store, _dir) = create_store(HandlerRegistry::standard());
    let ctx = actor();
    let contact_id = Uuid::new_v4();

    let failed = store
        .append_next(
            &ctx,
            draft(StreamType::Contact, contact_id, "contact.updated", json!({"title": "CTO"})),
        )
        .unwrap();
    assert!(failed.is_failed());

    // The update arrived before its creation; replaying it after succeeds.
    store
        .append_next(
            &ctx,
            draft(
                StreamType::Contact,
                contact_id,
                "contact.created",
                json!({"first_name": "Ada", "last_name": "Lovelace", "email": "ada@example.com"}),
            ),
        )
        .unwrap();

    let retried = store.retry(failed.id).unwrap();
    assert!(retried.is_processed());
    let title: Option<String> = store
        .read(|conn| {
            Ok(conn
                .query_row("SELECT title FROM contacts WHERE id = ?1", [contact_id.to_string()], |row| {
                    row.get(0)
                })
                .unwrap())
        })
        .unwrap();
    assert_eq!(title.as_deref(), Some("CTO"));

    assert!(matches!(
        store.retry(Uuid::new_v4()),
        Err(TenantryError::NotFound(_))
    ));
}

#[test]
fn organization_deletion_cascades_through_facts() {
    let (store, _dir) = create_store(HandlerRegistry::standard());
    let ctx = actor();
    let org_id = Uuid::new_v4();
    let contact_id = Uuid::new_v4();

    store.append(&ctx, org_created(org_id, 1)).unwrap();
    store
        .append_next(
            &ctx,
            draft(
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
    let link = LinkChanged {
        kind: LinkKind::OrganizationContact,
        left_id: org_id,
        right_id: contact_id,
    };
    let link_stream = link.kind.stream_id(org_id, contact_id);
    store
        .append_next(&ctx, draft(StreamType::Junction, link_stream, "link.created", json!(link)))
        .unwrap();

    let deleted = store
        .append_next(
            &ctx,
            draft(StreamType::Organization, org_id, "organization.deleted", json!({})),
        )
        .unwrap();
    assert!(deleted.is_processed());

    let contact_stream = store.stream(contact_id).unwrap();
    let contact_deleted = contact_stream.last().unwrap();
    assert_eq!(contact_deleted.fact_type, "contact.deleted");
    assert_eq!(contact_deleted.metadata.causation_id, Some(deleted.id));
    assert_eq!(contact_deleted.metadata.correlation_id, ctx.correlation_id);

    let link_stream_facts = store.stream(link_stream).unwrap();
    assert_eq!(link_stream_facts.len(), 2);
    assert_eq!(link_stream_facts[1].fact_type, "link.removed");

    assert_eq!(
        count(&store, "SELECT COUNT(*) FROM contacts WHERE deleted_at IS NULL"),
        0
    );
    assert_eq!(count(&store, "SELECT COUNT(*) FROM organization_contacts"), 0);
}

fn snapshot(conn: &Connection) -> Vec<String> {
    let mut rows = Vec::new();
    for table in ["organizations", "contacts", "organization_contacts", "invitations"] {
        let mut stmt = conn
            .prepare(&format!("SELECT * FROM {} ORDER BY 1", table))
            .unwrap();
        let columns = stmt.column_count();
        let mut query = stmt.query([]).unwrap();
        while let Some(row) = query.next().unwrap() {
            let values: Vec<String> = (0..columns)
                .map(|i| format!("{:?}", row.get_ref(i).unwrap()))
                .collect();
            rows.push(format!("{}:{}", table, values.join("|")));
        }
    }
    rows
}

#[test]
fn replay_rebuilds_identical_projection() {
    let (store, _dir) = create_store(HandlerRegistry::standard());
    let ctx = actor();
    let org_id = Uuid::new_v4();
    let contact_id = Uuid::new_v4();

    store.append(&ctx, org_created(org_id, 1)).unwrap();
    store
        .append_next(
            &ctx,
            draft(
                StreamType::Contact,
                contact_id,
                "contact.created",
                json!({"organization_id": org_id, "first_name": "Ada", "last_name": "L", "email": "a@x.io"}),
            ),
        )
        .unwrap();
    store
        .append_next(
            &ctx,
            draft(StreamType::Organization, org_id, "organization.activated", json!({})),
        )
        .unwrap();
    store
        .append_next(
            &ctx,
            draft(StreamType::Organization, org_id, "organization.deleted", json!({})),
        )
        .unwrap();

    let before = store.read(|conn| Ok(snapshot(conn))).unwrap();
    let facts_before = count(&store, "SELECT COUNT(*) FROM facts");

    let report = store.rebuild_projections().unwrap();
    assert_eq!(report.replayed as i64, facts_before);
    assert_eq!(report.failed, 0);

    let after = store.read(|conn| Ok(snapshot(conn))).unwrap();
    assert_eq!(before, after);
    assert_eq!(count(&store, "SELECT COUNT(*) FROM facts"), facts_before);
}

#[test]
fn handler_errors_roll_back_partial_writes() {
    fn half_then_fail(conn: &Connection, fact: &Fact) -> tenantry_core::Result<Effects> {
        conn.execute(
            "INSERT INTO organization_bootstrap (organization_id, status, correlation_id, updated_at)
             VALUES (?1, 'initiated', 'x', 'now')",
            [fact.stream_id.to_string()],
        )
        .unwrap();
        Err(TenantryError::HandlerFailure("second write failed".into()))
    }

    let mut registry = HandlerRegistry::new();
    registry.register(Box::new(FnHandler::new(
        StreamType::Organization,
        "organization.bootstrap.initiated",
        half_then_fail,
    )));
    let (store, _dir) = create_store(registry);

    let fact = store
        .append_next(
            &actor(),
            draft(
                StreamType::Organization,
                Uuid::new_v4(),
                "organization.bootstrap.initiated",
                json!({}),
            ),
        )
        .unwrap();
    assert!(fact.is_failed());
    assert_eq!(count(&store, "SELECT COUNT(*) FROM organization_bootstrap"), 0);
}

#[test]
fn runaway_cascade_is_cut_off() {
    fn echo(_conn: &Connection, fact: &Fact) -> tenantry_core::Result<Effects> {
        Ok(Effects::none().follow_up(FactDraft::new(
            StreamType::Contact,
            fact.stream_id,
            "contact.echoed",
            json!({}),
            "Echo handler follow-up",
        )))
    }

    let mut registry = HandlerRegistry::new();
    registry.register(Box::new(FnHandler::new(StreamType::Contact, "contact.echoed", echo)));
    let temp_dir = tempfile::tempdir().unwrap();
    let config = StoreConfig::new(temp_dir.path().join("facts.db")).with_max_cascade_depth(3);
    let store = SqliteFactStore::open(config, registry).unwrap();

    let stream_id = Uuid::new_v4();
    store
        .append_next(
            &actor(),
            draft(StreamType::Contact, stream_id, "contact.echoed", json!({})),
        )
        .unwrap();

    let facts = store.stream(stream_id).unwrap();
    assert_eq!(facts.len(), 4);
    assert!(facts[..3].iter().all(|f| f.is_processed()));
    assert!(facts[3].is_failed());
}

struct Recorder(Mutex<Vec<String>>);

impl FactPublisher for Recorder {
    fn publish(&self, fact: &Fact) {
        self.0.lock().push(fact.fact_type.clone());
    }
}

#[test]
fn committed_facts_are_published() {
    let recorder = Arc::new(Recorder(Mutex::new(Vec::new())));
    let (store, _dir) = create_store(HandlerRegistry::standard());
    let store = store.with_publisher(recorder.clone());

    let org_id = Uuid::new_v4();
    store.append(&actor(), org_created(org_id, 1)).unwrap();
    let _ = store.append(&actor(), org_created(org_id, 1));

    assert_eq!(*recorder.0.lock(), vec!["organization.created".to_string()]);
}

#[test]
fn operator_surface_requires_permission() {
    let (store, _dir) = create_store(HandlerRegistry::standard());
    let store = Arc::new(store);
    let ctx = actor();
    store
        .append_next(
            &ctx,
            draft(StreamType::Contact, Uuid::new_v4(), "contact.deleted", json!({})),
        )
        .unwrap();
    store
        .append_next(
            &ctx,
            draft(StreamType::Phone, Uuid::new_v4(), "phone.updated", json!({"label": "work"})),
        )
        .unwrap();

    let surface = OperatorSurface::new(store.clone(), Arc::new(PermissionPolicy::default()));
    assert!(matches!(
        surface.failure_stats(&ctx),
        Err(TenantryError::Unauthorized(_))
    ));

    let admin = ctx.clone().with_permission(PermissionPolicy::PLATFORM_ADMIN);
    let stats = surface.failure_stats(&admin).unwrap();
    assert_eq!(stats.total, 2);
    assert_eq!(stats.last_24h, 2);
    assert_eq!(stats.by_stream_type.get("phone"), Some(&1));
    assert_eq!(stats.recent.len(), 2);

    let phones = surface
        .list_failed(&admin, &FailedFactFilter::default().with_stream_type(StreamType::Phone))
        .unwrap();
    assert_eq!(phones.len(), 1);
    assert_eq!(phones[0].fact_type, "phone.updated");

    let open = OperatorSurface::new(store, Arc::new(AllowAll));
    let retried = open.retry(&ctx, phones[0].id).unwrap();
    assert!(retried.is_failed());
}
