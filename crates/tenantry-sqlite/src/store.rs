use chrono::Utc;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OpenFlags, OptionalExtension, TransactionBehavior};
use std::sync::Arc;
use std::time::Instant;
use tenantry_core::observe;
use tenantry_core::validation::{validate_fact_type, validate_reason, validate_version};
use tenantry_core::{
    ActorContext, Fact, FactDraft, FactId, FactMetadata, FactPublisher, NewFact, Result, StoreConfig,
    StreamId, TenantryError,
};
use tenantry_projection::{format_ts, schema as projection_schema, HandlerRegistry};

use crate::row::{collect_facts, RawFact, FACT_COLUMNS};
use crate::schema;
use crate::storage;

/// Outcome of a full projection rebuild
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RebuildReport {
    pub replayed: usize,
    pub failed: usize,
    pub unhandled: usize,
}

/// How a single dispatch ended
enum Dispatched {
    Processed,
    Unhandled,
}

/// SQLite fact log with synchronous projection dispatch
///
/// Every append runs in one `IMMEDIATE` transaction: the version check, the
/// insert, the handler and any cascaded follow-up facts commit together.
/// Handler errors are rolled back to a savepoint and written to
/// `processing_error`; the fact itself still commits.
pub struct SqliteFactStore {
    conn: Arc<Mutex<Connection>>,
    registry: Arc<HandlerRegistry>,
    publisher: Option<Arc<dyn FactPublisher>>,
    config: StoreConfig,
}

impl SqliteFactStore {
    /// Open (or create) the database at `config.path`
    pub fn open(config: StoreConfig, registry: HandlerRegistry) -> Result<Self> {
        config.validate()?;

        if let Some(parent) = config.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open_with_flags(
            &config.path,
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE,
        )
        .map_err(storage)?;

        Self::configure_connection(&conn, &config)?;
        schema::init_schema(&conn)?;

        tracing::info!(path = %config.path.display(), "Opened fact store");

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            registry: Arc::new(registry),
            publisher: None,
            config,
        })
    }

    /// In-memory store, for tests and tooling
    pub fn open_in_memory(registry: HandlerRegistry) -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(storage)?;
        schema::init_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            registry: Arc::new(registry),
            publisher: None,
            config: StoreConfig::new(":memory:".into()),
        })
    }

    /// Forward committed facts to `publisher`
    pub fn with_publisher(mut self, publisher: Arc<dyn FactPublisher>) -> Self {
        self.publisher = Some(publisher);
        self
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    fn configure_connection(conn: &Connection, cfg: &StoreConfig) -> Result<()> {
        if cfg.wal_mode {
            conn.pragma_update(None, "journal_mode", "WAL")
                .map_err(|e| TenantryError::Config(e.to_string()))?;
        }
        conn.pragma_update(None, "synchronous", cfg.synchronous.as_pragma())
            .map_err(|e| TenantryError::Config(e.to_string()))?;
        conn.busy_timeout(cfg.busy_timeout())
            .map_err(|e| TenantryError::Config(e.to_string()))?;
        Ok(())
    }

    /// Append a fact at an explicit version and dispatch it.
    ///
    /// Fails with `ConcurrentModification` unless `fact.stream_version` is
    /// exactly one past the stream's last version. Handler failures do not
    /// fail the append.
    pub fn append(&self, ctx: &ActorContext, fact: NewFact) -> Result<FactId> {
        self.validate_new(&fact)?;
        let metadata = FactMetadata::from_context(ctx, fact.reason.clone());
        let appended = self.write(|conn, appended| {
            let actual = last_version_in(conn, fact.stream_id)?;
            if fact.stream_version != actual + 1 {
                return Err(TenantryError::ConcurrentModification {
                    stream_id: fact.stream_id,
                    expected: fact.stream_version,
                    actual,
                });
            }
            let root = insert_fact(conn, &fact, metadata)?;
            appended.push(root.clone());
            self.dispatch(conn, &root, 0, appended)?;
            Ok(())
        })?;
        Ok(appended[0].id)
    }

    /// Append at the stream's next version, resolved inside the transaction.
    ///
    /// Returns the fact as it stands after dispatch.
    pub fn append_next(&self, ctx: &ActorContext, draft: FactDraft) -> Result<Fact> {
        let metadata = FactMetadata::from_context(ctx, draft.reason.clone());
        validate_fact_type(draft.stream_type, &draft.fact_type)?;
        validate_reason(
            &draft.reason,
            self.config.reason_min_len,
            self.config.reason_max_len,
        )?;

        let appended = self.write(|conn, appended| {
            let next = last_version_in(conn, draft.stream_id)? + 1;
            let root = insert_fact(conn, &draft.clone().at_version(next), metadata)?;
            appended.push(root.clone());
            self.dispatch(conn, &root, 0, appended)?;
            Ok(())
        })?;

        let id = appended[0].id;
        self.get(id)?
            .ok_or_else(|| TenantryError::NotFound(format!("fact {} vanished after append", id)))
    }

    /// Clear a fact's processing state and dispatch it again.
    ///
    /// Follow-up facts produced by the retry are appended and published like
    /// any other.
    pub fn retry(&self, fact_id: FactId) -> Result<Fact> {
        self.write(|conn, appended| {
            let fact = get_in(conn, fact_id)?
                .ok_or_else(|| TenantryError::NotFound(format!("fact {}", fact_id)))?;

            conn.execute(
                "UPDATE facts SET processed_at = NULL, processing_error = NULL WHERE id = ?1",
                params![fact_id.to_string()],
            )
            .map_err(storage)?;

            tracing::info!(fact_id = %fact_id, fact_type = %fact.fact_type, "Retrying fact");
            self.dispatch(conn, &fact, 0, appended)?;
            Ok(())
        })?;

        self.get(fact_id)?
            .ok_or_else(|| TenantryError::NotFound(format!("fact {}", fact_id)))
    }

    pub fn get(&self, fact_id: FactId) -> Result<Option<Fact>> {
        get_in(&self.conn.lock(), fact_id)
    }

    /// Every fact of one stream, in version order
    pub fn stream(&self, stream_id: StreamId) -> Result<Vec<Fact>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {} FROM facts WHERE stream_id = ?1 ORDER BY stream_version",
                FACT_COLUMNS
            ))
            .map_err(storage)?;
        let rows = stmt
            .query_map(params![stream_id.to_string()], RawFact::from_row)
            .map_err(storage)?;
        collect_facts(rows)
    }

    /// Last version of a stream, 0 if it has no facts
    pub fn last_version(&self, stream_id: StreamId) -> Result<i64> {
        last_version_in(&self.conn.lock(), stream_id)
    }

    /// Drop all projection rows and replay the whole log in append order.
    ///
    /// Follow-ups returned during replay are ignored; the facts they would
    /// produce are already in the log.
    pub fn rebuild_projections(&self) -> Result<RebuildReport> {
        let mut conn = self.conn.lock();
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(storage)?;

        projection_schema::truncate(&tx)?;

        let facts = {
            let mut stmt = tx
                .prepare(&format!("SELECT {} FROM facts ORDER BY rowid", FACT_COLUMNS))
                .map_err(storage)?;
            let rows = stmt.query_map([], RawFact::from_row).map_err(storage)?;
            collect_facts(rows)?
        };

        let mut report = RebuildReport::default();
        for fact in &facts {
            report.replayed += 1;
            savepoint(&tx)?;
            match self.registry.dispatch(&tx, fact) {
                Ok(Some(_)) => {
                    release(&tx)?;
                    mark_processed(&tx, fact.id)?;
                }
                Ok(None) => {
                    release(&tx)?;
                    report.unhandled += 1;
                    mark_unprocessed(&tx, fact.id)?;
                }
                Err(e) => {
                    rollback_to(&tx)?;
                    report.failed += 1;
                    mark_failed(&tx, fact.id, &e.to_string())?;
                }
            }
        }

        tx.commit().map_err(storage)?;
        tracing::info!(
            replayed = report.replayed,
            failed = report.failed,
            unhandled = report.unhandled,
            "Rebuilt projections"
        );
        Ok(report)
    }

    /// Run a read-only closure against the connection
    pub fn read<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let conn = self.conn.lock();
        f(&conn)
    }

    /// Run `body` in an immediate transaction, then publish what it appended.
    fn write<F>(&self, body: F) -> Result<Vec<Fact>>
    where
        F: FnOnce(&Connection, &mut Vec<Fact>) -> Result<()>,
    {
        let mut appended = Vec::new();
        let started = Instant::now();
        {
            let mut conn = self.conn.lock();
            let tx = conn
                .transaction_with_behavior(TransactionBehavior::Immediate)
                .map_err(storage)?;
            body(&tx, &mut appended)?;
            tx.commit().map_err(storage)?;
        }
        observe::record_append(started.elapsed(), appended.len() as u64);

        if let Some(publisher) = &self.publisher {
            for fact in &appended {
                publisher.publish(fact);
            }
        }
        Ok(appended)
    }

    fn validate_new(&self, fact: &NewFact) -> Result<()> {
        validate_version(fact.stream_version)?;
        validate_fact_type(fact.stream_type, &fact.fact_type)?;
        validate_reason(
            &fact.reason,
            self.config.reason_min_len,
            self.config.reason_max_len,
        )
    }

    /// Apply `fact` inside a savepoint, recording the outcome on its row.
    fn dispatch(
        &self,
        conn: &Connection,
        fact: &Fact,
        depth: usize,
        appended: &mut Vec<Fact>,
    ) -> Result<()> {
        let mark = appended.len();
        savepoint(conn)?;

        match self.apply_with_follow_ups(conn, fact, depth, appended) {
            Ok(Dispatched::Processed) => {
                release(conn)?;
                mark_processed(conn, fact.id)?;
            }
            Ok(Dispatched::Unhandled) => release(conn)?,
            Err(e) => {
                rollback_to(conn)?;
                appended.truncate(mark);
                tracing::warn!(
                    fact_id = %fact.id,
                    stream_id = %fact.stream_id,
                    fact_type = %fact.fact_type,
                    error = %e,
                    "Projection handler failed"
                );
                observe::record_handler_failure(&fact.fact_type);
                mark_failed(conn, fact.id, &e.to_string())?;
            }
        }
        Ok(())
    }

    fn apply_with_follow_ups(
        &self,
        conn: &Connection,
        fact: &Fact,
        depth: usize,
        appended: &mut Vec<Fact>,
    ) -> Result<Dispatched> {
        let Some(effects) = self.registry.dispatch(conn, fact)? else {
            return Ok(Dispatched::Unhandled);
        };

        if !effects.is_empty() && depth >= self.config.max_cascade_depth {
            return Err(TenantryError::HandlerFailure(format!(
                "cascade depth {} exceeded by {}",
                self.config.max_cascade_depth, fact.fact_type
            )));
        }

        for draft in effects.follow_ups {
            validate_fact_type(draft.stream_type, &draft.fact_type)?;
            let next = last_version_in(conn, draft.stream_id)? + 1;
            let metadata = FactMetadata {
                reason: draft.reason.clone(),
                causation_id: Some(fact.id),
                ..fact.metadata.clone()
            };
            let child = insert_fact(conn, &draft.at_version(next), metadata)?;
            tracing::debug!(
                parent = %fact.id,
                fact_id = %child.id,
                fact_type = %child.fact_type,
                "Appended follow-up fact"
            );
            appended.push(child.clone());
            self.dispatch(conn, &child, depth + 1, appended)?;
        }

        Ok(Dispatched::Processed)
    }
}

fn savepoint(conn: &Connection) -> Result<()> {
    conn.execute_batch("SAVEPOINT dispatch").map_err(storage)
}

fn release(conn: &Connection) -> Result<()> {
    conn.execute_batch("RELEASE dispatch").map_err(storage)
}

fn rollback_to(conn: &Connection) -> Result<()> {
    conn.execute_batch("ROLLBACK TO dispatch; RELEASE dispatch")
        .map_err(storage)
}

fn mark_processed(conn: &Connection, fact_id: FactId) -> Result<()> {
    conn.execute(
        "UPDATE facts SET processed_at = ?2, processing_error = NULL WHERE id = ?1",
        params![fact_id.to_string(), format_ts(&Utc::now())],
    )
    .map_err(storage)?;
    Ok(())
}

fn mark_unprocessed(conn: &Connection, fact_id: FactId) -> Result<()> {
    conn.execute(
        "UPDATE facts SET processed_at = NULL, processing_error = NULL WHERE id = ?1",
        params![fact_id.to_string()],
    )
    .map_err(storage)?;
    Ok(())
}

fn mark_failed(conn: &Connection, fact_id: FactId, error: &str) -> Result<()> {
    conn.execute(
        "UPDATE facts SET processed_at = NULL, processing_error = ?2 WHERE id = ?1",
        params![fact_id.to_string(), error],
    )
    .map_err(storage)?;
    Ok(())
}

fn last_version_in(conn: &Connection, stream_id: StreamId) -> Result<i64> {
    conn.query_row(
        "SELECT COALESCE(MAX(stream_version), 0) FROM facts WHERE stream_id = ?1",
        params![stream_id.to_string()],
        |row| row.get(0),
    )
    .map_err(storage)
}

fn get_in(conn: &Connection, fact_id: FactId) -> Result<Option<Fact>> {
    conn.query_row(
        &format!("SELECT {} FROM facts WHERE id = ?1", FACT_COLUMNS),
        params![fact_id.to_string()],
        RawFact::from_row,
    )
    .optional()
    .map_err(storage)?
    .map(RawFact::decode)
    .transpose()
}

fn insert_fact(conn: &Connection, fact: &NewFact, metadata: FactMetadata) -> Result<Fact> {
    let stored = Fact {
        id: uuid::Uuid::new_v4(),
        stream_id: fact.stream_id,
        stream_type: fact.stream_type,
        stream_version: fact.stream_version,
        fact_type: fact.fact_type.clone(),
        payload: fact.payload.clone(),
        metadata,
        created_at: Utc::now(),
        processed_at: None,
        processing_error: None,
    };

    let result = conn.execute(
        "INSERT INTO facts
            (id, stream_id, stream_type, stream_version, fact_type, payload, metadata, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            stored.id.to_string(),
            stored.stream_id.to_string(),
            stored.stream_type.as_str(),
            stored.stream_version,
            stored.fact_type,
            serde_json::to_string(&stored.payload)?,
            serde_json::to_string(&stored.metadata)?,
            format_ts(&stored.created_at),
        ],
    );

    match result {
        Ok(_) => Ok(stored),
        Err(rusqlite::Error::SqliteFailure(err, _))
            if err.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            let actual = last_version_in(conn, fact.stream_id)?;
            Err(TenantryError::ConcurrentModification {
                stream_id: fact.stream_id,
                expected: fact.stream_version,
                actual,
            })
        }
        Err(e) => Err(storage(e)),
    }
}
