use super::id_str;
use crate::format_ts;
use crate::handler::Effects;
use crate::payloads::BootstrapOutcome;
use crate::storage;
use rusqlite::{params, Connection};
use tenantry_core::{Fact, Result};

pub fn initiated(conn: &Connection, fact: &Fact) -> Result<Effects> {
    upsert_status(conn, fact, "initiated", None, None)
}

pub fn completed(conn: &Connection, fact: &Fact) -> Result<Effects> {
    upsert_status(conn, fact, "completed", None, None)
}

pub fn failed(conn: &Connection, fact: &Fact) -> Result<Effects> {
    let outcome: BootstrapOutcome = fact.payload_as()?;
    upsert_status(
        conn,
        fact,
        "failed",
        outcome.stage.as_deref(),
        outcome.error.as_deref(),
    )
}

pub fn cancelled(conn: &Connection, fact: &Fact) -> Result<Effects> {
    let outcome: BootstrapOutcome = fact.payload_as()?;
    upsert_status(
        conn,
        fact,
        "cancelled",
        outcome.stage.as_deref(),
        outcome.error.as_deref(),
    )
}

fn upsert_status(
    conn: &Connection,
    fact: &Fact,
    status: &str,
    stage: Option<&str>,
    error: Option<&str>,
) -> Result<Effects> {
    conn.execute(
        "INSERT INTO organization_bootstrap
            (organization_id, status, correlation_id, failure_stage, error, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
         ON CONFLICT(organization_id) DO UPDATE SET
            status = excluded.status,
            correlation_id = excluded.correlation_id,
            failure_stage = excluded.failure_stage,
            error = excluded.error,
            updated_at = excluded.updated_at",
        params![
            id_str(fact.stream_id),
            status,
            id_str(fact.metadata.correlation_id),
            stage,
            error,
            format_ts(&fact.created_at),
        ],
    )
    .map_err(storage)?;
    Ok(Effects::none())
}
