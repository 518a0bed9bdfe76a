use super::{id_str, unlink_follow_ups};
use crate::format_ts;
use crate::handler::{execute_expecting_row, Effects};
use crate::payloads::{ContactCreated, ContactUpdated};
use crate::storage;
use rusqlite::{params, Connection};
use tenantry_core::{Fact, Result, StreamType};

pub fn created(conn: &Connection, fact: &Fact) -> Result<Effects> {
    let payload: ContactCreated = fact.payload_as()?;
    conn.execute(
        "INSERT INTO contacts
            (id, organization_id, first_name, last_name, email, title, label, is_primary,
             created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)
         ON CONFLICT(id) DO NOTHING",
        params![
            id_str(fact.stream_id),
            payload.organization_id.map(id_str),
            payload.first_name,
            payload.last_name,
            payload.email,
            payload.title,
            payload.label,
            payload.is_primary,
            format_ts(&fact.created_at),
        ],
    )
    .map_err(storage)?;
    Ok(Effects::none())
}

pub fn updated(conn: &Connection, fact: &Fact) -> Result<Effects> {
    let payload: ContactUpdated = fact.payload_as()?;
    execute_expecting_row(
        conn,
        "UPDATE contacts
         SET first_name = COALESCE(?2, first_name),
             last_name = COALESCE(?3, last_name),
             email = COALESCE(?4, email),
             title = COALESCE(?5, title),
             updated_at = ?6
         WHERE id = ?1 AND deleted_at IS NULL",
        params![
            id_str(fact.stream_id),
            payload.first_name,
            payload.last_name,
            payload.email,
            payload.title,
            format_ts(&fact.created_at),
        ],
        || format!("contact {} not found", fact.stream_id),
    )?;
    Ok(Effects::none())
}

pub fn deleted(conn: &Connection, fact: &Fact) -> Result<Effects> {
    let ts = format_ts(&fact.created_at);
    execute_expecting_row(
        conn,
        "UPDATE contacts SET deleted_at = COALESCE(deleted_at, ?2), updated_at = ?2 WHERE id = ?1",
        params![id_str(fact.stream_id), ts],
        || format!("contact {} not found", fact.stream_id),
    )?;
    Ok(Effects {
        follow_ups: unlink_follow_ups(conn, fact, StreamType::Contact, fact.stream_id)?,
    })
}
