use super::{id_str, unlink_follow_ups};
use crate::format_ts;
use crate::handler::{execute_expecting_row, Effects};
use crate::payloads::{AddressCreated, AddressUpdated};
use crate::storage;
use rusqlite::{params, Connection};
use tenantry_core::{Fact, Result, StreamType};

pub fn created(conn: &Connection, fact: &Fact) -> Result<Effects> {
    let payload: AddressCreated = fact.payload_as()?;
    conn.execute(
        "INSERT INTO addresses
            (id, organization_id, label, street1, street2, city, state, postal_code, country,
             is_primary, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?11)
         ON CONFLICT(id) DO NOTHING",
        params![
            id_str(fact.stream_id),
            payload.organization_id.map(id_str),
            payload.label,
            payload.street1,
            payload.street2,
            payload.city,
            payload.state,
            payload.postal_code,
            payload.country,
            payload.is_primary,
            format_ts(&fact.created_at),
        ],
    )
    .map_err(storage)?;
    Ok(Effects::none())
}

pub fn updated(conn: &Connection, fact: &Fact) -> Result<Effects> {
    let payload: AddressUpdated = fact.payload_as()?;
    execute_expecting_row(
        conn,
        "UPDATE addresses
         SET label = COALESCE(?2, label),
             street1 = COALESCE(?3, street1),
             street2 = COALESCE(?4, street2),
             city = COALESCE(?5, city),
             state = COALESCE(?6, state),
             postal_code = COALESCE(?7, postal_code),
             updated_at = ?8
         WHERE id = ?1 AND deleted_at IS NULL",
        params![
            id_str(fact.stream_id),
            payload.label,
            payload.street1,
            payload.street2,
            payload.city,
            payload.state,
            payload.postal_code,
            format_ts(&fact.created_at),
        ],
        || format!("address {} not found", fact.stream_id),
    )?;
    Ok(Effects::none())
}

pub fn deleted(conn: &Connection, fact: &Fact) -> Result<Effects> {
    let ts = format_ts(&fact.created_at);
    execute_expecting_row(
        conn,
        "UPDATE addresses SET deleted_at = COALESCE(deleted_at, ?2), updated_at = ?2 WHERE id = ?1",
        params![id_str(fact.stream_id), ts],
        || format!("address {} not found", fact.stream_id),
    )?;
    Ok(Effects {
        follow_ups: unlink_follow_ups(conn, fact, StreamType::Address, fact.stream_id)?,
    })
}
