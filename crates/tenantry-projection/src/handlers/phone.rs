//! Phones land in `user_phones` when they carry a `user_id`, and in the
//! organization-scoped `phones` table otherwise.

use super::{id_str, unlink_follow_ups};
use crate::format_ts;
use crate::handler::Effects;
use crate::payloads::{PhoneCreated, PhoneUpdated};
use crate::storage;
use rusqlite::{params, Connection};
use tenantry_core::{Fact, Result, StreamType, TenantryError};

const PHONE_TABLES: [&str; 2] = ["phones", "user_phones"];

pub fn created(conn: &Connection, fact: &Fact) -> Result<Effects> {
    let payload: PhoneCreated = fact.payload_as()?;
    let ts = format_ts(&fact.created_at);

    match payload.user_id {
        Some(user_id) => conn.execute(
            "INSERT INTO user_phones
                (id, user_id, label, number, extension, is_primary, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)
             ON CONFLICT(id) DO NOTHING",
            params![
                id_str(fact.stream_id),
                id_str(user_id),
                payload.label,
                payload.number,
                payload.extension,
                payload.is_primary,
                ts,
            ],
        ),
        None => conn.execute(
            "INSERT INTO phones
                (id, organization_id, label, number, extension, is_primary, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)
             ON CONFLICT(id) DO NOTHING",
            params![
                id_str(fact.stream_id),
                payload.organization_id.map(id_str),
                payload.label,
                payload.number,
                payload.extension,
                payload.is_primary,
                ts,
            ],
        ),
    }
    .map_err(storage)?;

    Ok(Effects::none())
}

pub fn updated(conn: &Connection, fact: &Fact) -> Result<Effects> {
    let payload: PhoneUpdated = fact.payload_as()?;
    let ts = format_ts(&fact.created_at);

    for table in PHONE_TABLES {
        let sql = format!(
            "UPDATE {} SET label = COALESCE(?2, label),
                           number = COALESCE(?3, number),
                           extension = COALESCE(?4, extension),
                           updated_at = ?5
             WHERE id = ?1 AND deleted_at IS NULL",
            table
        );
        let changed = conn
            .execute(
                &sql,
                params![
                    id_str(fact.stream_id),
                    payload.label,
                    payload.number,
                    payload.extension,
                    ts,
                ],
            )
            .map_err(storage)?;
        if changed > 0 {
            return Ok(Effects::none());
        }
    }

    Err(TenantryError::HandlerFailure(format!(
        "phone {} not found",
        fact.stream_id
    )))
}

pub fn deleted(conn: &Connection, fact: &Fact) -> Result<Effects> {
    let ts = format_ts(&fact.created_at);

    let mut found = false;
    for table in PHONE_TABLES {
        let sql = format!(
            "UPDATE {} SET deleted_at = COALESCE(deleted_at, ?2), updated_at = ?2 WHERE id = ?1",
            table
        );
        if conn
            .execute(&sql, params![id_str(fact.stream_id), ts])
            .map_err(storage)?
            > 0
        {
            found = true;
            break;
        }
    }
    if !found {
        return Err(TenantryError::HandlerFailure(format!(
            "phone {} not found",
            fact.stream_id
        )));
    }

    Ok(Effects {
        follow_ups: unlink_follow_ups(conn, fact, StreamType::Phone, fact.stream_id)?,
    })
}
