use super::id_str;
use crate::format_ts;
use crate::handler::{execute_expecting_row, Effects};
use crate::payloads::{InvitationCreated, InvitationEmailFailed, InvitationEmailSent};
use crate::storage;
use rusqlite::{params, Connection};
use tenantry_core::{Fact, Result};

pub fn created(conn: &Connection, fact: &Fact) -> Result<Effects> {
    let payload: InvitationCreated = fact.payload_as()?;
    conn.execute(
        "INSERT INTO invitations
            (id, organization_id, email, first_name, last_name, role, token, status,
             expires_at, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 'pending', ?8, ?9, ?9)
         ON CONFLICT(id) DO NOTHING",
        params![
            id_str(fact.stream_id),
            id_str(payload.organization_id),
            payload.email,
            payload.first_name,
            payload.last_name,
            payload.role,
            payload.token,
            format_ts(&payload.expires_at),
            format_ts(&fact.created_at),
        ],
    )
    .map_err(storage)?;
    Ok(Effects::none())
}

pub fn email_sent(conn: &Connection, fact: &Fact) -> Result<Effects> {
    let payload: InvitationEmailSent = fact.payload_as()?;
    execute_expecting_row(
        conn,
        "UPDATE invitations
         SET status = CASE WHEN status = 'revoked' THEN status ELSE 'sent' END,
             delivery_id = ?2, last_error = NULL, updated_at = ?3
         WHERE id = ?1",
        params![
            id_str(fact.stream_id),
            payload.delivery_id,
            format_ts(&fact.created_at)
        ],
        || format!("invitation {} not found", fact.stream_id),
    )?;
    Ok(Effects::none())
}

pub fn email_failed(conn: &Connection, fact: &Fact) -> Result<Effects> {
    let payload: InvitationEmailFailed = fact.payload_as()?;
    execute_expecting_row(
        conn,
        "UPDATE invitations
         SET status = CASE WHEN status = 'revoked' THEN status ELSE 'send_failed' END,
             last_error = ?2, updated_at = ?3
         WHERE id = ?1",
        params![
            id_str(fact.stream_id),
            payload.error,
            format_ts(&fact.created_at)
        ],
        || format!("invitation {} not found", fact.stream_id),
    )?;
    Ok(Effects::none())
}

pub fn revoked(conn: &Connection, fact: &Fact) -> Result<Effects> {
    execute_expecting_row(
        conn,
        "UPDATE invitations SET status = 'revoked', updated_at = ?2 WHERE id = ?1",
        params![id_str(fact.stream_id), format_ts(&fact.created_at)],
        || format!("invitation {} not found", fact.stream_id),
    )?;
    Ok(Effects::none())
}
