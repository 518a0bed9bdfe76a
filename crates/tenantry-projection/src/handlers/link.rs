use super::id_str;
use crate::format_ts;
use crate::handler::Effects;
use crate::payloads::LinkChanged;
use crate::storage;
use rusqlite::{params, Connection};
use tenantry_core::{Fact, Result, TenantryError};

fn checked_payload(fact: &Fact) -> Result<LinkChanged> {
    let link: LinkChanged = fact.payload_as()?;
    let expected = link.kind.stream_id(link.left_id, link.right_id);
    if fact.stream_id != expected {
        return Err(TenantryError::HandlerFailure(format!(
            "{} link stream {} does not match its endpoints (expected {})",
            link.kind.as_str(),
            fact.stream_id,
            expected
        )));
    }
    Ok(link)
}

pub fn created(conn: &Connection, fact: &Fact) -> Result<Effects> {
    let link = checked_payload(fact)?;
    let (left, right) = link.kind.columns();
    let sql = format!(
        "INSERT INTO {table} ({left}, {right}, created_at) VALUES (?1, ?2, ?3)
         ON CONFLICT({left}, {right}) DO NOTHING",
        table = link.kind.table(),
        left = left,
        right = right,
    );
    conn.execute(
        &sql,
        params![
            id_str(link.left_id),
            id_str(link.right_id),
            format_ts(&fact.created_at)
        ],
    )
    .map_err(storage)?;
    Ok(Effects::none())
}

pub fn removed(conn: &Connection, fact: &Fact) -> Result<Effects> {
    let link = checked_payload(fact)?;
    let (left, right) = link.kind.columns();
    let sql = format!(
        "DELETE FROM {table} WHERE {left} = ?1 AND {right} = ?2",
        table = link.kind.table(),
        left = left,
        right = right,
    );
    conn.execute(&sql, params![id_str(link.left_id), id_str(link.right_id)])
        .map_err(storage)?;
    Ok(Effects::none())
}
