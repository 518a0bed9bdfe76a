use super::{cascade_reason, id_str, live_children};
use crate::format_ts;
use crate::handler::{execute_expecting_row, Effects};
use crate::payloads::{
    OrganizationCreated, OrganizationUpdated, SubdomainDnsCreated, SubdomainVerificationFailed,
};
use crate::storage;
use rusqlite::{params, Connection};
use serde_json::json;
use tenantry_core::{Fact, FactDraft, Result, StreamType};

pub fn created(conn: &Connection, fact: &Fact) -> Result<Effects> {
    let payload: OrganizationCreated = fact.payload_as()?;
    let ts = format_ts(&fact.created_at);
    let subdomain_status = if payload.classification.requires_dns() {
        "pending"
    } else {
        "not_required"
    };

    conn.execute(
        "INSERT INTO organizations
            (id, name, display_name, org_type, partner_type, subdomain, subdomain_status,
             timezone, is_active, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 0, ?9, ?9)
         ON CONFLICT(id) DO NOTHING",
        params![
            id_str(fact.stream_id),
            payload.name,
            payload.display_name,
            payload.classification.org_type.as_str(),
            payload.classification.partner_type.map(|p| p.as_str()),
            payload.subdomain,
            subdomain_status,
            payload.timezone,
            ts,
        ],
    )
    .map_err(storage)?;

    Ok(Effects::none())
}

pub fn updated(conn: &Connection, fact: &Fact) -> Result<Effects> {
    let payload: OrganizationUpdated = fact.payload_as()?;
    execute_expecting_row(
        conn,
        "UPDATE organizations
         SET name = COALESCE(?2, name),
             display_name = COALESCE(?3, display_name),
             timezone = COALESCE(?4, timezone),
             updated_at = ?5
         WHERE id = ?1",
        params![
            id_str(fact.stream_id),
            payload.name,
            payload.display_name,
            payload.timezone,
            format_ts(&fact.created_at),
        ],
        || format!("organization {} not found", fact.stream_id),
    )?;
    Ok(Effects::none())
}

pub fn dns_created(conn: &Connection, fact: &Fact) -> Result<Effects> {
    let payload: SubdomainDnsCreated = fact.payload_as()?;
    // A replayed dns_created must not undo a later verification.
    execute_expecting_row(
        conn,
        "UPDATE organizations
         SET subdomain_status = CASE WHEN subdomain_status = 'verified' THEN subdomain_status ELSE 'dns_created' END,
             dns_record_id = ?2,
             updated_at = ?3
         WHERE id = ?1",
        params![
            id_str(fact.stream_id),
            payload.record_id,
            format_ts(&fact.created_at),
        ],
        || format!("organization {} not found", fact.stream_id),
    )?;
    Ok(Effects::none())
}

pub fn subdomain_verified(conn: &Connection, fact: &Fact) -> Result<Effects> {
    set_subdomain_status(conn, fact, "verified")
}

pub fn subdomain_verification_failed(conn: &Connection, fact: &Fact) -> Result<Effects> {
    let _payload: SubdomainVerificationFailed = fact.payload_as()?;
    set_subdomain_status(conn, fact, "verification_failed")
}

fn set_subdomain_status(conn: &Connection, fact: &Fact, status: &str) -> Result<Effects> {
    execute_expecting_row(
        conn,
        "UPDATE organizations SET subdomain_status = ?2, updated_at = ?3 WHERE id = ?1",
        params![id_str(fact.stream_id), status, format_ts(&fact.created_at)],
        || format!("organization {} not found", fact.stream_id),
    )?;
    Ok(Effects::none())
}

pub fn activated(conn: &Connection, fact: &Fact) -> Result<Effects> {
    let ts = format_ts(&fact.created_at);
    execute_expecting_row(
        conn,
        "UPDATE organizations
         SET is_active = 1, activated_at = COALESCE(activated_at, ?2), updated_at = ?2
         WHERE id = ?1 AND deleted_at IS NULL",
        params![id_str(fact.stream_id), ts],
        || format!("organization {} not found or deleted", fact.stream_id),
    )?;
    Ok(Effects::none())
}

/// Soft-deletes the organization and asks for its live children to be
/// deleted through their own streams.
pub fn deleted(conn: &Connection, fact: &Fact) -> Result<Effects> {
    let organization_id = fact.stream_id;
    let ts = format_ts(&fact.created_at);
    execute_expecting_row(
        conn,
        "UPDATE organizations
         SET deleted_at = COALESCE(deleted_at, ?2), is_active = 0, updated_at = ?2
         WHERE id = ?1",
        params![id_str(organization_id), ts],
        || format!("organization {} not found", organization_id),
    )?;

    let reason = cascade_reason(fact);
    let mut effects = Effects::none();

    let mut stmt = conn
        .prepare(
            "SELECT id FROM invitations
             WHERE organization_id = ?1 AND status != 'revoked'
             ORDER BY created_at DESC, id",
        )
        .map_err(storage)?;
    let invitations = stmt
        .query_map(params![id_str(organization_id)], |row| row.get::<_, String>(0))
        .map_err(storage)?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(storage)?;
    for raw in invitations {
        effects = effects.follow_up(FactDraft::new(
            StreamType::Invitation,
            super::parse_id(&raw)?,
            "invitation.revoked",
            json!({}),
            reason.clone(),
        ));
    }

    let children = [
        ("phones", StreamType::Phone, "phone.deleted"),
        ("addresses", StreamType::Address, "address.deleted"),
        ("contacts", StreamType::Contact, "contact.deleted"),
    ];
    for (table, stream_type, fact_type) in children {
        for child in live_children(conn, table, organization_id)? {
            effects = effects.follow_up(FactDraft::new(
                stream_type,
                child,
                fact_type,
                json!({}),
                reason.clone(),
            ));
        }
    }

    Ok(effects)
}
