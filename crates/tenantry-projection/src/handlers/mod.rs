//! Standard projection handlers, one function per fact type.

pub mod address;
pub mod bootstrap;
pub mod contact;
pub mod invitation;
pub mod link;
pub mod organization;
pub mod phone;

use crate::handler::FnHandler;
use crate::payloads::{LinkChanged, LinkKind};
use crate::registry::HandlerRegistry;
use crate::storage;
use rusqlite::{params, Connection};
use serde_json::json;
use tenantry_core::{Fact, FactDraft, Result, StreamType, TenantryError};
use uuid::Uuid;

/// Register every standard handler.
pub fn register_standard(registry: &mut HandlerRegistry) {
    use StreamType::*;

    let routes: [(StreamType, &'static str, crate::handler::HandlerFn); 26] = [
        (Organization, "organization.created", organization::created),
        (Organization, "organization.updated", organization::updated),
        (Organization, "organization.subdomain.dns_created", organization::dns_created),
        (Organization, "organization.subdomain.verified", organization::subdomain_verified),
        (
            Organization,
            "organization.subdomain.verification_failed",
            organization::subdomain_verification_failed,
        ),
        (Organization, "organization.activated", organization::activated),
        (Organization, "organization.deleted", organization::deleted),
        (Organization, "organization.bootstrap.initiated", bootstrap::initiated),
        (Organization, "organization.bootstrap.completed", bootstrap::completed),
        (Organization, "organization.bootstrap.failed", bootstrap::failed),
        (Organization, "organization.bootstrap.cancelled", bootstrap::cancelled),
        (Contact, "contact.created", contact::created),
        (Contact, "contact.updated", contact::updated),
        (Contact, "contact.deleted", contact::deleted),
        (Address, "address.created", address::created),
        (Address, "address.updated", address::updated),
        (Address, "address.deleted", address::deleted),
        (Phone, "phone.created", phone::created),
        (Phone, "phone.updated", phone::updated),
        (Phone, "phone.deleted", phone::deleted),
        (Junction, "link.created", link::created),
        (Junction, "link.removed", link::removed),
        (Invitation, "invitation.created", invitation::created),
        (Invitation, "invitation.email_sent", invitation::email_sent),
        (Invitation, "invitation.email_failed", invitation::email_failed),
        (Invitation, "invitation.revoked", invitation::revoked),
    ];

    for (stream_type, fact_type, apply) in routes {
        registry.register(Box::new(FnHandler::new(stream_type, fact_type, apply)));
    }
}

pub(crate) fn cascade_reason(fact: &Fact) -> String {
    format!("Cascaded from {} (fact {})", fact.fact_type, fact.id)
}

pub(crate) fn id_str(id: Uuid) -> String {
    id.to_string()
}

pub(crate) fn parse_id(raw: &str) -> Result<Uuid> {
    Uuid::parse_str(raw)
        .map_err(|e| TenantryError::Storage(format!("invalid id '{}' in projection: {}", raw, e)))
}

/// Ids of live rows in `table` owned by an organization.
pub(crate) fn live_children(conn: &Connection, table: &str, organization_id: Uuid) -> Result<Vec<Uuid>> {
    let sql = format!(
        "SELECT id FROM {} WHERE organization_id = ?1 AND deleted_at IS NULL ORDER BY created_at DESC, id",
        table
    );
    let mut stmt = conn.prepare(&sql).map_err(storage)?;
    let ids = stmt
        .query_map(params![id_str(organization_id)], |row| row.get::<_, String>(0))
        .map_err(storage)?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(storage)?;
    ids.iter().map(|raw| parse_id(raw)).collect()
}

/// Every link row with `id` on the `stream_type` side.
pub fn links_touching(conn: &Connection, stream_type: StreamType, id: Uuid) -> Result<Vec<LinkChanged>> {
    let mut links = Vec::new();
    for kind in LinkKind::ALL {
        let (left_type, right_type) = kind.sides();
        let (left_col, right_col) = kind.columns();
        let (match_col, other_col) = if left_type == stream_type {
            (left_col, right_col)
        } else if right_type == stream_type {
            (right_col, left_col)
        } else {
            continue;
        };

        let sql = format!(
            "SELECT {other} FROM {table} WHERE {matched} = ?1 ORDER BY {other}",
            other = other_col,
            table = kind.table(),
            matched = match_col,
        );
        let mut stmt = conn.prepare(&sql).map_err(storage)?;
        let others = stmt
            .query_map(params![id_str(id)], |row| row.get::<_, String>(0))
            .map_err(storage)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(storage)?;

        for raw in others {
            let other = parse_id(&raw)?;
            let (left_id, right_id) = if left_type == stream_type {
                (id, other)
            } else {
                (other, id)
            };
            links.push(LinkChanged {
                kind,
                left_id,
                right_id,
            });
        }
    }
    Ok(links)
}

/// `link.removed` follow-ups for every link touching a deleted entity.
pub(crate) fn unlink_follow_ups(
    conn: &Connection,
    fact: &Fact,
    stream_type: StreamType,
    id: Uuid,
) -> Result<Vec<FactDraft>> {
    let reason = cascade_reason(fact);
    Ok(links_touching(conn, stream_type, id)?
        .into_iter()
        .map(|link| {
            FactDraft::new(
                StreamType::Junction,
                link.kind.stream_id(link.left_id, link.right_id),
                "link.removed",
                json!(link),
                reason.clone(),
            )
        })
        .collect())
}
