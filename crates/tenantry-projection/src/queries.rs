//! Read-side lookups over the projection tables.
//!
//! Deleted rows are excluded everywhere except `get_organization`, which
//! callers use to inspect compensation results.

use crate::handlers::{id_str, parse_id};
use crate::payloads::LinkKind;
use crate::storage;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;
use tenantry_core::Result;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrganizationRow {
    pub id: Uuid,
    pub name: String,
    pub display_name: Option<String>,
    pub org_type: String,
    pub partner_type: Option<String>,
    pub subdomain: Option<String>,
    pub subdomain_status: String,
    pub dns_record_id: Option<String>,
    pub timezone: String,
    pub is_active: bool,
    pub created_at: String,
    pub activated_at: Option<String>,
    pub deleted_at: Option<String>,
}

impl OrganizationRow {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContactRow {
    pub id: Uuid,
    pub organization_id: Option<Uuid>,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub title: Option<String>,
    pub is_primary: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AddressRow {
    pub id: Uuid,
    pub organization_id: Option<Uuid>,
    pub label: Option<String>,
    pub street1: String,
    pub city: String,
    pub state: String,
    pub postal_code: String,
    pub country: String,
    pub is_primary: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PhoneRow {
    pub id: Uuid,
    /// Organization for org phones, user for user phones
    pub owner_id: Option<Uuid>,
    pub label: Option<String>,
    pub number: String,
    pub extension: Option<String>,
    pub is_primary: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InvitationRow {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub email: String,
    pub role: String,
    pub token: String,
    pub status: String,
    pub delivery_id: Option<String>,
    pub last_error: Option<String>,
    pub expires_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BootstrapStatus {
    pub organization_id: Uuid,
    pub status: String,
    pub correlation_id: Uuid,
    pub failure_stage: Option<String>,
    pub error: Option<String>,
    pub updated_at: String,
}

fn opt_id(raw: Option<String>) -> Result<Option<Uuid>> {
    raw.as_deref().map(parse_id).transpose()
}

const ORGANIZATION_COLUMNS: &str = "id, name, display_name, org_type, partner_type, subdomain,
    subdomain_status, dns_record_id, timezone, is_active, created_at, activated_at, deleted_at";

type RawOrganization = (
    String,
    String,
    Option<String>,
    String,
    Option<String>,
    Option<String>,
    String,
    Option<String>,
    String,
    bool,
    String,
    Option<String>,
    Option<String>,
);

fn raw_organization(row: &Row<'_>) -> rusqlite::Result<RawOrganization> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
        row.get(8)?,
        row.get(9)?,
        row.get(10)?,
        row.get(11)?,
        row.get(12)?,
    ))
}

fn organization_from_raw(raw: RawOrganization) -> Result<OrganizationRow> {
    let (
        id,
        name,
        display_name,
        org_type,
        partner_type,
        subdomain,
        subdomain_status,
        dns_record_id,
        timezone,
        is_active,
        created_at,
        activated_at,
        deleted_at,
    ) = raw;
    Ok(OrganizationRow {
        id: parse_id(&id)?,
        name,
        display_name,
        org_type,
        partner_type,
        subdomain,
        subdomain_status,
        dns_record_id,
        timezone,
        is_active,
        created_at,
        activated_at,
        deleted_at,
    })
}

fn query_organization(conn: &Connection, filter: &str, value: &str) -> Result<Option<OrganizationRow>> {
    let sql = format!(
        "SELECT {} FROM organizations WHERE {} ORDER BY created_at LIMIT 1",
        ORGANIZATION_COLUMNS, filter
    );
    conn.query_row(&sql, params![value], raw_organization)
        .optional()
        .map_err(storage)?
        .map(organization_from_raw)
        .transpose()
}

/// Organization by id, including soft-deleted rows
pub fn get_organization(conn: &Connection, id: Uuid) -> Result<Option<OrganizationRow>> {
    query_organization(conn, "id = ?1", &id_str(id))
}

pub fn find_live_organization_by_subdomain(
    conn: &Connection,
    subdomain: &str,
) -> Result<Option<OrganizationRow>> {
    query_organization(conn, "subdomain = ?1 AND deleted_at IS NULL", subdomain)
}

/// Natural key for organizations that never get a subdomain.
pub fn find_live_organization_by_name_without_subdomain(
    conn: &Connection,
    name: &str,
) -> Result<Option<OrganizationRow>> {
    query_organization(
        conn,
        "name = ?1 AND subdomain IS NULL AND deleted_at IS NULL",
        name,
    )
}

pub fn list_contacts(conn: &Connection, organization_id: Uuid) -> Result<Vec<ContactRow>> {
    let mut stmt = conn
        .prepare(
            "SELECT id, organization_id, first_name, last_name, email, title, is_primary
             FROM contacts WHERE organization_id = ?1 AND deleted_at IS NULL
             ORDER BY created_at, id",
        )
        .map_err(storage)?;
    let raw = stmt
        .query_map(params![id_str(organization_id)], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, Option<String>>(1)?,
                row.get(2)?,
                row.get(3)?,
                row.get(4)?,
                row.get(5)?,
                row.get(6)?,
            ))
        })
        .map_err(storage)?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(storage)?;

    raw.into_iter()
        .map(|(id, org, first_name, last_name, email, title, is_primary)| {
            Ok(ContactRow {
                id: parse_id(&id)?,
                organization_id: opt_id(org)?,
                first_name,
                last_name,
                email,
                title,
                is_primary,
            })
        })
        .collect()
}

pub fn list_addresses(conn: &Connection, organization_id: Uuid) -> Result<Vec<AddressRow>> {
    let mut stmt = conn
        .prepare(
            "SELECT id, organization_id, label, street1, city, state, postal_code, country, is_primary
             FROM addresses WHERE organization_id = ?1 AND deleted_at IS NULL
             ORDER BY created_at, id",
        )
        .map_err(storage)?;
    let raw = stmt
        .query_map(params![id_str(organization_id)], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, Option<String>>(1)?,
                row.get(2)?,
                row.get(3)?,
                row.get(4)?,
                row.get(5)?,
                row.get(6)?,
                row.get(7)?,
                row.get(8)?,
            ))
        })
        .map_err(storage)?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(storage)?;

    raw.into_iter()
        .map(
            |(id, org, label, street1, city, state, postal_code, country, is_primary)| {
                Ok(AddressRow {
                    id: parse_id(&id)?,
                    organization_id: opt_id(org)?,
                    label,
                    street1,
                    city,
                    state,
                    postal_code,
                    country,
                    is_primary,
                })
            },
        )
        .collect()
}

fn list_phones_in(conn: &Connection, table: &str, owner_column: &str, owner: Uuid) -> Result<Vec<PhoneRow>> {
    let sql = format!(
        "SELECT id, {owner}, label, number, extension, is_primary
         FROM {table} WHERE {owner} = ?1 AND deleted_at IS NULL
         ORDER BY created_at, id",
        owner = owner_column,
        table = table,
    );
    let mut stmt = conn.prepare(&sql).map_err(storage)?;
    let raw = stmt
        .query_map(params![id_str(owner)], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, Option<String>>(1)?,
                row.get(2)?,
                row.get(3)?,
                row.get(4)?,
                row.get(5)?,
            ))
        })
        .map_err(storage)?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(storage)?;

    raw.into_iter()
        .map(|(id, owner_id, label, number, extension, is_primary)| {
            Ok(PhoneRow {
                id: parse_id(&id)?,
                owner_id: opt_id(owner_id)?,
                label,
                number,
                extension,
                is_primary,
            })
        })
        .collect()
}

pub fn list_phones(conn: &Connection, organization_id: Uuid) -> Result<Vec<PhoneRow>> {
    list_phones_in(conn, "phones", "organization_id", organization_id)
}

pub fn list_user_phones(conn: &Connection, user_id: Uuid) -> Result<Vec<PhoneRow>> {
    list_phones_in(conn, "user_phones", "user_id", user_id)
}

/// Right-hand ids linked to `left_id` through `kind`.
pub fn list_links(conn: &Connection, kind: LinkKind, left_id: Uuid) -> Result<Vec<Uuid>> {
    let (left, right) = kind.columns();
    let sql = format!(
        "SELECT {right} FROM {table} WHERE {left} = ?1 ORDER BY created_at, {right}",
        right = right,
        table = kind.table(),
        left = left,
    );
    let mut stmt = conn.prepare(&sql).map_err(storage)?;
    let raw = stmt
        .query_map(params![id_str(left_id)], |row| row.get::<_, String>(0))
        .map_err(storage)?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(storage)?;
    raw.iter().map(|id| parse_id(id)).collect()
}

pub fn list_invitations(conn: &Connection, organization_id: Uuid) -> Result<Vec<InvitationRow>> {
    let mut stmt = conn
        .prepare(
            "SELECT id, organization_id, email, role, token, status, delivery_id, last_error, expires_at
             FROM invitations WHERE organization_id = ?1
             ORDER BY created_at, id",
        )
        .map_err(storage)?;
    let raw = stmt
        .query_map(params![id_str(organization_id)], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get(2)?,
                row.get(3)?,
                row.get(4)?,
                row.get(5)?,
                row.get(6)?,
                row.get(7)?,
                row.get(8)?,
            ))
        })
        .map_err(storage)?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(storage)?;

    raw.into_iter()
        .map(
            |(id, org, email, role, token, status, delivery_id, last_error, expires_at)| {
                Ok(InvitationRow {
                    id: parse_id(&id)?,
                    organization_id: parse_id(&org)?,
                    email,
                    role,
                    token,
                    status,
                    delivery_id,
                    last_error,
                    expires_at,
                })
            },
        )
        .collect()
}

pub fn bootstrap_status(conn: &Connection, organization_id: Uuid) -> Result<Option<BootstrapStatus>> {
    let raw = conn
        .query_row(
            "SELECT organization_id, status, correlation_id, failure_stage, error, updated_at
             FROM organization_bootstrap WHERE organization_id = ?1",
            params![id_str(organization_id)],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get(3)?,
                    row.get(4)?,
                    row.get(5)?,
                ))
            },
        )
        .optional()
        .map_err(storage)?;

    raw.map(|(org, status, correlation, failure_stage, error, updated_at)| {
        Ok(BootstrapStatus {
            organization_id: parse_id(&org)?,
            status,
            correlation_id: parse_id(&correlation)?,
            failure_stage,
            error,
            updated_at,
        })
    })
    .transpose()
}

/// Organizations whose bootstrap currently has `status`, oldest first
pub fn list_bootstraps_with_status(conn: &Connection, status: &str) -> Result<Vec<Uuid>> {
    let mut stmt = conn
        .prepare(
            "SELECT organization_id FROM organization_bootstrap
             WHERE status = ?1 ORDER BY updated_at, organization_id",
        )
        .map_err(storage)?;
    let raw = stmt
        .query_map(params![status], |row| row.get::<_, String>(0))
        .map_err(storage)?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(storage)?;
    raw.iter().map(|id| parse_id(id)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::init_schema;

    fn insert_org(conn: &Connection, id: Uuid, name: &str, subdomain: Option<&str>, deleted: bool) {
        conn.execute(
            "INSERT INTO organizations (id, name, org_type, subdomain, subdomain_status, created_at, updated_at, deleted_at)
             VALUES (?1, ?2, 'provider', ?3, 'pending', '2026-01-01T00:00:00.000000Z', '2026-01-01T00:00:00.000000Z', ?4)",
            params![
                id.to_string(),
                name,
                subdomain,
                if deleted { Some("2026-01-02T00:00:00.000000Z") } else { None },
            ],
        )
        .unwrap();
    }

    #[test]
    fn natural_keys_skip_deleted_rows() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        let (gone, live) = (Uuid::new_v4(), Uuid::new_v4());
        insert_org(&conn, gone, "Acme", Some("acme"), true);
        assert!(find_live_organization_by_subdomain(&conn, "acme").unwrap().is_none());

        insert_org(&conn, live, "Acme", Some("acme"), false);
        let found = find_live_organization_by_subdomain(&conn, "acme").unwrap().unwrap();
        assert_eq!(found.id, live);

        assert!(get_organization(&conn, gone).unwrap().unwrap().is_deleted());
    }

    #[test]
    fn name_key_only_matches_subdomainless_rows() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        insert_org(&conn, Uuid::new_v4(), "Acme", Some("acme"), false);
        assert!(find_live_organization_by_name_without_subdomain(&conn, "Acme")
            .unwrap()
            .is_none());

        let family = Uuid::new_v4();
        insert_org(&conn, family, "Acme", None, false);
        assert_eq!(
            find_live_organization_by_name_without_subdomain(&conn, "Acme")
                .unwrap()
                .map(|o| o.id),
            Some(family)
        );
    }

    #[test]
    fn bootstraps_are_listed_by_status_oldest_first() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        let (late, early, done) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        for (id, status, at) in [
            (late, "initiated", "2026-01-03T00:00:00.000000Z"),
            (early, "initiated", "2026-01-01T00:00:00.000000Z"),
            (done, "completed", "2026-01-02T00:00:00.000000Z"),
        ] {
            conn.execute(
                "INSERT INTO organization_bootstrap (organization_id, status, correlation_id, updated_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![id.to_string(), status, Uuid::new_v4().to_string(), at],
            )
            .unwrap();
        }

        assert_eq!(list_bootstraps_with_status(&conn, "initiated").unwrap(), vec![early, late]);
        assert_eq!(list_bootstraps_with_status(&conn, "completed").unwrap(), vec![done]);
        assert!(list_bootstraps_with_status(&conn, "failed").unwrap().is_empty());
    }
}
