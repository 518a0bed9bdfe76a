//! Projection table definitions.
//!
//! Rows are soft-deleted through `deleted_at`; link tables only carry their
//! uniqueness key, the fact log is their audit trail.

use crate::payloads::LinkKind;
use crate::storage;
use rusqlite::Connection;
use tenantry_core::Result;

const PROJECTION_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS organizations (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    display_name TEXT,
    org_type TEXT NOT NULL,
    partner_type TEXT,
    subdomain TEXT,
    subdomain_status TEXT NOT NULL,
    dns_record_id TEXT,
    timezone TEXT NOT NULL DEFAULT 'UTC',
    is_active INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    activated_at TEXT,
    deleted_at TEXT
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_organizations_live_subdomain
    ON organizations(subdomain)
    WHERE subdomain IS NOT NULL AND deleted_at IS NULL;

CREATE INDEX IF NOT EXISTS idx_organizations_name
    ON organizations(name);

CREATE TABLE IF NOT EXISTS organization_bootstrap (
    organization_id TEXT PRIMARY KEY,
    status TEXT NOT NULL,
    correlation_id TEXT NOT NULL,
    failure_stage TEXT,
    error TEXT,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS contacts (
    id TEXT PRIMARY KEY,
    organization_id TEXT,
    first_name TEXT NOT NULL,
    last_name TEXT NOT NULL,
    email TEXT NOT NULL,
    title TEXT,
    label TEXT,
    is_primary INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    deleted_at TEXT
);

CREATE INDEX IF NOT EXISTS idx_contacts_organization
    ON contacts(organization_id);

CREATE TABLE IF NOT EXISTS addresses (
    id TEXT PRIMARY KEY,
    organization_id TEXT,
    label TEXT,
    street1 TEXT NOT NULL,
    street2 TEXT,
    city TEXT NOT NULL,
    state TEXT NOT NULL,
    postal_code TEXT NOT NULL,
    country TEXT NOT NULL,
    is_primary INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    deleted_at TEXT
);

CREATE INDEX IF NOT EXISTS idx_addresses_organization
    ON addresses(organization_id);

CREATE TABLE IF NOT EXISTS phones (
    id TEXT PRIMARY KEY,
    organization_id TEXT,
    label TEXT,
    number TEXT NOT NULL,
    extension TEXT,
    is_primary INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    deleted_at TEXT
);

CREATE INDEX IF NOT EXISTS idx_phones_organization
    ON phones(organization_id);

CREATE TABLE IF NOT EXISTS user_phones (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    label TEXT,
    number TEXT NOT NULL,
    extension TEXT,
    is_primary INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    deleted_at TEXT
);

CREATE INDEX IF NOT EXISTS idx_user_phones_user
    ON user_phones(user_id);

CREATE TABLE IF NOT EXISTS invitations (
    id TEXT PRIMARY KEY,
    organization_id TEXT NOT NULL,
    email TEXT NOT NULL,
    first_name TEXT NOT NULL,
    last_name TEXT NOT NULL,
    role TEXT NOT NULL,
    token TEXT NOT NULL UNIQUE,
    status TEXT NOT NULL,
    delivery_id TEXT,
    last_error TEXT,
    expires_at TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_invitations_organization
    ON invitations(organization_id);
"#;

/// Tables written only by handlers, in the order `truncate` clears them.
pub const PROJECTION_TABLES: [&str; 12] = [
    "organization_contacts",
    "organization_addresses",
    "organization_phones",
    "contact_phones",
    "contact_addresses",
    "invitations",
    "user_phones",
    "phones",
    "addresses",
    "contacts",
    "organization_bootstrap",
    "organizations",
];

/// Create every projection table if missing.
pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(PROJECTION_SCHEMA).map_err(storage)?;

    for kind in LinkKind::ALL {
        let (left, right) = kind.columns();
        let sql = format!(
            "CREATE TABLE IF NOT EXISTS {table} (
                {left} TEXT NOT NULL,
                {right} TEXT NOT NULL,
                created_at TEXT NOT NULL,
                PRIMARY KEY ({left}, {right})
            );
            CREATE INDEX IF NOT EXISTS idx_{table}_{right} ON {table}({right});",
            table = kind.table(),
            left = left,
            right = right,
        );
        conn.execute_batch(&sql).map_err(storage)?;
    }

    Ok(())
}

/// Remove every projection row ahead of a full replay.
pub fn truncate(conn: &Connection) -> Result<()> {
    for table in PROJECTION_TABLES {
        conn.execute(&format!("DELETE FROM {}", table), [])
            .map_err(storage)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_is_reentrant() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        init_schema(&conn).unwrap();

        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'contact_phones'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn live_subdomains_are_unique() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        let insert = "INSERT INTO organizations (id, name, org_type, subdomain, subdomain_status, created_at, updated_at, deleted_at)
                      VALUES (?1, 'Acme', 'provider', 'acme', 'pending', 'now', 'now', ?2)";

        conn.execute(insert, rusqlite::params!["a", "yesterday"]).unwrap();
        conn.execute(insert, rusqlite::params!["b", Option::<String>::None]).unwrap();
        assert!(conn
            .execute(insert, rusqlite::params!["c", Option::<String>::None])
            .is_err());
    }
}
