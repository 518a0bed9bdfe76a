use crate::storage;
use rusqlite::Connection;
use tenantry_core::Result;

/// Fact log. `rowid` order is append order and drives replay.
const FACT_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS facts (
    id TEXT PRIMARY KEY,
    stream_id TEXT NOT NULL,
    stream_type TEXT NOT NULL,
    stream_version INTEGER NOT NULL CHECK (stream_version >= 1),
    fact_type TEXT NOT NULL,
    payload TEXT NOT NULL,
    metadata TEXT NOT NULL,
    created_at TEXT NOT NULL,
    processed_at TEXT,
    processing_error TEXT,
    UNIQUE (stream_id, stream_version)
);

CREATE INDEX IF NOT EXISTS idx_facts_type
    ON facts(stream_type, fact_type);

CREATE INDEX IF NOT EXISTS idx_facts_failed
    ON facts(created_at)
    WHERE processing_error IS NOT NULL;
"#;

/// Create the fact log and every projection table.
pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(FACT_SCHEMA).map_err(storage)?;
    tenantry_projection::schema::init_schema(conn)
}
