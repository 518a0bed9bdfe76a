//! Conversion between `facts` rows and [`Fact`].

use crate::storage;
use chrono::{DateTime, Utc};
use rusqlite::Row;
use tenantry_core::{Fact, Result, StreamType, TenantryError};
use uuid::Uuid;

pub const FACT_COLUMNS: &str = "id, stream_id, stream_type, stream_version, fact_type, payload,
    metadata, created_at, processed_at, processing_error";

/// Column values as stored, decoded outside the rusqlite row callback.
pub struct RawFact {
    id: String,
    stream_id: String,
    stream_type: String,
    stream_version: i64,
    fact_type: String,
    payload: String,
    metadata: String,
    created_at: String,
    processed_at: Option<String>,
    processing_error: Option<String>,
}

impl RawFact {
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            stream_id: row.get(1)?,
            stream_type: row.get(2)?,
            stream_version: row.get(3)?,
            fact_type: row.get(4)?,
            payload: row.get(5)?,
            metadata: row.get(6)?,
            created_at: row.get(7)?,
            processed_at: row.get(8)?,
            processing_error: row.get(9)?,
        })
    }

    pub fn decode(self) -> Result<Fact> {
        Ok(Fact {
            id: parse_uuid(&self.id)?,
            stream_id: parse_uuid(&self.stream_id)?,
            stream_type: self.stream_type.parse::<StreamType>()?,
            stream_version: self.stream_version,
            fact_type: self.fact_type,
            payload: serde_json::from_str(&self.payload)?,
            metadata: serde_json::from_str(&self.metadata)?,
            created_at: parse_ts(&self.created_at)?,
            processed_at: self.processed_at.as_deref().map(parse_ts).transpose()?,
            processing_error: self.processing_error,
        })
    }
}

fn parse_uuid(raw: &str) -> Result<Uuid> {
    Uuid::parse_str(raw).map_err(|e| TenantryError::Storage(format!("invalid uuid '{}': {}", raw, e)))
}

pub fn parse_ts(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| TenantryError::Storage(format!("invalid timestamp '{}': {}", raw, e)))
}

/// Collect a row iterator and decode every fact.
pub fn collect_facts<I>(rows: I) -> Result<Vec<Fact>>
where
    I: Iterator<Item = rusqlite::Result<RawFact>>,
{
    rows.collect::<std::result::Result<Vec<_>, _>>()
        .map_err(storage)?
        .into_iter()
        .map(RawFact::decode)
        .collect()
}
