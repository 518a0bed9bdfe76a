//! Operator query surface over failed facts.
//!
//! Every call is authorized against an [`AccessPolicy`] before touching the
//! store.

use crate::row::{collect_facts, RawFact, FACT_COLUMNS};
use crate::store::SqliteFactStore;
use crate::storage;
use chrono::{DateTime, Duration, Utc};
use rusqlite::params;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tenantry_core::{AccessPolicy, ActorContext, Fact, FactId, Result, StreamType};
use tenantry_projection::format_ts;

const DEFAULT_LIMIT: usize = 100;
const RECENT_FAILURES: usize = 10;

/// Filter for [`OperatorSurface::list_failed`]
#[derive(Debug, Clone)]
pub struct FailedFactFilter {
    pub fact_type: Option<String>,
    pub stream_type: Option<StreamType>,
    pub since: Option<DateTime<Utc>>,
    pub limit: usize,
}

impl Default for FailedFactFilter {
    fn default() -> Self {
        Self {
            fact_type: None,
            stream_type: None,
            since: None,
            limit: DEFAULT_LIMIT,
        }
    }
}

impl FailedFactFilter {
    pub fn with_fact_type(mut self, fact_type: impl Into<String>) -> Self {
        self.fact_type = Some(fact_type.into());
        self
    }

    pub fn with_stream_type(mut self, stream_type: StreamType) -> Self {
        self.stream_type = Some(stream_type);
        self
    }

    pub fn since(mut self, since: DateTime<Utc>) -> Self {
        self.since = Some(since);
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }
}

/// Aggregate view of projection failures
#[derive(Debug, Clone, Default, Serialize)]
pub struct FailureStats {
    pub total: u64,
    pub by_fact_type: BTreeMap<String, u64>,
    pub by_stream_type: BTreeMap<String, u64>,
    pub last_24h: u64,
    /// Most recent failures, newest first
    pub recent: Vec<Fact>,
}

pub struct OperatorSurface {
    store: Arc<SqliteFactStore>,
    policy: Arc<dyn AccessPolicy>,
}

impl OperatorSurface {
    pub fn new(store: Arc<SqliteFactStore>, policy: Arc<dyn AccessPolicy>) -> Self {
        Self { store, policy }
    }

    /// Failed facts, newest first
    pub fn list_failed(&self, actor: &ActorContext, filter: &FailedFactFilter) -> Result<Vec<Fact>> {
        self.policy.authorize(actor, "list_failed_facts")?;
        self.store.read(|conn| {
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {} FROM facts
                     WHERE processing_error IS NOT NULL
                       AND (?1 IS NULL OR fact_type = ?1)
                       AND (?2 IS NULL OR stream_type = ?2)
                       AND (?3 IS NULL OR created_at >= ?3)
                     ORDER BY created_at DESC, rowid DESC
                     LIMIT ?4",
                    FACT_COLUMNS
                ))
                .map_err(storage)?;
            let rows = stmt
                .query_map(
                    params![
                        filter.fact_type,
                        filter.stream_type.map(|s| s.as_str()),
                        filter.since.as_ref().map(format_ts),
                        filter.limit as i64,
                    ],
                    RawFact::from_row,
                )
                .map_err(storage)?;
            collect_facts(rows)
        })
    }

    /// Re-run one fact's dispatch
    pub fn retry(&self, actor: &ActorContext, fact_id: FactId) -> Result<Fact> {
        self.policy.authorize(actor, "retry_fact")?;
        tracing::info!(actor_id = %actor.actor_id, fact_id = %fact_id, "Operator retry requested");
        self.store.retry(fact_id)
    }

    pub fn failure_stats(&self, actor: &ActorContext) -> Result<FailureStats> {
        self.policy.authorize(actor, "failure_stats")?;
        let cutoff = format_ts(&(Utc::now() - Duration::hours(24)));

        let mut stats = self.store.read(|conn| {
            let mut stats = FailureStats::default();

            for (column, target) in [
                ("fact_type", &mut stats.by_fact_type),
                ("stream_type", &mut stats.by_stream_type),
            ] {
                let mut stmt = conn
                    .prepare(&format!(
                        "SELECT {col}, COUNT(*) FROM facts
                         WHERE processing_error IS NOT NULL
                         GROUP BY {col}",
                        col = column
                    ))
                    .map_err(storage)?;
                let rows = stmt
                    .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))
                    .map_err(storage)?;
                for row in rows {
                    let (key, count) = row.map_err(storage)?;
                    target.insert(key, count as u64);
                }
            }

            stats.total = stats.by_fact_type.values().sum();
            stats.last_24h = conn
                .query_row(
                    "SELECT COUNT(*) FROM facts
                     WHERE processing_error IS NOT NULL AND created_at >= ?1",
                    params![cutoff],
                    |row| row.get::<_, i64>(0),
                )
                .map_err(storage)? as u64;
            Ok(stats)
        })?;

        stats.recent = self.list_failed(
            actor,
            &FailedFactFilter::default().with_limit(RECENT_FAILURES),
        )?;
        Ok(stats)
    }
}
