use crate::storage;
use rusqlite::Connection;
use tenantry_core::{Fact, FactDraft, Result, StreamType};

/// Side effects a handler asks the store to carry out after it returns.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Effects {
    /// Facts to append (and dispatch) in the same transaction
    pub follow_ups: Vec<FactDraft>,
}

impl Effects {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn follow_up(mut self, draft: FactDraft) -> Self {
        self.follow_ups.push(draft);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.follow_ups.is_empty()
    }
}

/// Applies one kind of fact to the projection tables.
///
/// Implementations must be deterministic functions of the current projection
/// state and the fact: no I/O, no randomness, no clock reads beyond
/// `fact.created_at`. Applying the same fact twice must leave the same state
/// as applying it once.
pub trait ProjectionHandler: Send + Sync {
    fn stream_type(&self) -> StreamType;

    fn fact_type(&self) -> &str;

    fn apply(&self, conn: &Connection, fact: &Fact) -> Result<Effects>;
}

/// Signature of a plain handler function.
pub type HandlerFn = fn(&Connection, &Fact) -> Result<Effects>;

/// Handler backed by a function reference.
pub struct FnHandler {
    stream_type: StreamType,
    fact_type: &'static str,
    apply: HandlerFn,
}

impl FnHandler {
    pub fn new(stream_type: StreamType, fact_type: &'static str, apply: HandlerFn) -> Self {
        Self {
            stream_type,
            fact_type,
            apply,
        }
    }
}

impl ProjectionHandler for FnHandler {
    fn stream_type(&self) -> StreamType {
        self.stream_type
    }

    fn fact_type(&self) -> &str {
        self.fact_type
    }

    fn apply(&self, conn: &Connection, fact: &Fact) -> Result<Effects> {
        (self.apply)(conn, fact)
    }
}

/// Run a statement that must touch at least one row.
pub(crate) fn execute_expecting_row<P: rusqlite::Params>(
    conn: &Connection,
    sql: &str,
    params: P,
    missing: impl FnOnce() -> String,
) -> Result<usize> {
    let changed = conn.execute(sql, params).map_err(storage)?;
    if changed == 0 {
        return Err(tenantry_core::TenantryError::HandlerFailure(missing()));
    }
    Ok(changed)
}
