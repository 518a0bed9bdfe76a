//! Durable saga runs, one row per organization being provisioned.

use crate::error::Result;
use crate::state::SagaRun;
use chrono::Utc;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use uuid::Uuid;

/// SQLite table of in-flight runs.
///
/// A row exists from the first persisted step until the run reaches a
/// terminal state, so whatever is left at start-up is work to resume.
pub struct SagaRunStore {
    conn: Mutex<Connection>,
}

impl SagaRunStore {
    /// Open (or create) the run table in the database at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS saga_runs (
                organization_id TEXT PRIMARY KEY,
                step TEXT NOT NULL,
                state TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            "#,
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Insert or replace the run's state.
    pub fn save(&self, run: &mut SagaRun) -> Result<()> {
        run.updated_at = Utc::now();
        let state = serde_json::to_string(run)?;
        self.conn.lock().execute(
            r#"
            INSERT INTO saga_runs (organization_id, step, state, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(organization_id) DO UPDATE SET
                step = excluded.step,
                state = excluded.state,
                updated_at = excluded.updated_at
            "#,
            params![
                run.organization_id.to_string(),
                run.step.as_str(),
                state,
                run.started_at.to_rfc3339(),
                run.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn load(&self, organization_id: Uuid) -> Result<Option<SagaRun>> {
        let state: Option<String> = self
            .conn
            .lock()
            .query_row(
                "SELECT state FROM saga_runs WHERE organization_id = ?1",
                params![organization_id.to_string()],
                |row| row.get(0),
            )
            .optional()?;

        Ok(match state {
            Some(raw) => Some(serde_json::from_str(&raw)?),
            None => None,
        })
    }

    /// Remove a finished run. Returns whether a row existed.
    pub fn delete(&self, organization_id: Uuid) -> Result<bool> {
        let removed = self.conn.lock().execute(
            "DELETE FROM saga_runs WHERE organization_id = ?1",
            params![organization_id.to_string()],
        )?;
        Ok(removed > 0)
    }

    /// Every persisted run, oldest first
    pub fn list(&self) -> Result<Vec<SagaRun>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT state FROM saga_runs ORDER BY created_at, organization_id")?;
        let raw = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        raw.iter()
            .map(|state| serde_json::from_str(state).map_err(Into::into))
            .collect()
    }

    /// Set `cancel_requested` on a persisted run without touching the rest
    /// of its state. Returns whether a row existed.
    pub fn request_cancel(&self, organization_id: Uuid) -> Result<bool> {
        let changed = self.conn.lock().execute(
            "UPDATE saga_runs
             SET state = json_set(state, '$.cancel_requested', json('true')),
                 updated_at = ?2
             WHERE organization_id = ?1",
            params![organization_id.to_string(), Utc::now().to_rfc3339()],
        )?;
        Ok(changed > 0)
    }

    /// Persisted cancellation flag; false when no run is stored
    pub fn cancel_requested(&self, organization_id: Uuid) -> Result<bool> {
        let flag: Option<bool> = self
            .conn
            .lock()
            .query_row(
                "SELECT json_extract(state, '$.cancel_requested') FROM saga_runs
                 WHERE organization_id = ?1",
                params![organization_id.to_string()],
                |row| row.get::<_, Option<bool>>(0),
            )
            .optional()?
            .flatten();
        Ok(flag.unwrap_or(false))
    }

    pub fn contains(&self, organization_id: Uuid) -> Result<bool> {
        let found: Option<i64> = self
            .conn
            .lock()
            .query_row(
                "SELECT 1 FROM saga_runs WHERE organization_id = ?1",
                params![organization_id.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::{OrganizationSpec, ProvisioningRequest};
    use crate::state::SagaStep;
    use tempfile::tempdir;
    use tenantry_core::ActorContext;
    use tenantry_projection::{Classification, OrganizationType};

    fn sample_run() -> SagaRun {
        let request = ProvisioningRequest::new(OrganizationSpec {
            name: "Acme".into(),
            display_name: None,
            classification: Classification::new(OrganizationType::Provider),
            subdomain: Some("acme".into()),
            timezone: "UTC".into(),
        });
        SagaRun::new(Uuid::new_v4(), ActorContext::new(Uuid::new_v4(), Uuid::new_v4()), request)
    }

    #[test]
    fn save_load_and_delete() {
        let store = SagaRunStore::open_in_memory().unwrap();
        let mut run = sample_run();
        store.save(&mut run).unwrap();

        run.step = SagaStep::VerifyingExternalRecord;
        run.dns_attempts = 2;
        store.save(&mut run).unwrap();

        let loaded = store.load(run.organization_id).unwrap().unwrap();
        assert_eq!(loaded.step, SagaStep::VerifyingExternalRecord);
        assert_eq!(loaded.dns_attempts, 2);
        assert_eq!(store.list().unwrap().len(), 1);

        assert!(store.delete(run.organization_id).unwrap());
        assert!(!store.delete(run.organization_id).unwrap());
        assert!(store.load(run.organization_id).unwrap().is_none());
    }

    #[test]
    fn cancel_flag_leaves_newer_state_intact() {
        let store = SagaRunStore::open_in_memory().unwrap();
        let mut stale = sample_run();
        store.save(&mut stale).unwrap();

        // A live driver advances the run after the stale copy was taken
        let mut live = stale.clone();
        live.step = SagaStep::ProvisioningExternalRecord;
        live.ledger.organization_created = true;
        live.ledger.contacts_created = 2;
        live.dns_attempts = 1;
        store.save(&mut live).unwrap();

        assert!(store.request_cancel(stale.organization_id).unwrap());
        assert!(store.cancel_requested(stale.organization_id).unwrap());

        let loaded = store.load(stale.organization_id).unwrap().unwrap();
        assert!(loaded.cancel_requested);
        assert_eq!(loaded.step, SagaStep::ProvisioningExternalRecord);
        assert_eq!(loaded.ledger.contacts_created, 2);
        assert!(loaded.ledger.organization_created);
        assert_eq!(loaded.dns_attempts, 1);

        assert!(!store.request_cancel(Uuid::new_v4()).unwrap());
        assert!(!store.cancel_requested(Uuid::new_v4()).unwrap());
    }

    #[test]
    fn runs_survive_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("runs.db");
        let mut run = sample_run();
        run.step = SagaStep::GeneratingInvitations;
        {
            let store = SagaRunStore::open(&path).unwrap();
            store.save(&mut run).unwrap();
        }

        let store = SagaRunStore::open(&path).unwrap();
        assert!(store.contains(run.organization_id).unwrap());
        let runs = store.list().unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].step, SagaStep::GeneratingInvitations);
    }
}
