use anyhow::{Context, Result};
use tenantry::prelude::*;
use tenantry::SagaRunStore;

pub fn execute(config: &PlatformConfig) -> Result<()> {
    let runs = SagaRunStore::open(&config.store.path)
        .context("Failed to open saga run table")?
        .list()
        .context("Failed to list saga runs")?;

    if runs.is_empty() {
        println!("No provisioning runs in flight");
        return Ok(());
    }

    for run in runs {
        println!(
            "{}  {:<30} dns_attempts={} cancel_requested={} updated={}",
            run.organization_id,
            run.step,
            run.dns_attempts,
            run.cancel_requested,
            run.updated_at.to_rfc3339()
        );
    }
    Ok(())
}
