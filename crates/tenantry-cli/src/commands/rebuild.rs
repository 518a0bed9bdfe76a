//! Rebuild command implementation

use anyhow::{bail, Context, Result};
use tenantry::prelude::*;

pub fn execute(config: &PlatformConfig, force: bool) -> Result<()> {
    if !force {
        bail!("Rebuild truncates every projection table; re-run with --force to proceed");
    }

    let store = super::open_store(config)?;
    println!("Rebuilding projections from {}...", config.store.path.display());

    let report = store
        .rebuild_projections()
        .context("Projection rebuild failed")?;

    println!(
        "✓ Replayed {} fact(s): {} failed, {} without handler",
        report.replayed, report.failed, report.unhandled
    );
    if report.failed > 0 {
        println!("Run 'tenantry failed' to inspect the failures");
    }
    Ok(())
}
