//! Failed-fact inspection, retry and stream dumps

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tenantry::prelude::*;
use tenantry::FailedFactFilter;

pub fn list_failed(
    config: &PlatformConfig,
    operator: &ActorContext,
    fact_type: Option<String>,
    stream_type: Option<String>,
    since: Option<DateTime<Utc>>,
    limit: usize,
) -> Result<()> {
    let surface = super::open_operator(config)?;

    let mut filter = FailedFactFilter::default().with_limit(limit);
    if let Some(fact_type) = fact_type {
        filter = filter.with_fact_type(fact_type);
    }
    if let Some(stream_type) = stream_type {
        let stream_type: StreamType = stream_type.parse().context("Invalid stream type")?;
        filter = filter.with_stream_type(stream_type);
    }
    if let Some(since) = since {
        filter = filter.since(since);
    }

    let failed = surface
        .list_failed(operator, &filter)
        .context("Failed to list failed facts")?;

    if failed.is_empty() {
        println!("✓ No failed facts");
        return Ok(());
    }

    println!("{} failed fact(s)", failed.len());
    println!("{}", "=".repeat(60));
    for fact in failed {
        println!(
            "{}  {}  {} v{}",
            fact.id, fact.fact_type, fact.stream_id, fact.stream_version
        );
        println!("    {}", fact.processing_error.as_deref().unwrap_or("-"));
    }
    Ok(())
}

pub fn retry(config: &PlatformConfig, operator: &ActorContext, fact_id: Uuid) -> Result<()> {
    let surface = super::open_operator(config)?;
    let fact = surface
        .retry(operator, fact_id)
        .with_context(|| format!("Failed to retry fact {}", fact_id))?;

    match &fact.processing_error {
        Some(error) => println!("✗ Fact {} failed again: {}", fact.id, error),
        None if fact.is_processed() => println!("✓ Fact {} processed", fact.id),
        None => println!("Fact {} has no handler; left unprocessed", fact.id),
    }
    Ok(())
}

pub fn stats(config: &PlatformConfig, operator: &ActorContext) -> Result<()> {
    let surface = super::open_operator(config)?;
    let stats = surface
        .failure_stats(operator)
        .context("Failed to compute failure statistics")?;

    println!("\nFailure Statistics");
    println!("{}", "=".repeat(60));
    println!("Total: {}", stats.total);
    println!("Last 24h: {}", stats.last_24h);

    println!("\nBy fact type:");
    for (fact_type, count) in &stats.by_fact_type {
        println!("  {:<48} {}", fact_type, count);
    }
    println!("\nBy stream type:");
    for (stream_type, count) in &stats.by_stream_type {
        println!("  {:<48} {}", stream_type, count);
    }

    if !stats.recent.is_empty() {
        println!("\nMost recent:");
        for fact in &stats.recent {
            println!("  {}  {}  {}", fact.created_at.to_rfc3339(), fact.fact_type, fact.id);
        }
    }
    Ok(())
}

pub fn stream(config: &PlatformConfig, stream_id: Uuid) -> Result<()> {
    let store = super::open_store(config)?;
    let facts = store.stream(stream_id).context("Failed to read stream")?;
    tracing::debug!(stream_id = %stream_id, facts = facts.len(), "Read stream");

    for fact in facts {
        println!("{}", serde_json::to_string(&fact)?);
    }
    Ok(())
}
