//! Optional metrics instrumentation.
//!
//! With the `observe` feature enabled, the fact store and the orchestrator
//! emit counters and histograms through the [`metrics`] crate. The embedding
//! application installs a recorder to collect them.
//!
//! Without the feature every function here compiles to nothing.

/// Record a committed append transaction.
///
/// - `tenantry.append.commits_total` – counter
/// - `tenantry.append.facts_total` – counter, root plus follow-up facts
/// - `tenantry.append.duration_seconds` – histogram
#[inline]
pub fn record_append(duration: std::time::Duration, facts: u64) {
    #[cfg(feature = "observe")]
    {
        metrics::counter!("tenantry.append.commits_total").increment(1);
        metrics::counter!("tenantry.append.facts_total").increment(facts);
        metrics::histogram!("tenantry.append.duration_seconds").record(duration.as_secs_f64());
    }
    #[cfg(not(feature = "observe"))]
    {
        let _ = (duration, facts);
    }
}

/// Record a projection handler failure.
///
/// - `tenantry.dispatch.failures_total` – counter with `fact_type` label
#[inline]
pub fn record_handler_failure(fact_type: &str) {
    #[cfg(feature = "observe")]
    {
        metrics::counter!("tenantry.dispatch.failures_total", "fact_type" => fact_type.to_string())
            .increment(1);
    }
    #[cfg(not(feature = "observe"))]
    {
        let _ = fact_type;
    }
}

/// Record one provision-and-verify attempt.
///
/// - `tenantry.dns.attempts_total` – counter with `outcome` label (`verified` / `failed`)
#[inline]
pub fn record_dns_attempt(verified: bool) {
    #[cfg(feature = "observe")]
    {
        let outcome = if verified { "verified" } else { "failed" };
        metrics::counter!("tenantry.dns.attempts_total", "outcome" => outcome).increment(1);
    }
    #[cfg(not(feature = "observe"))]
    {
        let _ = verified;
    }
}

/// Record a provisioning run reaching a terminal state.
///
/// - `tenantry.saga.runs_total` – counter with `outcome` label
#[inline]
pub fn record_saga_outcome(outcome: &'static str) {
    #[cfg(feature = "observe")]
    {
        metrics::counter!("tenantry.saga.runs_total", "outcome" => outcome).increment(1);
    }
    #[cfg(not(feature = "observe"))]
    {
        let _ = outcome;
    }
}
