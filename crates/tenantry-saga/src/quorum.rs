//! M-of-N DNS verification across independent resolvers.

use crate::capability::DnsProvider;
use crate::error::{Result, SagaError};
use futures::stream::{FuturesUnordered, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tenantry_core::SagaConfig;

/// What one resolver said
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolverAnswer {
    Matched,
    Mismatched(String),
    Absent,
    TimedOut,
    Failed(String),
}

/// Successful verification summary
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuorumReport {
    pub agreeing: usize,
    pub required: usize,
    pub total: usize,
}

/// Queries every resolver concurrently and accepts the record once `quorum`
/// of them return the expected target.
#[derive(Clone)]
pub struct QuorumVerifier {
    dns: Arc<dyn DnsProvider>,
    resolvers: Vec<String>,
    quorum: usize,
    timeout: Duration,
}

impl QuorumVerifier {
    pub fn new(
        dns: Arc<dyn DnsProvider>,
        resolvers: Vec<String>,
        quorum: usize,
        timeout: Duration,
    ) -> Self {
        Self {
            dns,
            resolvers,
            quorum,
            timeout,
        }
    }

    pub fn from_config(dns: Arc<dyn DnsProvider>, config: &SagaConfig) -> Self {
        Self::new(
            dns,
            config.resolvers.clone(),
            config.quorum,
            config.resolver_timeout(),
        )
    }

    /// Returns as soon as quorum is reached; otherwise waits for every
    /// resolver to answer or time out and fails with `QuorumNotReached`.
    pub async fn verify(&self, name: &str, expected_target: &str) -> Result<QuorumReport> {
        let total = self.resolvers.len();
        let expected = normalize(expected_target);

        let mut pending: FuturesUnordered<_> = self
            .resolvers
            .iter()
            .map(|resolver| {
                let dns = self.dns.clone();
                let expected = expected.clone();
                async move {
                    let answer = match tokio::time::timeout(self.timeout, dns.query(resolver, name)).await {
                        Err(_) => ResolverAnswer::TimedOut,
                        Ok(Err(e)) => ResolverAnswer::Failed(e.to_string()),
                        Ok(Ok(None)) => ResolverAnswer::Absent,
                        Ok(Ok(Some(target))) if normalize(&target) == expected => ResolverAnswer::Matched,
                        Ok(Ok(Some(target))) => ResolverAnswer::Mismatched(target),
                    };
                    (resolver.as_str(), answer)
                }
            })
            .collect();

        let mut agreeing = 0;
        while let Some((resolver, answer)) = pending.next().await {
            tracing::debug!(resolver, name, answer = ?answer, "Resolver answered");
            if answer == ResolverAnswer::Matched {
                agreeing += 1;
                if agreeing >= self.quorum {
                    return Ok(QuorumReport {
                        agreeing,
                        required: self.quorum,
                        total,
                    });
                }
            }
        }

        Err(SagaError::QuorumNotReached {
            agreeing,
            required: self.quorum,
            total,
        })
    }
}

fn normalize(target: &str) -> String {
    target.trim_end_matches('.').to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{InMemoryDns, ResolverBehavior};

    const RESOLVERS: [&str; 3] = ["r1", "r2", "r3"];
    const NAME: &str = "acme.tenants.local";
    const TARGET: &str = "ingress.tenants.local";

    async fn verifier_with(behaviors: [ResolverBehavior; 3]) -> (QuorumVerifier, Arc<InMemoryDns>) {
        let dns = Arc::new(InMemoryDns::new());
        dns.create_record(NAME, TARGET).await.unwrap();
        for (resolver, behavior) in RESOLVERS.iter().zip(behaviors) {
            dns.set_resolver(*resolver, behavior);
        }
        let verifier = QuorumVerifier::new(
            dns.clone(),
            RESOLVERS.iter().map(|r| r.to_string()).collect(),
            2,
            Duration::from_secs(5),
        );
        (verifier, dns)
    }

    #[tokio::test(start_paused = true)]
    async fn any_two_of_three_suffice() {
        use ResolverBehavior::*;
        let layouts = [
            [Propagated, Propagated, Absent],
            [Propagated, Absent, Propagated],
            [Absent, Propagated, Propagated],
            [Propagated, Hang, Propagated],
            [Stale("old.example".into()), Propagated, Propagated],
        ];
        for layout in layouts {
            let (verifier, _) = verifier_with(layout.clone()).await;
            let report = verifier.verify(NAME, TARGET).await;
            assert!(report.is_ok(), "layout {:?} should verify", layout);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn fewer_than_two_fail() {
        use ResolverBehavior::*;
        let layouts = [
            [Propagated, Absent, Absent],
            [Absent, Hang, Propagated],
            [Stale("old.example".into()), Fail("servfail".into()), Propagated],
            [Absent, Absent, Absent],
        ];
        for layout in layouts {
            let (verifier, _) = verifier_with(layout.clone()).await;
            match verifier.verify(NAME, TARGET).await {
                Err(SagaError::QuorumNotReached {
                    agreeing,
                    required: 2,
                    total: 3,
                }) => assert!(agreeing < 2),
                other => panic!("layout {:?} gave {:?}", layout, other),
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn returns_before_slow_resolver_times_out() {
        use ResolverBehavior::*;
        let (verifier, _) = verifier_with([Propagated, Propagated, Hang]).await;
        let started = tokio::time::Instant::now();
        verifier.verify(NAME, TARGET).await.unwrap();
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn target_comparison_ignores_case_and_trailing_dot() {
        let (verifier, _) =
            verifier_with([ResolverBehavior::Propagated, ResolverBehavior::Propagated, ResolverBehavior::Absent])
                .await;
        let report = verifier.verify(NAME, "INGRESS.tenants.local.").await.unwrap();
        assert_eq!(report.agreeing, 2);
    }
}
