use crate::types::Fact;

/// Receives facts after their append transaction has committed.
///
/// Implementations decide which fact types they forward; publication is
/// best-effort and must not fail the append.
pub trait FactPublisher: Send + Sync {
    fn publish(&self, fact: &Fact);
}
