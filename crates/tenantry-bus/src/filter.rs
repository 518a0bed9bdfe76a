use std::collections::BTreeSet;

/// Which fact types the bridge forwards
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FactFilter {
    /// Forward every fact
    All,

    /// Forward fact types starting with a prefix
    Prefix(String),

    /// Forward an explicit set of fact types
    Exact(BTreeSet<String>),

    /// Forward when either side matches
    Or(Box<FactFilter>, Box<FactFilter>),
}

impl FactFilter {
    pub fn prefix(prefix: impl Into<String>) -> Self {
        FactFilter::Prefix(prefix.into())
    }

    pub fn allow_list<I, S>(fact_types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        FactFilter::Exact(fact_types.into_iter().map(Into::into).collect())
    }

    pub fn or(self, other: FactFilter) -> Self {
        FactFilter::Or(Box::new(self), Box::new(other))
    }

    pub fn matches(&self, fact_type: &str) -> bool {
        match self {
            FactFilter::All => true,
            FactFilter::Prefix(prefix) => fact_type.starts_with(prefix.as_str()),
            FactFilter::Exact(types) => types.contains(fact_type),
            FactFilter::Or(a, b) => a.matches(fact_type) || b.matches(fact_type),
        }
    }
}
