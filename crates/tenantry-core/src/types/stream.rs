use crate::error::TenantryError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Aggregate kind a stream belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamType {
    Organization,
    Contact,
    Address,
    Phone,
    /// Many-to-many links between two aggregates.
    Junction,
    Invitation,
}

impl StreamType {
    pub const ALL: [StreamType; 6] = [
        StreamType::Organization,
        StreamType::Contact,
        StreamType::Address,
        StreamType::Phone,
        StreamType::Junction,
        StreamType::Invitation,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StreamType::Organization => "organization",
            StreamType::Contact => "contact",
            StreamType::Address => "address",
            StreamType::Phone => "phone",
            StreamType::Junction => "junction",
            StreamType::Invitation => "invitation",
        }
    }

    /// First segment every fact type on this stream must start with.
    pub fn fact_prefix(&self) -> &'static str {
        match self {
            StreamType::Junction => "link",
            other => other.as_str(),
        }
    }
}

impl fmt::Display for StreamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StreamType {
    type Err = TenantryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        StreamType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| TenantryError::UnknownStreamType(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_every_known_kind() {
        for kind in StreamType::ALL {
            assert_eq!(kind.as_str().parse::<StreamType>().unwrap(), kind);
        }
        assert!("tenant".parse::<StreamType>().is_err());
    }

    #[test]
    fn junction_facts_use_link_prefix() {
        assert_eq!(StreamType::Junction.fact_prefix(), "link");
        assert_eq!(StreamType::Phone.fact_prefix(), "phone");
    }

    #[test]
    fn serializes_as_snake_case() {
        let json = serde_json::to_string(&StreamType::Organization).unwrap();
        assert_eq!(json, "\"organization\"");
    }
}
