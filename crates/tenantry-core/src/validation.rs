//! Append-time validation of fact inputs.

use crate::error::{Result, TenantryError};
use crate::types::StreamType;

const MAX_FACT_TYPE_LEN: usize = 128;

/// Reasons are trimmed before measuring; whitespace padding does not count.
pub fn validate_reason(reason: &str, min_len: usize, max_len: usize) -> Result<()> {
    let len = reason.trim().chars().count();
    if len < min_len {
        return Err(TenantryError::Validation(format!(
            "reason must be at least {} characters, got {}",
            min_len, len
        )));
    }
    if len > max_len {
        return Err(TenantryError::Validation(format!(
            "reason must be at most {} characters, got {}",
            max_len, len
        )));
    }
    Ok(())
}

/// Fact types are dot-namespaced (`organization.subdomain.verified`) and
/// must start with the stream's prefix.
pub fn validate_fact_type(stream_type: StreamType, fact_type: &str) -> Result<()> {
    if fact_type.is_empty() || fact_type.len() > MAX_FACT_TYPE_LEN {
        return Err(TenantryError::Validation(format!(
            "fact_type must be 1-{} characters",
            MAX_FACT_TYPE_LEN
        )));
    }

    let segments: Vec<&str> = fact_type.split('.').collect();
    if segments.len() < 2 {
        return Err(TenantryError::Validation(format!(
            "fact_type '{}' is not dot-namespaced",
            fact_type
        )));
    }

    for segment in &segments {
        let valid = !segment.is_empty()
            && segment
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
        if !valid {
            return Err(TenantryError::Validation(format!(
                "fact_type '{}' has an invalid segment '{}'",
                fact_type, segment
            )));
        }
    }

    if segments[0] != stream_type.fact_prefix() {
        return Err(TenantryError::Validation(format!(
            "fact_type '{}' does not belong to stream type '{}'",
            fact_type, stream_type
        )));
    }

    Ok(())
}

pub fn validate_version(stream_version: i64) -> Result<()> {
    if stream_version < 1 {
        return Err(TenantryError::Validation(format!(
            "stream_version must be >= 1, got {}",
            stream_version
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reason_length_is_bounded() {
        assert!(validate_reason("too short", 10, 100).is_err());
        assert!(validate_reason("   padded   ", 10, 100).is_err());
        assert!(validate_reason("Created during onboarding", 10, 100).is_ok());
        assert!(validate_reason(&"x".repeat(101), 10, 100).is_err());
    }

    #[test]
    fn fact_type_must_match_stream() {
        assert!(validate_fact_type(StreamType::Organization, "organization.created").is_ok());
        assert!(validate_fact_type(StreamType::Organization, "organization.subdomain.verified").is_ok());
        assert!(validate_fact_type(StreamType::Junction, "link.created").is_ok());
        assert!(validate_fact_type(StreamType::Contact, "organization.created").is_err());
    }

    #[test]
    fn fact_type_must_be_namespaced() {
        assert!(validate_fact_type(StreamType::Phone, "phone").is_err());
        assert!(validate_fact_type(StreamType::Phone, "phone.").is_err());
        assert!(validate_fact_type(StreamType::Phone, "phone.Created").is_err());
        assert!(validate_fact_type(StreamType::Phone, "").is_err());
    }

    #[test]
    fn versions_start_at_one() {
        assert!(validate_version(0).is_err());
        assert!(validate_version(1).is_ok());
    }
}
