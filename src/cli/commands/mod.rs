//! CLI command implementations.

pub mod classify;
pub mod init;
pub mod metrics;
pub mod rules;
pub mod submit;

use crate::domain::models::Metadata;

/// Parse a `key=value` metadata flag. Values that parse as JSON keep their
/// type (`amount=250` is a number); anything else is a string.
pub fn parse_metadata_entry(raw: &str) -> Result<(String, serde_json::Value), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got `{raw}`"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("metadata key is empty in `{raw}`"));
    }
    let value = serde_json::from_str(value)
        .unwrap_or_else(|_| serde_json::Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

pub fn metadata_from(entries: Vec<(String, serde_json::Value)>) -> Metadata {
    entries.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_metadata_keeps_json_types() {
        assert_eq!(parse_metadata_entry("amount=250").unwrap(), ("amount".to_string(), json!(250)));
        assert_eq!(parse_metadata_entry("vip=true").unwrap().1, json!(true));
    }

    #[test]
    fn test_parse_metadata_falls_back_to_string() {
        let (key, value) = parse_metadata_entry("contact=ada@example.com").unwrap();
        assert_eq!(key, "contact");
        assert_eq!(value, json!("ada@example.com"));
    }

    #[test]
    fn test_parse_metadata_rejects_missing_separator() {
        assert!(parse_metadata_entry("contact").is_err());
        assert!(parse_metadata_entry("=x").is_err());
    }
}
