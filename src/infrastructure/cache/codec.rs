//! JSON codec shared by the remote drivers

use serde_json::Value;
use tracing::debug;

use crate::domain::DomainError;

/// Serializes a value for a text-based store
pub fn encode(value: &Value) -> Result<String, DomainError> {
    serde_json::to_string(value)
        .map_err(|e| DomainError::serialization(format!("Failed to serialize cache value: {}", e)))
}

/// Parses a stored value. Text that isn't JSON is a miss.
pub fn decode(key: &str, raw: Option<String>) -> Option<Value> {
    let raw = raw?;

    match serde_json::from_str(&raw) {
        Ok(value) => Some(value),
        Err(e) => {
            debug!(key, error = %e, "Stored value is not JSON");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_json() {
        assert_eq!(
            decode("k", Some(r#"{"fizz":true}"#.to_string())),
            Some(json!({"fizz": true}))
        );
        assert_eq!(decode("k", Some("5".to_string())), Some(json!(5)));
    }

    #[test]
    fn test_decode_missing_or_malformed() {
        assert_eq!(decode("k", None), None);
        assert_eq!(decode("k", Some("plain text".to_string())), None);
    }

    #[test]
    fn test_encode() {
        assert_eq!(encode(&json!([1, "a"])).unwrap(), r#"[1,"a"]"#);
    }
}
