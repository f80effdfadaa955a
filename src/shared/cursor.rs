use std::collections::BTreeMap;

use base64::{engine::general_purpose, Engine as _};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Opaque pagination token.
///
/// Carries the string key attributes of the last item returned by a query so
/// the next page can resume after it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageToken {
    pub keys: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Error)]
#[error("Cursor error: {message}")]
pub struct PageTokenError {
    pub message: String,
}

impl PageTokenError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl PageToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_key(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.keys.insert(name.into(), value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.keys.get(name).map(String::as_str)
    }

    /// Encode to URL-safe base64 JSON
    pub fn encode(&self) -> Result<String, PageTokenError> {
        let json = serde_json::to_string(self)
            .map_err(|e| PageTokenError::new(format!("Failed to serialize cursor: {}", e)))?;
        Ok(general_purpose::URL_SAFE_NO_PAD.encode(json.as_bytes()))
    }

    pub fn decode(token: &str) -> Result<Self, PageTokenError> {
        let bytes = general_purpose::URL_SAFE_NO_PAD
            .decode(token)
            .map_err(|e| PageTokenError::new(format!("Failed to decode base64: {}", e)))?;

        let json = String::from_utf8(bytes)
            .map_err(|e| PageTokenError::new(format!("Failed to decode UTF-8: {}", e)))?;

        let token: PageToken = serde_json::from_str(&json)
            .map_err(|e| PageTokenError::new(format!("Failed to deserialize cursor: {}", e)))?;

        if token.keys.is_empty() {
            return Err(PageTokenError::new("Cursor carries no keys"));
        }
        Ok(token)
    }

    /// Decode a token and check it carries exactly the expected key names
    pub fn decode_with_keys(token: &str, expected: &[&str]) -> Result<Self, PageTokenError> {
        let decoded = Self::decode(token)?;
        let matches = decoded.keys.len() == expected.len()
            && expected.iter().all(|name| decoded.keys.contains_key(*name));
        if !matches {
            return Err(PageTokenError::new("Cursor does not belong to this listing"));
        }
        Ok(decoded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_readings_cursor_preserves_sort_key() {
        let token = PageToken::new()
            .with_key("device_id", "dev_42")
            .with_key("ts_reading", "1705312800000#rdg_7");

        let encoded = token.encode().unwrap();
        assert!(!encoded.contains('+') && !encoded.contains('/'));

        let decoded = PageToken::decode_with_keys(&encoded, &["device_id", "ts_reading"]).unwrap();
        assert_eq!(decoded.get("ts_reading"), Some("1705312800000#rdg_7"));
    }

    #[test]
    fn test_decode_invalid_cursor() {
        assert!(PageToken::decode("not-valid-base64!@#").is_err());

        let invalid_json = general_purpose::URL_SAFE_NO_PAD.encode(b"not json");
        assert!(PageToken::decode(&invalid_json).is_err());

        let empty = general_purpose::URL_SAFE_NO_PAD.encode(br#"{"keys":{}}"#);
        assert!(PageToken::decode(&empty).is_err());
    }

    #[test]
    fn test_cursor_from_other_listing_rejected() {
        let encoded = PageToken::new()
            .with_key("home_id", "home_1")
            .encode()
            .unwrap();
        assert!(PageToken::decode_with_keys(&encoded, &["device_id", "ts_reading"]).is_err());
    }
}
