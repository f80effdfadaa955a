use serde::{Deserialize, Serialize};

/// Success envelope wrapping every API payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: T,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data,
        }
    }
}

/// Standard error response payload
/// Contains stable machine-readable error code, human-readable message, and request ID
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Always false
    pub success: bool,

    /// Stable machine-readable error code (e.g., "INVALID_TARIFF", "UNAUTHORIZED")
    pub error: String,

    pub message: String,

    /// Request ID for tracing and debugging
    pub request_id: String,
}

impl ErrorResponse {
    pub fn new(
        error: impl Into<String>,
        message: impl Into<String>,
        request_id: impl Into<String>,
    ) -> Self {
        Self {
            success: false,
            error: error.into(),
            message: message.into(),
            request_id: request_id.into(),
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Common error codes used across the API
pub mod error_codes {
    // Authentication errors
    pub const MISSING_TOKEN: &str = "MISSING_TOKEN";
    pub const INVALID_TOKEN: &str = "INVALID_TOKEN";
    pub const SESSION_EXPIRED: &str = "SESSION_EXPIRED";
    pub const INVALID_CREDENTIALS: &str = "INVALID_CREDENTIALS";
    pub const UNAUTHORIZED: &str = "UNAUTHORIZED";

    // Validation errors
    pub const MISSING_FIELD: &str = "MISSING_FIELD";
    pub const INVALID_FORMAT: &str = "INVALID_FORMAT";
    pub const INVALID_VALUE: &str = "INVALID_VALUE";
    pub const INVALID_TARIFF: &str = "INVALID_TARIFF";
    pub const INVALID_RULE: &str = "INVALID_RULE";
    pub const INVALID_CURSOR: &str = "INVALID_CURSOR";

    // Not found errors
    pub const HOME_NOT_FOUND: &str = "HOME_NOT_FOUND";
    pub const DEVICE_NOT_FOUND: &str = "DEVICE_NOT_FOUND";
    pub const TEMPLATE_NOT_FOUND: &str = "TEMPLATE_NOT_FOUND";
    pub const RULE_NOT_FOUND: &str = "RULE_NOT_FOUND";
    pub const ALERT_NOT_FOUND: &str = "ALERT_NOT_FOUND";
    pub const ROUTE_NOT_FOUND: &str = "NOT_FOUND";

    // Conflict errors
    pub const EMAIL_TAKEN: &str = "EMAIL_TAKEN";
    pub const DEVICE_CHANGED: &str = "DEVICE_CHANGED";

    // Database errors
    pub const DATABASE_ERROR: &str = "DATABASE_ERROR";

    // Internal errors
    pub const INTERNAL_ERROR: &str = "INTERNAL_ERROR";
}
