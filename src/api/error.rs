use lambda_http::{Body, Response};
use thiserror::Error;

use crate::repo::StoreError;
use energy_monitor::shared::cursor::PageTokenError;
use energy_monitor::shared::error::{error_codes, ErrorResponse};
use energy_monitor::shared::reports::ReportError;
use energy_monitor::shared::session::SessionError;
use energy_monitor::shared::tariff::TariffError;
use energy_monitor::shared::validators::ValidationError as FieldError;

/// Main error type for the REST API
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Not found error: {0}")]
    NotFound(#[from] NotFoundError),

    #[error("Conflict: {0}")]
    Conflict(#[from] ConflictError),

    #[error("Database error: {0}")]
    Database(#[from] StoreError),

    #[error("Internal error: {0}")]
    Internal(String),
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Authorization header is missing")]
    MissingToken,

    #[error("Authorization header format is invalid")]
    InvalidFormat,

    #[error("Bearer token is invalid")]
    InvalidToken,

    #[error("Session has expired")]
    SessionExpired,

    #[error("Email or password is incorrect")]
    InvalidCredentials,

    #[error("Admin token configuration error")]
    ConfigError,
}

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Request body is required")]
    MissingBody,

    #[error("Invalid request body: {0}")]
    InvalidBody(String),

    #[error("{field}: {message}")]
    Field { field: String, message: String },

    #[error("Invalid tariff: {0}")]
    Tariff(#[from] TariffError),

    #[error("Invalid alert rule: {0}")]
    Rule(String),

    #[error("Invalid cursor format")]
    InvalidCursor,

    #[error("Invalid query parameter: {0}")]
    InvalidQuery(String),
}

#[derive(Debug, Error)]
pub enum NotFoundError {
    #[error("Home not found")]
    Home,

    #[error("Device not found")]
    Device,

    #[error("Device template not found")]
    Template,

    #[error("Alert rule not found")]
    Rule,

    #[error("Alert not found")]
    Alert,

    #[error("Resource not found")]
    Route,
}

#[derive(Debug, Error)]
pub enum ConflictError {
    #[error("Email is already registered")]
    EmailTaken,

    #[error("Device was changed by another request")]
    DeviceChanged,
}

impl From<FieldError> for ValidationError {
    fn from(err: FieldError) -> Self {
        ValidationError::Field {
            field: err.field,
            message: err.message,
        }
    }
}

impl From<FieldError> for ApiError {
    fn from(err: FieldError) -> Self {
        ApiError::Validation(err.into())
    }
}

impl From<TariffError> for ApiError {
    fn from(err: TariffError) -> Self {
        ApiError::Validation(ValidationError::Tariff(err))
    }
}

impl From<PageTokenError> for ApiError {
    fn from(_: PageTokenError) -> Self {
        ApiError::Validation(ValidationError::InvalidCursor)
    }
}

impl From<ReportError> for ApiError {
    fn from(err: ReportError) -> Self {
        ApiError::Validation(ValidationError::InvalidQuery(err.to_string()))
    }
}

impl From<SessionError> for ApiError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::Expired => ApiError::Auth(AuthError::SessionExpired),
            SessionError::Hashing(e) => ApiError::Internal(e.to_string()),
        }
    }
}

impl ApiError {
    /// Convert error to HTTP response with appropriate status code and error payload
    pub fn to_http_response(&self, request_id: &str) -> Response<Body> {
        let (status, error_code, message): (u16, &str, String) = match self {
            // Authentication errors
            ApiError::Auth(AuthError::MissingToken) => (
                401,
                error_codes::MISSING_TOKEN,
                String::from("Authorization header is required"),
            ),
            ApiError::Auth(AuthError::InvalidFormat) => (
                401,
                error_codes::UNAUTHORIZED,
                String::from("Authorization header format is invalid"),
            ),
            ApiError::Auth(AuthError::InvalidToken) => (
                401,
                error_codes::INVALID_TOKEN,
                String::from("Bearer token is invalid"),
            ),
            ApiError::Auth(AuthError::SessionExpired) => (
                401,
                error_codes::SESSION_EXPIRED,
                String::from("Session has expired, please log in again"),
            ),
            ApiError::Auth(AuthError::InvalidCredentials) => (
                401,
                error_codes::INVALID_CREDENTIALS,
                String::from("Email or password is incorrect"),
            ),
            ApiError::Auth(AuthError::ConfigError) => (
                500,
                error_codes::INTERNAL_ERROR,
                String::from("Admin token configuration error"),
            ),

            // Validation errors
            ApiError::Validation(ValidationError::MissingBody) => (
                400,
                error_codes::MISSING_FIELD,
                String::from("Request body is required"),
            ),
            ApiError::Validation(ValidationError::InvalidBody(msg)) => {
                (400, error_codes::INVALID_FORMAT, msg.clone())
            }
            ApiError::Validation(ValidationError::Field { field, message }) => (
                400,
                error_codes::INVALID_VALUE,
                format!("{}: {}", field, message),
            ),
            ApiError::Validation(ValidationError::Tariff(e)) => {
                (400, error_codes::INVALID_TARIFF, e.to_string())
            }
            ApiError::Validation(ValidationError::Rule(msg)) => {
                (400, error_codes::INVALID_RULE, msg.clone())
            }
            ApiError::Validation(ValidationError::InvalidCursor) => (
                400,
                error_codes::INVALID_CURSOR,
                String::from("Invalid cursor format"),
            ),
            ApiError::Validation(ValidationError::InvalidQuery(msg)) => {
                (400, error_codes::INVALID_VALUE, msg.clone())
            }

            // Not found errors
            ApiError::NotFound(NotFoundError::Home) => (
                404,
                error_codes::HOME_NOT_FOUND,
                String::from("Home not found"),
            ),
            ApiError::NotFound(NotFoundError::Device) => (
                404,
                error_codes::DEVICE_NOT_FOUND,
                String::from("Device not found"),
            ),
            ApiError::NotFound(NotFoundError::Template) => (
                404,
                error_codes::TEMPLATE_NOT_FOUND,
                String::from("Device template not found"),
            ),
            ApiError::NotFound(NotFoundError::Rule) => (
                404,
                error_codes::RULE_NOT_FOUND,
                String::from("Alert rule not found"),
            ),
            ApiError::NotFound(NotFoundError::Alert) => (
                404,
                error_codes::ALERT_NOT_FOUND,
                String::from("Alert not found"),
            ),
            ApiError::NotFound(NotFoundError::Route) => (
                404,
                error_codes::ROUTE_NOT_FOUND,
                String::from("Resource not found"),
            ),

            ApiError::Conflict(ConflictError::EmailTaken) => (
                409,
                error_codes::EMAIL_TAKEN,
                String::from("Email is already registered"),
            ),
            ApiError::Conflict(ConflictError::DeviceChanged) => (
                409,
                error_codes::DEVICE_CHANGED,
                String::from("Device was changed by another request, reload and retry"),
            ),

            // A malformed cursor surfaces from the store layer
            ApiError::Database(StoreError::InvalidCursor(_)) => (
                400,
                error_codes::INVALID_CURSOR,
                String::from("Invalid cursor format"),
            ),
            ApiError::Database(_) => (
                500,
                error_codes::DATABASE_ERROR,
                String::from("Internal database error occurred"),
            ),

            ApiError::Internal(_) => (
                500,
                error_codes::INTERNAL_ERROR,
                String::from("Internal server error occurred"),
            ),
        };

        let body = ErrorResponse::new(error_code, message, request_id)
            .to_json()
            .unwrap_or_else(|_| {
                String::from(
                    r#"{"success":false,"error":"INTERNAL_ERROR","message":"Failed to serialize error response","request_id":""}"#,
                )
            });

        let mut response = Response::new(Body::from(body));
        *response.status_mut() = lambda_http::http::StatusCode::from_u16(status)
            .unwrap_or(lambda_http::http::StatusCode::INTERNAL_SERVER_ERROR);
        response.headers_mut().insert(
            lambda_http::http::header::CONTENT_TYPE,
            lambda_http::http::HeaderValue::from_static("application/json"),
        );
        response
    }
}
