use lambda_http::Request;
use tracing::warn;

use super::error::{ApiError, AuthError};
use super::state::AppState;
use crate::repo;
use energy_monitor::shared::session::{constant_time_compare, hash_session_token, SessionContext};

/// Extract the token from an `Authorization: Bearer <token>` header
pub fn extract_bearer_token(event: &Request) -> Result<&str, AuthError> {
    let auth_header = event
        .headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .ok_or(AuthError::MissingToken)?;

    let token = auth_header
        .strip_prefix("Bearer ")
        .ok_or(AuthError::InvalidFormat)?
        .trim();

    if token.is_empty() {
        return Err(AuthError::InvalidToken);
    }

    Ok(token)
}

/// Resolve the caller's session from the bearer token.
///
/// The token is hashed with the configured pepper and looked up; unknown
/// tokens are rejected, and so are expired sessions.
pub async fn authenticate(event: &Request, state: &AppState) -> Result<SessionContext, ApiError> {
    let token = extract_bearer_token(event)?;
    let token_hash = hash_session_token(token, &state.config.session_pepper);

    let session = repo::sessions::get_session(state.client(), &state.tables().sessions, &token_hash)
        .await?
        .ok_or(AuthError::InvalidToken)?;

    SessionContext::from_session(&session, state.clock.now()).map_err(|e| {
        warn!(user_id = %session.user_id, "Rejected expired session");
        ApiError::from(e)
    })
}

/// Hash of the bearer token on the current request, used by logout
pub fn current_token_hash(event: &Request, state: &AppState) -> Result<String, AuthError> {
    let token = extract_bearer_token(event)?;
    Ok(hash_session_token(token, &state.config.session_pepper))
}

/// Validate the bearer token against the configured admin token
pub fn validate_admin_token(event: &Request, state: &AppState) -> Result<(), AuthError> {
    let token = extract_bearer_token(event)?;
    let expected = &state.config.admin_token;

    if expected.is_empty() {
        return Err(AuthError::ConfigError);
    }

    if !constant_time_compare(token, expected) {
        return Err(AuthError::InvalidToken);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api_state_for_test;
    use lambda_http::{http::Method, Body};

    fn create_test_request(auth_header: Option<&str>) -> Request {
        let mut builder = lambda_http::http::Request::builder()
            .method(Method::GET)
            .uri("/admin/users");

        if let Some(auth) = auth_header {
            builder = builder.header("authorization", auth);
        }

        builder.body(Body::Empty).unwrap()
    }

    #[test]
    fn test_extract_bearer_token() {
        let request = create_test_request(Some("Bearer abc123"));
        assert_eq!(extract_bearer_token(&request).unwrap(), "abc123");
    }

    #[test]
    fn test_extract_bearer_token_missing_header() {
        let request = create_test_request(None);
        assert!(matches!(
            extract_bearer_token(&request),
            Err(AuthError::MissingToken)
        ));
    }

    #[test]
    fn test_extract_bearer_token_wrong_scheme() {
        let request = create_test_request(Some("Basic dXNlcjpwYXNz"));
        assert!(matches!(
            extract_bearer_token(&request),
            Err(AuthError::InvalidFormat)
        ));
    }

    #[test]
    fn test_extract_bearer_token_empty() {
        let request = create_test_request(Some("Bearer   "));
        assert!(matches!(
            extract_bearer_token(&request),
            Err(AuthError::InvalidToken)
        ));
    }

    #[tokio::test]
    async fn test_validate_admin_token() {
        let state = api_state_for_test();

        let ok = create_test_request(Some("Bearer test-admin-token"));
        assert!(validate_admin_token(&ok, &state).is_ok());

        let wrong = create_test_request(Some("Bearer test-admin-tokeN"));
        assert!(matches!(
            validate_admin_token(&wrong, &state),
            Err(AuthError::InvalidToken)
        ));
    }

    #[tokio::test]
    async fn test_validate_admin_token_unconfigured() {
        let mut state = api_state_for_test();
        state.config.admin_token = String::new();

        let request = create_test_request(Some("Bearer anything"));
        assert!(matches!(
            validate_admin_token(&request, &state),
            Err(AuthError::ConfigError)
        ));
    }

    #[tokio::test]
    async fn test_current_token_hash_uses_pepper() {
        let state = api_state_for_test();
        let request = create_test_request(Some("Bearer abc123"));

        assert_eq!(
            current_token_hash(&request, &state).unwrap(),
            hash_session_token("abc123", "test-pepper")
        );
    }
}
