pub mod admin;
pub mod alerts;
pub mod auth;
pub mod devices;
pub mod homes;
pub mod readings;
pub mod reports;

use lambda_http::http::{header, HeaderValue, StatusCode};
use lambda_http::{Body, Request, RequestExt, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::str::FromStr;

use super::error::{ApiError, NotFoundError, ValidationError};
use super::state::AppState;
use crate::repo;
use energy_monitor::shared::domain::{AlertRule, Device, Home, TriggeredAlert};
use energy_monitor::shared::error::ApiResponse;
use energy_monitor::shared::session::SessionContext;

pub fn request_id(event: &Request) -> String {
    event.lambda_context().request_id
}

/// Serialize `data` inside the success envelope
pub fn json_response<T: Serialize>(status: u16, data: &T) -> Result<Response<Body>, ApiError> {
    let body = serde_json::to_string(&ApiResponse::ok(data))
        .map_err(|e| ApiError::Internal(format!("Failed to serialize response: {}", e)))?;

    let mut response = Response::new(Body::from(body));
    *response.status_mut() = StatusCode::from_u16(status)
        .map_err(|e| ApiError::Internal(format!("Invalid status code: {}", e)))?;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    Ok(response)
}

pub fn parse_json_body<T: DeserializeOwned>(event: &Request) -> Result<T, ApiError> {
    let parsed = match event.body() {
        Body::Empty => return Err(ValidationError::MissingBody.into()),
        Body::Text(text) if text.trim().is_empty() => {
            return Err(ValidationError::MissingBody.into())
        }
        Body::Text(text) => serde_json::from_str(text),
        Body::Binary(bytes) => serde_json::from_slice(bytes),
    };

    parsed.map_err(|e| ValidationError::InvalidBody(format!("Invalid JSON body: {}", e)).into())
}

pub fn query_param(event: &Request, name: &str) -> Option<String> {
    event
        .query_string_parameters_ref()
        .and_then(|params| params.first(name))
        .map(str::to_string)
}

/// Parse an optional query parameter, rejecting values that do not parse
pub fn parse_query_param<T: FromStr>(event: &Request, name: &str) -> Result<Option<T>, ApiError> {
    match query_param(event, name) {
        None => Ok(None),
        Some(raw) => raw.trim().parse::<T>().map(Some).map_err(|_| {
            ValidationError::InvalidQuery(format!("Invalid value for {}: {}", name, raw)).into()
        }),
    }
}

// Loaders below report resources owned by someone else as missing.

pub async fn load_owned_home(
    state: &AppState,
    session: &SessionContext,
    home_id: &str,
) -> Result<Home, ApiError> {
    repo::homes::get_home(state.client(), &state.tables().homes, home_id)
        .await?
        .filter(|home| session.owns(&home.owner_id))
        .ok_or(NotFoundError::Home.into())
}

pub async fn load_owned_device(
    state: &AppState,
    session: &SessionContext,
    device_id: &str,
) -> Result<Device, ApiError> {
    repo::devices::get_device(state.client(), &state.tables().devices, device_id)
        .await?
        .filter(|device| session.owns(&device.owner_id))
        .ok_or(NotFoundError::Device.into())
}

pub async fn load_owned_rule(
    state: &AppState,
    session: &SessionContext,
    rule_id: &str,
) -> Result<AlertRule, ApiError> {
    repo::alert_rules::get_rule(state.client(), &state.tables().alert_rules, rule_id)
        .await?
        .filter(|rule| session.owns(&rule.owner_id))
        .ok_or(NotFoundError::Rule.into())
}

pub async fn load_owned_alert(
    state: &AppState,
    session: &SessionContext,
    alert_id: &str,
) -> Result<TriggeredAlert, ApiError> {
    repo::alerts::get_alert(state.client(), &state.tables().alerts, alert_id)
        .await?
        .filter(|alert| session.owns(&alert.owner_id))
        .ok_or(NotFoundError::Alert.into())
}
