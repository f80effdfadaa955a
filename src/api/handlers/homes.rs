use chrono::Datelike;
use lambda_http::{Body, Request, Response};
use serde::Deserialize;
use tracing::info;

use super::{json_response, load_owned_home, parse_json_body, request_id};
use crate::error::ApiError;
use crate::repo;
use crate::state::AppState;
use energy_monitor::shared::domain::{Home, Tariff};
use energy_monitor::shared::id_generator::IdPrefix;
use energy_monitor::shared::reports::build_home_summary;
use energy_monitor::shared::session::SessionContext;
use energy_monitor::shared::tariff::validate_tariff;
use energy_monitor::shared::time::month_start;
use energy_monitor::shared::validators::{validate_name, ValidationError as FieldError};

const MAX_ADDRESS_LENGTH: usize = 300;

#[derive(Debug, Deserialize)]
pub struct CreateHomeRequest {
    pub name: String,
    #[serde(default)]
    pub address: String,
    pub tariff: Tariff,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateHomeRequest {
    pub name: Option<String>,
    pub address: Option<String>,
    pub tariff: Option<Tariff>,
}

fn validate_address(address: &str) -> Result<(), ApiError> {
    if address.chars().count() > MAX_ADDRESS_LENGTH {
        return Err(FieldError::new(
            "address",
            format!("must be at most {} characters", MAX_ADDRESS_LENGTH),
        )
        .into());
    }
    Ok(())
}

/// Handler for GET /homes
pub async fn list_homes(
    _event: &Request,
    state: &AppState,
    session: &SessionContext,
) -> Result<Response<Body>, ApiError> {
    let homes =
        repo::homes::list_homes_for_owner(state.client(), &state.tables().homes, &session.user_id)
            .await?;

    json_response(200, &homes)
}

/// Handler for POST /homes
pub async fn create_home(
    event: &Request,
    state: &AppState,
    session: &SessionContext,
) -> Result<Response<Body>, ApiError> {
    let payload: CreateHomeRequest = parse_json_body(event)?;

    validate_name("name", &payload.name)?;
    validate_address(&payload.address)?;
    validate_tariff(&payload.tariff)?;

    let now = state.clock.now();
    let home = Home {
        home_id: state.ids.prefixed(IdPrefix::Home),
        owner_id: session.user_id.clone(),
        name: payload.name.trim().to_string(),
        address: payload.address.trim().to_string(),
        tariff: payload.tariff,
        created_at: now,
        updated_at: now,
    };

    repo::homes::put_home(state.client(), &state.tables().homes, &home).await?;

    info!(
        request_id = %request_id(event),
        home_id = %home.home_id,
        tariff = home.tariff.structure.as_str(),
        "Created home"
    );

    json_response(201, &home)
}

/// Handler for GET /homes/{home_id}
pub async fn get_home(
    _event: &Request,
    state: &AppState,
    session: &SessionContext,
    home_id: &str,
) -> Result<Response<Body>, ApiError> {
    let home = load_owned_home(state, session, home_id).await?;
    json_response(200, &home)
}

/// Handler for PUT /homes/{home_id}. Any subset of name, address and tariff.
pub async fn update_home(
    event: &Request,
    state: &AppState,
    session: &SessionContext,
    home_id: &str,
) -> Result<Response<Body>, ApiError> {
    let payload: UpdateHomeRequest = parse_json_body(event)?;
    let mut home = load_owned_home(state, session, home_id).await?;

    if let Some(name) = payload.name {
        validate_name("name", &name)?;
        home.name = name.trim().to_string();
    }
    if let Some(address) = payload.address {
        validate_address(&address)?;
        home.address = address.trim().to_string();
    }
    if let Some(tariff) = payload.tariff {
        validate_tariff(&tariff)?;
        home.tariff = tariff;
    }
    home.updated_at = state.clock.now();

    repo::homes::put_home(state.client(), &state.tables().homes, &home).await?;

    info!(request_id = %request_id(event), home_id = %home_id, "Updated home");

    json_response(200, &home)
}

/// Handler for DELETE /homes/{home_id}.
///
/// Removes the home's devices and alert rules with it. Stored readings and
/// triggered alerts are kept as history.
pub async fn delete_home(
    event: &Request,
    state: &AppState,
    session: &SessionContext,
    home_id: &str,
) -> Result<Response<Body>, ApiError> {
    let request_id = request_id(event);
    let home = load_owned_home(state, session, home_id).await?;
    let client = state.client();
    let tables = state.tables();

    let devices = repo::devices::list_devices_for_home(client, &tables.devices, &home.home_id).await?;
    for device in &devices {
        repo::devices::delete_device(client, &tables.devices, &device.device_id).await?;
    }

    let rules = repo::alert_rules::list_rules_for_home(client, &tables.alert_rules, &home.home_id).await?;
    for rule in &rules {
        repo::alert_rules::delete_rule(client, &tables.alert_rules, &rule.rule_id).await?;
    }

    repo::homes::delete_home(client, &tables.homes, &home.home_id).await?;

    info!(
        request_id = %request_id,
        home_id = %home_id,
        devices_removed = devices.len(),
        rules_removed = rules.len(),
        "Deleted home"
    );

    json_response(200, &serde_json::json!({ "home_id": home_id, "deleted": true }))
}

/// Handler for GET /homes/{home_id}/devices
pub async fn list_home_devices(
    _event: &Request,
    state: &AppState,
    session: &SessionContext,
    home_id: &str,
) -> Result<Response<Body>, ApiError> {
    let home = load_owned_home(state, session, home_id).await?;
    let devices =
        repo::devices::list_devices_for_home(state.client(), &state.tables().devices, &home.home_id)
            .await?;

    json_response(200, &devices)
}

/// Handler for GET /homes/{home_id}/summary: live load plus month-to-date figures
pub async fn home_summary(
    _event: &Request,
    state: &AppState,
    session: &SessionContext,
    home_id: &str,
) -> Result<Response<Body>, ApiError> {
    let home = load_owned_home(state, session, home_id).await?;
    let now = state.clock.now();
    let start = month_start(now.year(), now.month()).unwrap_or(now);

    let devices =
        repo::devices::list_devices_for_home(state.client(), &state.tables().devices, &home.home_id)
            .await?;
    let readings = repo::readings::list_home_readings(
        state.client(),
        &state.tables().device_readings,
        &home.home_id,
        start,
        now,
    )
    .await?;

    json_response(200, &build_home_summary(&home, &devices, &readings, now))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_home_requires_tariff() {
        let result: Result<CreateHomeRequest, _> =
            serde_json::from_str(r#"{"name":"Flat 4B","address":"MG Road"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_create_home_parses_slab_tariff() {
        let payload: CreateHomeRequest = serde_json::from_str(
            r#"{
                "name": "Flat 4B",
                "tariff": {
                    "structure": "slab",
                    "slabs": [
                        {"min_units": 0, "max_units": 100, "rate": 3.0},
                        {"min_units": 100, "rate": 5.5}
                    ],
                    "fixed_charges": 50
                }
            }"#,
        )
        .unwrap();

        assert!(payload.address.is_empty());
        assert_eq!(payload.tariff.slabs.len(), 2);
        assert!(validate_tariff(&payload.tariff).is_ok());
    }

    #[test]
    fn test_update_home_partial() {
        let payload: UpdateHomeRequest = serde_json::from_str(r#"{"name":"Villa"}"#).unwrap();
        assert_eq!(payload.name.as_deref(), Some("Villa"));
        assert!(payload.tariff.is_none());
    }

    #[test]
    fn test_validate_address_length() {
        assert!(validate_address("12 MG Road").is_ok());
        assert!(validate_address(&"x".repeat(MAX_ADDRESS_LENGTH + 1)).is_err());
    }
}
