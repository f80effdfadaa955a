use chrono::{DateTime, Utc};
use lambda_http::{Body, Request, Response};
use serde::Deserialize;
use tracing::{info, warn};

use super::readings::month_usage_before;
use super::{json_response, load_owned_device, load_owned_home, parse_json_body, request_id};
use crate::error::{ApiError, ConflictError, NotFoundError};
use crate::repo;
use crate::state::AppState;
use energy_monitor::shared::activation::{apply_toggle, FinishedSession, ToggleOutcome};
use energy_monitor::shared::consumption::session_consumption;
use energy_monitor::shared::domain::{Device, DeviceTemplate, Home, Reading, ReadingSource};
use energy_monitor::shared::id_generator::IdPrefix;
use energy_monitor::shared::session::SessionContext;
use energy_monitor::shared::tariff::marginal_charge;
use energy_monitor::shared::validators::{validate_name, validate_wattage, ValidationError as FieldError};

const DEFAULT_CATEGORY: &str = "general";
const DEFAULT_DEVICE_TYPE: &str = "appliance";

#[derive(Debug, Deserialize)]
pub struct CreateDeviceRequest {
    pub home_id: String,
    pub name: Option<String>,
    pub wattage: Option<f64>,
    pub category: Option<String>,
    pub device_type: Option<String>,
    pub location: Option<String>,
    pub template_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateDeviceRequest {
    pub name: Option<String>,
    pub wattage: Option<f64>,
    pub category: Option<String>,
    pub device_type: Option<String>,
    pub location: Option<String>,
    /// Turns the device on or off
    pub is_active: Option<bool>,
}

/// Fill gaps in a create request from a catalog template.
/// Fields given explicitly win over the template.
fn apply_template(payload: &mut CreateDeviceRequest, template: &DeviceTemplate) {
    payload.name.get_or_insert_with(|| template.name.clone());
    payload.wattage.get_or_insert(template.avg_wattage);
    payload.category.get_or_insert_with(|| template.category.clone());
    payload
        .device_type
        .get_or_insert_with(|| template.device_type.clone());
}

fn build_device(
    payload: CreateDeviceRequest,
    device_id: String,
    owner_id: &str,
    now: DateTime<Utc>,
) -> Result<Device, ApiError> {
    let name = payload
        .name
        .ok_or_else(|| FieldError::new("name", "is required"))?;
    let wattage = payload
        .wattage
        .ok_or_else(|| FieldError::new("wattage", "is required"))?;

    validate_name("name", &name)?;
    validate_wattage("wattage", wattage)?;

    Ok(Device {
        device_id,
        home_id: payload.home_id,
        owner_id: owner_id.to_string(),
        name: name.trim().to_string(),
        wattage,
        category: non_empty_or(payload.category, DEFAULT_CATEGORY),
        device_type: non_empty_or(payload.device_type, DEFAULT_DEVICE_TYPE),
        location: payload
            .location
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty()),
        template_id: payload.template_id,
        is_active: false,
        last_turned_on: None,
        created_at: now,
        updated_at: now,
    })
}

fn non_empty_or(value: Option<String>, default: &str) -> String {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}

/// Reading for a finished on/off session, priced at the margin of the home's
/// usage so far this month
async fn session_reading(
    state: &AppState,
    device: &Device,
    home: &Home,
    session: &FinishedSession,
) -> Result<Reading, ApiError> {
    let prior_kwh = month_usage_before(state, &home.home_id, session.ended_at).await?;

    Ok(Reading {
        reading_id: state.ids.prefixed(IdPrefix::Reading),
        device_id: device.device_id.clone(),
        home_id: device.home_id.clone(),
        started_at: session.started_at,
        ended_at: session.ended_at,
        duration_minutes: session.duration_minutes,
        energy_kwh: session.energy_kwh,
        cost: marginal_charge(&home.tariff, prior_kwh, session.energy_kwh),
        source: ReadingSource::Session,
        recorded_at: state.clock.now(),
    })
}

/// A session guard that failed means another request toggled the device first
fn session_conflict(err: repo::StoreError) -> ApiError {
    match err {
        repo::StoreError::ConditionalCheckFailed => ConflictError::DeviceChanged.into(),
        other => other.into(),
    }
}

/// Handler for GET /devices
pub async fn list_devices(
    _event: &Request,
    state: &AppState,
    session: &SessionContext,
) -> Result<Response<Body>, ApiError> {
    let devices = repo::devices::list_devices_for_owner(
        state.client(),
        &state.tables().devices,
        &session.user_id,
    )
    .await?;

    json_response(200, &devices)
}

/// Handler for POST /devices
pub async fn create_device(
    event: &Request,
    state: &AppState,
    session: &SessionContext,
) -> Result<Response<Body>, ApiError> {
    let mut payload: CreateDeviceRequest = parse_json_body(event)?;
    let home = load_owned_home(state, session, &payload.home_id).await?;

    if let Some(template_id) = payload.template_id.clone() {
        let template = repo::templates::get_template(
            state.client(),
            &state.tables().device_templates,
            &template_id,
        )
        .await?
        .ok_or(NotFoundError::Template)?;
        apply_template(&mut payload, &template);
    }

    let device = build_device(
        payload,
        state.ids.prefixed(IdPrefix::Device),
        &home.owner_id,
        state.clock.now(),
    )?;

    repo::devices::put_device(state.client(), &state.tables().devices, &device).await?;

    info!(
        request_id = %request_id(event),
        device_id = %device.device_id,
        home_id = %device.home_id,
        wattage = device.wattage,
        "Created device"
    );

    json_response(201, &device)
}

/// Handler for GET /devices/{device_id}
pub async fn get_device(
    _event: &Request,
    state: &AppState,
    session: &SessionContext,
    device_id: &str,
) -> Result<Response<Body>, ApiError> {
    let device = load_owned_device(state, session, device_id).await?;
    json_response(200, &device)
}

/// Handler for PUT /devices/{device_id}.
///
/// Edits attributes and toggles activation through `is_active`. Turning a
/// device off stores the finished session as a reading. Changing the wattage
/// of a running device closes the session at the old rating and starts a new
/// one at the new rating.
pub async fn update_device(
    event: &Request,
    state: &AppState,
    session: &SessionContext,
    device_id: &str,
) -> Result<Response<Body>, ApiError> {
    let request_id = request_id(event);
    let payload: UpdateDeviceRequest = parse_json_body(event)?;
    let mut device = load_owned_device(state, session, device_id).await?;
    let now = state.clock.now();

    if let Some(name) = &payload.name {
        validate_name("name", name)?;
    }
    if let Some(wattage) = payload.wattage {
        validate_wattage("wattage", wattage)?;
    }

    let before = device.clone();
    let wattage_changed = payload.wattage.is_some_and(|w| w != device.wattage);
    let mut recorded: Vec<Reading> = Vec::new();

    // Close the running session at the old rating before the rating changes
    let restart = wattage_changed && device.is_active && payload.is_active != Some(false);
    let turning_off = payload.is_active == Some(false);
    if restart || turning_off {
        if let ToggleOutcome::TurnedOff(finished) = apply_toggle(&mut device, false, now) {
            let home = load_owned_home(state, session, &device.home_id).await?;
            recorded.push(session_reading(state, &device, &home, &finished).await?);
        }
    }

    if let Some(name) = payload.name {
        device.name = name.trim().to_string();
    }
    if let Some(wattage) = payload.wattage {
        device.wattage = wattage;
    }
    if let Some(category) = payload.category {
        device.category = non_empty_or(Some(category), DEFAULT_CATEGORY);
    }
    if let Some(device_type) = payload.device_type {
        device.device_type = non_empty_or(Some(device_type), DEFAULT_DEVICE_TYPE);
    }
    if let Some(location) = payload.location {
        let location = location.trim().to_string();
        device.location = (!location.is_empty()).then_some(location);
    }

    if restart || payload.is_active == Some(true) {
        apply_toggle(&mut device, true, now);
    }
    device.updated_at = now;

    if recorded.is_empty() {
        repo::devices::put_device(state.client(), &state.tables().devices, &device).await?;
    } else {
        repo::devices::close_session(
            state.client(),
            &state.tables().devices,
            &state.tables().device_readings,
            &before,
            Some(&device),
            &recorded,
        )
        .await
        .map_err(session_conflict)?;
    }

    info!(
        request_id = %request_id,
        device_id = %device.device_id,
        is_active = device.is_active,
        sessions_recorded = recorded.len(),
        "Updated device"
    );

    json_response(
        200,
        &serde_json::json!({ "device": device, "recorded_readings": recorded }),
    )
}

/// Handler for DELETE /devices/{device_id}.
///
/// A running session is stored before the device goes away, and rules scoped
/// to the device are removed.
pub async fn delete_device(
    event: &Request,
    state: &AppState,
    session: &SessionContext,
    device_id: &str,
) -> Result<Response<Body>, ApiError> {
    let request_id = request_id(event);
    let mut device = load_owned_device(state, session, device_id).await?;
    let before = device.clone();
    let now = state.clock.now();
    let client = state.client();
    let tables = state.tables();

    let mut finished_reading = None;
    if let ToggleOutcome::TurnedOff(finished) = apply_toggle(&mut device, false, now) {
        match load_owned_home(state, session, &device.home_id).await {
            Ok(home) => {
                finished_reading = Some(session_reading(state, &device, &home, &finished).await?);
            }
            Err(ApiError::NotFound(_)) => {
                warn!(request_id = %request_id, device_id = %device_id, "Home missing, session dropped");
            }
            Err(e) => return Err(e),
        }
    }

    let rules = repo::alert_rules::list_rules_for_home(client, &tables.alert_rules, &device.home_id).await?;
    let scoped: Vec<_> = rules
        .iter()
        .filter(|rule| rule.device_id.as_deref() == Some(device_id))
        .collect();
    for rule in &scoped {
        repo::alert_rules::delete_rule(client, &tables.alert_rules, &rule.rule_id).await?;
    }

    match finished_reading {
        Some(reading) => repo::devices::close_session(
            client,
            &tables.devices,
            &tables.device_readings,
            &before,
            None,
            std::slice::from_ref(&reading),
        )
        .await
        .map_err(session_conflict)?,
        None => repo::devices::delete_device(client, &tables.devices, device_id).await?,
    }

    info!(
        request_id = %request_id,
        device_id = %device_id,
        rules_removed = scoped.len(),
        "Deleted device"
    );

    json_response(200, &serde_json::json!({ "device_id": device_id, "deleted": true }))
}

/// Handler for GET /devices/{device_id}/consumption
pub async fn device_consumption(
    _event: &Request,
    state: &AppState,
    session: &SessionContext,
    device_id: &str,
) -> Result<Response<Body>, ApiError> {
    let device = load_owned_device(state, session, device_id).await?;
    let home = load_owned_home(state, session, &device.home_id).await?;
    let now = state.clock.now();

    let prior_kwh = month_usage_before(state, &home.home_id, now).await?;
    let consumption = session_consumption(&device, &home.tariff, prior_kwh, now);

    json_response(200, &consumption)
}

/// Handler for GET /devices/templates
pub async fn list_templates(
    _event: &Request,
    state: &AppState,
    _session: &SessionContext,
) -> Result<Response<Body>, ApiError> {
    let templates =
        repo::templates::list_templates(state.client(), &state.tables().device_templates).await?;
    json_response(200, &templates)
}
