use chrono::{DateTime, Datelike, Duration, Utc};
use lambda_http::{Body, Request, Response};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{
    json_response, load_owned_device, load_owned_home, parse_json_body, parse_query_param,
    query_param, request_id,
};
use crate::error::{ApiError, ValidationError};
use crate::repo;
use crate::state::AppState;
use energy_monitor::shared::consumption::{elapsed_hours, energy_kwh};
use energy_monitor::shared::domain::{Device, Reading, ReadingSource};
use energy_monitor::shared::id_generator::IdPrefix;
use energy_monitor::shared::reports::month_to_date_kwh;
use energy_monitor::shared::session::SessionContext;
use energy_monitor::shared::tariff::marginal_charge;
use energy_monitor::shared::time::{month_start, parse_timestamp};
use energy_monitor::shared::validators::{validate_non_negative, ValidationError as FieldError};

const DEFAULT_HISTORY_DAYS: i64 = 30;

#[derive(Debug, Deserialize)]
pub struct ManualReadingRequest {
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    /// Computed from the device rating when omitted
    pub energy_kwh: Option<f64>,
}

#[derive(Debug, Serialize)]
pub struct ReadingsPage {
    pub readings: Vec<Reading>,
    pub next_cursor: Option<String>,
}

/// kWh the home had already used in the calendar month of `at`, up to `at`
pub(super) async fn month_usage_before(
    state: &AppState,
    home_id: &str,
    at: DateTime<Utc>,
) -> Result<f64, ApiError> {
    let start = month_start(at.year(), at.month()).unwrap_or(at);
    let readings = repo::readings::list_home_readings(
        state.client(),
        &state.tables().device_readings,
        home_id,
        start,
        at,
    )
    .await?;

    Ok(month_to_date_kwh(&readings, at))
}

fn time_query(event: &Request, name: &str) -> Result<Option<DateTime<Utc>>, ApiError> {
    match query_param(event, name) {
        None => Ok(None),
        Some(raw) => parse_timestamp(&raw).map(Some).ok_or_else(|| {
            ValidationError::InvalidQuery(format!("{} must be an RFC 3339 timestamp", name)).into()
        }),
    }
}

/// Resolve the `[from, to]` history window, defaulting to the last 30 days
fn history_window(
    from: Option<DateTime<Utc>>,
    to: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Result<(DateTime<Utc>, DateTime<Utc>), ApiError> {
    let to = to.unwrap_or(now);
    let from = from.unwrap_or(to - Duration::days(DEFAULT_HISTORY_DAYS));

    if from > to {
        return Err(
            ValidationError::InvalidQuery("from must not be after to".to_string()).into(),
        );
    }
    Ok((from, to))
}

/// Check a manual entry and fill in its energy
fn manual_energy(
    device: &Device,
    payload: &ManualReadingRequest,
    now: DateTime<Utc>,
) -> Result<f64, ApiError> {
    if payload.ended_at < payload.started_at {
        return Err(FieldError::new("ended_at", "must not be before started_at").into());
    }
    if payload.ended_at > now {
        return Err(FieldError::new("ended_at", "must not be in the future").into());
    }

    match payload.energy_kwh {
        Some(kwh) => {
            validate_non_negative("energy_kwh", kwh)?;
            Ok(kwh)
        }
        None => Ok(energy_kwh(
            device.wattage,
            elapsed_hours(payload.started_at, payload.ended_at),
        )),
    }
}

/// Handler for GET /devices/{device_id}/readings
///
/// # Query Parameters
/// * `from`, `to` - RFC 3339 bounds on reading end time (default: last 30 days)
/// * `limit` - Page size (default 50, max 1000)
/// * `cursor` - Cursor from the previous page
pub async fn list_readings(
    event: &Request,
    state: &AppState,
    session: &SessionContext,
    device_id: &str,
) -> Result<Response<Body>, ApiError> {
    let device = load_owned_device(state, session, device_id).await?;

    let (from, to) = history_window(
        time_query(event, "from")?,
        time_query(event, "to")?,
        state.clock.now(),
    )?;
    let limit = parse_query_param::<i32>(event, "limit")?;
    let cursor = query_param(event, "cursor");

    let page = repo::readings::list_device_readings(
        state.client(),
        &state.tables().device_readings,
        &device.device_id,
        from,
        to,
        limit,
        cursor.as_deref(),
    )
    .await?;

    info!(
        request_id = %request_id(event),
        device_id = %device_id,
        count = page.items.len(),
        has_next_cursor = page.next_cursor.is_some(),
        "Retrieved readings"
    );

    json_response(
        200,
        &ReadingsPage {
            readings: page.items,
            next_cursor: page.next_cursor,
        },
    )
}

/// Handler for POST /devices/{device_id}/readings: a user-entered reading
pub async fn create_reading(
    event: &Request,
    state: &AppState,
    session: &SessionContext,
    device_id: &str,
) -> Result<Response<Body>, ApiError> {
    let payload: ManualReadingRequest = parse_json_body(event)?;
    let device = load_owned_device(state, session, device_id).await?;
    let home = load_owned_home(state, session, &device.home_id).await?;
    let now = state.clock.now();

    let energy = manual_energy(&device, &payload, now)?;
    let prior_kwh = month_usage_before(state, &home.home_id, payload.ended_at).await?;

    let reading = Reading {
        reading_id: state.ids.prefixed(IdPrefix::Reading),
        device_id: device.device_id.clone(),
        home_id: device.home_id.clone(),
        started_at: payload.started_at,
        ended_at: payload.ended_at,
        duration_minutes: elapsed_hours(payload.started_at, payload.ended_at) * 60.0,
        energy_kwh: energy,
        cost: marginal_charge(&home.tariff, prior_kwh, energy),
        source: ReadingSource::Manual,
        recorded_at: now,
    };

    repo::readings::put_reading(state.client(), &state.tables().device_readings, &reading).await?;

    info!(
        request_id = %request_id(event),
        device_id = %device_id,
        reading_id = %reading.reading_id,
        energy_kwh = reading.energy_kwh,
        "Recorded manual reading"
    );

    json_response(201, &reading)
}
