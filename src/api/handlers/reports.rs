use chrono::{DateTime, Datelike, Duration, Utc};
use lambda_http::{Body, Request, Response};
use tracing::info;

use super::{json_response, load_owned_home, parse_query_param, query_param, request_id};
use crate::error::{ApiError, ValidationError};
use crate::repo;
use crate::state::AppState;
use energy_monitor::shared::reports::{build_monthly_report, month_bounds, ReportError};
use energy_monitor::shared::session::SessionContext;

/// Sessions longer than this that end after the month still count toward it
const MAX_SESSION_SPILLOVER_DAYS: i64 = 31;

/// Year and month to report on, defaulting to the current month
fn report_month(year: Option<i32>, month: Option<u32>, now: DateTime<Utc>) -> (i32, u32) {
    (year.unwrap_or(now.year()), month.unwrap_or(now.month()))
}

/// Range of stored readings that can contribute to the month
fn readings_window(year: i32, month: u32) -> Result<(DateTime<Utc>, DateTime<Utc>), ReportError> {
    let (start, end) = month_bounds(year, month)?;
    let end = end
        .checked_add_signed(Duration::days(MAX_SESSION_SPILLOVER_DAYS))
        .ok_or(ReportError::InvalidMonth { year, month })?;
    Ok((start, end))
}

/// Handler for GET /reports/monthly
///
/// # Query Parameters
/// * `home_id` - Required
/// * `year`, `month` - Defaults to the current month
pub async fn monthly_report(
    event: &Request,
    state: &AppState,
    session: &SessionContext,
) -> Result<Response<Body>, ApiError> {
    let home_id = query_param(event, "home_id")
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| ValidationError::InvalidQuery("home_id is required".to_string()))?;
    let now = state.clock.now();
    let (year, month) = report_month(
        parse_query_param::<i32>(event, "year")?,
        parse_query_param::<u32>(event, "month")?,
        now,
    );

    let (start, until) = readings_window(year, month)?;
    let home = load_owned_home(state, session, &home_id).await?;

    let devices =
        repo::devices::list_devices_for_home(state.client(), &state.tables().devices, &home.home_id)
            .await?;
    let readings = repo::readings::list_home_readings(
        state.client(),
        &state.tables().device_readings,
        &home.home_id,
        start,
        until,
    )
    .await?;

    let report = build_monthly_report(&home, &devices, &readings, year, month, now)?;

    info!(
        request_id = %request_id(event),
        home_id = %home.home_id,
        year = year,
        month = month,
        total_energy_kwh = report.total_energy_kwh,
        "Built monthly report"
    );

    json_response(200, &report)
}
