use lambda_http::{Body, Request, Response};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{
    json_response, load_owned_alert, load_owned_device, load_owned_home, load_owned_rule,
    parse_json_body, parse_query_param, query_param, request_id,
};
use crate::error::{ApiError, NotFoundError, ValidationError};
use crate::repo;
use crate::state::AppState;
use energy_monitor::shared::alerts::{acknowledge, validate_rule};
use energy_monitor::shared::domain::{AlertPeriod, AlertRule, AlertType, TriggeredAlert};
use energy_monitor::shared::id_generator::IdPrefix;
use energy_monitor::shared::session::SessionContext;

#[derive(Debug, Deserialize)]
pub struct CreateRuleRequest {
    pub home_id: String,
    pub device_id: Option<String>,
    pub name: String,
    pub alert_type: AlertType,
    pub limit_kwh: Option<f64>,
    pub limit_cost: Option<f64>,
    pub period: AlertPeriod,
    pub threshold_pct: Option<f64>,
    pub is_enabled: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateRuleRequest {
    pub name: Option<String>,
    pub limit_kwh: Option<f64>,
    pub limit_cost: Option<f64>,
    pub period: Option<AlertPeriod>,
    pub threshold_pct: Option<f64>,
    pub is_enabled: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct AlertsPage {
    pub alerts: Vec<TriggeredAlert>,
    pub next_cursor: Option<String>,
}

fn check_rule(rule: &AlertRule) -> Result<(), ApiError> {
    validate_rule(rule).map_err(|e| ValidationError::Rule(format!("{}: {}", e.field, e.message)))?;
    Ok(())
}

fn apply_rule_update(rule: &mut AlertRule, update: UpdateRuleRequest) {
    if let Some(name) = update.name {
        rule.name = name.trim().to_string();
    }
    if update.limit_kwh.is_some() {
        rule.limit_kwh = update.limit_kwh;
    }
    if update.limit_cost.is_some() {
        rule.limit_cost = update.limit_cost;
    }
    if let Some(period) = update.period {
        rule.period = period;
    }
    if let Some(threshold_pct) = update.threshold_pct {
        rule.threshold_pct = threshold_pct;
    }
    if let Some(is_enabled) = update.is_enabled {
        rule.is_enabled = is_enabled;
    }
}

fn acknowledged_filter(raw: Option<String>) -> Result<Option<bool>, ApiError> {
    match raw.as_deref().map(str::trim) {
        None | Some("") | Some("all") => Ok(None),
        Some("true") => Ok(Some(true)),
        Some("false") => Ok(Some(false)),
        Some(other) => Err(ValidationError::InvalidQuery(format!(
            "acknowledged must be true or false, got {}",
            other
        ))
        .into()),
    }
}

/// Handler for GET /alerts/rules
pub async fn list_rules(
    _event: &Request,
    state: &AppState,
    session: &SessionContext,
) -> Result<Response<Body>, ApiError> {
    let rules = repo::alert_rules::list_rules_for_owner(
        state.client(),
        &state.tables().alert_rules,
        &session.user_id,
    )
    .await?;

    json_response(200, &rules)
}

/// Handler for POST /alerts/rules
pub async fn create_rule(
    event: &Request,
    state: &AppState,
    session: &SessionContext,
) -> Result<Response<Body>, ApiError> {
    let payload: CreateRuleRequest = parse_json_body(event)?;
    let home = load_owned_home(state, session, &payload.home_id).await?;

    if let Some(device_id) = &payload.device_id {
        let device = load_owned_device(state, session, device_id).await?;
        if device.home_id != home.home_id {
            return Err(NotFoundError::Device.into());
        }
    }

    let now = state.clock.now();
    let rule = AlertRule {
        rule_id: state.ids.prefixed(IdPrefix::Rule),
        owner_id: session.user_id.clone(),
        home_id: home.home_id,
        device_id: payload.device_id,
        name: payload.name.trim().to_string(),
        alert_type: payload.alert_type,
        limit_kwh: payload.limit_kwh,
        limit_cost: payload.limit_cost,
        period: payload.period,
        threshold_pct: payload.threshold_pct.unwrap_or(100.0),
        is_enabled: payload.is_enabled.unwrap_or(true),
        trigger_count: 0,
        last_triggered: None,
        created_at: now,
        updated_at: now,
    };
    check_rule(&rule)?;

    repo::alert_rules::put_rule(state.client(), &state.tables().alert_rules, &rule).await?;

    info!(
        request_id = %request_id(event),
        rule_id = %rule.rule_id,
        alert_type = rule.alert_type.as_str(),
        period = rule.period.as_str(),
        "Created alert rule"
    );

    json_response(201, &rule)
}

/// Handler for PUT /alerts/rules/{rule_id}, including enable/disable
pub async fn update_rule(
    event: &Request,
    state: &AppState,
    session: &SessionContext,
    rule_id: &str,
) -> Result<Response<Body>, ApiError> {
    let payload: UpdateRuleRequest = parse_json_body(event)?;
    let mut rule = load_owned_rule(state, session, rule_id).await?;

    apply_rule_update(&mut rule, payload);
    check_rule(&rule)?;
    rule.updated_at = state.clock.now();

    repo::alert_rules::put_rule(state.client(), &state.tables().alert_rules, &rule).await?;

    info!(
        request_id = %request_id(event),
        rule_id = %rule_id,
        is_enabled = rule.is_enabled,
        "Updated alert rule"
    );

    json_response(200, &rule)
}

/// Handler for DELETE /alerts/rules/{rule_id}
pub async fn delete_rule(
    event: &Request,
    state: &AppState,
    session: &SessionContext,
    rule_id: &str,
) -> Result<Response<Body>, ApiError> {
    let rule = load_owned_rule(state, session, rule_id).await?;
    repo::alert_rules::delete_rule(state.client(), &state.tables().alert_rules, &rule.rule_id)
        .await?;

    info!(request_id = %request_id(event), rule_id = %rule_id, "Deleted alert rule");

    json_response(200, &serde_json::json!({ "rule_id": rule_id, "deleted": true }))
}

/// Handler for GET /alerts
///
/// # Query Parameters
/// * `acknowledged` - `true` or `false` to filter; all alerts when absent
/// * `limit`, `cursor` - pagination
pub async fn list_alerts(
    event: &Request,
    state: &AppState,
    session: &SessionContext,
) -> Result<Response<Body>, ApiError> {
    let acknowledged = acknowledged_filter(query_param(event, "acknowledged"))?;
    let limit = parse_query_param::<i32>(event, "limit")?;
    let cursor = query_param(event, "cursor");

    let page = repo::alerts::list_alerts_for_owner(
        state.client(),
        &state.tables().alerts,
        &session.user_id,
        acknowledged,
        limit,
        cursor.as_deref(),
    )
    .await?;

    json_response(
        200,
        &AlertsPage {
            alerts: page.items,
            next_cursor: page.next_cursor,
        },
    )
}

/// Handler for PUT /alerts/{alert_id}/acknowledge. Repeating it is harmless.
pub async fn acknowledge_alert(
    event: &Request,
    state: &AppState,
    session: &SessionContext,
    alert_id: &str,
) -> Result<Response<Body>, ApiError> {
    let mut alert = load_owned_alert(state, session, alert_id).await?;
    if !acknowledge(&mut alert, state.clock.now()) {
        return json_response(200, &alert);
    }

    let alert =
        repo::alerts::save_acknowledgement(state.client(), &state.tables().alerts, &alert)
            .await?
            .ok_or(NotFoundError::Alert)?;

    info!(request_id = %request_id(event), alert_id = %alert_id, "Acknowledged alert");

    json_response(200, &alert)
}
