use lambda_http::{Body, Request, Response};
use serde::Deserialize;
use tracing::info;

use super::auth::UserView;
use super::{json_response, parse_json_body, request_id};
use crate::error::{ApiError, NotFoundError};
use crate::repo;
use crate::state::AppState;
use energy_monitor::shared::domain::DeviceTemplate;
use energy_monitor::shared::id_generator::IdPrefix;
use energy_monitor::shared::validators::{validate_name, validate_wattage};

#[derive(Debug, Deserialize)]
pub struct CreateTemplateRequest {
    pub name: String,
    pub device_type: String,
    pub category: String,
    pub avg_wattage: f64,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateTemplateRequest {
    pub name: Option<String>,
    pub device_type: Option<String>,
    pub category: Option<String>,
    pub avg_wattage: Option<f64>,
}

fn validate_template(template: &DeviceTemplate) -> Result<(), ApiError> {
    validate_name("name", &template.name)?;
    validate_name("device_type", &template.device_type)?;
    validate_name("category", &template.category)?;
    validate_wattage("avg_wattage", template.avg_wattage)?;
    Ok(())
}

/// Handler for GET /admin/users
pub async fn list_users(event: &Request, state: &AppState) -> Result<Response<Body>, ApiError> {
    let users = repo::users::list_users(state.client(), &state.tables().users).await?;
    let views: Vec<UserView> = users.iter().map(UserView::from).collect();

    info!(request_id = %request_id(event), count = views.len(), "Listed users");

    json_response(200, &views)
}

/// Handler for POST /admin/templates
pub async fn create_template(
    event: &Request,
    state: &AppState,
) -> Result<Response<Body>, ApiError> {
    let payload: CreateTemplateRequest = parse_json_body(event)?;
    let now = state.clock.now();

    let template = DeviceTemplate {
        template_id: state.ids.prefixed(IdPrefix::Template),
        name: payload.name.trim().to_string(),
        device_type: payload.device_type.trim().to_string(),
        category: payload.category.trim().to_string(),
        avg_wattage: payload.avg_wattage,
        created_at: now,
        updated_at: now,
    };
    validate_template(&template)?;

    repo::templates::put_template(state.client(), &state.tables().device_templates, &template)
        .await?;

    info!(
        request_id = %request_id(event),
        template_id = %template.template_id,
        "Created device template"
    );

    json_response(201, &template)
}

/// Handler for PUT /admin/templates/{template_id}
pub async fn update_template(
    event: &Request,
    state: &AppState,
    template_id: &str,
) -> Result<Response<Body>, ApiError> {
    let payload: UpdateTemplateRequest = parse_json_body(event)?;
    let table = &state.tables().device_templates;

    let mut template = repo::templates::get_template(state.client(), table, template_id)
        .await?
        .ok_or(NotFoundError::Template)?;

    if let Some(name) = payload.name {
        template.name = name.trim().to_string();
    }
    if let Some(device_type) = payload.device_type {
        template.device_type = device_type.trim().to_string();
    }
    if let Some(category) = payload.category {
        template.category = category.trim().to_string();
    }
    if let Some(avg_wattage) = payload.avg_wattage {
        template.avg_wattage = avg_wattage;
    }
    validate_template(&template)?;
    template.updated_at = state.clock.now();

    repo::templates::put_template(state.client(), table, &template).await?;

    info!(request_id = %request_id(event), template_id = %template_id, "Updated device template");

    json_response(200, &template)
}

/// Handler for DELETE /admin/templates/{template_id}. Devices created from
/// the template keep their copied values.
pub async fn delete_template(
    event: &Request,
    state: &AppState,
    template_id: &str,
) -> Result<Response<Body>, ApiError> {
    let table = &state.tables().device_templates;

    repo::templates::get_template(state.client(), table, template_id)
        .await?
        .ok_or(NotFoundError::Template)?;
    repo::templates::delete_template(state.client(), table, template_id).await?;

    info!(request_id = %request_id(event), template_id = %template_id, "Deleted device template");

    json_response(
        200,
        &serde_json::json!({ "template_id": template_id, "deleted": true }),
    )
}
