use lambda_http::http::Method;
use lambda_http::{Body, Request, Response};
use tracing::{info, warn};

use crate::auth::{authenticate, validate_admin_token};
use crate::cors;
use crate::error::{ApiError, NotFoundError};
use crate::handlers::{self, json_response, request_id};
use crate::state::AppState;
use energy_monitor::shared::session::SessionContext;

/// Who may call a route
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Public,
    Session,
    Admin,
}

/// A resolved endpoint with its path parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route<'a> {
    Health,
    Register,
    Login,
    Logout,
    Me,

    ListHomes,
    CreateHome,
    GetHome(&'a str),
    UpdateHome(&'a str),
    DeleteHome(&'a str),
    HomeDevices(&'a str),
    HomeSummary(&'a str),

    ListDevices,
    CreateDevice,
    ListTemplates,
    GetDevice(&'a str),
    UpdateDevice(&'a str),
    DeleteDevice(&'a str),
    DeviceConsumption(&'a str),
    ListReadings(&'a str),
    CreateReading(&'a str),

    ListRules,
    CreateRule,
    UpdateRule(&'a str),
    DeleteRule(&'a str),
    ListAlerts,
    AcknowledgeAlert(&'a str),

    MonthlyReport,

    AdminListUsers,
    AdminCreateTemplate,
    AdminUpdateTemplate(&'a str),
    AdminDeleteTemplate(&'a str),
}

impl Route<'_> {
    pub fn access(&self) -> Access {
        match self {
            Route::Health | Route::Register | Route::Login => Access::Public,
            Route::AdminListUsers
            | Route::AdminCreateTemplate
            | Route::AdminUpdateTemplate(_)
            | Route::AdminDeleteTemplate(_) => Access::Admin,
            _ => Access::Session,
        }
    }
}

/// Strip the `/api` mount prefix and trailing slashes
pub fn normalize_path(path: &str) -> String {
    let path = match path.strip_prefix("/api") {
        Some(rest) if rest.is_empty() || rest.starts_with('/') => rest,
        _ => path,
    };

    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Map a method and normalized path to a route
pub fn resolve<'a>(method: &Method, path: &'a str) -> Option<Route<'a>> {
    let segments: Vec<&'a str> = path.split('/').filter(|s| !s.is_empty()).collect();

    let route = match (method.as_str(), segments.as_slice()) {
        ("GET", &["health"]) => Route::Health,

        ("POST", &["auth", "register"]) => Route::Register,
        ("POST", &["auth", "login"]) => Route::Login,
        ("POST", &["auth", "logout"]) => Route::Logout,
        ("GET", &["auth", "me"]) => Route::Me,

        ("GET", &["homes"]) => Route::ListHomes,
        ("POST", &["homes"]) => Route::CreateHome,
        ("GET", &["homes", id]) => Route::GetHome(id),
        ("PUT", &["homes", id]) => Route::UpdateHome(id),
        ("DELETE", &["homes", id]) => Route::DeleteHome(id),
        ("GET", &["homes", id, "devices"]) => Route::HomeDevices(id),
        ("GET", &["homes", id, "summary"]) => Route::HomeSummary(id),

        ("GET", &["devices"]) => Route::ListDevices,
        ("POST", &["devices"]) => Route::CreateDevice,
        ("GET", &["devices", "templates"]) => Route::ListTemplates,
        ("GET", &["devices", id]) => Route::GetDevice(id),
        ("PUT", &["devices", id]) => Route::UpdateDevice(id),
        ("DELETE", &["devices", id]) => Route::DeleteDevice(id),
        ("GET", &["devices", id, "consumption"]) => Route::DeviceConsumption(id),
        ("GET", &["devices", id, "readings"]) => Route::ListReadings(id),
        ("POST", &["devices", id, "readings"]) => Route::CreateReading(id),

        ("GET", &["alerts", "rules"]) => Route::ListRules,
        ("POST", &["alerts", "rules"]) => Route::CreateRule,
        ("PUT", &["alerts", "rules", id]) => Route::UpdateRule(id),
        ("DELETE", &["alerts", "rules", id]) => Route::DeleteRule(id),
        ("GET", &["alerts"]) => Route::ListAlerts,
        ("PUT", &["alerts", id, "acknowledge"]) => Route::AcknowledgeAlert(id),

        ("GET", &["reports", "monthly"]) => Route::MonthlyReport,

        ("GET", &["admin", "users"]) => Route::AdminListUsers,
        ("POST", &["admin", "templates"]) => Route::AdminCreateTemplate,
        ("PUT", &["admin", "templates", id]) => Route::AdminUpdateTemplate(id),
        ("DELETE", &["admin", "templates", id]) => Route::AdminDeleteTemplate(id),

        _ => return None,
    };

    Some(route)
}

pub async fn route_request(
    event: Request,
    state: &AppState,
) -> Result<Response<Body>, lambda_http::Error> {
    let path = normalize_path(event.uri().path());
    let method = event.method().clone();
    let request_id = request_id(&event);
    let origin = state.config.cors_allowed_origin.as_str();

    info!(
        request_id = %request_id,
        method = %method,
        path = %path,
        "Routing request"
    );

    if method == Method::OPTIONS {
        info!(request_id = %request_id, "Handling CORS preflight request");
        return Ok(cors::preflight_response(origin));
    }

    let response = match resolve(&method, &path) {
        Some(route) => match dispatch(route, &event, state, &request_id).await {
            Ok(response) => response,
            Err(e) => {
                warn!(request_id = %request_id, error = %e, "Request failed");
                e.to_http_response(&request_id)
            }
        },
        None => {
            warn!(
                request_id = %request_id,
                method = %method,
                path = %path,
                "Unknown route"
            );
            ApiError::NotFound(NotFoundError::Route).to_http_response(&request_id)
        }
    };

    Ok(cors::add_cors_headers(response, origin))
}

async fn dispatch(
    route: Route<'_>,
    event: &Request,
    state: &AppState,
    request_id: &str,
) -> Result<Response<Body>, ApiError> {
    match route.access() {
        Access::Public => dispatch_public(route, event, state, request_id).await,
        Access::Admin => {
            validate_admin_token(event, state)?;
            dispatch_admin(route, event, state).await
        }
        Access::Session => {
            let session = authenticate(event, state).await?;
            info!(request_id = %request_id, user_id = %session.user_id, "Authenticated request");
            dispatch_session(route, event, state, &session).await
        }
    }
}

async fn dispatch_public(
    route: Route<'_>,
    event: &Request,
    state: &AppState,
    request_id: &str,
) -> Result<Response<Body>, ApiError> {
    match route {
        Route::Health => handle_health(request_id),
        Route::Register => handlers::auth::register(event, state).await,
        Route::Login => handlers::auth::login(event, state).await,
        _ => Err(NotFoundError::Route.into()),
    }
}

async fn dispatch_admin(
    route: Route<'_>,
    event: &Request,
    state: &AppState,
) -> Result<Response<Body>, ApiError> {
    match route {
        Route::AdminListUsers => handlers::admin::list_users(event, state).await,
        Route::AdminCreateTemplate => handlers::admin::create_template(event, state).await,
        Route::AdminUpdateTemplate(id) => handlers::admin::update_template(event, state, id).await,
        Route::AdminDeleteTemplate(id) => handlers::admin::delete_template(event, state, id).await,
        _ => Err(NotFoundError::Route.into()),
    }
}

async fn dispatch_session(
    route: Route<'_>,
    event: &Request,
    state: &AppState,
    session: &SessionContext,
) -> Result<Response<Body>, ApiError> {
    use handlers::{alerts, auth, devices, homes, readings, reports};

    match route {
        Route::Logout => auth::logout(event, state, session).await,
        Route::Me => auth::me(event, state, session).await,

        Route::ListHomes => homes::list_homes(event, state, session).await,
        Route::CreateHome => homes::create_home(event, state, session).await,
        Route::GetHome(id) => homes::get_home(event, state, session, id).await,
        Route::UpdateHome(id) => homes::update_home(event, state, session, id).await,
        Route::DeleteHome(id) => homes::delete_home(event, state, session, id).await,
        Route::HomeDevices(id) => homes::list_home_devices(event, state, session, id).await,
        Route::HomeSummary(id) => homes::home_summary(event, state, session, id).await,

        Route::ListDevices => devices::list_devices(event, state, session).await,
        Route::CreateDevice => devices::create_device(event, state, session).await,
        Route::ListTemplates => devices::list_templates(event, state, session).await,
        Route::GetDevice(id) => devices::get_device(event, state, session, id).await,
        Route::UpdateDevice(id) => devices::update_device(event, state, session, id).await,
        Route::DeleteDevice(id) => devices::delete_device(event, state, session, id).await,
        Route::DeviceConsumption(id) => devices::device_consumption(event, state, session, id).await,
        Route::ListReadings(id) => readings::list_readings(event, state, session, id).await,
        Route::CreateReading(id) => readings::create_reading(event, state, session, id).await,

        Route::ListRules => alerts::list_rules(event, state, session).await,
        Route::CreateRule => alerts::create_rule(event, state, session).await,
        Route::UpdateRule(id) => alerts::update_rule(event, state, session, id).await,
        Route::DeleteRule(id) => alerts::delete_rule(event, state, session, id).await,
        Route::ListAlerts => alerts::list_alerts(event, state, session).await,
        Route::AcknowledgeAlert(id) => alerts::acknowledge_alert(event, state, session, id).await,

        Route::MonthlyReport => reports::monthly_report(event, state, session).await,

        _ => Err(NotFoundError::Route.into()),
    }
}

fn handle_health(request_id: &str) -> Result<Response<Body>, ApiError> {
    json_response(
        200,
        &serde_json::json!({
            "status": "healthy",
            "service": "energy-monitor-api",
            "request_id": request_id
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path("/"), "/");
        assert_eq!(normalize_path("/health"), "/health");
        assert_eq!(normalize_path("/health/"), "/health");
        assert_eq!(normalize_path("/api/homes"), "/homes");
        assert_eq!(normalize_path("/api/homes/home_1/"), "/homes/home_1");
        assert_eq!(normalize_path("/api"), "/");
        assert_eq!(normalize_path("/apiary"), "/apiary");
    }

    #[test]
    fn test_resolve_public_routes() {
        assert_eq!(resolve(&Method::GET, "/health"), Some(Route::Health));
        assert_eq!(resolve(&Method::POST, "/auth/login"), Some(Route::Login));
        assert_eq!(Route::Register.access(), Access::Public);
    }

    #[test]
    fn test_resolve_extracts_path_parameters() {
        assert_eq!(
            resolve(&Method::GET, "/homes/home_1/summary"),
            Some(Route::HomeSummary("home_1"))
        );
        assert_eq!(
            resolve(&Method::PUT, "/alerts/alert_9/acknowledge"),
            Some(Route::AcknowledgeAlert("alert_9"))
        );
        assert_eq!(
            resolve(&Method::DELETE, "/alerts/rules/rule_3"),
            Some(Route::DeleteRule("rule_3"))
        );
    }

    #[test]
    fn test_templates_take_precedence_over_device_id() {
        assert_eq!(
            resolve(&Method::GET, "/devices/templates"),
            Some(Route::ListTemplates)
        );
        assert_eq!(
            resolve(&Method::GET, "/devices/dev_1"),
            Some(Route::GetDevice("dev_1"))
        );
    }

    #[test]
    fn test_admin_routes_need_admin_access() {
        let route = resolve(&Method::GET, "/admin/users").unwrap();
        assert_eq!(route.access(), Access::Admin);

        let route = resolve(&Method::PUT, "/admin/templates/tpl_1").unwrap();
        assert_eq!(route, Route::AdminUpdateTemplate("tpl_1"));
        assert_eq!(route.access(), Access::Admin);
    }

    #[test]
    fn test_session_routes() {
        for (method, path) in [
            (Method::GET, "/homes"),
            (Method::PUT, "/devices/dev_1"),
            (Method::GET, "/reports/monthly"),
            (Method::POST, "/auth/logout"),
        ] {
            let route = resolve(&method, path).unwrap();
            assert_eq!(route.access(), Access::Session, "{} {}", method, path);
        }
    }

    #[test]
    fn test_unknown_routes() {
        assert_eq!(resolve(&Method::GET, "/unknown"), None);
        assert_eq!(resolve(&Method::PATCH, "/homes/home_1"), None);
        assert_eq!(resolve(&Method::GET, "/devices/dev_1/latest"), None);
    }

    #[test]
    fn test_handle_health() {
        let response = handle_health("test-request-id").unwrap();
        assert_eq!(response.status(), 200);

        let body = match response.body() {
            Body::Text(text) => text.clone(),
            _ => panic!("Expected text body"),
        };
        assert!(body.contains("healthy"));
        assert!(body.contains("test-request-id"));
    }
}
