use axum::http::HeaderValue;
use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::warn;

use crate::{auth::AuthenticatedUser, state::AppState};

pub mod admin;
pub mod auth;
pub mod company;
pub mod correspondent;
pub mod health;
pub mod requests;

fn cors_layer(state: &AppState) -> CorsLayer {
    let allow_origin = match state.config.cors_allowed_origin.as_ref() {
        Some(origins) => {
            let headers: Vec<HeaderValue> = origins
                .split(',')
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .filter_map(|value| match value.parse::<HeaderValue>() {
                    Ok(header) => Some(header),
                    Err(_) => {
                        warn!(origin = %value, "ignoring invalid CORS allowed origin");
                        None
                    }
                })
                .collect();
            AllowOrigin::list(headers)
        }
        None => AllowOrigin::mirror_request(),
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods(tower_http::cors::AllowMethods::mirror_request())
        .allow_headers(tower_http::cors::AllowHeaders::mirror_request())
        .allow_credentials(true)
}

pub fn create_router(state: AppState) -> Router<()> {
    let cors = cors_layer(&state);

    let auth_routes = Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .route("/refresh", post(auth::refresh))
        .route("/logout", post(auth::logout))
        .route("/me", get(auth::me));

    let admin_routes = Router::new()
        .route("/dashboard", get(admin::dashboard))
        .route("/companies", get(admin::list_companies))
        .route("/companies/:id/approve", post(admin::approve_company))
        .route("/companies/:id/reject", post(admin::reject_company))
        .route("/correspondents", get(admin::list_correspondents))
        .route(
            "/correspondents/:id/approve",
            post(admin::approve_correspondent),
        )
        .route(
            "/correspondents/:id/reject",
            post(admin::reject_correspondent),
        )
        .route("/service-requests", get(admin::list_service_requests))
        .route("/service-requests/:id", get(admin::get_service_request))
        .route("/service-requests/:id/set-value", post(admin::set_value))
        .route(
            "/service-requests/:id/assign",
            get(admin::assignment_options).post(admin::assign_correspondent),
        );

    let company_routes = Router::new()
        .route("/service-requests", get(company::list_service_requests))
        .route(
            "/service-requests/new",
            post(company::create_service_request),
        )
        .route("/service-requests/:id", get(company::get_service_request))
        .route(
            "/service-requests/:id/cancel",
            post(company::cancel_service_request),
        );

    let correspondent_routes = Router::new()
        .route("/assignments", get(correspondent::list_assignments))
        .route(
            "/assignments/:id/accept",
            post(correspondent::accept_assignment),
        )
        .route(
            "/assignments/:id/reject",
            post(correspondent::reject_assignment),
        )
        .route(
            "/service-requests",
            get(correspondent::list_service_requests),
        )
        .route(
            "/service-requests/:id",
            get(correspondent::get_service_request),
        )
        .route(
            "/service-requests/:id/confirm-presence",
            post(correspondent::confirm_presence),
        )
        .route(
            "/service-requests/:id/submit-documentation",
            get(correspondent::documentation_form).post(correspondent::submit_documentation),
        );

    let protected_state = state.clone();
    let protected_routes = Router::new()
        .nest("/api/admin", admin_routes)
        .nest("/api/company", company_routes)
        .nest("/api/correspondent", correspondent_routes)
        .layer(middleware::from_extractor_with_state::<AuthenticatedUser, _>(protected_state));

    Router::new()
        .merge(protected_routes)
        .nest("/api/auth", auth_routes)
        .route("/api/health", get(health::health_check))
        .with_state(state)
        .layer(cors)
}
