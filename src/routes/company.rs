use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Form, Json,
};
use diesel::prelude::*;
use uuid::Uuid;

use crate::{
    auth::AuthenticatedUser,
    error::{AppError, AppResult},
    lifecycle::{
        store::{self, RequestDraft},
        Command, Role,
    },
    models::ServiceRequest,
    schema::service_requests,
    state::AppState,
};

use super::requests::{
    actor_for, load_detail, ServiceRequestDetail, ServiceRequestView, StatusFilter,
};

pub async fn list_service_requests(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(filter): Query<StatusFilter>,
) -> AppResult<Json<Vec<ServiceRequestView>>> {
    let status = filter.parse()?;
    let mut conn = state.db()?;
    let actor = actor_for(&mut conn, &user, Role::Company)?;
    let company_id = actor
        .profile_id
        .ok_or_else(|| AppError::forbidden("company profile not found"))?;

    let mut query = service_requests::table
        .filter(service_requests::company_id.eq(company_id))
        .order(service_requests::created_at.desc())
        .into_boxed();
    if let Some(status) = status {
        query = query.filter(service_requests::status.eq(status.as_str()));
    }
    let requests: Vec<ServiceRequest> = query.load(&mut conn)?;

    Ok(Json(
        requests
            .into_iter()
            .map(|request| ServiceRequestView::for_role(request, Role::Company))
            .collect(),
    ))
}

pub async fn create_service_request(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Form(draft): Form<RequestDraft>,
) -> AppResult<(StatusCode, Json<ServiceRequestView>)> {
    let mut conn = state.db()?;
    let actor = actor_for(&mut conn, &user, Role::Company)?;
    let request = store::create_request(&mut conn, &actor, &draft)?;
    Ok((
        StatusCode::CREATED,
        Json(ServiceRequestView::for_role(request, Role::Company)),
    ))
}

pub async fn get_service_request(
    State(state): State<AppState>,
    Path(request_id): Path<Uuid>,
    user: AuthenticatedUser,
) -> AppResult<Json<ServiceRequestDetail>> {
    let actor = {
        let mut conn = state.db()?;
        actor_for(&mut conn, &user, Role::Company)?
    };
    Ok(Json(load_detail(&state, request_id, &actor).await?))
}

pub async fn cancel_service_request(
    State(state): State<AppState>,
    Path(request_id): Path<Uuid>,
    user: AuthenticatedUser,
) -> AppResult<Json<ServiceRequestView>> {
    let mut conn = state.db()?;
    let actor = actor_for(&mut conn, &user, Role::Company)?;
    let request = store::execute(&mut conn, &actor, request_id, Command::Cancel)?;
    Ok(Json(ServiceRequestView::for_role(request, Role::Company)))
}
