use axum::{
    extract::{Path, Query, State},
    Form, Json,
};
use chrono::Utc;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use crate::{
    auth::AuthenticatedUser,
    error::{AppError, AppResult},
    lifecycle::{
        store::{self, ReportUpload},
        Actor, Command, LifecycleError, RequestStatus, Role, Transition,
    },
    models::ServiceRequest,
    schema::service_requests,
    state::AppState,
    storage::{report_key, store_bytes},
};

use super::requests::{
    actor_for, load_detail, ServiceRequestDetail, ServiceRequestView, StatusFilter,
};

const REPORT_CONTENT_TYPE: &str = "text/plain; charset=utf-8";

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct DocumentationForm {
    pub report: String,
}

#[derive(Debug, Serialize)]
pub struct DocumentationPrompt {
    pub request: ServiceRequestView,
    pub accepts: &'static str,
}

fn correspondent_requests(
    conn: &mut diesel::pg::PgConnection,
    actor: &Actor,
    status: Option<RequestStatus>,
) -> AppResult<Vec<ServiceRequestView>> {
    let correspondent_id = actor
        .profile_id
        .ok_or_else(|| AppError::forbidden("correspondent profile not found"))?;
    let mut query = service_requests::table
        .filter(service_requests::correspondent_id.eq(correspondent_id))
        .order(service_requests::date_time.asc())
        .into_boxed();
    if let Some(status) = status {
        query = query.filter(service_requests::status.eq(status.as_str()));
    }
    let requests: Vec<ServiceRequest> = query.load(conn)?;
    Ok(requests
        .into_iter()
        .map(|request| ServiceRequestView::for_role(request, Role::Correspondent))
        .collect())
}

/// Requests waiting for this correspondent to accept or reject.
pub async fn list_assignments(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> AppResult<Json<Vec<ServiceRequestView>>> {
    let mut conn = state.db()?;
    let actor = actor_for(&mut conn, &user, Role::Correspondent)?;
    Ok(Json(correspondent_requests(&mut conn, &actor, Some(RequestStatus::Assigned))?))
}

pub async fn list_service_requests(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(filter): Query<StatusFilter>,
) -> AppResult<Json<Vec<ServiceRequestView>>> {
    let status = filter.parse()?;
    let mut conn = state.db()?;
    let actor = actor_for(&mut conn, &user, Role::Correspondent)?;
    Ok(Json(correspondent_requests(&mut conn, &actor, status)?))
}

pub async fn get_service_request(
    State(state): State<AppState>,
    Path(request_id): Path<Uuid>,
    user: AuthenticatedUser,
) -> AppResult<Json<ServiceRequestDetail>> {
    let actor = {
        let mut conn = state.db()?;
        actor_for(&mut conn, &user, Role::Correspondent)?
    };
    Ok(Json(load_detail(&state, request_id, &actor).await?))
}

async fn run(
    state: &AppState,
    user: &AuthenticatedUser,
    request_id: Uuid,
    command: Command,
) -> AppResult<Json<ServiceRequestView>> {
    let mut conn = state.db()?;
    let actor = actor_for(&mut conn, user, Role::Correspondent)?;
    let request = store::execute(&mut conn, &actor, request_id, command)?;
    Ok(Json(ServiceRequestView::for_role(request, Role::Correspondent)))
}

pub async fn accept_assignment(
    State(state): State<AppState>,
    Path(request_id): Path<Uuid>,
    user: AuthenticatedUser,
) -> AppResult<Json<ServiceRequestView>> {
    run(&state, &user, request_id, Command::Accept).await
}

pub async fn reject_assignment(
    State(state): State<AppState>,
    Path(request_id): Path<Uuid>,
    user: AuthenticatedUser,
) -> AppResult<Json<ServiceRequestView>> {
    run(&state, &user, request_id, Command::Reject).await
}

pub async fn confirm_presence(
    State(state): State<AppState>,
    Path(request_id): Path<Uuid>,
    user: AuthenticatedUser,
) -> AppResult<Json<ServiceRequestView>> {
    run(&state, &user, request_id, Command::ConfirmPresence).await
}

/// Tells the client whether documentation may be submitted right now.
pub async fn documentation_form(
    State(state): State<AppState>,
    Path(request_id): Path<Uuid>,
    user: AuthenticatedUser,
) -> AppResult<Json<DocumentationPrompt>> {
    let mut conn = state.db()?;
    let actor = actor_for(&mut conn, &user, Role::Correspondent)?;
    let request = store::preview(
        &mut conn,
        &actor,
        request_id,
        Transition::SubmitDocumentation,
    )?;
    Ok(Json(DocumentationPrompt {
        request: ServiceRequestView::for_role(request, Role::Correspondent),
        accepts: "report",
    }))
}

/// Stores the report, then completes the request. A stored report whose
/// transition fails is removed again.
pub async fn submit_documentation(
    State(state): State<AppState>,
    Path(request_id): Path<Uuid>,
    user: AuthenticatedUser,
    Form(form): Form<DocumentationForm>,
) -> AppResult<Json<ServiceRequestView>> {
    let actor = {
        let mut conn = state.db()?;
        let actor = actor_for(&mut conn, &user, Role::Correspondent)?;
        store::preview(
            &mut conn,
            &actor,
            request_id,
            Transition::SubmitDocumentation,
        )?;
        actor
    };
    if form.report.trim().is_empty() {
        return Err(LifecycleError::Validation("report must not be empty".into()).into());
    }

    let document_id = Uuid::new_v4();
    let key = report_key(request_id, document_id);
    let object = store_bytes(
        state.storage.as_ref(),
        key.clone(),
        form.report.clone().into_bytes(),
        REPORT_CONTENT_TYPE,
    )
    .await?;
    let upload = ReportUpload {
        document_id,
        name: format!("report-{}.txt", Utc::now().format("%Y%m%d-%H%M%S")),
        object,
    };

    let result = state.db().and_then(|mut conn| {
        store::submit_documentation(&mut conn, &actor, request_id, form.report, &upload)
            .map_err(AppError::from)
    });

    match result {
        Ok(request) => Ok(Json(ServiceRequestView::for_role(request, Role::Correspondent))),
        Err(err) => {
            if let Err(cleanup_err) = state.storage.delete_object(&key).await {
                warn!(
                    request_id = %request_id,
                    key = %key,
                    error = %cleanup_err,
                    "failed to remove orphaned report"
                );
            }
            Err(err)
        }
    }
}
