//! Views of service requests shared by the admin, company and correspondent surfaces.

use std::time::Duration;

use chrono::{DateTime, NaiveDateTime, Utc};
use diesel::pg::PgConnection;
use diesel::prelude::*;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use crate::{
    auth::AuthenticatedUser,
    error::{AppError, AppResult},
    lifecycle::{is_overdue, store, Actor, Location, RequestStatus, Role},
    models::{Document, ServiceRequest},
    schema::documents,
    state::AppState,
};

const DOCUMENT_URL_TTL: Duration = Duration::from_secs(15 * 60);

#[derive(Debug, Default, Deserialize)]
pub struct StatusFilter {
    pub status: Option<String>,
}

impl StatusFilter {
    pub fn parse(&self) -> AppResult<Option<RequestStatus>> {
        match self.status.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some(raw) => raw
                .parse::<RequestStatus>()
                .map(Some)
                .map_err(|err| AppError::bad_request(err.to_string())),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ServiceRequestView {
    pub id: Uuid,
    pub company_id: Uuid,
    pub correspondent_id: Option<Uuid>,
    pub service_type: String,
    pub location: Option<Location>,
    pub date_time: String,
    pub deadline: Option<String>,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company_value: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correspondent_value: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profit_margin: Option<Decimal>,
    pub details: Option<String>,
    pub instructions: Option<String>,
    pub overdue: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl ServiceRequestView {
    /// Companies see what they pay, correspondents what they earn; only
    /// admins see both and the margin.
    pub fn for_role(request: ServiceRequest, role: Role) -> Self {
        let now = Utc::now().naive_utc();
        let overdue = request
            .status
            .parse::<RequestStatus>()
            .map(|status| is_overdue(status, request.deadline, now))
            .unwrap_or(false);
        let (company_value, correspondent_value, profit_margin) = match role {
            Role::Admin => (
                request.company_value,
                request.correspondent_value,
                request.profit_margin,
            ),
            Role::Company => (request.company_value, None, None),
            Role::Correspondent => (None, request.correspondent_value, None),
        };

        Self {
            id: request.id,
            company_id: request.company_id,
            correspondent_id: request.correspondent_id,
            service_type: request.service_type,
            location: Location::from_value(&request.location),
            date_time: to_iso(request.date_time),
            deadline: request.deadline.map(to_iso),
            status: request.status,
            company_value,
            correspondent_value,
            profit_margin,
            details: request.details,
            instructions: request.instructions,
            overdue,
            created_at: to_iso(request.created_at),
            updated_at: to_iso(request.updated_at),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HistoryEntry {
    pub from_status: Option<String>,
    pub to_status: String,
    pub transition: String,
    pub actor_user_id: Option<Uuid>,
    pub notes: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Serialize)]
pub struct DocumentView {
    pub id: Uuid,
    pub kind: String,
    pub name: String,
    pub content_type: Option<String>,
    pub size_bytes: i64,
    pub checksum: String,
    pub download_url: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Serialize)]
pub struct ServiceRequestDetail {
    #[serde(flatten)]
    pub request: ServiceRequestView,
    pub history: Vec<HistoryEntry>,
    pub documents: Vec<DocumentView>,
}

pub fn to_iso(dt: NaiveDateTime) -> String {
    DateTime::<Utc>::from_naive_utc_and_offset(dt, Utc).to_rfc3339()
}

/// Checks the token role and resolves the full acting identity.
pub fn actor_for(
    conn: &mut PgConnection,
    user: &AuthenticatedUser,
    role: Role,
) -> AppResult<Actor> {
    user.require_role(role)?;
    let actor = store::load_actor(conn, user.user_id)?;
    if actor.role != role {
        return Err(AppError::forbidden(format!("{role} access required")));
    }
    Ok(actor)
}

/// Loads a request with its history and documents, presigning download links.
pub async fn load_detail(
    state: &AppState,
    request_id: Uuid,
    viewer: &Actor,
) -> AppResult<ServiceRequestDetail> {
    let (request, history, docs) = {
        let mut conn = state.db()?;
        let request = store::find_request(&mut conn, request_id)?;
        ensure_visible(&request, viewer)?;
        let history = store::history(&mut conn, request_id)?;
        let docs: Vec<Document> = documents::table
            .filter(documents::service_request_id.eq(request_id))
            .order(documents::created_at.asc())
            .load(&mut conn)?;
        (request, history, docs)
    };

    let mut document_views = Vec::with_capacity(docs.len());
    for doc in docs {
        let download_url = match state
            .storage
            .presign_get_object(&doc.storage_key, DOCUMENT_URL_TTL)
            .await
        {
            Ok(url) => Some(url),
            Err(err) => {
                warn!(document_id = %doc.id, error = %err, "failed to presign document url");
                None
            }
        };
        document_views.push(DocumentView {
            id: doc.id,
            kind: doc.kind,
            name: doc.name,
            content_type: doc.content_type,
            size_bytes: doc.size_bytes,
            checksum: doc.checksum,
            download_url,
            created_at: to_iso(doc.created_at),
        });
    }

    Ok(ServiceRequestDetail {
        request: ServiceRequestView::for_role(request, viewer.role),
        history: history
            .into_iter()
            .map(|change| HistoryEntry {
                from_status: change.from_status,
                to_status: change.to_status,
                transition: change.transition,
                actor_user_id: change.actor_user_id,
                notes: change.notes,
                created_at: to_iso(change.created_at),
            })
            .collect(),
        documents: document_views,
    })
}

fn ensure_visible(request: &ServiceRequest, viewer: &Actor) -> AppResult<()> {
    let visible = match viewer.role {
        Role::Admin => true,
        Role::Company => viewer.profile_id == Some(request.company_id),
        Role::Correspondent => {
            viewer.profile_id.is_some() && viewer.profile_id == request.correspondent_id
        }
    };
    if visible {
        Ok(())
    } else {
        Err(AppError::forbidden("request is not visible to this account"))
    }
}
