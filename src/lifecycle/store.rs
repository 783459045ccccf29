//! Applies lifecycle effects to Postgres.
//!
//! Every transition runs in one transaction: the request row is locked with
//! `SELECT ... FOR UPDATE`, the pure planner decides, and the update is a
//! compare-and-set on `(id, status)`. The history row and the
//! `notify-participants` job commit or roll back with it.

use chrono::{NaiveDateTime, Utc};
use diesel::pg::PgConnection;
use diesel::prelude::*;
use rust_decimal::Decimal;
use serde::Deserialize;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use super::{
    authorize, next_status, optional_text, parse_datetime, parse_optional_datetime, plan,
    plan_create, Actor, CandidateCorrespondent, Command, Effect, LifecycleError, Location,
    RequestSnapshot, RequestStatus, Role, ServiceType, Transition, UnknownVariant, UserStatus,
};
use crate::{
    jobs::{enqueue_job, JobQueueError, JOB_NOTIFY_PARTICIPANTS},
    models::{
        NewDocument, NewServiceRequest, NewStatusChange, ServiceRequest, StatusChange, User,
    },
    notify::TransitionNotice,
    schema::{
        companies, correspondents, documents, service_request_history, service_requests, users,
    },
    storage::StoredObject,
};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
    #[error("database error: {0}")]
    Database(#[from] diesel::result::Error),
    #[error(transparent)]
    Queue(#[from] JobQueueError),
    #[error("stored record is corrupt: {0}")]
    Corrupt(#[from] UnknownVariant),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Form fields a company submits to open a request.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RequestDraft {
    pub service_type: String,
    pub location_city: String,
    pub location_state: String,
    pub date_time: String,
    pub details: Option<String>,
    pub deadline: Option<String>,
}

struct ValidDraft {
    service_type: ServiceType,
    location: Location,
    date_time: NaiveDateTime,
    deadline: Option<NaiveDateTime>,
    details: Option<String>,
}

impl RequestDraft {
    fn validate(&self) -> Result<ValidDraft, LifecycleError> {
        let service_type = self
            .service_type
            .parse::<ServiceType>()
            .map_err(|err| LifecycleError::Validation(err.to_string()))?;
        let location = Location::new(&self.location_city, &self.location_state)?;
        let date_time = parse_datetime("date_time", &self.date_time)?;
        let deadline = parse_optional_datetime("deadline", self.deadline.as_deref())?;
        Ok(ValidDraft {
            service_type,
            location,
            date_time,
            deadline,
            details: optional_text(self.details.as_deref()),
        })
    }
}

/// A report already written to the document store, waiting to be recorded.
#[derive(Debug, Clone)]
pub struct ReportUpload {
    pub document_id: Uuid,
    pub name: String,
    pub object: StoredObject,
}

#[derive(AsChangeset)]
#[diesel(table_name = service_requests)]
struct TransitionChangeset {
    status: String,
    company_value: Option<Decimal>,
    correspondent_id: Option<Option<Uuid>>,
    correspondent_value: Option<Decimal>,
    profit_margin: Option<Decimal>,
    instructions: Option<Option<String>>,
    updated_at: NaiveDateTime,
}

impl TransitionChangeset {
    fn from_effect(effect: &Effect, now: NaiveDateTime) -> Self {
        let changes = effect.changes.clone();
        Self {
            status: effect.to.as_str().to_string(),
            company_value: changes.company_value,
            correspondent_id: changes.correspondent_id,
            correspondent_value: changes.correspondent_value,
            profit_margin: changes.profit_margin,
            instructions: changes.instructions,
            updated_at: now,
        }
    }
}

/// Resolves the acting identity: account role and status plus the company or
/// correspondent profile it owns.
pub fn load_actor(conn: &mut PgConnection, user_id: Uuid) -> StoreResult<Actor> {
    let user: User = users::table
        .find(user_id)
        .first(conn)
        .optional()?
        .ok_or_else(|| LifecycleError::Authorization("account not found".into()))?;

    let role: Role = user.role.parse()?;
    let status: UserStatus = user.status.parse()?;
    let profile_id = match role {
        Role::Admin => None,
        Role::Company => companies::table
            .filter(companies::user_id.eq(user.id))
            .select(companies::id)
            .first::<Uuid>(conn)
            .optional()?,
        Role::Correspondent => correspondents::table
            .filter(correspondents::user_id.eq(user.id))
            .select(correspondents::id)
            .first::<Uuid>(conn)
            .optional()?,
    };

    Ok(Actor {
        user_id: user.id,
        role,
        status,
        profile_id,
    })
}

pub fn find_request(conn: &mut PgConnection, request_id: Uuid) -> StoreResult<ServiceRequest> {
    service_requests::table
        .find(request_id)
        .first(conn)
        .optional()?
        .ok_or(StoreError::Lifecycle(LifecycleError::NotFound("service request")))
}

pub fn history(conn: &mut PgConnection, request_id: Uuid) -> StoreResult<Vec<StatusChange>> {
    Ok(service_request_history::table
        .filter(service_request_history::service_request_id.eq(request_id))
        .order(service_request_history::created_at.asc())
        .load(conn)?)
}

/// Looks up a correspondent by the id an admin submitted. Unknown or
/// malformed ids resolve to `None`.
pub fn load_candidate(
    conn: &mut PgConnection,
    raw_id: &str,
) -> StoreResult<Option<CandidateCorrespondent>> {
    let Ok(id) = Uuid::parse_str(raw_id.trim()) else {
        return Ok(None);
    };
    let row = correspondents::table
        .inner_join(users::table)
        .filter(correspondents::id.eq(id))
        .select((correspondents::id, users::status))
        .first::<(Uuid, String)>(conn)
        .optional()?;

    match row {
        Some((id, status)) => Ok(Some(CandidateCorrespondent {
            id,
            account_status: status.parse()?,
        })),
        None => Ok(None),
    }
}

/// Opens a new request in `pending_approval` on behalf of a company.
pub fn create_request(
    conn: &mut PgConnection,
    actor: &Actor,
    draft: &RequestDraft,
) -> StoreResult<ServiceRequest> {
    let result = conn.transaction::<_, StoreError, _>(|conn| {
        let company_id = plan_create(actor)?;
        let draft = draft.validate()?;

        let new_request = NewServiceRequest {
            id: Uuid::new_v4(),
            company_id,
            service_type: draft.service_type.as_str().to_string(),
            location: draft.location.to_value(),
            date_time: draft.date_time,
            deadline: draft.deadline,
            status: RequestStatus::PendingApproval.as_str().to_string(),
            details: draft.details,
        };
        diesel::insert_into(service_requests::table)
            .values(&new_request)
            .execute(conn)?;

        record_change(
            conn,
            actor,
            new_request.id,
            Transition::Create,
            None,
            RequestStatus::PendingApproval,
            None,
        )?;

        Ok(service_requests::table
            .find(new_request.id)
            .first::<ServiceRequest>(conn)?)
    });

    match &result {
        Ok(request) => info!(
            request_id = %request.id,
            transition = %Transition::Create,
            to = %RequestStatus::PendingApproval,
            actor = %actor.user_id,
            "service request created"
        ),
        Err(err) => warn!(
            transition = %Transition::Create,
            actor = %actor.user_id,
            error = %err,
            "service request creation refused"
        ),
    }
    result
}

/// Checks, without writing, that `actor` could run `transition` right now.
pub fn preview(
    conn: &mut PgConnection,
    actor: &Actor,
    request_id: Uuid,
    transition: Transition,
) -> StoreResult<ServiceRequest> {
    let request = find_request(conn, request_id)?;
    let snapshot = RequestSnapshot::try_from(&request)?;
    authorize(actor, Some(&snapshot), transition)?;
    next_status(transition, snapshot.status)?;
    Ok(request)
}

/// Runs a transition whose input needs no further lookups.
pub fn execute(
    conn: &mut PgConnection,
    actor: &Actor,
    request_id: Uuid,
    command: Command,
) -> StoreResult<ServiceRequest> {
    let transition = command.transition();
    run_transition(conn, actor, request_id, transition, None, |_| Ok(command))
}

/// Assigns a correspondent. The candidate is resolved inside the transaction,
/// after the actor and the request status have been checked.
pub fn assign(
    conn: &mut PgConnection,
    actor: &Actor,
    request_id: Uuid,
    correspondent_id: &str,
    correspondent_value: String,
    instructions: Option<String>,
) -> StoreResult<ServiceRequest> {
    run_transition(conn, actor, request_id, Transition::Assign, None, |conn| {
        Ok(Command::Assign {
            correspondent: load_candidate(conn, correspondent_id)?,
            correspondent_value,
            instructions,
        })
    })
}

/// Completes a request and records the uploaded report as its document.
pub fn submit_documentation(
    conn: &mut PgConnection,
    actor: &Actor,
    request_id: Uuid,
    report: String,
    upload: &ReportUpload,
) -> StoreResult<ServiceRequest> {
    run_transition(
        conn,
        actor,
        request_id,
        Transition::SubmitDocumentation,
        Some(upload),
        |_| Ok(Command::SubmitDocumentation { report }),
    )
}

fn run_transition<F>(
    conn: &mut PgConnection,
    actor: &Actor,
    request_id: Uuid,
    transition: Transition,
    upload: Option<&ReportUpload>,
    build: F,
) -> StoreResult<ServiceRequest>
where
    F: FnOnce(&mut PgConnection) -> StoreResult<Command>,
{
    let result = conn.transaction::<_, StoreError, _>(|conn| {
        let locked: ServiceRequest = service_requests::table
            .find(request_id)
            .for_update()
            .first(conn)
            .optional()?
            .ok_or(LifecycleError::NotFound("service request"))?;
        let snapshot = RequestSnapshot::try_from(&locked)?;

        // reject early so lookups for the command only run for a plausible caller
        authorize(actor, Some(&snapshot), transition)?;
        next_status(transition, snapshot.status)?;

        let command = build(conn)?;
        let effect = plan(actor, &snapshot, &command)?;
        let now = Utc::now().naive_utc();

        let updated = diesel::update(
            service_requests::table
                .filter(service_requests::id.eq(request_id))
                .filter(service_requests::status.eq(effect.from.as_str())),
        )
        .set(TransitionChangeset::from_effect(&effect, now))
        .execute(conn)?;
        if updated == 0 {
            return Err(LifecycleError::InvalidState {
                transition,
                current: snapshot.status,
            }
            .into());
        }

        if let Some(upload) = upload {
            let document = NewDocument {
                id: upload.document_id,
                service_request_id: request_id,
                kind: "report".to_string(),
                name: upload.name.clone(),
                storage_key: upload.object.key.clone(),
                content_type: Some(upload.object.content_type.clone()),
                size_bytes: upload.object.size_bytes,
                checksum: upload.object.checksum.clone(),
                uploaded_by: Some(actor.user_id),
            };
            diesel::insert_into(documents::table)
                .values(&document)
                .execute(conn)?;
        }

        record_change(
            conn,
            actor,
            request_id,
            transition,
            Some(effect.from),
            effect.to,
            history_note(&effect, &snapshot),
        )?;

        Ok((
            service_requests::table
                .find(request_id)
                .first::<ServiceRequest>(conn)?,
            effect,
        ))
    });

    match result {
        Ok((request, effect)) => {
            info!(
                request_id = %request_id,
                transition = %transition,
                from = %effect.from,
                to = %effect.to,
                actor = %actor.user_id,
                "service request transitioned"
            );
            Ok(request)
        }
        Err(err) => {
            warn!(
                request_id = %request_id,
                transition = %transition,
                actor = %actor.user_id,
                error = %err,
                "service request transition refused"
            );
            Err(err)
        }
    }
}

fn record_change(
    conn: &mut PgConnection,
    actor: &Actor,
    request_id: Uuid,
    transition: Transition,
    from: Option<RequestStatus>,
    to: RequestStatus,
    notes: Option<String>,
) -> StoreResult<()> {
    let change = NewStatusChange {
        id: Uuid::new_v4(),
        service_request_id: request_id,
        from_status: from.map(|status| status.as_str().to_string()),
        to_status: to.as_str().to_string(),
        transition: transition.as_str().to_string(),
        actor_user_id: Some(actor.user_id),
        notes,
    };
    diesel::insert_into(service_request_history::table)
        .values(&change)
        .execute(conn)?;

    let notice = TransitionNotice {
        request_id,
        transition,
        from,
        to,
        actor_user_id: actor.user_id,
    };
    enqueue_job(conn, JOB_NOTIFY_PARTICIPANTS, &notice, None)?;
    Ok(())
}

fn history_note(effect: &Effect, before: &RequestSnapshot) -> Option<String> {
    let changes = &effect.changes;
    match effect.transition {
        Transition::SetValue => changes
            .company_value
            .map(|value| format!("company value {value}")),
        Transition::Assign => match (changes.correspondent_id, changes.correspondent_value) {
            (Some(Some(id)), Some(value)) => {
                Some(format!("assigned to correspondent {id} for {value}"))
            }
            _ => None,
        },
        Transition::Reject => before
            .correspondent_id
            .map(|id| format!("declined by correspondent {id}")),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::FieldChanges;

    fn draft() -> RequestDraft {
        RequestDraft {
            service_type: "hearing-conciliation".into(),
            location_city: "Campinas".into(),
            location_state: "sp".into(),
            date_time: "2026-11-03T14:30".into(),
            details: Some("  ".into()),
            deadline: Some("2026-11-05".into()),
        }
    }

    #[test]
    fn draft_is_normalized() {
        let valid = draft().validate().unwrap();
        assert_eq!(valid.service_type, ServiceType::HearingConciliation);
        assert_eq!(valid.location.state, "SP");
        assert_eq!(valid.details, None);
        assert_eq!(valid.deadline.unwrap().to_string(), "2026-11-05 23:59:59");
    }

    #[test]
    fn draft_rejects_unknown_service_type() {
        let mut bad = draft();
        bad.service_type = "teleportation".into();
        assert!(matches!(bad.validate(), Err(LifecycleError::Validation(_))));
    }

    #[test]
    fn draft_requires_schedule() {
        let mut bad = draft();
        bad.date_time = String::new();
        assert!(matches!(bad.validate(), Err(LifecycleError::Validation(_))));
    }

    #[test]
    fn changeset_leaves_untouched_columns_alone() {
        let effect = Effect {
            transition: Transition::Reject,
            from: RequestStatus::Assigned,
            to: RequestStatus::Rejected,
            changes: FieldChanges {
                correspondent_id: Some(None),
                ..FieldChanges::default()
            },
        };
        let now = Utc::now().naive_utc();
        let changeset = TransitionChangeset::from_effect(&effect, now);
        assert_eq!(changeset.status, "rejected");
        assert_eq!(changeset.correspondent_id, Some(None));
        assert_eq!(changeset.correspondent_value, None);
        assert_eq!(changeset.profit_margin, None);
        assert_eq!(changeset.instructions, None);
    }

    #[test]
    fn reject_note_names_former_assignee() {
        let correspondent = Uuid::new_v4();
        let mut before = RequestSnapshot::pending(Uuid::new_v4(), Uuid::new_v4());
        before.status = RequestStatus::Assigned;
        before.correspondent_id = Some(correspondent);
        let effect = Effect {
            transition: Transition::Reject,
            from: RequestStatus::Assigned,
            to: RequestStatus::Rejected,
            changes: FieldChanges {
                correspondent_id: Some(None),
                ..FieldChanges::default()
            },
        };
        assert_eq!(
            history_note(&effect, &before),
            Some(format!("declined by correspondent {correspondent}"))
        );
    }
}
