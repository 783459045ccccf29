use std::collections::BTreeMap;

use axum::{
    extract::{Path, Query, State},
    Form, Json,
};
use chrono::Utc;
use diesel::{
    dsl::{count_star, sum},
    pg::PgConnection,
    prelude::*,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::{
    auth::AuthenticatedUser,
    error::{AppError, AppResult},
    jobs::{count_jobs_with_status, STATUS_FAILED, STATUS_QUEUED},
    lifecycle::{
        store, Actor, Command, Location, RequestStatus, Role, ServiceType, Transition, UserStatus,
    },
    models::{Company, Correspondent, ServiceRequest, User},
    profile::{BankInfo, CorrespondentProfile},
    schema::{companies, correspondents, service_requests, users},
    state::AppState,
};

use super::requests::{
    actor_for, load_detail, to_iso, ServiceRequestDetail, ServiceRequestView, StatusFilter,
};

#[derive(Debug, Default, Deserialize)]
pub struct AccountStatusFilter {
    pub status: Option<String>,
}

impl AccountStatusFilter {
    fn parse(&self) -> AppResult<Option<UserStatus>> {
        match self.status.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some(raw) => raw
                .parse::<UserStatus>()
                .map(Some)
                .map_err(|err| AppError::bad_request(err.to_string())),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SetValueForm {
    pub company_value: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct AssignForm {
    pub correspondent_id: String,
    pub correspondent_value: String,
    pub instructions: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RequestStats {
    pub total: i64,
    pub overdue: i64,
    pub by_status: BTreeMap<String, i64>,
}

#[derive(Debug, Serialize)]
pub struct ParticipantStats {
    pub pending_companies: i64,
    pub pending_correspondents: i64,
    pub active_correspondents: i64,
}

#[derive(Debug, Serialize)]
pub struct RevenueStats {
    pub billed: Decimal,
    pub paid_out: Decimal,
    pub margin: Decimal,
}

#[derive(Debug, Serialize)]
pub struct JobStats {
    pub queued: i64,
    pub failed: i64,
}

#[derive(Debug, Serialize)]
pub struct Dashboard {
    pub service_requests: RequestStats,
    pub participants: ParticipantStats,
    pub revenue: RevenueStats,
    pub notifications: JobStats,
}

#[derive(Debug, Serialize)]
pub struct AccountView {
    pub user_id: Uuid,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub status: String,
    pub last_login_at: Option<String>,
}

impl From<User> for AccountView {
    fn from(user: User) -> Self {
        Self {
            user_id: user.id,
            name: user.name,
            email: user.email,
            phone: user.phone,
            status: user.status,
            last_login_at: user.last_login_at.map(to_iso),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CompanyView {
    pub id: Uuid,
    pub account: AccountView,
    pub company_name: String,
    pub business_type: Option<String>,
    pub contact_name: Option<String>,
    pub document_number: Option<String>,
    pub created_at: String,
}

impl CompanyView {
    fn new(company: Company, user: User) -> Self {
        Self {
            id: company.id,
            account: user.into(),
            company_name: company.company_name,
            business_type: company.business_type,
            contact_name: company.contact_name,
            document_number: company.document_number,
            created_at: to_iso(company.created_at),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CorrespondentView {
    pub id: Uuid,
    pub account: AccountView,
    pub specialties: Vec<ServiceType>,
    pub rates: BTreeMap<ServiceType, Decimal>,
    pub service_areas: Vec<Location>,
    pub bank_info: Option<BankInfo>,
    pub created_at: String,
}

impl CorrespondentView {
    fn new(correspondent: Correspondent, user: User) -> Self {
        let profile = CorrespondentProfile::from_row(&correspondent);
        Self {
            id: correspondent.id,
            account: user.into(),
            specialties: profile.specialties,
            rates: profile.rates,
            service_areas: profile.service_areas,
            bank_info: profile.bank_info,
            created_at: to_iso(correspondent.created_at),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CandidateView {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub covers_location: bool,
    pub offers_service: bool,
    pub suggested_rate: Option<Decimal>,
    pub service_areas: Vec<Location>,
}

#[derive(Debug, Serialize)]
pub struct AssignmentOptions {
    pub request: ServiceRequestView,
    pub candidates: Vec<CandidateView>,
}

fn admin(conn: &mut PgConnection, user: &AuthenticatedUser) -> AppResult<Actor> {
    let actor = actor_for(conn, user, Role::Admin)?;
    if !actor.is_active() {
        return Err(AppError::forbidden(format!("account is {}, not active", actor.status)));
    }
    Ok(actor)
}

pub async fn dashboard(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> AppResult<Json<Dashboard>> {
    let mut conn = state.db()?;
    admin(&mut conn, &user)?;

    let rows: Vec<(String, i64)> = service_requests::table
        .group_by(service_requests::status)
        .select((service_requests::status, count_star()))
        .load(&mut conn)?;
    let mut by_status: BTreeMap<String, i64> = RequestStatus::ALL
        .iter()
        .map(|status| (status.as_str().to_string(), 0))
        .collect();
    let mut total = 0;
    for (status, count) in rows {
        total += count;
        by_status.insert(status, count);
    }

    let closed: Vec<&str> = RequestStatus::ALL
        .iter()
        .filter(|status| status.is_closed())
        .map(|status| status.as_str())
        .collect();
    let overdue: i64 = service_requests::table
        .filter(service_requests::deadline.lt(Utc::now().naive_utc()))
        .filter(service_requests::status.ne_all(closed))
        .select(count_star())
        .first(&mut conn)?;

    let pending_companies = count_accounts(&mut conn, Role::Company, UserStatus::Pending)?;
    let pending_correspondents =
        count_accounts(&mut conn, Role::Correspondent, UserStatus::Pending)?;
    let active_correspondents = count_accounts(&mut conn, Role::Correspondent, UserStatus::Active)?;

    let (billed, paid_out, margin): (Option<Decimal>, Option<Decimal>, Option<Decimal>) =
        service_requests::table
            .filter(service_requests::status.eq(RequestStatus::Completed.as_str()))
            .select((
                sum(service_requests::company_value),
                sum(service_requests::correspondent_value),
                sum(service_requests::profit_margin),
            ))
            .first(&mut conn)?;

    Ok(Json(Dashboard {
        service_requests: RequestStats {
            total,
            overdue,
            by_status,
        },
        participants: ParticipantStats {
            pending_companies,
            pending_correspondents,
            active_correspondents,
        },
        revenue: RevenueStats {
            billed: billed.unwrap_or_default(),
            paid_out: paid_out.unwrap_or_default(),
            margin: margin.unwrap_or_default(),
        },
        notifications: JobStats {
            queued: count_jobs_with_status(&mut conn, STATUS_QUEUED)?,
            failed: count_jobs_with_status(&mut conn, STATUS_FAILED)?,
        },
    }))
}

fn count_accounts(conn: &mut PgConnection, role: Role, status: UserStatus) -> AppResult<i64> {
    Ok(users::table
        .filter(users::role.eq(role.as_str()))
        .filter(users::status.eq(status.as_str()))
        .select(count_star())
        .first(conn)?)
}

pub async fn list_companies(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(filter): Query<AccountStatusFilter>,
) -> AppResult<Json<Vec<CompanyView>>> {
    let status = filter.parse()?;
    let mut conn = state.db()?;
    admin(&mut conn, &user)?;

    let mut query = companies::table
        .inner_join(users::table)
        .order(companies::created_at.desc())
        .into_boxed();
    if let Some(status) = status {
        query = query.filter(users::status.eq(status.as_str()));
    }
    let rows: Vec<(Company, User)> = query.load(&mut conn)?;
    Ok(Json(
        rows.into_iter()
            .map(|(company, user)| CompanyView::new(company, user))
            .collect(),
    ))
}

pub async fn list_correspondents(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(filter): Query<AccountStatusFilter>,
) -> AppResult<Json<Vec<CorrespondentView>>> {
    let status = filter.parse()?;
    let mut conn = state.db()?;
    admin(&mut conn, &user)?;

    let mut query = correspondents::table
        .inner_join(users::table)
        .order(correspondents::created_at.desc())
        .into_boxed();
    if let Some(status) = status {
        query = query.filter(users::status.eq(status.as_str()));
    }
    let rows: Vec<(Correspondent, User)> = query.load(&mut conn)?;
    Ok(Json(
        rows.into_iter()
            .map(|(correspondent, user)| CorrespondentView::new(correspondent, user))
            .collect(),
    ))
}

/// Moves the account behind a participant profile to `target`.
fn review_account(
    conn: &mut PgConnection,
    admin: &Actor,
    role: Role,
    user_id: Uuid,
    target: UserStatus,
) -> AppResult<User> {
    conn.transaction::<_, AppError, _>(|conn| {
        let user: User = users::table.find(user_id).for_update().first(conn)?;
        let current: UserStatus = user
            .status
            .parse()
            .map_err(AppError::internal)?;
        let allowed = match target {
            UserStatus::Active => current != UserStatus::Active,
            UserStatus::Rejected => current == UserStatus::Pending,
            UserStatus::Pending | UserStatus::Inactive => false,
        };
        if !allowed {
            return Err(AppError::conflict(format!(
                "cannot move a {current} {role} account to {target}"
            )));
        }

        let updated: User = diesel::update(users::table.find(user_id))
            .set((
                users::status.eq(target.as_str()),
                users::updated_at.eq(Utc::now().naive_utc()),
            ))
            .get_result(conn)?;
        info!(
            user_id = %user_id,
            role = %role,
            from = %current,
            to = %target,
            actor = %admin.user_id,
            "participant account reviewed"
        );
        Ok(updated)
    })
}

async fn review_company(
    state: &AppState,
    user: &AuthenticatedUser,
    company_id: Uuid,
    target: UserStatus,
) -> AppResult<Json<CompanyView>> {
    let mut conn = state.db()?;
    let actor = admin(&mut conn, user)?;
    let company: Company = companies::table.find(company_id).first(&mut conn)?;
    let account = review_account(&mut conn, &actor, Role::Company, company.user_id, target)?;
    Ok(Json(CompanyView::new(company, account)))
}

async fn review_correspondent(
    state: &AppState,
    user: &AuthenticatedUser,
    correspondent_id: Uuid,
    target: UserStatus,
) -> AppResult<Json<CorrespondentView>> {
    let mut conn = state.db()?;
    let actor = admin(&mut conn, user)?;
    let correspondent: Correspondent = correspondents::table
        .find(correspondent_id)
        .first(&mut conn)?;
    let account = review_account(
        &mut conn,
        &actor,
        Role::Correspondent,
        correspondent.user_id,
        target,
    )?;
    Ok(Json(CorrespondentView::new(correspondent, account)))
}

pub async fn approve_company(
    State(state): State<AppState>,
    Path(company_id): Path<Uuid>,
    user: AuthenticatedUser,
) -> AppResult<Json<CompanyView>> {
    review_company(&state, &user, company_id, UserStatus::Active).await
}

pub async fn reject_company(
    State(state): State<AppState>,
    Path(company_id): Path<Uuid>,
    user: AuthenticatedUser,
) -> AppResult<Json<CompanyView>> {
    review_company(&state, &user, company_id, UserStatus::Rejected).await
}

pub async fn approve_correspondent(
    State(state): State<AppState>,
    Path(correspondent_id): Path<Uuid>,
    user: AuthenticatedUser,
) -> AppResult<Json<CorrespondentView>> {
    review_correspondent(&state, &user, correspondent_id, UserStatus::Active).await
}

pub async fn reject_correspondent(
    State(state): State<AppState>,
    Path(correspondent_id): Path<Uuid>,
    user: AuthenticatedUser,
) -> AppResult<Json<CorrespondentView>> {
    review_correspondent(&state, &user, correspondent_id, UserStatus::Rejected).await
}

pub async fn list_service_requests(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(filter): Query<StatusFilter>,
) -> AppResult<Json<Vec<ServiceRequestView>>> {
    let status = filter.parse()?;
    let mut conn = state.db()?;
    admin(&mut conn, &user)?;

    let mut query = service_requests::table
        .order(service_requests::created_at.desc())
        .into_boxed();
    if let Some(status) = status {
        query = query.filter(service_requests::status.eq(status.as_str()));
    }
    let requests: Vec<ServiceRequest> = query.load(&mut conn)?;
    Ok(Json(
        requests
            .into_iter()
            .map(|request| ServiceRequestView::for_role(request, Role::Admin))
            .collect(),
    ))
}

pub async fn get_service_request(
    State(state): State<AppState>,
    Path(request_id): Path<Uuid>,
    user: AuthenticatedUser,
) -> AppResult<Json<ServiceRequestDetail>> {
    let actor = {
        let mut conn = state.db()?;
        admin(&mut conn, &user)?
    };
    Ok(Json(load_detail(&state, request_id, &actor).await?))
}

pub async fn set_value(
    State(state): State<AppState>,
    Path(request_id): Path<Uuid>,
    user: AuthenticatedUser,
    Form(form): Form<SetValueForm>,
) -> AppResult<Json<ServiceRequestView>> {
    let mut conn = state.db()?;
    let actor = actor_for(&mut conn, &user, Role::Admin)?;
    let request = store::execute(
        &mut conn,
        &actor,
        request_id,
        Command::SetValue {
            company_value: form.company_value,
        },
    )?;
    Ok(Json(ServiceRequestView::for_role(request, Role::Admin)))
}

/// Lists active correspondents for an approved request, those serving its
/// location first.
pub async fn assignment_options(
    State(state): State<AppState>,
    Path(request_id): Path<Uuid>,
    user: AuthenticatedUser,
) -> AppResult<Json<AssignmentOptions>> {
    let mut conn = state.db()?;
    let actor = actor_for(&mut conn, &user, Role::Admin)?;
    let request = store::preview(&mut conn, &actor, request_id, Transition::Assign)?;
    let location = Location::from_value(&request.location);
    let service_type = request.service_type.parse::<ServiceType>().ok();

    let rows: Vec<(Correspondent, User)> = correspondents::table
        .inner_join(users::table)
        .filter(users::status.eq(UserStatus::Active.as_str()))
        .order(users::name.asc())
        .load(&mut conn)?;

    let mut candidates: Vec<CandidateView> = rows
        .into_iter()
        .map(|(correspondent, account)| {
            let profile = CorrespondentProfile::from_row(&correspondent);
            CandidateView {
                id: correspondent.id,
                name: account.name,
                email: account.email,
                covers_location: location
                    .as_ref()
                    .map(|location| profile.covers(location))
                    .unwrap_or(false),
                offers_service: service_type
                    .map(|service| profile.specialties.contains(&service))
                    .unwrap_or(false),
                suggested_rate: service_type
                    .and_then(|service| profile.rates.get(&service).copied()),
                service_areas: profile.service_areas,
            }
        })
        .collect();
    // stable: keeps name order within each group
    candidates.sort_by_key(|candidate| (!candidate.covers_location, !candidate.offers_service));

    Ok(Json(AssignmentOptions {
        request: ServiceRequestView::for_role(request, Role::Admin),
        candidates,
    }))
}

pub async fn assign_correspondent(
    State(state): State<AppState>,
    Path(request_id): Path<Uuid>,
    user: AuthenticatedUser,
    Form(form): Form<AssignForm>,
) -> AppResult<Json<ServiceRequestView>> {
    let mut conn = state.db()?;
    let actor = actor_for(&mut conn, &user, Role::Admin)?;
    let request = store::assign(
        &mut conn,
        &actor,
        request_id,
        &form.correspondent_id,
        form.correspondent_value,
        form.instructions,
    )?;
    Ok(Json(ServiceRequestView::for_role(request, Role::Admin)))
}
