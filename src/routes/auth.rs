use axum::{
    extract::State,
    http::{header::SET_COOKIE, HeaderMap, HeaderValue, StatusCode},
    Json,
};
use axum_extra::{headers::Cookie, typed_header::TypedHeader};
use chrono::{Duration as ChronoDuration, Utc};
use diesel::prelude::*;
use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    auth::{password, AuthenticatedUser},
    error::{AppError, AppResult},
    lifecycle::{optional_text, store, Role, UserStatus},
    models::{NewCompany, NewCorrespondent, NewRefreshToken, NewUser, RefreshToken, User},
    profile::CorrespondentProfile,
    schema::{companies, correspondents, refresh_tokens, users},
    state::AppState,
};

use crate::schema::refresh_tokens::dsl as refresh_dsl;

const REFRESH_COOKIE_NAME: &str = "refresh_token";

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Serialize)]
pub struct LoginResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
}

#[derive(Debug, Deserialize)]
pub struct CompanyRegistration {
    pub company_name: String,
    pub business_type: Option<String>,
    pub contact_name: Option<String>,
    pub document_number: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum ProfileRegistration {
    Company(CompanyRegistration),
    Correspondent(CorrespondentProfile),
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    pub phone: Option<String>,
    #[serde(flatten)]
    pub profile: ProfileRegistration,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub user_id: Uuid,
    pub profile_id: Uuid,
    pub email: String,
    pub role: Role,
    pub status: UserStatus,
}

#[derive(Debug, Serialize)]
pub struct MeResponse {
    pub user_id: Uuid,
    pub name: String,
    pub email: String,
    pub role: String,
    pub status: String,
    pub profile_id: Option<Uuid>,
}

/// Signs up a company or correspondent. The account stays `pending` until an
/// admin approves it.
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> AppResult<(StatusCode, Json<RegisterResponse>)> {
    let name = payload.name.trim().to_string();
    let email = payload.email.trim().to_lowercase();
    if name.is_empty() {
        return Err(AppError::bad_request("name must not be empty"));
    }
    if !email.contains('@') {
        return Err(AppError::bad_request("email must be a valid address"));
    }
    if payload.password.chars().count() < password::MIN_PASSWORD_LENGTH {
        return Err(AppError::bad_request(format!(
            "password must have at least {} characters",
            password::MIN_PASSWORD_LENGTH
        )));
    }

    let (role, profile) = match payload.profile {
        ProfileRegistration::Company(company) => {
            if company.company_name.trim().is_empty() {
                return Err(AppError::bad_request("company_name must not be empty"));
            }
            (Role::Company, ProfileRegistration::Company(company))
        }
        ProfileRegistration::Correspondent(profile) => (
            Role::Correspondent,
            ProfileRegistration::Correspondent(profile.validated()?),
        ),
    };

    let password_hash = password::hash_password(&payload.password)?;
    let user_id = Uuid::new_v4();
    let profile_id = Uuid::new_v4();
    let new_user = NewUser {
        id: user_id,
        name,
        email: email.clone(),
        password_hash,
        role: role.as_str().to_string(),
        status: UserStatus::Pending.as_str().to_string(),
        phone: optional_text(payload.phone.as_deref()),
    };

    let mut conn = state.db()?;
    conn.transaction::<_, AppError, _>(|conn| {
        match diesel::insert_into(users::table)
            .values(&new_user)
            .execute(conn)
        {
            Ok(_) => {}
            Err(diesel::result::Error::DatabaseError(
                diesel::result::DatabaseErrorKind::UniqueViolation,
                _,
            )) => return Err(AppError::conflict("email is already registered")),
            Err(err) => return Err(AppError::from(err)),
        }

        match profile {
            ProfileRegistration::Company(company) => {
                diesel::insert_into(companies::table)
                    .values(&NewCompany {
                        id: profile_id,
                        user_id,
                        company_name: company.company_name.trim().to_string(),
                        business_type: optional_text(company.business_type.as_deref()),
                        contact_name: optional_text(company.contact_name.as_deref()),
                        document_number: optional_text(company.document_number.as_deref()),
                    })
                    .execute(conn)?;
            }
            ProfileRegistration::Correspondent(profile) => {
                diesel::insert_into(correspondents::table)
                    .values(&NewCorrespondent {
                        id: profile_id,
                        user_id,
                        specialties: serde_json::to_value(&profile.specialties)?,
                        rates: serde_json::to_value(&profile.rates)?,
                        service_areas: serde_json::to_value(&profile.service_areas)?,
                        bank_info: profile
                            .bank_info
                            .as_ref()
                            .map(serde_json::to_value)
                            .transpose()?,
                    })
                    .execute(conn)?;
            }
        }
        Ok(())
    })?;

    info!(user_id = %user_id, role = %role, "participant registered");

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            user_id,
            profile_id,
            email,
            role,
            status: UserStatus::Pending,
        }),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> AppResult<(HeaderMap, Json<LoginResponse>)> {
    let mut conn = state.db()?;
    let email = payload.email.trim().to_lowercase();

    let user: User = match users::table
        .filter(users::email.eq(&email))
        .first(&mut conn)
    {
        Ok(user) => user,
        Err(diesel::result::Error::NotFound) => return Err(AppError::unauthorized()),
        Err(err) => return Err(AppError::from(err)),
    };

    let valid = password::verify_password(&payload.password, &user.password_hash)
        .map_err(|_| AppError::unauthorized())?;

    if !valid {
        return Err(AppError::unauthorized());
    }

    let role: Role = user.role.parse().map_err(AppError::internal)?;
    let status: UserStatus = user.status.parse().map_err(AppError::internal)?;
    if status != UserStatus::Active {
        warn!(user_id = %user.id, status = %status, "login refused for inactive account");
        return Err(AppError::new(
            StatusCode::UNAUTHORIZED,
            format!("account is {status}, not active"),
        ));
    }

    let now = Utc::now();
    diesel::update(users::table.find(user.id))
        .set(users::last_login_at.eq(now.naive_utc()))
        .execute(&mut conn)?;

    let access_token = state
        .jwt
        .generate_token(user.id, &user.email, role)
        .map_err(AppError::from)?;

    let refresh_value = generate_refresh_token();
    let refresh_hash = hash_refresh_token(&refresh_value);
    let refresh_expires_at = now + ChronoDuration::days(state.config.refresh_token_expiry_days);

    let new_refresh = NewRefreshToken {
        id: Uuid::new_v4(),
        user_id: user.id,
        token_hash: refresh_hash,
        issued_at: now.naive_utc(),
        expires_at: refresh_expires_at.naive_utc(),
    };

    diesel::insert_into(refresh_tokens::table)
        .values(&new_refresh)
        .execute(&mut conn)?;

    let mut headers = HeaderMap::new();
    headers.insert(
        SET_COOKIE,
        build_refresh_cookie(&state, &refresh_value, refresh_expires_at)?,
    );

    Ok((
        headers,
        Json(LoginResponse {
            access_token,
            token_type: "Bearer".to_string(),
            expires_in: state.config.jwt_expiry_minutes * 60,
        }),
    ))
}

pub async fn refresh(
    State(state): State<AppState>,
    jar: Option<TypedHeader<Cookie>>,
) -> AppResult<(HeaderMap, Json<LoginResponse>)> {
    let cookies = jar.ok_or_else(AppError::unauthorized)?;
    let refresh_value = cookies
        .get(REFRESH_COOKIE_NAME)
        .ok_or_else(AppError::unauthorized)?;

    let hashed = hash_refresh_token(refresh_value);
    let mut conn = state.db()?;
    let now = Utc::now();
    let now_naive = now.naive_utc();

    let token = match refresh_dsl::refresh_tokens
        .filter(refresh_dsl::token_hash.eq(&hashed))
        .filter(refresh_dsl::revoked_at.is_null())
        .filter(refresh_dsl::expires_at.gt(now_naive))
        .first::<RefreshToken>(&mut conn)
    {
        Ok(token) => token,
        Err(diesel::result::Error::NotFound) => return Err(AppError::unauthorized()),
        Err(err) => return Err(AppError::from(err)),
    };

    diesel::update(refresh_dsl::refresh_tokens.filter(refresh_dsl::id.eq(token.id)))
        .set((
            refresh_dsl::revoked_at.eq(now_naive),
            refresh_dsl::updated_at.eq(now_naive),
        ))
        .execute(&mut conn)?;

    let user: User = users::table
        .find(token.user_id)
        .first(&mut conn)
        .map_err(AppError::from)?;
    if user.status != UserStatus::Active.as_str() {
        return Err(AppError::unauthorized());
    }
    let role: Role = user.role.parse().map_err(AppError::internal)?;

    let access_token = state
        .jwt
        .generate_token(user.id, &user.email, role)
        .map_err(AppError::from)?;

    let new_refresh_value = generate_refresh_token();
    let new_refresh_hash = hash_refresh_token(&new_refresh_value);
    let new_refresh_expires = now + ChronoDuration::days(state.config.refresh_token_expiry_days);

    let new_refresh = NewRefreshToken {
        id: Uuid::new_v4(),
        user_id: user.id,
        token_hash: new_refresh_hash,
        issued_at: now_naive,
        expires_at: new_refresh_expires.naive_utc(),
    };

    diesel::insert_into(refresh_tokens::table)
        .values(&new_refresh)
        .execute(&mut conn)?;

    let mut headers = HeaderMap::new();
    headers.insert(
        SET_COOKIE,
        build_refresh_cookie(&state, &new_refresh_value, new_refresh_expires)?,
    );

    Ok((
        headers,
        Json(LoginResponse {
            access_token,
            token_type: "Bearer".to_string(),
            expires_in: state.config.jwt_expiry_minutes * 60,
        }),
    ))
}

pub async fn logout(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    jar: Option<TypedHeader<Cookie>>,
) -> AppResult<(HeaderMap, StatusCode)> {
    let mut conn = state.db()?;
    let now = Utc::now().naive_utc();
    let mut rows_affected = 0;

    if let Some(cookies) = jar {
        if let Some(value) = cookies.get(REFRESH_COOKIE_NAME) {
            let hashed = hash_refresh_token(value);
            rows_affected = diesel::update(
                refresh_dsl::refresh_tokens
                    .filter(refresh_dsl::token_hash.eq(hashed))
                    .filter(refresh_dsl::user_id.eq(user.user_id))
                    .filter(refresh_dsl::revoked_at.is_null()),
            )
            .set((
                refresh_dsl::revoked_at.eq(now),
                refresh_dsl::updated_at.eq(now),
            ))
            .execute(&mut conn)
            .unwrap_or(0);
        }
    }

    if rows_affected == 0 {
        let _ = diesel::update(
            refresh_dsl::refresh_tokens
                .filter(refresh_dsl::user_id.eq(user.user_id))
                .filter(refresh_dsl::revoked_at.is_null()),
        )
        .set((
            refresh_dsl::revoked_at.eq(now),
            refresh_dsl::updated_at.eq(now),
        ))
        .execute(&mut conn);
    }

    let mut headers = HeaderMap::new();
    headers.insert(SET_COOKIE, build_clear_refresh_cookie(&state)?);
    Ok((headers, StatusCode::NO_CONTENT))
}

pub async fn me(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> AppResult<Json<MeResponse>> {
    let mut conn = state.db()?;
    let account: User = users::table.find(user.user_id).first(&mut conn)?;
    let actor = store::load_actor(&mut conn, user.user_id)?;
    Ok(Json(MeResponse {
        user_id: account.id,
        name: account.name,
        email: account.email,
        role: account.role,
        status: account.status,
        profile_id: actor.profile_id,
    }))
}

fn hash_refresh_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

fn generate_refresh_token() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

fn build_refresh_cookie(
    state: &AppState,
    token: &str,
    expires_at: chrono::DateTime<Utc>,
) -> AppResult<HeaderValue> {
    let max_age = ChronoDuration::days(state.config.refresh_token_expiry_days).num_seconds();

    let mut parts = vec![format!("{}={}", REFRESH_COOKIE_NAME, token)];
    parts.push("Path=/".into());
    parts.push("HttpOnly".into());
    parts.push("SameSite=Strict".into());
    parts.push(format!("Max-Age={}", max_age));
    parts.push(format!("Expires={}", expires_at.to_rfc2822()));
    if state.config.refresh_cookie_secure {
        parts.push("Secure".into());
    }
    if let Some(domain) = &state.config.refresh_cookie_domain {
        parts.push(format!("Domain={}", domain));
    }

    HeaderValue::from_str(&parts.join("; ")).map_err(AppError::internal)
}

fn build_clear_refresh_cookie(state: &AppState) -> AppResult<HeaderValue> {
    let mut parts = vec![format!("{}=", REFRESH_COOKIE_NAME)];
    parts.push("Path=/".into());
    parts.push("HttpOnly".into());
    parts.push("SameSite=Strict".into());
    parts.push("Max-Age=0".into());
    parts.push("Expires=Thu, 01 Jan 1970 00:00:00 GMT".into());
    if state.config.refresh_cookie_secure {
        parts.push("Secure".into());
    }
    if let Some(domain) = &state.config.refresh_cookie_domain {
        parts.push(format!("Domain={}", domain));
    }

    HeaderValue::from_str(&parts.join("; ")).map_err(AppError::internal)
}
