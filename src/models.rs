use chrono::NaiveDateTime;
use diesel::prelude::*;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::schema::*;

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = users)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub role: String,
    pub status: String,
    pub phone: Option<String>,
    pub last_login_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = users)]
pub struct NewUser {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub role: String,
    pub status: String,
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations)]
#[diesel(table_name = companies)]
#[diesel(belongs_to(User))]
pub struct Company {
    pub id: Uuid,
    pub user_id: Uuid,
    pub company_name: String,
    pub business_type: Option<String>,
    pub contact_name: Option<String>,
    pub document_number: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = companies)]
pub struct NewCompany {
    pub id: Uuid,
    pub user_id: Uuid,
    pub company_name: String,
    pub business_type: Option<String>,
    pub contact_name: Option<String>,
    pub document_number: Option<String>,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations)]
#[diesel(table_name = correspondents)]
#[diesel(belongs_to(User))]
pub struct Correspondent {
    pub id: Uuid,
    pub user_id: Uuid,
    pub specialties: serde_json::Value,
    pub rates: serde_json::Value,
    pub service_areas: serde_json::Value,
    pub bank_info: Option<serde_json::Value>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = correspondents)]
pub struct NewCorrespondent {
    pub id: Uuid,
    pub user_id: Uuid,
    pub specialties: serde_json::Value,
    pub rates: serde_json::Value,
    pub service_areas: serde_json::Value,
    pub bank_info: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations)]
#[diesel(table_name = service_requests)]
#[diesel(belongs_to(Company))]
pub struct ServiceRequest {
    pub id: Uuid,
    pub company_id: Uuid,
    pub correspondent_id: Option<Uuid>,
    pub service_type: String,
    pub location: serde_json::Value,
    pub date_time: NaiveDateTime,
    pub deadline: Option<NaiveDateTime>,
    pub status: String,
    pub company_value: Option<Decimal>,
    pub correspondent_value: Option<Decimal>,
    pub profit_margin: Option<Decimal>,
    pub details: Option<String>,
    pub instructions: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = service_requests)]
pub struct NewServiceRequest {
    pub id: Uuid,
    pub company_id: Uuid,
    pub service_type: String,
    pub location: serde_json::Value,
    pub date_time: NaiveDateTime,
    pub deadline: Option<NaiveDateTime>,
    pub status: String,
    pub details: Option<String>,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations)]
#[diesel(table_name = service_request_history)]
#[diesel(belongs_to(ServiceRequest))]
pub struct StatusChange {
    pub id: Uuid,
    pub service_request_id: Uuid,
    pub from_status: Option<String>,
    pub to_status: String,
    pub transition: String,
    pub actor_user_id: Option<Uuid>,
    pub notes: Option<String>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = service_request_history)]
pub struct NewStatusChange {
    pub id: Uuid,
    pub service_request_id: Uuid,
    pub from_status: Option<String>,
    pub to_status: String,
    pub transition: String,
    pub actor_user_id: Option<Uuid>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations)]
#[diesel(table_name = documents)]
#[diesel(belongs_to(ServiceRequest))]
pub struct Document {
    pub id: Uuid,
    pub service_request_id: Uuid,
    pub kind: String,
    pub name: String,
    pub storage_key: String,
    pub content_type: Option<String>,
    pub size_bytes: i64,
    pub checksum: String,
    pub uploaded_by: Option<Uuid>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = documents)]
pub struct NewDocument {
    pub id: Uuid,
    pub service_request_id: Uuid,
    pub kind: String,
    pub name: String,
    pub storage_key: String,
    pub content_type: Option<String>,
    pub size_bytes: i64,
    pub checksum: String,
    pub uploaded_by: Option<Uuid>,
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = jobs)]
pub struct Job {
    pub id: Uuid,
    pub job_type: String,
    pub payload: serde_json::Value,
    pub status: String,
    pub attempts: i32,
    pub run_after: NaiveDateTime,
    pub last_error: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = jobs)]
pub struct NewJob {
    pub id: Uuid,
    pub job_type: String,
    pub payload: serde_json::Value,
    pub status: String,
    pub run_after: NaiveDateTime,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations)]
#[diesel(table_name = refresh_tokens)]
#[diesel(belongs_to(User))]
pub struct RefreshToken {
    pub id: Uuid,
    pub user_id: Uuid,
    pub token_hash: String,
    pub issued_at: NaiveDateTime,
    pub expires_at: NaiveDateTime,
    pub revoked_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = refresh_tokens)]
pub struct NewRefreshToken {
    pub id: Uuid,
    pub user_id: Uuid,
    pub token_hash: String,
    pub issued_at: NaiveDateTime,
    pub expires_at: NaiveDateTime,
}
