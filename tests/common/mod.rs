use std::collections::HashMap;
use std::env;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, ensure, Context, Result};
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel::PgConnection;
use diesel_migrations::MigrationHarness;
use http_body_util::BodyExt;
use jurisconnect::auth::jwt::JwtService;
use jurisconnect::auth::password::hash_password;
use jurisconnect::config::AppConfig;
use jurisconnect::db::{self, PgPool, MIGRATIONS};
use jurisconnect::lifecycle::{Role, UserStatus};
use jurisconnect::models::{Job, NewCompany, NewCorrespondent, NewUser, StatusChange};
use jurisconnect::notify::{Notification, Notifier};
use jurisconnect::routes;
use jurisconnect::state::AppState;
use jurisconnect::storage::ObjectStorage;
use jurisconnect::{default_handlers, Worker};
use once_cell::sync::Lazy;
use serde::Serialize;
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tower::util::ServiceExt;
use uuid::Uuid;

static DB_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

#[allow(dead_code)]
#[derive(Clone)]
pub struct FakeObject {
    pub key: String,
    pub bytes: Vec<u8>,
    pub content_type: String,
}

#[derive(Default)]
pub struct FakeStorage {
    objects: Mutex<HashMap<String, FakeObject>>,
}

#[async_trait]
impl ObjectStorage for FakeStorage {
    async fn put_object(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<()> {
        let stored = FakeObject {
            key: key.to_string(),
            bytes,
            content_type: content_type.to_string(),
        };
        let mut guard = self.objects.lock().await;
        guard.insert(stored.key.clone(), stored);
        Ok(())
    }

    async fn presign_get_object(&self, key: &str, expires_in: Duration) -> Result<String> {
        let guard = self.objects.lock().await;
        ensure!(guard.contains_key(key), "object {key} missing");
        Ok(format!(
            "https://fake-storage/{key}?expires_in={}",
            expires_in.as_secs()
        ))
    }

    async fn delete_object(&self, key: &str) -> Result<()> {
        let mut guard = self.objects.lock().await;
        guard.remove(key);
        Ok(())
    }
}

impl FakeStorage {
    #[allow(dead_code)]
    pub async fn get(&self, key: &str) -> Option<FakeObject> {
        let guard = self.objects.lock().await;
        guard.get(key).cloned()
    }

    #[allow(dead_code)]
    pub async fn object_count(&self) -> usize {
        let guard = self.objects.lock().await;
        guard.len()
    }
}

/// Keeps every notification instead of delivering it.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<Notification>>,
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, notification: &Notification) -> Result<()> {
        self.sent.lock().await.push(notification.clone());
        Ok(())
    }
}

impl RecordingNotifier {
    #[allow(dead_code)]
    pub async fn sent(&self) -> Vec<Notification> {
        self.sent.lock().await.clone()
    }
}

pub struct TestApp {
    pub state: AppState,
    router: Router,
    storage: Arc<FakeStorage>,
    notifier: Arc<RecordingNotifier>,
}

#[allow(dead_code)]
pub struct Participant {
    pub user_id: Uuid,
    pub profile_id: Uuid,
    pub email: String,
}

impl TestApp {
    pub async fn new() -> Result<Self> {
        let database_url = env::var("TEST_DATABASE_URL")
            .context("TEST_DATABASE_URL must be set for integration tests")?;

        let config = AppConfig {
            database_url: database_url.clone(),
            database_max_pool_size: db::DEFAULT_MAX_POOL_SIZE,
            server_host: "127.0.0.1".to_string(),
            server_port: 0,
            jwt_secret: "test-secret".to_string(),
            jwt_issuer: "test-issuer".to_string(),
            jwt_audience: "test-audience".to_string(),
            jwt_expiry_minutes: 60,
            refresh_token_expiry_days: 30,
            refresh_cookie_secure: false,
            refresh_cookie_domain: None,
            cors_allowed_origin: None,
            aws_endpoint_url: None,
            aws_access_key_id: None,
            aws_secret_access_key: None,
            aws_region: "us-east-1".to_string(),
            s3_bucket: "test-bucket".to_string(),
            notification_webhook_url: None,
            notification_max_attempts: 3,
        };

        let pool = db::init_pool_with_size(&config.database_url, config.database_max_pool_size)?;
        prepare_database(&pool).await?;

        let storage = Arc::new(FakeStorage::default());
        let notifier = Arc::new(RecordingNotifier::default());
        let storage_for_state: Arc<dyn ObjectStorage> = storage.clone();
        let notifier_for_state: Arc<dyn Notifier> = notifier.clone();
        let jwt = JwtService::from_config(&config)?;
        let state = AppState::new(
            pool.clone(),
            config,
            storage_for_state,
            notifier_for_state,
            jwt,
        );
        let router = routes::create_router(state.clone());

        Ok(Self {
            state,
            router,
            storage,
            notifier,
        })
    }

    pub async fn cleanup(&self) -> Result<()> {
        let pool = self.state.pool.clone();
        tokio::task::spawn_blocking(move || -> Result<()> {
            let mut conn = pool
                .get()
                .map_err(|err| anyhow!("failed to get cleanup connection: {err}"))?;
            truncate_all(&mut conn)?;
            Ok(())
        })
        .await
        .context("cleanup task panicked")?
    }

    #[allow(dead_code)]
    pub fn storage(&self) -> Arc<FakeStorage> {
        self.storage.clone()
    }

    #[allow(dead_code)]
    pub fn notifier(&self) -> Arc<RecordingNotifier> {
        self.notifier.clone()
    }

    pub async fn insert_user(
        &self,
        email: &str,
        password: &str,
        role: Role,
        status: UserStatus,
    ) -> Result<Uuid> {
        let email = email.to_string();
        let password = password.to_string();
        self.with_conn(move |conn| insert_user_row(conn, &email, &password, role, status))
            .await
    }

    #[allow(dead_code)]
    pub async fn insert_company(&self, email: &str, status: UserStatus) -> Result<Participant> {
        let email = email.to_string();
        self.with_conn(move |conn| {
            let user_id = insert_user_row(conn, &email, PASSWORD, Role::Company, status)?;
            let company = NewCompany {
                id: Uuid::new_v4(),
                user_id,
                company_name: format!("Company of {email}"),
                business_type: Some("law firm".into()),
                contact_name: None,
                document_number: None,
            };
            diesel::insert_into(jurisconnect::schema::companies::table)
                .values(&company)
                .execute(conn)
                .context("failed to insert company")?;
            Ok(Participant {
                user_id,
                profile_id: company.id,
                email,
            })
        })
        .await
    }

    #[allow(dead_code)]
    pub async fn insert_correspondent(
        &self,
        email: &str,
        status: UserStatus,
        areas: &[(&str, &str)],
    ) -> Result<Participant> {
        let email = email.to_string();
        let areas: Vec<Value> = areas
            .iter()
            .map(|(city, state)| json!({ "city": city, "state": state }))
            .collect();
        self.with_conn(move |conn| {
            let user_id = insert_user_row(conn, &email, PASSWORD, Role::Correspondent, status)?;
            let correspondent = NewCorrespondent {
                id: Uuid::new_v4(),
                user_id,
                specialties: json!(["hearing-conciliation", "filing"]),
                rates: json!({ "hearing-conciliation": "180.00" }),
                service_areas: Value::Array(areas),
                bank_info: None,
            };
            diesel::insert_into(jurisconnect::schema::correspondents::table)
                .values(&correspondent)
                .execute(conn)
                .context("failed to insert correspondent")?;
            Ok(Participant {
                user_id,
                profile_id: correspondent.id,
                email,
            })
        })
        .await
    }

    #[allow(dead_code)]
    pub async fn set_user_status(&self, user_id: Uuid, status: UserStatus) -> Result<()> {
        self.with_conn(move |conn| {
            use jurisconnect::schema::users;
            diesel::update(users::table.find(user_id))
                .set(users::status.eq(status.as_str()))
                .execute(conn)
                .context("failed to update user status")?;
            Ok(())
        })
        .await
    }

    pub async fn login_token(&self, email: &str, password: &str) -> Result<String> {
        let response = self
            .post_json(
                "/api/auth/login",
                &json!({ "email": email, "password": password }),
                None,
            )
            .await?;

        ensure!(
            response.status() == StatusCode::OK,
            "login failed with status {}",
            response.status()
        );

        let body = read_json(response).await?;
        body["access_token"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| anyhow!("login response has no access_token"))
    }

    #[allow(dead_code)]
    pub async fn jobs_by_type(&self, ty: &str) -> Result<Vec<Job>> {
        let ty = ty.to_string();
        self.with_conn(move |conn| {
            use jurisconnect::schema::jobs;
            let rows = jobs::table
                .filter(jobs::job_type.eq(&ty))
                .order(jobs::created_at.asc())
                .load::<Job>(conn)
                .context("failed to load jobs")?;
            Ok(rows)
        })
        .await
    }

    #[allow(dead_code)]
    pub async fn history(&self, request_id: Uuid) -> Result<Vec<StatusChange>> {
        self.with_conn(move |conn| {
            use jurisconnect::schema::service_request_history as history;
            let rows = history::table
                .filter(history::service_request_id.eq(request_id))
                .order(history::created_at.asc())
                .load::<StatusChange>(conn)
                .context("failed to load history")?;
            Ok(rows)
        })
        .await
    }

    /// Drains the job queue through the real worker handlers.
    #[allow(dead_code)]
    pub async fn run_jobs(&self) -> Result<usize> {
        let worker = Worker::new(
            Arc::new(self.state.clone()),
            default_handlers(),
            Duration::from_millis(10),
        );
        let mut processed = 0;
        while worker.tick().await? {
            processed += 1;
        }
        Ok(processed)
    }

    pub async fn post_json<T: Serialize + ?Sized>(
        &self,
        path: &str,
        payload: &T,
        token: Option<&str>,
    ) -> Result<hyper::Response<Body>> {
        let body = serde_json::to_vec(payload)?;
        let mut builder = Request::builder()
            .method(Method::POST)
            .uri(path)
            .header("content-type", "application/json");
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        let request = builder.body(Body::from(body))?;
        Ok(self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("infallible response"))
    }

    #[allow(dead_code)]
    pub async fn post_form(
        &self,
        path: &str,
        fields: &[(&str, &str)],
        token: Option<&str>,
    ) -> Result<hyper::Response<Body>> {
        let body = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(fields)
            .finish();
        let mut builder = Request::builder()
            .method(Method::POST)
            .uri(path)
            .header("content-type", "application/x-www-form-urlencoded");
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        let request = builder.body(Body::from(body))?;
        Ok(self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("infallible response"))
    }

    pub async fn get(&self, path: &str, token: Option<&str>) -> Result<hyper::Response<Body>> {
        let mut builder = Request::builder().method(Method::GET).uri(path);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        let request = builder.body(Body::empty())?;
        Ok(self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("infallible response"))
    }

    #[allow(dead_code)]
    pub async fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut PgConnection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.state.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool
                .get()
                .map_err(|err| anyhow!("failed to get database connection: {err}"))?;
            f(&mut conn)
        })
        .await
        .context("connection task panicked")?
    }
}

/// Password given to every participant created through the helpers.
pub const PASSWORD: &str = "correct-horse-battery";

pub async fn acquire_db_lock() -> tokio::sync::MutexGuard<'static, ()> {
    DB_LOCK.lock().await
}

pub async fn body_to_vec(body: Body) -> Result<Vec<u8>> {
    let collected = body
        .collect()
        .await
        .map_err(|err| anyhow!("failed to read response body: {err}"))?;
    Ok(collected.to_bytes().to_vec())
}

#[allow(dead_code)]
pub async fn read_json(response: hyper::Response<Body>) -> Result<Value> {
    let body = body_to_vec(response.into_body()).await?;
    serde_json::from_slice(&body).context("response body is not JSON")
}

fn insert_user_row(
    conn: &mut PgConnection,
    email: &str,
    password: &str,
    role: Role,
    status: UserStatus,
) -> Result<Uuid> {
    let user = NewUser {
        id: Uuid::new_v4(),
        name: email.split('@').next().unwrap_or(email).to_string(),
        email: email.to_string(),
        password_hash: hash_password(password)?,
        role: role.as_str().to_string(),
        status: status.as_str().to_string(),
        phone: None,
    };
    diesel::insert_into(jurisconnect::schema::users::table)
        .values(&user)
        .execute(conn)
        .context("failed to insert user")?;
    Ok(user.id)
}

async fn prepare_database(pool: &PgPool) -> Result<()> {
    let pool = pool.clone();
    tokio::task::spawn_blocking(move || -> Result<()> {
        let mut conn = pool
            .get()
            .map_err(|err| anyhow!("failed to acquire connection: {err}"))?;
        conn.run_pending_migrations(MIGRATIONS)
            .map_err(|err| anyhow!("failed to run migrations: {err}"))?;
        truncate_all(&mut conn)?;
        Ok(())
    })
    .await
    .context("migration task panicked")?
}

fn truncate_all(conn: &mut PgConnection) -> Result<()> {
    conn.batch_execute(
        "TRUNCATE TABLE documents, service_request_history, service_requests, correspondents, companies, refresh_tokens, jobs, users RESTART IDENTITY CASCADE;",
    )
    .context("failed to truncate tables")?;
    Ok(())
}
