mod common;

use anyhow::Result;
use axum::http::StatusCode;
use common::{acquire_db_lock, read_json, TestApp, PASSWORD};
use jurisconnect::lifecycle::{Role, UserStatus};
use serde_json::json;

#[tokio::test]
async fn login_and_me_roundtrip() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;

    app.insert_user(
        "alice@example.com",
        PASSWORD,
        Role::Admin,
        UserStatus::Active,
    )
    .await?;

    let token = app.login_token("Alice@Example.com", PASSWORD).await?;

    let response = app.get("/api/auth/me", Some(&token)).await?;
    assert_eq!(response.status(), StatusCode::OK);
    let me = read_json(response).await?;

    assert_eq!(me["email"], "alice@example.com");
    assert_eq!(me["role"], "admin");
    assert_eq!(me["status"], "active");
    assert!(me["profile_id"].is_null());

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn registration_waits_for_approval() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;

    let response = app
        .post_json(
            "/api/auth/register",
            &json!({
                "role": "correspondent",
                "name": "Bruna Lima",
                "email": "bruna@example.com",
                "password": PASSWORD,
                "specialties": ["hearing-instruction"],
                "rates": { "hearing-instruction": "220.00" },
                "service_areas": [{ "city": "Niterói", "state": "rj" }],
            }),
            None,
        )
        .await?;
    assert_eq!(response.status(), StatusCode::CREATED);
    let registered = read_json(response).await?;
    assert_eq!(registered["status"], "pending");
    assert_eq!(registered["role"], "correspondent");

    let response = app
        .post_json(
            "/api/auth/login",
            &json!({ "email": "bruna@example.com", "password": PASSWORD }),
            None,
        )
        .await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let duplicate = app
        .post_json(
            "/api/auth/register",
            &json!({
                "role": "company",
                "name": "Other",
                "email": "bruna@example.com",
                "password": PASSWORD,
                "company_name": "Other Ltda",
            }),
            None,
        )
        .await?;
    assert_eq!(duplicate.status(), StatusCode::CONFLICT);

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn registration_validates_profile_records() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;

    let response = app
        .post_json(
            "/api/auth/register",
            &json!({
                "role": "correspondent",
                "name": "Caio",
                "email": "caio@example.com",
                "password": PASSWORD,
                "specialties": ["filing"],
                "service_areas": [{ "city": "Curitiba", "state": "Paraná" }],
            }),
            None,
        )
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .post_json(
            "/api/auth/register",
            &json!({
                "role": "admin",
                "name": "Mallory",
                "email": "mallory@example.com",
                "password": PASSWORD,
            }),
            None,
        )
        .await?;
    assert!(response.status().is_client_error());

    app.cleanup().await?;
    Ok(())
}
