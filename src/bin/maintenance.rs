use std::env;

use anyhow::{bail, Context, Result};
use diesel::prelude::*;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use jurisconnect::{
    auth::password::{hash_password, MIN_PASSWORD_LENGTH},
    config::AppConfig,
    db,
    lifecycle::{Role, UserStatus},
    models::NewUser,
    schema::users,
};

const USAGE: &str =
    "Usage: maintenance create-admin <email> <name>  (password read from ADMIN_PASSWORD)";

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    init_tracing();

    let mut args = env::args().skip(1);
    match args.next().as_deref() {
        Some("create-admin") => {
            let email = args.next().context(USAGE)?;
            let name = args.collect::<Vec<_>>().join(" ");
            create_admin(&email, &name)?;
        }
        Some(cmd) => {
            eprintln!("Unknown command: {cmd}\n{USAGE}");
            std::process::exit(1);
        }
        None => {
            eprintln!("{USAGE}");
            std::process::exit(1);
        }
    }

    Ok(())
}

/// Admin accounts cannot self-register; operators create them here, active.
fn create_admin(email: &str, name: &str) -> Result<()> {
    let email = email.trim().to_lowercase();
    if !email.contains('@') {
        bail!("{email} is not an email address");
    }
    let name = match name.trim() {
        "" => "Administrator",
        trimmed => trimmed,
    };
    let password = env::var("ADMIN_PASSWORD").context("ADMIN_PASSWORD must be set")?;
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        bail!("ADMIN_PASSWORD must have at least {MIN_PASSWORD_LENGTH} characters");
    }

    let config = AppConfig::from_env()?;
    tracing::info!(
        component = "maintenance",
        database_url = %config.redacted_database_url(),
        "loaded configuration"
    );
    let pool = db::init_pool_with_size(&config.database_url, 1)?;
    db::run_migrations(&pool)?;
    let mut conn = pool.get().context("failed to get database connection")?;

    let new_user = NewUser {
        id: Uuid::new_v4(),
        name: name.to_string(),
        email: email.clone(),
        password_hash: hash_password(&password)?,
        role: Role::Admin.as_str().to_string(),
        status: UserStatus::Active.as_str().to_string(),
        phone: None,
    };
    diesel::insert_into(users::table)
        .values(&new_user)
        .execute(&mut conn)
        .with_context(|| format!("failed to create admin {email}"))?;

    println!("Created admin {email} ({})", new_user.id);
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}
