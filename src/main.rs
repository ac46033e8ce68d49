use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpServer};
use anyhow::Context;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing_subscriber::EnvFilter;

mod config;
mod handlers;
mod message;
mod models;
mod routes;
mod utils;

#[cfg(test)]
mod tests;

use crate::config::Settings;
use crate::utils::password::hash_password;
use crate::utils::storage::Storage;

fn init_tracing(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Creates the configured admin account when the database has no admin yet.
async fn bootstrap_admin(pool: &PgPool, settings: &Settings) -> anyhow::Result<()> {
    let Some((email, password)) = settings.bootstrap_admin() else {
        return Ok(());
    };

    let has_admin = sqlx::query_scalar::<_, bool>(
        "SELECT EXISTS (
            SELECT 1 FROM users WHERE role = 'admin' AND is_active = true AND is_deleted = false
        )",
    )
    .fetch_one(pool)
    .await?;

    if has_admin {
        return Ok(());
    }

    let password_hash = hash_password(password.to_string(), settings.bcrypt_cost).await?;

    sqlx::query(
        "INSERT INTO users (name, email, password_hash, role, status)
        VALUES ('Administrator', $1, $2, 'admin', 'active')",
    )
    .bind(email)
    .bind(password_hash)
    .execute(pool)
    .await
    .context("failed to create bootstrap admin")?;

    tracing::info!(%email, "bootstrap admin created");
    Ok(())
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::load().context("failed to load settings")?;
    init_tracing(&settings.log_level);

    let pool = PgPoolOptions::new()
        .max_connections(settings.db_max_connections)
        .connect(&settings.database_url)
        .await
        .context("failed to connect to the database")?;

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("failed to run migrations")?;

    let storage = Storage::new(settings.upload_dir.clone(), settings.max_upload_size);
    storage
        .ensure_folders()
        .await
        .with_context(|| format!("failed to create upload folders in {:?}", settings.upload_dir))?;

    bootstrap_admin(&pool, &settings).await?;

    let address = settings.bind_address();
    tracing::info!(host = %address.0, port = address.1, "starting server");

    let pool = web::Data::new(pool);
    let settings = web::Data::new(settings);
    let storage = web::Data::new(storage);

    HttpServer::new(move || {
        App::new()
            .wrap(
                Cors::default()
                    .allow_any_origin()
                    .allow_any_method()
                    .allow_any_header()
                    .supports_credentials()
                    .max_age(3600),
            )
            .wrap(middleware::Logger::default())
            .app_data(pool.clone())
            .app_data(settings.clone())
            .app_data(storage.clone())
            .configure(routes::config)
    })
    .bind(address)?
    .run()
    .await?;

    Ok(())
}
