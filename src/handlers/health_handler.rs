use actix_web::{get, web, HttpResponse};
use chrono::{DateTime, Utc};
use serde_json::json;
use sqlx::PgPool;

use crate::message::AppError;

#[get("")]
pub async fn health(db: web::Data<PgPool>) -> Result<HttpResponse, AppError> {
    let (current_time, pg_version) =
        sqlx::query_as::<_, (DateTime<Utc>, String)>("SELECT NOW(), version()")
            .fetch_one(db.get_ref())
            .await?;

    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "message": "Database connection successful",
        "data": {
            "current_time": current_time,
            "pg_version": pg_version,
        },
    })))
}
