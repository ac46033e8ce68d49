use actix_web::cookie::{Cookie, SameSite};
use actix_web::http::header::Header;
use actix_web::{get, post, web, HttpRequest, HttpResponse};
use actix_web_httpauth::headers::authorization::{Authorization, Bearer};
use chrono::{Duration, Utc};
use serde_json::json;
use sqlx::PgPool;
use uuid::Uuid;

use crate::config::Settings;
use crate::message::{AppError, AppSuccess};
use crate::models::user::{LoginRequest, UserCredentials, USER_COLUMNS};
use crate::models::{User, UserStatus};
use crate::utils::password::verify_password;

pub const SESSION_COOKIE: &str = "session";

/// Session token from the `session` cookie, falling back to `Authorization: Bearer`.
pub fn session_token(req: &HttpRequest) -> Option<String> {
    if let Some(cookie) = req.cookie(SESSION_COOKIE) {
        if !cookie.value().is_empty() {
            return Some(cookie.value().to_string());
        }
    }

    Authorization::<Bearer>::parse(req)
        .ok()
        .map(|auth| auth.into_scheme().token().to_string())
}

/// Resolves the signed-in user, or 401.
pub async fn authenticate(req: &HttpRequest, db: &PgPool) -> Result<User, AppError> {
    let session_id = session_token(req)
        .and_then(|token| Uuid::parse_str(&token).ok())
        .ok_or_else(AppError::unauthorized)?;

    let user = sqlx::query_as::<_, User>(&format!(
        "SELECT {} FROM users u
        JOIN sessions s ON u.id = s.user_id
        WHERE
            s.id = $1 AND
            s.expires_at > CURRENT_TIMESTAMP AND
            u.status = 'active' AND
            u.is_active = true AND
            u.is_deleted = false",
        prefixed("u", USER_COLUMNS)
    ))
    .bind(session_id)
    .fetch_optional(db)
    .await?;

    user.ok_or_else(AppError::unauthorized)
}

pub async fn authenticate_admin(req: &HttpRequest, db: &PgPool) -> Result<User, AppError> {
    let user = authenticate(req, db).await?;
    require_admin(&user)?;
    Ok(user)
}

pub fn require_admin(user: &User) -> Result<(), AppError> {
    if user.is_admin() {
        Ok(())
    } else {
        Err(AppError::forbidden())
    }
}

/// `a, b` -> `t.a, t.b`
pub fn prefixed(table: &str, columns: &str) -> String {
    columns
        .split(',')
        .map(|c| format!("{table}.{}", c.trim()))
        .collect::<Vec<_>>()
        .join(", ")
}

fn session_cookie(value: String, settings: &Settings, max_age: time::Duration) -> Cookie<'static> {
    Cookie::build(SESSION_COOKIE, value)
        .path("/")
        .http_only(true)
        .secure(settings.cookie_secure)
        .same_site(SameSite::Lax)
        .max_age(max_age)
        .finish()
}

#[post("/login")]
pub async fn login(
    db: web::Data<PgPool>,
    settings: web::Data<Settings>,
    payload: web::Json<LoginRequest>,
) -> Result<HttpResponse, AppError> {
    let LoginRequest { email, password } = payload.into_inner();
    let email = email.trim().to_string();

    if email.is_empty() || password.is_empty() {
        return Err(AppError::bad_request("Email and password are required"));
    }

    let credentials = sqlx::query_as::<_, UserCredentials>(&format!(
        "SELECT {USER_COLUMNS}, password_hash FROM users
        WHERE email = $1 AND is_active = true AND is_deleted = false"
    ))
    .bind(&email)
    .fetch_optional(db.get_ref())
    .await?;

    let Some(UserCredentials { user, password_hash }) = credentials else {
        tracing::info!(%email, "login failed: unknown email");
        return Err(AppError::Unauthorized("Invalid credentials".to_string()));
    };

    if !verify_password(password, password_hash).await? {
        tracing::info!(user_id = user.id, "login failed: wrong password");
        return Err(AppError::Unauthorized("Invalid credentials".to_string()));
    }

    if user.status != UserStatus::Active {
        tracing::info!(user_id = user.id, "login refused: account inactive");
        return Err(AppError::Unauthorized("Account is inactive".to_string()));
    }

    sqlx::query("DELETE FROM sessions WHERE expires_at <= CURRENT_TIMESTAMP")
        .execute(db.get_ref())
        .await?;

    let session_id = Uuid::new_v4();
    let expires_at = Utc::now() + Duration::days(settings.session_ttl_days);

    sqlx::query(
        "INSERT INTO sessions (id, user_id, expires_at, created_date)
        VALUES ($1, $2, $3, CURRENT_TIMESTAMP)",
    )
    .bind(session_id)
    .bind(user.id)
    .bind(expires_at)
    .execute(db.get_ref())
    .await?;

    tracing::info!(user_id = user.id, "login successful");

    let cookie = session_cookie(
        session_id.to_string(),
        &settings,
        time::Duration::days(settings.session_ttl_days),
    );

    Ok(HttpResponse::Ok().cookie(cookie).json(json!({
        "success": true,
        "user": user,
    })))
}

#[post("/logout")]
pub async fn logout(
    req: HttpRequest,
    db: web::Data<PgPool>,
    settings: web::Data<Settings>,
) -> Result<HttpResponse, AppError> {
    if let Some(session_id) = session_token(&req).and_then(|t| Uuid::parse_str(&t).ok()) {
        let result = sqlx::query("DELETE FROM sessions WHERE id = $1")
            .bind(session_id)
            .execute(db.get_ref())
            .await;

        if let Err(e) = result {
            tracing::error!(error = %e, "failed to delete session");
        }
    }

    let cookie = session_cookie(String::new(), &settings, time::Duration::ZERO);

    Ok(HttpResponse::Ok().cookie(cookie).json(json!({
        "success": true,
        "message": AppSuccess::LoggedOut.message(),
    })))
}

#[get("/me")]
pub async fn me(req: HttpRequest, db: web::Data<PgPool>) -> Result<HttpResponse, AppError> {
    let user = authenticate(&req, &db).await?;
    Ok(HttpResponse::Ok().json(json!({ "user": user })))
}

#[cfg(test)]
mod tests {
    use super::*;

    use actix_web::test::TestRequest;

    #[test]
    fn token_from_cookie() {
        let req = TestRequest::default()
            .cookie(Cookie::new(SESSION_COOKIE, "abc"))
            .to_http_request();
        assert_eq!(session_token(&req).as_deref(), Some("abc"));
    }

    #[test]
    fn token_from_bearer_header() {
        let req = TestRequest::default()
            .insert_header(("Authorization", "Bearer xyz"))
            .to_http_request();
        assert_eq!(session_token(&req).as_deref(), Some("xyz"));
    }

    #[test]
    fn cookie_wins_over_header() {
        let req = TestRequest::default()
            .cookie(Cookie::new(SESSION_COOKIE, "from-cookie"))
            .insert_header(("Authorization", "Bearer from-header"))
            .to_http_request();
        assert_eq!(session_token(&req).as_deref(), Some("from-cookie"));
    }

    #[test]
    fn missing_token() {
        let req = TestRequest::default().to_http_request();
        assert_eq!(session_token(&req), None);

        let req = TestRequest::default()
            .insert_header(("Authorization", "Basic dXNlcjpwYXNz"))
            .to_http_request();
        assert_eq!(session_token(&req), None);
    }

    #[actix_web::test]
    async fn malformed_token_is_unauthorized_without_touching_the_database() {
        let pool = PgPool::connect_lazy("postgres://localhost/unused").unwrap();
        let req = TestRequest::default()
            .cookie(Cookie::new(SESSION_COOKIE, "not-a-uuid"))
            .to_http_request();

        let err = authenticate(&req, &pool).await.unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));
    }

    #[test]
    fn prefixes_columns() {
        assert_eq!(prefixed("u", "id, name,email"), "u.id, u.name, u.email");
    }
}
