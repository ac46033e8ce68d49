use actix_web::{delete, get, post, put, web, HttpRequest, HttpResponse};
use serde_json::json;
use sqlx::{PgPool, Postgres, QueryBuilder};
use validator::Validate;

use crate::config::Settings;
use crate::handlers::auth_handler::{authenticate, authenticate_admin};
use crate::message::{AppError, AppSuccess, Resource};
use crate::models::user::{
    Borrower, BorrowerQuery, UserCreateRequest, UserQuery, UserUpdateRequest, USER_COLUMNS,
};
use crate::models::{PageQuery, Role, User, UserStatus};
use crate::utils::password::hash_password;

fn push_user_filters(qb: &mut QueryBuilder<'_, Postgres>, filter: &UserQuery) {
    qb.push(" WHERE is_active = true AND is_deleted = false");

    if let Some(search) = filter.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        let pattern = format!("%{search}%");
        qb.push(" AND (name ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR email ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR student_id ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR employee_id ILIKE ")
            .push_bind(pattern)
            .push(")");
    }

    if let Some(role) = filter.role {
        qb.push(" AND role = ").push_bind(role);
    }
}

async fn email_taken(db: &PgPool, email: &str, except_id: Option<i32>) -> Result<bool, AppError> {
    let taken = sqlx::query_scalar::<_, bool>(
        "SELECT EXISTS (
            SELECT 1 FROM users
            WHERE email = $1 AND ($2::int IS NULL OR id <> $2) AND is_active = true AND is_deleted = false
        )",
    )
    .bind(email)
    .bind(except_id)
    .fetch_one(db)
    .await?;

    Ok(taken)
}

async fn find_user(db: &PgPool, id: i32) -> Result<User, AppError> {
    sqlx::query_as::<_, User>(&format!(
        "SELECT {USER_COLUMNS} FROM users WHERE id = $1 AND is_active = true AND is_deleted = false"
    ))
    .bind(id)
    .fetch_optional(db)
    .await?
    .ok_or(AppError::NotFound(Resource::User))
}

#[get("")]
pub async fn get_users(
    req: HttpRequest,
    db: web::Data<PgPool>,
    page: web::Query<PageQuery>,
    filter: web::Query<UserQuery>,
) -> Result<HttpResponse, AppError> {
    authenticate_admin(&req, &db).await?;

    let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM users");
    push_user_filters(&mut count, &filter);
    let total = count.build_query_scalar::<i64>().fetch_one(db.get_ref()).await?;

    let mut select = QueryBuilder::<Postgres>::new(format!("SELECT {USER_COLUMNS} FROM users"));
    push_user_filters(&mut select, &filter);
    select
        .push(" ORDER BY created_date DESC LIMIT ")
        .push_bind(page.limit())
        .push(" OFFSET ")
        .push_bind(page.offset());

    let users = select.build_query_as::<User>().fetch_all(db.get_ref()).await?;

    Ok(HttpResponse::Ok().json(json!({
        "users": users,
        "pagination": page.paginate(total),
    })))
}

#[post("")]
pub async fn create_user(
    req: HttpRequest,
    db: web::Data<PgPool>,
    settings: web::Data<Settings>,
    payload: web::Json<UserCreateRequest>,
) -> Result<HttpResponse, AppError> {
    let admin = authenticate_admin(&req, &db).await?;
    let payload = payload.into_inner();
    payload.validate()?;

    let (Some(name), Some(email), Some(password), Some(role)) =
        (payload.name, payload.email, payload.password, payload.role)
    else {
        return Err(AppError::bad_request("Missing required fields"));
    };

    if email_taken(&db, &email, None).await? {
        return Err(AppError::conflict("Email already exists"));
    }

    let password_hash = hash_password(password, settings.bcrypt_cost).await?;
    let profile = &payload.profile;

    let user = sqlx::query_as::<_, User>(&format!(
        "INSERT INTO users (
            name, email, password_hash, role, employee_id, work_unit, phone,
            student_id, study_program, faculty, whatsapp, avatar, status, created_by, updated_by
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $14)
        RETURNING {USER_COLUMNS}"
    ))
    .bind(&name)
    .bind(&email)
    .bind(password_hash)
    .bind(role)
    .bind(profile.value("employee_id"))
    .bind(profile.value("work_unit"))
    .bind(profile.value("phone"))
    .bind(profile.value("student_id"))
    .bind(profile.value("study_program"))
    .bind(profile.value("faculty"))
    .bind(profile.value("whatsapp"))
    .bind(profile.value("avatar"))
    .bind(payload.status.unwrap_or(UserStatus::Active))
    .bind(admin.id)
    .fetch_one(db.get_ref())
    .await?;

    tracing::info!(user_id = user.id, role = %user.role, created_by = admin.id, "user created");

    Ok(HttpResponse::Created().json(json!({ "user": user })))
}

/// Active `user` accounts that can be picked as borrowers.
#[get("/borrowers")]
pub async fn get_borrowers(
    req: HttpRequest,
    db: web::Data<PgPool>,
    query: web::Query<BorrowerQuery>,
) -> Result<HttpResponse, AppError> {
    authenticate(&req, &db).await?;

    let mut qb = QueryBuilder::<Postgres>::new(
        "SELECT id, name, email, student_id, study_program, faculty, whatsapp
        FROM users
        WHERE role = 'user' AND status = 'active' AND is_active = true AND is_deleted = false",
    );

    if let Some(search) = query.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        let pattern = format!("%{search}%");
        qb.push(" AND (name ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR email ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR student_id ILIKE ")
            .push_bind(pattern)
            .push(")");
    }
    qb.push(" ORDER BY name ASC");

    let borrowers = qb.build_query_as::<Borrower>().fetch_all(db.get_ref()).await?;

    Ok(HttpResponse::Ok().json(json!({ "borrowers": borrowers })))
}

#[get("/{id:\\d+}")]
pub async fn get_user(
    req: HttpRequest,
    db: web::Data<PgPool>,
    path: web::Path<i32>,
) -> Result<HttpResponse, AppError> {
    let current = authenticate(&req, &db).await?;
    let user_id = path.into_inner();

    if !current.is_admin() && current.id != user_id {
        return Err(AppError::forbidden());
    }

    let user = find_user(&db, user_id).await?;
    Ok(HttpResponse::Ok().json(json!({ "user": user })))
}

#[put("/{id:\\d+}")]
pub async fn update_user(
    req: HttpRequest,
    db: web::Data<PgPool>,
    settings: web::Data<Settings>,
    path: web::Path<i32>,
    payload: web::Json<UserUpdateRequest>,
) -> Result<HttpResponse, AppError> {
    let current = authenticate(&req, &db).await?;
    let user_id = path.into_inner();
    let payload = payload.into_inner();
    payload.validate()?;

    find_user(&db, user_id).await?;

    if !current.is_admin() && current.id != user_id {
        return Err(AppError::forbidden());
    }

    let name = payload.name;
    let email = payload.email;
    if let Some(email) = &email {
        if email_taken(&db, email, Some(user_id)).await? {
            return Err(AppError::conflict("Email already exists"));
        }
    }

    let password_hash = match payload.password.filter(|p| !p.is_empty()) {
        Some(password) => Some(hash_password(password, settings.bcrypt_cost).await?),
        None => None,
    };

    // role and status are only writable by admins; silently ignored otherwise
    let (role, status): (Option<Role>, Option<UserStatus>) = if current.is_admin() {
        (payload.role, payload.status)
    } else {
        (None, None)
    };

    let mut qb = QueryBuilder::<Postgres>::new("UPDATE users SET ");
    let mut changes = 0;
    {
        let mut set = qb.separated(", ");

        if let Some(name) = name {
            set.push("name = ").push_bind_unseparated(name);
            changes += 1;
        }
        if let Some(email) = email {
            set.push("email = ").push_bind_unseparated(email);
            changes += 1;
        }
        if let Some(hash) = password_hash {
            set.push("password_hash = ").push_bind_unseparated(hash);
            changes += 1;
        }
        if let Some(role) = role {
            set.push("role = ").push_bind_unseparated(role);
            changes += 1;
        }
        if let Some(status) = status {
            set.push("status = ").push_bind_unseparated(status);
            changes += 1;
        }
        for (column, value) in payload.profile.present() {
            set.push(format!("{column} = ")).push_bind_unseparated(value);
            changes += 1;
        }

        set.push("updated_by = ").push_bind_unseparated(current.id);
        set.push("updated_date = CURRENT_TIMESTAMP");
    }

    if changes == 0 {
        return Err(AppError::bad_request("No fields to update"));
    }

    qb.push(" WHERE id = ")
        .push_bind(user_id)
        .push(format!(" RETURNING {USER_COLUMNS}"));

    let user = qb.build_query_as::<User>().fetch_one(db.get_ref()).await?;

    tracing::info!(user_id, updated_by = current.id, fields = changes, "user updated");

    Ok(HttpResponse::Ok().json(json!({ "user": user })))
}

#[delete("/{id:\\d+}")]
pub async fn delete_user(
    req: HttpRequest,
    db: web::Data<PgPool>,
    path: web::Path<i32>,
) -> Result<HttpResponse, AppError> {
    let admin = authenticate_admin(&req, &db).await?;
    let user_id = path.into_inner();

    find_user(&db, user_id).await?;

    if user_id == admin.id {
        return Err(AppError::conflict("Cannot delete yourself"));
    }

    let open_borrowings = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM borrowings
        WHERE borrower_id = $1 AND status IN ('pending', 'approved')
            AND is_active = true AND is_deleted = false",
    )
    .bind(user_id)
    .fetch_one(db.get_ref())
    .await?;

    if open_borrowings > 0 {
        return Err(AppError::conflict("Cannot delete user with active borrowings"));
    }

    let mut tx = db.begin().await?;

    sqlx::query(
        "UPDATE users SET
            is_deleted = true,
            updated_by = $1,
            updated_date = CURRENT_TIMESTAMP
        WHERE id = $2",
    )
    .bind(admin.id)
    .bind(user_id)
    .execute(&mut *tx)
    .await?;

    sqlx::query("DELETE FROM sessions WHERE user_id = $1")
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    tracing::info!(user_id, deleted_by = admin.id, "user deleted");

    Ok(HttpResponse::Ok().json(json!({
        "message": AppSuccess::Deleted(Resource::User).message(),
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_filters_search_four_columns() {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM users");
        push_user_filters(
            &mut qb,
            &UserQuery {
                search: Some("rina".to_string()),
                role: Some(Role::User),
            },
        );
        assert_eq!(
            qb.sql(),
            "SELECT COUNT(*) FROM users WHERE is_active = true AND is_deleted = false \
             AND (name ILIKE $1 OR email ILIKE $2 OR student_id ILIKE $3 OR employee_id ILIKE $4) \
             AND role = $5"
        );
    }
}
