use actix_web::{delete, get, post, put, web, HttpRequest, HttpResponse};
use serde_json::json;
use sqlx::{PgPool, Postgres, QueryBuilder};
use validator::Validate;

use crate::handlers::auth_handler::{authenticate, authenticate_admin};
use crate::handlers::files_handler::{attach_files, detach_files};
use crate::message::{AppError, AppSuccess, Resource};
use crate::models::item::{
    available_after_resize, ItemCreateRequest, ItemQuery, ItemUpdateRequest, ITEM_COLUMNS,
};
use crate::models::{Item, PageQuery, ReferenceTable};

fn push_item_filters(qb: &mut QueryBuilder<'_, Postgres>, filter: &ItemQuery) {
    qb.push(" WHERE is_active = true AND is_deleted = false");

    if let Some(search) = filter.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        let pattern = format!("%{search}%");
        qb.push(" AND (name ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR code ILIKE ")
            .push_bind(pattern)
            .push(")");
    }

    if let Some(category) = filter.category.as_deref().filter(|c| !c.is_empty()) {
        qb.push(" AND category = ").push_bind(category.to_string());
    }
}

async fn code_taken(db: &PgPool, code: &str, except_id: Option<i32>) -> Result<bool, AppError> {
    let taken = sqlx::query_scalar::<_, bool>(
        "SELECT EXISTS (
            SELECT 1 FROM items
            WHERE code = $1 AND ($2::int IS NULL OR id <> $2) AND is_active = true AND is_deleted = false
        )",
    )
    .bind(code)
    .bind(except_id)
    .fetch_one(db)
    .await?;

    Ok(taken)
}

#[get("")]
pub async fn get_items(
    req: HttpRequest,
    db: web::Data<PgPool>,
    page: web::Query<PageQuery>,
    filter: web::Query<ItemQuery>,
) -> Result<HttpResponse, AppError> {
    authenticate(&req, &db).await?;

    let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM items");
    push_item_filters(&mut count, &filter);
    let total = count.build_query_scalar::<i64>().fetch_one(db.get_ref()).await?;

    let mut select = QueryBuilder::<Postgres>::new(format!("SELECT {ITEM_COLUMNS} FROM items"));
    push_item_filters(&mut select, &filter);
    select
        .push(" ORDER BY created_date DESC LIMIT ")
        .push_bind(page.limit())
        .push(" OFFSET ")
        .push_bind(page.offset());

    let items = select.build_query_as::<Item>().fetch_all(db.get_ref()).await?;

    Ok(HttpResponse::Ok().json(json!({
        "items": items,
        "pagination": page.paginate(total),
    })))
}

#[post("")]
pub async fn create_item(
    req: HttpRequest,
    db: web::Data<PgPool>,
    payload: web::Json<ItemCreateRequest>,
) -> Result<HttpResponse, AppError> {
    let user = authenticate_admin(&req, &db).await?;
    let payload = payload.into_inner();
    payload.validate()?;

    let (Some(code), Some(name), Some(quantity), Some(unit), Some(category), Some(condition)) = (
        payload.code,
        payload.name,
        payload.quantity,
        payload.unit,
        payload.category,
        payload.condition,
    ) else {
        return Err(AppError::bad_request("Missing required fields"));
    };

    if code_taken(&db, &code, None).await? {
        return Err(AppError::conflict("Item code already exists"));
    }

    let file_ids = payload.file_ids.unwrap_or_default();

    let mut tx = db.begin().await?;

    let item = sqlx::query_as::<_, Item>(&format!(
        "INSERT INTO items (
            code, name, quantity, available, borrowed, unit, category, condition,
            description, image_url, file_ids, created_by, updated_by
        ) VALUES ($1, $2, $3, $3, 0, $4, $5, $6, $7, $8, $9, $10, $10)
        RETURNING {ITEM_COLUMNS}"
    ))
    .bind(&code)
    .bind(&name)
    .bind(quantity)
    .bind(&unit)
    .bind(&category)
    .bind(&condition)
    .bind(payload.description.as_deref())
    .bind(payload.image_url.as_deref())
    .bind(&file_ids)
    .bind(user.id)
    .fetch_one(&mut *tx)
    .await?;

    if !file_ids.is_empty() {
        attach_files(&mut tx, ReferenceTable::Items, item.id, &file_ids, user.id).await?;
    }

    tx.commit().await?;

    tracing::info!(item_id = item.id, code = %item.code, created_by = user.id, "item created");

    Ok(HttpResponse::Created().json(json!({ "item": item })))
}

#[get("/{id}")]
pub async fn get_item(
    req: HttpRequest,
    db: web::Data<PgPool>,
    path: web::Path<i32>,
) -> Result<HttpResponse, AppError> {
    authenticate(&req, &db).await?;

    let item = sqlx::query_as::<_, Item>(&format!(
        "SELECT {ITEM_COLUMNS} FROM items WHERE id = $1 AND is_active = true AND is_deleted = false"
    ))
    .bind(path.into_inner())
    .fetch_optional(db.get_ref())
    .await?
    .ok_or(AppError::NotFound(Resource::Item))?;

    Ok(HttpResponse::Ok().json(json!({ "item": item })))
}

#[put("/{id}")]
pub async fn update_item(
    req: HttpRequest,
    db: web::Data<PgPool>,
    path: web::Path<i32>,
    payload: web::Json<ItemUpdateRequest>,
) -> Result<HttpResponse, AppError> {
    let user = authenticate_admin(&req, &db).await?;
    let item_id = path.into_inner();
    let payload = payload.into_inner();
    payload.validate()?;

    if let Some(code) = &payload.code {
        if code_taken(&db, code, Some(item_id)).await? {
            return Err(AppError::conflict("Item code already exists"));
        }
    }

    let mut tx = db.begin().await?;

    let borrowed = sqlx::query_scalar::<_, i32>(
        "SELECT borrowed FROM items
        WHERE id = $1 AND is_active = true AND is_deleted = false
        FOR UPDATE",
    )
    .bind(item_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or(AppError::NotFound(Resource::Item))?;

    let mut qb = QueryBuilder::<Postgres>::new("UPDATE items SET ");
    {
        let mut set = qb.separated(", ");

        if let Some(quantity) = payload.quantity {
            let available = available_after_resize(quantity, borrowed).ok_or_else(|| {
                AppError::bad_request(format!(
                    "Quantity cannot be lower than the {borrowed} currently borrowed"
                ))
            })?;
            set.push("quantity = ").push_bind_unseparated(quantity);
            set.push("available = ").push_bind_unseparated(available);
        }

        let text_columns = [
            ("code", payload.code),
            ("name", payload.name),
            ("unit", payload.unit),
            ("category", payload.category),
            ("condition", payload.condition),
        ];
        for (column, value) in text_columns {
            if let Some(value) = value {
                set.push(format!("{column} = ")).push_bind_unseparated(value);
            }
        }

        let clearable = [
            ("description", payload.description),
            ("image_url", payload.image_url),
        ];
        for (column, value) in clearable {
            if let Some(value) = value {
                let value = value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
                set.push(format!("{column} = ")).push_bind_unseparated(value);
            }
        }

        if let Some(file_ids) = &payload.file_ids {
            set.push("file_ids = ").push_bind_unseparated(file_ids.clone());
        }

        set.push("updated_by = ").push_bind_unseparated(user.id);
        set.push("updated_date = CURRENT_TIMESTAMP");
    }
    qb.push(" WHERE id = ")
        .push_bind(item_id)
        .push(format!(" RETURNING {ITEM_COLUMNS}"));

    let item = qb.build_query_as::<Item>().fetch_one(&mut *tx).await?;

    if let Some(file_ids) = &payload.file_ids {
        attach_files(&mut tx, ReferenceTable::Items, item_id, file_ids, user.id).await?;
    }

    tx.commit().await?;

    tracing::info!(item_id, updated_by = user.id, "item updated");

    Ok(HttpResponse::Ok().json(json!({ "item": item })))
}

#[delete("/{id}")]
pub async fn delete_item(
    req: HttpRequest,
    db: web::Data<PgPool>,
    path: web::Path<i32>,
) -> Result<HttpResponse, AppError> {
    let user = authenticate_admin(&req, &db).await?;
    let item_id = path.into_inner();

    let mut tx = db.begin().await?;

    // borrowing creation locks the same row, so no new borrowing can slip in
    sqlx::query_scalar::<_, i32>(
        "SELECT id FROM items
        WHERE id = $1 AND is_active = true AND is_deleted = false
        FOR UPDATE",
    )
    .bind(item_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or(AppError::NotFound(Resource::Item))?;

    let open_borrowings = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM borrowings
        WHERE item_id = $1 AND status IN ('approved', 'pending')
            AND is_active = true AND is_deleted = false",
    )
    .bind(item_id)
    .fetch_one(&mut *tx)
    .await?;

    if open_borrowings > 0 {
        return Err(AppError::conflict("Cannot delete item with active borrowings"));
    }

    sqlx::query(
        "UPDATE items SET
            is_deleted = true,
            updated_by = $1,
            updated_date = CURRENT_TIMESTAMP
        WHERE id = $2",
    )
    .bind(user.id)
    .bind(item_id)
    .execute(&mut *tx)
    .await?;

    detach_files(&mut tx, ReferenceTable::Items, item_id).await?;

    tx.commit().await?;

    tracing::info!(item_id, deleted_by = user.id, "item deleted");

    Ok(HttpResponse::Ok().json(json!({
        "message": AppSuccess::Deleted(Resource::Item).message(),
    })))
}
