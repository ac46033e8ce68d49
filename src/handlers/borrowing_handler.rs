use actix_web::{delete, get, post, put, web, HttpRequest, HttpResponse};
use chrono::Utc;
use serde_json::json;
use sqlx::{PgConnection, PgExecutor, PgPool, Postgres, QueryBuilder};
use validator::Validate;

use crate::handlers::auth_handler::authenticate;
use crate::handlers::files_handler::{attach_files, detach_files};
use crate::message::{AppError, AppSuccess, Resource};
use crate::models::borrowing::{
    BorrowingCreateRequest, BorrowingQuery, BorrowingUpdateRequest, BORROWING_COLUMNS,
    BORROWING_DETAIL_SELECT,
};
use crate::models::{
    Borrowing, BorrowingDetail, BorrowingStatus, PageQuery, ReferenceTable, StockChange,
};

const BORROWING_COUNT_SELECT: &str = "SELECT COUNT(*) \
    FROM borrowings b \
    JOIN users u ON b.borrower_id = u.id \
    JOIN items i ON b.item_id = i.id";

fn push_borrowing_filters(
    qb: &mut QueryBuilder<'_, Postgres>,
    filter: &BorrowingQuery,
    borrower_id: Option<i32>,
) {
    qb.push(" WHERE b.is_active = true AND b.is_deleted = false");

    if let Some(borrower_id) = borrower_id {
        qb.push(" AND b.borrower_id = ").push_bind(borrower_id);
    }

    if let Some(search) = filter.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        let pattern = format!("%{search}%");
        qb.push(" AND (u.name ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR u.email ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR i.name ILIKE ")
            .push_bind(pattern)
            .push(")");
    }

    if let Some(status) = filter.status {
        qb.push(" AND b.status = ").push_bind(status);
    }
}

async fn find_detail<'e, E>(executor: E, id: i32) -> Result<BorrowingDetail, AppError>
where
    E: PgExecutor<'e>,
{
    sqlx::query_as::<_, BorrowingDetail>(&format!(
        "{BORROWING_DETAIL_SELECT} WHERE b.id = $1 AND b.is_active = true AND b.is_deleted = false"
    ))
    .bind(id)
    .fetch_optional(executor)
    .await?
    .ok_or(AppError::NotFound(Resource::Borrowing))
}

async fn lock_borrowing(conn: &mut PgConnection, id: i32) -> Result<Borrowing, AppError> {
    sqlx::query_as::<_, Borrowing>(&format!(
        "SELECT {BORROWING_COLUMNS} FROM borrowings
        WHERE id = $1 AND is_active = true AND is_deleted = false
        FOR UPDATE"
    ))
    .bind(id)
    .fetch_optional(conn)
    .await?
    .ok_or(AppError::NotFound(Resource::Borrowing))
}

/// Applies a stock movement to an item. Checking out only succeeds while
/// `available` still covers the quantity.
async fn move_stock(
    conn: &mut PgConnection,
    item_id: i32,
    quantity: i32,
    change: StockChange,
    actor_id: i32,
) -> Result<(), AppError> {
    let sql = match change {
        StockChange::Unchanged => return Ok(()),
        StockChange::CheckOut => {
            "UPDATE items SET
                available = available - $1,
                borrowed = borrowed + $1,
                updated_by = $3,
                updated_date = CURRENT_TIMESTAMP
            WHERE id = $2 AND available >= $1"
        }
        StockChange::CheckIn => {
            "UPDATE items SET
                available = available + $1,
                borrowed = borrowed - $1,
                updated_by = $3,
                updated_date = CURRENT_TIMESTAMP
            WHERE id = $2"
        }
    };

    let result = sqlx::query(sql)
        .bind(quantity)
        .bind(item_id)
        .bind(actor_id)
        .execute(conn)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::conflict("Not enough items available"));
    }

    tracing::debug!(item_id, quantity, ?change, "stock moved");
    Ok(())
}

#[get("")]
pub async fn get_borrowings(
    req: HttpRequest,
    db: web::Data<PgPool>,
    page: web::Query<PageQuery>,
    filter: web::Query<BorrowingQuery>,
) -> Result<HttpResponse, AppError> {
    let user = authenticate(&req, &db).await?;
    let own_only = (!user.is_admin()).then_some(user.id);

    let mut count = QueryBuilder::<Postgres>::new(BORROWING_COUNT_SELECT);
    push_borrowing_filters(&mut count, &filter, own_only);
    let total = count.build_query_scalar::<i64>().fetch_one(db.get_ref()).await?;

    let mut select = QueryBuilder::<Postgres>::new(BORROWING_DETAIL_SELECT);
    push_borrowing_filters(&mut select, &filter, own_only);
    select
        .push(" ORDER BY b.created_date DESC LIMIT ")
        .push_bind(page.limit())
        .push(" OFFSET ")
        .push_bind(page.offset());

    let borrowings = select
        .build_query_as::<BorrowingDetail>()
        .fetch_all(db.get_ref())
        .await?;

    Ok(HttpResponse::Ok().json(json!({
        "borrowings": borrowings,
        "pagination": page.paginate(total),
    })))
}

#[post("")]
pub async fn create_borrowing(
    req: HttpRequest,
    db: web::Data<PgPool>,
    payload: web::Json<BorrowingCreateRequest>,
) -> Result<HttpResponse, AppError> {
    let user = authenticate(&req, &db).await?;
    let payload = payload.into_inner();
    payload.validate()?;

    let (Some(item_id), Some(quantity), Some(borrow_date), Some(return_date), Some(purpose)) = (
        payload.item_id,
        payload.quantity,
        payload.borrow_date,
        payload.return_date,
        payload.purpose.as_deref(),
    ) else {
        return Err(AppError::bad_request("Missing required fields"));
    };
    if return_date < borrow_date {
        return Err(AppError::bad_request(
            "Return date must be on or after the borrow date",
        ));
    }

    // regular users always borrow for themselves
    let borrower_id = if user.is_admin() {
        payload
            .borrower_id
            .ok_or_else(|| AppError::bad_request("Missing required fields"))?
    } else {
        user.id
    };

    let mut tx = db.begin().await?;

    let available = sqlx::query_scalar::<_, i32>(
        "SELECT available FROM items
        WHERE id = $1 AND is_active = true AND is_deleted = false
        FOR UPDATE",
    )
    .bind(item_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or(AppError::NotFound(Resource::Item))?;

    if available < quantity {
        return Err(AppError::conflict("Not enough items available"));
    }

    let borrower_exists = sqlx::query_scalar::<_, bool>(
        "SELECT EXISTS (
            SELECT 1 FROM users WHERE id = $1 AND is_active = true AND is_deleted = false
        )",
    )
    .bind(borrower_id)
    .fetch_one(&mut *tx)
    .await?;

    if !borrower_exists {
        return Err(AppError::NotFound(Resource::Borrower));
    }

    let (status, approved_by, approved_date) = if user.is_admin() {
        move_stock(&mut tx, item_id, quantity, StockChange::CheckOut, user.id).await?;
        (BorrowingStatus::Approved, Some(user.id), Some(Utc::now()))
    } else {
        (BorrowingStatus::Pending, None, None)
    };

    let file_ids = payload.borrowing_letter_file_ids.unwrap_or_default();

    let borrowing_id = sqlx::query_scalar::<_, i32>(
        "INSERT INTO borrowings (
            borrower_id, item_id, quantity, borrow_date, return_date, purpose, status,
            approved_by, approved_date, borrowing_letter_url, borrowing_letter_file_ids,
            created_by, updated_by
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $12)
        RETURNING id",
    )
    .bind(borrower_id)
    .bind(item_id)
    .bind(quantity)
    .bind(borrow_date)
    .bind(return_date)
    .bind(purpose)
    .bind(status)
    .bind(approved_by)
    .bind(approved_date)
    .bind(payload.borrowing_letter_url.as_deref())
    .bind(&file_ids)
    .bind(user.id)
    .fetch_one(&mut *tx)
    .await?;

    if !file_ids.is_empty() {
        attach_files(&mut tx, ReferenceTable::Borrowings, borrowing_id, &file_ids, user.id).await?;
    }

    let borrowing = find_detail(&mut *tx, borrowing_id).await?;
    tx.commit().await?;

    tracing::info!(
        borrowing_id,
        borrower_id,
        item_id,
        quantity,
        %status,
        created_by = user.id,
        "borrowing created"
    );

    Ok(HttpResponse::Created().json(json!({ "borrowing": borrowing })))
}

#[get("/{id}")]
pub async fn get_borrowing(
    req: HttpRequest,
    db: web::Data<PgPool>,
    path: web::Path<i32>,
) -> Result<HttpResponse, AppError> {
    let user = authenticate(&req, &db).await?;
    let borrowing = find_detail(db.get_ref(), path.into_inner()).await?;

    if !user.is_admin() && borrowing.borrowing.borrower_id != user.id {
        return Err(AppError::forbidden());
    }

    Ok(HttpResponse::Ok().json(json!({ "borrowing": borrowing })))
}

#[put("/{id}")]
pub async fn update_borrowing(
    req: HttpRequest,
    db: web::Data<PgPool>,
    path: web::Path<i32>,
    payload: web::Json<BorrowingUpdateRequest>,
) -> Result<HttpResponse, AppError> {
    let user = authenticate(&req, &db).await?;
    let borrowing_id = path.into_inner();
    let payload = payload.into_inner();

    if payload.status.is_none()
        && payload.notes.is_none()
        && payload.actual_return_date.is_none()
        && payload.borrowing_letter_file_ids.is_none()
    {
        return Err(AppError::bad_request("No fields to update"));
    }

    let mut tx = db.begin().await?;
    let current = lock_borrowing(&mut tx, borrowing_id).await?;

    if !user.is_admin() && current.borrower_id != user.id {
        return Err(AppError::forbidden());
    }

    let mut actual_return_date = payload.actual_return_date;
    let mut approved_by = None;
    let mut approved_date = None;

    if let Some(next) = payload.status {
        if next != current.status && !user.is_admin() {
            return Err(AppError::Forbidden(
                "Only admins can change the borrowing status".to_string(),
            ));
        }

        let change = current
            .status
            .transition_to(next)
            .ok_or_else(|| AppError::InvalidState {
                message: format!("Cannot change status from {} to {next}", current.status),
                current: current.status,
            })?;

        move_stock(&mut tx, current.item_id, current.quantity, change, user.id).await?;

        if change == StockChange::CheckOut {
            approved_by = Some(user.id);
            approved_date = Some(Utc::now());
        }
        if change == StockChange::CheckIn && next == BorrowingStatus::Returned {
            actual_return_date = actual_return_date.or_else(|| Some(Utc::now().date_naive()));
        }

        if next != current.status {
            tracing::info!(
                borrowing_id,
                from = %current.status,
                to = %next,
                changed_by = user.id,
                "borrowing status changed"
            );
        }
    }

    sqlx::query(
        "UPDATE borrowings SET
            status = COALESCE($1, status),
            notes = COALESCE($2, notes),
            actual_return_date = COALESCE($3, actual_return_date),
            approved_by = COALESCE($4, approved_by),
            approved_date = COALESCE($5, approved_date),
            borrowing_letter_file_ids = COALESCE($6, borrowing_letter_file_ids),
            updated_by = $7,
            updated_date = CURRENT_TIMESTAMP
        WHERE id = $8",
    )
    .bind(payload.status)
    .bind(payload.notes)
    .bind(actual_return_date)
    .bind(approved_by)
    .bind(approved_date)
    .bind(payload.borrowing_letter_file_ids.as_deref())
    .bind(user.id)
    .bind(borrowing_id)
    .execute(&mut *tx)
    .await?;

    if let Some(file_ids) = &payload.borrowing_letter_file_ids {
        attach_files(&mut tx, ReferenceTable::Borrowings, borrowing_id, file_ids, user.id).await?;
    }

    let borrowing = find_detail(&mut *tx, borrowing_id).await?;
    tx.commit().await?;

    Ok(HttpResponse::Ok().json(json!({ "borrowing": borrowing })))
}

#[delete("/{id}")]
pub async fn delete_borrowing(
    req: HttpRequest,
    db: web::Data<PgPool>,
    path: web::Path<i32>,
) -> Result<HttpResponse, AppError> {
    let user = authenticate(&req, &db).await?;
    let borrowing_id = path.into_inner();

    let mut tx = db.begin().await?;
    let current = lock_borrowing(&mut tx, borrowing_id).await?;

    if !user.is_admin() {
        if current.borrower_id != user.id {
            return Err(AppError::forbidden());
        }
        if current.status != BorrowingStatus::Pending {
            return Err(AppError::InvalidState {
                message: "Users can only delete pending borrowings".to_string(),
                current: current.status,
            });
        }
    }

    let detail = find_detail(&mut *tx, borrowing_id).await?;

    if current.status.holds_stock() {
        move_stock(
            &mut tx,
            current.item_id,
            current.quantity,
            StockChange::CheckIn,
            user.id,
        )
        .await?;
    }

    sqlx::query(
        "UPDATE borrowings SET
            is_deleted = true,
            updated_by = $1,
            updated_date = CURRENT_TIMESTAMP
        WHERE id = $2",
    )
    .bind(user.id)
    .bind(borrowing_id)
    .execute(&mut *tx)
    .await?;

    detach_files(&mut tx, ReferenceTable::Borrowings, borrowing_id).await?;

    tx.commit().await?;

    tracing::info!(
        borrowing_id,
        status = %current.status,
        deleted_by = user.id,
        "borrowing deleted"
    );

    Ok(HttpResponse::Ok().json(json!({
        "message": AppSuccess::Deleted(Resource::Borrowing).message(),
        "deletedBorrowing": {
            "id": borrowing_id,
            "borrower": detail.borrower_name,
            "item": detail.item_name,
            "status": current.status,
        },
    })))
}
