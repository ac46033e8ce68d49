use actix_multipart::Multipart;
use actix_web::{delete, post, web, HttpRequest, HttpResponse};
use serde_json::json;
use sqlx::PgPool;

use crate::handlers::auth_handler::authenticate;
use crate::handlers::files_handler::read_form;
use crate::message::{AppError, AppSuccess, Resource};
use crate::utils::storage::{validate_folder, Storage};

/// Stores a single file without a database record; the caller keeps the returned URL.
#[post("")]
pub async fn upload(
    req: HttpRequest,
    db: web::Data<PgPool>,
    storage: web::Data<Storage>,
    payload: Multipart,
) -> Result<HttpResponse, AppError> {
    let user = authenticate(&req, &db).await?;
    let form = read_form(payload, storage.max_file_size()).await?;

    let folder = validate_folder(form.field("folder"))?;
    let part = form
        .files
        .first()
        .ok_or_else(|| AppError::bad_request("No file provided"))?;

    let extension = part.validate(storage.max_file_size())?;
    let stored = storage.save(&folder, &extension, &part.bytes).await?;

    tracing::info!(
        user_id = user.id,
        path = %stored.relative_path,
        size = part.size,
        "file stored"
    );

    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "fileName": stored.relative_path,
        "fileUrl": format!("/api/files/{}", stored.relative_path),
        "originalName": part.original_name,
        "size": part.size,
        "type": part.mime(&extension).essence_str(),
    })))
}

#[delete("/{filename:.*}")]
pub async fn delete_upload(
    req: HttpRequest,
    db: web::Data<PgPool>,
    storage: web::Data<Storage>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let user = authenticate(&req, &db).await?;
    let relative = path.into_inner();

    if !storage.remove(&relative).await? {
        return Err(AppError::NotFound(Resource::File));
    }

    tracing::info!(user_id = user.id, path = %relative, "stored file removed");

    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "message": AppSuccess::Deleted(Resource::File).message(),
    })))
}
