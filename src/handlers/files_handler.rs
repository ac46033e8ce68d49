use std::collections::HashMap;

use actix_multipart::Multipart;
use actix_web::http::header::{
    CacheControl, CacheDirective, ContentDisposition, DispositionParam, DispositionType,
};
use actix_web::{delete, get, post, web, HttpRequest, HttpResponse};
use futures_util::StreamExt;
use mime::Mime;
use serde_json::json;
use sqlx::{PgConnection, PgPool, Postgres, QueryBuilder};

use crate::handlers::auth_handler::authenticate;
use crate::message::{AppError, Resource};
use crate::models::file::{FileQuery, ServeQuery, UploadResult, FILE_COLUMNS};
use crate::models::{FileKind, FileRecord, ReferenceTable};
use crate::utils::storage::{
    disposition_for, extension_of, is_allowed_extension, mime_for_extension, validate_folder,
    Storage, ALLOWED_EXTENSIONS,
};

/// One `file` part of a multipart form, already drained from the stream.
#[derive(Debug)]
pub struct UploadedPart {
    pub original_name: String,
    pub content_type: Option<Mime>,
    pub size: u64,
    /// Empty when `size` exceeded the limit.
    pub bytes: Vec<u8>,
}

impl UploadedPart {
    /// Size and extension checks shared by both upload endpoints.
    pub fn validate(&self, max_size: u64) -> Result<String, AppError> {
        if self.size > max_size {
            return Err(AppError::bad_request(format!(
                "File size exceeds {}MB limit",
                max_size / (1024 * 1024)
            )));
        }

        match extension_of(&self.original_name) {
            Some(ext) if is_allowed_extension(&ext) => Ok(ext),
            _ => Err(AppError::bad_request(format!(
                "File type not allowed. Allowed types: {}",
                ALLOWED_EXTENSIONS.join(", ")
            ))),
        }
    }

    /// Declared content type, or one inferred from the extension.
    pub fn mime(&self, extension: &str) -> Mime {
        match &self.content_type {
            Some(m) if *m != mime::APPLICATION_OCTET_STREAM => m.clone(),
            _ => mime_for_extension(extension),
        }
    }
}

#[derive(Debug, Default)]
pub struct UploadForm {
    pub files: Vec<UploadedPart>,
    pub fields: HashMap<String, String>,
}

impl UploadForm {
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str).filter(|v| !v.trim().is_empty())
    }
}

pub async fn read_form(mut payload: Multipart, max_size: u64) -> Result<UploadForm, AppError> {
    let mut form = UploadForm::default();

    while let Some(field) = payload.next().await {
        let mut field =
            field.map_err(|e| AppError::bad_request(format!("Invalid multipart body: {e}")))?;

        let disposition = field.content_disposition().clone();
        let name = disposition.get_name().unwrap_or_default().to_string();
        let file_name = disposition.get_filename().map(str::to_string);
        let content_type = field.content_type().cloned();

        let mut bytes = Vec::new();
        let mut size: u64 = 0;
        while let Some(chunk) = field.next().await {
            let chunk =
                chunk.map_err(|e| AppError::bad_request(format!("Failed to read upload: {e}")))?;
            size += chunk.len() as u64;
            // keep draining oversized parts so the rest of the form can be read
            if size <= max_size {
                bytes.extend_from_slice(&chunk);
            } else {
                bytes.clear();
            }
        }

        match file_name {
            Some(original_name) if name == "file" => form.files.push(UploadedPart {
                original_name,
                content_type,
                size,
                bytes,
            }),
            Some(_) => {}
            None => {
                form.fields
                    .insert(name, String::from_utf8_lossy(&bytes).into_owned());
            }
        }
    }

    Ok(form)
}

/// Clears every reference to `owner_id` in `table`.
pub async fn detach_files(
    conn: &mut PgConnection,
    table: ReferenceTable,
    owner_id: i32,
) -> Result<(), AppError> {
    sqlx::query(
        "UPDATE files SET reference_table = NULL, reference_id = NULL
        WHERE reference_table = $1 AND reference_id = $2",
    )
    .bind(table.as_str())
    .bind(owner_id)
    .execute(conn)
    .await?;

    Ok(())
}

/// Rewrites the files attached to `owner_id`: old references are cleared, then
/// the given live files are tagged.
pub async fn attach_files(
    conn: &mut PgConnection,
    table: ReferenceTable,
    owner_id: i32,
    file_ids: &[i32],
    actor_id: i32,
) -> Result<(), AppError> {
    detach_files(&mut *conn, table, owner_id).await?;

    if file_ids.is_empty() {
        return Ok(());
    }

    sqlx::query(
        "UPDATE files SET
            reference_table = $1,
            reference_id = $2,
            updated_by = $3,
            updated_date = CURRENT_TIMESTAMP
        WHERE id = ANY($4) AND is_active = true AND is_deleted = false",
    )
    .bind(table.as_str())
    .bind(owner_id)
    .bind(actor_id)
    .bind(file_ids)
    .execute(conn)
    .await?;

    Ok(())
}

async fn store_part(
    db: &PgPool,
    storage: &Storage,
    part: &UploadedPart,
    folder: &str,
    reference: Option<(ReferenceTable, i32)>,
    actor_id: i32,
) -> Result<FileRecord, AppError> {
    let extension = part.validate(storage.max_file_size())?;
    let mime = part.mime(&extension);
    let stored = storage.save(folder, &extension, &part.bytes).await?;

    let record = sqlx::query_as::<_, FileRecord>(&format!(
        "INSERT INTO files (
            original_name, file_name, file_path, file_size, mime_type,
            folder, file_type, reference_table, reference_id, created_by, updated_by
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $10)
        RETURNING {FILE_COLUMNS}"
    ))
    .bind(&part.original_name)
    .bind(&stored.file_name)
    .bind(&stored.relative_path)
    .bind(part.size as i64)
    .bind(mime.essence_str())
    .bind(folder)
    .bind(FileKind::from_mime(mime.essence_str()))
    .bind(reference.map(|(table, _)| table.as_str()))
    .bind(reference.map(|(_, id)| id))
    .bind(actor_id)
    .fetch_one(db)
    .await;

    match record {
        Ok(record) => Ok(record),
        Err(e) => {
            storage.remove_best_effort(&stored.relative_path).await;
            Err(e.into())
        }
    }
}

#[post("")]
pub async fn upload_files(
    req: HttpRequest,
    db: web::Data<PgPool>,
    storage: web::Data<Storage>,
    payload: Multipart,
) -> Result<HttpResponse, AppError> {
    let user = authenticate(&req, &db).await?;
    let form = read_form(payload, storage.max_file_size()).await?;

    if form.files.is_empty() {
        return Err(AppError::bad_request("No files provided"));
    }

    let folder = validate_folder(form.field("folder"))?;
    let reference = match (form.field("referenceTable"), form.field("referenceId")) {
        (Some(table), Some(id)) => {
            let table = table.parse::<ReferenceTable>().map_err(AppError::BadRequest)?;
            let id = id
                .trim()
                .parse::<i32>()
                .map_err(|_| AppError::bad_request("referenceId must be an integer"))?;
            Some((table, id))
        }
        _ => None,
    };

    let mut results = Vec::with_capacity(form.files.len());
    for part in &form.files {
        match store_part(&db, &storage, part, &folder, reference, user.id).await {
            Ok(record) => {
                tracing::info!(file_id = record.id, path = %record.file_path, "file uploaded");
                results.push(UploadResult::stored(record));
            }
            Err(e) => {
                tracing::warn!(file = %part.original_name, error = %e, "file upload failed");
                results.push(UploadResult::failed(&part.original_name, e.message()));
            }
        }
    }

    Ok(HttpResponse::Ok().json(json!({ "results": results })))
}

#[get("")]
pub async fn get_files(
    req: HttpRequest,
    db: web::Data<PgPool>,
    query: web::Query<FileQuery>,
) -> Result<HttpResponse, AppError> {
    let user = authenticate(&req, &db).await?;
    let query = query.into_inner();

    let mut qb = QueryBuilder::<Postgres>::new(format!(
        "SELECT {FILE_COLUMNS} FROM files
        WHERE is_active = true AND is_deleted = false AND status = 'active'"
    ));

    match (query.file_ids, query.reference_table, query.reference_id) {
        (Some(ids), _, _) => {
            qb.push(" AND id = ANY(").push_bind(ids).push(")");
        }
        (None, Some(table), Some(id)) => {
            qb.push(" AND reference_table = ")
                .push_bind(table.as_str())
                .push(" AND reference_id = ")
                .push_bind(id);
        }
        _ if user.is_admin() => {}
        _ => {
            return Err(AppError::bad_request(
                "fileIds or referenceTable and referenceId are required",
            ))
        }
    }

    qb.push(" ORDER BY created_date DESC");

    let files = qb.build_query_as::<FileRecord>().fetch_all(db.get_ref()).await?;

    Ok(HttpResponse::Ok().json(json!({ "files": files })))
}

async fn find_file(db: &PgPool, id: i32) -> Result<FileRecord, AppError> {
    sqlx::query_as::<_, FileRecord>(&format!(
        "SELECT {FILE_COLUMNS} FROM files
        WHERE id = $1 AND is_active = true AND is_deleted = false AND status = 'active'"
    ))
    .bind(id)
    .fetch_optional(db)
    .await?
    .ok_or(AppError::NotFound(Resource::File))
}

#[get("/{id:\\d+}")]
pub async fn get_file(
    req: HttpRequest,
    db: web::Data<PgPool>,
    path: web::Path<i32>,
) -> Result<HttpResponse, AppError> {
    authenticate(&req, &db).await?;
    let file = find_file(&db, path.into_inner()).await?;

    Ok(HttpResponse::Ok().json(json!({ "file": file })))
}

#[delete("/{id:\\d+}")]
pub async fn delete_file(
    req: HttpRequest,
    db: web::Data<PgPool>,
    storage: web::Data<Storage>,
    path: web::Path<i32>,
) -> Result<HttpResponse, AppError> {
    let user = authenticate(&req, &db).await?;
    let file_id = path.into_inner();

    let file_path = sqlx::query_scalar::<_, String>(
        "SELECT file_path FROM files WHERE id = $1 AND is_active = true AND is_deleted = false",
    )
    .bind(file_id)
    .fetch_optional(db.get_ref())
    .await?
    .ok_or(AppError::NotFound(Resource::File))?;

    sqlx::query(
        "UPDATE files SET
            is_deleted = true,
            status = 'deleted',
            updated_by = $2,
            updated_date = CURRENT_TIMESTAMP
        WHERE id = $1",
    )
    .bind(file_id)
    .bind(user.id)
    .execute(db.get_ref())
    .await?;

    storage.remove_best_effort(&file_path).await;

    tracing::info!(file_id, deleted_by = user.id, "file deleted");

    Ok(HttpResponse::Ok().json(json!({ "success": true })))
}

fn file_response(
    bytes: Vec<u8>,
    content_type: &str,
    disposition: DispositionType,
    name: String,
) -> HttpResponse {
    HttpResponse::Ok()
        .content_type(content_type)
        .insert_header(ContentDisposition {
            disposition,
            parameters: vec![DispositionParam::Filename(name)],
        })
        .insert_header(CacheControl(vec![
            CacheDirective::Public,
            CacheDirective::MaxAge(31_536_000),
        ]))
        .body(bytes)
}

#[get("/download/{id}")]
pub async fn download_file(
    req: HttpRequest,
    db: web::Data<PgPool>,
    storage: web::Data<Storage>,
    path: web::Path<i32>,
) -> Result<HttpResponse, AppError> {
    authenticate(&req, &db).await?;
    let file = find_file(&db, path.into_inner()).await?;

    let bytes = storage.read(&file.file_path).await?.ok_or_else(|| {
        tracing::warn!(file_id = file.id, path = %file.file_path, "physical file missing");
        AppError::NotFound(Resource::File)
    })?;

    Ok(file_response(
        bytes,
        &file.mime_type,
        DispositionType::Inline,
        file.original_name,
    ))
}

/// Public access to stored files by their `folder/name` path.
#[get("/{path:.*}")]
pub async fn serve_file(
    storage: web::Data<Storage>,
    path: web::Path<String>,
    query: web::Query<ServeQuery>,
) -> Result<HttpResponse, AppError> {
    let relative = path.into_inner();
    let bytes = storage
        .read(&relative)
        .await?
        .ok_or(AppError::NotFound(Resource::File))?;

    let extension = extension_of(&relative).unwrap_or_default();
    let mime = mime_for_extension(&extension);
    let disposition = disposition_for(&mime, query.download.unwrap_or(false));
    let name = relative.rsplit('/').next().unwrap_or_default().to_string();

    Ok(file_response(bytes, mime.essence_str(), disposition, name))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn part(name: &str, size: u64, content_type: Option<Mime>) -> UploadedPart {
        UploadedPart {
            original_name: name.to_string(),
            content_type,
            size,
            bytes: Vec::new(),
        }
    }

    #[test]
    fn validate_enforces_size_and_extension() {
        let max = 25 * 1024 * 1024;
        assert_eq!(part("letter.PDF", 10, None).validate(max).unwrap(), ".pdf");

        let err = part("big.png", max + 1, None).validate(max).unwrap_err();
        assert_eq!(err.message(), "File size exceeds 25MB limit");

        let err = part("run.exe", 10, None).validate(max).unwrap_err();
        assert!(err.message().starts_with("File type not allowed"));
    }

    #[test]
    fn mime_prefers_declared_type() {
        let declared = part("photo.jpg", 1, Some(mime::IMAGE_PNG));
        assert_eq!(declared.mime(".jpg"), mime::IMAGE_PNG);

        let generic = part("photo.jpg", 1, Some(mime::APPLICATION_OCTET_STREAM));
        assert_eq!(generic.mime(".jpg"), mime::IMAGE_JPEG);

        let missing = part("notes.txt", 1, None);
        assert_eq!(missing.mime(".txt"), mime::TEXT_PLAIN);
    }

    #[test]
    fn blank_form_fields_are_absent() {
        let mut form = UploadForm::default();
        form.fields.insert("folder".to_string(), "  ".to_string());
        form.fields.insert("referenceId".to_string(), "4".to_string());
        assert_eq!(form.field("folder"), None);
        assert_eq!(form.field("referenceId"), Some("4"));
        assert_eq!(form.field("referenceTable"), None);
    }
}
