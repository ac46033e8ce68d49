use actix_web::web;

use crate::handlers::files_handler::{
    delete_file, download_file, get_file, get_files, serve_file, upload_files,
};
use crate::handlers::upload_handler::{delete_upload, upload};

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/files")
            .service(upload_files)
            .service(get_files)
            .service(download_file)
            .service(get_file)
            .service(delete_file)
            // public catch-all, must stay last
            .service(serve_file),
    )
    .service(web::scope("/upload").service(upload).service(delete_upload));
}
