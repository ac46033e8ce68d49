use actix_web::{error, web};

use crate::handlers::health_handler::health;
use crate::message::AppError;

mod auth;
mod borrowings;
mod files;
mod items;
mod users;

/// Malformed bodies, paths and query strings answer with the usual `{error}` body.
fn extractor_errors(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::JsonConfig::default().error_handler(|err, _req| {
        error::Error::from(AppError::bad_request(err.to_string()))
    }))
    .app_data(web::PathConfig::default().error_handler(|err, _req| {
        error::Error::from(AppError::bad_request(err.to_string()))
    }))
    .app_data(web::QueryConfig::default().error_handler(|err, _req| {
        error::Error::from(AppError::bad_request(err.to_string()))
    }));
}

pub fn config(cfg: &mut web::ServiceConfig) {
    extractor_errors(cfg);

    cfg.service(
        web::scope("/api")
            .configure(auth::config)
            .configure(items::config)
            .configure(borrowings::config)
            .configure(users::config)
            .configure(files::config)
            .service(web::scope("/health").service(health)),
    );
}
