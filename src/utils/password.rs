use actix_web::web;

use crate::message::AppError;

/// Both calls run on the blocking pool.
pub async fn hash_password(password: String, cost: u32) -> Result<String, AppError> {
    Ok(web::block(move || bcrypt::hash(password, cost)).await??)
}

pub async fn verify_password(password: String, hash: String) -> Result<bool, AppError> {
    Ok(web::block(move || bcrypt::verify(password, &hash)).await??)
}
