use actix_web::web;

use crate::handlers::auth_handler::{login, logout, me};

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(web::scope("/auth").service(login).service(logout).service(me));
}
