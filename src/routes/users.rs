use actix_web::web;

use crate::handlers::user_handler::{
    create_user, delete_user, get_borrowers, get_user, get_users, update_user,
};

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/users")
            .service(get_users)
            .service(create_user)
            .service(get_borrowers)
            .service(get_user)
            .service(update_user)
            .service(delete_user),
    );
}
