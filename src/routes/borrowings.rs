use actix_web::web;

use crate::handlers::borrowing_handler::{
    create_borrowing, delete_borrowing, get_borrowing, get_borrowings, update_borrowing,
};

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/borrowings")
            .service(get_borrowings)
            .service(create_borrowing)
            .service(get_borrowing)
            .service(update_borrowing)
            .service(delete_borrowing),
    );
}
