use actix_web::web;

use crate::handlers::item_handler::{create_item, delete_item, get_item, get_items, update_item};

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/items")
            .service(get_items)
            .service(create_item)
            .service(get_item)
            .service(update_item)
            .service(delete_item),
    );
}
