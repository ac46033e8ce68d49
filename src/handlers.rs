pub mod auth_handler;
pub mod borrowing_handler;
pub mod files_handler;
pub mod health_handler;
pub mod item_handler;
pub mod upload_handler;
pub mod user_handler;
