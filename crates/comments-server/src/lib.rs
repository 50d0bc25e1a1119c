pub mod attachments;
pub mod config;
pub mod db;
pub mod error;
pub mod extract;
pub mod handlers;
pub mod routes;
pub mod sanitize;
pub mod store;
pub mod submission;
pub mod thread;

pub use config::Config;
pub use db::DbPool;
pub use error::AppError;
