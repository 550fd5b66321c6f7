mod health_api;
mod health_db;

pub use health_api::health_api;
pub use health_db::health_db;
