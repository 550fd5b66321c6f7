pub mod health_check_repository;
pub mod instrument_repository;
pub mod maintenance_repository;
pub mod price_history_repository;
