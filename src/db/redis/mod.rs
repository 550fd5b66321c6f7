pub mod connection;
pub mod keys;
pub mod models;
pub mod repository;
