pub mod connection;
pub mod listener;
pub mod models;
pub mod postgres_service;
pub mod repository;
