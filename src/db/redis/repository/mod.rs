pub mod quote_cache_repository;
