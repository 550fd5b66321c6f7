pub mod batch_fetcher;
