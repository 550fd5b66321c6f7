pub mod backoff;
pub mod client;
pub mod feed_message;
pub mod subscriptions;
pub mod trade_writer;
