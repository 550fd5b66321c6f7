use chrono::{DateTime, Utc};
use sqlx::FromRow;

/// Row to append to `price_history`.
#[derive(Debug, Clone, PartialEq)]
pub struct NewPriceHistory {
    pub instrument_id: i32,
    pub price: f64,
    /// Feed-reported event time of the trade
    pub trade_timestamp: DateTime<Utc>,
}

/// Stored `price_history` row, as exported by the backup.
#[derive(Debug, Clone, FromRow)]
pub struct PriceHistoryRecord {
    pub id: i32,
    pub instrument_id: i32,
    pub price: f64,
    pub trade_timestamp: DateTime<Utc>,
}
