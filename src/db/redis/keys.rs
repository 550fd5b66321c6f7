//! Quote cache key layout.

/// Set of symbols the streamer should be subscribed to
pub const SYMBOLS_KEY: &str = "stock:symbols";

/// String: latest trade price
pub const PRICE_PREFIX: &str = "stock:price:";

/// String with TTL: JSON `TradeRecord`
pub const TRADE_PREFIX: &str = "stock:trade:";

pub fn price_key(symbol: &str) -> String {
    format!("{}{}", PRICE_PREFIX, symbol)
}

pub fn trade_key(symbol: &str) -> String {
    format!("{}{}", TRADE_PREFIX, symbol)
}
