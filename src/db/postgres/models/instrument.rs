use sqlx::FromRow;

/// Row of the `instruments` table. Maintained outside this service; only the
/// columns the pipeline resolves against are mapped.
#[derive(Debug, Clone, FromRow)]
pub struct Instrument {
    pub id: i32,
    /// Feed symbol, e.g. `BINANCE:BTCUSDT`
    pub symbol: String,
}
