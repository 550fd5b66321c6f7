use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Outbound control frame, `{"type":"subscribe","symbol":"..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ControlMessage {
    Subscribe { symbol: String },
    Unsubscribe { symbol: String },
}

impl ControlMessage {
    pub fn symbol(&self) -> &str {
        match self {
            ControlMessage::Subscribe { symbol } | ControlMessage::Unsubscribe { symbol } => symbol,
        }
    }
}

/// One usable trade entry from a `trade` event.
#[derive(Debug, Clone, PartialEq)]
pub struct TradeTick {
    pub symbol: String,
    pub price: f64,
    /// Event time, milliseconds since epoch
    pub timestamp: Option<i64>,
    pub volume: f64,
}

#[derive(Deserialize)]
struct FeedEnvelope {
    #[serde(rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    data: Value,
}

#[derive(Deserialize)]
struct RawTrade {
    #[serde(rename = "s")]
    symbol: Option<String>,
    #[serde(rename = "p")]
    price: Option<f64>,
    #[serde(rename = "t")]
    timestamp: Option<i64>,
    #[serde(rename = "v")]
    volume: Option<f64>,
}

/// Extracts trade ticks from an inbound frame.
///
/// Non-trade events yield nothing. Entries without a symbol or price, or that
/// do not decode, are dropped individually. Only a frame that is not JSON at
/// all is an error.
pub fn parse_trades(text: &str) -> Result<Vec<TradeTick>, serde_json::Error> {
    let envelope: FeedEnvelope = serde_json::from_str(text)?;

    if envelope.kind.as_deref() != Some("trade") {
        return Ok(Vec::new());
    }

    let Value::Array(entries) = envelope.data else {
        return Ok(Vec::new());
    };

    Ok(entries
        .into_iter()
        .filter_map(|entry| serde_json::from_value::<RawTrade>(entry).ok())
        .filter_map(|raw| {
            let symbol = raw.symbol.filter(|s| !s.is_empty())?;
            let price = raw.price?;
            Some(TradeTick {
                symbol,
                price,
                timestamp: raw.timestamp,
                volume: raw.volume.unwrap_or(0.0),
            })
        })
        .collect())
}

/// `BINANCE:BTCUSDT` -> (`BINANCE`, `BTCUSDT`); plain tickers have no exchange.
pub fn split_symbol(symbol: &str) -> (&str, &str) {
    symbol.split_once(':').unwrap_or(("", symbol))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_control_message_json() {
        let sub = ControlMessage::Subscribe {
            symbol: "BINANCE:BTCUSDT".to_string(),
        };
        assert_eq!(
            serde_json::to_string(&sub).unwrap(),
            r#"{"type":"subscribe","symbol":"BINANCE:BTCUSDT"}"#
        );

        let unsub = ControlMessage::Unsubscribe {
            symbol: "AAPL".to_string(),
        };
        assert_eq!(
            serde_json::to_string(&unsub).unwrap(),
            r#"{"type":"unsubscribe","symbol":"AAPL"}"#
        );
    }

    #[test]
    fn test_parse_drops_entries_without_price() {
        let msg = r#"{"type":"trade","data":[{"s":"X","p":1.0,"t":1000},{"s":"Y","p":null,"t":1000}]}"#;
        let ticks = parse_trades(msg).unwrap();

        assert_eq!(
            ticks,
            vec![TradeTick {
                symbol: "X".to_string(),
                price: 1.0,
                timestamp: Some(1000),
                volume: 0.0,
            }]
        );
    }

    #[test]
    fn test_parse_drops_entries_without_symbol() {
        let msg = r#"{"type":"trade","data":[{"p":2.5,"t":1000,"v":3},{"s":"","p":1.0}]}"#;
        assert!(parse_trades(msg).unwrap().is_empty());
    }

    #[test]
    fn test_parse_keeps_volume_and_multiple_entries() {
        let msg = r#"{"type":"trade","data":[
            {"s":"BINANCE:BTCUSDT","p":65000.1,"t":1700000000000,"v":0.02},
            {"s":"AAPL","p":189,"t":1700000000500,"v":100}
        ]}"#;
        let ticks = parse_trades(msg).unwrap();

        assert_eq!(ticks.len(), 2);
        assert_eq!(ticks[0].volume, 0.02);
        assert_eq!(ticks[1].price, 189.0);
    }

    #[test]
    fn test_parse_ignores_other_types() {
        assert!(parse_trades(r#"{"type":"ping"}"#).unwrap().is_empty());
        assert!(parse_trades(r#"{"type":"error","msg":"bad symbol"}"#).unwrap().is_empty());
        assert!(parse_trades(r#"{"type":"trade","data":"oops"}"#).unwrap().is_empty());
    }

    #[test]
    fn test_parse_rejects_non_json() {
        assert!(parse_trades("not json").is_err());
    }

    #[test]
    fn test_split_symbol() {
        assert_eq!(split_symbol("BINANCE:BTCUSDT"), ("BINANCE", "BTCUSDT"));
        assert_eq!(split_symbol("OANDA:EUR_USD"), ("OANDA", "EUR_USD"));
        assert_eq!(split_symbol("AAPL"), ("", "AAPL"));
    }
}
