use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Value stored under `stock:trade:<symbol>`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub price: f64,
    /// Feed event time, milliseconds since epoch
    pub timestamp: Option<i64>,
    #[serde(default)]
    pub volume: f64,
    /// Wall clock of the cache write
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl TradeRecord {
    pub fn trade_time(&self) -> Option<DateTime<Utc>> {
        self.timestamp.and_then(DateTime::<Utc>::from_timestamp_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_cached_record() {
        let raw = r#"{"price":65000.1,"timestamp":1700000000000,"volume":0.02,"updated_at":"2023-11-14T22:13:21.500+00:00"}"#;
        let record: TradeRecord = serde_json::from_str(raw).unwrap();

        assert_eq!(record.price, 65000.1);
        assert_eq!(
            record.trade_time().unwrap().to_rfc3339(),
            "2023-11-14T22:13:20+00:00"
        );
        assert!(record.updated_at.is_some());
    }

    #[test]
    fn test_decode_record_without_optional_fields() {
        let record: TradeRecord = serde_json::from_str(r#"{"price":3,"timestamp":null}"#).unwrap();
        assert_eq!(record.price, 3.0);
        assert_eq!(record.volume, 0.0);
        assert!(record.trade_time().is_none());
    }
}
