use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A single OHLCV bar at any granularity.
///
/// Feeds that omit volume are normalised to `0` at the boundary, so
/// resampling and studies never see an absent volume.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candle {
    pub timestamp: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    #[serde(default)]
    pub volume: i64,
}

/// Returns `true` if timestamps are strictly ascending.
pub fn is_strictly_ascending(candles: &[Candle]) -> bool {
    candles.windows(2).all(|w| w[0].timestamp < w[1].timestamp)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn candle_at(min: u32) -> Candle {
        Candle {
            timestamp: Utc.with_ymd_and_hms(2025, 1, 15, 14, min, 0).unwrap(),
            open: dec!(100),
            high: dec!(101),
            low: dec!(99),
            close: dec!(100.5),
            volume: 10,
        }
    }

    #[test]
    fn ascending_check() {
        assert!(is_strictly_ascending(&[]));
        assert!(is_strictly_ascending(&[candle_at(0), candle_at(5)]));
        assert!(!is_strictly_ascending(&[candle_at(5), candle_at(5)]));
        assert!(!is_strictly_ascending(&[candle_at(5), candle_at(0)]));
    }

    #[test]
    fn missing_volume_deserializes_as_zero() {
        let json = r#"{"timestamp":"2025-01-15T14:30:00Z","open":"1","high":"2","low":"0.5","close":"1.5"}"#;
        let candle: Candle = serde_json::from_str(json).unwrap();
        assert_eq!(candle.volume, 0);
        assert_eq!(candle.close, dec!(1.5));
    }
}
