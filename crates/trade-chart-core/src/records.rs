//! Extraction of candles and trades from loosely-shaped backend payloads.
//!
//! Field names differ between backends, so each trade attribute is looked up
//! through a list of candidate keys. Missing or unparseable values degrade
//! gracefully: a record without usable timestamps is dropped, never fatal.

use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::debug;

use crate::candle::Candle;
use crate::error::ChartError;
use crate::trade::TradeMarker;

/// A performance row as delivered by the backend.
pub type PerformanceRecord = Map<String, Value>;

const ENTRY_TIME_KEYS: &[&str] = &["EnteredAt", "TradeDay"];
const EXIT_TIME_KEYS: &[&str] = &["ExitedAt", "TradeDay"];
const ENTRY_PRICE_KEYS: &[&str] = &["EntryPrice", "Entry", "Open"];
const EXIT_PRICE_KEYS: &[&str] = &["ExitPrice", "Exit", "Close"];
const PNL_KEYS: &[&str] = &["PnL(Net)"];
const TYPE_KEYS: &[&str] = &["Type"];
const SIZE_KEYS: &[&str] = &["Size"];

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// Parse a timestamp as sent by the backend.
///
/// Accepts RFC 3339, naive date-times (read as UTC), bare dates (midnight
/// UTC) and epoch milliseconds.
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, ChartError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(ChartError::InvalidTimestamp(raw.to_string()));
    }

    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }

    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Ok(naive.and_utc());
        }
    }

    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Ok(date.and_time(NaiveTime::MIN).and_utc());
    }

    if let Ok(millis) = raw.parse::<i64>() {
        return DateTime::from_timestamp_millis(millis)
            .ok_or_else(|| ChartError::InvalidTimestamp(raw.to_string()));
    }

    Err(ChartError::InvalidTimestamp(raw.to_string()))
}

/// First value under `keys` that is not null, empty or zero.
fn first_present<'a>(record: &'a PerformanceRecord, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|key| record.get(*key))
        .find(|value| is_truthy(value))
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::String(s) => !s.is_empty(),
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn value_as_decimal(value: &Value) -> Option<Decimal> {
    match value {
        Value::Number(n) => {
            let text = n.to_string();
            Decimal::from_str(&text)
                .or_else(|_| Decimal::from_scientific(&text))
                .ok()
        }
        Value::String(s) => {
            let s = s.trim();
            Decimal::from_str(s)
                .or_else(|_| Decimal::from_scientific(s))
                .ok()
        }
        _ => None,
    }
}

fn value_as_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => parse_timestamp(s).ok(),
        Value::Number(n) => n.as_i64().and_then(DateTime::from_timestamp_millis),
        _ => None,
    }
}

fn value_as_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn decimal_field(record: &PerformanceRecord, keys: &[&str]) -> Option<Decimal> {
    first_present(record, keys).and_then(value_as_decimal)
}

impl TradeMarker {
    /// Build a marker from a performance record, or `None` if its entry or
    /// exit time is missing or unparseable.
    pub fn from_record(record: &PerformanceRecord) -> Option<Self> {
        let entry_time = first_present(record, ENTRY_TIME_KEYS).and_then(value_as_timestamp);
        let exit_time = first_present(record, EXIT_TIME_KEYS).and_then(value_as_timestamp);

        let (Some(entry_time), Some(exit_time)) = (entry_time, exit_time) else {
            debug!(?record, "performance record without usable entry/exit time");
            return None;
        };

        Some(TradeMarker {
            entry_time,
            exit_time,
            entry_price: decimal_field(record, ENTRY_PRICE_KEYS),
            exit_price: decimal_field(record, EXIT_PRICE_KEYS),
            pnl: decimal_field(record, PNL_KEYS).unwrap_or_default(),
            kind: first_present(record, TYPE_KEYS)
                .map(value_as_text)
                .unwrap_or_default(),
            size: decimal_field(record, SIZE_KEYS)
                .and_then(|d| d.trunc().to_i64())
                .unwrap_or_default(),
        })
    }
}

/// Extract every usable trade from a batch of performance records.
pub fn trades_from_records(records: &[PerformanceRecord]) -> Vec<TradeMarker> {
    let trades: Vec<TradeMarker> = records.iter().filter_map(TradeMarker::from_record).collect();
    let skipped = records.len() - trades.len();
    if skipped > 0 {
        debug!(skipped, kept = trades.len(), "dropped unparseable performance records");
    }
    trades
}

/// A candle as delivered by the backend feed.
///
/// `time` is kept as raw JSON: feeds send strings, epoch milliseconds or
/// null, and a bad value only drops this record.
#[derive(Debug, Clone, Deserialize)]
pub struct CandleRecord {
    #[serde(default)]
    pub time: Value,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    #[serde(default)]
    pub volume: Option<f64>,
}

impl CandleRecord {
    pub fn to_candle(&self) -> Result<Candle, ChartError> {
        let timestamp = value_as_timestamp(&self.time)
            .ok_or_else(|| ChartError::InvalidTimestamp(self.time.to_string()))?;
        Ok(Candle {
            timestamp,
            open: self.open,
            high: self.high,
            low: self.low,
            close: self.close,
            volume: self.volume.map(|v| v.round() as i64).unwrap_or(0),
        })
    }
}

/// Convert feed records into an ascending candle sequence.
///
/// Records with unparseable timestamps are skipped. If the feed repeats a
/// timestamp, the first record for it is kept.
pub fn parse_candle_feed(records: &[CandleRecord]) -> Vec<Candle> {
    let mut candles: Vec<Candle> = records
        .iter()
        .filter_map(|record| match record.to_candle() {
            Ok(candle) => Some(candle),
            Err(e) => {
                debug!("skipping candle record: {e}");
                None
            }
        })
        .collect();

    candles.sort_by_key(|c| c.timestamp);
    candles.dedup_by_key(|c| c.timestamp);
    candles
}

/// Like [`parse_candle_feed`], but over raw JSON rows. A row that does not
/// have the candle shape at all is skipped instead of failing the feed.
pub fn parse_candle_values(rows: &[Value]) -> Vec<Candle> {
    let records: Vec<CandleRecord> = rows
        .iter()
        .enumerate()
        .filter_map(|(idx, row)| match CandleRecord::deserialize(row) {
            Ok(record) => Some(record),
            Err(e) => {
                debug!("skipping malformed candle row {idx}: {e}");
                None
            }
        })
        .collect();
    parse_candle_feed(&records)
}
