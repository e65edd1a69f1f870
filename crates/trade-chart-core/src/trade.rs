use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::candle::Candle;

pub const WIN_COLOR: &str = "#16a34a";
pub const LOSS_COLOR: &str = "#dc2626";

/// A closed trade with parsed entry and exit times.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeMarker {
    pub entry_time: DateTime<Utc>,
    pub exit_time: DateTime<Utc>,
    pub entry_price: Option<Decimal>,
    pub exit_price: Option<Decimal>,
    pub pnl: Decimal,
    /// Direction as reported by the backend, e.g. `Long` or `Short`.
    pub kind: String,
    pub size: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TradeOutcome {
    Win,
    Loss,
}

impl TradeOutcome {
    /// Zero pnl counts as a win.
    pub fn from_pnl(pnl: Decimal) -> Self {
        if pnl.is_sign_negative() && !pnl.is_zero() {
            TradeOutcome::Loss
        } else {
            TradeOutcome::Win
        }
    }

    pub fn color(&self) -> &'static str {
        match self {
            TradeOutcome::Win => WIN_COLOR,
            TradeOutcome::Loss => LOSS_COLOR,
        }
    }
}

/// A position on the chart's time/price plane.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlotPoint {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

/// A trade whose endpoints have been moved onto rendered bars.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnappedTrade {
    pub entry: PlotPoint,
    pub exit: PlotPoint,
    pub outcome: TradeOutcome,
    pub pnl: Decimal,
    pub kind: String,
    pub size: i64,
}

/// Index of the candle closest in time to `ts`. On an exact tie the earlier
/// candle wins.
pub fn nearest_candle(candles: &[Candle], ts: DateTime<Utc>) -> Option<usize> {
    if candles.is_empty() {
        return None;
    }

    let after = candles.partition_point(|c| c.timestamp < ts);
    if after == 0 {
        return Some(0);
    }
    if after == candles.len() {
        return Some(candles.len() - 1);
    }

    let before = after - 1;
    let dist_before = ts - candles[before].timestamp;
    let dist_after = candles[after].timestamp - ts;
    if dist_before <= dist_after {
        Some(before)
    } else {
        Some(after)
    }
}

/// Snap trades onto a rendered candle sequence.
///
/// Output is ordered by entry time (stable for equal entries), so later
/// trades draw on top. A trade whose entry and exit land on the same bar, or
/// on inverted bars, is dropped.
pub fn snap_trades(candles: &[Candle], trades: &[TradeMarker]) -> Vec<SnappedTrade> {
    if candles.is_empty() {
        return Vec::new();
    }

    let mut ordered: Vec<&TradeMarker> = trades.iter().collect();
    ordered.sort_by_key(|t| t.entry_time);

    ordered
        .into_iter()
        .filter_map(|trade| snap_trade(candles, trade))
        .collect()
}

fn snap_trade(candles: &[Candle], trade: &TradeMarker) -> Option<SnappedTrade> {
    let entry_bar = &candles[nearest_candle(candles, trade.entry_time)?];
    let exit_bar = &candles[nearest_candle(candles, trade.exit_time)?];

    if entry_bar.timestamp >= exit_bar.timestamp {
        debug!(
            entry = %trade.entry_time,
            exit = %trade.exit_time,
            bar = %entry_bar.timestamp,
            "trade collapses onto a single bar, skipping"
        );
        return None;
    }

    let plotted = |captured: Option<Decimal>, bar: &Candle| {
        captured.unwrap_or(bar.close).to_f64().unwrap_or_default()
    };

    Some(SnappedTrade {
        entry: PlotPoint {
            timestamp: entry_bar.timestamp,
            value: plotted(trade.entry_price, entry_bar),
        },
        exit: PlotPoint {
            timestamp: exit_bar.timestamp,
            value: plotted(trade.exit_price, exit_bar),
        },
        outcome: TradeOutcome::from_pnl(trade.pnl),
        pnl: trade.pnl,
        kind: trade.kind.clone(),
        size: trade.size,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use rust_decimal_macros::dec;

    fn at(hour: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 15, hour, min, 0).unwrap()
    }

    /// 15-minute bars from 14:00, closes 100, 101, ...
    fn bars(count: usize) -> Vec<Candle> {
        (0..count)
            .map(|i| {
                let close = dec!(100) + Decimal::from(i as i64);
                Candle {
                    timestamp: at(14, 0) + Duration::minutes(15 * i as i64),
                    open: close,
                    high: close + dec!(1),
                    low: close - dec!(1),
                    close,
                    volume: 10,
                }
            })
            .collect()
    }

    fn trade(entry: DateTime<Utc>, exit: DateTime<Utc>, pnl: Decimal) -> TradeMarker {
        TradeMarker {
            entry_time: entry,
            exit_time: exit,
            entry_price: None,
            exit_price: None,
            pnl,
            kind: "Long".to_string(),
            size: 1,
        }
    }

    #[test]
    fn nearest_candle_on_empty_series() {
        assert_eq!(nearest_candle(&[], at(14, 0)), None);
    }

    #[test]
    fn nearest_candle_clamps_to_ends() {
        let candles = bars(4);
        assert_eq!(nearest_candle(&candles, at(9, 0)), Some(0));
        assert_eq!(nearest_candle(&candles, at(20, 0)), Some(3));
    }

    #[test]
    fn equidistant_timestamp_snaps_to_earlier_bar() {
        let candles = bars(3);
        // halfway between 14:15 and 14:30
        let ts = at(14, 22) + Duration::seconds(30);
        assert_eq!(nearest_candle(&candles, ts), Some(1));
    }

    #[test]
    fn nearest_candle_picks_closer_side() {
        let candles = bars(3);
        assert_eq!(nearest_candle(&candles, at(14, 23)), Some(2));
        assert_eq!(nearest_candle(&candles, at(14, 15)), Some(1));
    }

    #[test]
    fn snapped_trade_uses_bar_close_without_captured_price() {
        let candles = bars(4);
        let out = snap_trades(&candles, &[trade(at(14, 2), at(14, 40), dec!(25))]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].entry.timestamp, at(14, 0));
        assert_eq!(out[0].exit.timestamp, at(14, 45));
        assert_eq!(out[0].entry.value, 100.0);
        assert_eq!(out[0].exit.value, 103.0);
        assert_eq!(out[0].outcome, TradeOutcome::Win);
    }

    #[test]
    fn captured_price_wins_over_close() {
        let candles = bars(4);
        let mut t = trade(at(14, 0), at(14, 30), dec!(-5));
        t.entry_price = Some(dec!(100.25));
        t.exit_price = Some(dec!(99.75));
        let out = snap_trades(&candles, &[t]);
        assert_eq!(out[0].entry.value, 100.25);
        assert_eq!(out[0].exit.value, 99.75);
        assert_eq!(out[0].outcome, TradeOutcome::Loss);
        assert_eq!(out[0].outcome.color(), LOSS_COLOR);
    }

    #[test]
    fn trade_inside_one_bar_is_rejected() {
        let candles = bars(4);
        let out = snap_trades(&candles, &[trade(at(14, 16), at(14, 20), dec!(1))]);
        assert!(out.is_empty());
    }

    #[test]
    fn inverted_trade_is_rejected() {
        let candles = bars(4);
        let out = snap_trades(&candles, &[trade(at(14, 45), at(14, 0), dec!(1))]);
        assert!(out.is_empty());
    }

    #[test]
    fn empty_series_rejects_everything() {
        let out = snap_trades(&[], &[trade(at(14, 0), at(15, 0), dec!(1))]);
        assert!(out.is_empty());
    }

    #[test]
    fn output_sorted_by_entry_and_always_forward() {
        let candles = bars(8);
        let trades = vec![
            trade(at(15, 0), at(15, 30), dec!(1)),
            trade(at(14, 0), at(14, 50), dec!(-1)),
            trade(at(14, 31), at(14, 33), dec!(2)),
            trade(at(14, 15), at(15, 15), dec!(0)),
        ];
        let out = snap_trades(&candles, &trades);
        assert_eq!(out.len(), 3);
        let entries: Vec<_> = out.iter().map(|t| t.entry.timestamp).collect();
        assert_eq!(entries, vec![at(14, 0), at(14, 15), at(15, 0)]);
        assert!(out.iter().all(|t| t.entry.timestamp < t.exit.timestamp));
    }

    #[test]
    fn zero_pnl_counts_as_win() {
        assert_eq!(TradeOutcome::from_pnl(dec!(0)), TradeOutcome::Win);
        assert_eq!(TradeOutcome::from_pnl(dec!(-0.00)), TradeOutcome::Win);
        assert_eq!(TradeOutcome::from_pnl(dec!(-0.01)), TradeOutcome::Loss);
        assert_eq!(TradeOutcome::Win.color(), WIN_COLOR);
    }
}
