use std::fmt;
use std::str::FromStr;

use chrono::Duration;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::candle::Candle;
use crate::error::ChartError;
use crate::trade::TradeMarker;

/// Holding-time classification of a closed trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HoldType {
    /// Held five minutes or less.
    Scalp,
    /// Longer than a scalp, under thirty minutes.
    Hybrid,
    Swing,
}

impl HoldType {
    pub fn classify(held: Duration) -> Self {
        if held <= Duration::minutes(5) {
            HoldType::Scalp
        } else if held < Duration::minutes(30) {
            HoldType::Hybrid
        } else {
            HoldType::Swing
        }
    }

    pub fn of(trade: &TradeMarker) -> Self {
        Self::classify(trade.exit_time - trade.entry_time)
    }

    pub fn code(&self) -> &'static str {
        match self {
            HoldType::Scalp => "Sc",
            HoldType::Hybrid => "Sc/w",
            HoldType::Swing => "Sw",
        }
    }
}

impl fmt::Display for HoldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for HoldType {
    type Err = ChartError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sc" | "scalp" => Ok(HoldType::Scalp),
            "sc/w" | "hybrid" => Ok(HoldType::Hybrid),
            "sw" | "swing" => Ok(HoldType::Swing),
            other => Err(ChartError::InvalidConfig(format!("unknown hold type: {other}"))),
        }
    }
}

/// Position size bucket: S up to 2 contracts, M up to 5, L above.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SizeBucket {
    S,
    M,
    L,
}

impl SizeBucket {
    pub fn classify(size: i64) -> Self {
        match size {
            ..=2 => SizeBucket::S,
            3..=5 => SizeBucket::M,
            _ => SizeBucket::L,
        }
    }
}

impl FromStr for SizeBucket {
    type Err = ChartError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "S" | "s" => Ok(SizeBucket::S),
            "M" | "m" => Ok(SizeBucket::M),
            "L" | "l" => Ok(SizeBucket::L),
            other => Err(ChartError::InvalidConfig(format!("unknown size bucket: {other}"))),
        }
    }
}

/// Trade table filter. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TradeFilter {
    pub direction: Option<String>,
    pub hold_type: Option<HoldType>,
    pub size: Option<SizeBucket>,
}

impl TradeFilter {
    pub fn matches(&self, trade: &TradeMarker) -> bool {
        let direction_ok = self
            .direction
            .as_deref()
            .is_none_or(|d| d == trade.kind);
        let hold_ok = self.hold_type.is_none_or(|h| h == HoldType::of(trade));
        let size_ok = self
            .size
            .is_none_or(|s| s == SizeBucket::classify(trade.size));
        direction_ok && hold_ok && size_ok
    }

    pub fn apply<'a>(&self, trades: &'a [TradeMarker]) -> Vec<&'a TradeMarker> {
        trades.iter().filter(|t| self.matches(t)).collect()
    }
}

/// Trade counts per holding-time class.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DurationBins {
    pub scalp: usize,
    pub hybrid: usize,
    pub swing: usize,
}

impl DurationBins {
    pub fn from_trades(trades: &[TradeMarker]) -> Self {
        let mut bins = Self::default();
        for trade in trades {
            match HoldType::of(trade) {
                HoldType::Scalp => bins.scalp += 1,
                HoldType::Hybrid => bins.hybrid += 1,
                HoldType::Swing => bins.swing += 1,
            }
        }
        bins
    }

    pub fn total(&self) -> usize {
        self.scalp + self.hybrid + self.swing
    }
}

/// Open, high, low and close over a whole rendered series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct OhlcRange {
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
}

impl OhlcRange {
    pub fn of(candles: &[Candle]) -> Option<Self> {
        let first = candles.first()?;
        let last = candles.last()?;
        let (high, low) = candles
            .iter()
            .fold((first.high, first.low), |(hi, lo), c| {
                (hi.max(c.high), lo.min(c.low))
            });
        Some(Self {
            open: first.open,
            high,
            low,
            close: last.close,
        })
    }
}
