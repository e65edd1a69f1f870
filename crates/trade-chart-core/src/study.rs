use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};

use crate::candle::Candle;
use crate::trade::PlotPoint;

pub const DEFAULT_EMA_PERIOD: usize = 20;

pub const EMA_LINE_ID: &str = "ema20";
pub const VWAP_LINE_ID: &str = "vwap";
pub const BAR_COUNT_LINE_ID: &str = "barcount";

const EMA_COLOR: &str = "#6366f1";
const VWAP_COLOR: &str = "#f59e0b";
const BAR_COUNT_COLOR: &str = "#334155";

/// Smallest bar range used when placing bar-count labels, so a flat bar
/// still gets a visible cushion.
const MIN_LABEL_RANGE: f64 = 0.0001;
const LABEL_CUSHION_RATIO: f64 = 0.02;

/// One plotted value of a study.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudyPoint {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<usize>,
}

impl StudyPoint {
    pub fn plot_point(&self) -> PlotPoint {
        PlotPoint {
            timestamp: self.timestamp,
            value: self.value,
        }
    }
}

/// A derived series drawn over the candles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudyLine {
    pub id: String,
    pub color: String,
    pub points: Vec<StudyPoint>,
}

impl StudyLine {
    /// Lines made of per-bar text labels rather than connected segments.
    pub fn is_label_line(&self) -> bool {
        self.id == BAR_COUNT_LINE_ID
    }
}

/// Which studies are switched on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudyToggles {
    pub ema: bool,
    pub vwap: bool,
    pub bar_count: bool,
}

impl StudyToggles {
    pub fn any(&self) -> bool {
        self.ema || self.vwap || self.bar_count
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StudySettings {
    pub ema_period: usize,
}

impl Default for StudySettings {
    fn default() -> Self {
        Self {
            ema_period: DEFAULT_EMA_PERIOD,
        }
    }
}

fn to_f64(value: Decimal) -> f64 {
    value.to_f64().unwrap_or_default()
}

/// Exponential moving average of closes, seeded with the first close.
///
/// The first `period - 1` bars only warm up the recurrence, so the output has
/// `max(0, len - period + 1)` points. A zero period behaves like 1.
pub fn ema(candles: &[Candle], period: usize) -> Vec<StudyPoint> {
    let period = period.max(1);
    let Some(first) = candles.first() else {
        return Vec::new();
    };

    let alpha = 2.0 / (period as f64 + 1.0);
    let mut value = to_f64(first.close);
    let mut points = Vec::with_capacity(candles.len().saturating_sub(period - 1));

    for (idx, bar) in candles.iter().enumerate() {
        if idx > 0 {
            value = to_f64(bar.close) * alpha + value * (1.0 - alpha);
        }
        if idx + 1 >= period {
            points.push(StudyPoint {
                timestamp: bar.timestamp,
                value,
                label: None,
            });
        }
    }
    points
}

/// Cumulative volume-weighted typical price from the first bar onward.
/// Bars with no volume weigh 1.
pub fn vwap(candles: &[Candle]) -> Vec<StudyPoint> {
    let mut weighted_sum = 0.0;
    let mut weight_sum = 0.0;
    let mut points = Vec::with_capacity(candles.len());

    for bar in candles {
        let weight = if bar.volume == 0 {
            1.0
        } else {
            bar.volume as f64
        };
        let typical = to_f64(bar.high + bar.low + bar.close) / 3.0;
        weighted_sum += typical * weight;
        weight_sum += weight;

        if weight_sum > 0.0 {
            points.push(StudyPoint {
                timestamp: bar.timestamp,
                value: weighted_sum / weight_sum,
                label: None,
            });
        }
    }
    points
}

/// 1-based bar numbers anchored just below each bar's low.
pub fn bar_index_labels(candles: &[Candle]) -> Vec<StudyPoint> {
    candles
        .iter()
        .enumerate()
        .map(|(idx, bar)| {
            let range = to_f64(bar.high - bar.low).max(MIN_LABEL_RANGE);
            StudyPoint {
                timestamp: bar.timestamp,
                value: to_f64(bar.low) - range * LABEL_CUSHION_RATIO,
                label: Some(idx + 1),
            }
        })
        .collect()
}

/// Build the enabled study lines for a rendered candle sequence.
///
/// Segment studies with fewer than two points draw nothing and are left out.
pub fn build_study_lines(
    candles: &[Candle],
    toggles: StudyToggles,
    settings: StudySettings,
) -> Vec<StudyLine> {
    let mut lines = Vec::new();
    if candles.is_empty() {
        return lines;
    }

    if toggles.ema {
        let points = ema(candles, settings.ema_period);
        if points.len() > 1 {
            lines.push(StudyLine {
                id: EMA_LINE_ID.to_string(),
                color: EMA_COLOR.to_string(),
                points,
            });
        }
    }

    if toggles.vwap {
        let points = vwap(candles);
        if points.len() > 1 {
            lines.push(StudyLine {
                id: VWAP_LINE_ID.to_string(),
                color: VWAP_COLOR.to_string(),
                points,
            });
        }
    }

    if toggles.bar_count {
        lines.push(StudyLine {
            id: BAR_COUNT_LINE_ID.to_string(),
            color: BAR_COUNT_COLOR.to_string(),
            points: bar_index_labels(candles),
        });
    }

    lines
}
