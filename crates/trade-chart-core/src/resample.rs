use chrono::{DateTime, Datelike, Duration, NaiveTime, Utc};
use rust_decimal::Decimal;

use crate::candle::{self, Candle};
use crate::granularity::{BucketPolicy, CalendarAnchor, Granularity};

/// Cadence assumed when the feed is too short to infer one.
pub const DEFAULT_BASE_INTERVAL: Duration = Duration::minutes(5);

/// Resample an ascending candle sequence to `target`.
///
/// The base granularity is the identity. Intraday targets group a fixed
/// number of consecutive bars, splitting at session gaps. Daily and weekly
/// targets align to UTC calendar boundaries.
pub fn resample(candles: &[Candle], target: Granularity) -> Vec<Candle> {
    debug_assert!(
        candle::is_strictly_ascending(candles),
        "candle feed must be strictly ascending"
    );

    match target.policy() {
        BucketPolicy::Identity => candles.to_vec(),
        BucketPolicy::Sequential(span) => resample_sequential(candles, span),
        BucketPolicy::Calendar(anchor) => resample_calendar(candles, anchor),
    }
}

/// Median of the positive gaps between consecutive bars. For an even number
/// of gaps the lower-middle one is taken.
pub fn infer_base_interval(candles: &[Candle]) -> Duration {
    let mut deltas: Vec<Duration> = candles
        .windows(2)
        .map(|w| w[1].timestamp - w[0].timestamp)
        .filter(|d| *d > Duration::zero())
        .collect();

    if deltas.is_empty() {
        return DEFAULT_BASE_INTERVAL;
    }

    deltas.sort();
    deltas[(deltas.len() - 1) / 2]
}

fn resample_sequential(candles: &[Candle], span: Duration) -> Vec<Candle> {
    if candles.is_empty() {
        return Vec::new();
    }

    let base = infer_base_interval(candles);
    let bars_per_bucket = bars_per_bucket(span, base);
    // gap > 1.5 * base, kept in integer milliseconds
    let base_ms = base.num_milliseconds();
    let splits_session = |gap: Duration| gap.num_milliseconds() * 2 > base_ms * 3;

    let mut out = Vec::new();
    let mut current: Option<Bucket> = None;
    let mut prev_ts: Option<DateTime<Utc>> = None;

    for bar in candles {
        let gap_split = prev_ts.is_some_and(|prev| splits_session(bar.timestamp - prev));

        match current.as_mut() {
            Some(bucket) if bucket.bars < bars_per_bucket && !gap_split => bucket.absorb(bar),
            _ => {
                if let Some(done) = current.take() {
                    out.push(done.finish());
                }
                current = Some(Bucket::open(bar.timestamp, bar));
            }
        }
        prev_ts = Some(bar.timestamp);
    }

    if let Some(done) = current {
        out.push(done.finish());
    }
    out
}

fn resample_calendar(candles: &[Candle], anchor: CalendarAnchor) -> Vec<Candle> {
    let mut out = Vec::new();
    let mut current: Option<Bucket> = None;

    for bar in candles {
        let key = calendar_key(bar.timestamp, anchor);
        match current.as_mut() {
            Some(bucket) if bucket.timestamp == key => bucket.absorb(bar),
            _ => {
                if let Some(done) = current.take() {
                    out.push(done.finish());
                }
                current = Some(Bucket::open(key, bar));
            }
        }
    }

    if let Some(done) = current {
        out.push(done.finish());
    }
    out
}

fn bars_per_bucket(span: Duration, base: Duration) -> usize {
    let base_ms = base.num_milliseconds().max(1) as f64;
    let ratio = (span.num_milliseconds() as f64 / base_ms).round();
    (ratio as usize).max(1)
}

/// Start of the UTC day or ISO week containing `ts`.
pub fn calendar_key(ts: DateTime<Utc>, anchor: CalendarAnchor) -> DateTime<Utc> {
    let date = ts.date_naive();
    let start = match anchor {
        CalendarAnchor::Day => date,
        CalendarAnchor::IsoWeek => {
            date - Duration::days(i64::from(date.weekday().num_days_from_monday()))
        }
    };
    start.and_time(NaiveTime::MIN).and_utc()
}

/// Running aggregate of the bars in one output candle.
struct Bucket {
    timestamp: DateTime<Utc>,
    open: Decimal,
    high: Decimal,
    low: Decimal,
    close: Decimal,
    volume: i64,
    bars: usize,
}

impl Bucket {
    fn open(timestamp: DateTime<Utc>, first: &Candle) -> Self {
        Self {
            timestamp,
            open: first.open,
            high: first.high,
            low: first.low,
            close: first.close,
            volume: first.volume,
            bars: 1,
        }
    }

    fn absorb(&mut self, bar: &Candle) {
        self.high = self.high.max(bar.high);
        self.low = self.low.min(bar.low);
        self.close = bar.close;
        self.volume += bar.volume;
        self.bars += 1;
    }

    fn finish(self) -> Candle {
        Candle {
            timestamp: self.timestamp,
            open: self.open,
            high: self.high,
            low: self.low,
            close: self.close,
            volume: self.volume,
        }
    }
}
