use std::fmt;
use std::str::FromStr;

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::error::ChartError;

/// Selectable chart timeframe, ordered from finest to coarsest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Granularity {
    #[serde(rename = "5m")]
    Min5,
    #[serde(rename = "15m")]
    Min15,
    #[serde(rename = "30m")]
    Min30,
    #[serde(rename = "1h")]
    Hour1,
    #[serde(rename = "4h")]
    Hour4,
    #[serde(rename = "1d")]
    Day1,
    #[serde(rename = "1w")]
    Week1,
}

/// How bars are grouped when resampling to a granularity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BucketPolicy {
    /// The feed's own granularity; bars pass through untouched.
    Identity,
    /// Count-based grouping of consecutive bars, split at session gaps.
    Sequential(Duration),
    /// Wall-clock aligned grouping.
    Calendar(CalendarAnchor),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalendarAnchor {
    /// 00:00 UTC of the bar's day.
    Day,
    /// Monday 00:00 UTC of the bar's ISO week.
    IsoWeek,
}

impl Granularity {
    /// Granularity of the candle feed.
    pub const BASE: Granularity = Granularity::Min5;

    pub const ALL: [Granularity; 7] = [
        Granularity::Min5,
        Granularity::Min15,
        Granularity::Min30,
        Granularity::Hour1,
        Granularity::Hour4,
        Granularity::Day1,
        Granularity::Week1,
    ];

    /// Nominal span of one bar. Daily and weekly bars are calendar-anchored,
    /// so for those this is only the typical length.
    pub fn nominal_duration(&self) -> Duration {
        match self {
            Granularity::Min5 => Duration::minutes(5),
            Granularity::Min15 => Duration::minutes(15),
            Granularity::Min30 => Duration::minutes(30),
            Granularity::Hour1 => Duration::hours(1),
            Granularity::Hour4 => Duration::hours(4),
            Granularity::Day1 => Duration::days(1),
            Granularity::Week1 => Duration::weeks(1),
        }
    }

    pub fn policy(&self) -> BucketPolicy {
        match self {
            Granularity::Min5 => BucketPolicy::Identity,
            Granularity::Min15 | Granularity::Min30 | Granularity::Hour1 | Granularity::Hour4 => {
                BucketPolicy::Sequential(self.nominal_duration())
            }
            Granularity::Day1 => BucketPolicy::Calendar(CalendarAnchor::Day),
            Granularity::Week1 => BucketPolicy::Calendar(CalendarAnchor::IsoWeek),
        }
    }

    /// Short label, e.g. `15m` or `1d`.
    pub fn label(&self) -> &'static str {
        match self {
            Granularity::Min5 => "5m",
            Granularity::Min15 => "15m",
            Granularity::Min30 => "30m",
            Granularity::Hour1 => "1h",
            Granularity::Hour4 => "4h",
            Granularity::Day1 => "1d",
            Granularity::Week1 => "1w",
        }
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Granularity {
    type Err = ChartError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim().to_ascii_lowercase();
        Granularity::ALL
            .into_iter()
            .find(|g| g.label() == needle)
            .ok_or_else(|| ChartError::UnknownGranularity(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_labels_case_insensitive() {
        assert_eq!("15m".parse::<Granularity>().unwrap(), Granularity::Min15);
        assert_eq!("1H".parse::<Granularity>().unwrap(), Granularity::Hour1);
        assert_eq!(" 1w ".parse::<Granularity>().unwrap(), Granularity::Week1);
    }

    #[test]
    fn parse_unknown_label_fails() {
        let err = "2h".parse::<Granularity>().unwrap_err();
        assert!(matches!(err, ChartError::UnknownGranularity(s) if s == "2h"));
    }

    #[test]
    fn display_round_trips_through_parse() {
        for g in Granularity::ALL {
            assert_eq!(g.to_string().parse::<Granularity>().unwrap(), g);
        }
    }

    #[test]
    fn ordering_is_finest_first() {
        let mut sorted = Granularity::ALL;
        sorted.sort();
        assert_eq!(sorted, Granularity::ALL);
        assert_eq!(Granularity::BASE, Granularity::ALL[0]);
    }

    #[test]
    fn policies() {
        assert_eq!(Granularity::Min5.policy(), BucketPolicy::Identity);
        assert_eq!(
            Granularity::Hour4.policy(),
            BucketPolicy::Sequential(Duration::hours(4))
        );
        assert_eq!(
            Granularity::Day1.policy(),
            BucketPolicy::Calendar(CalendarAnchor::Day)
        );
        assert_eq!(
            Granularity::Week1.policy(),
            BucketPolicy::Calendar(CalendarAnchor::IsoWeek)
        );
    }

    #[test]
    fn serializes_as_label() {
        assert_eq!(
            serde_json::to_string(&Granularity::Hour1).unwrap(),
            "\"1h\""
        );
        let parsed: Vec<Granularity> = serde_json::from_str(r#"["5m","1d"]"#).unwrap();
        assert_eq!(parsed, vec![Granularity::Min5, Granularity::Day1]);
    }
}
