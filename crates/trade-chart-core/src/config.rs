use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::ChartError;
use crate::granularity::Granularity;
use crate::study::DEFAULT_EMA_PERIOD;

/// Environment variable naming a JSON config file.
pub const CONFIG_ENV_VAR: &str = "TRADE_CHART_CONFIG";

pub const DEFAULT_RECONCILE_PERIOD_MS: u64 = 500;

/// Positions of trace groups in a chart assembled elsewhere.
///
/// These depend on how the chart's traces were laid out, so they are
/// supplied with the chart rather than fixed in code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TraceLayout {
    /// Annotation `i` follows the visibility of trace `i + annotation_offset`.
    pub annotation_offset: usize,
    /// Index of the first trading trace; every trace after it is one too.
    pub trading_traces_start: usize,
}

impl Default for TraceLayout {
    fn default() -> Self {
        Self {
            annotation_offset: 5,
            trading_traces_start: 86,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Granularities offered for selection, finest first.
    pub timeframes: Vec<Granularity>,
    /// Period of the annotation visibility reconciliation, in milliseconds.
    pub reconcile_period_ms: u64,
    pub ema_period: usize,
    pub layout: TraceLayout,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            timeframes: Granularity::ALL.to_vec(),
            reconcile_period_ms: DEFAULT_RECONCILE_PERIOD_MS,
            ema_period: DEFAULT_EMA_PERIOD,
            layout: TraceLayout::default(),
        }
    }
}

impl EngineConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ChartError> {
        let mut config: EngineConfig = serde_json::from_str(json)?;
        config.normalize()?;
        Ok(config)
    }

    /// Read a config file. Fails on I/O, parse or validation errors.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ChartError> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&text)
    }

    /// Read a config file, falling back to defaults on any failure.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!("failed to load config from {}: {e}; using defaults", path.display());
                Self::default()
            }
        }
    }

    /// Load from the file named by `TRADE_CHART_CONFIG`, or defaults if unset.
    pub fn from_env() -> Self {
        match std::env::var(CONFIG_ENV_VAR) {
            Ok(path) if !path.trim().is_empty() => Self::load_or_default(path.trim()),
            _ => Self::default(),
        }
    }

    pub fn reconcile_period(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.reconcile_period_ms)
    }

    fn normalize(&mut self) -> Result<(), ChartError> {
        if self.timeframes.is_empty() {
            warn!("config lists no timeframes; using defaults");
            self.timeframes = Granularity::ALL.to_vec();
        }
        self.timeframes.sort();
        self.timeframes.dedup();

        if self.reconcile_period_ms == 0 {
            return Err(ChartError::InvalidConfig(
                "reconcile_period_ms must be positive".into(),
            ));
        }
        if self.ema_period == 0 {
            return Err(ChartError::InvalidConfig(
                "ema_period must be positive".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.timeframes.len(), 7);
        assert_eq!(config.timeframes[0], Granularity::BASE);
        assert_eq!(config.reconcile_period(), std::time::Duration::from_millis(500));
        assert_eq!(config.ema_period, 20);
        assert_eq!(config.layout.annotation_offset, 5);
        assert_eq!(config.layout.trading_traces_start, 86);
    }

    #[test]
    fn partial_json_keeps_defaults_for_missing_fields() {
        let config =
            EngineConfig::from_json_str(r#"{"timeframes": ["1h", "5m", "1h"], "layout": {"annotation_offset": 2}}"#)
                .unwrap();
        assert_eq!(config.timeframes, vec![Granularity::Min5, Granularity::Hour1]);
        assert_eq!(config.reconcile_period_ms, 500);
        assert_eq!(config.layout.annotation_offset, 2);
        assert_eq!(config.layout.trading_traces_start, 86);
    }

    #[test]
    fn empty_timeframes_fall_back() {
        let config = EngineConfig::from_json_str(r#"{"timeframes": []}"#).unwrap();
        assert_eq!(config.timeframes, Granularity::ALL.to_vec());
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!(matches!(
            EngineConfig::from_json_str(r#"{"reconcile_period_ms": 0}"#),
            Err(ChartError::InvalidConfig(_))
        ));
        assert!(matches!(
            EngineConfig::from_json_str(r#"{"timeframes": ["2h"]}"#),
            Err(ChartError::Json(_))
        ));
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"reconcile_period_ms": 250, "ema_period": 9}}"#).unwrap();

        let config = EngineConfig::load(file.path()).unwrap();
        assert_eq!(config.reconcile_period_ms, 250);
        assert_eq!(config.ema_period, 9);
    }

    #[test]
    fn load_or_default_survives_missing_and_broken_files() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.json");
        assert_eq!(EngineConfig::load_or_default(&missing), EngineConfig::default());

        let broken = dir.path().join("broken.json");
        std::fs::write(&broken, "{not json").unwrap();
        assert_eq!(EngineConfig::load_or_default(&broken), EngineConfig::default());
    }
}
