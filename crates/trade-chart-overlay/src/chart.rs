use tracing::{debug, warn};
use trade_chart_core::candle::Candle;
use trade_chart_core::config::EngineConfig;
use trade_chart_core::granularity::Granularity;
use trade_chart_core::resample::resample;
use trade_chart_core::study::{StudyLine, StudySettings, StudyToggles, build_study_lines};
use trade_chart_core::trade::{SnappedTrade, TradeMarker, snap_trades};

use crate::surface::ChartSurface;
use crate::synchronizer::{OverlaySynchronizer, SyncReport};

#[derive(Debug, Clone, Copy, Default)]
struct Dirty {
    candles: bool,
    studies: bool,
    trades: bool,
}

impl Dirty {
    fn all() -> Self {
        Self {
            candles: true,
            studies: true,
            trades: true,
        }
    }
}

/// What a [`TradingChart::recompute`] call changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecomputeReport {
    /// Bars pushed to the surface, if the candles were redrawn.
    pub bars: Option<usize>,
    pub studies: Option<SyncReport>,
    pub trades: Option<SyncReport>,
    pub surface_gone: bool,
}

/// One chart view: raw feed in, resampled candles, studies and trades out.
///
/// Setters only record what changed. [`recompute`](Self::recompute) redraws
/// the affected parts. Calls must be serialised by the owner.
#[derive(Debug)]
pub struct TradingChart {
    raw: Vec<Candle>,
    granularity: Granularity,
    toggles: StudyToggles,
    settings: StudySettings,
    trades: Vec<TradeMarker>,
    show_trades: bool,
    rendered: Vec<Candle>,
    overlays: OverlaySynchronizer,
    dirty: Dirty,
}

impl TradingChart {
    pub fn new(namespace: impl Into<String>, settings: StudySettings) -> Self {
        Self {
            raw: Vec::new(),
            granularity: Granularity::BASE,
            toggles: StudyToggles::default(),
            settings,
            trades: Vec::new(),
            show_trades: false,
            rendered: Vec::new(),
            overlays: OverlaySynchronizer::new(namespace),
            dirty: Dirty::all(),
        }
    }

    pub fn from_config(namespace: impl Into<String>, config: &EngineConfig) -> Self {
        Self::new(
            namespace,
            StudySettings {
                ema_period: config.ema_period,
            },
        )
    }

    pub fn granularity(&self) -> Granularity {
        self.granularity
    }

    pub fn toggles(&self) -> StudyToggles {
        self.toggles
    }

    pub fn show_trades(&self) -> bool {
        self.show_trades
    }

    /// Candles as last drawn.
    pub fn rendered(&self) -> &[Candle] {
        &self.rendered
    }

    pub fn overlays(&self) -> &OverlaySynchronizer {
        &self.overlays
    }

    pub fn set_candles(&mut self, candles: Vec<Candle>) {
        self.raw = candles;
        self.dirty = Dirty::all();
    }

    /// Switch timeframe. Switching resets every study toggle and hides trades.
    pub fn set_granularity(&mut self, granularity: Granularity) {
        if granularity == self.granularity {
            return;
        }
        debug!(from = %self.granularity, to = %granularity, "switching timeframe");
        self.granularity = granularity;
        self.toggles = StudyToggles::default();
        self.show_trades = false;
        self.dirty = Dirty::all();
    }

    pub fn set_toggles(&mut self, toggles: StudyToggles) {
        if toggles != self.toggles {
            self.toggles = toggles;
            self.dirty.studies = true;
        }
    }

    pub fn set_trades(&mut self, trades: Vec<TradeMarker>) {
        self.trades = trades;
        self.dirty.trades = true;
    }

    pub fn set_show_trades(&mut self, show: bool) {
        if show != self.show_trades {
            self.show_trades = show;
            self.dirty.trades = true;
        }
    }

    /// Force the next recompute to redraw everything.
    pub fn invalidate(&mut self) {
        self.dirty = Dirty::all();
    }

    /// Study lines for the current rendered candles and toggles.
    pub fn study_lines(&self) -> Vec<StudyLine> {
        build_study_lines(&self.rendered, self.toggles, self.settings)
    }

    /// Trades snapped onto the current rendered candles.
    pub fn snapped_trades(&self) -> Vec<SnappedTrade> {
        snap_trades(&self.rendered, &self.trades)
    }

    /// Bring `surface` up to date with everything changed since the last call.
    pub fn recompute<S>(&mut self, surface: &mut S) -> RecomputeReport
    where
        S: ChartSurface + ?Sized,
    {
        let mut report = RecomputeReport::default();
        if !surface.is_alive() {
            report.surface_gone = true;
            return report;
        }

        // stays set if the candles could not be drawn, so the next call retries
        let mut candles_dirty = false;
        if self.dirty.candles {
            self.rendered = resample(&self.raw, self.granularity);
            match surface.apply_candles(&self.rendered) {
                Ok(()) => report.bars = Some(self.rendered.len()),
                Err(e) => {
                    warn!("failed to draw candles: {e}");
                    candles_dirty = true;
                }
            }
        }

        if self.dirty.studies {
            let lines = self.study_lines();
            let sync = self.overlays.sync_studies(surface, &lines);
            report.surface_gone |= sync.surface_gone;
            report.studies = Some(sync);
        }

        if self.dirty.trades {
            let snapped = if self.show_trades {
                self.snapped_trades()
            } else {
                Vec::new()
            };
            let sync = self.overlays.sync_trades(surface, &snapped, self.show_trades);
            report.surface_gone |= sync.surface_gone;
            report.trades = Some(sync);
        }

        self.dirty = Dirty {
            candles: candles_dirty,
            ..Dirty::default()
        };
        report
    }

    /// Remove every overlay this chart placed on `surface`.
    pub fn teardown<S>(&mut self, surface: &mut S) -> SyncReport
    where
        S: ChartSurface + ?Sized,
    {
        self.dirty = Dirty::all();
        self.overlays.clear(surface)
    }
}
