//! In-memory surfaces for headless rendering and tests.

use std::collections::BTreeMap;

use trade_chart_core::candle::Candle;

use crate::error::SurfaceError;
use crate::surface::{ChartSurface, Overlay, OverlayId, TraceSurface, TraceVisibility};

/// A candle chart that records what was drawn on it.
#[derive(Debug, Clone)]
pub struct MemoryChart {
    alive: bool,
    candles: Vec<Candle>,
    overlays: BTreeMap<OverlayId, Overlay>,
}

impl Default for MemoryChart {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryChart {
    pub fn new() -> Self {
        Self {
            alive: true,
            candles: Vec::new(),
            overlays: BTreeMap::new(),
        }
    }

    /// Tear the chart down. Everything drawn on it is dropped.
    pub fn dispose(&mut self) {
        self.alive = false;
        self.candles.clear();
        self.overlays.clear();
    }

    pub fn candles(&self) -> &[Candle] {
        &self.candles
    }

    pub fn overlay(&self, id: &OverlayId) -> Option<&Overlay> {
        self.overlays.get(id)
    }

    pub fn overlays(&self) -> impl Iterator<Item = (&OverlayId, &Overlay)> {
        self.overlays.iter()
    }

    pub fn overlay_count(&self) -> usize {
        self.overlays.len()
    }
}

impl ChartSurface for MemoryChart {
    fn is_alive(&self) -> bool {
        self.alive
    }

    fn apply_candles(&mut self, candles: &[Candle]) -> Result<(), SurfaceError> {
        if !self.alive {
            return Err(SurfaceError::Disposed);
        }
        self.candles = candles.to_vec();
        Ok(())
    }

    fn create_overlay(&mut self, id: &OverlayId, overlay: Overlay) -> Result<(), SurfaceError> {
        if !self.alive {
            return Err(SurfaceError::Disposed);
        }
        if self.overlays.contains_key(id) {
            return Err(SurfaceError::Rejected {
                id: id.clone(),
                reason: "id already in use".into(),
            });
        }
        self.overlays.insert(id.clone(), overlay);
        Ok(())
    }

    fn remove_overlay(&mut self, id: &OverlayId) -> Result<(), SurfaceError> {
        if !self.alive {
            return Err(SurfaceError::Disposed);
        }
        self.overlays
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| SurfaceError::UnknownOverlay(id.clone()))
    }
}

/// A figure with legend-toggled traces and positional annotations.
#[derive(Debug, Clone)]
pub struct MemoryFigure {
    alive: bool,
    traces: Vec<TraceVisibility>,
    annotations: Vec<bool>,
}

impl MemoryFigure {
    /// A figure with `traces` visible traces and `annotations` visible annotations.
    pub fn new(traces: usize, annotations: usize) -> Self {
        Self {
            alive: true,
            traces: vec![TraceVisibility::Visible; traces],
            annotations: vec![true; annotations],
        }
    }

    /// A figure in a given state, e.g. one read back from a saved chart.
    pub fn from_parts(traces: Vec<TraceVisibility>, annotations: Vec<bool>) -> Self {
        Self {
            alive: true,
            traces,
            annotations,
        }
    }

    pub fn dispose(&mut self) {
        self.alive = false;
    }

    pub fn traces(&self) -> &[TraceVisibility] {
        &self.traces
    }

    pub fn annotations(&self) -> &[bool] {
        &self.annotations
    }
}

impl TraceSurface for MemoryFigure {
    fn is_alive(&self) -> bool {
        self.alive
    }

    fn trace_count(&self) -> usize {
        self.traces.len()
    }

    fn trace_visibility(&self, index: usize) -> Option<TraceVisibility> {
        self.traces.get(index).copied()
    }

    fn set_trace_visibility(
        &mut self,
        index: usize,
        visibility: TraceVisibility,
    ) -> Result<(), SurfaceError> {
        if !self.alive {
            return Err(SurfaceError::Disposed);
        }
        let len = self.traces.len();
        let slot = self
            .traces
            .get_mut(index)
            .ok_or(SurfaceError::OutOfRange { index, len })?;
        *slot = visibility;
        Ok(())
    }

    fn annotation_count(&self) -> usize {
        self.annotations.len()
    }

    fn annotation_visible(&self, index: usize) -> Option<bool> {
        self.annotations.get(index).copied()
    }

    fn set_annotation_visible(&mut self, index: usize, visible: bool) -> Result<(), SurfaceError> {
        if !self.alive {
            return Err(SurfaceError::Disposed);
        }
        let len = self.annotations.len();
        let slot = self
            .annotations
            .get_mut(index)
            .ok_or(SurfaceError::OutOfRange { index, len })?;
        *slot = visible;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use trade_chart_core::trade::PlotPoint;

    fn text(label: &str) -> Overlay {
        Overlay::Text {
            at: PlotPoint {
                timestamp: Utc.with_ymd_and_hms(2025, 1, 15, 14, 30, 0).unwrap(),
                value: 1.0,
            },
            text: label.to_string(),
            color: "#000".to_string(),
        }
    }

    #[test]
    fn create_and_remove() {
        let mut chart = MemoryChart::new();
        let id = OverlayId::new("a");
        chart.create_overlay(&id, text("1")).unwrap();
        assert_eq!(chart.overlay_count(), 1);
        assert!(matches!(
            chart.create_overlay(&id, text("2")),
            Err(SurfaceError::Rejected { .. })
        ));
        chart.remove_overlay(&id).unwrap();
        assert_eq!(
            chart.remove_overlay(&id),
            Err(SurfaceError::UnknownOverlay(id))
        );
    }

    #[test]
    fn disposed_chart_rejects_mutation() {
        let mut chart = MemoryChart::new();
        chart.dispose();
        assert!(!chart.is_alive());
        assert_eq!(
            chart.create_overlay(&OverlayId::new("a"), text("1")),
            Err(SurfaceError::Disposed)
        );
        assert_eq!(chart.apply_candles(&[]), Err(SurfaceError::Disposed));
    }

    #[test]
    fn figure_index_checks() {
        let mut figure = MemoryFigure::new(2, 1);
        assert_eq!(figure.trace_visibility(2), None);
        assert_eq!(
            figure.set_annotation_visible(3, false),
            Err(SurfaceError::OutOfRange { index: 3, len: 1 })
        );
        figure
            .set_trace_visibility(1, TraceVisibility::LegendOnly)
            .unwrap();
        assert_eq!(figure.trace_visibility(1), Some(TraceVisibility::LegendOnly));
    }
}
