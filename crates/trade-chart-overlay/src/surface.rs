//! Contracts for the rendering surfaces the engine drives.
//!
//! Both surfaces are owned by a rendering layer outside this crate and may be
//! torn down at any time. Callers check [`ChartSurface::is_alive`] or
//! [`TraceSurface::is_alive`] before every mutation.

use std::fmt;

use serde::{Deserialize, Serialize};
use trade_chart_core::candle::Candle;
use trade_chart_core::trade::PlotPoint;

use crate::error::SurfaceError;

/// Identifier of an overlay placed on a [`ChartSurface`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct OverlayId(String);

impl OverlayId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OverlayId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LineDash {
    Solid,
    Dashed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LineStyle {
    pub color: String,
    pub width: u32,
    pub dash: LineDash,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MarkerShape {
    TriangleUp,
    TriangleDown,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarkerPoint {
    pub point: PlotPoint,
    pub shape: MarkerShape,
    pub color: String,
}

/// Geometry and style of a single overlay.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Overlay {
    Segment {
        from: PlotPoint,
        to: PlotPoint,
        style: LineStyle,
    },
    Text {
        at: PlotPoint,
        text: String,
        color: String,
    },
    /// Many point markers drawn as one overlay.
    Markers { points: Vec<MarkerPoint> },
}

/// A candle chart that accepts overlays addressed by id.
pub trait ChartSurface {
    /// `false` once the surface has been torn down.
    fn is_alive(&self) -> bool;

    /// Replace the drawn candles.
    fn apply_candles(&mut self, candles: &[Candle]) -> Result<(), SurfaceError>;

    fn create_overlay(&mut self, id: &OverlayId, overlay: Overlay) -> Result<(), SurfaceError>;

    fn remove_overlay(&mut self, id: &OverlayId) -> Result<(), SurfaceError>;
}

/// Visibility of a trace as toggled through the chart legend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TraceVisibility {
    Visible,
    /// Hidden from the plot but still listed in the legend.
    LegendOnly,
}

impl TraceVisibility {
    pub fn toggled(self) -> Self {
        match self {
            TraceVisibility::Visible => TraceVisibility::LegendOnly,
            TraceVisibility::LegendOnly => TraceVisibility::Visible,
        }
    }
}

/// An already-rendered figure with indexed traces and annotations.
///
/// The figure does not notify anyone when a legend toggle changes a trace,
/// so callers have to poll it.
pub trait TraceSurface {
    fn is_alive(&self) -> bool;

    fn trace_count(&self) -> usize;

    /// `None` if `index` is out of range.
    fn trace_visibility(&self, index: usize) -> Option<TraceVisibility>;

    fn set_trace_visibility(
        &mut self,
        index: usize,
        visibility: TraceVisibility,
    ) -> Result<(), SurfaceError>;

    fn annotation_count(&self) -> usize;

    /// `None` if `index` is out of range.
    fn annotation_visible(&self, index: usize) -> Option<bool>;

    fn set_annotation_visible(&mut self, index: usize, visible: bool) -> Result<(), SurfaceError>;
}
