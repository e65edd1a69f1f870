use std::collections::HashMap;

use tracing::{debug, warn};
use trade_chart_core::study::StudyLine;
use trade_chart_core::trade::SnappedTrade;

use crate::surface::{
    ChartSurface, LineDash, LineStyle, MarkerPoint, MarkerShape, Overlay, OverlayId,
};

const STUDY_LINE_WIDTH: u32 = 2;
const TRADE_LINE_WIDTH: u32 = 3;

/// Group an overlay belongs to. Each group is rebuilt as a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OverlayRole {
    /// Study segments and bar-count labels.
    Study,
    /// Entry-to-exit line of one trade.
    TradeSegment,
    /// The shared marker overlay carrying every entry and exit point.
    TradeMarker,
}

impl OverlayRole {
    pub const ALL: [OverlayRole; 3] = [
        OverlayRole::Study,
        OverlayRole::TradeSegment,
        OverlayRole::TradeMarker,
    ];

    const TRADES: [OverlayRole; 2] = [OverlayRole::TradeSegment, OverlayRole::TradeMarker];

    fn tag(&self) -> &'static str {
        match self {
            OverlayRole::Study => "study",
            OverlayRole::TradeSegment => "trade-line",
            OverlayRole::TradeMarker => "trade-markers",
        }
    }
}

/// Outcome of one synchronisation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub removed: usize,
    pub created: usize,
    /// Overlays the surface refused to create.
    pub failed: usize,
    /// The surface was torn down before or during the pass.
    pub surface_gone: bool,
}

/// Keeps a chart's overlays in step with the current studies and trades.
///
/// Every overlay it places gets an id minted here, and only those ids are
/// ever removed. Overlays placed on the same surface by anyone else are
/// never touched. Each pass clears a role group and rebuilds it from
/// scratch.
///
/// Passes must not overlap; callers serialise them.
#[derive(Debug)]
pub struct OverlaySynchronizer {
    namespace: String,
    next_seq: u64,
    owned: HashMap<OverlayRole, Vec<OverlayId>>,
}

impl OverlaySynchronizer {
    /// `namespace` prefixes every minted id so that several synchronizers can
    /// share one surface.
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            next_seq: 0,
            owned: HashMap::new(),
        }
    }

    /// Ids currently tracked for `role`, in creation order.
    pub fn owned(&self, role: OverlayRole) -> &[OverlayId] {
        self.owned.get(&role).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn owned_count(&self) -> usize {
        self.owned.values().map(Vec::len).sum()
    }

    /// Replace study overlays. A line of `K` points becomes `K - 1`
    /// segments; the bar-count line becomes one text label per bar.
    pub fn sync_studies<S>(&mut self, surface: &mut S, lines: &[StudyLine]) -> SyncReport
    where
        S: ChartSurface + ?Sized,
    {
        let overlays = study_overlays(lines)
            .into_iter()
            .map(|o| (OverlayRole::Study, o))
            .collect();
        self.rebuild(surface, &[OverlayRole::Study], overlays)
    }

    /// Replace trade overlays: one segment per trade plus one shared marker
    /// overlay. With `show` off the trade groups are only cleared.
    pub fn sync_trades<S>(&mut self, surface: &mut S, trades: &[SnappedTrade], show: bool) -> SyncReport
    where
        S: ChartSurface + ?Sized,
    {
        let overlays = if show {
            trade_overlays(trades)
        } else {
            Vec::new()
        };
        self.rebuild(surface, &OverlayRole::TRADES, overlays)
    }

    /// Remove everything this synchronizer placed.
    pub fn clear<S>(&mut self, surface: &mut S) -> SyncReport
    where
        S: ChartSurface + ?Sized,
    {
        self.rebuild(surface, &OverlayRole::ALL, Vec::new())
    }

    fn rebuild<S>(
        &mut self,
        surface: &mut S,
        roles: &[OverlayRole],
        overlays: Vec<(OverlayRole, Overlay)>,
    ) -> SyncReport
    where
        S: ChartSurface + ?Sized,
    {
        let mut report = SyncReport::default();
        if !surface.is_alive() {
            debug!(namespace = %self.namespace, "chart surface gone, skipping overlay sync");
            report.surface_gone = true;
            return report;
        }

        for role in roles {
            let Some(ids) = self.owned.remove(role) else {
                continue;
            };
            for id in ids {
                if !surface.is_alive() {
                    report.surface_gone = true;
                    return report;
                }
                match surface.remove_overlay(&id) {
                    Ok(()) => report.removed += 1,
                    Err(e) => debug!("ignoring failed removal of {id}: {e}"),
                }
            }
        }

        for (role, overlay) in overlays {
            if !surface.is_alive() {
                report.surface_gone = true;
                break;
            }
            let id = self.mint(role);
            match surface.create_overlay(&id, overlay) {
                Ok(()) => {
                    self.owned.entry(role).or_default().push(id);
                    report.created += 1;
                }
                Err(e) => {
                    warn!("failed to create overlay {id}: {e}");
                    report.failed += 1;
                }
            }
        }

        report
    }

    fn mint(&mut self, role: OverlayRole) -> OverlayId {
        let id = OverlayId::new(format!("{}:{}:{}", self.namespace, role.tag(), self.next_seq));
        self.next_seq += 1;
        id
    }
}

fn study_overlays(lines: &[StudyLine]) -> Vec<Overlay> {
    let mut overlays = Vec::new();
    for line in lines {
        if line.is_label_line() {
            overlays.extend(line.points.iter().enumerate().map(|(idx, p)| Overlay::Text {
                at: p.plot_point(),
                text: p.label.unwrap_or(idx + 1).to_string(),
                color: line.color.clone(),
            }));
        } else {
            overlays.extend(line.points.windows(2).map(|pair| Overlay::Segment {
                from: pair[0].plot_point(),
                to: pair[1].plot_point(),
                style: LineStyle {
                    color: line.color.clone(),
                    width: STUDY_LINE_WIDTH,
                    dash: LineDash::Dashed,
                },
            }));
        }
    }
    overlays
}

fn trade_overlays(trades: &[SnappedTrade]) -> Vec<(OverlayRole, Overlay)> {
    let mut overlays = Vec::with_capacity(trades.len() + 1);
    let mut markers = Vec::with_capacity(trades.len() * 2);

    for trade in trades {
        let color = trade.outcome.color().to_string();
        markers.push(MarkerPoint {
            point: trade.entry,
            shape: MarkerShape::TriangleUp,
            color: color.clone(),
        });
        markers.push(MarkerPoint {
            point: trade.exit,
            shape: MarkerShape::TriangleDown,
            color: color.clone(),
        });
        overlays.push((
            OverlayRole::TradeSegment,
            Overlay::Segment {
                from: trade.entry,
                to: trade.exit,
                style: LineStyle {
                    color,
                    width: TRADE_LINE_WIDTH,
                    dash: LineDash::Solid,
                },
            },
        ));
    }

    if !markers.is_empty() {
        overlays.push((OverlayRole::TradeMarker, Overlay::Markers { points: markers }));
    }
    overlays
}
