//! Keeps a figure's annotations in step with the visibility of their traces.
//!
//! The figure has no change event for legend toggles, so the state is
//! polled. [`ScheduledReconciler`] drives the poll from an injected clock.
//! [`spawn_visibility_sync`] runs it on the tokio runtime until its handle
//! is dropped.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, trace};
use trade_chart_core::config::{EngineConfig, TraceLayout};

use crate::surface::{TraceSurface, TraceVisibility};

const MIN_PERIOD: Duration = Duration::from_millis(1);

/// Make annotation `i` visible unless trace `i + offset` is legend-only.
///
/// Annotations whose trace does not exist are left alone. Returns how many
/// annotations changed; a second call with no trace changes returns 0.
pub fn reconcile_annotations<S>(surface: &mut S, offset: usize) -> usize
where
    S: TraceSurface + ?Sized,
{
    if !surface.is_alive() {
        return 0;
    }

    let mut changed = 0;
    for idx in 0..surface.annotation_count() {
        let Some(trace) = idx
            .checked_add(offset)
            .and_then(|t| surface.trace_visibility(t))
        else {
            continue;
        };

        let visible = trace != TraceVisibility::LegendOnly;
        if surface.annotation_visible(idx) == Some(visible) {
            continue;
        }
        match surface.set_annotation_visible(idx, visible) {
            Ok(()) => changed += 1,
            Err(e) => debug!("annotation {idx} not updated: {e}"),
        }
    }
    changed
}

/// Hide every trading trace. Returns the number of traces changed.
pub fn hide_trading_traces<S>(surface: &mut S, layout: &TraceLayout) -> usize
where
    S: TraceSurface + ?Sized,
{
    update_trading_traces(surface, layout, |_| TraceVisibility::LegendOnly)
}

/// Flip each trading trace between shown and legend-only.
pub fn toggle_trading_traces<S>(surface: &mut S, layout: &TraceLayout) -> usize
where
    S: TraceSurface + ?Sized,
{
    update_trading_traces(surface, layout, TraceVisibility::toggled)
}

fn update_trading_traces<S, F>(surface: &mut S, layout: &TraceLayout, next: F) -> usize
where
    S: TraceSurface + ?Sized,
    F: Fn(TraceVisibility) -> TraceVisibility,
{
    if !surface.is_alive() {
        return 0;
    }

    let mut changed = 0;
    for idx in layout.trading_traces_start..surface.trace_count() {
        let Some(current) = surface.trace_visibility(idx) else {
            continue;
        };
        let target = next(current);
        if target != current && surface.set_trace_visibility(idx, target).is_ok() {
            changed += 1;
        }
    }
    changed
}

/// Source of the current time for scheduling.
pub trait Clock {
    fn now(&self) -> Instant;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// A clock that only moves when told to. Clones share the same time.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<Instant>>,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            now: Arc::new(Mutex::new(Instant::now())),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += by;
    }
}

/// The tokio runtime's clock. Follows paused and advanced time in tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioClock;

impl Clock for TokioClock {
    fn now(&self) -> Instant {
        tokio::time::Instant::now().into_std()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Runs [`reconcile_annotations`] at most once per period of its clock.
#[derive(Debug)]
pub struct ScheduledReconciler<C: Clock> {
    clock: C,
    period: Duration,
    offset: usize,
    next_due: Instant,
}

impl<C: Clock> ScheduledReconciler<C> {
    /// The first reconciliation is due one period after creation.
    pub fn new(clock: C, period: Duration, offset: usize) -> Self {
        let period = period.max(MIN_PERIOD);
        let next_due = clock.now() + period;
        Self {
            clock,
            period,
            offset,
            next_due,
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Reconcile if a tick is due. Missed ticks are skipped, not replayed.
    /// Returns `None` when nothing was due.
    pub fn poll<S>(&mut self, surface: &mut S) -> Option<usize>
    where
        S: TraceSurface + ?Sized,
    {
        let now = self.clock.now();
        if now < self.next_due {
            return None;
        }
        // stay on the original phase, however many periods were missed
        let behind = (now - self.next_due).as_nanos() % self.period.as_nanos();
        self.next_due = now + self.period - Duration::from_nanos(behind as u64);
        Some(reconcile_annotations(surface, self.offset))
    }
}

/// Owns a running visibility sync task. Dropping it stops the task.
#[derive(Debug)]
pub struct VisibilitySyncHandle {
    task: JoinHandle<()>,
}

impl VisibilitySyncHandle {
    pub fn cancel(self) {
        self.task.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for VisibilitySyncHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Reconcile `surface` on the current tokio runtime, every
/// `config.reconcile_period()`, with annotations bound through
/// `config.layout`.
///
/// The surface is re-checked on every tick; once torn down, ticks do
/// nothing until the handle is dropped.
pub fn spawn_visibility_sync<S>(surface: Arc<Mutex<S>>, config: &EngineConfig) -> VisibilitySyncHandle
where
    S: TraceSurface + Send + 'static,
{
    let mut reconciler = ScheduledReconciler::new(
        TokioClock,
        config.reconcile_period(),
        config.layout.annotation_offset,
    );
    let period = reconciler.period();
    debug!(?period, offset = config.layout.annotation_offset, "starting visibility sync");

    let task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // the first tick fires immediately; wait a full period instead
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let changed = {
                let mut guard = surface.lock().unwrap_or_else(|e| e.into_inner());
                reconciler.poll(&mut *guard)
            };
            if let Some(changed @ 1..) = changed {
                trace!(changed, "annotation visibility reconciled");
            }
        }
    });
    VisibilitySyncHandle { task }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryFigure;

    fn layout(offset: usize, start: usize) -> TraceLayout {
        TraceLayout {
            annotation_offset: offset,
            trading_traces_start: start,
        }
    }

    fn config(period_ms: u64, offset: usize) -> EngineConfig {
        EngineConfig {
            reconcile_period_ms: period_ms,
            layout: layout(offset, 86),
            ..Default::default()
        }
    }

    #[test]
    fn annotations_follow_offset_traces() {
        let mut figure = MemoryFigure::new(8, 3);
        figure
            .set_trace_visibility(5, TraceVisibility::LegendOnly)
            .unwrap();
        figure
            .set_trace_visibility(7, TraceVisibility::LegendOnly)
            .unwrap();

        assert_eq!(reconcile_annotations(&mut figure, 5), 2);
        assert_eq!(figure.annotations(), &[false, true, false]);

        // idempotent
        assert_eq!(reconcile_annotations(&mut figure, 5), 0);
        assert_eq!(figure.annotations(), &[false, true, false]);

        figure
            .set_trace_visibility(5, TraceVisibility::Visible)
            .unwrap();
        assert_eq!(reconcile_annotations(&mut figure, 5), 1);
        assert_eq!(figure.annotations(), &[true, true, false]);
    }

    #[test]
    fn out_of_range_trace_leaves_annotation_alone() {
        let mut figure = MemoryFigure::new(6, 3);
        figure.set_annotation_visible(2, false).unwrap();
        // annotation 2 binds to trace 7, which does not exist
        assert_eq!(reconcile_annotations(&mut figure, 5), 0);
        assert_eq!(figure.annotations(), &[true, true, false]);
    }

    #[test]
    fn disposed_figure_is_a_no_op() {
        let mut figure = MemoryFigure::new(6, 1);
        figure
            .set_trace_visibility(5, TraceVisibility::LegendOnly)
            .unwrap();
        figure.dispose();
        assert_eq!(reconcile_annotations(&mut figure, 5), 0);
        assert_eq!(figure.annotations(), &[true]);
    }

    #[test]
    fn trading_traces_hide_and_toggle() {
        let mut figure = MemoryFigure::new(6, 0);
        let layout = layout(0, 3);

        assert_eq!(hide_trading_traces(&mut figure, &layout), 3);
        assert_eq!(&figure.traces()[..3], &[TraceVisibility::Visible; 3]);
        assert_eq!(&figure.traces()[3..], &[TraceVisibility::LegendOnly; 3]);
        assert_eq!(hide_trading_traces(&mut figure, &layout), 0);

        figure
            .set_trace_visibility(4, TraceVisibility::Visible)
            .unwrap();
        assert_eq!(toggle_trading_traces(&mut figure, &layout), 3);
        assert_eq!(
            &figure.traces()[3..],
            &[
                TraceVisibility::Visible,
                TraceVisibility::LegendOnly,
                TraceVisibility::Visible
            ]
        );
    }

    #[test]
    fn trading_start_past_end_changes_nothing() {
        let mut figure = MemoryFigure::new(4, 0);
        assert_eq!(toggle_trading_traces(&mut figure, &layout(0, 86)), 0);
    }

    #[test]
    fn scheduled_reconciler_waits_for_period() {
        let clock = ManualClock::new();
        let mut reconciler = ScheduledReconciler::new(clock.clone(), Duration::from_millis(500), 1);
        let mut figure = MemoryFigure::new(2, 1);
        figure
            .set_trace_visibility(1, TraceVisibility::LegendOnly)
            .unwrap();

        assert_eq!(reconciler.poll(&mut figure), None);
        clock.advance(Duration::from_millis(499));
        assert_eq!(reconciler.poll(&mut figure), None);
        assert_eq!(figure.annotations(), &[true]);

        clock.advance(Duration::from_millis(1));
        assert_eq!(reconciler.poll(&mut figure), Some(1));
        assert_eq!(figure.annotations(), &[false]);

        // not due again until the next period
        assert_eq!(reconciler.poll(&mut figure), None);
    }

    #[test]
    fn scheduled_reconciler_skips_missed_ticks() {
        let clock = ManualClock::new();
        let mut reconciler = ScheduledReconciler::new(clock.clone(), Duration::from_millis(500), 0);
        let mut figure = MemoryFigure::new(1, 1);

        clock.advance(Duration::from_millis(2_250));
        assert_eq!(reconciler.poll(&mut figure), Some(0));
        assert_eq!(reconciler.poll(&mut figure), None);
        clock.advance(Duration::from_millis(250));
        assert_eq!(reconciler.poll(&mut figure), Some(0));
    }

    #[test]
    fn long_stall_resumes_on_phase() {
        let clock = ManualClock::new();
        let mut reconciler = ScheduledReconciler::new(clock.clone(), Duration::ZERO, 0);
        let mut figure = MemoryFigure::new(1, 1);

        // ten hours of 1 ms periods
        clock.advance(Duration::from_secs(36_000) + Duration::from_micros(400));
        assert_eq!(reconciler.poll(&mut figure), Some(0));
        assert_eq!(reconciler.poll(&mut figure), None);
        clock.advance(Duration::from_micros(600));
        assert_eq!(reconciler.poll(&mut figure), Some(0));
    }

    #[test]
    fn zero_period_is_clamped() {
        let reconciler = ScheduledReconciler::new(SystemClock, Duration::ZERO, 0);
        assert_eq!(reconciler.period(), MIN_PERIOD);
    }

    #[tokio::test(start_paused = true)]
    async fn spawned_sync_ticks_on_virtual_time() {
        let figure = Arc::new(Mutex::new(MemoryFigure::new(6, 1)));
        let handle = spawn_visibility_sync(figure.clone(), &config(500, 5));

        figure
            .lock()
            .unwrap()
            .set_trace_visibility(5, TraceVisibility::LegendOnly)
            .unwrap();

        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(figure.lock().unwrap().annotations(), &[true]);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(figure.lock().unwrap().annotations(), &[false]);
        assert!(!handle.is_finished());
        handle.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn spawned_sync_follows_configured_period_and_offset() {
        let figure = Arc::new(Mutex::new(MemoryFigure::new(4, 2)));
        let _handle = spawn_visibility_sync(figure.clone(), &config(2_000, 2));

        figure
            .lock()
            .unwrap()
            .set_trace_visibility(3, TraceVisibility::LegendOnly)
            .unwrap();

        tokio::time::sleep(Duration::from_millis(1_900)).await;
        assert_eq!(figure.lock().unwrap().annotations(), &[true, true]);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(figure.lock().unwrap().annotations(), &[true, false]);
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_handle_stops_the_task() {
        let figure = Arc::new(Mutex::new(MemoryFigure::new(6, 1)));
        let handle = spawn_visibility_sync(figure.clone(), &config(500, 5));
        drop(handle);

        figure
            .lock()
            .unwrap()
            .set_trace_visibility(5, TraceVisibility::LegendOnly)
            .unwrap();
        tokio::time::sleep(Duration::from_millis(2_000)).await;
        assert_eq!(figure.lock().unwrap().annotations(), &[true]);
    }

    #[tokio::test(start_paused = true)]
    async fn torn_down_figure_does_not_stop_or_break_the_task() {
        let figure = Arc::new(Mutex::new(MemoryFigure::new(6, 1)));
        let handle = spawn_visibility_sync(figure.clone(), &config(500, 5));

        {
            let mut guard = figure.lock().unwrap();
            guard
                .set_trace_visibility(5, TraceVisibility::LegendOnly)
                .unwrap();
            guard.dispose();
        }
        tokio::time::sleep(Duration::from_millis(1_600)).await;

        assert!(!handle.is_finished());
        assert_eq!(figure.lock().unwrap().annotations(), &[true]);
    }
}
