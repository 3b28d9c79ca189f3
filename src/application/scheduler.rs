// Refresh scheduler - drives the per-view poll/reshape/merge/render cycles
use crate::application::aggregator::TrackAggregator;
use crate::application::builder::{build_chart_model, build_map_model};
use crate::application::render_sink::{RenderSink, SinkError};
use crate::application::reshape::reshape;
use crate::application::telemetry_source::{QuerySpec, SourceError, TelemetrySource};
use crate::infrastructure::config::DashboardConfig;
use chrono::Duration;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::MissedTickBehavior;

/// A failure confined to one tick. The prior render stays on screen and the
/// next scheduled tick tries again; aggregator state is only mutated once a
/// batch has fetched and reshaped cleanly.
#[derive(Debug, Error)]
pub enum CycleError {
    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Sink(#[from] SinkError),
}

/// Configured seconds as a duration, saturating at the representable
/// maximum instead of wrapping. Loaded configs are range-checked up front;
/// this guards ones constructed in code.
fn secs(value: u64) -> Duration {
    i64::try_from(value)
        .ok()
        .and_then(Duration::try_seconds)
        .unwrap_or(Duration::MAX)
}

/// Runs the map and chart refresh cycles on independent fixed cadences.
///
/// Each cycle runs to completion inside its own loop, so a view can never
/// overlap itself; a slow tick delays the next one (missed ticks are
/// skipped, not queued). The two views interleave freely and share only the
/// aggregator, which they lock for the merge-and-build step.
pub struct RefreshScheduler {
    source: Arc<dyn TelemetrySource>,
    sink: Arc<dyn RenderSink>,
    aggregator: Arc<Mutex<TrackAggregator>>,
    config: DashboardConfig,
    map_spec: QuerySpec,
    chart_spec: QuerySpec,
}

impl RefreshScheduler {
    pub fn new(
        source: Arc<dyn TelemetrySource>,
        sink: Arc<dyn RenderSink>,
        aggregator: Arc<Mutex<TrackAggregator>>,
        config: DashboardConfig,
    ) -> Self {
        let map_spec = QuerySpec::position_snapshot(
            secs(config.map.window_secs),
            secs(config.map.every_secs),
            vec![
                config.measurements.position.clone(),
                config.measurements.speed.clone(),
            ],
        );
        let chart_spec = QuerySpec::line_series(
            secs(config.chart.window_secs),
            secs(config.chart.every_secs),
            vec![
                config.measurements.speed.clone(),
                config.measurements.control.clone(),
            ],
            config.chart.line.clone(),
        );
        Self {
            source,
            sink,
            aggregator,
            config,
            map_spec,
            chart_spec,
        }
    }

    /// Run both view loops until the process is stopped.
    pub async fn run(&self) {
        tokio::join!(self.run_map_view(), self.run_chart_view());
    }

    async fn run_map_view(&self) {
        let period = std::time::Duration::from_millis(self.config.map.interval_ms);
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            if let Err(e) = self.map_cycle().await {
                tracing::warn!("map refresh cycle failed, keeping prior render: {e}");
            }
        }
    }

    async fn run_chart_view(&self) {
        let period = std::time::Duration::from_millis(self.config.chart.interval_ms);
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            if let Err(e) = self.chart_cycle().await {
                tracing::warn!("chart refresh cycle failed, keeping prior render: {e}");
            }
        }
    }

    /// One map tick: snapshot query, merge into the track store, render the
    /// full store. An empty result still renders (the model then equals the
    /// prior cycle's).
    pub async fn map_cycle(&self) -> Result<(), CycleError> {
        let samples = self.source.fetch_window(&self.map_spec).await?;
        let rows = reshape(&samples);

        let model = {
            let mut aggregator = self.aggregator.lock().await;
            aggregator.merge(&rows);
            build_map_model(aggregator.tracks())
        };

        tracing::debug!(
            "map cycle: {} samples, {} rows, {} entities",
            samples.len(),
            rows.len(),
            model.entities.len()
        );
        self.sink.update_map(&model).await?;
        Ok(())
    }

    /// One chart tick: in-window dual series for the fixed line. The window
    /// itself is the history shown; nothing is retained across ticks.
    pub async fn chart_cycle(&self) -> Result<(), CycleError> {
        let samples = self.source.fetch_window(&self.chart_spec).await?;
        let rows = reshape(&samples);
        let model = build_chart_model(&rows);

        tracing::debug!(
            "chart cycle: {} samples, {} axis points",
            samples.len(),
            model.timestamps.len()
        );
        self.sink.update_chart(&model).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::aggregator::RetentionPolicy;
    use crate::domain::render::{ChartModel, MapModel};
    use crate::domain::telemetry::{EntityKey, Field, Sample};
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use std::sync::Mutex as StdMutex;

    struct FakeSource {
        /// One canned batch per fetch, popped front to back.
        batches: StdMutex<Vec<Result<Vec<Sample>, SourceError>>>,
    }

    impl FakeSource {
        fn new(batches: Vec<Result<Vec<Sample>, SourceError>>) -> Self {
            Self {
                batches: StdMutex::new(batches),
            }
        }
    }

    #[async_trait]
    impl TelemetrySource for FakeSource {
        async fn fetch_window(&self, _spec: &QuerySpec) -> Result<Vec<Sample>, SourceError> {
            let mut batches = self.batches.lock().unwrap();
            if batches.is_empty() {
                Ok(Vec::new())
            } else {
                batches.remove(0)
            }
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        maps: StdMutex<Vec<MapModel>>,
        charts: StdMutex<Vec<ChartModel>>,
    }

    #[async_trait]
    impl RenderSink for RecordingSink {
        async fn update_map(&self, model: &MapModel) -> Result<(), SinkError> {
            self.maps.lock().unwrap().push(model.clone());
            Ok(())
        }

        async fn update_chart(&self, model: &ChartModel) -> Result<(), SinkError> {
            self.charts.lock().unwrap().push(model.clone());
            Ok(())
        }
    }

    fn scheduler(
        batches: Vec<Result<Vec<Sample>, SourceError>>,
    ) -> (RefreshScheduler, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::default());
        let aggregator = Arc::new(Mutex::new(TrackAggregator::new(
            Vec::new(),
            RetentionPolicy::default(),
        )));
        let scheduler = RefreshScheduler::new(
            Arc::new(FakeSource::new(batches)),
            sink.clone(),
            aggregator,
            DashboardConfig::default(),
        );
        (scheduler, sink)
    }

    fn position_batch(line: &str, secs: u32, lat: f64, lon: f64) -> Vec<Sample> {
        let t = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, secs).unwrap();
        let entity = EntityKey::new(line);
        vec![
            Sample::new(entity.clone(), t, Field::Lat, lat),
            Sample::new(entity, t, Field::Lon, lon),
        ]
    }

    #[tokio::test]
    async fn test_map_cycle_renders_merged_tracks() {
        let (scheduler, sink) = scheduler(vec![Ok(position_batch("lineA", 1, 52.0, -1.0))]);
        scheduler.map_cycle().await.unwrap();

        let maps = sink.maps.lock().unwrap();
        assert_eq!(maps.len(), 1);
        assert_eq!(maps[0].entities[0].id, "lineA");
    }

    #[tokio::test]
    async fn test_empty_result_renders_model_equal_to_prior_cycle() {
        let (scheduler, sink) = scheduler(vec![
            Ok(position_batch("lineA", 1, 52.0, -1.0)),
            Ok(Vec::new()),
        ]);
        scheduler.map_cycle().await.unwrap();
        scheduler.map_cycle().await.unwrap();

        let maps = sink.maps.lock().unwrap();
        assert_eq!(maps.len(), 2);
        assert_eq!(maps[0], maps[1]);
    }

    #[tokio::test]
    async fn test_source_failure_skips_render_and_preserves_state() {
        let refused = SourceError::Refused {
            status: 503,
            body: "unavailable".to_string(),
        };
        let (scheduler, sink) = scheduler(vec![
            Ok(position_batch("lineA", 1, 52.0, -1.0)),
            Err(refused),
            Ok(position_batch("lineA", 2, 52.1, -1.1)),
        ]);

        scheduler.map_cycle().await.unwrap();
        assert!(scheduler.map_cycle().await.is_err());
        scheduler.map_cycle().await.unwrap();

        let maps = sink.maps.lock().unwrap();
        // Failed tick rendered nothing; the track survived it.
        assert_eq!(maps.len(), 2);
        assert_eq!(maps[1].entities[0].path.len(), 2);
    }

    /// Blocks in the network call, like a slow telemetry store.
    struct SlowSource {
        delay: std::time::Duration,
        fetch_starts: StdMutex<Vec<tokio::time::Instant>>,
    }

    #[async_trait]
    impl TelemetrySource for SlowSource {
        async fn fetch_window(&self, _spec: &QuerySpec) -> Result<Vec<Sample>, SourceError> {
            self.fetch_starts
                .lock()
                .unwrap()
                .push(tokio::time::Instant::now());
            tokio::time::sleep(self.delay).await;
            Ok(position_batch("lineA", 1, 52.0, -1.0))
        }
    }

    /// Rejects one update mid-sequence, like a model shape mismatch.
    struct RejectingSink {
        maps: StdMutex<Vec<MapModel>>,
        fail_on_call: usize,
        calls: StdMutex<usize>,
    }

    #[async_trait]
    impl RenderSink for RejectingSink {
        async fn update_map(&self, model: &MapModel) -> Result<(), SinkError> {
            let call = {
                let mut calls = self.calls.lock().unwrap();
                *calls += 1;
                *calls
            };
            if call == self.fail_on_call {
                return Err(SinkError::map("series shape mismatch"));
            }
            self.maps.lock().unwrap().push(model.clone());
            Ok(())
        }

        async fn update_chart(&self, _model: &ChartModel) -> Result<(), SinkError> {
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_tick_delays_next_cycle_instead_of_bursting() {
        let source = Arc::new(SlowSource {
            delay: std::time::Duration::from_millis(2500),
            fetch_starts: StdMutex::new(Vec::new()),
        });
        let sink = Arc::new(RecordingSink::default());
        let aggregator = Arc::new(Mutex::new(TrackAggregator::new(
            Vec::new(),
            RetentionPolicy::default(),
        )));
        let scheduler = Arc::new(RefreshScheduler::new(
            source.clone(),
            sink.clone(),
            aggregator,
            DashboardConfig::default(),
        ));

        let view = tokio::spawn({
            let scheduler = scheduler.clone();
            async move { scheduler.run_map_view().await }
        });
        tokio::time::sleep(std::time::Duration::from_millis(6400)).await;
        view.abort();

        // 2500ms cycles on a 1000ms cadence: each fetch waits for the next
        // whole tick (0, 3000, 6000). Missed ticks are dropped, never run
        // back-to-back, and a cycle never overlaps itself.
        let starts = source.fetch_starts.lock().unwrap();
        assert_eq!(starts.len(), 3);
        assert_eq!(starts[1] - starts[0], std::time::Duration::from_millis(3000));
        assert_eq!(starts[2] - starts[0], std::time::Duration::from_millis(6000));
        // Only the first two cycles have finished rendering by now.
        assert_eq!(sink.maps.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_sink_rejection_fails_cycle_but_keeps_aggregator_state() {
        let sink = Arc::new(RejectingSink {
            maps: StdMutex::new(Vec::new()),
            fail_on_call: 2,
            calls: StdMutex::new(0),
        });
        let aggregator = Arc::new(Mutex::new(TrackAggregator::new(
            Vec::new(),
            RetentionPolicy::default(),
        )));
        let scheduler = RefreshScheduler::new(
            Arc::new(FakeSource::new(vec![
                Ok(position_batch("lineA", 1, 52.0, -1.0)),
                Ok(position_batch("lineA", 2, 52.1, -1.1)),
                Ok(position_batch("lineA", 3, 52.2, -1.2)),
            ])),
            sink.clone(),
            aggregator,
            DashboardConfig::default(),
        );

        scheduler.map_cycle().await.unwrap();
        let err = scheduler.map_cycle().await.unwrap_err();
        assert!(matches!(err, CycleError::Sink(_)));
        scheduler.map_cycle().await.unwrap();

        let maps = sink.maps.lock().unwrap();
        // The rejected render stands out only by its absence; the merge that
        // preceded it survived, so the next render carries all three points.
        assert_eq!(maps.len(), 2);
        assert_eq!(maps[1].entities[0].path.len(), 3);
    }

    #[test]
    fn test_secs_saturates_instead_of_wrapping() {
        assert_eq!(secs(5), Duration::seconds(5));
        assert_eq!(secs(u64::MAX), Duration::MAX);
    }

    #[tokio::test]
    async fn test_chart_cycle_does_not_retain_history() {
        let t1 = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 1).unwrap();
        let t2 = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 2).unwrap();
        let a = EntityKey::new("lineA");
        let (scheduler, sink) = scheduler(vec![
            Ok(vec![Sample::new(a.clone(), t1, Field::BrakePressure, 80.0)]),
            Ok(vec![Sample::new(a, t2, Field::BrakePressure, 85.0)]),
        ]);

        scheduler.chart_cycle().await.unwrap();
        scheduler.chart_cycle().await.unwrap();

        let charts = sink.charts.lock().unwrap();
        // Each tick plots exactly what its own window returned.
        assert_eq!(charts[0].timestamps, vec![t1]);
        assert_eq!(charts[1].timestamps, vec![t2]);
    }
}
