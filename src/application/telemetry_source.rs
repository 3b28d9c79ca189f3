// Source adapter seam - the time-series store behind a query contract
use crate::domain::telemetry::{Field, Sample};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use thiserror::Error;

/// Time window of a query: trailing duration or a fixed range.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TimeWindow {
    Last(Duration),
    Range {
        start: DateTime<Utc>,
        stop: DateTime<Utc>,
    },
}

/// Gap-filling applied by the store inside the aggregation windows.
/// Only carry-forward is supported; no interpolation, no zero-fill.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillPolicy {
    UsePrevious,
}

/// Whether the query wants only the last aggregated sample per entity or the
/// full in-window series.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryMode {
    Snapshot,
    Trajectory,
}

/// A windowed, aggregated, forward-filled query against the store.
#[derive(Debug, Clone, PartialEq)]
pub struct QuerySpec {
    pub window: TimeWindow,
    pub measurements: Vec<String>,
    pub fields: Vec<Field>,
    /// Aggregation tick, e.g. one second.
    pub every: Duration,
    pub fill: FillPolicy,
    pub mode: QueryMode,
    /// Restrict to a single line (used by the chart view).
    pub line: Option<String>,
}

impl QuerySpec {
    /// Shape (a): last-known position and speed across all entities.
    pub fn position_snapshot(window: Duration, every: Duration, measurements: Vec<String>) -> Self {
        Self {
            window: TimeWindow::Last(window),
            measurements,
            fields: vec![Field::Lat, Field::Lon, Field::VehicleSpeed],
            every,
            fill: FillPolicy::UsePrevious,
            mode: QueryMode::Snapshot,
            line: None,
        }
    }

    /// Shape (b): full in-window speed + brake-pressure series for one line.
    pub fn line_series(
        window: Duration,
        every: Duration,
        measurements: Vec<String>,
        line: String,
    ) -> Self {
        Self {
            window: TimeWindow::Last(window),
            measurements,
            fields: vec![Field::VehicleSpeed, Field::BrakePressure],
            every,
            fill: FillPolicy::UsePrevious,
            mode: QueryMode::Trajectory,
            line: Some(line),
        }
    }
}

/// Failure reaching or being refused by the store. An empty result is not an
/// error; it comes back as `Ok(vec![])`.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("telemetry store unreachable: {0}")]
    Unavailable(#[from] reqwest::Error),

    #[error("telemetry store refused query (HTTP {status}): {body}")]
    Refused { status: u16, body: String },
}

/// The black-box data source. No retry logic here; a failed fetch is retried
/// only by the next scheduled tick.
#[async_trait]
pub trait TelemetrySource: Send + Sync {
    /// Execute one windowed query and return samples ordered by entity, then
    /// ascending time.
    async fn fetch_window(&self, spec: &QuerySpec) -> Result<Vec<Sample>, SourceError>;
}
