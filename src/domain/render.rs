// Render model domain types - sink-agnostic description of what to draw
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Map viewport used only on first load; later renders must not touch the
/// sink's view transform (user pan/zoom wins).
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Viewport {
    pub center_lat: f64,
    pub center_lon: f64,
    pub zoom: f64,
}

/// One point of a rendered path, in draw order.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PathPoint {
    pub time: DateTime<Utc>,
    pub lat: f64,
    pub lon: f64,
}

/// Current-position marker for one entity.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Marker {
    pub lat: f64,
    pub lon: f64,
    /// Drawn next to the marker (the entity id).
    pub label: String,
    /// Hover text: entity id plus last known speed.
    pub tooltip: String,
}

/// Path + marker + label for one entity on the map. No legend entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MapEntity {
    pub id: String,
    pub color: String,
    pub path: Vec<PathPoint>,
    pub marker: Option<Marker>,
}

/// The map layer for one refresh cycle. Entities are in a stable
/// (lexicographic by id) order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MapModel {
    pub entities: Vec<MapEntity>,
}

/// One numeric series of the chart layer. `values` is index-aligned with the
/// shared timestamp axis of the owning `ChartModel`; a `None` means the
/// series had not yet reported by that instant.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartSeries {
    pub name: String,
    pub unit: String,
    pub color: String,
    /// Plot against the secondary y axis (independent scale).
    pub secondary_axis: bool,
    pub values: Vec<Option<f64>>,
}

/// The chart layer for one refresh cycle: two series on one time axis.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartModel {
    pub timestamps: Vec<DateTime<Utc>>,
    pub series: Vec<ChartSeries>,
}

impl ChartModel {
    pub fn empty() -> Self {
        Self {
            timestamps: Vec::new(),
            series: Vec::new(),
        }
    }
}
