// Per-entity track state owned by the aggregator
use crate::domain::telemetry::Field;
use chrono::{DateTime, Utc};

/// Default palette, cycled in first-seen order. CSS color strings so the
/// sink can pass them straight through to whatever draws them.
pub const DEFAULT_PALETTE: [&str; 8] = [
    "#e6194b", "#3cb44b", "#4363d8", "#f58231", "#911eb4", "#46f0f0", "#f032e6", "#9a6324",
];

/// A timestamped position on a track's path.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackPoint {
    pub time: DateTime<Utc>,
    pub lat: f64,
    pub lon: f64,
}

impl TrackPoint {
    pub fn new(time: DateTime<Utc>, lat: f64, lon: f64) -> Self {
        Self { time, lat, lon }
    }
}

/// The retained state for one tracked vehicle.
///
/// `positions` is kept non-decreasing in time and deduplicated by timestamp.
/// `last_speed` / `last_brake_pressure` carry the most recent observed value
/// forward across cycles; once set they are never cleared (forward-fill,
/// never back-fill).
#[derive(Debug, Clone)]
pub struct EntityTrack {
    pub color: String,
    pub positions: Vec<TrackPoint>,
    pub last_speed: Option<f64>,
    pub last_brake_pressure: Option<f64>,
    /// Newest sample timestamp seen for this entity, positional or not.
    pub last_seen: DateTime<Utc>,
}

impl EntityTrack {
    pub fn new(color: String, first_seen: DateTime<Utc>) -> Self {
        Self {
            color,
            positions: Vec::new(),
            last_speed: None,
            last_brake_pressure: None,
            last_seen: first_seen,
        }
    }

    pub fn last_position(&self) -> Option<TrackPoint> {
        self.positions.last().copied()
    }

    pub fn last_known(&self, field: Field) -> Option<f64> {
        match field {
            Field::Lat => self.last_position().map(|p| p.lat),
            Field::Lon => self.last_position().map(|p| p.lon),
            Field::VehicleSpeed => self.last_speed,
            Field::BrakePressure => self.last_brake_pressure,
        }
    }
}
