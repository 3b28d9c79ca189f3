// Telemetry data domain models
use chrono::{DateTime, Utc};

/// The fixed set of telemetry fields the dashboard tracks. String-indexed
/// column access on query results is deliberately avoided; unknown field
/// names from the store are dropped at the adapter boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Lat,
    Lon,
    VehicleSpeed,
    BrakePressure,
}

impl Field {
    pub const ALL: [Field; 4] = [
        Field::Lat,
        Field::Lon,
        Field::VehicleSpeed,
        Field::BrakePressure,
    ];

    /// Field name as it appears in the store (`_field` column).
    pub fn as_str(&self) -> &'static str {
        match self {
            Field::Lat => "lat",
            Field::Lon => "lon",
            Field::VehicleSpeed => "vehicle-speed",
            Field::BrakePressure => "brake-pressure",
        }
    }

    pub fn parse(name: &str) -> Option<Field> {
        match name {
            "lat" => Some(Field::Lat),
            "lon" => Some(Field::Lon),
            "vehicle-speed" => Some(Field::VehicleSpeed),
            "brake-pressure" => Some(Field::BrakePressure),
            _ => None,
        }
    }
}

impl std::fmt::Display for Field {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifies a tracked vehicle: the `line` tag, optionally refined by `run`.
/// Ord gives the lexicographic ordering the reshaper emits entities in.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntityKey {
    pub line: String,
    pub run: Option<String>,
}

impl EntityKey {
    pub fn new(line: impl Into<String>) -> Self {
        Self {
            line: line.into(),
            run: None,
        }
    }

    pub fn with_run(line: impl Into<String>, run: impl Into<String>) -> Self {
        Self {
            line: line.into(),
            run: Some(run.into()),
        }
    }
}

impl std::fmt::Display for EntityKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.run {
            Some(run) => write!(f, "{}/{}", self.line, run),
            None => f.write_str(&self.line),
        }
    }
}

/// One raw measurement as returned by the source adapter.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub entity: EntityKey,
    pub time: DateTime<Utc>,
    pub field: Field,
    pub value: f64,
}

impl Sample {
    pub fn new(entity: EntityKey, time: DateTime<Utc>, field: Field, value: f64) -> Self {
        Self {
            entity,
            time,
            field,
            value,
        }
    }
}

/// One row per (entity, timestamp) after pivoting a batch of samples.
/// A field never reported in-window stays `None`; cross-cycle forward-fill
/// is the aggregator's job, not the reshaper's.
#[derive(Debug, Clone, PartialEq)]
pub struct PivotedRow {
    pub entity: EntityKey,
    pub time: DateTime<Utc>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub vehicle_speed: Option<f64>,
    pub brake_pressure: Option<f64>,
}

impl PivotedRow {
    pub fn new(entity: EntityKey, time: DateTime<Utc>) -> Self {
        Self {
            entity,
            time,
            lat: None,
            lon: None,
            vehicle_speed: None,
            brake_pressure: None,
        }
    }

    pub fn get(&self, field: Field) -> Option<f64> {
        match field {
            Field::Lat => self.lat,
            Field::Lon => self.lon,
            Field::VehicleSpeed => self.vehicle_speed,
            Field::BrakePressure => self.brake_pressure,
        }
    }

    pub fn set(&mut self, field: Field, value: f64) {
        match field {
            Field::Lat => self.lat = Some(value),
            Field::Lon => self.lon = Some(value),
            Field::VehicleSpeed => self.vehicle_speed = Some(value),
            Field::BrakePressure => self.brake_pressure = Some(value),
        }
    }
}
