// Render model builder - pure snapshot-to-view transformation, no I/O
use crate::domain::render::{ChartModel, ChartSeries, MapEntity, MapModel, Marker, PathPoint};
use crate::domain::telemetry::{EntityKey, PivotedRow};
use crate::domain::track::EntityTrack;
use std::collections::BTreeMap;

/// Fixed display colors of the two chart series.
pub const BRAKE_SERIES_COLOR: &str = "firebrick";
pub const SPEED_SERIES_COLOR: &str = "green";

/// Build the map layer from the aggregator's current tracks.
///
/// One path + marker per entity, in the store's stable lexicographic order,
/// drawn in the entity's assigned color. Entities with no position yet get an
/// empty path and no marker.
pub fn build_map_model(tracks: &BTreeMap<EntityKey, EntityTrack>) -> MapModel {
    let entities = tracks
        .iter()
        .map(|(entity, track)| {
            let path = track
                .positions
                .iter()
                .map(|p| PathPoint {
                    time: p.time,
                    lat: p.lat,
                    lon: p.lon,
                })
                .collect();

            let marker = track.last_position().map(|p| Marker {
                lat: p.lat,
                lon: p.lon,
                label: entity.to_string(),
                tooltip: match track.last_speed {
                    Some(speed) => format!("{}: {:.1} km/h", entity, speed),
                    None => format!("{}: speed n/a", entity),
                },
            });

            MapEntity {
                id: entity.to_string(),
                color: track.color.clone(),
                path,
                marker,
            }
        })
        .collect();

    MapModel { entities }
}

/// Build the chart layer from one cycle's pivoted rows for the fixed entity.
///
/// Both series share the row timestamp axis. A timestamp where one series
/// has no value reuses that series' previous value (forward-fill); only
/// timestamps before a series' first observation stay empty. Nothing is
/// retained across cycles; the query window is the whole history shown.
pub fn build_chart_model(rows: &[PivotedRow]) -> ChartModel {
    if rows.is_empty() {
        return ChartModel::empty();
    }

    let mut timestamps = Vec::with_capacity(rows.len());
    let mut brake = Vec::with_capacity(rows.len());
    let mut speed = Vec::with_capacity(rows.len());
    let mut last_brake = None;
    let mut last_speed = None;

    for row in rows {
        timestamps.push(row.time);
        if row.brake_pressure.is_some() {
            last_brake = row.brake_pressure;
        }
        if row.vehicle_speed.is_some() {
            last_speed = row.vehicle_speed;
        }
        brake.push(last_brake);
        speed.push(last_speed);
    }

    ChartModel {
        timestamps,
        series: vec![
            ChartSeries {
                name: "bp".to_string(),
                unit: "psi".to_string(),
                color: BRAKE_SERIES_COLOR.to_string(),
                secondary_axis: false,
                values: brake,
            },
            ChartSeries {
                name: "vs".to_string(),
                unit: "km/h".to_string(),
                color: SPEED_SERIES_COLOR.to_string(),
                secondary_axis: true,
                values: speed,
            },
        ],
    }
}
