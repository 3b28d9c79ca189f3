// Entity track aggregator - cross-cycle merge of pivoted rows
use crate::domain::telemetry::{EntityKey, PivotedRow};
use crate::domain::track::{EntityTrack, TrackPoint, DEFAULT_PALETTE};
use chrono::{DateTime, Duration, Utc};
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

/// Retention limits for the track store: positions per track are capped,
/// and entities that stop reporting can optionally be evicted, so memory
/// cannot grow without bound over a long-running process.
#[derive(Debug, Clone)]
pub struct RetentionPolicy {
    /// Oldest positions are dropped once a track exceeds this many points.
    pub max_positions: usize,
    /// Evict an entity once its newest sample falls this far behind the
    /// newest sample seen anywhere in the store. `None` keeps tracks forever.
    pub stale_after: Option<Duration>,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            max_positions: 1024,
            stale_after: None,
        }
    }
}

/// Holds every entity's track across poll cycles. Exactly one instance per
/// process; both view cycles reach it through a mutex so merges serialize.
pub struct TrackAggregator {
    tracks: BTreeMap<EntityKey, EntityTrack>,
    palette: Vec<String>,
    /// Count of entities ever seen. Never decremented, so a color is
    /// assigned exactly once per entity and survives evictions of others.
    seen_count: usize,
    retention: RetentionPolicy,
    /// Newest sample timestamp observed across all entities.
    newest: Option<DateTime<Utc>>,
}

impl TrackAggregator {
    pub fn new(palette: Vec<String>, retention: RetentionPolicy) -> Self {
        let palette = if palette.is_empty() {
            DEFAULT_PALETTE.iter().map(|c| c.to_string()).collect()
        } else {
            palette
        };
        Self {
            tracks: BTreeMap::new(),
            palette,
            seen_count: 0,
            retention,
            newest: None,
        }
    }

    pub fn tracks(&self) -> &BTreeMap<EntityKey, EntityTrack> {
        &self.tracks
    }

    /// Merge one cycle's pivoted rows into the retained tracks.
    ///
    /// Entities absent from the batch keep their prior state untouched; a
    /// field absent from a row keeps its last known value (forward-fill,
    /// never back to unknown). Out-of-order and duplicate timestamps are
    /// tolerated: positions stay time-ordered and deduplicated.
    pub fn merge(&mut self, rows: &[PivotedRow]) {
        for row in rows {
            self.merge_row(row);
        }
        self.evict_stale();
    }

    fn merge_row(&mut self, row: &PivotedRow) {
        let track = match self.tracks.entry(row.entity.clone()) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                let color = self.palette[self.seen_count % self.palette.len()].clone();
                self.seen_count += 1;
                tracing::debug!("new entity {} assigned color {}", row.entity, color);
                entry.insert(EntityTrack::new(color, row.time))
            }
        };

        match (row.lat, row.lon) {
            (Some(lat), Some(lon)) => {
                Self::insert_position(track, TrackPoint::new(row.time, lat, lon));
                if track.positions.len() > self.retention.max_positions {
                    let excess = track.positions.len() - self.retention.max_positions;
                    track.positions.drain(..excess);
                }
            }
            (None, None) => {}
            _ => {
                // Half a coordinate is unusable for the map; drop the
                // position but keep the row's other fields.
                tracing::warn!(
                    "malformed row for {} at {}: lat/lon incomplete, position dropped",
                    row.entity,
                    row.time
                );
            }
        }

        if let Some(speed) = row.vehicle_speed {
            track.last_speed = Some(speed);
        }
        if let Some(pressure) = row.brake_pressure {
            track.last_brake_pressure = Some(pressure);
        }
        if row.time > track.last_seen {
            track.last_seen = row.time;
        }
        if self.newest.is_none_or(|n| row.time > n) {
            self.newest = Some(row.time);
        }
    }

    /// Keep `positions` non-decreasing in time; skip timestamps already
    /// present.
    fn insert_position(track: &mut EntityTrack, point: TrackPoint) {
        match track
            .positions
            .binary_search_by(|p| p.time.cmp(&point.time))
        {
            Ok(_) => {}
            Err(idx) => track.positions.insert(idx, point),
        }
    }

    fn evict_stale(&mut self) {
        let Some(stale_after) = self.retention.stale_after else {
            return;
        };
        let Some(newest) = self.newest else {
            return;
        };
        let cutoff = newest - stale_after;
        self.tracks.retain(|entity, track| {
            let keep = track.last_seen >= cutoff;
            if !keep {
                tracing::info!("evicting stale entity {} (last seen {})", entity, track.last_seen);
            }
            keep
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap() + chrono::Duration::seconds(secs.into())
    }

    fn row(line: &str, secs: u32) -> PivotedRow {
        PivotedRow::new(EntityKey::new(line), at(secs))
    }

    fn position_row(line: &str, secs: u32, lat: f64, lon: f64) -> PivotedRow {
        let mut r = row(line, secs);
        r.lat = Some(lat);
        r.lon = Some(lon);
        r
    }

    fn aggregator() -> TrackAggregator {
        TrackAggregator::new(Vec::new(), RetentionPolicy::default())
    }

    #[test]
    fn test_mixed_field_batch_builds_one_position_and_speed() {
        let mut agg = aggregator();
        let mut r = position_row("lineA", 1, 52.0, -1.0);
        r.vehicle_speed = Some(30.0);
        agg.merge(&[r]);

        let track = &agg.tracks()[&EntityKey::new("lineA")];
        assert_eq!(track.positions.len(), 1);
        assert_eq!(track.positions[0], TrackPoint::new(at(1), 52.0, -1.0));
        assert_eq!(track.last_speed, Some(30.0));
    }

    #[test]
    fn test_forward_fill_across_cycles() {
        let mut agg = aggregator();
        let mut cycle1 = row("lineA", 1);
        cycle1.vehicle_speed = Some(30.0);
        agg.merge(&[cycle1]);

        // Cycle 2: lineA reports a position but no speed sample.
        agg.merge(&[position_row("lineA", 2, 52.0, -1.0)]);

        let track = &agg.tracks()[&EntityKey::new("lineA")];
        assert_eq!(track.last_speed, Some(30.0));
    }

    #[test]
    fn test_absent_entity_left_untouched() {
        let mut agg = aggregator();
        let mut a = position_row("lineA", 1, 52.0, -1.0);
        a.vehicle_speed = Some(30.0);
        agg.merge(&[a]);
        let before = agg.tracks()[&EntityKey::new("lineA")].clone();

        // Batches mentioning only other entities, then an empty one.
        agg.merge(&[position_row("lineB", 2, 51.0, -2.0)]);
        agg.merge(&[]);

        let after = &agg.tracks()[&EntityKey::new("lineA")];
        assert_eq!(after.positions, before.positions);
        assert_eq!(after.last_speed, before.last_speed);
        assert_eq!(after.last_brake_pressure, before.last_brake_pressure);
    }

    #[test]
    fn test_color_from_first_seen_order_mod_palette() {
        let palette = vec!["c0".to_string(), "c1".to_string()];
        let mut agg = TrackAggregator::new(palette, RetentionPolicy::default());
        agg.merge(&[
            position_row("lineA", 1, 52.0, -1.0),
            position_row("lineB", 1, 51.0, -2.0),
            position_row("lineC", 1, 50.0, -3.0),
        ]);

        assert_eq!(agg.tracks()[&EntityKey::new("lineA")].color, "c0");
        assert_eq!(agg.tracks()[&EntityKey::new("lineB")].color, "c1");
        assert_eq!(agg.tracks()[&EntityKey::new("lineC")].color, "c0");
    }

    #[test]
    fn test_color_stable_across_cycles() {
        let mut agg = aggregator();
        agg.merge(&[position_row("lineB", 1, 51.0, -2.0)]);
        let color = agg.tracks()[&EntityKey::new("lineB")].color.clone();

        // A lexicographically-earlier entity appearing later must not shift
        // lineB's color.
        for cycle in 2..10 {
            agg.merge(&[
                position_row("lineA", cycle, 52.0, -1.0),
                position_row("lineB", cycle, 51.0, -2.0),
            ]);
        }
        assert_eq!(agg.tracks()[&EntityKey::new("lineB")].color, color);
    }

    #[test]
    fn test_positions_ordered_under_out_of_order_batches() {
        let mut agg = aggregator();
        agg.merge(&[position_row("lineA", 5, 52.5, -1.5)]);
        agg.merge(&[
            position_row("lineA", 3, 52.3, -1.3),
            position_row("lineA", 7, 52.7, -1.7),
        ]);

        let times: Vec<_> = agg.tracks()[&EntityKey::new("lineA")]
            .positions
            .iter()
            .map(|p| p.time)
            .collect();
        assert_eq!(times, vec![at(3), at(5), at(7)]);
    }

    #[test]
    fn test_duplicate_timestamp_not_appended_twice() {
        let mut agg = aggregator();
        agg.merge(&[position_row("lineA", 1, 52.0, -1.0)]);
        agg.merge(&[position_row("lineA", 1, 52.0, -1.0)]);
        assert_eq!(agg.tracks()[&EntityKey::new("lineA")].positions.len(), 1);
    }

    #[test]
    fn test_half_coordinate_drops_position_keeps_fields() {
        let mut agg = aggregator();
        let mut r = row("lineA", 1);
        r.lat = Some(52.0);
        r.vehicle_speed = Some(30.0);
        agg.merge(&[r]);

        let track = &agg.tracks()[&EntityKey::new("lineA")];
        assert!(track.positions.is_empty());
        assert_eq!(track.last_speed, Some(30.0));
    }

    #[test]
    fn test_position_cap_drops_oldest() {
        let retention = RetentionPolicy {
            max_positions: 3,
            stale_after: None,
        };
        let mut agg = TrackAggregator::new(Vec::new(), retention);
        for secs in 1..=5 {
            agg.merge(&[position_row("lineA", secs, 52.0, -1.0)]);
        }
        let times: Vec<_> = agg.tracks()[&EntityKey::new("lineA")]
            .positions
            .iter()
            .map(|p| p.time)
            .collect();
        assert_eq!(times, vec![at(3), at(4), at(5)]);
    }

    #[test]
    fn test_stale_entity_evicted_and_color_slot_not_reused() {
        let palette = vec!["c0".to_string(), "c1".to_string(), "c2".to_string()];
        let retention = RetentionPolicy {
            max_positions: 1024,
            stale_after: Some(Duration::seconds(10)),
        };
        let mut agg = TrackAggregator::new(palette, retention);
        agg.merge(&[position_row("lineA", 1, 52.0, -1.0)]);
        agg.merge(&[position_row("lineB", 30, 51.0, -2.0)]);

        assert!(!agg.tracks().contains_key(&EntityKey::new("lineA")));
        // The first-seen counter keeps counting past evicted entities.
        agg.merge(&[position_row("lineC", 31, 50.0, -3.0)]);
        assert_eq!(agg.tracks()[&EntityKey::new("lineC")].color, "c2");
    }

    #[test]
    fn test_no_eviction_by_default() {
        let mut agg = aggregator();
        agg.merge(&[position_row("lineA", 1, 52.0, -1.0)]);
        agg.merge(&[position_row("lineB", 3600, 51.0, -2.0)]);
        assert!(agg.tracks().contains_key(&EntityKey::new("lineA")));
    }
}
