// Track reshaper - pivot raw samples into one row per (entity, timestamp)
use crate::domain::telemetry::{EntityKey, PivotedRow, Sample};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

/// Group a batch of samples by (entity, timestamp) into pivoted rows.
///
/// Rows come out ascending in time within each entity, and entities in
/// lexicographic order, so downstream color assignment sees a deterministic
/// sequence. A field with no sample at an instant is left unset; cross-cycle
/// forward-fill is applied later by the aggregator. Idempotent: re-pivoting
/// an already one-row-per-instant batch changes nothing.
pub fn reshape(samples: &[Sample]) -> Vec<PivotedRow> {
    let mut rows: BTreeMap<(EntityKey, DateTime<Utc>), PivotedRow> = BTreeMap::new();

    for sample in samples {
        let key = (sample.entity.clone(), sample.time);
        rows.entry(key)
            .or_insert_with(|| PivotedRow::new(sample.entity.clone(), sample.time))
            .set(sample.field, sample.value);
    }

    rows.into_values().collect()
}
