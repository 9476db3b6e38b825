//! Surrogate id assignment and batch row building.

use air_sync_source_models::{BatchRow, NormalizedRecord, ParameterCatalog};

/// Expands filtered records into insert-ready [`BatchRow`]s.
///
/// One row per `(record, known parameter)` pair, in record-then-parameter
/// order. Packet ids are assigned contiguously from `start_packet_id` and
/// never reused — a collision would corrupt foreign-key references in the
/// destination schema. Parameter names missing from the catalog are
/// dropped silently (vendors add fields without notice); `None` values are
/// preserved as `NULL`, not coerced to zero.
#[must_use]
pub fn build_rows(
    records: &[NormalizedRecord],
    catalog: &ParameterCatalog,
    start_packet_id: i64,
    sensor_id: i32,
) -> Vec<BatchRow> {
    let mut packet_id = start_packet_id;
    let mut rows = Vec::new();

    for record in records {
        let geometry = record.geolocation.map(|point| point.geometry_expr());
        for (name, value) in &record.parameters {
            let Some(parameter_id) = catalog.id_of(name) else {
                continue;
            };
            rows.push(BatchRow {
                packet_id,
                sensor_id,
                parameter_id,
                value: value.clone(),
                timestamp: record.timestamp,
                geometry: geometry.clone(),
            });
            packet_id += 1;
        }
    }

    rows
}
