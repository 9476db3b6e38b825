//! Query functions for the air quality store.
//!
//! Statements are rendered to SQL text and run through the narrow
//! [`Database`] trait; spatial values go through `PostGIS`
//! `ST_GeomFromText` expressions.

use air_sync_source_models::{
    BatchRow, Channel, Geolocation, ParameterCatalog, SQL_TIMESTAMP_FMT, SensorKind, sql_quote,
};
use chrono::{DateTime, Utc};

use crate::{Database, DbError};

/// A sensor not yet known to the store, together with everything that gets
/// written on registration.
#[derive(Debug, Clone, PartialEq)]
pub struct NewSensor {
    pub sensor_id: i32,
    pub name: String,
    pub channels: Vec<Channel>,
    pub location: Option<Geolocation>,
}

/// Loads the `parameter name -> id` catalog for one vendor kind.
///
/// # Errors
///
/// Returns [`DbError`] if the query fails or a row is malformed.
pub async fn parameter_catalog_for(
    db: &dyn Database,
    kind: SensorKind,
) -> Result<ParameterCatalog, DbError> {
    let rows = db
        .fetch_all(&format!(
            "SELECT id, param_code FROM measure_param WHERE param_owner = '{}';",
            kind.as_ref()
        ))
        .await?;

    let mut pairs = Vec::with_capacity(rows.len());
    for row in &rows {
        pairs.push((row.to_text("param_code")?, row.to_i32("id")?));
    }

    Ok(ParameterCatalog::from_pairs(pairs))
}

/// Lists every acquisition channel belonging to sensors of one kind.
///
/// # Errors
///
/// Returns [`DbError`] if the query fails or a row is malformed.
pub async fn channels(db: &dyn Database, kind: SensorKind) -> Result<Vec<Channel>, DbError> {
    let rows = db
        .fetch_all(&format!(
            "SELECT c.sensor_id, c.channel_name, c.api_key, c.api_id, c.last_acquisition \
             FROM channel AS c INNER JOIN sensor AS s ON s.id = c.sensor_id \
             WHERE s.sensor_type = '{}' ORDER BY c.sensor_id, c.channel_name;",
            kind.as_ref()
        ))
        .await?;

    rows.iter().map(channel_from_row).collect()
}

/// Re-reads one channel's watermark.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] when the channel does not exist, or
/// [`DbError`] if the query fails.
pub async fn last_acquisition_for(
    db: &dyn Database,
    sensor_id: i32,
    channel_name: &str,
) -> Result<DateTime<Utc>, DbError> {
    let row = db
        .fetch_one(&format!(
            "SELECT last_acquisition FROM channel \
             WHERE sensor_id = {sensor_id} AND channel_name = {};",
            sql_quote(channel_name)
        ))
        .await?;

    row.to_timestamp("last_acquisition")
}

/// Highest packet id currently present in `table`, or 0 when empty.
///
/// # Errors
///
/// Returns [`DbError`] if the query fails.
pub async fn max_packet_id(db: &dyn Database, table: &str) -> Result<i64, DbError> {
    let row = db
        .fetch_one(&format!(
            "SELECT COALESCE(MAX(packet_id), 0) AS packet_id FROM {table};"
        ))
        .await?;

    row.to_i64("packet_id")
}

/// Writes one batch of measurement rows as a single multi-row `INSERT`.
///
/// The column list follows the destination table, not the rows: mobile
/// tables always carry a `geom` column and rows without a fix render
/// `NULL` there, so every tuple of the batch has the same width even when
/// fixed and fixless readings mix.
///
/// # Errors
///
/// Returns [`DbError`] if the write fails.
pub async fn insert_measurements(
    db: &dyn Database,
    table: &str,
    mobile: bool,
    rows: &[BatchRow],
) -> Result<(), DbError> {
    if rows.is_empty() {
        return Ok(());
    }

    let columns = if mobile {
        "(packet_id, sensor_id, parameter_id, value, timestamp, geom)"
    } else {
        "(packet_id, sensor_id, parameter_id, value, timestamp)"
    };
    let values = rows
        .iter()
        .map(|row| row.sql_values(mobile))
        .collect::<Vec<_>>()
        .join(", ");

    db.execute(&format!("INSERT INTO {table} {columns} VALUES {values};"))
        .await
}

/// Advances one channel's watermark after a successful batch write.
///
/// # Errors
///
/// Returns [`DbError`] if the write fails.
pub async fn update_last_acquisition(
    db: &dyn Database,
    sensor_id: i32,
    channel_name: &str,
    timestamp: DateTime<Utc>,
) -> Result<(), DbError> {
    db.execute(&format!(
        "UPDATE channel SET last_acquisition = '{}' \
         WHERE sensor_id = {sensor_id} AND channel_name = {};",
        timestamp.format(SQL_TIMESTAMP_FMT),
        sql_quote(channel_name)
    ))
    .await
}

/// A sensor's currently valid location, as stored.
#[derive(Debug, Clone, PartialEq)]
pub struct SensorLocation {
    pub sensor_id: i32,
    pub name: String,
    pub location: Geolocation,
}

/// Lists the open location row of every sensor of one kind.
///
/// A location row is open while its `valid_to` is null; each sensor has at
/// most one open row at a time.
///
/// # Errors
///
/// Returns [`DbError`] if the query fails or a row is malformed.
pub async fn active_locations(
    db: &dyn Database,
    kind: SensorKind,
) -> Result<Vec<SensorLocation>, DbError> {
    let rows = db
        .fetch_all(&format!(
            "SELECT s.id, s.sensor_name, ST_X(l.geom) AS longitude, ST_Y(l.geom) AS latitude \
             FROM sensor_at_location AS l INNER JOIN sensor AS s ON s.id = l.sensor_id \
             WHERE s.sensor_type = '{}' AND l.valid_to IS NULL;",
            kind.as_ref()
        ))
        .await?;

    rows.iter()
        .map(|row| {
            Ok(SensorLocation {
                sensor_id: row.to_i32("id")?,
                name: row.to_text("sensor_name")?,
                location: Geolocation {
                    latitude: row.to_f64("latitude")?,
                    longitude: row.to_f64("longitude")?,
                },
            })
        })
        .collect()
}

/// Closes a sensor's open location row and opens a new one, in a single
/// round trip.
///
/// # Errors
///
/// Returns [`DbError`] if the write fails.
pub async fn update_sensor_location(
    db: &dyn Database,
    sensor_id: i32,
    location: &Geolocation,
    changed_at: DateTime<Utc>,
) -> Result<(), DbError> {
    let timestamp = changed_at.format(SQL_TIMESTAMP_FMT);
    db.execute(&format!(
        "UPDATE sensor_at_location SET valid_to = '{timestamp}' \
         WHERE sensor_id = {sensor_id} AND valid_to IS NULL;\
         INSERT INTO sensor_at_location (sensor_id, valid_from, geom) \
         VALUES ({sensor_id}, '{timestamp}', {});",
        location.geometry_expr()
    ))
    .await
}

/// Names of sensors of one kind already registered, used to skip duplicates.
///
/// # Errors
///
/// Returns [`DbError`] if the query fails or a row is malformed.
pub async fn existing_sensor_names(
    db: &dyn Database,
    kind: SensorKind,
) -> Result<Vec<String>, DbError> {
    let rows = db
        .fetch_all(&format!(
            "SELECT sensor_name FROM sensor WHERE sensor_type = '{}';",
            kind.as_ref()
        ))
        .await?;

    rows.iter().map(|row| row.to_text("sensor_name")).collect()
}

/// First free sensor id.
///
/// # Errors
///
/// Returns [`DbError`] if the query fails.
pub async fn next_sensor_id(db: &dyn Database) -> Result<i32, DbError> {
    let row = db
        .fetch_one("SELECT COALESCE(MAX(id), 0) AS id FROM sensor;")
        .await?;

    Ok(row.to_i32("id")? + 1)
}

/// Registers a batch of new sensors in one round trip: sensor rows, their
/// acquisition channels, and a location row per sensor that reported one.
///
/// # Errors
///
/// Returns [`DbError`] if the write fails.
pub async fn insert_sensors(
    db: &dyn Database,
    kind: SensorKind,
    sensors: &[NewSensor],
    registered_at: DateTime<Utc>,
) -> Result<(), DbError> {
    if sensors.is_empty() {
        return Ok(());
    }

    let mut sensor_values = Vec::with_capacity(sensors.len());
    let mut channel_values = Vec::new();
    let mut location_values = Vec::new();
    for sensor in sensors {
        sensor_values.push(format!(
            "({}, '{}', {})",
            sensor.sensor_id,
            kind.as_ref(),
            sql_quote(&sensor.name)
        ));
        for channel in &sensor.channels {
            channel_values.push(format!(
                "({}, {}, {}, {}, '{}')",
                channel.sensor_id,
                sql_quote(&channel.channel_name),
                sql_quote(&channel.api_key),
                sql_quote(&channel.api_id),
                channel.last_acquisition.format(SQL_TIMESTAMP_FMT)
            ));
        }
        if let Some(location) = &sensor.location {
            location_values.push(format!(
                "({}, '{}', {})",
                sensor.sensor_id,
                registered_at.format(SQL_TIMESTAMP_FMT),
                location.geometry_expr()
            ));
        }
    }

    let mut statement = format!(
        "INSERT INTO sensor (id, sensor_type, sensor_name) VALUES {};",
        sensor_values.join(", ")
    );
    if !channel_values.is_empty() {
        statement.push_str(&format!(
            "INSERT INTO channel (sensor_id, channel_name, api_key, api_id, last_acquisition) VALUES {};",
            channel_values.join(", ")
        ));
    }
    if !location_values.is_empty() {
        statement.push_str(&format!(
            "INSERT INTO sensor_at_location (sensor_id, valid_from, geom) VALUES {};",
            location_values.join(", ")
        ));
    }

    db.execute(&statement).await
}

fn channel_from_row(row: &crate::Row) -> Result<Channel, DbError> {
    Ok(Channel {
        sensor_id: row.to_i32("sensor_id")?,
        channel_name: row.to_text("channel_name")?,
        api_key: row.to_text("api_key")?,
        api_id: row.to_text("api_id")?,
        last_acquisition: row.to_timestamp("last_acquisition")?,
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use chrono::NaiveDateTime;

    use crate::{Row, SqlValue};

    use super::*;

    fn ts(s: &str) -> DateTime<Utc> {
        NaiveDateTime::parse_from_str(s, SQL_TIMESTAMP_FMT)
            .unwrap()
            .and_utc()
    }

    /// Records every statement and replays canned rows.
    #[derive(Default)]
    struct FakeDatabase {
        statements: Mutex<Vec<String>>,
        rows: Vec<Row>,
    }

    impl FakeDatabase {
        fn with_rows(rows: Vec<Row>) -> Self {
            Self {
                statements: Mutex::new(Vec::new()),
                rows,
            }
        }

        fn statements(&self) -> Vec<String> {
            self.statements.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Database for FakeDatabase {
        async fn execute(&self, statement: &str) -> Result<(), DbError> {
            self.statements.lock().unwrap().push(statement.to_string());
            Ok(())
        }

        async fn fetch_all(&self, query: &str) -> Result<Vec<Row>, DbError> {
            self.statements.lock().unwrap().push(query.to_string());
            Ok(self.rows.clone())
        }

        async fn fetch_one(&self, query: &str) -> Result<Row, DbError> {
            self.statements.lock().unwrap().push(query.to_string());
            self.rows.first().cloned().ok_or(DbError::NotFound)
        }
    }

    #[tokio::test]
    async fn parameter_catalog_maps_codes_to_ids() {
        let db = FakeDatabase::with_rows(vec![
            Row::new(vec![
                ("id".to_string(), SqlValue::Int(1)),
                ("param_code".to_string(), SqlValue::Text("voc".to_string())),
            ]),
            Row::new(vec![
                ("id".to_string(), SqlValue::Int(2)),
                ("param_code".to_string(), SqlValue::Text("pm1".to_string())),
            ]),
        ]);

        let catalog = parameter_catalog_for(&db, SensorKind::Atmotube)
            .await
            .unwrap();

        assert_eq!(catalog.id_of("voc"), Some(1));
        assert_eq!(catalog.id_of("pm1"), Some(2));
        assert_eq!(
            db.statements(),
            vec![
                "SELECT id, param_code FROM measure_param WHERE param_owner = 'atmotube';"
                    .to_string()
            ]
        );
    }

    #[tokio::test]
    async fn channels_builds_typed_rows() {
        let db = FakeDatabase::with_rows(vec![Row::new(vec![
            ("sensor_id".to_string(), SqlValue::Int(12)),
            (
                "channel_name".to_string(),
                SqlValue::Text("main".to_string()),
            ),
            ("api_key".to_string(), SqlValue::Text("key".to_string())),
            ("api_id".to_string(), SqlValue::Text("AB:CD".to_string())),
            (
                "last_acquisition".to_string(),
                SqlValue::Timestamp(ts("2021-10-11 09:44:00")),
            ),
        ])]);

        let listed = channels(&db, SensorKind::Atmotube).await.unwrap();

        assert_eq!(
            listed,
            vec![Channel {
                sensor_id: 12,
                channel_name: "main".to_string(),
                api_key: "key".to_string(),
                api_id: "AB:CD".to_string(),
                last_acquisition: ts("2021-10-11 09:44:00"),
            }]
        );
    }

    #[tokio::test]
    async fn last_acquisition_reads_one_watermark() {
        let db = FakeDatabase::with_rows(vec![Row::new(vec![(
            "last_acquisition".to_string(),
            SqlValue::Timestamp(ts("2021-10-11 09:44:00")),
        )])]);

        let watermark = last_acquisition_for(&db, 12, "1A").await.unwrap();

        assert_eq!(watermark, ts("2021-10-11 09:44:00"));
        assert_eq!(
            db.statements(),
            vec![
                "SELECT last_acquisition FROM channel \
                 WHERE sensor_id = 12 AND channel_name = '1A';"
                    .to_string()
            ]
        );
    }

    #[tokio::test]
    async fn last_acquisition_surfaces_missing_channel() {
        let db = FakeDatabase::default();

        assert!(matches!(
            last_acquisition_for(&db, 12, "1A").await,
            Err(DbError::NotFound)
        ));
    }

    #[tokio::test]
    async fn max_packet_id_reads_coalesced_maximum() {
        let db = FakeDatabase::with_rows(vec![Row::new(vec![(
            "packet_id".to_string(),
            SqlValue::Int(140),
        )])]);

        assert_eq!(max_packet_id(&db, "mobile_measurement").await.unwrap(), 140);
        assert_eq!(
            db.statements(),
            vec![
                "SELECT COALESCE(MAX(packet_id), 0) AS packet_id FROM mobile_measurement;"
                    .to_string()
            ]
        );
    }

    #[tokio::test]
    async fn insert_measurements_renders_station_batch() {
        let db = FakeDatabase::default();
        let rows = vec![
            BatchRow {
                packet_id: 140,
                sensor_id: 3,
                parameter_id: 1,
                value: Some("0.7".to_string()),
                timestamp: ts("2021-10-11 09:45:00"),
                geometry: None,
            },
            BatchRow {
                packet_id: 141,
                sensor_id: 3,
                parameter_id: 2,
                value: None,
                timestamp: ts("2021-10-11 09:45:00"),
                geometry: None,
            },
        ];

        insert_measurements(&db, "station_measurement", false, &rows)
            .await
            .unwrap();

        assert_eq!(
            db.statements(),
            vec![
                "INSERT INTO station_measurement \
                 (packet_id, sensor_id, parameter_id, value, timestamp) VALUES \
                 (140, 3, 1, '0.7', '2021-10-11 09:45:00'), \
                 (141, 3, 2, NULL, '2021-10-11 09:45:00');"
                    .to_string()
            ]
        );
    }

    #[tokio::test]
    async fn insert_measurements_includes_geometry_column_for_mobile_rows() {
        let db = FakeDatabase::default();
        let rows = vec![BatchRow {
            packet_id: 7,
            sensor_id: 12,
            parameter_id: 4,
            value: Some("21.0".to_string()),
            timestamp: ts("2021-10-11 09:45:00"),
            geometry: Some("ST_GeomFromText('POINT(-71.05 42.36)', 26918)".to_string()),
        }];

        insert_measurements(&db, "mobile_measurement", true, &rows)
            .await
            .unwrap();

        let statements = db.statements();
        assert_eq!(statements.len(), 1);
        assert!(
            statements[0]
                .starts_with("INSERT INTO mobile_measurement (packet_id, sensor_id, parameter_id, value, timestamp, geom) VALUES")
        );
        assert!(statements[0].contains("ST_GeomFromText('POINT(-71.05 42.36)', 26918)"));
    }

    #[tokio::test]
    async fn mobile_batch_mixing_fixed_and_fixless_rows_keeps_one_tuple_width() {
        let db = FakeDatabase::default();
        let rows = vec![
            BatchRow {
                packet_id: 7,
                sensor_id: 12,
                parameter_id: 4,
                value: Some("21.0".to_string()),
                timestamp: ts("2021-10-11 09:45:00"),
                geometry: None,
            },
            BatchRow {
                packet_id: 8,
                sensor_id: 12,
                parameter_id: 4,
                value: Some("21.5".to_string()),
                timestamp: ts("2021-10-11 09:46:00"),
                geometry: Some("ST_GeomFromText('POINT(-71.05 42.36)', 26918)".to_string()),
            },
        ];

        insert_measurements(&db, "mobile_measurement", true, &rows)
            .await
            .unwrap();

        assert_eq!(
            db.statements(),
            vec![
                "INSERT INTO mobile_measurement \
                 (packet_id, sensor_id, parameter_id, value, timestamp, geom) VALUES \
                 (7, 12, 4, '21.0', '2021-10-11 09:45:00', NULL), \
                 (8, 12, 4, '21.5', '2021-10-11 09:46:00', \
                 ST_GeomFromText('POINT(-71.05 42.36)', 26918));"
                    .to_string()
            ]
        );
    }

    #[tokio::test]
    async fn insert_measurements_skips_empty_batch() {
        let db = FakeDatabase::default();

        insert_measurements(&db, "station_measurement", false, &[])
            .await
            .unwrap();

        assert!(db.statements().is_empty());
    }

    #[tokio::test]
    async fn update_last_acquisition_targets_one_channel() {
        let db = FakeDatabase::default();

        update_last_acquisition(&db, 12, "1A", ts("2021-10-11 09:46:00"))
            .await
            .unwrap();

        assert_eq!(
            db.statements(),
            vec![
                "UPDATE channel SET last_acquisition = '2021-10-11 09:46:00' \
                 WHERE sensor_id = 12 AND channel_name = '1A';"
                    .to_string()
            ]
        );
    }

    #[tokio::test]
    async fn active_locations_builds_typed_rows() {
        let db = FakeDatabase::with_rows(vec![Row::new(vec![
            ("id".to_string(), SqlValue::Int(12)),
            (
                "sensor_name".to_string(),
                SqlValue::Text("n1 (1)".to_string()),
            ),
            ("longitude".to_string(), SqlValue::Real(9.44)),
            ("latitude".to_string(), SqlValue::Real(45.99)),
        ])]);

        let locations = active_locations(&db, SensorKind::Purpleair).await.unwrap();

        assert_eq!(
            locations,
            vec![SensorLocation {
                sensor_id: 12,
                name: "n1 (1)".to_string(),
                location: Geolocation {
                    latitude: 45.99,
                    longitude: 9.44,
                },
            }]
        );
        let statements = db.statements();
        assert_eq!(statements.len(), 1);
        assert!(statements[0].contains("l.valid_to IS NULL"));
        assert!(statements[0].contains("sensor_type = 'purpleair'"));
    }

    #[tokio::test]
    async fn update_sensor_location_closes_old_row_and_opens_new_one() {
        let db = FakeDatabase::default();
        let moved_to = Geolocation {
            latitude: 78.9999,
            longitude: 13.2222,
        };

        update_sensor_location(&db, 12, &moved_to, ts("2022-01-22 10:37:00"))
            .await
            .unwrap();

        assert_eq!(
            db.statements(),
            vec![
                "UPDATE sensor_at_location SET valid_to = '2022-01-22 10:37:00' \
                 WHERE sensor_id = 12 AND valid_to IS NULL;\
                 INSERT INTO sensor_at_location (sensor_id, valid_from, geom) \
                 VALUES (12, '2022-01-22 10:37:00', \
                 ST_GeomFromText('POINT(13.2222 78.9999)', 26918));"
                    .to_string()
            ]
        );
    }

    #[tokio::test]
    async fn next_sensor_id_is_max_plus_one() {
        let db = FakeDatabase::with_rows(vec![Row::new(vec![(
            "id".to_string(),
            SqlValue::Int(41),
        )])]);

        assert_eq!(next_sensor_id(&db).await.unwrap(), 42);
    }

    #[tokio::test]
    async fn insert_sensors_writes_sensor_channel_and_location_rows() {
        let db = FakeDatabase::default();
        let registered_at = ts("2021-10-11 09:44:00");
        let sensors = vec![NewSensor {
            sensor_id: 42,
            name: "n. 13 (7345)".to_string(),
            channels: vec![Channel {
                sensor_id: 42,
                channel_name: "1A".to_string(),
                api_key: "key-a".to_string(),
                api_id: "111".to_string(),
                last_acquisition: registered_at,
            }],
            location: Some(Geolocation {
                latitude: 42.36,
                longitude: -71.05,
            }),
        }];

        insert_sensors(&db, SensorKind::Purpleair, &sensors, registered_at)
            .await
            .unwrap();

        let statements = db.statements();
        assert_eq!(statements.len(), 1);
        assert!(statements[0].contains(
            "INSERT INTO sensor (id, sensor_type, sensor_name) VALUES \
             (42, 'purpleair', 'n. 13 (7345)');"
        ));
        assert!(statements[0].contains(
            "INSERT INTO channel (sensor_id, channel_name, api_key, api_id, last_acquisition) \
             VALUES (42, '1A', 'key-a', '111', '2021-10-11 09:44:00');"
        ));
        assert!(statements[0].contains(
            "INSERT INTO sensor_at_location (sensor_id, valid_from, geom) VALUES \
             (42, '2021-10-11 09:44:00', ST_GeomFromText('POINT(-71.05 42.36)', 26918));"
        ));
    }

    #[tokio::test]
    async fn insert_sensors_skips_empty_batch() {
        let db = FakeDatabase::default();

        insert_sensors(&db, SensorKind::Purpleair, &[], ts("2021-10-11 09:44:00"))
            .await
            .unwrap();

        assert!(db.statements().is_empty());
    }
}
