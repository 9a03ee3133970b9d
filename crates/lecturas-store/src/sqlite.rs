//! SQLite reading store.

use std::path::Path;

use async_trait::async_trait;
use rusqlite::{Connection, params};
use time::OffsetDateTime;
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

use lecturas_types::{NormalizedRow, PersistedReading};

use crate::error::{Error, Result};
use crate::queries::ReadingQuery;
use crate::schema;
use crate::traits::ReadingStore;

const CREATE_STAGING: &str = r#"
DROP TABLE IF EXISTS temp.temp_lecturas;
CREATE TEMP TABLE temp_lecturas (
    id_lectura TEXT PRIMARY KEY,
    device_id TEXT,
    temperatura REAL,
    humedad REAL,
    distancia_cm REAL,
    luz_porcentaje INTEGER,
    estado_luz TEXT,
    timestamp_lectura_unix INTEGER
);
"#;

const INSERT_STAGING: &str = "INSERT OR IGNORE INTO temp_lecturas (
        id_lectura, device_id, temperatura, humedad, distancia_cm,
        luz_porcentaje, estado_luz, timestamp_lectura_unix
    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)";

const MOVE_NEW: &str = "INSERT OR IGNORE INTO lecturas_sensores (
        id_lectura, device_id, temperatura, humedad, distancia_cm,
        luz_porcentaje, estado_luz, timestamp_lectura
    )
    SELECT id_lectura, device_id, ROUND(temperatura, 2), ROUND(humedad, 2),
           ROUND(distancia_cm, 3), luz_porcentaje, estado_luz, timestamp_lectura_unix
    FROM temp_lecturas";

/// SQLite-backed [`ReadingStore`].
///
/// The connection sits behind an async mutex so merges and reads never
/// interleave.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create a database at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent).map_err(|e| Error::CreateDirectory {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        info!("Opening database at {}", path.display());
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;",
        )?;
        schema::initialize(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open the default database location.
    pub fn open_default() -> Result<Self> {
        Self::open(crate::default_db_path())
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        schema::initialize(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

fn merge_in_transaction(conn: &mut Connection, rows: &[NormalizedRow]) -> Result<u64> {
    // Dropping the transaction without commit rolls back, staging table included.
    let tx = conn.transaction()?;
    tx.execute_batch(CREATE_STAGING)?;
    {
        let mut stmt = tx.prepare(INSERT_STAGING)?;
        for row in rows {
            stmt.execute(params![
                row.reading_id,
                row.device_id,
                row.temperature,
                row.humidity,
                row.distance_cm,
                row.light_pct,
                row.light_state,
                row.timestamp,
            ])?;
        }
    }
    let inserted = tx.execute(MOVE_NEW, [])?;
    tx.execute_batch("DROP TABLE temp.temp_lecturas")?;
    tx.commit()?;
    Ok(inserted as u64)
}

struct RawRow {
    id: String,
    device_id: Option<String>,
    temperature: Option<f64>,
    humidity: Option<f64>,
    distance_cm: Option<f64>,
    light_pct: Option<i32>,
    light_state: Option<String>,
    timestamp: i64,
}

impl RawRow {
    fn into_reading(self) -> Result<PersistedReading> {
        let reading_id = Uuid::parse_str(&self.id).map_err(|_| Error::InvalidReadingId(self.id))?;
        let recorded_at = OffsetDateTime::from_unix_timestamp(self.timestamp)
            .map_err(|_| Error::InvalidTimestamp(self.timestamp))?;

        Ok(PersistedReading {
            reading_id,
            device_id: self.device_id,
            temperature: self.temperature.unwrap_or_default(),
            humidity: self.humidity.unwrap_or_default(),
            distance_cm: self.distance_cm.unwrap_or_default(),
            light_pct: self.light_pct.unwrap_or_default(),
            light_state: self.light_state,
            recorded_at,
        })
    }
}

#[async_trait]
impl ReadingStore for SqliteStore {
    fn backend(&self) -> &'static str {
        "sqlite"
    }

    async fn merge(&self, rows: &[NormalizedRow]) -> Result<u64> {
        let mut conn = self.conn.lock().await;
        let inserted = merge_in_transaction(&mut conn, rows)?;
        debug!("Merged {} staged rows, {} new", rows.len(), inserted);
        Ok(inserted)
    }

    async fn query_readings(&self, query: &ReadingQuery) -> Result<Vec<PersistedReading>> {
        // Bound parameters are not `Send`; build them only once the lock is held.
        let conn = self.conn.lock().await;

        let sql = query.build_sql();
        let (_, params) = query.build_where();
        debug!("Executing query: {}", sql);

        let params_ref: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_ref.as_slice(), |row| {
                Ok(RawRow {
                    id: row.get(0)?,
                    device_id: row.get(1)?,
                    temperature: row.get(2)?,
                    humidity: row.get(3)?,
                    distance_cm: row.get(4)?,
                    light_pct: row.get(5)?,
                    light_state: row.get(6)?,
                    timestamp: row.get(7)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        rows.into_iter().map(RawRow::into_reading).collect()
    }

    async fn count_readings(&self) -> Result<u64> {
        let conn = self.conn.lock().await;
        let count: i64 =
            conn.query_row("SELECT COUNT(*) FROM lecturas_sensores", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    const ID_1: &str = "6f1c2b1e-3d4a-4b5c-8d9e-0f1a2b3c4d5e";
    const ID_2: &str = "0b7e7c6a-1f2d-4e3c-9a8b-7c6d5e4f3a2b";
    const ID_3: &str = "9d2f4a10-5b6c-4d7e-8f90-a1b2c3d4e5f6";

    fn row(id: &str, timestamp: i64) -> NormalizedRow {
        NormalizedRow {
            reading_id: id.to_string(),
            device_id: Some("esp32-01".to_string()),
            temperature: 22.5,
            humidity: 55.0,
            distance_cm: 10.0,
            light_pct: 80,
            light_state: Some("on".to_string()),
            timestamp,
        }
    }

    #[tokio::test]
    async fn test_merge_inserts_new_rows() {
        let store = SqliteStore::open_in_memory().unwrap();
        let inserted = store
            .merge(&[row(ID_1, 1_700_000_000), row(ID_2, 1_700_000_060)])
            .await
            .unwrap();

        assert_eq!(inserted, 2);
        assert_eq!(store.count_readings().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_merge_is_idempotent() {
        let store = SqliteStore::open_in_memory().unwrap();
        let rows = [row(ID_1, 1_700_000_000), row(ID_2, 1_700_000_060)];

        assert_eq!(store.merge(&rows).await.unwrap(), 2);
        assert_eq!(store.merge(&rows).await.unwrap(), 0);
        assert_eq!(store.count_readings().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_duplicates_in_batch_count_once() {
        let store = SqliteStore::open_in_memory().unwrap();
        let rows = [
            row(ID_1, 1_700_000_000),
            row(ID_1, 1_700_000_000),
            row(ID_2, 1_700_000_060),
        ];

        assert_eq!(store.merge(&rows).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_existing_rows_never_updated() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.merge(&[row(ID_1, 1_700_000_000)]).await.unwrap();

        let mut changed = row(ID_1, 1_700_000_000);
        changed.temperature = 99.0;
        assert_eq!(store.merge(&[changed, row(ID_2, 1)]).await.unwrap(), 1);

        let all = store.all_readings().await.unwrap();
        let first = all.iter().find(|r| r.reading_id.to_string() == ID_1).unwrap();
        assert_eq!(first.temperature, 22.5);
    }

    #[tokio::test]
    async fn test_empty_merge() {
        let store = SqliteStore::open_in_memory().unwrap();
        assert_eq!(store.merge(&[]).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_values_rounded_to_column_scale() {
        let store = SqliteStore::open_in_memory().unwrap();
        let mut r = row(ID_1, 1_700_000_000);
        r.temperature = 22.456;
        r.humidity = 55.004;
        r.distance_cm = 12.34567;
        store.merge(&[r]).await.unwrap();

        let reading = &store.all_readings().await.unwrap()[0];
        assert_eq!(reading.temperature, 22.46);
        assert_eq!(reading.humidity, 55.0);
        assert_eq!(reading.distance_cm, 12.346);
        assert_eq!(reading.recorded_at, datetime!(2023-11-14 22:13:20 UTC));
    }

    #[tokio::test]
    async fn test_failed_merge_leaves_nothing() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.merge(&[row(ID_1, 1_700_000_000)]).await.unwrap();

        {
            let conn = store.conn.lock().await;
            conn.execute_batch(
                "CREATE TRIGGER reject_id3 BEFORE INSERT ON lecturas_sensores
                 WHEN NEW.id_lectura = '9d2f4a10-5b6c-4d7e-8f90-a1b2c3d4e5f6'
                 BEGIN SELECT RAISE(ABORT, 'rejected'); END;",
            )
            .unwrap();
        }

        let result = store
            .merge(&[row(ID_2, 1_700_000_060), row(ID_3, 1_700_000_120)])
            .await;
        assert!(matches!(result, Err(Error::Sqlite(_))));
        assert_eq!(store.count_readings().await.unwrap(), 1);

        // The staging table from the failed attempt must not linger.
        {
            let conn = store.conn.lock().await;
            conn.execute_batch("DROP TRIGGER reject_id3").unwrap();
        }
        assert_eq!(
            store
                .merge(&[row(ID_2, 1_700_000_060), row(ID_3, 1_700_000_120)])
                .await
                .unwrap(),
            2
        );
    }

    #[tokio::test]
    async fn test_query_orders_oldest_first() {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .merge(&[
                row(ID_1, 1_700_000_300),
                row(ID_2, 1_700_000_100),
                row(ID_3, 1_700_000_200),
            ])
            .await
            .unwrap();

        let all = store.all_readings().await.unwrap();
        let times: Vec<i64> = all.iter().map(|r| r.unix_timestamp()).collect();
        assert_eq!(times, vec![1_700_000_100, 1_700_000_200, 1_700_000_300]);

        let newest = store
            .query_readings(&ReadingQuery::new().newest_first().limit(1))
            .await
            .unwrap();
        assert_eq!(newest[0].unix_timestamp(), 1_700_000_300);
    }

    #[tokio::test]
    async fn test_query_filters() {
        let store = SqliteStore::open_in_memory().unwrap();
        let mut other = row(ID_3, 1_700_000_200);
        other.device_id = Some("esp32-02".to_string());
        store
            .merge(&[row(ID_1, 1_700_000_000), row(ID_2, 1_700_000_100), other])
            .await
            .unwrap();

        let device = store
            .query_readings(&ReadingQuery::new().device("esp32-02"))
            .await
            .unwrap();
        assert_eq!(device.len(), 1);

        let since = OffsetDateTime::from_unix_timestamp(1_700_000_100).unwrap();
        let recent = store
            .query_readings(&ReadingQuery::new().since(since))
            .await
            .unwrap();
        assert_eq!(recent.len(), 2);

        let page = store
            .query_readings(&ReadingQuery::new().limit(1).offset(1))
            .await
            .unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].unix_timestamp(), 1_700_000_100);
    }

    #[tokio::test]
    async fn test_query_from_spawned_task() {
        let store = std::sync::Arc::new(SqliteStore::open_in_memory().unwrap());
        store.merge(&[row(ID_1, 1_700_000_000)]).await.unwrap();

        let query = ReadingQuery::new()
            .device("esp32-01")
            .since(OffsetDateTime::from_unix_timestamp(1_699_999_999).unwrap());
        let task_store = std::sync::Arc::clone(&store);
        let readings = tokio::spawn(async move { task_store.query_readings(&query).await })
            .await
            .unwrap()
            .unwrap();

        assert_eq!(readings.len(), 1);
    }

    #[test]
    fn test_open_creates_parent_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("lecturas.db");

        let store = SqliteStore::open(&path).unwrap();
        drop(store);

        assert!(path.exists());
        SqliteStore::open(&path).unwrap();
    }
}
