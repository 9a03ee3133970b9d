//! PostgreSQL reading store.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions, PgRow};
use sqlx::{PgPool, Postgres, QueryBuilder, Row, Transaction};
use tracing::{debug, info, warn};

use lecturas_types::{NormalizedRow, PersistedReading};

use crate::error::{Error, Result};
use crate::queries::ReadingQuery;
use crate::schema;
use crate::traits::ReadingStore;

/// Rows per staging INSERT; keeps each statement well under the
/// 65535 bind-parameter limit (8 parameters per row).
const STAGING_CHUNK: usize = 1000;

const CREATE_STAGING: &str = r#"
CREATE TEMPORARY TABLE IF NOT EXISTS temp_lecturas (
    id_lectura VARCHAR(255) PRIMARY KEY,
    device_id VARCHAR(50),
    temperatura NUMERIC(5, 2),
    humedad NUMERIC(5, 2),
    distancia_cm NUMERIC(10, 3),
    luz_porcentaje INTEGER,
    estado_luz VARCHAR(20),
    timestamp_lectura_unix BIGINT
) ON COMMIT DROP
"#;

const MOVE_NEW: &str = r#"
INSERT INTO lecturas_sensores (
    id_lectura, device_id, temperatura, humedad, distancia_cm,
    luz_porcentaje, estado_luz, timestamp_lectura
)
SELECT id_lectura::uuid, device_id, temperatura, humedad, distancia_cm,
       luz_porcentaje, estado_luz, to_timestamp(timestamp_lectura_unix)
FROM temp_lecturas
ON CONFLICT (id_lectura) DO NOTHING
"#;

/// Connection settings for [`PgStore`].
#[derive(Debug, Clone)]
pub struct PgStoreConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    pub password: String,
    /// Pool size.
    pub max_connections: u32,
    /// How long to wait for a pooled connection.
    pub connect_timeout: Duration,
    /// Upper bound for read queries.
    pub query_timeout: Duration,
}

impl Default for PgStoreConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            database: String::new(),
            user: String::new(),
            password: String::new(),
            max_connections: 5,
            connect_timeout: Duration::from_secs(10),
            query_timeout: Duration::from_secs(10),
        }
    }
}

/// PostgreSQL-backed [`ReadingStore`].
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
    query_timeout: Duration,
}

impl PgStore {
    /// Connect a pool and make sure the permanent table exists.
    #[tracing::instrument(level = "debug", skip(cfg), fields(host = %cfg.host, database = %cfg.database))]
    pub async fn connect(cfg: &PgStoreConfig) -> Result<Self> {
        let options = PgConnectOptions::new()
            .host(&cfg.host)
            .port(cfg.port)
            .database(&cfg.database)
            .username(&cfg.user)
            .password(&cfg.password);

        let pool = PgPoolOptions::new()
            .max_connections(cfg.max_connections)
            .acquire_timeout(cfg.connect_timeout)
            .connect_with(options)
            .await?;

        info!(
            "Connected to PostgreSQL at {}:{}/{}",
            cfg.host, cfg.port, cfg.database
        );
        Self::from_pool(pool, cfg.query_timeout).await
    }

    /// Wrap an existing pool and make sure the permanent table exists.
    pub async fn from_pool(pool: PgPool, query_timeout: Duration) -> Result<Self> {
        schema::initialize_pg(&pool).await?;
        Ok(Self {
            pool,
            query_timeout,
        })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn bounded<T, F>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = std::result::Result<T, sqlx::Error>>,
    {
        tokio::time::timeout(self.query_timeout, fut)
            .await
            .map_err(|_| Error::Timeout(self.query_timeout))?
            .map_err(Error::from)
    }

    fn reading_from_row(row: &PgRow) -> Result<PersistedReading> {
        Ok(PersistedReading {
            reading_id: row.try_get("id_lectura")?,
            device_id: row.try_get("device_id")?,
            temperature: row.try_get::<Option<f64>, _>("temperatura")?.unwrap_or_default(),
            humidity: row.try_get::<Option<f64>, _>("humedad")?.unwrap_or_default(),
            distance_cm: row.try_get::<Option<f64>, _>("distancia_cm")?.unwrap_or_default(),
            light_pct: row.try_get::<Option<i32>, _>("luz_porcentaje")?.unwrap_or_default(),
            light_state: row.try_get("estado_luz")?,
            recorded_at: row.try_get("timestamp_lectura")?,
        })
    }
}

async fn stage_and_move(tx: &mut Transaction<'_, Postgres>, rows: &[NormalizedRow]) -> Result<u64> {
    sqlx::query(CREATE_STAGING).execute(&mut **tx).await?;

    for chunk in rows.chunks(STAGING_CHUNK) {
        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(
            "INSERT INTO temp_lecturas (id_lectura, device_id, temperatura, humedad, \
             distancia_cm, luz_porcentaje, estado_luz, timestamp_lectura_unix) ",
        );
        qb.push_values(chunk, |mut b, row| {
            b.push_bind(&row.reading_id)
                .push_bind(&row.device_id)
                .push_bind(row.temperature)
                .push_bind(row.humidity)
                .push_bind(row.distance_cm)
                .push_bind(row.light_pct)
                .push_bind(&row.light_state)
                .push_bind(row.timestamp);
        });
        qb.push(" ON CONFLICT (id_lectura) DO NOTHING");
        qb.build().execute(&mut **tx).await?;
    }

    let moved = sqlx::query(MOVE_NEW).execute(&mut **tx).await?;
    Ok(moved.rows_affected())
}

#[async_trait]
impl ReadingStore for PgStore {
    fn backend(&self) -> &'static str {
        "postgres"
    }

    async fn merge(&self, rows: &[NormalizedRow]) -> Result<u64> {
        if rows.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;
        match stage_and_move(&mut tx, rows).await {
            Ok(inserted) => {
                tx.commit().await?;
                debug!("Merged {} staged rows, {} new", rows.len(), inserted);
                Ok(inserted)
            }
            Err(e) => {
                if let Err(rollback) = tx.rollback().await {
                    warn!("Rollback after failed merge also failed: {}", rollback);
                }
                Err(e)
            }
        }
    }

    async fn query_readings(&self, query: &ReadingQuery) -> Result<Vec<PersistedReading>> {
        let mut qb = query.build_pg();
        debug!("Executing query: {}", qb.sql());
        let rows = self.bounded(qb.build().fetch_all(&self.pool)).await?;
        rows.iter().map(Self::reading_from_row).collect()
    }

    async fn count_readings(&self) -> Result<u64> {
        let count: i64 = self
            .bounded(
                sqlx::query_scalar("SELECT COUNT(*) FROM lecturas_sensores").fetch_one(&self.pool),
            )
            .await?;
        Ok(count as u64)
    }
}
