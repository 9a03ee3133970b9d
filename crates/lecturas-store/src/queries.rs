//! Query builder for persisted readings.
//!
//! ```
//! use lecturas_store::ReadingQuery;
//! use time::{Duration, OffsetDateTime};
//!
//! let now = OffsetDateTime::now_utc();
//!
//! // Last day of one device, oldest first
//! let query = ReadingQuery::new()
//!     .device("esp32-01")
//!     .since(now - Duration::days(1));
//!
//! // Second page of 50, newest first
//! let page = ReadingQuery::new().newest_first().limit(50).offset(50);
//! ```

use sqlx::{Postgres, QueryBuilder};
use time::OffsetDateTime;

const COLUMNS_SQLITE: &str = "id_lectura, device_id, temperatura, humedad, distancia_cm, \
                              luz_porcentaje, estado_luz, timestamp_lectura";

const COLUMNS_PG: &str = "id_lectura, device_id, temperatura::float8 AS temperatura, \
                          humedad::float8 AS humedad, distancia_cm::float8 AS distancia_cm, \
                          luz_porcentaje, estado_luz, timestamp_lectura";

/// Filters and paging for [`ReadingStore::query_readings`](crate::ReadingStore::query_readings).
///
/// Defaults to every reading ordered by reading time ascending, with the
/// reading id as tie-breaker.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ReadingQuery {
    /// Filter by device id.
    pub device_id: Option<String>,
    /// Readings taken at or after this time.
    pub since: Option<OffsetDateTime>,
    /// Readings taken at or before this time.
    pub until: Option<OffsetDateTime>,
    /// Maximum number of results.
    pub limit: Option<u32>,
    /// Results to skip.
    pub offset: Option<u32>,
    /// Order by reading time descending instead.
    pub newest_first: bool,
}

impl ReadingQuery {
    /// All readings, oldest first.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn device(mut self, device_id: &str) -> Self {
        self.device_id = Some(device_id.to_string());
        self
    }

    pub fn since(mut self, time: OffsetDateTime) -> Self {
        self.since = Some(time);
        self
    }

    pub fn until(mut self, time: OffsetDateTime) -> Self {
        self.until = Some(time);
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u32) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Order by reading time descending.
    pub fn newest_first(mut self) -> Self {
        self.newest_first = true;
        self
    }

    fn order(&self) -> &'static str {
        if self.newest_first { "DESC" } else { "ASC" }
    }

    /// WHERE clause and parameters for the SQLite backend.
    pub(crate) fn build_where(&self) -> (String, Vec<Box<dyn rusqlite::ToSql>>) {
        let mut conditions = Vec::new();
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(ref device_id) = self.device_id {
            conditions.push("device_id = ?");
            params.push(Box::new(device_id.clone()));
        }
        if let Some(since) = self.since {
            conditions.push("timestamp_lectura >= ?");
            params.push(Box::new(since.unix_timestamp()));
        }
        if let Some(until) = self.until {
            conditions.push("timestamp_lectura <= ?");
            params.push(Box::new(until.unix_timestamp()));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        (where_clause, params)
    }

    /// Full SELECT for the SQLite backend.
    pub(crate) fn build_sql(&self) -> String {
        let (where_clause, _) = self.build_where();
        let order = self.order();

        let mut sql = format!(
            "SELECT {COLUMNS_SQLITE} FROM lecturas_sensores {where_clause} \
             ORDER BY timestamp_lectura {order}, id_lectura {order}"
        );

        // SQLite only accepts OFFSET after a LIMIT; -1 means unbounded.
        match (self.limit, self.offset) {
            (Some(limit), Some(offset)) => sql.push_str(&format!(" LIMIT {limit} OFFSET {offset}")),
            (Some(limit), None) => sql.push_str(&format!(" LIMIT {limit}")),
            (None, Some(offset)) => sql.push_str(&format!(" LIMIT -1 OFFSET {offset}")),
            (None, None) => {}
        }

        sql
    }

    /// Full SELECT for the PostgreSQL backend, with bound parameters.
    pub(crate) fn build_pg(&self) -> QueryBuilder<'static, Postgres> {
        let mut qb: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("SELECT {COLUMNS_PG} FROM lecturas_sensores"));

        let mut keyword = " WHERE ";
        if let Some(ref device_id) = self.device_id {
            qb.push(keyword).push("device_id = ").push_bind(device_id.clone());
            keyword = " AND ";
        }
        if let Some(since) = self.since {
            qb.push(keyword).push("timestamp_lectura >= ").push_bind(since);
            keyword = " AND ";
        }
        if let Some(until) = self.until {
            qb.push(keyword).push("timestamp_lectura <= ").push_bind(until);
        }

        let order = self.order();
        qb.push(format!(
            " ORDER BY timestamp_lectura {order}, id_lectura {order}"
        ));
        if let Some(limit) = self.limit {
            qb.push(" LIMIT ").push_bind(i64::from(limit));
        }
        if let Some(offset) = self.offset {
            qb.push(" OFFSET ").push_bind(i64::from(offset));
        }

        qb
    }
}
