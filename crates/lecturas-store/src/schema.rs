//! Database schema and migrations.

use rusqlite::Connection;
use sqlx::PgPool;
use tracing::debug;

use crate::error::Result;

/// Current SQLite schema version.
pub const SCHEMA_VERSION: i32 = 1;

/// Permanent table on PostgreSQL. Decimal scales match what the dashboard shows.
const PG_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS lecturas_sensores (
    id_lectura UUID PRIMARY KEY,
    device_id VARCHAR(50),
    temperatura NUMERIC(5, 2),
    humedad NUMERIC(5, 2),
    distancia_cm NUMERIC(10, 3),
    luz_porcentaje INTEGER,
    estado_luz VARCHAR(20),
    timestamp_lectura TIMESTAMPTZ NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_lecturas_sensores_timestamp
    ON lecturas_sensores (timestamp_lectura);
"#;

/// Create the permanent table on PostgreSQL if it does not exist.
pub async fn initialize_pg(pool: &PgPool) -> Result<()> {
    sqlx::raw_sql(PG_SCHEMA).execute(pool).await?;
    debug!("PostgreSQL schema ready");
    Ok(())
}

/// Initialize the SQLite schema.
pub fn initialize(conn: &Connection) -> Result<()> {
    let version = get_schema_version(conn)?;

    if version == 0 {
        create_schema_v1(conn)?;
        set_schema_version(conn, SCHEMA_VERSION)?;
    } else if version < SCHEMA_VERSION {
        set_schema_version(conn, SCHEMA_VERSION)?;
    }

    Ok(())
}

fn get_schema_version(conn: &Connection) -> Result<i32> {
    let exists: bool = conn.query_row(
        "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name='schema_version'",
        [],
        |row| row.get(0),
    )?;

    if !exists {
        return Ok(0);
    }

    let version: i32 =
        conn.query_row("SELECT version FROM schema_version", [], |row| row.get(0))?;

    Ok(version)
}

fn set_schema_version(conn: &Connection, version: i32) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO schema_version (id, version) VALUES (1, ?)",
        [version],
    )?;
    Ok(())
}

/// Version 1: the permanent readings table, timestamps as Unix seconds.
fn create_schema_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            version INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS lecturas_sensores (
            id_lectura TEXT PRIMARY KEY,
            device_id TEXT,
            temperatura REAL,
            humedad REAL,
            distancia_cm REAL,
            luz_porcentaje INTEGER,
            estado_luz TEXT,
            timestamp_lectura INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_lecturas_sensores_timestamp
            ON lecturas_sensores (timestamp_lectura);
        "#,
    )?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initialize_fresh_database() {
        let conn = Connection::open_in_memory().unwrap();
        initialize(&conn).unwrap();

        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<std::result::Result<Vec<_>, _>>()
            .unwrap();

        assert!(tables.contains(&"lecturas_sensores".to_string()));
        assert!(tables.contains(&"schema_version".to_string()));
    }

    #[test]
    fn test_initialize_is_repeatable() {
        let conn = Connection::open_in_memory().unwrap();
        assert_eq!(get_schema_version(&conn).unwrap(), 0);

        initialize(&conn).unwrap();
        initialize(&conn).unwrap();
        assert_eq!(get_schema_version(&conn).unwrap(), SCHEMA_VERSION);
    }
}
