use rusqlite::{params, Connection, OptionalExtension};
use sbloopy_core::errors::{ErrorInfo, SbError};
use sbloopy_core::{ExperimentRow, Setup};
use serde::{Deserialize, Serialize};

pub const SCHEMA_VERSION: i64 = 1;

pub(crate) fn sql_error(code: &str, err: rusqlite::Error) -> SbError {
    SbError::Store(ErrorInfo::new(code, err.to_string()))
}

/// One experiment row as persisted in the pool, screening and training tables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRow {
    pub signature: String,
    pub n_stimuli: i64,
    pub n_inhibitors: i64,
    pub row: ExperimentRow,
}

impl StoredRow {
    pub fn encode(setup: &Setup, row: &ExperimentRow) -> Self {
        let clamping = row.clamping(setup);
        Self {
            signature: clamping.key(setup).as_str().to_string(),
            n_stimuli: clamping.active_stimuli(setup) as i64,
            n_inhibitors: clamping.active_inhibitors(setup) as i64,
            row: row.clone(),
        }
    }
}

/// Train/test error of one iteration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IterationSummary {
    pub iteration: i64,
    pub train_mse: Option<f64>,
    pub test_mse: Option<f64>,
}

/// Learning statistics of one iteration that went on to design.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BehaviorStats {
    pub iteration: i64,
    pub fit: f64,
    pub size: i64,
    pub networks: i64,
    pub behaviors: i64,
}

pub fn init_schema(conn: &Connection) -> Result<(), SbError> {
    conn.execute_batch(
        "BEGIN;
        CREATE TABLE IF NOT EXISTS meta(version INTEGER NOT NULL);
        CREATE TABLE IF NOT EXISTS pool(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            idmodel INTEGER NOT NULL,
            signature TEXT NOT NULL,
            n_stimuli INTEGER NOT NULL,
            n_inhibitors INTEGER NOT NULL,
            row TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS pool_signature ON pool(idmodel, signature);
        CREATE TABLE IF NOT EXISTS screening(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            idmodel INTEGER NOT NULL,
            signature TEXT NOT NULL,
            n_stimuli INTEGER NOT NULL,
            n_inhibitors INTEGER NOT NULL,
            row TEXT NOT NULL
        );
        CREATE TABLE IF NOT EXISTS benchmark_iterations(
            idmodel INTEGER PRIMARY KEY,
            it INTEGER NOT NULL
        );
        CREATE TABLE IF NOT EXISTS benchmark_data(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            idmodel INTEGER NOT NULL,
            signature TEXT NOT NULL,
            n_stimuli INTEGER NOT NULL,
            n_inhibitors INTEGER NOT NULL,
            row TEXT NOT NULL,
            it INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS benchmark_data_signature ON benchmark_data(idmodel, signature);
        CREATE TABLE IF NOT EXISTS benchmark_mse(
            idmodel INTEGER NOT NULL,
            it INTEGER NOT NULL,
            train_mse REAL,
            test_mse REAL
        );
        CREATE TABLE IF NOT EXISTS benchmark_behaviors(
            idmodel INTEGER NOT NULL,
            it INTEGER NOT NULL,
            fit REAL NOT NULL,
            size INTEGER NOT NULL,
            networks INTEGER NOT NULL,
            behaviors INTEGER NOT NULL
        );
        CREATE TABLE IF NOT EXISTS benchmark_outcomes(
            idmodel INTEGER PRIMARY KEY,
            it INTEGER NOT NULL,
            reason TEXT NOT NULL,
            detail TEXT NOT NULL
        );
        COMMIT;",
    )
    .map_err(|err| sql_error("store.schema", err))?;
    set_version(conn, SCHEMA_VERSION)?;
    Ok(())
}

fn set_version(conn: &Connection, version: i64) -> Result<(), SbError> {
    let existing: Option<i64> = conn
        .query_row("SELECT version FROM meta LIMIT 1", [], |row| row.get(0))
        .optional()
        .map_err(|err| sql_error("store.schema", err))?;
    match existing {
        Some(current) if current == version => Ok(()),
        Some(current) => Err(SbError::Store(
            ErrorInfo::new(
                "store.schema_version",
                format!("store schema {current} incompatible with expected {version}"),
            )
            .with_hint("point the store at a fresh database file"),
        )),
        None => {
            conn.execute("INSERT INTO meta(version) VALUES (?)", params![version])
                .map_err(|err| sql_error("store.schema", err))?;
            Ok(())
        }
    }
}

/// Inserts rows into `pool` or `screening`.
pub(crate) fn insert_rows(
    conn: &Connection,
    table: &str,
    idmodel: i64,
    rows: &[StoredRow],
) -> Result<usize, SbError> {
    let sql = format!(
        "INSERT INTO {table}(idmodel, signature, n_stimuli, n_inhibitors, row) VALUES (?, ?, ?, ?, ?)"
    );
    let mut stmt = conn
        .prepare(&sql)
        .map_err(|err| sql_error("store.insert", err))?;
    for stored in rows {
        let json = serde_json::to_string(&stored.row)
            .map_err(|err| SbError::Serde(ErrorInfo::new("json_serialize", err.to_string())))?;
        stmt.execute(params![
            idmodel,
            stored.signature,
            stored.n_stimuli,
            stored.n_inhibitors,
            json
        ])
        .map_err(|err| sql_error("store.insert", err))?;
    }
    Ok(rows.len())
}

/// Loads the stored rows of a table matching `clause`, in insertion order.
///
/// `clause` is appended after `WHERE idmodel = ?1`; `extra` binds `?2`.
pub(crate) fn load_rows(
    conn: &Connection,
    table: &str,
    idmodel: i64,
    clause: &str,
    extra: Option<i64>,
) -> Result<Vec<StoredRow>, SbError> {
    let sql = format!(
        "SELECT signature, n_stimuli, n_inhibitors, row FROM {table} WHERE idmodel = ?1 {clause} ORDER BY id"
    );
    let mut stmt = conn
        .prepare(&sql)
        .map_err(|err| sql_error("store.query", err))?;
    let decode = |row: &rusqlite::Row<'_>| -> rusqlite::Result<(String, i64, i64, String)> {
        Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
    };
    let raw = match extra {
        Some(bound) => stmt.query_map(params![idmodel, bound], decode),
        None => stmt.query_map(params![idmodel], decode),
    }
    .map_err(|err| sql_error("store.query", err))?
    .collect::<Result<Vec<_>, _>>()
    .map_err(|err| sql_error("store.query", err))?;

    raw.into_iter()
        .map(|(signature, n_stimuli, n_inhibitors, json)| -> Result<StoredRow, SbError> {
            let row = serde_json::from_str(&json).map_err(|err| {
                SbError::Serde(
                    ErrorInfo::new("json_deserialize", err.to_string())
                        .with_context("table", table)
                        .with_context("signature", signature.clone()),
                )
            })?;
            Ok(StoredRow {
                signature,
                n_stimuli,
                n_inhibitors,
                row,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        init_schema(&conn).unwrap();
        let versions: i64 = conn
            .query_row("SELECT COUNT(*) FROM meta", [], |row| row.get(0))
            .unwrap();
        assert_eq!(versions, 1);
    }

    #[test]
    fn version_mismatch_is_rejected() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        conn.execute("UPDATE meta SET version = 99", []).unwrap();
        let err = init_schema(&conn).unwrap_err();
        assert_eq!(err.code(), "store.schema_version");
    }

    #[test]
    fn stored_rows_carry_active_counts() {
        let setup = Setup::new(["a", "b"], ["c"], ["x"]);
        let row = ExperimentRow::at(1)
            .with_stimulus("a", true)
            .with_stimulus("b", true)
            .with_inhibitor("c", true);
        let stored = StoredRow::encode(&setup, &row);
        assert_eq!(stored.n_stimuli, 2);
        assert_eq!(stored.n_inhibitors, 1);
        assert_eq!(stored.signature, "a=1,b=1,ci=1");
    }
}
