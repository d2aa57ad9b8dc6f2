//! Per-model experiment bookkeeping backed by SQLite.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use rusqlite::{params, Connection, OptionalExtension};
use sbloopy_core::errors::{ErrorInfo, SbError, DEDUP_INCONSISTENCY};
use sbloopy_core::{
    Clamping, ClampingKey, Dataset, ExperimentRow, Intent, Setup, Termination, Tolerance,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::filter::{is_trivial, PoolFilter, SeedPolicy};
use crate::schema::{
    init_schema, insert_rows, load_rows, sql_error, BehaviorStats, IterationSummary, StoredRow,
};

/// Termination persisted for a model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutcomeRecord {
    pub iteration: i64,
    pub termination: Termination,
}

/// Candidate pool, training history and iteration bookkeeping of every model.
///
/// The pool of a model is its full candidate set and doubles as the held-out
/// test data; it is never modified by the loop. Training experiments are
/// copies of pool rows tagged with the iteration that performed them.
#[derive(Debug)]
pub struct ExperimentStore {
    conn: Connection,
    setup: Arc<Setup>,
    seed_policy: SeedPolicy,
}

impl ExperimentStore {
    /// Opens (creating if needed) the store at `path`.
    pub fn open(path: impl AsRef<Path>, setup: Arc<Setup>) -> Result<Self, SbError> {
        let path = path.as_ref();
        let conn = Connection::open(path).map_err(|err| {
            SbError::Store(
                ErrorInfo::new("store.open", err.to_string())
                    .with_context("path", path.display().to_string()),
            )
        })?;
        Self::from_connection(conn, setup)
    }

    /// Opens a private in-memory store.
    pub fn open_in_memory(setup: Arc<Setup>) -> Result<Self, SbError> {
        let conn = Connection::open_in_memory().map_err(|err| sql_error("store.open", err))?;
        Self::from_connection(conn, setup)
    }

    fn from_connection(conn: Connection, setup: Arc<Setup>) -> Result<Self, SbError> {
        init_schema(&conn)?;
        Ok(Self {
            conn,
            setup,
            seed_policy: SeedPolicy::default(),
        })
    }

    pub fn with_seed_policy(mut self, policy: SeedPolicy) -> Self {
        self.seed_policy = policy;
        self
    }

    pub fn seed_policy(&self) -> SeedPolicy {
        self.seed_policy
    }

    pub fn setup(&self) -> &Arc<Setup> {
        &self.setup
    }

    /// Adds candidate experiments to the model's pool.
    pub fn insert_pool_rows(&mut self, idmodel: i64, rows: &[ExperimentRow]) -> Result<usize, SbError> {
        self.insert_table_rows("pool", idmodel, rows)
    }

    /// Adds screening experiments, the seed of [`SeedPolicy::Screening`].
    pub fn insert_screening_rows(
        &mut self,
        idmodel: i64,
        rows: &[ExperimentRow],
    ) -> Result<usize, SbError> {
        self.insert_table_rows("screening", idmodel, rows)
    }

    /// Stores the follow-up experiments of `dataset` at `time` in the pool.
    pub fn import_followup(
        &mut self,
        idmodel: i64,
        dataset: &Dataset,
        time: u32,
    ) -> Result<usize, SbError> {
        let rows = dataset.to_rows(time)?;
        self.insert_pool_rows(idmodel, &rows)
    }

    /// Stores the screening experiments of `dataset` at `time`.
    ///
    /// Experiments applying any agent that is not a stimulus are skipped.
    pub fn import_screening(
        &mut self,
        idmodel: i64,
        dataset: &Dataset,
        time: u32,
    ) -> Result<usize, SbError> {
        let setup = Arc::clone(&self.setup);
        let rows: Vec<_> = dataset
            .at(time)?
            .iter()
            .filter(|(_, clamping, _)| {
                !clamping
                    .iter()
                    .any(|(agent, intent)| intent == Intent::Apply && !setup.is_stimulus(agent))
            })
            .map(|(_, clamping, readouts)| ExperimentRow::from_parts(&setup, clamping, time, readouts))
            .collect();
        self.insert_screening_rows(idmodel, &rows)
    }

    fn insert_table_rows(
        &mut self,
        table: &str,
        idmodel: i64,
        rows: &[ExperimentRow],
    ) -> Result<usize, SbError> {
        let stored: Vec<_> = rows
            .iter()
            .map(|row| StoredRow::encode(&self.setup, row))
            .collect();
        let tx = self
            .conn
            .transaction()
            .map_err(|err| sql_error("store.transaction", err))?;
        let inserted = insert_rows(&tx, table, idmodel, &stored)?;
        tx.commit()
            .map_err(|err| sql_error("store.transaction", err))?;
        debug!(idmodel, table, inserted, "stored experiment rows");
        Ok(inserted)
    }

    /// Starts a fresh benchmark for the model.
    ///
    /// Previous history of the model is cleared, the iteration marker is set
    /// to 0 and the iteration-0 training set is seeded per the seed policy.
    /// Returns the number of seeded rows.
    pub fn init_benchmark(&mut self, idmodel: i64) -> Result<usize, SbError> {
        let seed_source = match self.seed_policy {
            SeedPolicy::Trivial => "pool",
            SeedPolicy::Screening => "screening",
        };
        let tx = self
            .conn
            .transaction()
            .map_err(|err| sql_error("store.transaction", err))?;
        for table in [
            "benchmark_data",
            "benchmark_mse",
            "benchmark_behaviors",
            "benchmark_outcomes",
        ] {
            tx.execute(&format!("DELETE FROM {table} WHERE idmodel = ?1"), params![idmodel])
                .map_err(|err| sql_error("store.init", err))?;
        }
        tx.execute(
            "INSERT OR REPLACE INTO benchmark_iterations(idmodel, it) VALUES (?1, 0)",
            params![idmodel],
        )
        .map_err(|err| sql_error("store.init", err))?;

        let mut seeded = load_rows(&tx, seed_source, idmodel, "", None)?;
        if self.seed_policy == SeedPolicy::Trivial {
            seeded.retain(|stored| {
                is_trivial(stored.n_stimuli as usize, stored.n_inhibitors as usize)
            });
        }
        insert_training_rows(&tx, idmodel, &seeded, 0)?;
        tx.commit()
            .map_err(|err| sql_error("store.transaction", err))?;
        debug!(idmodel, seeded = seeded.len(), source = seed_source, "initialised benchmark");
        Ok(seeded.len())
    }

    /// Most recently completed iteration, `None` when the model never started.
    pub fn last_iteration(&self, idmodel: i64) -> Result<Option<i64>, SbError> {
        self.conn
            .query_row(
                "SELECT it FROM benchmark_iterations WHERE idmodel = ?1",
                params![idmodel],
                |row| row.get(0),
            )
            .optional()
            .map_err(|err| sql_error("store.query", err))
    }

    /// Updates the last-completed-iteration marker.
    pub fn advance_iteration_marker(&self, idmodel: i64, iteration: i64) -> Result<(), SbError> {
        self.conn
            .execute(
                "INSERT OR REPLACE INTO benchmark_iterations(idmodel, it) VALUES (?1, ?2)",
                params![idmodel, iteration],
            )
            .map_err(|err| sql_error("store.marker", err))?;
        Ok(())
    }

    /// Training experiments recorded up to iteration `upto` (all when `None`).
    pub fn training_data(&self, idmodel: i64, upto: Option<i64>) -> Result<Dataset, SbError> {
        let stored = match upto {
            Some(bound) => load_rows(&self.conn, "benchmark_data", idmodel, "AND it <= ?2", Some(bound))?,
            None => load_rows(&self.conn, "benchmark_data", idmodel, "", None)?,
        };
        Ok(self.dataset(stored))
    }

    /// `(iteration, identity)` of every training row in insertion order.
    pub fn training_history(&self, idmodel: i64) -> Result<Vec<(i64, ClampingKey)>, SbError> {
        let mut stmt = self
            .conn
            .prepare("SELECT it, signature FROM benchmark_data WHERE idmodel = ?1 ORDER BY id")
            .map_err(|err| sql_error("store.query", err))?;
        let rows = stmt
            .query_map(params![idmodel], |row| {
                Ok((row.get::<_, i64>(0)?, ClampingKey::from_raw(row.get::<_, String>(1)?)))
            })
            .map_err(|err| sql_error("store.query", err))?;
        rows.collect::<Result<Vec<_>, _>>()
            .map_err(|err| sql_error("store.query", err))
    }

    /// The model's full candidate pool, used as test data.
    pub fn pool_data(&self, idmodel: i64) -> Result<Dataset, SbError> {
        let stored = load_rows(&self.conn, "pool", idmodel, "", None)?;
        Ok(self.dataset(stored))
    }

    /// Non-trivial pool experiments admitted by `filter`.
    pub fn candidate_pool(&self, idmodel: i64, filter: &PoolFilter) -> Result<Dataset, SbError> {
        let mut stored = load_rows(&self.conn, "pool", idmodel, "", None)?;
        stored.retain(|row| filter.admits(row.n_stimuli as usize, row.n_inhibitors as usize));
        Ok(self.dataset(stored))
    }

    /// Candidates not yet performed for the model, each identity reported once.
    pub fn check_and_filter_new(
        &self,
        idmodel: i64,
        candidates: &[Clamping],
    ) -> Result<Vec<Clamping>, SbError> {
        let mut stmt = self
            .conn
            .prepare("SELECT DISTINCT signature FROM benchmark_data WHERE idmodel = ?1")
            .map_err(|err| sql_error("store.query", err))?;
        let mut seen: HashSet<String> = stmt
            .query_map(params![idmodel], |row| row.get(0))
            .map_err(|err| sql_error("store.query", err))?
            .collect::<Result<_, _>>()
            .map_err(|err| sql_error("store.query", err))?;

        let mut fresh = Vec::new();
        for clamping in candidates {
            let key = clamping.key(&self.setup);
            if seen.insert(key.as_str().to_string()) {
                fresh.push(clamping.clone());
            }
        }
        Ok(fresh)
    }

    /// Copies the pool rows of `clampings` into the training set at `iteration`.
    ///
    /// Runs in one transaction: a clamping without a pool row rolls back every
    /// copy and fails with [`DEDUP_INCONSISTENCY`]. Returns the copied rows.
    pub fn commit_experiments(
        &mut self,
        idmodel: i64,
        clampings: &[Clamping],
        iteration: i64,
    ) -> Result<usize, SbError> {
        let tx = self
            .conn
            .transaction()
            .map_err(|err| sql_error("store.transaction", err))?;
        let mut copied = 0;
        for clamping in clampings {
            let key = clamping.key(&self.setup);
            let rows = tx
                .execute(
                    "INSERT INTO benchmark_data(idmodel, signature, n_stimuli, n_inhibitors, row, it)
                     SELECT idmodel, signature, n_stimuli, n_inhibitors, row, ?3 FROM pool
                     WHERE idmodel = ?1 AND signature = ?2 ORDER BY id",
                    params![idmodel, key.as_str(), iteration],
                )
                .map_err(|err| sql_error("store.commit", err))?;
            if rows == 0 {
                return Err(SbError::Store(
                    ErrorInfo::new(
                        DEDUP_INCONSISTENCY,
                        "designed experiment has no row in the candidate pool",
                    )
                    .with_context("idmodel", idmodel.to_string())
                    .with_context("iteration", iteration.to_string())
                    .with_context("clamping", key.to_string()),
                ));
            }
            copied += rows;
        }
        tx.commit()
            .map_err(|err| sql_error("store.transaction", err))?;
        debug!(idmodel, iteration, copied, "committed experiments");
        Ok(copied)
    }

    /// Appends the train/test error of an iteration. NaN is stored as NULL.
    pub fn record_iteration_summary(
        &self,
        idmodel: i64,
        iteration: i64,
        train_mse: f64,
        test_mse: f64,
    ) -> Result<(), SbError> {
        let finite = |value: f64| (!value.is_nan()).then_some(value);
        self.conn
            .execute(
                "INSERT INTO benchmark_mse(idmodel, it, train_mse, test_mse) VALUES (?1, ?2, ?3, ?4)",
                params![idmodel, iteration, finite(train_mse), finite(test_mse)],
            )
            .map_err(|err| sql_error("store.summary", err))?;
        Ok(())
    }

    /// Appends the learning statistics of an iteration.
    pub fn record_behavior_stats(
        &self,
        idmodel: i64,
        iteration: i64,
        tolerance: Tolerance,
        networks: usize,
        behaviors: usize,
    ) -> Result<(), SbError> {
        self.conn
            .execute(
                "INSERT INTO benchmark_behaviors(idmodel, it, fit, size, networks, behaviors)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    idmodel,
                    iteration,
                    tolerance.fit,
                    tolerance.size as i64,
                    networks as i64,
                    behaviors as i64
                ],
            )
            .map_err(|err| sql_error("store.behaviors", err))?;
        Ok(())
    }

    /// Persists how the model's loop ended, replacing any earlier outcome.
    pub fn record_outcome(
        &self,
        idmodel: i64,
        iteration: i64,
        termination: &Termination,
    ) -> Result<(), SbError> {
        let detail = serde_json::to_string(termination)
            .map_err(|err| SbError::Serde(ErrorInfo::new("json_serialize", err.to_string())))?;
        self.conn
            .execute(
                "INSERT OR REPLACE INTO benchmark_outcomes(idmodel, it, reason, detail)
                 VALUES (?1, ?2, ?3, ?4)",
                params![idmodel, iteration, termination.code(), detail],
            )
            .map_err(|err| sql_error("store.outcome", err))?;
        Ok(())
    }

    pub fn outcome(&self, idmodel: i64) -> Result<Option<OutcomeRecord>, SbError> {
        let raw: Option<(i64, String)> = self
            .conn
            .query_row(
                "SELECT it, detail FROM benchmark_outcomes WHERE idmodel = ?1",
                params![idmodel],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .map_err(|err| sql_error("store.query", err))?;
        raw.map(|(iteration, detail)| -> Result<OutcomeRecord, SbError> {
            let termination = serde_json::from_str(&detail).map_err(|err| {
                SbError::Serde(
                    ErrorInfo::new("json_deserialize", err.to_string())
                        .with_context("idmodel", idmodel.to_string()),
                )
            })?;
            Ok(OutcomeRecord {
                iteration,
                termination,
            })
        })
        .transpose()
    }

    pub fn iteration_summaries(&self, idmodel: i64) -> Result<Vec<IterationSummary>, SbError> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT it, train_mse, test_mse FROM benchmark_mse WHERE idmodel = ?1 ORDER BY rowid",
            )
            .map_err(|err| sql_error("store.query", err))?;
        let rows = stmt
            .query_map(params![idmodel], |row| {
                Ok(IterationSummary {
                    iteration: row.get(0)?,
                    train_mse: row.get(1)?,
                    test_mse: row.get(2)?,
                })
            })
            .map_err(|err| sql_error("store.query", err))?;
        rows.collect::<Result<Vec<_>, _>>()
            .map_err(|err| sql_error("store.query", err))
    }

    pub fn behavior_stats(&self, idmodel: i64) -> Result<Vec<BehaviorStats>, SbError> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT it, fit, size, networks, behaviors FROM benchmark_behaviors
                 WHERE idmodel = ?1 ORDER BY rowid",
            )
            .map_err(|err| sql_error("store.query", err))?;
        let rows = stmt
            .query_map(params![idmodel], |row| {
                Ok(BehaviorStats {
                    iteration: row.get(0)?,
                    fit: row.get(1)?,
                    size: row.get(2)?,
                    networks: row.get(3)?,
                    behaviors: row.get(4)?,
                })
            })
            .map_err(|err| sql_error("store.query", err))?;
        rows.collect::<Result<Vec<_>, _>>()
            .map_err(|err| sql_error("store.query", err))
    }

    /// Highest iteration with a train/test error row.
    pub fn last_recorded_summary(&self, idmodel: i64) -> Result<Option<i64>, SbError> {
        self.max_iteration("benchmark_mse", idmodel)
    }

    /// Highest iteration with a behavior statistics row.
    pub fn last_recorded_stats(&self, idmodel: i64) -> Result<Option<i64>, SbError> {
        self.max_iteration("benchmark_behaviors", idmodel)
    }

    fn max_iteration(&self, table: &str, idmodel: i64) -> Result<Option<i64>, SbError> {
        self.conn
            .query_row(
                &format!("SELECT MAX(it) FROM {table} WHERE idmodel = ?1"),
                params![idmodel],
                |row| row.get(0),
            )
            .map_err(|err| sql_error("store.query", err))
    }

    fn dataset(&self, stored: Vec<StoredRow>) -> Dataset {
        let rows: Vec<_> = stored.into_iter().map(|stored| stored.row).collect();
        Dataset::from_rows(&rows, Arc::clone(&self.setup))
    }
}

fn insert_training_rows(
    conn: &Connection,
    idmodel: i64,
    rows: &[StoredRow],
    iteration: i64,
) -> Result<(), SbError> {
    let mut stmt = conn
        .prepare(
            "INSERT INTO benchmark_data(idmodel, signature, n_stimuli, n_inhibitors, row, it)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .map_err(|err| sql_error("store.insert", err))?;
    for stored in rows {
        let json = serde_json::to_string(&stored.row)
            .map_err(|err| SbError::Serde(ErrorInfo::new("json_serialize", err.to_string())))?;
        stmt.execute(params![
            idmodel,
            stored.signature,
            stored.n_stimuli,
            stored.n_inhibitors,
            json,
            iteration
        ])
        .map_err(|err| sql_error("store.insert", err))?;
    }
    Ok(())
}
