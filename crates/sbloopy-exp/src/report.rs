//! Per-model and per-run results returned by the loop and the baseline.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use sbloopy_core::errors::{ErrorInfo, SbError};
use sbloopy_core::Termination;
use serde::{Deserialize, Serialize};

use crate::serde::to_canonical_json_bytes;

fn write_json<T: Serialize>(value: &T, path: &Path) -> Result<(), SbError> {
    let bytes = to_canonical_json_bytes(value)?;
    fs::write(path, bytes).map_err(|err| {
        SbError::Serde(
            ErrorInfo::new("report_write", err.to_string())
                .with_context("path", path.display().to_string()),
        )
    })
}

/// Outcome of one model's refinement loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelReport {
    /// Model identifier.
    pub idmodel: i64,
    /// Why the loop stopped.
    pub termination: Termination,
    /// Iteration marker after the run.
    pub last_iteration: i64,
    /// Distinct experiments in the final training set.
    pub experiments: usize,
    /// True when a resumed run found the model already finished.
    #[serde(default)]
    pub already_complete: bool,
}

/// Results of [`crate::Workflow::run_refinement`], in request order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RefinementReport {
    /// One entry per requested model.
    pub models: Vec<ModelReport>,
}

impl RefinementReport {
    /// Report of `idmodel`, if it was requested.
    pub fn get(&self, idmodel: i64) -> Option<&ModelReport> {
        self.models.iter().find(|model| model.idmodel == idmodel)
    }

    /// Models whose loop ended with [`Termination::Failed`].
    pub fn failures(&self) -> impl Iterator<Item = &ModelReport> + '_ {
        self.models
            .iter()
            .filter(|model| model.termination.is_failure())
    }

    /// Writes the report as canonical JSON.
    pub fn write_json(&self, path: &Path) -> Result<(), SbError> {
        write_json(self, path)
    }
}

/// One learning step of a baseline run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BaselinePoint {
    /// Training-set size after the batch.
    pub experiments: usize,
    /// Error of the learned behaviors on the test data.
    pub test_mse: f64,
    /// Number of behavior classes.
    pub behaviors: usize,
}

/// A completed baseline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaselineRun {
    /// Run index, also its RNG substream.
    pub run: usize,
    /// Learning steps in order.
    pub points: Vec<BaselinePoint>,
}

/// Mean of the successful runs at one training-set size.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CurvePoint {
    /// Training-set size.
    pub experiments: usize,
    /// Mean test error.
    pub mean_test_mse: f64,
    /// Mean number of behavior classes.
    pub mean_behaviors: f64,
    /// Runs contributing to the means.
    pub runs: usize,
}

/// Results of [`crate::RandomBaseline::run`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaselineReport {
    /// Model identifier.
    pub idmodel: i64,
    /// Batch size.
    pub step: usize,
    /// Training-set size at which runs stop.
    pub budget: usize,
    /// Successful runs.
    pub runs: Vec<BaselineRun>,
    /// Runs discarded after a solver failure.
    pub failed_runs: usize,
    /// Per-size means over `runs`.
    pub curve: Vec<CurvePoint>,
}

impl BaselineReport {
    /// Builds the report and its aggregated curve.
    pub fn new(
        idmodel: i64,
        step: usize,
        budget: usize,
        runs: Vec<BaselineRun>,
        failed_runs: usize,
    ) -> Self {
        let mut sums: BTreeMap<usize, (f64, f64, usize)> = BTreeMap::new();
        for point in runs.iter().flat_map(|run| run.points.iter()) {
            let entry = sums.entry(point.experiments).or_insert((0.0, 0.0, 0));
            entry.0 += point.test_mse;
            entry.1 += point.behaviors as f64;
            entry.2 += 1;
        }
        let curve = sums
            .into_iter()
            .map(|(experiments, (mse, behaviors, count))| CurvePoint {
                experiments,
                mean_test_mse: mse / count as f64,
                mean_behaviors: behaviors / count as f64,
                runs: count,
            })
            .collect();
        Self {
            idmodel,
            step,
            budget,
            runs,
            failed_runs,
            curve,
        }
    }

    /// Writes the report as canonical JSON.
    pub fn write_json(&self, path: &Path) -> Result<(), SbError> {
        write_json(self, path)
    }
}
