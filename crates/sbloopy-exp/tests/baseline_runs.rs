mod common;

use std::cell::Cell;
use std::rc::Rc;

use common::{
    solver_error, store_with_models, Networks, ScriptedAnalyzer, ScriptedLearner, TRIVIAL,
};
use sbloopy_core::{Dataset, Learner, SbError, Tolerance};
use sbloopy_exp::{BaselineConfig, RandomBaseline};
use sbloopy_store::ExperimentStore;

fn seeded_store() -> ExperimentStore {
    let mut store = store_with_models(&[1]);
    assert_eq!(store.init_benchmark(1).expect("init"), TRIVIAL);
    store
}

fn config(budget: usize) -> BaselineConfig {
    BaselineConfig {
        seed: 11,
        ..BaselineConfig::with_budget(budget)
    }
}

/// One network per combinatorial experiment drawn so far, plus one.
struct CombinationCounter;

impl Learner for CombinationCounter {
    type Networks = Networks;

    fn learn(&mut self, training: &Dataset, _tolerance: Tolerance) -> Result<Networks, SbError> {
        let combined = training
            .experiments()
            .filter(|experiment| experiment.clamping.active_stimuli(training.setup()) >= 2)
            .count();
        Ok(vec![training.len(); combined + 1])
    }
}

#[test]
fn batches_stop_at_the_budget() {
    let store = seeded_store();
    let mut baseline = RandomBaseline::new(
        &store,
        ScriptedLearner::constant(2),
        ScriptedAnalyzer::passthrough(),
        config(18),
    )
    .expect("baseline");

    let report = baseline.run(3, 1, 4).expect("baseline runs");
    assert_eq!(report.failed_runs, 0);
    assert_eq!(report.runs.len(), 3);
    for run in &report.runs {
        let sizes: Vec<usize> = run.points.iter().map(|point| point.experiments).collect();
        assert_eq!(sizes, vec![16, 18]);
        assert!(run.points.iter().all(|point| point.behaviors == 2));
    }
    let curve: Vec<(usize, usize)> = report
        .curve
        .iter()
        .map(|point| (point.experiments, point.runs))
        .collect();
    assert_eq!(curve, vec![(16, 3), (18, 3)]);
}

#[test]
fn same_seed_gives_the_same_curve() {
    let store = seeded_store();
    let run = |seed: u64| {
        let mut baseline = RandomBaseline::new(
            &store,
            CombinationCounter,
            ScriptedAnalyzer::passthrough(),
            BaselineConfig {
                seed,
                ..config(24)
            },
        )
        .expect("baseline");
        baseline.run(4, 1, 3).expect("baseline runs")
    };
    let first = run(5);
    assert_eq!(first, run(5));
    for run in &first.runs {
        let sizes: Vec<usize> = run.points.iter().map(|point| point.experiments).collect();
        assert_eq!(sizes, vec![15, 18, 21, 24]);
    }
}

#[test]
fn solver_failure_discards_only_that_run() {
    let store = seeded_store();
    let calls = Rc::new(Cell::new(0usize));
    let counter = Rc::clone(&calls);
    let learner = ScriptedLearner::new(move |_, _| {
        counter.set(counter.get() + 1);
        if counter.get() == 3 {
            Err(solver_error("learner timed out"))
        } else {
            Ok(2)
        }
    });
    let mut baseline =
        RandomBaseline::new(&store, learner, ScriptedAnalyzer::passthrough(), config(18))
            .expect("baseline");

    let report = baseline.run(3, 1, 4).expect("baseline runs");
    assert_eq!(report.failed_runs, 1);
    let kept: Vec<usize> = report.runs.iter().map(|run| run.run).collect();
    assert_eq!(kept, vec![0, 2]);
    assert_eq!(calls.get(), 5);
    assert!(report.curve.iter().all(|point| point.runs == 2));
}

#[test]
fn non_solver_failure_aborts() {
    let store = seeded_store();
    let learner = ScriptedLearner::new(|_, _| {
        Err(SbError::Dataset(sbloopy_core::ErrorInfo::new(
            "dataset.corrupt",
            "bad row",
        )))
    });
    let mut baseline =
        RandomBaseline::new(&store, learner, ScriptedAnalyzer::passthrough(), config(18))
            .expect("baseline");
    let err = baseline.run(2, 1, 4).unwrap_err();
    assert_eq!(err.code(), "dataset.corrupt");
}

#[test]
fn zero_step_is_rejected() {
    let store = seeded_store();
    let mut baseline = RandomBaseline::new(
        &store,
        ScriptedLearner::constant(2),
        ScriptedAnalyzer::passthrough(),
        config(18),
    )
    .expect("baseline");
    let err = baseline.run(1, 1, 0).unwrap_err();
    assert!(matches!(err, SbError::Config(_)));
    assert_eq!(err.code(), "config.step");
}

#[test]
fn budget_already_met_yields_no_points() {
    let store = seeded_store();
    let mut baseline = RandomBaseline::new(
        &store,
        ScriptedLearner::constant(2),
        ScriptedAnalyzer::passthrough(),
        config(TRIVIAL),
    )
    .expect("baseline");
    let report = baseline.run(2, 1, 4).expect("baseline runs");
    assert_eq!(report.runs.len(), 2);
    assert!(report.runs.iter().all(|run| run.points.is_empty()));
    assert!(report.curve.is_empty());
}

#[test]
fn filtered_pool_runs_dry_before_the_budget() {
    let store = seeded_store();
    let mut baseline = RandomBaseline::new(
        &store,
        ScriptedLearner::constant(2),
        ScriptedAnalyzer::passthrough(),
        BaselineConfig {
            max_stimuli: 2,
            max_inhibitors: 1,
            ..config(100)
        },
    )
    .expect("baseline");
    let report = baseline.run(2, 1, 4).expect("baseline runs");
    for run in &report.runs {
        let sizes: Vec<usize> = run.points.iter().map(|point| point.experiments).collect();
        assert_eq!(sizes, vec![16, 20, 21]);
    }
}

#[test]
fn baseline_leaves_the_store_untouched() {
    let store = seeded_store();
    let before = store.training_history(1).expect("history");
    let mut baseline = RandomBaseline::new(
        &store,
        ScriptedLearner::constant(2),
        ScriptedAnalyzer::passthrough(),
        config(30),
    )
    .expect("baseline");
    baseline.run(2, 1, 5).expect("baseline runs");
    drop(baseline);

    assert_eq!(store.training_history(1).expect("history"), before);
    assert!(store.iteration_summaries(1).expect("summaries").is_empty());
    assert!(store.outcome(1).expect("outcome").is_none());
}
