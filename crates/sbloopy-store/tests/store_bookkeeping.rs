use std::sync::Arc;

use sbloopy_core::errors::DEDUP_INCONSISTENCY;
use sbloopy_core::{
    Clamping, Dataset, ErrorInfo, ExperimentRow, Intent, Setup, Termination, Tolerance,
};
use sbloopy_store::{ExperimentStore, PoolFilter, SeedPolicy};
use tempfile::NamedTempFile;

fn setup() -> Arc<Setup> {
    Arc::new(Setup::new(["egf", "tnfa", "il1a"], ["pi3k", "raf1"], ["erk", "akt"]))
}

fn row(bits: u8) -> ExperimentRow {
    let mut row = ExperimentRow::at(1);
    for (idx, name) in ["egf", "tnfa", "il1a"].into_iter().enumerate() {
        row = row.with_stimulus(name, bits & (1 << idx) != 0);
    }
    for (idx, name) in ["pi3k", "raf1"].into_iter().enumerate() {
        row = row.with_inhibitor(name, bits & (1 << (idx + 3)) != 0);
    }
    row.with_readout("erk", Some(f64::from(bits) / 32.0))
        .with_readout("akt", None)
}

fn clamping(bits: u8, setup: &Setup) -> Clamping {
    row(bits).clamping(setup)
}

fn populated_store() -> ExperimentStore {
    let mut store = ExperimentStore::open_in_memory(setup()).expect("store");
    let rows: Vec<_> = (0u8..32).map(row).collect();
    store.insert_pool_rows(1, &rows).expect("pool");
    store
}

#[test]
fn init_seeds_trivial_experiments_and_resets_history() {
    let mut store = populated_store();
    // 0..=1 stimuli and 0..=1 inhibitors: 4 * 3 combinations
    assert_eq!(store.init_benchmark(1).expect("init"), 12);
    let setup = Arc::clone(store.setup());
    store
        .commit_experiments(1, &[clamping(0b00111, &setup)], 1)
        .expect("commit");
    store.record_iteration_summary(1, 0, 0.1, 0.2).expect("summary");
    store
        .record_outcome(1, 1, &Termination::BudgetExhausted)
        .expect("outcome");

    assert_eq!(store.init_benchmark(1).expect("re-init"), 12);
    assert_eq!(store.training_data(1, None).expect("training").len(), 12);
    assert!(store.iteration_summaries(1).expect("summaries").is_empty());
    assert_eq!(store.outcome(1).expect("outcome"), None);
    assert_eq!(store.last_iteration(1).expect("marker"), Some(0));
}

#[test]
fn filter_and_commit_preserve_dedup_invariant() {
    let mut store = populated_store();
    store.init_benchmark(1).expect("init");
    let setup = Arc::clone(store.setup());

    let trained = clamping(0b00001, &setup);
    let novel = clamping(0b00011, &setup);
    let fresh = store
        .check_and_filter_new(1, &[trained, novel.clone(), novel.clone()])
        .expect("filter");
    assert_eq!(fresh, vec![novel.clone()]);

    assert_eq!(store.commit_experiments(1, &fresh, 1).expect("commit"), 1);
    assert!(store
        .check_and_filter_new(1, &[novel])
        .expect("filter")
        .is_empty());

    let history = store.training_history(1).expect("history");
    assert_eq!(history.len(), 13);
    assert_eq!(history.last().map(|(it, _)| *it), Some(1));
    assert_eq!(store.training_data(1, Some(0)).expect("upto").len(), 12);
    assert_eq!(store.training_data(1, Some(1)).expect("upto").len(), 13);
}

#[test]
fn commit_to_a_model_without_pool_fails() {
    let mut store = populated_store();
    store.init_benchmark(1).expect("init");
    let setup = Arc::clone(store.setup());

    let err = store
        .commit_experiments(2, &[clamping(0b00111, &setup)], 1)
        .expect_err("model 2 has no pool");
    assert_eq!(err.code(), DEDUP_INCONSISTENCY);
    assert_eq!(err.info().context["idmodel"], "2");
    assert!(store.training_history(2).expect("history").is_empty());

    // a held-off stimulus and an unspecified one share an identity
    let implicit = Clamping::new([("egf", Intent::Apply), ("il1a", Intent::Apply)]);
    assert_eq!(store.commit_experiments(1, &[implicit], 1).expect("commit"), 1);
    assert_eq!(store.training_data(1, None).expect("training").len(), 13);
}

#[test]
fn dedup_inconsistency_commits_nothing() {
    let setup = setup();
    let mut store = ExperimentStore::open_in_memory(Arc::clone(&setup)).expect("store");
    store
        .insert_pool_rows(1, &[row(0), row(0b00001), row(0b00011)])
        .expect("pool");
    store.init_benchmark(1).expect("init");

    let err = store
        .commit_experiments(1, &[clamping(0b00011, &setup), clamping(0b00111, &setup)], 1)
        .expect_err("egf+tnfa+il1a is not in the pool");
    assert_eq!(err.code(), DEDUP_INCONSISTENCY);
    assert_eq!(store.training_data(1, None).expect("training").len(), 2);
}

#[test]
fn candidate_pool_applies_filter() {
    let store = populated_store();
    let unbounded = store
        .candidate_pool(1, &PoolFilter::default())
        .expect("pool");
    assert_eq!(unbounded.len(), 32 - 12);
    let bounded = store.candidate_pool(1, &PoolFilter::new(2, 1)).expect("pool");
    for experiment in bounded.experiments() {
        assert_eq!(experiment.clamping.active_stimuli(store.setup()), 2);
        assert!(experiment.clamping.active_inhibitors(store.setup()) <= 1);
    }
    // egf+tnfa, egf+il1a, tnfa+il1a with 0 or 1 inhibitor
    assert_eq!(bounded.len(), 3 * 3);
}

#[test]
fn screening_seed_and_import_rules() {
    let setup = setup();
    let mut store = ExperimentStore::open_in_memory(Arc::clone(&setup))
        .expect("store")
        .with_seed_policy(SeedPolicy::Screening);

    let mut screening = Dataset::from_rows(&[row(0b00001), row(0b01011)], Arc::clone(&setup));
    let mut observations = sbloopy_core::Observations::new();
    observations.insert(1, [("erk".to_string(), 0.4)].into_iter().collect());
    screening.add([sbloopy_core::Experiment::new(
        Clamping::new([("egf", Intent::Apply), ("pi3k", Intent::Apply)]),
        observations,
    )]);
    assert_eq!(store.import_screening(4, &screening, 1).expect("screening"), 2);

    let followup = Dataset::from_rows(&(0u8..8).map(row).collect::<Vec<_>>(), Arc::clone(&setup));
    assert_eq!(store.import_followup(4, &followup, 1).expect("followup"), 8);

    assert_eq!(store.init_benchmark(4).expect("init"), 2);
    assert_eq!(store.pool_data(4).expect("pool").len(), 8);
}

#[test]
fn history_survives_reopen() {
    let file = NamedTempFile::new().expect("db");
    {
        let mut store = ExperimentStore::open(file.path(), setup()).expect("open");
        let rows: Vec<_> = (0u8..32).map(row).collect();
        store.insert_pool_rows(9, &rows).expect("pool");
        store.init_benchmark(9).expect("init");
        store.record_iteration_summary(9, 1, 0.3, 0.4).expect("summary");
        store
            .record_behavior_stats(9, 2, Tolerance::size(1), 6, 2)
            .expect("stats");
        store.advance_iteration_marker(9, 2).expect("marker");
        store
            .record_outcome(
                9,
                2,
                &Termination::Failed {
                    error: ErrorInfo::new("solver.crash", "learner died"),
                },
            )
            .expect("outcome");
    }

    let store = ExperimentStore::open(file.path(), setup()).expect("reopen");
    assert_eq!(store.last_iteration(9).expect("marker"), Some(2));
    assert_eq!(store.last_recorded_summary(9).expect("summary"), Some(1));
    assert_eq!(store.last_recorded_stats(9).expect("stats"), Some(2));
    assert_eq!(store.last_recorded_summary(10).expect("summary"), None);
    assert_eq!(store.last_recorded_stats(10).expect("stats"), None);
    let stats = store.behavior_stats(9).expect("stats");
    assert_eq!((stats[0].size, stats[0].networks, stats[0].behaviors), (1, 6, 2));
    let outcome = store.outcome(9).expect("outcome").expect("recorded");
    assert_eq!(outcome.iteration, 2);
    assert!(outcome.termination.is_failure());
}
