//! Learning curves from randomly grown training sets.

use sbloopy_core::errors::{ErrorInfo, SbError};
use sbloopy_core::rng::RngHandle;
use sbloopy_core::{Analyzer, BehaviorSet, Dataset, Learner, Tolerance};
use sbloopy_store::ExperimentStore;
use tracing::{info, info_span, warn};

use crate::config::BaselineConfig;
use crate::report::{BaselinePoint, BaselineReport, BaselineRun};

/// Grows a model's iteration-0 training set by random batches of the
/// candidate pool, learning after every batch.
///
/// Reads the store but never writes to it.
pub struct RandomBaseline<'s, L, A> {
    store: &'s ExperimentStore,
    learner: L,
    analyzer: A,
    config: BaselineConfig,
}

impl<'s, L, A> RandomBaseline<'s, L, A>
where
    L: Learner,
    A: Analyzer<L::Networks>,
{
    /// Validates `config` and assembles the runner.
    pub fn new(
        store: &'s ExperimentStore,
        learner: L,
        analyzer: A,
        config: BaselineConfig,
    ) -> Result<Self, SbError> {
        config.validate()?;
        Ok(Self {
            store,
            learner,
            analyzer,
            config,
        })
    }

    /// Performs `repeats` independent runs for `idmodel` with batches of `step`.
    ///
    /// Runs ending in a solver failure are discarded and counted; any other
    /// error aborts.
    pub fn run(&mut self, repeats: usize, idmodel: i64, step: usize) -> Result<BaselineReport, SbError> {
        if step == 0 {
            return Err(SbError::Config(
                ErrorInfo::new("config.step", "baseline step must be positive")
                    .with_context("idmodel", idmodel.to_string()),
            ));
        }
        let span = info_span!("baseline", idmodel);
        let _entered = span.enter();

        let initial = self.store.training_data(idmodel, Some(0))?;
        let test = self.store.pool_data(idmodel)?;
        let mut pool = self.store.candidate_pool(idmodel, &self.config.filter())?;
        pool.retain(|experiment| !initial.contains(&experiment.clamping));
        info!(
            initial = initial.len(),
            pool = pool.len(),
            budget = self.config.budget,
            "starting random baseline"
        );

        let mut runs = Vec::with_capacity(repeats);
        let mut failed_runs = 0;
        for run in 0..repeats {
            let mut rng = RngHandle::substream(self.config.seed, run as u64);
            match self.run_once(&initial, &test, pool.clone(), step, &mut rng) {
                Ok(points) => runs.push(BaselineRun { run, points }),
                Err(err) if err.is_solver_failure() => {
                    warn!(run, error = %err, "discarding baseline run");
                    failed_runs += 1;
                }
                Err(err) => return Err(err),
            }
        }
        Ok(BaselineReport::new(
            idmodel,
            step,
            self.config.budget,
            runs,
            failed_runs,
        ))
    }

    fn run_once(
        &mut self,
        initial: &Dataset,
        test: &Dataset,
        mut pool: Dataset,
        step: usize,
        rng: &mut RngHandle,
    ) -> Result<Vec<BaselinePoint>, SbError> {
        let budget = self.config.budget;
        let mut training = initial.clone();
        let mut points = Vec::new();
        while training.len() < budget && !pool.is_empty() {
            let n = step.min(budget - training.len()).min(pool.len());
            let batch = pool.pop_sample(n, rng)?;
            training.add(batch);

            let networks = self.learner.learn(&training, Tolerance::ZERO)?;
            let behaviors = self.analyzer.behaviors(&networks, test)?;
            points.push(BaselinePoint {
                experiments: training.len(),
                test_mse: behaviors.mse(test, self.config.time)?,
                behaviors: behaviors.len(),
            });
        }
        Ok(points)
    }
}
