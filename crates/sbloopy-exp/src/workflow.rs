//! Per-model refinement loop: learn, analyze, escalate or design, perform.

use std::sync::Arc;

use rand::seq::SliceRandom;
use sbloopy_core::rng::{iteration_substream, RngHandle};
use sbloopy_core::{
    Analyzer, BehaviorSet, Dataset, Design, Designer, Learner, NetworkSet, SbError, Termination,
    Tolerance,
};
use sbloopy_store::ExperimentStore;
use tracing::{error, info, info_span, warn};

use crate::config::WorkflowConfig;
use crate::escalate::{escalate, learn_and_analyze};
use crate::report::{ModelReport, RefinementReport};

/// Drives the active design loop of every requested model.
///
/// The store is owned for the lifetime of the workflow; solver collaborators
/// are injected as generic parameters.
pub struct Workflow<L, A, D> {
    store: ExperimentStore,
    learner: L,
    analyzer: A,
    designer: D,
    config: WorkflowConfig,
}

impl<L, A, D> Workflow<L, A, D>
where
    L: Learner,
    A: Analyzer<L::Networks>,
    D: Designer<A::Behaviors>,
{
    /// Validates `config` and assembles the workflow.
    pub fn new(
        store: ExperimentStore,
        learner: L,
        analyzer: A,
        designer: D,
        config: WorkflowConfig,
    ) -> Result<Self, SbError> {
        config.validate()?;
        Ok(Self {
            store,
            learner,
            analyzer,
            designer,
            config,
        })
    }

    /// Bookkeeping store.
    pub fn store(&self) -> &ExperimentStore {
        &self.store
    }

    /// Active configuration.
    pub fn config(&self) -> &WorkflowConfig {
        &self.config
    }

    /// Releases the store.
    pub fn into_store(self) -> ExperimentStore {
        self.store
    }

    /// Runs the loop of each model in turn.
    ///
    /// With `resume`, models that already have an iteration marker continue
    /// after it and models with a final outcome are reported as is. A model
    /// that fails never stops the others.
    pub fn run_refinement(&mut self, model_ids: &[i64], resume: bool) -> RefinementReport {
        let models = model_ids
            .iter()
            .map(|&idmodel| self.run_model(idmodel, resume))
            .collect();
        RefinementReport { models }
    }

    fn run_model(&mut self, idmodel: i64, resume: bool) -> ModelReport {
        let span = info_span!("benchmark", idmodel);
        let _entered = span.enter();

        if resume {
            match self.store.outcome(idmodel) {
                Ok(Some(record)) if is_final(&record.termination) => {
                    info!(reason = record.termination.code(), "benchmark already finished");
                    return match self.store.training_data(idmodel, None) {
                        Ok(training) => ModelReport {
                            idmodel,
                            termination: record.termination,
                            last_iteration: record.iteration,
                            experiments: training.len(),
                            already_complete: true,
                        },
                        Err(err) => self.failed(idmodel, record.iteration, err),
                    };
                }
                Ok(_) => {}
                Err(err) => return self.failed(idmodel, -1, err),
            }
        }

        let mut iteration = -1;
        let termination = match self.drive(idmodel, resume, &mut iteration) {
            Ok(termination) => termination,
            Err(err) => {
                error!(iteration, error = %err, "benchmark failed");
                Termination::Failed {
                    error: err.info().clone(),
                }
            }
        };
        match self.finish(idmodel, iteration, &termination) {
            Ok(experiments) => {
                info!(
                    iteration,
                    reason = termination.code(),
                    experiments,
                    "benchmark finished"
                );
                ModelReport {
                    idmodel,
                    termination,
                    last_iteration: iteration,
                    experiments,
                    already_complete: false,
                }
            }
            Err(err) => self.failed(idmodel, iteration, err),
        }
    }

    fn failed(&self, idmodel: i64, iteration: i64, err: SbError) -> ModelReport {
        error!(iteration, error = %err, "benchmark bookkeeping failed");
        ModelReport {
            idmodel,
            termination: Termination::Failed {
                error: err.info().clone(),
            },
            last_iteration: iteration,
            experiments: 0,
            already_complete: false,
        }
    }

    fn finish(
        &self,
        idmodel: i64,
        iteration: i64,
        termination: &Termination,
    ) -> Result<usize, SbError> {
        if iteration >= 0 {
            self.store.advance_iteration_marker(idmodel, iteration)?;
        }
        self.store.record_outcome(idmodel, iteration, termination)?;
        Ok(self.store.training_data(idmodel, None)?.len())
    }

    fn drive(
        &mut self,
        idmodel: i64,
        resume: bool,
        iteration: &mut i64,
    ) -> Result<Termination, SbError> {
        let test = self.store.pool_data(idmodel)?;
        let setup = Arc::clone(self.store.setup());
        let time = self.config.time;

        // iterations up to these already have their history rows
        let mut summaries_upto = -1;
        let mut stats_upto = -1;
        let restart = if resume {
            self.resume_point(idmodel)?
        } else {
            None
        };
        match restart {
            Some(start) => {
                let completed = start - 1;
                let last_summary = self.store.last_recorded_summary(idmodel)?.unwrap_or(-1);
                let last_stats = self.store.last_recorded_stats(idmodel)?.unwrap_or(-1);
                summaries_upto = completed.max(last_summary);
                stats_upto = completed.max(last_stats);
                *iteration = completed;
                info!(start, "resuming benchmark");
            }
            None => {
                let seeded = self.store.init_benchmark(idmodel)?;
                if seeded > self.config.max_experiments {
                    warn!(
                        seeded,
                        budget = self.config.max_experiments,
                        "initial training set already exceeds the budget"
                    );
                }
                info!(seeded, pool = test.len(), "starting benchmark");
            }
        }

        loop {
            let next = *iteration + 1;
            if let Some(limit) = self.config.max_iterations {
                if next > limit {
                    info!(limit, "iteration limit reached");
                    return Ok(Termination::IterationLimit);
                }
            }
            *iteration = next;
            let it = next;
            let training = self.store.training_data(idmodel, None)?;
            info!(iteration = it, experiments = training.len(), "learning without tolerance");

            let mut candidates = learn_and_analyze(
                &mut self.learner,
                &mut self.analyzer,
                &training,
                &test,
                Tolerance::ZERO,
            )?;
            info!(
                networks = candidates.networks.len(),
                behaviors = candidates.behaviors.len(),
                "analyzed networks"
            );
            if it > summaries_upto {
                let train_mse = candidates.behaviors.mse(&training, time)?;
                let test_mse = candidates.behaviors.mse(&test, time)?;
                self.store
                    .record_iteration_summary(idmodel, it, train_mse, test_mse)?;
            }

            if candidates.behaviors.len() == 1 {
                candidates = escalate(
                    &mut self.learner,
                    &mut self.analyzer,
                    &training,
                    &test,
                    candidates,
                    &self.config.escalation,
                )?;
            }
            match candidates.behaviors.len() {
                0 => {
                    warn!("no behavior learned");
                    return Ok(Termination::NoDiscrimination);
                }
                1 => return Ok(Termination::ConvergedSingle),
                _ => {}
            }

            if it > stats_upto {
                self.store.record_behavior_stats(
                    idmodel,
                    it,
                    candidates.tolerance,
                    candidates.networks.len(),
                    candidates.behaviors.len(),
                )?;
            }

            info!(behaviors = candidates.behaviors.len(), "discriminating behaviors");
            let mut designs = self.designer.design(
                &candidates.behaviors,
                &setup,
                &self.config.design.request(false),
            )?;
            if designs.is_empty() {
                info!("cannot discriminate all behaviors pairwise, relaxing");
                designs = self.designer.design(
                    &candidates.behaviors,
                    &setup,
                    &self.config.design.request(true),
                )?;
            }
            if designs.is_empty() {
                info!("cannot generate any difference among behaviors");
                return Ok(Termination::NoDiscrimination);
            }
            drop(candidates);

            info!(designs = designs.len(), "optimal experimental designs");
            if let Some(termination) = self.perform(idmodel, it, &training, designs)? {
                return Ok(termination);
            }
        }
    }

    /// First iteration to run on resume, `None` when the model starts afresh.
    ///
    /// A model that failed runs its failed iteration again; otherwise the
    /// loop continues after the marker.
    fn resume_point(&self, idmodel: i64) -> Result<Option<i64>, SbError> {
        let Some(marker) = self.store.last_iteration(idmodel)? else {
            return Ok(None);
        };
        match self.store.outcome(idmodel)? {
            Some(record) if record.termination.is_failure() => {
                Ok((record.iteration >= 0).then_some(record.iteration))
            }
            _ => Ok(Some(marker + 1)),
        }
    }

    /// Commits the first design with unperformed experiments.
    ///
    /// Returns `None` when the loop continues.
    fn perform(
        &mut self,
        idmodel: i64,
        iteration: i64,
        training: &Dataset,
        mut designs: Vec<Design>,
    ) -> Result<Option<Termination>, SbError> {
        let mut rng = RngHandle::substream(self.config.seed, iteration_substream(idmodel, iteration));
        designs.shuffle(&mut rng);
        while let Some(design) = designs.pop() {
            let fresh = self.store.check_and_filter_new(idmodel, &design.clampings)?;
            if fresh.is_empty() {
                continue;
            }
            if fresh.len() + training.len() > self.config.max_experiments {
                info!(
                    budget = self.config.max_experiments,
                    "number of allowed experiments reached"
                );
                return Ok(Some(Termination::BudgetExhausted));
            }
            let copied = self
                .store
                .commit_experiments(idmodel, &fresh, iteration + 1)?;
            info!(added = fresh.len(), rows = copied, "experiments added to the dataset");
            return Ok(None);
        }
        info!("all optimal experimental designs were performed already");
        Ok(Some(Termination::DesignsExhausted))
    }
}

fn is_final(termination: &Termination) -> bool {
    !matches!(
        termination,
        Termination::IterationLimit | Termination::Failed { .. }
    )
}
