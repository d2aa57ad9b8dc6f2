#![allow(dead_code)]

use std::cell::RefCell;
use std::path::Path;
use std::rc::Rc;
use std::sync::Arc;

use sbloopy_core::{
    Analyzer, BehaviorSet, Clamping, Dataset, Design, DesignRequest, Designer, ErrorInfo,
    ExperimentRow, Learner, SbError, Setup, Tolerance,
};
use sbloopy_store::ExperimentStore;

pub const STIMULI: [&str; 3] = ["egf", "tnfa", "il1a"];
pub const INHIBITORS: [&str; 2] = ["pi3k", "raf1"];
pub const READOUTS: [&str; 3] = ["erk", "akt", "p38"];

/// Number of pool experiments with at most one stimulus and one inhibitor.
pub const TRIVIAL: usize = 12;

pub fn setup() -> Arc<Setup> {
    Arc::new(Setup::new(STIMULI, INHIBITORS, READOUTS))
}

/// Row encoding `bits`: bits 0-2 select stimuli, bits 3-4 inhibitors.
pub fn row(bits: u8) -> ExperimentRow {
    let mut row = ExperimentRow::at(1);
    for (idx, name) in STIMULI.into_iter().enumerate() {
        row = row.with_stimulus(name, bits & (1 << idx) != 0);
    }
    for (idx, name) in INHIBITORS.into_iter().enumerate() {
        row = row.with_inhibitor(name, bits & (1 << (idx + 3)) != 0);
    }
    for (idx, name) in READOUTS.into_iter().enumerate() {
        let value = f64::from((bits as u32 * 7 + idx as u32) % 10) / 10.0;
        row = row.with_readout(name, Some(value));
    }
    row
}

pub fn clamping(bits: u8) -> Clamping {
    row(bits).clamping(&setup())
}

/// Bit patterns with two or more stimuli or two inhibitors, ascending.
pub fn nontrivial_patterns() -> Vec<u8> {
    (0u8..32)
        .filter(|bits| (bits & 0b111).count_ones() > 1 || (bits >> 3).count_ones() > 1)
        .collect()
}

pub fn populate(store: &mut ExperimentStore, idmodel: i64, patterns: impl IntoIterator<Item = u8>) {
    let rows: Vec<_> = patterns.into_iter().map(row).collect();
    store.insert_pool_rows(idmodel, &rows).expect("pool rows");
}

/// In-memory store where every model has the full 32-experiment pool.
pub fn store_with_models(models: &[i64]) -> ExperimentStore {
    let mut store = ExperimentStore::open_in_memory(setup()).expect("store");
    for &idmodel in models {
        populate(&mut store, idmodel, 0u8..32);
    }
    store
}

pub fn store_at(path: &Path, models: &[i64]) -> ExperimentStore {
    let mut store = ExperimentStore::open(path, setup()).expect("store");
    for &idmodel in models {
        populate(&mut store, idmodel, 0u8..32);
    }
    store
}

pub fn solver_error(message: &str) -> SbError {
    SbError::Solver(ErrorInfo::new("solver.crash", message))
}

/// Networks are tagged with the training-set size they were learned from.
pub type Networks = Vec<usize>;

#[derive(Debug, Clone, PartialEq)]
pub struct Behaviors {
    pub classes: usize,
    pub trained: usize,
}

impl BehaviorSet for Behaviors {
    fn len(&self) -> usize {
        self.classes
    }

    fn mse(&self, dataset: &Dataset, time: u32) -> Result<f64, SbError> {
        let observed = dataset.observation_count(time) as f64;
        Ok(observed / (100.0 + self.trained as f64 * 10.0 + self.classes as f64))
    }
}

type LearnScript = Box<dyn FnMut(usize, Tolerance) -> Result<usize, SbError>>;

/// Learner whose network count is scripted on `(training size, tolerance)`.
pub struct ScriptedLearner {
    script: LearnScript,
    pub calls: Rc<RefCell<Vec<(usize, Tolerance)>>>,
}

impl ScriptedLearner {
    pub fn new(script: impl FnMut(usize, Tolerance) -> Result<usize, SbError> + 'static) -> Self {
        Self {
            script: Box::new(script),
            calls: Rc::default(),
        }
    }

    pub fn constant(networks: usize) -> Self {
        Self::new(move |_, _| Ok(networks))
    }
}

impl Learner for ScriptedLearner {
    type Networks = Networks;

    fn learn(&mut self, training: &Dataset, tolerance: Tolerance) -> Result<Networks, SbError> {
        self.calls.borrow_mut().push((training.len(), tolerance));
        let count = (self.script)(training.len(), tolerance)?;
        Ok(vec![training.len(); count])
    }
}

type AnalyzeScript = Box<dyn FnMut(&Networks) -> Result<Behaviors, SbError>>;

/// Analyzer mapping every network to its own behavior class unless scripted.
pub struct ScriptedAnalyzer {
    script: AnalyzeScript,
}

impl ScriptedAnalyzer {
    pub fn passthrough() -> Self {
        Self::new(|networks| {
            Ok(Behaviors {
                classes: networks.len(),
                trained: networks.first().copied().unwrap_or(0),
            })
        })
    }

    pub fn new(script: impl FnMut(&Networks) -> Result<Behaviors, SbError> + 'static) -> Self {
        Self {
            script: Box::new(script),
        }
    }
}

impl Analyzer<Networks> for ScriptedAnalyzer {
    type Behaviors = Behaviors;

    fn behaviors(&mut self, networks: &Networks, _reference: &Dataset) -> Result<Behaviors, SbError> {
        (self.script)(networks)
    }
}

type DesignScript = Box<dyn FnMut(&Behaviors, &DesignRequest) -> Result<Vec<Design>, SbError>>;

pub struct ScriptedDesigner {
    script: DesignScript,
    pub requests: Rc<RefCell<Vec<DesignRequest>>>,
}

impl ScriptedDesigner {
    pub fn new(
        script: impl FnMut(&Behaviors, &DesignRequest) -> Result<Vec<Design>, SbError> + 'static,
    ) -> Self {
        Self {
            script: Box::new(script),
            requests: Rc::default(),
        }
    }

    /// Proposes single-experiment designs from the non-trivial patterns,
    /// sliding with the number of experiments added so far.
    pub fn sliding() -> Self {
        let patterns = nontrivial_patterns();
        Self::new(move |behaviors, _| {
            let added = behaviors.trained - TRIVIAL;
            Ok((0..3)
                .map(|offset| Design::new(vec![clamping(patterns[added + offset])]))
                .collect())
        })
    }

    /// [`ScriptedDesigner::sliding`] whose `call`-th request (from 1) fails
    /// with a solver error.
    pub fn sliding_failing_at(call: usize) -> Self {
        let mut sliding = Self::sliding().script;
        let mut made = 0;
        Self::new(move |behaviors, request| {
            made += 1;
            if made == call {
                return Err(solver_error("designer crashed"));
            }
            sliding(behaviors, request)
        })
    }

    pub fn fixed(designs: Vec<Vec<u8>>) -> Self {
        Self::new(move |_, _| {
            Ok(designs
                .iter()
                .map(|design| Design::new(design.iter().copied().map(clamping).collect()))
                .collect())
        })
    }
}

impl Designer<Behaviors> for ScriptedDesigner {
    fn design(
        &mut self,
        behaviors: &Behaviors,
        _setup: &Setup,
        request: &DesignRequest,
    ) -> Result<Vec<Design>, SbError> {
        self.requests.borrow_mut().push(request.clone());
        (self.script)(behaviors, request)
    }
}
