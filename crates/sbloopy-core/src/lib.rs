#![deny(missing_docs)]
#![doc = "Clampings, datasets and the solver contracts driven by the sbloopy design loop."]

use serde::{Deserialize, Serialize};

pub mod clamping;
pub mod dataset;
pub mod errors;
pub mod outcome;
pub mod rng;
pub mod row;
pub mod setup;

pub use clamping::{Clamping, ClampingKey, Intent};
pub use dataset::{Dataset, Experiment, Observations, Readouts, TimeSlice, TimeSliceIter};
pub use errors::{ErrorInfo, SbError};
pub use outcome::Termination;
pub use rng::{derive_substream_seed, iteration_substream, RngHandle};
pub use row::ExperimentRow;
pub use setup::Setup;

/// Relaxation of the learner's acceptance criterion.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Tolerance {
    /// Admitted relative loss of fitness.
    pub fit: f64,
    /// Admitted extra network size.
    pub size: usize,
}

impl Tolerance {
    /// Exact learning: optimal fitness and minimal size only.
    pub const ZERO: Tolerance = Tolerance { fit: 0.0, size: 0 };

    /// Size-only tolerance.
    pub fn size(size: usize) -> Self {
        Self { fit: 0.0, size }
    }

    /// Fit-only tolerance.
    pub fn fit(fit: f64) -> Self {
        Self { fit, size: 0 }
    }
}

/// Finite set of learned networks, opaque to the loop.
pub trait NetworkSet {
    /// Number of networks.
    fn len(&self) -> usize;

    /// True when no network was learned.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> NetworkSet for Vec<T> {
    fn len(&self) -> usize {
        Vec::len(self)
    }
}

/// Enumerates logic networks consistent with a training dataset.
pub trait Learner {
    /// Networks produced by one learning call.
    type Networks: NetworkSet;

    /// Learns every network within `tolerance` of the optimum on `training`.
    ///
    /// Process and resource failures are reported as [`SbError::Solver`].
    fn learn(&mut self, training: &Dataset, tolerance: Tolerance)
        -> Result<Self::Networks, SbError>;
}

/// Input/output behavior classes of a set of networks.
pub trait BehaviorSet {
    /// Number of classes.
    fn len(&self) -> usize;

    /// True when there is no class at all.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Mean squared error of the classes against `dataset` at `time`.
    fn mse(&self, dataset: &Dataset, time: u32) -> Result<f64, SbError>;
}

/// Groups networks into behavior classes over a reference dataset.
pub trait Analyzer<N> {
    /// Classes produced by one analysis call.
    type Behaviors: BehaviorSet;

    /// Collapses `networks` into their behavior classes on `reference`.
    fn behaviors(&mut self, networks: &N, reference: &Dataset) -> Result<Self::Behaviors, SbError>;
}

/// Constraints forwarded to the experimental-design solver.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DesignRequest {
    /// Maximum number of stimuli applied per experiment.
    pub max_stimuli: Option<usize>,
    /// Maximum number of inhibitors active per experiment.
    pub max_inhibitors: Option<usize>,
    /// Maximum number of experiments per design.
    pub max_experiments: usize,
    /// Experiments every design must contain.
    pub locked: Vec<Clamping>,
    /// Accept designs that do not discriminate every pair of classes.
    pub relax: bool,
}

/// A set of clampings predicted to discriminate behavior classes.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Design {
    /// Experiments of the design.
    pub clampings: Vec<Clamping>,
}

impl Design {
    /// Creates a design from its experiments.
    pub fn new(clampings: Vec<Clamping>) -> Self {
        Self { clampings }
    }
}

/// Computes experiments that discriminate behavior classes.
pub trait Designer<B> {
    /// Returns every optimal design, possibly none.
    fn design(
        &mut self,
        behaviors: &B,
        setup: &Setup,
        request: &DesignRequest,
    ) -> Result<Vec<Design>, SbError>;
}
