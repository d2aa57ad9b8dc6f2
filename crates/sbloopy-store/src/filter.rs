//! Pool selection rules: iteration-0 seeding and random-baseline candidates.

use serde::{Deserialize, Serialize};

/// How `init_benchmark` seeds the iteration-0 training set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SeedPolicy {
    /// In-silico benchmarks: pool experiments with at most one active
    /// stimulus and at most one active inhibitor.
    #[default]
    Trivial,
    /// Real data: every row of the model's screening table.
    Screening,
}

/// True when an experiment counts as trivial for [`SeedPolicy::Trivial`].
pub fn is_trivial(n_stimuli: usize, n_inhibitors: usize) -> bool {
    n_stimuli <= 1 && n_inhibitors <= 1
}

/// Admission rule for non-trivial pool experiments. A bound of 0 is unbounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PoolFilter {
    /// Maximum number of active stimuli, 0 for no limit.
    #[serde(default)]
    pub max_stimuli: usize,
    /// Maximum number of active inhibitors, 0 for no limit.
    #[serde(default)]
    pub max_inhibitors: usize,
}

impl PoolFilter {
    pub fn new(max_stimuli: usize, max_inhibitors: usize) -> Self {
        Self {
            max_stimuli,
            max_inhibitors,
        }
    }

    /// Whether an experiment with the given active counts enters the pool.
    pub fn admits(&self, n_stimuli: usize, n_inhibitors: usize) -> bool {
        let (ms, mi) = (self.max_stimuli, self.max_inhibitors);
        let (sti, inh) = (n_stimuli, n_inhibitors);
        match (ms > 0, mi > 0) {
            (true, true) => (inh <= mi && (2..=ms).contains(&sti)) || (2..=mi).contains(&inh),
            (true, false) => (2..=ms).contains(&sti) || inh >= 2,
            (false, true) => sti >= 2 || (2..=mi).contains(&inh),
            (false, false) => sti > 1 || inh > 1,
        }
    }
}
