//! Incremental experiment collections keyed by clamping identity.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use indexmap::IndexMap;
use rand::Rng;

use crate::clamping::{Clamping, ClampingKey};
use crate::errors::{ErrorInfo, SbError, SAMPLING_UNDERFLOW, UNKNOWN_TIMEPOINT};
use crate::row::ExperimentRow;
use crate::setup::Setup;

/// Readout name to measured value. Missing measurements have no entry.
pub type Readouts = BTreeMap<String, f64>;

/// Timepoint to readouts.
pub type Observations = BTreeMap<u32, Readouts>;

static NO_READOUTS: Readouts = BTreeMap::new();

/// A clamping together with everything measured under it.
#[derive(Debug, Clone, PartialEq)]
pub struct Experiment {
    /// Perturbation applied.
    pub clamping: Clamping,
    /// Measurements per timepoint.
    pub observations: Observations,
}

impl Experiment {
    /// Creates an experiment.
    pub fn new(clamping: Clamping, observations: Observations) -> Self {
        Self {
            clamping,
            observations,
        }
    }

    /// Number of non-missing readouts at `time`.
    pub fn observation_count(&self, time: u32) -> usize {
        self.observations.get(&time).map_or(0, BTreeMap::len)
    }
}

/// Ordered experiments with at most one entry per clamping.
///
/// Inserting an experiment whose clamping is already present merges its
/// observations into the existing entry. The per-timepoint observation
/// counters always equal the number of stored non-missing readouts.
#[derive(Debug, Clone)]
pub struct Dataset {
    setup: Arc<Setup>,
    entries: IndexMap<ClampingKey, Experiment>,
    times: BTreeSet<u32>,
    nobs: BTreeMap<u32, usize>,
}

impl Dataset {
    /// Creates an empty dataset over `setup`.
    pub fn new(setup: Arc<Setup>) -> Self {
        Self {
            setup,
            entries: IndexMap::new(),
            times: BTreeSet::new(),
            nobs: BTreeMap::new(),
        }
    }

    /// Builds a dataset from raw rows, merging rows with the same clamping.
    pub fn from_rows(rows: &[ExperimentRow], setup: Arc<Setup>) -> Self {
        let mut dataset = Self::new(setup);
        for row in rows {
            let clamping = row.clamping(&dataset.setup);
            let observed = row.observed(&dataset.setup);
            let mut observations = Observations::new();
            if !observed.is_empty() {
                observations.insert(row.time, observed);
            }
            dataset.times.insert(row.time);
            dataset.insert(Experiment::new(clamping, observations));
        }
        dataset
    }

    /// Vocabulary of the dataset.
    pub fn setup(&self) -> &Arc<Setup> {
        &self.setup
    }

    /// Number of distinct clampings.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when the dataset holds no experiment.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Timepoints recorded so far.
    pub fn times(&self) -> &BTreeSet<u32> {
        &self.times
    }

    /// Number of non-missing readouts recorded at `time`.
    pub fn observation_count(&self, time: u32) -> usize {
        self.nobs.get(&time).copied().unwrap_or(0)
    }

    /// Clampings in insertion order.
    pub fn clampings(&self) -> impl Iterator<Item = &Clamping> + '_ {
        self.entries.values().map(|exp| &exp.clamping)
    }

    /// Experiments in insertion order.
    pub fn experiments(&self) -> impl Iterator<Item = &Experiment> + '_ {
        self.entries.values()
    }

    /// True when an experiment with the same identity as `clamping` exists.
    pub fn contains(&self, clamping: &Clamping) -> bool {
        self.entries.contains_key(&clamping.key(&self.setup))
    }

    /// Returns the experiment sharing `clamping`'s identity.
    pub fn get(&self, clamping: &Clamping) -> Option<&Experiment> {
        self.entries.get(&clamping.key(&self.setup))
    }

    /// Readouts of every experiment at `time`.
    pub fn at(&self, time: u32) -> Result<TimeSlice<'_>, SbError> {
        if !self.times.contains(&time) {
            let available = self
                .times
                .iter()
                .map(u32::to_string)
                .collect::<Vec<_>>()
                .join(",");
            return Err(SbError::Dataset(
                ErrorInfo::new(
                    UNKNOWN_TIMEPOINT,
                    format!("the timepoint {time} does not exist in the dataset"),
                )
                .with_context("time", time.to_string())
                .with_context("available", available),
            ));
        }
        Ok(TimeSlice {
            dataset: self,
            time,
        })
    }

    /// Appends experiments, merging those whose clamping is already present.
    pub fn add(&mut self, experiments: impl IntoIterator<Item = Experiment>) {
        for experiment in experiments {
            self.times.extend(experiment.observations.keys().copied());
            self.insert(experiment);
        }
    }

    /// Keeps only the experiments matching `keep`.
    pub fn retain(&mut self, mut keep: impl FnMut(&Experiment) -> bool) {
        let nobs = &mut self.nobs;
        self.entries.retain(|_, experiment| {
            let kept = keep(experiment);
            if !kept {
                release_counts(nobs, experiment);
            }
            kept
        });
    }

    /// Removes `n` experiments chosen uniformly at random without replacement.
    pub fn pop_sample<R: Rng + ?Sized>(
        &mut self,
        n: usize,
        rng: &mut R,
    ) -> Result<Vec<Experiment>, SbError> {
        if n > self.entries.len() {
            return Err(SbError::Dataset(
                ErrorInfo::new(
                    SAMPLING_UNDERFLOW,
                    "cannot sample more experiments than the dataset holds",
                )
                .with_context("requested", n.to_string())
                .with_context("available", self.entries.len().to_string()),
            ));
        }
        let mut sample = Vec::with_capacity(n);
        for _ in 0..n {
            let idx = rng.gen_range(0..self.entries.len());
            if let Some((_, experiment)) = self.entries.shift_remove_index(idx) {
                release_counts(&mut self.nobs, &experiment);
                sample.push(experiment);
            }
        }
        Ok(sample)
    }

    /// Lays out the dataset at `time` as rows, one per experiment.
    pub fn to_rows(&self, time: u32) -> Result<Vec<ExperimentRow>, SbError> {
        let slice = self.at(time)?;
        Ok(slice
            .iter()
            .map(|(_, clamping, readouts)| {
                ExperimentRow::from_parts(&self.setup, clamping, time, readouts)
            })
            .collect())
    }

    fn insert(&mut self, experiment: Experiment) {
        let key = experiment.clamping.key(&self.setup);
        match self.entries.get_mut(&key) {
            Some(existing) => {
                for (time, readouts) in experiment.observations {
                    let slot = existing.observations.entry(time).or_default();
                    let before = slot.len();
                    slot.extend(readouts);
                    *self.nobs.entry(time).or_default() += slot.len() - before;
                }
            }
            None => {
                for (time, readouts) in &experiment.observations {
                    *self.nobs.entry(*time).or_default() += readouts.len();
                }
                self.entries.insert(key, experiment);
            }
        }
    }
}

fn release_counts(nobs: &mut BTreeMap<u32, usize>, experiment: &Experiment) {
    for (time, readouts) in &experiment.observations {
        if let Some(count) = nobs.get_mut(time) {
            *count = count.saturating_sub(readouts.len());
        }
    }
}

/// View of a dataset at one timepoint. Cheap to copy and re-iterable.
#[derive(Debug, Clone, Copy)]
pub struct TimeSlice<'a> {
    dataset: &'a Dataset,
    time: u32,
}

impl<'a> TimeSlice<'a> {
    /// Timepoint of the view.
    pub fn time(&self) -> u32 {
        self.time
    }

    /// Number of experiments in the view.
    pub fn len(&self) -> usize {
        self.dataset.len()
    }

    /// True when the underlying dataset is empty.
    pub fn is_empty(&self) -> bool {
        self.dataset.is_empty()
    }

    /// Yields `(index, clamping, readouts)` in insertion order.
    pub fn iter(&self) -> TimeSliceIter<'a> {
        TimeSliceIter {
            inner: self.dataset.entries.values().enumerate(),
            time: self.time,
        }
    }
}

impl<'a> IntoIterator for TimeSlice<'a> {
    type Item = (usize, &'a Clamping, &'a Readouts);
    type IntoIter = TimeSliceIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Iterator over a [`TimeSlice`].
#[derive(Debug, Clone)]
pub struct TimeSliceIter<'a> {
    inner: std::iter::Enumerate<indexmap::map::Values<'a, ClampingKey, Experiment>>,
    time: u32,
}

impl<'a> Iterator for TimeSliceIter<'a> {
    type Item = (usize, &'a Clamping, &'a Readouts);

    fn next(&mut self) -> Option<Self::Item> {
        let time = self.time;
        self.inner.next().map(|(idx, experiment)| {
            let readouts = experiment.observations.get(&time).unwrap_or(&NO_READOUTS);
            (idx, &experiment.clamping, readouts)
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}
