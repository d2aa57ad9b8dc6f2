//! Flat experiment rows, the persisted and imported form of experiments.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::clamping::{Clamping, Intent};
use crate::setup::Setup;

fn default_time() -> u32 {
    1
}

/// One measured experiment at one timepoint, laid out like a data table row.
///
/// Stimulus and inhibitor columns hold 0/1 flags. A readout of `None` (or a
/// NaN) is a missing measurement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ExperimentRow {
    /// Timepoint of the measurements.
    #[serde(default = "default_time")]
    pub time: u32,
    /// Stimulus flags, 1 when the stimulus is applied.
    #[serde(default)]
    pub stimuli: BTreeMap<String, u8>,
    /// Inhibitor flags, 1 when the inhibitor is active.
    #[serde(default)]
    pub inhibitors: BTreeMap<String, u8>,
    /// Readout values.
    #[serde(default)]
    pub readouts: BTreeMap<String, Option<f64>>,
}

impl ExperimentRow {
    /// Creates an empty row at `time`.
    pub fn at(time: u32) -> Self {
        Self {
            time,
            ..Self::default()
        }
    }

    /// Sets a stimulus flag.
    pub fn with_stimulus(mut self, name: impl Into<String>, applied: bool) -> Self {
        self.stimuli.insert(name.into(), u8::from(applied));
        self
    }

    /// Sets an inhibitor flag.
    pub fn with_inhibitor(mut self, name: impl Into<String>, active: bool) -> Self {
        self.inhibitors.insert(name.into(), u8::from(active));
        self
    }

    /// Sets a readout value; `None` marks it missing.
    pub fn with_readout(mut self, name: impl Into<String>, value: Option<f64>) -> Self {
        self.readouts.insert(name.into(), value);
        self
    }

    /// Builds the clamping encoded by the row.
    ///
    /// Every stimulus of the setup becomes a literal (`Apply` when its flag is
    /// 1, `Block` otherwise); only active inhibitors become `Block` literals.
    pub fn clamping(&self, setup: &Setup) -> Clamping {
        let stimuli = setup.stimuli.iter().map(|s| {
            let intent = if self.stimuli.get(s).copied() == Some(1) {
                Intent::Apply
            } else {
                Intent::Block
            };
            (s.clone(), intent)
        });
        let inhibitors = setup
            .inhibitors
            .iter()
            .filter(|i| self.inhibitors.get(*i).copied() == Some(1))
            .map(|i| (i.clone(), Intent::Block));
        stimuli.chain(inhibitors).collect()
    }

    /// Readouts of the setup with a numeric, non-NaN value.
    pub fn observed(&self, setup: &Setup) -> BTreeMap<String, f64> {
        setup
            .readouts
            .iter()
            .filter_map(|r| match self.readouts.get(r).copied().flatten() {
                Some(value) if !value.is_nan() => Some((r.clone(), value)),
                _ => None,
            })
            .collect()
    }

    /// Lays out a clamping and its readouts at `time` as a row.
    pub fn from_parts(
        setup: &Setup,
        clamping: &Clamping,
        time: u32,
        readouts: &BTreeMap<String, f64>,
    ) -> Self {
        Self {
            time,
            stimuli: setup
                .stimuli
                .iter()
                .map(|s| (s.clone(), u8::from(clamping.stimulates(s))))
                .collect(),
            inhibitors: setup
                .inhibitors
                .iter()
                .map(|i| (i.clone(), u8::from(clamping.inhibits(i))))
                .collect(),
            readouts: setup
                .readouts
                .iter()
                .map(|r| (r.clone(), readouts.get(r).copied()))
                .collect(),
        }
    }
}
