//! Perturbation values and their full-vocabulary identity.

use std::collections::BTreeMap;
use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};

use crate::setup::Setup;

/// Intent of a single clamped agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(into = "i8", try_from = "i8")]
pub enum Intent {
    /// Blocked via inhibitor (or a stimulus held off), encoded as -1.
    Block,
    /// Not clamped, encoded as 0.
    #[default]
    Absent,
    /// Stimulus applied, encoded as +1.
    Apply,
}

impl Intent {
    /// Returns the ternary sign of the intent.
    pub fn sign(self) -> i8 {
        match self {
            Intent::Block => -1,
            Intent::Absent => 0,
            Intent::Apply => 1,
        }
    }
}

impl From<Intent> for i8 {
    fn from(intent: Intent) -> Self {
        intent.sign()
    }
}

impl TryFrom<i8> for Intent {
    type Error = String;

    fn try_from(value: i8) -> Result<Self, Self::Error> {
        match value {
            -1 => Ok(Intent::Block),
            0 => Ok(Intent::Absent),
            1 => Ok(Intent::Apply),
            other => Err(format!("clamping sign must be -1, 0 or 1, got {other}")),
        }
    }
}

/// One perturbation experiment: which stimuli are applied and which
/// inhibitors are active.
///
/// Absent literals are never stored, so an unspecified agent and an agent
/// explicitly clamped to [`Intent::Absent`] are the same value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(
    from = "BTreeMap<String, Intent>",
    into = "BTreeMap<String, Intent>"
)]
pub struct Clamping {
    literals: BTreeMap<String, Intent>,
}

impl Clamping {
    /// Builds a clamping from `(agent, intent)` literals.
    pub fn new<S: Into<String>>(literals: impl IntoIterator<Item = (S, Intent)>) -> Self {
        literals.into_iter().collect()
    }

    /// Returns the intent recorded for `agent`.
    pub fn get(&self, agent: &str) -> Intent {
        self.literals.get(agent).copied().unwrap_or_default()
    }

    /// Iterates over the non-absent literals in agent name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, Intent)> + '_ {
        self.literals
            .iter()
            .map(|(agent, intent)| (agent.as_str(), *intent))
    }

    /// Number of non-absent literals.
    pub fn len(&self) -> usize {
        self.literals.len()
    }

    /// True when nothing is clamped.
    pub fn is_empty(&self) -> bool {
        self.literals.is_empty()
    }

    /// True when `stimulus` is applied.
    pub fn stimulates(&self, stimulus: &str) -> bool {
        self.get(stimulus) == Intent::Apply
    }

    /// True when `inhibitor` carries any literal.
    pub fn inhibits(&self, inhibitor: &str) -> bool {
        self.get(inhibitor) != Intent::Absent
    }

    /// Number of applied stimuli of the setup.
    pub fn active_stimuli(&self, setup: &Setup) -> usize {
        setup.stimuli.iter().filter(|s| self.stimulates(s)).count()
    }

    /// Number of active inhibitors of the setup.
    pub fn active_inhibitors(&self, setup: &Setup) -> usize {
        setup.inhibitors.iter().filter(|i| self.inhibits(i)).count()
    }

    /// Projects the clamping onto the full vocabulary of `setup`.
    ///
    /// Stimuli are either applied or not and inhibitors either active or
    /// not, so a stimulus held at -1 and an unspecified stimulus share a key.
    /// Agents outside the vocabulary do not take part in the identity.
    pub fn key(&self, setup: &Setup) -> ClampingKey {
        let stimuli = setup
            .stimuli
            .iter()
            .map(|s| format!("{s}={}", u8::from(self.stimulates(s))));
        let inhibitors = setup
            .inhibitors
            .iter()
            .map(|i| format!("{i}i={}", u8::from(self.inhibits(i))));
        ClampingKey(stimuli.chain(inhibitors).collect::<Vec<_>>().join(","))
    }
}

impl<S: Into<String>> FromIterator<(S, Intent)> for Clamping {
    fn from_iter<T: IntoIterator<Item = (S, Intent)>>(iter: T) -> Self {
        let literals = iter
            .into_iter()
            .map(|(agent, intent)| (agent.into(), intent))
            .filter(|(_, intent)| *intent != Intent::Absent)
            .collect();
        Self { literals }
    }
}

impl From<BTreeMap<String, Intent>> for Clamping {
    fn from(literals: BTreeMap<String, Intent>) -> Self {
        literals.into_iter().collect()
    }
}

impl From<Clamping> for BTreeMap<String, Intent> {
    fn from(clamping: Clamping) -> Self {
        clamping.literals
    }
}

impl Display for Clamping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, (agent, intent)) in self.literals.iter().enumerate() {
            if idx > 0 {
                write!(f, ",")?;
            }
            write!(f, "{agent}={}", intent.sign())?;
        }
        Ok(())
    }
}

/// Canonical identity of a clamping over a fixed vocabulary.
///
/// Two clampings are the same experiment iff their keys are equal. The key
/// doubles as the signature column of the persistent store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClampingKey(String);

impl ClampingKey {
    /// Wraps a previously persisted signature.
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Returns the textual signature.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for ClampingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
