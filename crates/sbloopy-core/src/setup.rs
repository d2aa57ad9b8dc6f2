//! Fixed experimental vocabulary.

use serde::{Deserialize, Serialize};

/// Stimuli, inhibitors and readouts of one experimental setup.
///
/// The order of each list is significant: clamping keys, persisted rows and
/// exported headers all follow it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Setup {
    /// Agents that can be applied to the cells.
    pub stimuli: Vec<String>,
    /// Agents whose activity can be blocked.
    pub inhibitors: Vec<String>,
    /// Measured species.
    pub readouts: Vec<String>,
}

impl Setup {
    /// Creates a setup from its three vocabularies.
    pub fn new<S: Into<String>>(
        stimuli: impl IntoIterator<Item = S>,
        inhibitors: impl IntoIterator<Item = S>,
        readouts: impl IntoIterator<Item = S>,
    ) -> Self {
        Self {
            stimuli: stimuli.into_iter().map(Into::into).collect(),
            inhibitors: inhibitors.into_iter().map(Into::into).collect(),
            readouts: readouts.into_iter().map(Into::into).collect(),
        }
    }

    /// True when `name` is one of the stimuli.
    pub fn is_stimulus(&self, name: &str) -> bool {
        self.stimuli.iter().any(|s| s == name)
    }

    /// True when `name` is one of the inhibitors.
    pub fn is_inhibitor(&self, name: &str) -> bool {
        self.inhibitors.iter().any(|i| i == name)
    }
}
