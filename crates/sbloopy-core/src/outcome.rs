//! Terminal states of a model's refinement loop.

use serde::{Deserialize, Serialize};

use crate::errors::ErrorInfo;

/// Why a model's refinement loop stopped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "kebab-case")]
pub enum Termination {
    /// Exactly one behavior class remained after tolerance escalation.
    ConvergedSingle,
    /// The designer found no discriminating design, even relaxed.
    NoDiscrimination,
    /// Performing the next design would exceed the experiment budget.
    BudgetExhausted,
    /// Every proposed design had already been performed.
    DesignsExhausted,
    /// The configured iteration limit was reached.
    IterationLimit,
    /// A fatal error ended the model's loop.
    Failed {
        /// Error that aborted the loop.
        error: ErrorInfo,
    },
}

impl Termination {
    /// Stable reason code, as persisted by the experiment store.
    pub fn code(&self) -> &'static str {
        match self {
            Termination::ConvergedSingle => "converged-single",
            Termination::NoDiscrimination => "no-discrimination",
            Termination::BudgetExhausted => "budget-exhausted",
            Termination::DesignsExhausted => "designs-exhausted",
            Termination::IterationLimit => "iteration-limit",
            Termination::Failed { .. } => "failed",
        }
    }

    /// True for [`Termination::Failed`].
    pub fn is_failure(&self) -> bool {
        matches!(self, Termination::Failed { .. })
    }
}
