//! Tolerance escalation for iterations that learned a single behavior.

use sbloopy_core::{Analyzer, BehaviorSet, Dataset, Learner, SbError, Tolerance};
use tracing::{info, warn};

use crate::config::EscalationConfig;

/// Networks and behaviors learned at one tolerance.
#[derive(Debug, Clone)]
pub struct Candidates<N, B> {
    /// Learned networks.
    pub networks: N,
    /// Behavior classes of `networks`.
    pub behaviors: B,
    /// Tolerance that produced them.
    pub tolerance: Tolerance,
}

/// Learns then analyzes at `tolerance`.
pub fn learn_and_analyze<L, A>(
    learner: &mut L,
    analyzer: &mut A,
    training: &Dataset,
    reference: &Dataset,
    tolerance: Tolerance,
) -> Result<Candidates<L::Networks, A::Behaviors>, SbError>
where
    L: Learner,
    A: Analyzer<L::Networks>,
{
    let networks = learner.learn(training, tolerance)?;
    let behaviors = analyzer.behaviors(&networks, reference)?;
    Ok(Candidates {
        networks,
        behaviors,
        tolerance,
    })
}

/// Relaxes the learner while exactly one behavior class remains.
///
/// The size phase tries every size tolerance at zero fit; if one class
/// remains the fit phase tries every fit tolerance at zero size. Escalation
/// stops at the first result whose class count is not one. A solver failure
/// ends the current phase; the last successful candidates are kept. Other
/// errors are returned.
pub fn escalate<L, A>(
    learner: &mut L,
    analyzer: &mut A,
    training: &Dataset,
    reference: &Dataset,
    initial: Candidates<L::Networks, A::Behaviors>,
    config: &EscalationConfig,
) -> Result<Candidates<L::Networks, A::Behaviors>, SbError>
where
    L: Learner,
    A: Analyzer<L::Networks>,
{
    let mut current = initial;
    let phases: [Box<dyn Iterator<Item = Tolerance>>; 2] = [
        Box::new(config.size_tolerances()),
        Box::new(config.fit_tolerances()),
    ];
    for phase in phases {
        for tolerance in phase {
            info!(fit = tolerance.fit, size = tolerance.size, "learning with tolerance");
            match learn_and_analyze(learner, analyzer, training, reference, tolerance) {
                Ok(candidates) => {
                    current = candidates;
                    if current.behaviors.len() != 1 {
                        return Ok(current);
                    }
                }
                Err(err) if err.is_solver_failure() => {
                    warn!(
                        fit = tolerance.fit,
                        size = tolerance.size,
                        error = %err,
                        "solver failed during escalation, ending phase"
                    );
                    break;
                }
                Err(err) => return Err(err),
            }
        }
    }
    Ok(current)
}
