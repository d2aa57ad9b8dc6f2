//! YAML-configurable parameters of the refinement loop and the random baseline.

use std::fs;
use std::path::Path;

use sbloopy_core::errors::{ErrorInfo, SbError};
use sbloopy_core::{Clamping, DesignRequest, Tolerance};
use sbloopy_store::PoolFilter;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::serde::from_yaml_slice;

fn config_error(code: &str, message: impl Into<String>) -> SbError {
    SbError::Config(ErrorInfo::new(code, message))
}

/// Parameters of [`crate::Workflow`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowConfig {
    /// Budget: maximum number of distinct experiments in a training set.
    #[serde(default = "default_max_experiments")]
    pub max_experiments: usize,
    /// Timepoint used for error scoring.
    #[serde(default = "default_time")]
    pub time: u32,
    /// Master seed of the design shuffles.
    #[serde(default)]
    pub seed: u64,
    /// Last iteration a run may execute.
    #[serde(default)]
    pub max_iterations: Option<i64>,
    /// Tolerance escalation ceilings.
    #[serde(default)]
    pub escalation: EscalationConfig,
    /// Constraints forwarded to the designer.
    #[serde(default)]
    pub design: DesignConfig,
}

fn default_max_experiments() -> usize {
    80
}

fn default_time() -> u32 {
    1
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            max_experiments: default_max_experiments(),
            time: default_time(),
            seed: 0,
            max_iterations: None,
            escalation: EscalationConfig::default(),
            design: DesignConfig::default(),
        }
    }
}

impl WorkflowConfig {
    /// Rejects configurations the loop cannot run with.
    pub fn validate(&self) -> Result<(), SbError> {
        if self.max_experiments == 0 {
            return Err(config_error("config.budget", "max_experiments must be positive"));
        }
        if let Some(limit) = self.max_iterations {
            if limit < 0 {
                return Err(config_error(
                    "config.max_iterations",
                    format!("max_iterations must not be negative, got {limit}"),
                ));
            }
        }
        self.escalation.validate()?;
        self.design.validate()
    }
}

/// Ceilings of the size and fit escalation phases.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EscalationConfig {
    /// Largest size tolerance tried.
    #[serde(default = "default_max_size")]
    pub max_size: usize,
    /// Increment of the fit tolerance.
    #[serde(default = "default_fit_step")]
    pub fit_step: f64,
    /// Number of fit increments tried.
    #[serde(default = "default_max_fit_steps")]
    pub max_fit_steps: usize,
}

fn default_max_size() -> usize {
    5
}

fn default_fit_step() -> f64 {
    0.01
}

fn default_max_fit_steps() -> usize {
    5
}

impl Default for EscalationConfig {
    fn default() -> Self {
        Self {
            max_size: default_max_size(),
            fit_step: default_fit_step(),
            max_fit_steps: default_max_fit_steps(),
        }
    }
}

impl EscalationConfig {
    /// `(fit = 0, size)` for size 1 up to the ceiling.
    pub fn size_tolerances(&self) -> impl Iterator<Item = Tolerance> {
        (1..=self.max_size).map(Tolerance::size)
    }

    /// `(fit, size = 0)` for each fit step up to the ceiling.
    ///
    /// Values are derived from the step count so that five steps of 0.01 end
    /// exactly on 0.05.
    pub fn fit_tolerances(&self) -> impl Iterator<Item = Tolerance> {
        let step = self.fit_step;
        (1..=self.max_fit_steps).map(move |k| {
            let fit = (k as f64 * step * 1e9).round() / 1e9;
            Tolerance::fit(fit)
        })
    }

    /// Upper bound on learner calls in one iteration.
    pub fn max_learn_calls(&self) -> usize {
        1 + self.max_size + self.max_fit_steps
    }

    fn validate(&self) -> Result<(), SbError> {
        if !self.fit_step.is_finite() || self.fit_step <= 0.0 {
            return Err(config_error(
                "config.escalation",
                format!("fit_step must be a positive number, got {}", self.fit_step),
            ));
        }
        Ok(())
    }
}

/// Designer constraints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DesignConfig {
    /// Maximum stimuli applied per experiment.
    #[serde(default)]
    pub max_stimuli: Option<usize>,
    /// Maximum inhibitors active per experiment.
    #[serde(default)]
    pub max_inhibitors: Option<usize>,
    /// Maximum experiments per design.
    #[serde(default = "default_design_size")]
    pub max_experiments: usize,
    /// Experiments every design must contain.
    #[serde(default)]
    pub locked: Vec<Clamping>,
}

fn default_design_size() -> usize {
    5
}

impl Default for DesignConfig {
    fn default() -> Self {
        Self {
            max_stimuli: None,
            max_inhibitors: None,
            max_experiments: default_design_size(),
            locked: Vec::new(),
        }
    }
}

impl DesignConfig {
    /// Request handed to the designer.
    pub fn request(&self, relax: bool) -> DesignRequest {
        DesignRequest {
            max_stimuli: self.max_stimuli,
            max_inhibitors: self.max_inhibitors,
            max_experiments: self.max_experiments,
            locked: self.locked.clone(),
            relax,
        }
    }

    fn validate(&self) -> Result<(), SbError> {
        if self.max_experiments == 0 {
            return Err(config_error(
                "config.design",
                "design.max_experiments must be positive",
            ));
        }
        Ok(())
    }
}

/// Parameters of [`crate::RandomBaseline`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaselineConfig {
    /// Training-set size at which a run stops.
    pub budget: usize,
    /// Timepoint used for error scoring.
    #[serde(default = "default_time")]
    pub time: u32,
    /// Master seed; run `r` draws from substream `r`.
    #[serde(default)]
    pub seed: u64,
    /// Pool filter bound on active stimuli, 0 for none.
    #[serde(default)]
    pub max_stimuli: usize,
    /// Pool filter bound on active inhibitors, 0 for none.
    #[serde(default)]
    pub max_inhibitors: usize,
}

impl BaselineConfig {
    /// Configuration with the given budget and defaults elsewhere.
    pub fn with_budget(budget: usize) -> Self {
        Self {
            budget,
            time: default_time(),
            seed: 0,
            max_stimuli: 0,
            max_inhibitors: 0,
        }
    }

    /// Filter selecting the random candidate pool.
    pub fn filter(&self) -> PoolFilter {
        PoolFilter::new(self.max_stimuli, self.max_inhibitors)
    }

    /// Rejects a zero budget.
    pub fn validate(&self) -> Result<(), SbError> {
        if self.budget == 0 {
            return Err(config_error("config.budget", "budget must be positive"));
        }
        Ok(())
    }
}

/// Loads and deserializes a YAML configuration file.
pub fn load_config<T: DeserializeOwned, P: AsRef<Path>>(path: P) -> Result<T, SbError> {
    let path = path.as_ref();
    let bytes = fs::read(path).map_err(|err| {
        SbError::Config(
            ErrorInfo::new("config.read", err.to_string())
                .with_context("path", path.display().to_string()),
        )
    })?;
    from_yaml_slice(&bytes)
}
